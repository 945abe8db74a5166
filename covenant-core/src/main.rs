use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use covenant_core::commands::{
    self, CiGateArgs, EvaluateArgs, ExportArgs, IngestArgs, InstallHooksArgs, PreCommitArgs,
    ReplayArgs, VerifyArgs,
};

/// Covenant - governance evaluation engine CLI
/// Evidence collection, abductive credence, tamper-evident decisions
#[derive(Parser)]
#[command(name = "covenant-core")]
#[command(about = "Governance evaluation engine with tamper-evident decision records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one commit against its promise
    EvaluateCommit(EvaluateArgs),

    /// Run the pre-commit gate
    PreCommit(PreCommitArgs),

    /// Run the CI gate and write a gate report
    CiGate(CiGateArgs),

    /// Reconstruct a run's ledger from its audit trail
    ReplayAudit(ReplayArgs),

    /// Export a run as a portable audit pack
    Export(ExportArgs),

    /// Verify an audit pack offline
    Verify(VerifyArgs),

    /// Install the git pre-commit hook
    InstallHooks(InstallHooksArgs),

    /// Ingest a VDR directory and manifest it
    Ingest(IngestArgs),
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::WARN
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(level)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome: Result<i32> = match cli.command {
        Commands::EvaluateCommit(args) => commands::evaluate::handle(args).await,
        Commands::PreCommit(args) => commands::gate::handle_pre_commit(args).await,
        Commands::CiGate(args) => commands::gate::handle_ci_gate(args).await,
        Commands::ReplayAudit(args) => commands::replay::handle(args).await,
        Commands::Export(args) => commands::pack::handle_export(args).await,
        Commands::Verify(args) => commands::pack::handle_verify(args).await,
        Commands::InstallHooks(args) => commands::hooks::handle(args).await,
        Commands::Ingest(args) => commands::ingest::handle(args).await,
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    }
}
