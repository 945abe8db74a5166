//! `ingest`: manifest a VDR directory.

use anyhow::Result;

use crate::clock::SystemClock;
use crate::commands::IngestArgs;
use crate::vdr::ingest;

pub async fn handle(args: IngestArgs) -> Result<i32> {
    let clock = SystemClock;
    let (manifest_path, sha256) = ingest(&args.src, &args.into, &clock)?;
    println!("manifest {} ({sha256})", manifest_path.display());
    Ok(0)
}
