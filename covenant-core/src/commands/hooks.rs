//! `install-hooks`: wire the pre-commit gate into a git checkout.

use anyhow::{bail, Result};

use crate::commands::InstallHooksArgs;

const PRE_COMMIT_HOOK: &str = "#!/bin/sh\nexec covenant-core pre-commit \"$@\"\n";

pub async fn handle(args: InstallHooksArgs) -> Result<i32> {
    if !args.git_dir.exists() {
        bail!("git directory not found: {}", args.git_dir.display());
    }
    let hooks_dir = args.git_dir.join("hooks");
    std::fs::create_dir_all(&hooks_dir)?;
    let hook_path = hooks_dir.join("pre-commit");
    std::fs::write(&hook_path, PRE_COMMIT_HOOK)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&hook_path, std::fs::Permissions::from_mode(0o755))?;
    }
    println!("installed {}", hook_path.display());
    Ok(0)
}
