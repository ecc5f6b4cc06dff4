use cmd_lib::*;
use std::path::{Path, PathBuf};

use crate::config::Role;
use crate::host::{ExecContext, Host};

pub fn startup_script(source_dir: &Path, role: Role) -> PathBuf {
    source_dir.join(format!("setup_{role}.sh"))
}

/// Runs the role's startup script from the source tree if it has one.
pub fn dispatch(host: &impl Host, ctx: &ExecContext, role: Role, source_dir: &Path) -> CmdResult {
    let script = startup_script(source_dir, role);
    if !script.is_file() {
        info!(
            "No startup script {} for role {role}, skipping",
            script.display()
        );
        return Ok(());
    }

    info!("Starting {role} with {}", script.display());
    host.run_script(ctx, &script, source_dir)
}
