use cmd_lib::*;
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::BootstrapConfig;
use crate::host::{ExecContext, Host};
use crate::state::{Marker, StateStore};

/// Clones the source tree as the operating user, then runs the preparation
/// scripts found in it. An existing tree is never cloned over; if the
/// scripts did not finish last time they run again on the existing tree.
pub fn provision(
    host: &impl Host,
    ctx: &ExecContext,
    config: &BootstrapConfig,
    state: &mut StateStore,
) -> CmdResult {
    let source_dir = config.source_dir();
    if state.has(Marker::RepoCloned) {
        info!("Repository already provisioned at {}", source_dir.display());
        return Ok(());
    }

    if source_dir.exists() {
        info!("{} already exists, skipping clone", source_dir.display());
    } else {
        clone_into_place(host, ctx, &config.repo.url, &source_dir)?;
    }

    for script in &config.repo.prepare_scripts {
        let path = source_dir.join(script);
        if path.is_file() {
            host.run_script(ctx, &path, &source_dir)?;
        } else {
            info!("No {script} in {}, skipping", source_dir.display());
        }
    }

    state.ensure_set(Marker::RepoCloned)?;
    Ok(())
}

fn clone_into_place(host: &impl Host, ctx: &ExecContext, url: &str, dest: &Path) -> CmdResult {
    let staging = staging_dir(dest);
    if staging.exists() {
        warn!("Removing leftover partial clone {}", staging.display());
        fs::remove_dir_all(&staging)?;
    }
    host.clone_repo(ctx, url, &staging)?;
    fs::rename(&staging, dest)?;
    Ok(())
}

fn staging_dir(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dest.with_file_name(name)
}
