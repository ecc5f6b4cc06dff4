use cmd_lib::*;

use crate::common::DEPENDENCY_PACKAGES;
use crate::host::{ExecContext, Host};
use crate::state::{Marker, StateStore};

pub fn install(host: &impl Host, ctx: &ExecContext, state: &mut StateStore) -> CmdResult {
    if state.has(Marker::DependenciesInstalled) {
        info!("Dependencies already installed, skipping");
        return Ok(());
    }

    host.install_packages(ctx, DEPENDENCY_PACKAGES)?;
    state.ensure_set(Marker::DependenciesInstalled)?;
    info!("Installed {} packages", DEPENDENCY_PACKAGES.len());
    Ok(())
}
