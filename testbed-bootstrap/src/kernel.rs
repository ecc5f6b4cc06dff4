use cmd_lib::*;
use std::io::Error;
use std::time::Duration;

use crate::config::KernelConfig;
use crate::host::{ExecContext, Host};
use crate::state::{Marker, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelGate {
    Satisfied,
    RebootIssued,
}

pub fn is_satisfied(running: &str, desired: &str) -> bool {
    running.contains(desired)
}

/// Version argument for the mainline kernel helper: "5.8.0-050800-generic"
/// becomes "v5.8.0".
pub fn helper_version(desired: &str) -> String {
    let numeric = desired.split('-').next().unwrap_or(desired);
    format!("v{numeric}")
}

/// Picks the installed release to boot for `desired`: an exact match, or the
/// highest release containing it ("5.8.0" resolves to "5.8.0-050800-generic").
pub fn select_release<'a>(installed: &'a [String], desired: &str) -> Option<&'a str> {
    if let Some(exact) = installed.iter().find(|release| *release == desired) {
        return Some(exact);
    }
    installed
        .iter()
        .filter(|release| is_satisfied(release, desired))
        .max()
        .map(String::as_str)
}

pub fn boot_entry(kernel: &KernelConfig, release: &str) -> String {
    format!("{}{release}", kernel.grub_entry_prefix)
}

pub fn ensure_kernel(
    host: &impl Host,
    ctx: &ExecContext,
    kernel: &KernelConfig,
    state: &mut StateStore,
) -> Result<KernelGate, Error> {
    let running = host.running_kernel()?;
    let desired = &kernel.desired_version;
    if is_satisfied(&running, desired) {
        info!("Running kernel {running} matches {desired}");
        return Ok(KernelGate::Satisfied);
    }

    if state.has(Marker::KernelRebootIssued) {
        return Err(Error::other(format!(
            "Already rebooted into kernel {desired} once, but running {running}; \
             check the bootloader default entry"
        )));
    }

    info!("Running kernel {running} does not match {desired}, upgrading");
    host.install_kernel(ctx, &kernel.helper_url, &helper_version(desired))?;
    let installed = host.installed_kernels()?;
    let Some(release) = select_release(&installed, desired) else {
        return Err(Error::other(format!(
            "Kernel image for {desired} not found after install"
        )));
    };
    info!("Kernel release {release} installed");
    host.set_default_boot_entry(ctx, &boot_entry(kernel, release))?;

    // a failed reboot command must stay retryable, so the guard is armed after it
    host.reboot(ctx, Duration::from_secs(kernel.reboot_delay_secs))?;
    state.ensure_set(Marker::KernelRebootIssued)?;
    Ok(KernelGate::RebootIssued)
}
