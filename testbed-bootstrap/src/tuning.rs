use cmd_lib::*;
use log::warn;

use crate::common::IRQBALANCE_SERVICE;
use crate::config::TuningConfig;
use crate::host::{ExecContext, Host};

/// Applies the per-node performance settings. The cpumask lives in sysfs and
/// resets every boot, so this runs on every invocation; each setting is only
/// written when it differs. Failures are logged and never stop the bootstrap.
pub fn tune(host: &impl Host, ctx: &ExecContext, tuning: &TuningConfig) {
    if !tuning.writeback_cpumask.is_empty() {
        if let Err(e) = pin_writeback(host, ctx, &tuning.writeback_cpumask) {
            warn!("Writeback cpumask setup failed, continuing: {e}");
        }
    }
    if tuning.disable_irqbalance {
        if let Err(e) = disable_irqbalance(host, ctx) {
            warn!("Disabling {IRQBALANCE_SERVICE} failed, continuing: {e}");
        }
    }
}

/// Compares cpumasks the way sysfs prints them: zero padded, comma grouped.
pub fn same_cpumask(a: &str, b: &str) -> bool {
    canonical_cpumask(a) == canonical_cpumask(b)
}

fn canonical_cpumask(mask: &str) -> String {
    let digits: String = mask
        .trim()
        .chars()
        .filter(|c| *c != ',')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        "0".to_string()
    } else {
        significant.to_string()
    }
}

fn pin_writeback(host: &impl Host, ctx: &ExecContext, mask: &str) -> CmdResult {
    let current = host.writeback_cpumask()?;
    if same_cpumask(&current, mask) {
        info!("Writeback workqueue already pinned to cpumask {mask}");
        return Ok(());
    }
    host.set_writeback_cpumask(ctx, mask)
}

fn disable_irqbalance(host: &impl Host, ctx: &ExecContext) -> CmdResult {
    if !host.service_enabled(IRQBALANCE_SERVICE)? {
        info!("{IRQBALANCE_SERVICE} is not enabled");
        return Ok(());
    }
    host.disable_service(ctx, IRQBALANCE_SERVICE)
}
