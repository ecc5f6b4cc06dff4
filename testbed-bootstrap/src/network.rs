use cmd_lib::*;
use log::warn;

use crate::config::NetworkConfig;
use crate::host::{ExecContext, Host};

/// Interface found holding an address in the experiment subnet. Recomputed on
/// every invocation since names and multicast settings reset across boots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceBinding {
    pub name: String,
    pub address: String,
}

pub fn find_interface(listing: &str, subnet_prefix: &str) -> Option<InterfaceBinding> {
    listing.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let name = fields.nth(1)?;
        if fields.next()? != "inet" {
            return None;
        }
        let address = fields.next()?.split('/').next()?;
        address.starts_with(subnet_prefix).then(|| InterfaceBinding {
            // vlan devices show up as "vlan123@eno1"
            name: name.split('@').next().unwrap_or(name).to_string(),
            address: address.to_string(),
        })
    })
}

/// Best effort: failures are logged and never stop the bootstrap.
pub fn normalize(host: &impl Host, ctx: &ExecContext, network: &NetworkConfig) {
    if let Err(e) = try_normalize(host, ctx, network) {
        warn!("Experiment interface setup failed, continuing: {e}");
    }
}

fn try_normalize(host: &impl Host, ctx: &ExecContext, network: &NetworkConfig) -> CmdResult {
    let listing = host.ipv4_addresses()?;
    let Some(binding) = find_interface(&listing, &network.subnet_prefix) else {
        warn!(
            "No interface holds an address in {}, skipping interface setup",
            network.subnet_prefix
        );
        return Ok(());
    };
    info!(
        "Found experiment interface {} with address {}",
        binding.name, binding.address
    );

    let iface = &network.interface_name;
    if &binding.name != iface {
        host.rename_interface(ctx, &binding.name, iface)?;
    }
    host.enable_multicast(ctx, iface)?;
    ensure_route(host, ctx, &network.multicast_route, iface)
}

fn ensure_route(host: &impl Host, ctx: &ExecContext, route: &str, iface: &str) -> CmdResult {
    if host.has_route(route, iface)? {
        info!("Route {route} on {iface} already present");
        return Ok(());
    }
    if let Err(e) = host.add_route(ctx, route, iface) {
        if host.has_route(route, iface).unwrap_or(false) {
            info!("Route {route} on {iface} already present");
            return Ok(());
        }
        return Err(e);
    }
    Ok(())
}
