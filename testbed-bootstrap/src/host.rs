use cmd_lib::*;
use std::fs;
use std::io::Error;
use std::path::Path;
use std::time::Duration;

use crate::common::{KERNEL_HELPER_PATH, WRITEBACK_CPUMASK_PATH};

/// Identity a host operation runs under. Every mutating [`Host`] call takes
/// one explicitly instead of switching identity mid-sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecContext {
    AsAdmin,
    AsUser(String),
}

impl ExecContext {
    /// Arguments placed between `sudo -n` and the command.
    pub fn sudo_args(&self) -> Vec<String> {
        match self {
            ExecContext::AsAdmin => Vec::new(),
            ExecContext::AsUser(user) => vec!["-u".to_string(), user.clone(), "-H".to_string()],
        }
    }
}

/// Narrow contracts over the external tools a bootstrap consumes. Success or
/// failure is reported through the returned status only.
pub trait Host {
    fn running_kernel(&self) -> FunResult;
    /// Raw `ip -o -4 addr show` listing.
    fn ipv4_addresses(&self) -> FunResult;
    fn rename_interface(&self, ctx: &ExecContext, from: &str, to: &str) -> CmdResult;
    fn enable_multicast(&self, ctx: &ExecContext, iface: &str) -> CmdResult;
    fn has_route(&self, route: &str, iface: &str) -> Result<bool, Error>;
    fn add_route(&self, ctx: &ExecContext, route: &str, iface: &str) -> CmdResult;

    fn install_kernel(
        &self,
        ctx: &ExecContext,
        helper_url: &str,
        helper_version: &str,
    ) -> CmdResult;
    /// Kernel releases with an image under `/boot`.
    fn installed_kernels(&self) -> Result<Vec<String>, Error>;
    fn set_default_boot_entry(&self, ctx: &ExecContext, entry: &str) -> CmdResult;
    fn reboot(&self, ctx: &ExecContext, delay: Duration) -> CmdResult;

    fn install_packages(&self, ctx: &ExecContext, packages: &[&str]) -> CmdResult;

    fn writeback_cpumask(&self) -> FunResult;
    fn set_writeback_cpumask(&self, ctx: &ExecContext, mask: &str) -> CmdResult;
    fn service_enabled(&self, service: &str) -> Result<bool, Error>;
    fn disable_service(&self, ctx: &ExecContext, service: &str) -> CmdResult;

    fn clone_repo(&self, ctx: &ExecContext, url: &str, dest: &Path) -> CmdResult;
    fn run_script(&self, ctx: &ExecContext, script: &Path, workdir: &Path) -> CmdResult;

    /// Current boot-time job table, empty when none exists yet.
    fn boot_jobs(&self, ctx: &ExecContext) -> FunResult;
    fn replace_boot_jobs(&self, ctx: &ExecContext, content: &str) -> CmdResult;
    fn spawn_detached(&self, ctx: &ExecContext, argv: &[String], log_file: &Path) -> CmdResult;
}

/// [`Host`] backed by the real system tools.
pub struct SystemHost;

impl Host for SystemHost {
    fn running_kernel(&self) -> FunResult {
        run_fun!(uname -r)
    }

    fn ipv4_addresses(&self) -> FunResult {
        run_fun!(ip -o -4 addr show)
    }

    fn rename_interface(&self, ctx: &ExecContext, from: &str, to: &str) -> CmdResult {
        let sudo = &ctx.sudo_args();
        run_cmd! {
            info "Renaming interface $from to $to";
            sudo -n $[sudo] ip link set dev $from down;
            sudo -n $[sudo] ip link set dev $from name $to;
            sudo -n $[sudo] ip link set dev $to up;
        }
    }

    fn enable_multicast(&self, ctx: &ExecContext, iface: &str) -> CmdResult {
        let sudo = &ctx.sudo_args();
        run_cmd! {
            info "Enabling multicast on $iface";
            sudo -n $[sudo] ip link set dev $iface multicast on;
        }
    }

    fn has_route(&self, route: &str, iface: &str) -> Result<bool, Error> {
        let routes = run_fun!(ip route show $route dev $iface)?;
        Ok(!routes.trim().is_empty())
    }

    fn add_route(&self, ctx: &ExecContext, route: &str, iface: &str) -> CmdResult {
        let sudo = &ctx.sudo_args();
        run_cmd! {
            info "Adding route $route via $iface";
            sudo -n $[sudo] ip route add $route dev $iface;
        }
    }

    fn install_kernel(
        &self,
        ctx: &ExecContext,
        helper_url: &str,
        helper_version: &str,
    ) -> CmdResult {
        let sudo = &ctx.sudo_args();
        run_cmd! {
            info "Downloading kernel install helper from $helper_url";
            sudo -n $[sudo] wget -q -O $KERNEL_HELPER_PATH $helper_url;
            sudo -n $[sudo] chmod +x $KERNEL_HELPER_PATH;
            info "Installing kernel $helper_version";
            sudo -n $[sudo] $KERNEL_HELPER_PATH -i $helper_version --yes;
        }
    }

    fn installed_kernels(&self) -> Result<Vec<String>, Error> {
        let mut releases = Vec::new();
        for entry in fs::read_dir("/boot")? {
            let name = entry?.file_name();
            if let Some(release) = name.to_string_lossy().strip_prefix("vmlinuz-") {
                releases.push(release.to_string());
            }
        }
        releases.sort();
        Ok(releases)
    }

    fn set_default_boot_entry(&self, ctx: &ExecContext, entry: &str) -> CmdResult {
        let sudo = &ctx.sudo_args();
        run_cmd! {
            info "Switching GRUB_DEFAULT to saved";
            sudo -n $[sudo] sed -i "s/^GRUB_DEFAULT=.*/GRUB_DEFAULT=saved/" /etc/default/grub;
            sudo -n $[sudo] update-grub;
            info "Setting default boot entry to $entry";
            sudo -n $[sudo] grub-set-default $entry;
        }
    }

    fn reboot(&self, ctx: &ExecContext, delay: Duration) -> CmdResult {
        let sudo = &ctx.sudo_args();
        let secs = delay.as_secs();
        run_cmd! {
            info "Rebooting in ${secs}s";
            sync;
            sleep $secs;
            sudo -n $[sudo] systemctl reboot;
        }
    }

    fn install_packages(&self, ctx: &ExecContext, packages: &[&str]) -> CmdResult {
        let sudo = &ctx.sudo_args();
        run_cmd! {
            info "Refreshing package index";
            sudo -n $[sudo] apt-get update -q;
            info "Installing packages: ${packages:?}";
            sudo -n $[sudo] env "DEBIAN_FRONTEND=noninteractive" apt-get install -y -q $[packages];
        }
    }

    fn writeback_cpumask(&self) -> FunResult {
        run_fun!(cat $WRITEBACK_CPUMASK_PATH)
    }

    fn set_writeback_cpumask(&self, ctx: &ExecContext, mask: &str) -> CmdResult {
        let sudo = &ctx.sudo_args();
        run_cmd! {
            info "Pinning writeback workqueue to cpumask $mask";
            echo $mask | sudo -n $[sudo] tee $WRITEBACK_CPUMASK_PATH >/dev/null;
        }
    }

    fn service_enabled(&self, service: &str) -> Result<bool, Error> {
        // `is-enabled` exits non-zero for disabled, masked and unknown units
        match run_fun!(systemctl is-enabled $service 2>/dev/null) {
            Ok(state) => Ok(state.trim() == "enabled"),
            Err(_) => Ok(false),
        }
    }

    fn disable_service(&self, ctx: &ExecContext, service: &str) -> CmdResult {
        let sudo = &ctx.sudo_args();
        run_cmd! {
            info "Disabling $service";
            sudo -n $[sudo] systemctl disable --now $service;
        }
    }

    fn clone_repo(&self, ctx: &ExecContext, url: &str, dest: &Path) -> CmdResult {
        let sudo = &ctx.sudo_args();
        let dest = dest.display().to_string();
        run_cmd! {
            info "Cloning $url into $dest";
            sudo -n $[sudo] git clone --recursive $url $dest;
        }
    }

    fn run_script(&self, ctx: &ExecContext, script: &Path, workdir: &Path) -> CmdResult {
        let sudo = &ctx.sudo_args();
        let script = script.display().to_string();
        let workdir = workdir.display().to_string();
        run_cmd! {
            info "Running $script";
            cd $workdir;
            sudo -n $[sudo] bash $script;
        }
    }

    fn boot_jobs(&self, ctx: &ExecContext) -> FunResult {
        let sudo = &ctx.sudo_args();
        if let Ok(jobs) = run_fun!(sudo -n $[sudo] crontab -l 2>/dev/null) {
            return Ok(jobs);
        }
        // `crontab -l` also fails when the table simply does not exist yet
        let reason = run_fun!(sudo -n $[sudo] bash -c "crontab -l 2>&1 || true")?;
        if reason.contains("no crontab for") {
            Ok(String::new())
        } else {
            Err(Error::other(format!("Failed to list crontab: {reason}")))
        }
    }

    fn replace_boot_jobs(&self, ctx: &ExecContext, content: &str) -> CmdResult {
        let sudo = &ctx.sudo_args();
        let content = content.trim_end();
        run_cmd!(echo $content | sudo -n $[sudo] crontab "-")
    }

    fn spawn_detached(&self, ctx: &ExecContext, argv: &[String], log_file: &Path) -> CmdResult {
        let sudo = &ctx.sudo_args();
        let command = format!(
            "setsid nohup {} >>{} 2>/dev/null </dev/null &",
            shell_join(argv),
            shell_quote(&log_file.display().to_string())
        );
        run_cmd! {
            info "Starting detached: $command";
            sudo -n $[sudo] bash -c $command;
        }
    }
}

pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

pub fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}
