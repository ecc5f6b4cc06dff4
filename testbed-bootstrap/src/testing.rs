use cmd_lib::{CmdResult, FunResult};
use std::cell::RefCell;
use std::fs;
use std::io::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::host::{ExecContext, Host};

pub const ADDR_LISTING: &str = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: eno1    inet 128.110.218.5/21 brd 128.110.223.255 scope global eno1\\       valid_lft forever preferred_lft forever
4: enp6s0f1    inet 10.10.1.2/24 brd 10.10.1.255 scope global enp6s0f1\\       valid_lft forever preferred_lft forever
";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    RenameInterface { from: String, to: String },
    EnableMulticast { iface: String },
    AddRoute { route: String, iface: String },
    InstallKernel { helper_version: String },
    SetDefaultBootEntry { entry: String },
    Reboot,
    SetWritebackCpumask { mask: String },
    DisableService { service: String },
    InstallPackages { ctx: ExecContext, packages: Vec<String> },
    CloneRepo { ctx: ExecContext, url: String, dest: PathBuf },
    RunScript { ctx: ExecContext, script: PathBuf },
    ReplaceBootJobs { content: String },
    SpawnDetached { argv: Vec<String> },
}

/// In-memory stand-in for the node: records every mutating call and keeps
/// just enough state (kernel, interfaces, routes, tuning, crontab) for
/// repeated runs.
pub struct MockHost {
    kernel: RefCell<String>,
    addresses: RefCell<String>,
    routes: RefCell<Vec<(String, String)>>,
    installed_kernels: RefCell<Vec<String>>,
    release_on_install: String,
    cpumask: RefCell<String>,
    enabled_services: RefCell<Vec<String>>,
    boot_jobs: RefCell<String>,
    repo_files: RefCell<Vec<String>>,
    failures: RefCell<Vec<&'static str>>,
    calls: RefCell<Vec<Call>>,
}

impl MockHost {
    pub fn new(kernel: &str) -> Self {
        Self {
            kernel: RefCell::new(kernel.to_string()),
            addresses: RefCell::new(ADDR_LISTING.to_string()),
            routes: RefCell::new(Vec::new()),
            installed_kernels: RefCell::new(vec![kernel.to_string()]),
            release_on_install: "5.8.0-050800-generic".to_string(),
            cpumask: RefCell::new("00000fff".to_string()),
            enabled_services: RefCell::new(vec!["irqbalance".to_string()]),
            boot_jobs: RefCell::new(String::new()),
            repo_files: RefCell::new(Vec::new()),
            failures: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_addresses(self, listing: &str) -> Self {
        *self.addresses.borrow_mut() = listing.to_string();
        self
    }

    pub fn with_repo_files(self, files: &[&str]) -> Self {
        *self.repo_files.borrow_mut() = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_boot_jobs(self, content: &str) -> Self {
        *self.boot_jobs.borrow_mut() = content.to_string();
        self
    }

    pub fn with_cpumask(self, mask: &str) -> Self {
        *self.cpumask.borrow_mut() = mask.to_string();
        self
    }

    pub fn with_enabled_services(self, services: &[&str]) -> Self {
        *self.enabled_services.borrow_mut() = services.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_route(self, route: &str, iface: &str) -> Self {
        self.routes
            .borrow_mut()
            .push((route.to_string(), iface.to_string()));
        self
    }

    /// Makes the named operation fail from now on.
    pub fn fail_on(&self, op: &'static str) {
        self.failures.borrow_mut().push(op);
    }

    pub fn clear_failures(&self) {
        self.failures.borrow_mut().clear();
    }

    /// Simulates booting into another kernel.
    pub fn set_kernel(&self, kernel: &str) {
        *self.kernel.borrow_mut() = kernel.to_string();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn boot_table(&self) -> String {
        self.boot_jobs.borrow().clone()
    }

    pub fn routes(&self) -> Vec<(String, String)> {
        self.routes.borrow().clone()
    }

    pub fn cpumask(&self) -> String {
        self.cpumask.borrow().clone()
    }

    pub fn enabled_services(&self) -> Vec<String> {
        self.enabled_services.borrow().clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn is_failing(&self, op: &str) -> bool {
        self.failures.borrow().iter().any(|f| *f == op)
    }

    fn check(&self, op: &str) -> CmdResult {
        if self.is_failing(op) {
            return Err(Error::other(format!("{op} failed")));
        }
        Ok(())
    }
}

impl Host for MockHost {
    fn running_kernel(&self) -> FunResult {
        self.check("running_kernel")?;
        Ok(self.kernel.borrow().clone())
    }

    fn ipv4_addresses(&self) -> FunResult {
        self.check("ipv4_addresses")?;
        Ok(self.addresses.borrow().clone())
    }

    fn rename_interface(&self, _ctx: &ExecContext, from: &str, to: &str) -> CmdResult {
        self.record(Call::RenameInterface {
            from: from.to_string(),
            to: to.to_string(),
        });
        self.check("rename_interface")?;
        let renamed = self.addresses.borrow().replace(from, to);
        *self.addresses.borrow_mut() = renamed;
        Ok(())
    }

    fn enable_multicast(&self, _ctx: &ExecContext, iface: &str) -> CmdResult {
        self.record(Call::EnableMulticast {
            iface: iface.to_string(),
        });
        self.check("enable_multicast")
    }

    fn has_route(&self, route: &str, iface: &str) -> Result<bool, Error> {
        self.check("has_route")?;
        Ok(self
            .routes
            .borrow()
            .iter()
            .any(|(r, i)| r == route && i == iface))
    }

    fn add_route(&self, _ctx: &ExecContext, route: &str, iface: &str) -> CmdResult {
        self.record(Call::AddRoute {
            route: route.to_string(),
            iface: iface.to_string(),
        });
        // route shows up anyway, the way a concurrent `ip route add` would leave it
        if self.is_failing("add_route_exists") {
            self.routes
                .borrow_mut()
                .push((route.to_string(), iface.to_string()));
            return Err(Error::other("RTNETLINK answers: File exists"));
        }
        self.check("add_route")?;
        self.routes
            .borrow_mut()
            .push((route.to_string(), iface.to_string()));
        Ok(())
    }

    fn install_kernel(
        &self,
        _ctx: &ExecContext,
        _helper_url: &str,
        helper_version: &str,
    ) -> CmdResult {
        self.record(Call::InstallKernel {
            helper_version: helper_version.to_string(),
        });
        self.check("install_kernel")?;
        let release = self.release_on_install.clone();
        let mut installed = self.installed_kernels.borrow_mut();
        if !self.is_failing("kernel_image") && !installed.contains(&release) {
            installed.push(release);
        }
        Ok(())
    }

    fn installed_kernels(&self) -> Result<Vec<String>, Error> {
        self.check("installed_kernels")?;
        Ok(self.installed_kernels.borrow().clone())
    }

    fn set_default_boot_entry(&self, _ctx: &ExecContext, entry: &str) -> CmdResult {
        self.record(Call::SetDefaultBootEntry {
            entry: entry.to_string(),
        });
        self.check("set_default_boot_entry")
    }

    fn reboot(&self, _ctx: &ExecContext, _delay: Duration) -> CmdResult {
        self.record(Call::Reboot);
        self.check("reboot")
    }

    fn install_packages(&self, ctx: &ExecContext, packages: &[&str]) -> CmdResult {
        self.record(Call::InstallPackages {
            ctx: ctx.clone(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
        });
        self.check("install_packages")
    }

    fn writeback_cpumask(&self) -> FunResult {
        self.check("writeback_cpumask")?;
        Ok(self.cpumask.borrow().clone())
    }

    fn set_writeback_cpumask(&self, _ctx: &ExecContext, mask: &str) -> CmdResult {
        self.record(Call::SetWritebackCpumask {
            mask: mask.to_string(),
        });
        self.check("set_writeback_cpumask")?;
        // sysfs reads the mask back zero-padded
        *self.cpumask.borrow_mut() = format!("{mask:0>8}");
        Ok(())
    }

    fn service_enabled(&self, service: &str) -> Result<bool, Error> {
        self.check("service_enabled")?;
        Ok(self.enabled_services.borrow().iter().any(|s| s == service))
    }

    fn disable_service(&self, _ctx: &ExecContext, service: &str) -> CmdResult {
        self.record(Call::DisableService {
            service: service.to_string(),
        });
        self.check("disable_service")?;
        self.enabled_services.borrow_mut().retain(|s| s != service);
        Ok(())
    }

    fn clone_repo(&self, ctx: &ExecContext, url: &str, dest: &Path) -> CmdResult {
        self.record(Call::CloneRepo {
            ctx: ctx.clone(),
            url: url.to_string(),
            dest: dest.to_path_buf(),
        });
        self.check("clone_repo")?;
        fs::create_dir_all(dest)?;
        for file in self.repo_files.borrow().iter() {
            let path = dest.join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, "#!/bin/bash\n")?;
        }
        Ok(())
    }

    fn run_script(&self, ctx: &ExecContext, script: &Path, _workdir: &Path) -> CmdResult {
        self.record(Call::RunScript {
            ctx: ctx.clone(),
            script: script.to_path_buf(),
        });
        self.check("run_script")
    }

    fn boot_jobs(&self, _ctx: &ExecContext) -> FunResult {
        self.check("boot_jobs")?;
        Ok(self.boot_jobs.borrow().clone())
    }

    fn replace_boot_jobs(&self, _ctx: &ExecContext, content: &str) -> CmdResult {
        self.record(Call::ReplaceBootJobs {
            content: content.to_string(),
        });
        self.check("replace_boot_jobs")?;
        *self.boot_jobs.borrow_mut() = content.to_string();
        Ok(())
    }

    fn spawn_detached(&self, _ctx: &ExecContext, argv: &[String], _log_file: &Path) -> CmdResult {
        self.record(Call::SpawnDetached {
            argv: argv.to_vec(),
        });
        self.check("spawn_detached")
    }
}
