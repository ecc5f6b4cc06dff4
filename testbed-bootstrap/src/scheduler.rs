use cmd_lib::*;
use std::path::{Path, PathBuf};

use crate::config::Role;
use crate::host::{ExecContext, Host, shell_join, shell_quote};

/// The `run` invocation registered to start at every boot.
#[derive(Debug, Clone)]
pub struct BootJob {
    argv: Vec<String>,
    log_file: PathBuf,
}

impl BootJob {
    pub fn new(exe: &Path, role: Role, config_path: &Path, log_file: &Path) -> Self {
        let argv = vec![
            exe.display().to_string(),
            "run".to_string(),
            "--role".to_string(),
            role.to_string(),
            "--config".to_string(),
            config_path.display().to_string(),
        ];
        Self {
            argv,
            log_file: log_file.to_path_buf(),
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The `@reboot` entry. cron turns a bare `%` into a newline, so every
    /// `%` is escaped after shell quoting.
    pub fn crontab_line(&self) -> String {
        let command = format!(
            "{} >>{} 2>/dev/null",
            shell_join(&self.argv),
            shell_quote(&self.log_file.display().to_string())
        );
        format!("@reboot {}", command.replace('%', r"\%"))
    }
}

/// Returns the table with `line` appended, or `None` if an identical line is
/// already present. Other lines are kept as they are.
pub fn merge_boot_job(existing: &str, line: &str) -> Option<String> {
    if existing.lines().any(|l| l.trim() == line) {
        return None;
    }
    let mut content = existing.trim_end().to_string();
    if !content.is_empty() {
        content.push('\n');
    }
    content.push_str(line);
    content.push('\n');
    Some(content)
}

pub fn register(host: &impl Host, ctx: &ExecContext, job: &BootJob) -> CmdResult {
    let line = job.crontab_line();
    let existing = host.boot_jobs(ctx)?;
    match merge_boot_job(&existing, &line) {
        Some(content) => {
            info!("Registering boot job: {line}");
            host.replace_boot_jobs(ctx, &content)
        }
        None => {
            info!("Boot job already registered");
            Ok(())
        }
    }
}

/// Registers the boot job and starts one run right away, so a node that
/// needs no kernel change does not wait for a reboot.
pub fn install(host: &impl Host, ctx: &ExecContext, job: &BootJob) -> CmdResult {
    register(host, ctx, job)?;
    host.spawn_detached(ctx, job.argv(), &job.log_file)
}
