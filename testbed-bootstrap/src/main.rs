mod common;
mod config;
mod deps;
mod host;
mod kernel;
mod machine;
mod network;
mod repo;
mod role;
mod scheduler;
mod state;
mod tuning;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use cmd_lib::*;
use common::DEFAULT_LOG_FILE;
use config::{BootstrapConfig, DEFAULT_CONFIG_FILE, Role};
use host::{ExecContext, Host, SystemHost};
use log::warn;
use machine::{Bootstrap, Outcome};
use scheduler::BootJob;
use state::StateStore;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[clap(
    name = "testbed-bootstrap",
    about = "Bootstrap for paxos testbed nodes"
)]
struct Cli {
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[clap(about = "Run all bootstrap phases, resuming from persisted markers")]
    Run {
        #[arg(long, value_enum)]
        role: Role,
    },
    #[clap(about = "Register the boot-time job and start an immediate run")]
    Install {
        #[arg(long, value_enum)]
        role: Role,
    },
    #[clap(about = "Show persisted phase markers and the running kernel")]
    Status,
}

/// Writes every log record to stderr and appends it to the transcript file.
struct Transcript {
    file: Option<File>,
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = std::io::stderr().write_all(buf);
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        std::io::stderr().flush()
    }
}

/// Where the transcript goes; falls back to the default log when the config
/// cannot be loaded, so that failure is recorded too.
fn transcript_path(config: &Result<BootstrapConfig, std::io::Error>) -> PathBuf {
    match config {
        Ok(config) => config.paths.log_file.clone(),
        Err(_) => PathBuf::from(DEFAULT_LOG_FILE),
    }
}

fn init_logger(log_file: &Path) {
    let file = OpenOptions::new().create(true).append(true).open(log_file);
    let open_error = file.as_ref().err().map(|e| e.to_string());

    env_logger::Builder::new()
        .format(|buf, record| {
            let timestamp = chrono::Local::now().format("%b %d %H:%M:%S").to_string();
            let pid = std::process::id();
            writeln!(
                buf,
                "{} testbed-bootstrap[{}]: {} {}",
                timestamp,
                pid,
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(Transcript {
            file: file.ok(),
        })))
        .init();

    if let Some(e) = open_error {
        warn!("Transcript {} unavailable: {e}", log_file.display());
    }
}

#[cmd_lib::main]
fn main() -> CmdResult {
    let cli = Cli::parse();

    let config = BootstrapConfig::load(&cli.config);
    init_logger(&transcript_path(&config));
    let config = config?;
    let config_path = std::path::absolute(&cli.config)?;

    let host = SystemHost;
    match cli.command {
        Command::Run { role } => {
            let job = boot_job(role, &config_path, &config)?;
            scheduler::register(&host, &ExecContext::AsAdmin, &job)?;
            run(&host, &config, role)
        }
        Command::Install { role } => {
            let job = boot_job(role, &config_path, &config)?;
            scheduler::install(&host, &ExecContext::AsAdmin, &job)?;
            info!("testbed-bootstrap {role} is scheduled");
            Ok(())
        }
        Command::Status => status(&host, &config),
    }
}

fn boot_job(
    role: Role,
    config_path: &Path,
    config: &BootstrapConfig,
) -> Result<BootJob, std::io::Error> {
    let exe = std::env::current_exe()?;
    Ok(BootJob::new(&exe, role, config_path, &config.paths.log_file))
}

fn run(host: &impl Host, config: &BootstrapConfig, role: Role) -> CmdResult {
    info!("Starting testbed-bootstrap for role {role}");
    let state = StateStore::open(&config.paths.state_file)?;
    match Bootstrap::new(host, config, role, state).run()? {
        Outcome::Completed => info!("testbed-bootstrap {role} is done"),
        Outcome::PendingReboot => info!(
            "Rebooting into kernel {}, bootstrap resumes after restart",
            config.kernel.desired_version
        ),
    }
    Ok(())
}

fn status(host: &impl Host, config: &BootstrapConfig) -> CmdResult {
    let state = StateStore::open(&config.paths.state_file)?;
    let running = host.running_kernel()?;
    let desired = &config.kernel.desired_version;
    let kernel_state = if kernel::is_satisfied(&running, desired) {
        "ok"
    } else {
        "pending"
    };
    println!("kernel: running {running}, desired {desired} ({kernel_state})");
    for (marker, record) in state.iter() {
        match record {
            Some(record) => println!("{marker}: set at {}", record.set_at),
            None => println!("{marker}: not set"),
        }
    }
    println!("state file: {}", state.path().display());
    println!("source tree: {}", config.source_dir().display());
    Ok(())
}
