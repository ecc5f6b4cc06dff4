use clap::ValueEnum;
use serde::Deserialize;
use std::io::Error;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display, EnumString};

use crate::common::{DEFAULT_LOG_FILE, DEFAULT_STATE_FILE};

pub const DEFAULT_CONFIG_FILE: &str = "/etc/testbed-bootstrap.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Client,
    Replica,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub kernel: KernelConfig,
    pub repo: RepoConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KernelConfig {
    pub desired_version: String,
    #[serde(default = "default_helper_url")]
    pub helper_url: String,
    #[serde(default = "default_grub_entry_prefix")]
    pub grub_entry_prefix: String,
    #[serde(default = "default_reboot_delay_secs")]
    pub reboot_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub url: String,
    pub operator_user: String,
    #[serde(default)]
    pub operator_home: Option<PathBuf>,
    #[serde(default)]
    pub dir_name: Option<String>,
    #[serde(default = "default_prepare_scripts")]
    pub prepare_scripts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_subnet_prefix")]
    pub subnet_prefix: String,
    #[serde(default = "default_interface_name")]
    pub interface_name: String,
    #[serde(default = "default_multicast_route")]
    pub multicast_route: String,
}

/// Per-node performance settings. An empty `writeback_cpumask` leaves the
/// writeback workqueue alone.
#[derive(Debug, Clone, Deserialize)]
pub struct TuningConfig {
    #[serde(default = "default_writeback_cpumask")]
    pub writeback_cpumask: String,
    #[serde(default = "default_disable_irqbalance")]
    pub disable_irqbalance: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            subnet_prefix: default_subnet_prefix(),
            interface_name: default_interface_name(),
            multicast_route: default_multicast_route(),
        }
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            writeback_cpumask: default_writeback_cpumask(),
            disable_irqbalance: default_disable_irqbalance(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            log_file: default_log_file(),
        }
    }
}

fn default_helper_url() -> String {
    "https://raw.githubusercontent.com/pimlie/ubuntu-mainline-kernel.sh/master/ubuntu-mainline-kernel.sh"
        .to_string()
}

fn default_grub_entry_prefix() -> String {
    "Advanced options for Ubuntu>Ubuntu, with Linux ".to_string()
}

fn default_reboot_delay_secs() -> u64 {
    5
}

fn default_prepare_scripts() -> Vec<String> {
    vec![
        "scripts/download_sources.sh".to_string(),
        "scripts/prepare_build.sh".to_string(),
    ]
}

fn default_subnet_prefix() -> String {
    "10.10.1.".to_string()
}

fn default_interface_name() -> String {
    "exp0".to_string()
}

fn default_multicast_route() -> String {
    "224.0.0.0/4".to_string()
}

// cpu 1 only, leaving cpu 0 to the testbed processes
fn default_writeback_cpumask() -> String {
    "2".to_string()
}

fn default_disable_irqbalance() -> bool {
    true
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

impl BootstrapConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::new(
                e.kind(),
                format!("Failed to read config {}: {e}", path.display()),
            )
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, Error> {
        let config: BootstrapConfig = toml::from_str(content)
            .map_err(|e| Error::other(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.kernel.desired_version.trim().is_empty() {
            return Err(Error::other("kernel.desired_version must not be empty"));
        }
        if self.repo.url.trim().is_empty() {
            return Err(Error::other("repo.url must not be empty"));
        }
        if self.repo.operator_user.trim().is_empty() || self.repo.operator_user == "root" {
            return Err(Error::other(
                "repo.operator_user must name a non-privileged user",
            ));
        }
        if self.network.subnet_prefix.is_empty() {
            return Err(Error::other("network.subnet_prefix must not be empty"));
        }
        if !self
            .tuning
            .writeback_cpumask
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == ',')
        {
            return Err(Error::other(format!(
                "tuning.writeback_cpumask {} is not a hex cpumask",
                self.tuning.writeback_cpumask
            )));
        }
        if self.repo_dir_name().is_empty() {
            return Err(Error::other(format!(
                "Cannot derive a directory name from repo.url {}",
                self.repo.url
            )));
        }
        Ok(())
    }

    pub fn operator_home(&self) -> PathBuf {
        self.repo
            .operator_home
            .clone()
            .unwrap_or_else(|| Path::new("/home").join(&self.repo.operator_user))
    }

    pub fn repo_dir_name(&self) -> String {
        if let Some(name) = &self.repo.dir_name {
            return name.clone();
        }
        self.repo
            .url
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .to_string()
    }

    pub fn source_dir(&self) -> PathBuf {
        self.operator_home().join(self.repo_dir_name())
    }
}
