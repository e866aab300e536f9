pub mod parser;
pub mod validator;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub beanstalkd: BeanstalkdConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeanstalkdConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Timeout for connects and request round-trips, in milliseconds.
    /// Zero disables the bound.
    #[serde(default)]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_workers")]
    pub tube_stat_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Tube name mapping rules; hot-reloaded while serving.
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,
    /// Stat fields to collect; loaded once at startup.
    #[serde(default)]
    pub field_file: Option<PathBuf>,
}

// Default values
fn default_address() -> String {
    "localhost:11300".to_string()
}

fn default_workers() -> usize {
    1
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_telemetry_path() -> String {
    "/metrics".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for BeanstalkdConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            connection_timeout_ms: 0,
            tube_stat_workers: default_workers(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            telemetry_path: default_telemetry_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        parser::parse_config(path)
    }

    pub fn validate(&self) -> Result<Vec<String>> {
        validator::validate_config(self)
    }

    /// The connection timeout as a `Duration`; zero means unbounded.
    pub fn connection_timeout(&self) -> Option<Duration> {
        match self.beanstalkd.connection_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
