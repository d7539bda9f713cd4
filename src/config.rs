use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::http::connection::ConnectionSettings;
use crate::http::parser::Limits;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_ENV: &str = "WIRELINE_CONFIG";

/// Environment variable overriding the listen address.
pub const LISTEN_ENV: &str = "LISTEN";

/// Ceilings for the parser limits. Anything above these is a typo, not a policy.
const MAX_LINE_LEN_CEILING: usize = 1024 * 1024;
const MAX_HEADER_BYTES_CEILING: usize = 16 * 1024 * 1024;
const MAX_BODY_SIZE_CEILING: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Upper bound on concurrently served connections
    pub max_connections: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// How long shutdown waits for in-flight connections
    pub shutdown_grace_ms: u64,
    pub limits: Limits,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `wireline=debug`. `RUST_LOG` wins.
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            max_connections: 1024,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            shutdown_grace_ms: 5_000,
            limits: Limits::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Loads the config file named by `WIRELINE_CONFIG` (defaults when
    /// unset), then applies the `LISTEN` override.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var(LISTEN_ENV) {
            cfg.listen_addr = addr;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(raw).context("Failed to parse YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.listen_addr.is_empty(), "listen_addr must not be empty");
        ensure!(self.max_connections > 0, "max_connections must be at least 1");
        ensure!(self.read_timeout_ms > 0, "read_timeout_ms must be positive");
        ensure!(self.write_timeout_ms > 0, "write_timeout_ms must be positive");
        ensure!(self.shutdown_grace_ms > 0, "shutdown_grace_ms must be positive");

        let limits = &self.limits;
        ensure!(
            (1..=MAX_LINE_LEN_CEILING).contains(&limits.max_line_len),
            "limits.max_line_len must be between 1 and {}",
            MAX_LINE_LEN_CEILING
        );
        ensure!(limits.max_headers > 0, "limits.max_headers must be positive");
        ensure!(
            limits.max_header_bytes >= limits.max_line_len,
            "limits.max_header_bytes must be at least limits.max_line_len"
        );
        ensure!(
            limits.max_header_bytes <= MAX_HEADER_BYTES_CEILING,
            "limits.max_header_bytes must be at most {}",
            MAX_HEADER_BYTES_CEILING
        );
        ensure!(
            (1..=MAX_BODY_SIZE_CEILING).contains(&limits.max_body_size),
            "limits.max_body_size must be between 1 and {}",
            MAX_BODY_SIZE_CEILING
        );
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            limits: self.limits,
            read_timeout: self.read_timeout(),
            write_timeout: self.write_timeout(),
        }
    }
}
