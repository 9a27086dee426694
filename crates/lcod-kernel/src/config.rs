//! Kernel configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Severity of `kernel/log` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Only fatal events are emitted.
    #[default]
    Fatal,
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(LogLevel::default()),
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => anyhow::bail!("Unsupported log level: {other}"),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Kernel configuration.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Minimum level of `kernel/log` events.
    pub log_level: LogLevel,

    /// Directory relative paths are resolved against.
    pub working_directory: PathBuf,

    /// Cancel a run after this long.
    pub timeout: Option<Duration>,
}

impl KernelConfig {
    /// Load a `.env` file if present, then read the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load variables from the given env file, then read the environment.
    ///
    /// Variables already set in the process take precedence over the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to load env file: {}", path.display()))?;
        Self::from_env()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let log_level = match std::env::var("LCOD_LOG_LEVEL") {
            Ok(level) => level.parse().context("Invalid LCOD_LOG_LEVEL")?,
            Err(_) => LogLevel::default(),
        };

        let working_directory = std::env::var("LCOD_WORKING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_working_directory());

        let timeout = std::env::var("LCOD_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            log_level,
            working_directory,
            timeout,
        })
    }

    /// Set the run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the kernel log level.
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }
}

fn default_working_directory() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            working_directory: default_working_directory(),
            timeout: None,
        }
    }
}
