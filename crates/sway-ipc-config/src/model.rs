//! Configuration data model

use std::path::PathBuf;
use std::time::Duration;

use sway_ipc::{ClientConfig, EventKind};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/sway-ipc/config.kdl";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub global: GlobalConfig,
    /// Events to subscribe to when none are given on the command line
    pub subscribe: Vec<EventKind>,
}

/// Global settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfig {
    /// Socket path; `$SWAYSOCK` is used when unset
    pub socket: Option<PathBuf>,
    pub log_level: LogLevel,
    /// Extra connection attempts after the first fails
    pub connect_retries: u32,
    /// Reply timeout in milliseconds; wait forever when unset
    pub reply_timeout_ms: Option<u64>,
}

impl Config {
    /// Client settings for `socket_path`, using this config's retry and
    /// timeout options
    pub fn client_config(&self, socket_path: PathBuf) -> ClientConfig {
        ClientConfig {
            socket_path,
            connect_retries: self.global.connect_retries,
            reply_timeout: self.global.reply_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}
