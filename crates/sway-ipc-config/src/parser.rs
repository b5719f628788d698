//! KDL configuration parser

use std::path::Path;

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse the configuration file if it exists, otherwise use defaults
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    parse_config(path)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl reports spans with its own miette version
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "subscribe" => {
                config.subscribe = parse_subscribe(node)?;
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "socket" => {
                    let val = first_string(child)?;
                    global.socket = Some(shellexpand::tilde(val).into_owned().into());
                }
                "log-level" => {
                    let val = first_string(child)?;
                    global.log_level = val
                        .parse()
                        .map_err(|message| ConfigError::Invalid { message })?;
                }
                "connect-retries" => {
                    let val = first_integer(child)?;
                    global.connect_retries =
                        u32::try_from(val).map_err(|_| ConfigError::Invalid {
                            message: format!("connect-retries must be between 0 and {}", u32::MAX),
                        })?;
                }
                "reply-timeout-ms" => {
                    let val = first_integer(child)?;
                    if val <= 0 {
                        return Err(ConfigError::Invalid {
                            message: "reply-timeout-ms must be a positive number".to_string(),
                        });
                    }
                    global.reply_timeout_ms = Some(val as u64);
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_subscribe(node: &kdl::KdlNode) -> Result<Vec<sway_ipc::EventKind>, ConfigError> {
    let mut kinds = Vec::new();

    for entry in node.entries() {
        let name = entry.value().as_string().ok_or_else(|| ConfigError::Invalid {
            message: "subscribe entries must be event names".to_string(),
        })?;
        let kind = name
            .parse()
            .map_err(|message| ConfigError::Invalid { message })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    Ok(kinds)
}

fn first_value(node: &kdl::KdlNode) -> Result<&kdl::KdlValue, ConfigError> {
    node.entries()
        .first()
        .map(|e| e.value())
        .ok_or_else(|| ConfigError::MissingValue {
            field: node.name().value().to_string(),
        })
}

fn first_string(node: &kdl::KdlNode) -> Result<&str, ConfigError> {
    first_value(node)?
        .as_string()
        .ok_or_else(|| ConfigError::Invalid {
            message: format!("`{}` must be a string", node.name().value()),
        })
}

fn first_integer(node: &kdl::KdlNode) -> Result<i64, ConfigError> {
    first_value(node)?
        .as_i64()
        .ok_or_else(|| ConfigError::Invalid {
            message: format!("`{}` must be an integer", node.name().value()),
        })
}
