//! Configuration parsing for sway-ipc
//!
//! This crate reads the KDL configuration file and turns it into the
//! connection settings used by the `sway-ipc` client.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{load_config, parse_config, parse_config_str};
