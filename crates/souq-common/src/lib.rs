//! # Souq Common
//!
//! Shared plumbing for the Souq crates.
//!
//! ## Features
//!
//! - Logging configuration and setup on top of `tracing-subscriber`
//! - JSON configuration loading with per-field defaults

pub mod config;
pub mod logging;

pub use config::{load_config, parse_config, ConfigError};
pub use logging::{init_logging, LogConfig, LogFormat};
