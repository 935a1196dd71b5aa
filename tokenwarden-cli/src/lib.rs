//! Tokenwarden CLI Library
//!
//! Exposes the CLI's configuration loading for testing.

pub mod config;

pub use config::{CliConfig, load_config, load_config_file};
