//! Configuration for the docchat pipeline
//!
//! Supports loading configuration from:
//! - YAML/TOML files (config/default, config/{env})
//! - Environment variables (DOCCHAT_ prefix, `__` separator)
//!
//! All settings structs deserialize with per-field defaults, so an empty
//! config file yields a fully working development setup.

pub mod settings;

pub use settings::{load_settings, LlmSettings, RagConfig, Settings, VectorStoreConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
