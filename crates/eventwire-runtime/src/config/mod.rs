//! Configuration module for the eventwire runtime.
//!
//! This module provides figment-based configuration loading and validation
//! for logging and the binder's transformer chain.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BindingConfig, EventwireConfig, ExtensionValue, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, SpanEventConfig, TransformerConfig,
};
pub use validation::validate_config;
