//! Configuration validation utilities.

use std::collections::HashSet;

use eventwire_core::Extensions;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BindingConfig, EventwireConfig, LogOutput, LoggingConfig, TransformerConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &EventwireConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_binding_config(&config.binding)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation(
            "Log filter targets cannot be empty",
        ));
    }

    Ok(())
}

fn validate_binding_config(binding: &BindingConfig) -> ConfigResult<()> {
    if binding.header_prefix.is_empty() {
        return Err(ConfigError::missing_field("binding.header_prefix"));
    }

    if binding.header_prefix.contains(char::is_whitespace) {
        return Err(ConfigError::validation(
            "Header prefix cannot contain whitespace",
        ));
    }

    let mut deleted = HashSet::new();
    for (index, entry) in binding.transformers.iter().enumerate() {
        validate_transformer(index, entry)?;

        if let TransformerConfig::DeleteAttribute { attribute } = entry
            && !deleted.insert(*attribute)
        {
            return Err(ConfigError::invalid_transformer(
                index,
                entry.kind(),
                format!("{} is already deleted", attribute.as_str()),
            ));
        }
    }

    Ok(())
}

/// Validates one transformer entry by building it.
fn validate_transformer(index: usize, entry: &TransformerConfig) -> ConfigResult<()> {
    match entry {
        TransformerConfig::DeleteAttribute { attribute } if attribute.is_required() => {
            return Err(ConfigError::invalid_transformer(
                index,
                entry.kind(),
                format!("{} is required and cannot be deleted", attribute.as_str()),
            ));
        }
        TransformerConfig::DeleteExtension { name } => {
            Extensions::normalize_name(name)
                .map_err(|e| ConfigError::invalid_transformer(index, entry.kind(), e))?;
        }
        _ => {}
    }

    entry
        .build()
        .map(drop)
        .map_err(|e| ConfigError::invalid_transformer(index, entry.kind(), e))
}
