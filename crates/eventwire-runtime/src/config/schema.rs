//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use eventwire_core::{
    AttributeKind, BindingError, BindingResult, ConvertVersion, DeleteAttribute, DeleteExtension,
    SpecVersion, Transformer, UpdateAttribute, UpdateExtension, Value,
};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventwireConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Binder settings.
    #[serde(default)]
    pub binding: BindingConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `eventwire_core = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    /// Required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep; 0 keeps all.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the log call.
    #[serde(default)]
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            thread_ids: false,
            file_location: false,
        }
    }
}

fn default_max_files() -> usize {
    5
}

// =============================================================================
// Binding
// =============================================================================

/// Binder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Prefix of binary-mode attribute headers.
    #[serde(default = "default_header_prefix")]
    pub header_prefix: String,

    /// Convert every event to this version after the other transformers.
    #[serde(default)]
    pub target_version: Option<SpecVersion>,

    /// Transformer chain, applied in order.
    #[serde(default)]
    pub transformers: Vec<TransformerConfig>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            header_prefix: default_header_prefix(),
            target_version: None,
            transformers: Vec::new(),
        }
    }
}

fn default_header_prefix() -> String {
    "ce-".to_string()
}

/// A scalar extension value as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    Bool(bool),
    Integer(i32),
    String(String),
}

impl From<ExtensionValue> for Value {
    fn from(value: ExtensionValue) -> Self {
        match value {
            ExtensionValue::Bool(b) => Value::Bool(b),
            ExtensionValue::Integer(i) => Value::Integer(i),
            ExtensionValue::String(s) => Value::String(s),
        }
    }
}

/// One transformer entry, tagged by `kind`.
///
/// ```toml
/// [[binding.transformers]]
/// kind = "delete_attribute"
/// attribute = "subject"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformerConfig {
    DeleteAttribute {
        attribute: AttributeKind,
    },
    DeleteExtension {
        name: String,
    },
    /// Sets the attribute when absent; `value` is its canonical string form.
    AddAttribute {
        attribute: AttributeKind,
        value: String,
    },
    AddExtension {
        name: String,
        value: ExtensionValue,
    },
    ConvertVersion {
        version: SpecVersion,
    },
    /// Stamps the bind time on events without `time`.
    DefaultTime,
}

impl TransformerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeleteAttribute { .. } => "delete_attribute",
            Self::DeleteExtension { .. } => "delete_extension",
            Self::AddAttribute { .. } => "add_attribute",
            Self::AddExtension { .. } => "add_extension",
            Self::ConvertVersion { .. } => "convert_version",
            Self::DefaultTime => "default_time",
        }
    }

    /// Instantiates the transformer.
    pub fn build(&self) -> BindingResult<Arc<dyn Transformer>> {
        let transformer: Arc<dyn Transformer> = match self {
            Self::DeleteAttribute { attribute } => Arc::new(DeleteAttribute::new(*attribute)),
            Self::DeleteExtension { name } => Arc::new(DeleteExtension::new(name.as_str())),
            Self::AddAttribute { attribute, value } => {
                // Every kind exists in 1.0; parse early so bad values fail at load time.
                let descriptor = SpecVersion::V10.attribute(*attribute).ok_or(
                    BindingError::UnknownAttribute {
                        attribute: attribute.as_str(),
                        version: SpecVersion::V10,
                    },
                )?;
                descriptor.coerce(Value::String(value.clone()))?;
                Arc::new(UpdateAttribute::add(*attribute, value.as_str()))
            }
            Self::AddExtension { name, value } => {
                Arc::new(UpdateExtension::add(name, value.clone())?)
            }
            Self::ConvertVersion { version } => Arc::new(ConvertVersion::new(*version)),
            Self::DefaultTime => Arc::new(UpdateAttribute::default_time_now()),
        };
        Ok(transformer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transformer_config_serde() {
        let json = r#"[
            {"kind": "delete_attribute", "attribute": "subject"},
            {"kind": "delete_extension", "name": "aaa"},
            {"kind": "add_extension", "name": "flag", "value": true},
            {"kind": "convert_version", "version": "0.3"},
            {"kind": "default_time"}
        ]"#;
        let parsed: Vec<TransformerConfig> = serde_json::from_str(json).unwrap();

        assert_eq!(
            parsed[0],
            TransformerConfig::DeleteAttribute {
                attribute: AttributeKind::Subject
            }
        );
        assert_eq!(
            parsed[2],
            TransformerConfig::AddExtension {
                name: "flag".into(),
                value: ExtensionValue::Bool(true)
            }
        );
        assert_eq!(
            parsed[3],
            TransformerConfig::ConvertVersion {
                version: SpecVersion::V03
            }
        );
        assert_eq!(parsed[4], TransformerConfig::DefaultTime);
    }

    #[test]
    fn test_build() {
        let delete = TransformerConfig::DeleteAttribute {
            attribute: AttributeKind::Time,
        };
        let built = delete.build().unwrap();
        assert_eq!(built.name(), "delete_attribute");
        assert!(built.supports_streaming());

        let convert = TransformerConfig::ConvertVersion {
            version: SpecVersion::V02,
        };
        assert!(!convert.build().unwrap().supports_streaming());
    }

    #[test]
    fn test_build_rejects_bad_values() {
        let bad_time = TransformerConfig::AddAttribute {
            attribute: AttributeKind::Time,
            value: "yesterday".into(),
        };
        assert!(bad_time.build().is_err());

        let bad_name = TransformerConfig::AddExtension {
            name: "not-valid".into(),
            value: ExtensionValue::Integer(1),
        };
        assert!(bad_name.build().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = EventwireConfig::default();
        assert_eq!(config.binding.header_prefix, "ce-");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.binding.transformers.is_empty());
    }
}
