//! Unified error types for the eventwire binding core.
//!
//! Every fallible operation in this crate returns [`BindingResult`]. The bind
//! dispatcher only recovers from [`BindingError::EncodingNotSupported`]; all
//! other variants are surfaced to the caller after the message finish hook ran.

use thiserror::Error;

use crate::foundation::spec::SpecVersion;

// =============================================================================
// Binding Errors
// =============================================================================

/// Errors that can occur while reading, transforming or writing an event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    /// The spec version string is not one of the known registry tables.
    #[error("unsupported spec version '{0}'")]
    UnsupportedSpecVersion(String),

    /// The destination cannot accept the encoding the source offers.
    #[error("encoding not supported: {0}")]
    EncodingNotSupported(String),

    /// A required attribute may be replaced, never removed.
    #[error("cannot unset required attribute '{attribute}'")]
    CannotUnsetRequiredAttribute {
        /// Wire key of the attribute.
        attribute: &'static str,
    },

    /// The attribute does not exist in the event's spec version.
    #[error("attribute '{attribute}' is not defined in spec version {version}")]
    UnknownAttribute {
        /// Semantic name of the attribute.
        attribute: &'static str,
        /// Version of the event context.
        version: SpecVersion,
    },

    /// A message or builder finished without a required attribute.
    #[error("missing required attribute '{attribute}'")]
    MissingRequiredAttribute {
        /// Wire key of the attribute.
        attribute: &'static str,
    },

    /// A value could not be accepted for the named attribute or extension.
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue {
        /// Attribute or extension name.
        name: String,
        /// Reason for rejection.
        reason: String,
    },

    /// Structured format encode or decode failed.
    #[error("codec error ({format}): {reason}")]
    Codec {
        /// Media type of the format.
        format: String,
        /// Underlying failure.
        reason: String,
    },

    /// A user transformer rejected the event.
    #[error("transformer '{transformer}' failed: {reason}")]
    Transformer {
        /// Name of the failing transformer.
        transformer: String,
        /// Reason for failure.
        reason: String,
    },

    /// The caller cancelled the bind.
    #[error("bind cancelled")]
    Cancelled,

    /// The bind unwound before it could report a result.
    #[error("bind aborted: {0}")]
    Aborted(String),
}

impl BindingError {
    /// Creates an encoding-not-supported error.
    pub fn encoding_not_supported(msg: impl Into<String>) -> Self {
        Self::EncodingNotSupported(msg.into())
    }

    /// Creates an invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a codec error for the given format media type.
    pub fn codec(format: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Codec {
            format: format.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a transformer error.
    pub fn transformer(transformer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transformer {
            transformer: transformer.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the dispatcher may fall back to a more general path.
    pub fn is_encoding_not_supported(&self) -> bool {
        matches!(self, Self::EncodingNotSupported(_))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;
