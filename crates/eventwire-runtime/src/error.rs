//! Runtime error types.

use eventwire_core::BindingError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while setting up or driving a binder.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A bind or message construction failed.
    #[error(transparent)]
    Binding(#[from] BindingError),
}

impl RuntimeError {
    /// Returns the binding error, if this is one.
    pub fn as_binding(&self) -> Option<&BindingError> {
        match self {
            Self::Binding(e) => Some(e),
            Self::Config(_) => None,
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
