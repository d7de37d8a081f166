//! Eventwire Runtime - configuration and orchestration for eventwire bindings.
//!
//! This crate provides:
//! - Configuration loading and validation (`config`)
//! - Logging setup (`logging`)
//! - A configured [`Binder`] that drives binds with a shared transformer
//!   chain and a shutdown token
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use eventwire_runtime::config::load_config;
//!
//! let config = load_config()?;
//! let binder = eventwire_runtime::init(&config)?;
//!
//! let message = binder.binary_message(request.headers(), Some(request.body()))?;
//! binder.bind(message, &mut outgoing)?;
//! ```
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [binding]
//! header_prefix = "ce-"
//! target_version = "1.0"
//!
//! [[binding.transformers]]
//! kind = "delete_extension"
//! name = "traceparent"
//! ```

pub mod binder;
pub mod config;
pub mod error;
pub mod logging;

// Re-exports
pub use binder::Binder;
pub use config::{
    BindingConfig, ConfigError, ConfigLoader, ConfigResult, EventwireConfig, LoggingConfig,
    TransformerConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

use tracing::info;

/// Validates `config`, initializes logging and builds a [`Binder`].
///
/// Logging is left alone if a global subscriber is already installed.
pub fn init(config: &EventwireConfig) -> RuntimeResult<Binder> {
    config::validate_config(config)?;
    logging::init_from_config(&config.logging);

    let binder = Binder::from_config(&config.binding)?;
    info!(
        log_level = %config.logging.level,
        header_prefix = %config.binding.header_prefix,
        transformers = binder.transformers().len(),
        "Eventwire runtime initialized"
    );
    Ok(binder)
}

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
