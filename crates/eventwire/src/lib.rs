//! # Eventwire
//!
//! Moves events between transports without caring how each transport encodes
//! them, and rewrites them on the way.
//!
//! ## Overview
//!
//! An event arrives as a [`Message`](core::Message) in one of three shapes: a
//! structured payload, a binary attribute stream, or an already built event.
//! [`bind`](core::bind) copies it into a destination writer, applying a chain
//! of transformers, and picks the cheapest route that keeps the result
//! correct:
//!
//! ```text
//! ┌────────────────────┐   no transformers, destination speaks the format
//! │ Structured message │──────────────────────────────────────────────▶ structured writer
//! └────────────────────┘
//! ┌────────────────────┐   every transformer streams
//! │   Binary message   │──────▶ [transformer wrappers] ───────────────▶ binary writer
//! └────────────────────┘
//!          any         ─────▶ Event ──▶ transformers ──▶ structured or binary writer
//! ```
//!
//! Every message carries an optional finish hook that runs exactly once per
//! bind, success or failure.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eventwire::prelude::*;
//!
//! let transformers = Transformers::new()
//!     .with(DeleteAttribute::new(AttributeKind::Subject))
//!     .with(DeleteExtension::new("traceparent"));
//!
//! let message = BinaryMessage::from_headers("ce-", headers, Some(body))?;
//! bind(message.into(), &mut outgoing, &transformers, &CancellationToken::new())?;
//! ```
//!
//! Or from configuration:
//!
//! ```rust,ignore
//! let config = eventwire::runtime::config::load_config()?;
//! let binder = eventwire::runtime::init(&config)?;
//! binder.bind(message, &mut outgoing)?;
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `test-util`: canonical events and recording writers for tests

pub use eventwire_core as core;
pub use eventwire_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use eventwire::prelude::*;
/// ```
pub mod prelude {
    pub use eventwire_core::prelude::*;

    pub use eventwire_runtime::{
        Binder, ConfigLoader, EventwireConfig, RuntimeError, RuntimeResult, init,
    };

    pub use eventwire_runtime::prelude::*;
}
