//! Configured binder.
//!
//! A [`Binder`] owns a transformer chain built from configuration and a root
//! cancellation token. Every bind runs under a child of the root, so
//! [`Binder::shutdown`] cancels all binds in flight and refuses new ones.
//!
//! ```rust,ignore
//! use eventwire_runtime::{Binder, config::load_config};
//!
//! let config = load_config()?;
//! let binder = Binder::from_config(&config.binding)?;
//!
//! let message = binder.binary_message(headers, Some(body))?;
//! binder.bind(message, &mut writer)?;
//! ```

use eventwire_core::{
    BinaryMessage, BindPath, ConvertVersion, Event, Message, MessageWriter, Transformers, bind,
    to_event,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{BindingConfig, ConfigError};
use crate::error::RuntimeResult;

/// Binds messages through a shared transformer chain.
///
/// Cloning is cheap; clones share transformers and the root token.
#[derive(Debug, Clone)]
pub struct Binder {
    transformers: Transformers,
    header_prefix: String,
    root: CancellationToken,
}

impl Default for Binder {
    fn default() -> Self {
        Self::new(Transformers::new())
    }
}

impl Binder {
    /// Creates a binder with the conventional `ce-` header prefix.
    pub fn new(transformers: Transformers) -> Self {
        Self {
            transformers,
            header_prefix: BindingConfig::default().header_prefix,
            root: CancellationToken::new(),
        }
    }

    /// Builds the transformer chain described by `config`.
    ///
    /// `target_version`, when set, runs after every configured transformer.
    pub fn from_config(config: &BindingConfig) -> RuntimeResult<Self> {
        let mut transformers = Transformers::new();
        for (index, entry) in config.transformers.iter().enumerate() {
            let transformer = entry
                .build()
                .map_err(|e| ConfigError::invalid_transformer(index, entry.kind(), e))?;
            transformers.push_shared(transformer);
        }
        if let Some(version) = config.target_version {
            transformers.push(ConvertVersion::new(version));
        }

        debug!(
            header_prefix = %config.header_prefix,
            chain = ?transformers,
            streaming = transformers.supports_streaming(),
            "Binder configured"
        );

        Ok(Self::new(transformers).with_header_prefix(config.header_prefix.as_str()))
    }

    pub fn with_header_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.header_prefix = prefix.into();
        self
    }

    pub fn transformers(&self) -> &Transformers {
        &self.transformers
    }

    pub fn header_prefix(&self) -> &str {
        &self.header_prefix
    }

    /// A token cancelled by [`shutdown`](Self::shutdown); cancelling it only
    /// affects binds that use it.
    pub fn token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Binds `message` into `writer` under a fresh child token.
    pub fn bind(
        &self,
        message: Message,
        writer: &mut dyn MessageWriter,
    ) -> RuntimeResult<BindPath> {
        self.bind_with_token(message, writer, &self.token())
    }

    /// Binds under a caller-owned token, typically from [`token`](Self::token).
    ///
    /// After shutdown the bind fails with `Cancelled` even if `cancel` is live.
    pub fn bind_with_token(
        &self,
        message: Message,
        writer: &mut dyn MessageWriter,
        cancel: &CancellationToken,
    ) -> RuntimeResult<BindPath> {
        let cancel = if self.root.is_cancelled() {
            &self.root
        } else {
            cancel
        };
        Ok(bind(message, writer, &self.transformers, cancel)?)
    }

    /// Materializes `message` with the chain applied.
    pub fn to_event(&self, message: Message) -> RuntimeResult<Event> {
        Ok(to_event(message, &self.transformers)?)
    }

    /// Parses a binary message from transport headers using the configured
    /// prefix.
    pub fn binary_message<'a, I>(&self, headers: I, data: Option<Vec<u8>>) -> RuntimeResult<Message>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let message = BinaryMessage::from_headers(&self.header_prefix, headers, data)?;
        Ok(message.into())
    }

    /// Cancels every bind in flight and every later one.
    pub fn shutdown(&self) {
        if !self.root.is_cancelled() {
            info!("Binder shutting down");
            self.root.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}
