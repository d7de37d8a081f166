//! # Eventwire Core
//!
//! Message binding and transformation for versioned events.
//!
//! An event travels through a transport either **structured** (the whole
//! event serialized in one payload) or **binary** (attributes as discrete
//! fields, payload carried separately). This crate copies events between
//! those representations and applies transformers on the way, without
//! materializing the event when it does not have to.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! The event model:
//! - **Registry**: one immutable attribute table per [`SpecVersion`]
//! - **Values**: typed attribute and extension values ([`Value`])
//! - **Context and event**: [`EventContext`] and [`Event`]
//!
//! ### Binding Layer
//!
//! Moving events around:
//! - **Messages**: [`StructuredMessage`], [`BinaryMessage`], [`EventMessage`]
//! - **Writers**: [`StructuredWriter`], [`BinaryWriter`], [`MessageWriter`]
//! - **Transformers**: [`DeleteAttribute`], [`DeleteExtension`] and friends
//! - **Dispatcher**: [`bind`] picks the cheapest path and runs the finish
//!   hook exactly once
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventwire_core::prelude::*;
//!
//! let message = BinaryMessage::from_headers("ce-", headers, Some(body))?
//!     .into();
//! let chain = Transformers::new().with(DeleteAttribute::new(AttributeKind::Subject));
//! let mut builder = EventBuilder::new();
//!
//! bind(message, &mut builder, &chain, &CancellationToken::new())?;
//! let event = builder.build()?;
//! ```

// Architectural layers
pub mod binding;
pub mod error;
pub mod foundation;

pub use tokio_util::sync::CancellationToken;

// Re-export error types
pub use error::{BindingError, BindingResult};

// Re-export foundation types
pub use foundation::{
    AttributeDescriptor, AttributeKind, Event, EventContext, Extensions, SpecVersion, Value,
    ValueType, descriptors_for, semantic_of,
};

// Re-export binding types
pub use binding::{
    BinaryMessage, BinaryWriter, BindPath, ConvertVersion, DeleteAttribute, DeleteExtension,
    Encoding, EventBuilder, EventFn, EventMessage, FinishFn, Format, JSON, JSON_MEDIA_TYPE,
    JsonFormat, Message, MessageWriter, ReadMessage, StructuredMessage, StructuredWriter,
    Transformer, Transformers, UpdateAttribute, UpdateExtension, bind, to_event, write_event,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::binding::{
        BinaryMessage, BinaryWriter, EventBuilder, EventMessage, Format, Message, MessageWriter,
        ReadMessage, StructuredMessage, StructuredWriter, Transformer, Transformers, bind,
        to_event,
    };
    pub use super::binding::transformer::*;
    pub use super::error::{BindingError, BindingResult};
    pub use super::foundation::*;
    pub use tokio_util::sync::CancellationToken;
}
