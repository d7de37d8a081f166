//! Binding layer - moving events between encodings.
//!
//! This module contains everything between a source message and a
//! destination writer:
//! - Message variants for structured, binary and materialized events
//! - Writer contracts a destination implements
//! - Structured formats (JSON built in)
//! - Transformers with whole-event and streaming forms
//! - The bind dispatcher with its finish and cancellation guarantees

pub mod bind;
pub mod encoding;
pub mod format;
pub mod message;
pub mod transformer;
pub mod writer;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use bind::{BindPath, bind, to_event, write_event};
pub use encoding::Encoding;
pub use format::{Format, JSON, JSON_MEDIA_TYPE, JsonFormat, lookup};
pub use message::{BinaryMessage, EventMessage, FinishFn, Message, ReadMessage, StructuredMessage};
pub use transformer::{
    ConvertVersion, DeleteAttribute, DeleteExtension, EventFn, Transformer, Transformers,
    UpdateAttribute, UpdateExtension, Updater,
};
pub use writer::{BinaryWriter, EventBuilder, MessageWriter, StructuredWriter, write_binary_event};
