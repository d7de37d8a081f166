//! Foundation layer - the event model.
//!
//! This module contains the data the binding layer moves around:
//! - Attribute registry, one immutable table per spec version
//! - Typed values and case-insensitive extensions
//! - The versioned context and the event itself

pub mod context;
pub mod event;
pub mod extensions;
pub mod spec;
pub mod value;

pub use context::EventContext;
pub use event::Event;
pub use extensions::Extensions;
pub use spec::{AttributeDescriptor, AttributeKind, SpecVersion, descriptors_for, semantic_of};
pub use value::{Value, ValueType};
