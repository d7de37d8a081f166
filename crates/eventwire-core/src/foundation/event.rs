//! The in-memory event.

use super::context::EventContext;
use super::spec::{AttributeKind, SpecVersion};
use super::value::Value;
use crate::error::BindingResult;

/// An event: versioned context plus an optional opaque payload.
///
/// The payload's content type lives in the context as
/// [`AttributeKind::DataContentType`]. `Clone` produces a fully independent
/// copy; no backing storage is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    context: EventContext,
    data: Option<Vec<u8>>,
}

impl Event {
    /// Creates an event without payload.
    pub fn new(context: EventContext) -> Self {
        Self {
            context,
            data: None,
        }
    }

    pub fn context(&self) -> &EventContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut EventContext {
        &mut self.context
    }

    pub fn spec_version(&self) -> SpecVersion {
        self.context.version()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Sets the payload together with its declared content type.
    pub fn set_data(
        &mut self,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> BindingResult<()> {
        self.context
            .set(AttributeKind::DataContentType, content_type.into())?;
        self.data = Some(data.into());
        Ok(())
    }

    /// Replaces the raw payload, leaving the content type untouched.
    pub fn set_data_bytes(&mut self, data: Option<Vec<u8>>) {
        self.data = data;
    }

    pub fn into_parts(self) -> (EventContext, Option<Vec<u8>>) {
        (self.context, self.data)
    }

    // Context shortcuts

    pub fn get(&self, kind: AttributeKind) -> Option<Value> {
        self.context.get(kind)
    }

    pub fn set(&mut self, kind: AttributeKind, value: impl Into<Value>) -> BindingResult<()> {
        self.context.set(kind, value)
    }

    pub fn unset(&mut self, kind: AttributeKind) -> BindingResult<()> {
        self.context.unset(kind)
    }

    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.context.extension(name)
    }

    pub fn set_extension(&mut self, name: &str, value: impl Into<Value>) -> BindingResult<()> {
        self.context.set_extension(name, value)
    }

    pub fn unset_extension(&mut self, name: &str) -> Option<Value> {
        self.context.unset_extension(name)
    }
}

impl From<EventContext> for Event {
    fn from(context: EventContext) -> Self {
        Self::new(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event::new(EventContext::new(SpecVersion::V10, "1", "/source", "com.example").unwrap())
    }

    #[test]
    fn test_set_data_sets_content_type() {
        let mut e = event();
        e.set_data("text/plain", "hello").unwrap();
        assert_eq!(e.data(), Some(&b"hello"[..]));
        assert_eq!(e.context().data_content_type(), Some("text/plain"));
    }

    #[test]
    fn test_clone_shares_nothing() {
        let mut original = event();
        original.set_data("text/plain", "hello").unwrap();

        let mut copy = original.clone();
        copy.set_data_bytes(Some(b"changed".to_vec()));
        copy.set(AttributeKind::Subject, "s").unwrap();

        assert_eq!(original.data(), Some(&b"hello"[..]));
        assert_eq!(original.get(AttributeKind::Subject), None);
        assert_ne!(original, copy);
    }
}
