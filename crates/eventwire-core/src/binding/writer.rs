//! Destination writer contracts.
//!
//! A destination declares which encodings it accepts by returning a
//! structured and/or binary view of itself from [`MessageWriter`]:
//!
//! - [`StructuredWriter`] receives one serialized payload in a named format
//! - [`BinaryWriter`] receives one call per attribute, per extension and for
//!   the payload, framed by `start` and `end`
//!
//! The payload's content type travels as the `datacontenttype` attribute.

use super::format::{Format, JSON};
use crate::error::{BindingError, BindingResult};
use crate::foundation::context::EventContext;
use crate::foundation::event::Event;
use crate::foundation::spec::{AttributeDescriptor, AttributeKind, SpecVersion};
use crate::foundation::value::Value;

// ============================================================================
// Writer Traits
// ============================================================================

/// Accepts an event serialized by a structured format.
pub trait StructuredWriter {
    /// The format this destination prefers when it has to encode an event.
    fn format(&self) -> &'static dyn Format {
        &JSON
    }

    /// Returns true if the destination accepts payloads in `format`.
    fn supports_format(&self, format: &dyn Format) -> bool {
        self.format()
            .media_type()
            .eq_ignore_ascii_case(format.media_type())
    }

    /// Writes the serialized event.
    fn set_structured_event(&mut self, format: &dyn Format, payload: &[u8]) -> BindingResult<()>;
}

/// Accepts an event field by field.
pub trait BinaryWriter {
    /// Called once before any attribute.
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        let _ = version;
        Ok(())
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()>;

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()>;

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()>;

    /// Called once after the payload (or the last extension if there is none).
    fn end(&mut self) -> BindingResult<()> {
        Ok(())
    }
}

/// A bind destination.
///
/// Returning `None` from a view declares that the encoding is not accepted.
pub trait MessageWriter {
    fn structured(&mut self) -> Option<&mut dyn StructuredWriter> {
        None
    }

    fn binary(&mut self) -> Option<&mut dyn BinaryWriter> {
        None
    }
}

impl<W: BinaryWriter + ?Sized> BinaryWriter for &mut W {
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        (**self).start(version)
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()> {
        (**self).set_attribute(attribute, value)
    }

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()> {
        (**self).set_extension(name, value)
    }

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()> {
        (**self).set_data(data)
    }

    fn end(&mut self) -> BindingResult<()> {
        (**self).end()
    }
}

impl<W: BinaryWriter + ?Sized> BinaryWriter for Box<W> {
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        (**self).start(version)
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()> {
        (**self).set_attribute(attribute, value)
    }

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()> {
        (**self).set_extension(name, value)
    }

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()> {
        (**self).set_data(data)
    }

    fn end(&mut self) -> BindingResult<()> {
        (**self).end()
    }
}

/// Streams `event` into `writer`: start, attributes in registry order,
/// extensions in name order, payload, end.
pub fn write_binary_event(event: &Event, writer: &mut dyn BinaryWriter) -> BindingResult<()> {
    writer.start(event.spec_version())?;
    for (attribute, value) in event.context().attributes() {
        writer.set_attribute(attribute, value)?;
    }
    for (name, value) in event.context().extensions().iter() {
        writer.set_extension(name, value.clone())?;
    }
    if let Some(data) = event.data() {
        writer.set_data(data)?;
    }
    writer.end()
}

// ============================================================================
// Event Builder
// ============================================================================

/// A binary destination that materializes an [`Event`].
///
/// Required attributes are checked in [`build`](Self::build), so a builder
/// can be fed in any order.
#[derive(Debug, Default)]
pub struct EventBuilder {
    version: Option<SpecVersion>,
    attributes: Vec<(AttributeKind, Value)>,
    extensions: Vec<(String, Value)>,
    data: Option<Vec<u8>>,
}

impl EventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the event, failing if a required attribute never arrived.
    pub fn build(self) -> BindingResult<Event> {
        let version = self.version.ok_or(BindingError::MissingRequiredAttribute {
            attribute: "specversion",
        })?;

        let required = |kind: AttributeKind| -> BindingResult<String> {
            self.attributes
                .iter()
                .rev()
                .find(|(k, _)| *k == kind)
                .map(|(_, v)| v.to_string())
                .ok_or(BindingError::MissingRequiredAttribute {
                    attribute: version
                        .attribute(kind)
                        .map_or(kind.as_str(), |d| d.name()),
                })
        };

        let mut context = EventContext::new(
            version,
            required(AttributeKind::Id)?,
            required(AttributeKind::Source)?,
            required(AttributeKind::Type)?,
        )?;

        for (kind, value) in self.attributes {
            if !kind.is_required() {
                context.set(kind, value)?;
            }
        }
        for (name, value) in self.extensions {
            context.set_extension(&name, value)?;
        }

        let mut event = Event::new(context);
        event.set_data_bytes(self.data);
        Ok(event)
    }
}

impl BinaryWriter for EventBuilder {
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        self.version = Some(version);
        Ok(())
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()> {
        if attribute.kind() == AttributeKind::SpecVersion {
            self.version = Some(value.to_string().parse()?);
        } else {
            self.attributes.push((attribute.kind(), value));
        }
        Ok(())
    }

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()> {
        self.extensions.push((name.to_string(), value));
        Ok(())
    }

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()> {
        self.data = Some(data.to_vec());
        Ok(())
    }
}

impl MessageWriter for EventBuilder {
    fn binary(&mut self) -> Option<&mut dyn BinaryWriter> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        let mut e = Event::new(
            EventContext::new(SpecVersion::V03, "42", "/source", "com.example").unwrap(),
        );
        e.set(AttributeKind::Subject, "sub").unwrap();
        e.set_extension("aaa", "bbb").unwrap();
        e.set_data("text/plain", "payload").unwrap();
        e
    }

    #[test]
    fn test_builder_roundtrip() {
        let original = event();
        let mut builder = EventBuilder::new();
        write_binary_event(&original, &mut builder).unwrap();
        assert_eq!(builder.build().unwrap(), original);
    }

    #[test]
    fn test_builder_missing_required() {
        let mut builder = EventBuilder::new();
        builder.start(SpecVersion::V10).unwrap();
        let id = SpecVersion::V10.attribute(AttributeKind::Id).unwrap();
        builder.set_attribute(id, Value::from("1")).unwrap();

        let err = builder.build().unwrap_err();
        assert_eq!(
            err,
            BindingError::MissingRequiredAttribute {
                attribute: "source"
            }
        );
    }

    #[test]
    fn test_builder_without_version() {
        let err = EventBuilder::new().build().unwrap_err();
        assert!(matches!(
            err,
            BindingError::MissingRequiredAttribute {
                attribute: "specversion"
            }
        ));
    }

    #[test]
    fn test_builder_version_from_attribute() {
        let mut builder = EventBuilder::new();
        let v = SpecVersion::V10;
        builder
            .set_attribute(v.attribute(AttributeKind::SpecVersion).unwrap(), Value::from("0.3"))
            .unwrap();
        for (kind, value) in [
            (AttributeKind::Id, "1"),
            (AttributeKind::Source, "/s"),
            (AttributeKind::Type, "t"),
        ] {
            builder
                .set_attribute(v.attribute(kind).unwrap(), Value::from(value))
                .unwrap();
        }
        assert_eq!(builder.build().unwrap().spec_version(), SpecVersion::V03);
    }
}
