//! Readable messages.
//!
//! A [`Message`] is one of three representations of the same event:
//!
//! - [`StructuredMessage`]: a serialized payload in a known [`Format`]
//! - [`BinaryMessage`]: attributes and extensions as discrete fields plus an
//!   opaque payload
//! - [`EventMessage`]: an already materialized [`Event`]
//!
//! Every message may carry a finish hook. The hook is consumed when it runs,
//! so it can never fire twice.

use std::collections::BTreeMap;
use std::fmt;

use super::encoding::Encoding;
use super::format::Format;
use super::writer::{BinaryWriter, StructuredWriter, write_binary_event};
use crate::error::{BindingError, BindingResult};
use crate::foundation::event::Event;
use crate::foundation::extensions::Extensions;
use crate::foundation::spec::{AttributeKind, SpecVersion};
use crate::foundation::value::Value;

/// Completion hook of a message; receives the outcome of the bind.
pub type FinishFn = Box<dyn FnOnce(Option<&BindingError>) -> BindingResult<()> + Send>;

/// Read access to a message in its native encoding.
pub trait ReadMessage {
    fn encoding(&self) -> Encoding;

    /// Hands the serialized event to `writer`.
    ///
    /// Fails with [`BindingError::EncodingNotSupported`] before writing
    /// anything if the message is not structured or `writer` rejects its
    /// format.
    fn read_structured(&mut self, writer: &mut dyn StructuredWriter) -> BindingResult<()>;

    /// Streams the event into `writer` field by field.
    fn read_binary(&mut self, writer: &mut dyn BinaryWriter) -> BindingResult<()>;
}

// ============================================================================
// Structured
// ============================================================================

pub struct StructuredMessage {
    format: &'static dyn Format,
    payload: Vec<u8>,
    on_finish: Option<FinishFn>,
}

impl StructuredMessage {
    pub fn new(format: &'static dyn Format, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            format,
            payload: payload.into(),
            on_finish: None,
        }
    }

    /// Serializes `event` with `format`.
    pub fn from_event(format: &'static dyn Format, event: &Event) -> BindingResult<Self> {
        Ok(Self::new(format, format.marshal(event)?))
    }

    pub fn format(&self) -> &'static dyn Format {
        self.format
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl ReadMessage for StructuredMessage {
    fn encoding(&self) -> Encoding {
        Encoding::Structured
    }

    fn read_structured(&mut self, writer: &mut dyn StructuredWriter) -> BindingResult<()> {
        if !writer.supports_format(self.format) {
            return Err(BindingError::encoding_not_supported(format!(
                "destination does not accept {}",
                self.format.media_type()
            )));
        }
        writer.set_structured_event(self.format, &self.payload)
    }

    fn read_binary(&mut self, _writer: &mut dyn BinaryWriter) -> BindingResult<()> {
        Err(BindingError::encoding_not_supported(
            "structured message cannot be read as binary",
        ))
    }
}

impl fmt::Debug for StructuredMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredMessage")
            .field("format", &self.format.media_type())
            .field("payload_len", &self.payload.len())
            .field("pending", &self.on_finish.is_some())
            .finish()
    }
}

// ============================================================================
// Binary
// ============================================================================

/// Header-style message.
///
/// Attributes are validated against the registry table of the message's
/// version when they are added; required attributes are only checked by the
/// destination.
pub struct BinaryMessage {
    version: SpecVersion,
    attributes: BTreeMap<AttributeKind, Value>,
    extensions: Extensions,
    data: Option<Vec<u8>>,
    on_finish: Option<FinishFn>,
}

impl BinaryMessage {
    pub fn new(version: SpecVersion) -> Self {
        Self {
            version,
            attributes: BTreeMap::new(),
            extensions: Extensions::new(),
            data: None,
            on_finish: None,
        }
    }

    /// Copies the fields of `event`.
    pub fn from_event(event: &Event) -> Self {
        let context = event.context();
        let attributes = context
            .attributes()
            .filter(|(d, _)| d.kind() != AttributeKind::SpecVersion)
            .map(|(d, v)| (d.kind(), v))
            .collect();
        Self {
            version: context.version(),
            attributes,
            extensions: context.extensions().clone(),
            data: event.data().map(<[u8]>::to_vec),
            on_finish: None,
        }
    }

    /// Parses transport headers.
    ///
    /// Headers starting with `prefix` (case-insensitive) carry attributes and
    /// extensions; `Content-Type` carries `datacontenttype`. The prefixed
    /// `specversion` header selects the registry table.
    pub fn from_headers<'a, I>(prefix: &str, headers: I, data: Option<Vec<u8>>) -> BindingResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let headers: Vec<(&str, &str)> = headers.into_iter().collect();
        let strip = |key: &str| -> Option<String> {
            let head = key.get(..prefix.len())?;
            (key.len() > prefix.len() && head.eq_ignore_ascii_case(prefix))
                .then(|| key[prefix.len()..].to_ascii_lowercase())
        };

        let version: SpecVersion = headers
            .iter()
            .find(|&&(key, _)| strip(key).as_deref() == Some("specversion"))
            .map(|&(_, raw)| raw)
            .ok_or(BindingError::MissingRequiredAttribute {
                attribute: "specversion",
            })?
            .parse()?;

        let mut message = Self::new(version);
        for (key, raw) in headers {
            if key.eq_ignore_ascii_case("content-type") {
                message
                    .attributes
                    .insert(AttributeKind::DataContentType, Value::String(raw.to_string()));
                continue;
            }
            let Some(name) = strip(key) else {
                continue;
            };
            match version.semantic_of(&name) {
                Some(d) if d.kind() == AttributeKind::SpecVersion => {}
                Some(d) => {
                    let value = Value::parse(d.name(), d.value_type(), raw)?;
                    message.attributes.insert(d.kind(), d.coerce(value)?);
                }
                None => {
                    Extensions::check_reserved(version, &name)?;
                    message.extensions.insert(&name, Value::String(raw.to_string()))?;
                }
            }
        }
        message.data = data;
        Ok(message)
    }

    /// Adds or replaces an attribute, converting `value` to its type.
    pub fn with_attribute(mut self, kind: AttributeKind, value: impl Into<Value>) -> BindingResult<Self> {
        let descriptor = self
            .version
            .attribute(kind)
            .ok_or(BindingError::UnknownAttribute {
                attribute: kind.as_str(),
                version: self.version,
            })?;
        if kind == AttributeKind::SpecVersion {
            return Err(BindingError::invalid_value(
                descriptor.name(),
                "fixed when the message is created",
            ));
        }
        self.attributes.insert(kind, descriptor.coerce(value.into())?);
        Ok(self)
    }

    pub fn with_extension(mut self, name: &str, value: impl Into<Value>) -> BindingResult<Self> {
        Extensions::check_reserved(self.version, name)?;
        self.extensions.insert(name, value.into())?;
        Ok(self)
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn version(&self) -> SpecVersion {
        self.version
    }

    pub fn attribute(&self, kind: AttributeKind) -> Option<&Value> {
        self.attributes.get(&kind)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }
}

impl ReadMessage for BinaryMessage {
    fn encoding(&self) -> Encoding {
        Encoding::Binary
    }

    fn read_structured(&mut self, _writer: &mut dyn StructuredWriter) -> BindingResult<()> {
        Err(BindingError::encoding_not_supported(
            "binary message cannot be read as structured",
        ))
    }

    fn read_binary(&mut self, writer: &mut dyn BinaryWriter) -> BindingResult<()> {
        writer.start(self.version)?;
        // Registry order: specversion first, then the table order.
        for descriptor in self.version.descriptors() {
            let value = match descriptor.kind() {
                AttributeKind::SpecVersion => Value::String(self.version.as_str().to_string()),
                kind => match self.attributes.get(&kind) {
                    Some(value) => value.clone(),
                    None => continue,
                },
            };
            writer.set_attribute(descriptor, value)?;
        }
        for (name, value) in self.extensions.iter() {
            writer.set_extension(name, value.clone())?;
        }
        if let Some(data) = &self.data {
            writer.set_data(data)?;
        }
        writer.end()
    }
}

impl fmt::Debug for BinaryMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryMessage")
            .field("version", &self.version)
            .field("attributes", &self.attributes)
            .field("extensions", &self.extensions)
            .field("data_len", &self.data.as_ref().map(Vec::len))
            .field("pending", &self.on_finish.is_some())
            .finish()
    }
}

// ============================================================================
// Event wrapper
// ============================================================================

/// Wraps a materialized event so it can be bound like any other message.
pub struct EventMessage {
    event: Event,
    on_finish: Option<FinishFn>,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            on_finish: None,
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn into_event(self) -> Event {
        self.event
    }
}

impl ReadMessage for EventMessage {
    fn encoding(&self) -> Encoding {
        Encoding::Unknown
    }

    /// Serializes the event with the writer's preferred format.
    fn read_structured(&mut self, writer: &mut dyn StructuredWriter) -> BindingResult<()> {
        let format = writer.format();
        let payload = format.marshal(&self.event)?;
        writer.set_structured_event(format, &payload)
    }

    fn read_binary(&mut self, writer: &mut dyn BinaryWriter) -> BindingResult<()> {
        write_binary_event(&self.event, writer)
    }
}

impl fmt::Debug for EventMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMessage")
            .field("event", &self.event)
            .field("pending", &self.on_finish.is_some())
            .finish()
    }
}

// ============================================================================
// Message
// ============================================================================

/// Any readable message.
#[derive(Debug)]
pub enum Message {
    Structured(StructuredMessage),
    Binary(BinaryMessage),
    Event(EventMessage),
}

impl Message {
    fn hook(&mut self) -> &mut Option<FinishFn> {
        match self {
            Self::Structured(m) => &mut m.on_finish,
            Self::Binary(m) => &mut m.on_finish,
            Self::Event(m) => &mut m.on_finish,
        }
    }

    /// Attaches a finish hook, replacing any previous one.
    pub fn on_finish<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(Option<&BindingError>) -> BindingResult<()> + Send + 'static,
    {
        *self.hook() = Some(Box::new(hook));
        self
    }

    /// Returns true while the finish hook has not run.
    pub fn is_pending(&self) -> bool {
        match self {
            Self::Structured(m) => m.on_finish.is_some(),
            Self::Binary(m) => m.on_finish.is_some(),
            Self::Event(m) => m.on_finish.is_some(),
        }
    }

    /// Runs the finish hook with the outcome of the bind.
    ///
    /// Subsequent calls are no-ops.
    pub fn finish(&mut self, error: Option<&BindingError>) -> BindingResult<()> {
        match self.hook().take() {
            Some(hook) => hook(error),
            None => Ok(()),
        }
    }

    fn inner(&mut self) -> &mut dyn ReadMessage {
        match self {
            Self::Structured(m) => m,
            Self::Binary(m) => m,
            Self::Event(m) => m,
        }
    }
}

impl ReadMessage for Message {
    fn encoding(&self) -> Encoding {
        match self {
            Self::Structured(m) => m.encoding(),
            Self::Binary(m) => m.encoding(),
            Self::Event(m) => m.encoding(),
        }
    }

    fn read_structured(&mut self, writer: &mut dyn StructuredWriter) -> BindingResult<()> {
        self.inner().read_structured(writer)
    }

    fn read_binary(&mut self, writer: &mut dyn BinaryWriter) -> BindingResult<()> {
        self.inner().read_binary(writer)
    }
}

impl From<StructuredMessage> for Message {
    fn from(message: StructuredMessage) -> Self {
        Self::Structured(message)
    }
}

impl From<BinaryMessage> for Message {
    fn from(message: BinaryMessage) -> Self {
        Self::Binary(message)
    }
}

impl From<EventMessage> for Message {
    fn from(message: EventMessage) -> Self {
        Self::Event(message)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Self::Event(EventMessage::new(event))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::binding::format::JSON;
    use crate::binding::writer::EventBuilder;
    use crate::foundation::context::EventContext;

    fn event() -> Event {
        let mut e = Event::new(EventContext::new(SpecVersion::V10, "1", "/s", "t").unwrap());
        e.set(AttributeKind::Subject, "sub").unwrap();
        e.set_extension("zzz", "last").unwrap();
        e.set_extension("aaa", "first").unwrap();
        e.set_data("text/plain", "hi").unwrap();
        e
    }

    #[derive(Default)]
    struct Order(Vec<String>);

    impl BinaryWriter for Order {
        fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
            self.0.push(format!("start:{version}"));
            Ok(())
        }
        fn set_attribute(
            &mut self,
            attribute: &'static crate::foundation::spec::AttributeDescriptor,
            _value: Value,
        ) -> BindingResult<()> {
            self.0.push(attribute.name().to_string());
            Ok(())
        }
        fn set_extension(&mut self, name: &str, _value: Value) -> BindingResult<()> {
            self.0.push(format!("ext:{name}"));
            Ok(())
        }
        fn set_data(&mut self, _data: &[u8]) -> BindingResult<()> {
            self.0.push("data".into());
            Ok(())
        }
        fn end(&mut self) -> BindingResult<()> {
            self.0.push("end".into());
            Ok(())
        }
    }

    #[test]
    fn test_binary_stream_order() {
        let expected = [
            "start:1.0",
            "specversion",
            "id",
            "source",
            "type",
            "datacontenttype",
            "subject",
            "ext:aaa",
            "ext:zzz",
            "data",
            "end",
        ];

        let mut from_binary = Order::default();
        BinaryMessage::from_event(&event())
            .read_binary(&mut from_binary)
            .unwrap();
        assert_eq!(from_binary.0, expected);

        let mut from_event = Order::default();
        EventMessage::new(event()).read_binary(&mut from_event).unwrap();
        assert_eq!(from_event.0, expected);
    }

    #[test]
    fn test_structured_refuses_binary() {
        let mut message = StructuredMessage::from_event(&JSON, &event()).unwrap();
        let err = message.read_binary(&mut EventBuilder::new()).unwrap_err();
        assert!(err.is_encoding_not_supported());
    }

    #[test]
    fn test_binary_message_roundtrip() {
        let mut builder = EventBuilder::new();
        BinaryMessage::from_event(&event())
            .read_binary(&mut builder)
            .unwrap();
        assert_eq!(builder.build().unwrap(), event());
    }

    #[test]
    fn test_from_headers() {
        let headers = [
            ("ce-specversion", "1.0"),
            ("CE-Id", "42"),
            ("ce-source", "/s"),
            ("ce-type", "t"),
            ("ce-time", "2020-01-02T03:04:05Z"),
            ("ce-Aaa", "bbb"),
            ("Content-Type", "text/plain"),
            ("X-Other", "ignored"),
        ];
        let message =
            BinaryMessage::from_headers("ce-", headers, Some(b"body".to_vec())).unwrap();

        assert_eq!(message.version(), SpecVersion::V10);
        assert_eq!(message.attribute(AttributeKind::Id), Some(&Value::from("42")));
        assert!(matches!(
            message.attribute(AttributeKind::Time),
            Some(Value::Timestamp(_))
        ));
        assert_eq!(
            message.attribute(AttributeKind::DataContentType),
            Some(&Value::from("text/plain"))
        );
        assert_eq!(message.extensions().get("aaa"), Some(&Value::from("bbb")));
        assert_eq!(message.extensions().len(), 1);
        assert_eq!(message.data(), Some(&b"body"[..]));
    }

    #[test]
    fn test_from_headers_errors() {
        let err = BinaryMessage::from_headers("ce-", [("ce-id", "1")], None).unwrap_err();
        assert!(matches!(err, BindingError::MissingRequiredAttribute { .. }));

        let err = BinaryMessage::from_headers("ce-", [("ce-specversion", "5.0")], None).unwrap_err();
        assert!(matches!(err, BindingError::UnsupportedSpecVersion(_)));
    }

    #[test]
    fn test_with_attribute_checks_version() {
        let err = BinaryMessage::new(SpecVersion::V02)
            .with_attribute(AttributeKind::Subject, "s")
            .unwrap_err();
        assert!(matches!(err, BindingError::UnknownAttribute { .. }));

        assert!(
            BinaryMessage::new(SpecVersion::V10)
                .with_extension("subject", "x")
                .is_err()
        );
        assert!(
            BinaryMessage::new(SpecVersion::V10)
                .with_extension("data", "x")
                .is_err()
        );
    }

    #[test]
    fn test_from_headers_rejects_payload_member_name() {
        let headers = [
            ("ce-specversion", "1.0"),
            ("ce-id", "1"),
            ("ce-source", "/s"),
            ("ce-type", "t"),
            ("ce-data", "smuggled"),
        ];
        let err = BinaryMessage::from_headers("ce-", headers, None).unwrap_err();
        assert!(matches!(err, BindingError::InvalidValue { .. }));
    }

    #[test]
    fn test_finish_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut message = Message::from(event()).on_finish(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(message.is_pending());
        message.finish(None).unwrap();
        message.finish(Some(&BindingError::Cancelled)).unwrap();
        assert!(!message.is_pending());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
