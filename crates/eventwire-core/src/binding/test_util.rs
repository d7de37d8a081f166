//! Test support for bindings and transformers.
//!
//! Enabled for this crate's tests and, through the `test-util` feature, for
//! downstream crates that implement their own messages or transformers.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::bind::{bind, to_event};
use super::format::{Format, JSON, lookup};
use super::message::{BinaryMessage, Message, StructuredMessage};
use super::transformer::Transformers;
use super::writer::{BinaryWriter, EventBuilder, MessageWriter, StructuredWriter};
use crate::error::{BindingError, BindingResult};
use crate::foundation::context::EventContext;
use crate::foundation::event::Event;
use crate::foundation::spec::{AttributeDescriptor, AttributeKind, SpecVersion};
use crate::foundation::value::Value;

// ============================================================================
// Canonical events
// ============================================================================

/// A 1.0 event with only the required attributes.
pub fn min_event() -> Event {
    Event::new(
        EventContext::new(
            SpecVersion::V10,
            "min-event",
            "http://example.com/source",
            "com.example.simple",
        )
        .expect("valid context"),
    )
}

/// JSON payload of [`full_event`]: key order, spacing and a number that
/// does not survive a float round trip all have to pass through untouched.
pub const FULL_EVENT_PAYLOAD: &str = "{\"b\": 1,\n  \"a\": 0.10000000000000000001}";

/// A 1.0 event with every optional attribute, typed extensions and a JSON
/// payload.
pub fn full_event() -> Event {
    let mut event = min_event();
    event.set(AttributeKind::Id, "full-event").expect("id");
    event
        .set(AttributeKind::DataSchema, "http://example.com/schema")
        .expect("dataschema");
    event.set(AttributeKind::Subject, "topic").expect("subject");
    event
        .set(
            AttributeKind::Time,
            Utc.with_ymd_and_hms(2020, 3, 21, 12, 34, 56).single().expect("time"),
        )
        .expect("time");
    event.set_extension("exbool", true).expect("exbool");
    event.set_extension("exint", 42).expect("exint");
    event.set_extension("exstring", "exstring").expect("exstring");
    event
        .set_extension("exbinary", Value::Binary(vec![1, 2, 3]))
        .expect("exbinary");
    event
        .set_data("application/json", FULL_EVENT_PAYLOAD)
        .expect("data");
    event
}

// ============================================================================
// Sources and destinations
// ============================================================================

/// The three message representations of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Structured,
    Binary,
    Event,
}

impl Representation {
    pub const ALL: [Representation; 3] = [Self::Structured, Self::Binary, Self::Event];

    pub fn message(self, event: &Event) -> Message {
        match self {
            Self::Structured => StructuredMessage::from_event(&JSON, event)
                .expect("event encodes as JSON")
                .into(),
            Self::Binary => BinaryMessage::from_event(event).into(),
            Self::Event => event.clone().into(),
        }
    }
}

/// Encodings a [`RecordingWriter`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Structured,
    Binary,
    Both,
}

impl Destination {
    pub const ALL: [Destination; 3] = [Self::Structured, Self::Binary, Self::Both];

    pub fn writer(self) -> RecordingWriter {
        match self {
            Self::Structured => RecordingWriter::structured_only(),
            Self::Binary => RecordingWriter::binary_only(),
            Self::Both => RecordingWriter::both(),
        }
    }
}

/// One call received by a [`RecordingWriter`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriterCall {
    Structured { media_type: String, payload: Vec<u8> },
    Start(SpecVersion),
    Attribute(&'static AttributeDescriptor, Value),
    Extension(String, Value),
    Data(Vec<u8>),
    End,
}

/// A destination that records every call it receives.
#[derive(Debug)]
pub struct RecordingWriter {
    structured: bool,
    binary: bool,
    calls: Vec<WriterCall>,
}

impl RecordingWriter {
    fn new(structured: bool, binary: bool) -> Self {
        Self {
            structured,
            binary,
            calls: Vec::new(),
        }
    }

    /// Accepts JSON structured payloads only.
    pub fn structured_only() -> Self {
        Self::new(true, false)
    }

    pub fn binary_only() -> Self {
        Self::new(false, true)
    }

    pub fn both() -> Self {
        Self::new(true, true)
    }

    pub fn calls(&self) -> &[WriterCall] {
        &self.calls
    }

    /// Rebuilds the event that was written.
    pub fn event(&self) -> BindingResult<Event> {
        for call in &self.calls {
            if let WriterCall::Structured {
                media_type,
                payload,
            } = call
            {
                let format = lookup(media_type)
                    .ok_or_else(|| BindingError::encoding_not_supported(media_type.clone()))?;
                return format.unmarshal(payload);
            }
        }

        let mut builder = EventBuilder::new();
        for call in &self.calls {
            match call {
                WriterCall::Start(version) => builder.start(*version)?,
                WriterCall::Attribute(attribute, value) => {
                    builder.set_attribute(*attribute, value.clone())?
                }
                WriterCall::Extension(name, value) => builder.set_extension(name, value.clone())?,
                WriterCall::Data(data) => builder.set_data(data)?,
                WriterCall::End | WriterCall::Structured { .. } => {}
            }
        }
        builder.build()
    }
}

impl StructuredWriter for RecordingWriter {
    fn set_structured_event(&mut self, format: &dyn Format, payload: &[u8]) -> BindingResult<()> {
        self.calls.push(WriterCall::Structured {
            media_type: format.media_type().to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

impl BinaryWriter for RecordingWriter {
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        self.calls.push(WriterCall::Start(version));
        Ok(())
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()> {
        self.calls.push(WriterCall::Attribute(attribute, value));
        Ok(())
    }

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()> {
        self.calls.push(WriterCall::Extension(name.to_string(), value));
        Ok(())
    }

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()> {
        self.calls.push(WriterCall::Data(data.to_vec()));
        Ok(())
    }

    fn end(&mut self) -> BindingResult<()> {
        self.calls.push(WriterCall::End);
        Ok(())
    }
}

impl MessageWriter for RecordingWriter {
    fn structured(&mut self) -> Option<&mut dyn StructuredWriter> {
        if self.structured { Some(self) } else { None }
    }

    fn binary(&mut self) -> Option<&mut dyn BinaryWriter> {
        if self.binary { Some(self) } else { None }
    }
}

// ============================================================================
// Finish probe
// ============================================================================

/// Records finish hook invocations of the messages it is attached to.
#[derive(Debug, Clone, Default)]
pub struct FinishProbe {
    calls: Arc<Mutex<Vec<Option<BindingError>>>>,
}

impl FinishProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a recording finish hook on `message`.
    pub fn attach(&self, message: Message) -> Message {
        let calls = Arc::clone(&self.calls);
        message.on_finish(move |error| {
            calls.lock().push(error.cloned());
            Ok(())
        })
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Errors passed to each invocation, in order.
    pub fn errors(&self) -> Vec<Option<BindingError>> {
        self.calls.lock().clone()
    }
}

// ============================================================================
// Transformer cases
// ============================================================================

/// A transformer chain with its input and expected output.
pub struct TransformerCase {
    pub name: &'static str,
    pub input: Event,
    pub want: Event,
    pub transformers: Transformers,
}

/// Runs every case for every source representation and destination kind,
/// plus [`to_event`], and checks the result and the finish hook.
pub fn run_transformer_cases(cases: &[TransformerCase]) {
    for case in cases {
        for repr in Representation::ALL {
            for dest in Destination::ALL {
                let probe = FinishProbe::new();
                let mut writer = dest.writer();
                bind(
                    probe.attach(repr.message(&case.input)),
                    &mut writer,
                    &case.transformers,
                    &CancellationToken::new(),
                )
                .unwrap_or_else(|e| panic!("{}: {repr:?} -> {dest:?}: {e}", case.name));

                assert_eq!(probe.errors(), [None], "{}: {repr:?} -> {dest:?}", case.name);
                let got = writer
                    .event()
                    .unwrap_or_else(|e| panic!("{}: {repr:?} -> {dest:?}: {e}", case.name));
                assert_eq!(got, case.want, "{}: {repr:?} -> {dest:?}", case.name);
            }

            let probe = FinishProbe::new();
            let got = to_event(probe.attach(repr.message(&case.input)), &case.transformers)
                .unwrap_or_else(|e| panic!("{}: to_event from {repr:?}: {e}", case.name));
            assert_eq!(got, case.want, "{}: to_event from {repr:?}", case.name);
            assert_eq!(probe.count(), 1);
        }
    }
}
