//! The bind dispatcher.
//!
//! [`bind`] copies one message into one destination, applying a transformer
//! chain on the way. It picks the cheapest of three paths:
//!
//! 1. **Direct structured**: no transformers, structured source, structured
//!    destination accepting the source format. The payload is copied as is.
//! 2. **Streaming binary**: binary source, binary destination and a chain
//!    where every transformer can stream. Fields flow through the wrapped
//!    writer without materializing an event.
//! 3. **Materialized**: everything else. The message is turned into an
//!    [`Event`], transformed, and written in the best encoding the
//!    destination accepts.
//!
//! Whatever happens, the message's finish hook runs exactly once, after the
//! last write, with the outcome of the bind.

use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, span, warn};

use super::encoding::Encoding;
use super::message::{Message, ReadMessage};
use super::transformer::Transformers;
use super::writer::{BinaryWriter, EventBuilder, MessageWriter, write_binary_event};
use crate::error::{BindingError, BindingResult};
use crate::foundation::event::Event;
use crate::foundation::spec::{AttributeDescriptor, SpecVersion};
use crate::foundation::value::Value;

/// The path a successful bind took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindPath {
    DirectStructured,
    StreamingBinary,
    /// The event was materialized and written in the given encoding.
    Materialized(Encoding),
}

/// Copies `message` into `writer`, applying `transformers`.
///
/// The message is consumed; its finish hook receives the error of a failed
/// bind. An error returned by the hook itself is surfaced only when the bind
/// succeeded.
pub fn bind(
    message: Message,
    writer: &mut dyn MessageWriter,
    transformers: &Transformers,
    cancel: &CancellationToken,
) -> BindingResult<BindPath> {
    let span = span!(
        Level::DEBUG,
        "bind",
        encoding = %message.encoding(),
        transformers = transformers.len()
    );
    let _enter = span.enter();

    let mut guard = FinishGuard::new(message);
    let result = dispatch(guard.message(), writer, transformers, cancel);
    match &result {
        Ok(path) => debug!(?path, "Bind complete"),
        Err(e) => debug!(error = %e, "Bind failed"),
    }
    guard.complete(result)
}

/// Materializes `message` and applies `transformers`.
///
/// Runs the message's finish hook like [`bind`].
pub fn to_event(message: Message, transformers: &Transformers) -> BindingResult<Event> {
    let mut guard = FinishGuard::new(message);
    let result = materialize(guard.message()).and_then(|mut event| {
        transformers.apply(&mut event)?;
        Ok(event)
    });
    guard.complete(result)
}

/// Writes a materialized event, preferring the structured encoding.
pub fn write_event(event: &Event, writer: &mut dyn MessageWriter) -> BindingResult<Encoding> {
    if let Some(structured) = writer.structured() {
        let format = structured.format();
        let payload = format.marshal(event)?;
        structured.set_structured_event(format, &payload)?;
        return Ok(Encoding::Structured);
    }
    if let Some(binary) = writer.binary() {
        write_binary_event(event, binary)?;
        return Ok(Encoding::Binary);
    }
    Err(BindingError::encoding_not_supported(
        "destination accepts neither structured nor binary encoding",
    ))
}

fn check(cancel: &CancellationToken) -> BindingResult<()> {
    if cancel.is_cancelled() {
        Err(BindingError::Cancelled)
    } else {
        Ok(())
    }
}

fn dispatch(
    message: &mut Message,
    writer: &mut dyn MessageWriter,
    transformers: &Transformers,
    cancel: &CancellationToken,
) -> BindingResult<BindPath> {
    check(cancel)?;
    let encoding = message.encoding();

    if transformers.is_empty() && encoding == Encoding::Structured {
        if let Some(destination) = writer.structured() {
            match message.read_structured(destination) {
                Ok(()) => return Ok(BindPath::DirectStructured),
                Err(e) if e.is_encoding_not_supported() => {
                    debug!(reason = %e, "Direct structured copy not possible");
                }
                Err(e) => return Err(e),
            }
        }
    }

    if encoding == Encoding::Binary && transformers.supports_streaming() {
        if let Some(destination) = writer.binary() {
            let chain = transformers.wrap_binary(Box::new(destination));
            let mut guarded = CancelWriter {
                inner: chain,
                cancel,
            };
            message.read_binary(&mut guarded)?;
            return Ok(BindPath::StreamingBinary);
        }
    }

    let mut event = materialize(message)?;
    check(cancel)?;
    transformers.apply(&mut event)?;
    check(cancel)?;
    let written = write_event(&event, writer)?;
    Ok(BindPath::Materialized(written))
}

fn materialize(message: &mut Message) -> BindingResult<Event> {
    match message {
        Message::Structured(m) => m.format().unmarshal(m.payload()),
        Message::Binary(m) => {
            let mut builder = EventBuilder::new();
            m.read_binary(&mut builder)?;
            builder.build()
        }
        Message::Event(m) => Ok(m.event().clone()),
    }
}

// ============================================================================
// Finish guard
// ============================================================================

/// Owns the message for the duration of a bind and guarantees its finish
/// hook runs, even if a writer or transformer panics.
struct FinishGuard {
    message: Message,
}

impl FinishGuard {
    fn new(message: Message) -> Self {
        Self { message }
    }

    fn message(&mut self) -> &mut Message {
        &mut self.message
    }

    fn complete<T>(mut self, result: BindingResult<T>) -> BindingResult<T> {
        let finished = self.message.finish(result.as_ref().err());
        match (result, finished) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => {
                warn!(error = %e, "Finish hook failed");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(hook)) => {
                warn!(error = %hook, "Finish hook failed after bind error");
                Err(e)
            }
        }
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if self.message.is_pending() {
            warn!("Bind unwound before completion, finishing message");
            let aborted = BindingError::Aborted("bind unwound before completion".to_string());
            if let Err(e) = self.message.finish(Some(&aborted)) {
                warn!(error = %e, "Finish hook failed during unwind");
            }
        }
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Checks the token before every call into the destination chain.
struct CancelWriter<'a> {
    inner: Box<dyn BinaryWriter + 'a>,
    cancel: &'a CancellationToken,
}

impl BinaryWriter for CancelWriter<'_> {
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        check(self.cancel)?;
        self.inner.start(version)
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()> {
        check(self.cancel)?;
        self.inner.set_attribute(attribute, value)
    }

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()> {
        check(self.cancel)?;
        self.inner.set_extension(name, value)
    }

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()> {
        check(self.cancel)?;
        self.inner.set_data(data)
    }

    fn end(&mut self) -> BindingResult<()> {
        check(self.cancel)?;
        self.inner.end()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::binding::format::{Format, JSON};
    use crate::binding::message::{BinaryMessage, StructuredMessage};
    use crate::binding::test_util::{
        Destination, FULL_EVENT_PAYLOAD, FinishProbe, RecordingWriter, Representation,
        WriterCall, full_event, min_event,
    };
    use crate::binding::transformer::{
        ConvertVersion, DeleteAttribute, DeleteExtension, EventFn, UpdateAttribute,
        UpdateExtension,
    };
    use crate::foundation::spec::AttributeKind;
    use crate::foundation::value::Value;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn test_path_selection() {
        let event = full_event();
        let none = Transformers::new();
        let streaming = Transformers::new().with(DeleteAttribute::new(AttributeKind::Subject));
        let whole = Transformers::new().with(ConvertVersion::new(SpecVersion::V03));

        let cases = [
            (Representation::Structured, Destination::Structured, &none, BindPath::DirectStructured),
            (Representation::Structured, Destination::Binary, &none, BindPath::Materialized(Encoding::Binary)),
            (Representation::Structured, Destination::Structured, &streaming, BindPath::Materialized(Encoding::Structured)),
            (Representation::Binary, Destination::Binary, &streaming, BindPath::StreamingBinary),
            (Representation::Binary, Destination::Both, &none, BindPath::StreamingBinary),
            (Representation::Binary, Destination::Binary, &whole, BindPath::Materialized(Encoding::Binary)),
            (Representation::Binary, Destination::Structured, &none, BindPath::Materialized(Encoding::Structured)),
            (Representation::Event, Destination::Both, &none, BindPath::Materialized(Encoding::Structured)),
            (Representation::Event, Destination::Binary, &streaming, BindPath::Materialized(Encoding::Binary)),
        ];

        for (repr, dest, chain, expected) in cases {
            let mut writer = dest.writer();
            let path = bind(repr.message(&event), &mut writer, chain, &token()).unwrap();
            assert_eq!(path, expected, "{repr:?} -> {dest:?}");
        }
    }

    #[test]
    fn test_direct_copy_keeps_payload() {
        let message = StructuredMessage::from_event(&JSON, &full_event()).unwrap();
        let original = message.payload().to_vec();

        let mut writer = RecordingWriter::structured_only();
        bind(message.into(), &mut writer, &Transformers::new(), &token()).unwrap();

        assert_eq!(
            writer.calls(),
            [WriterCall::Structured {
                media_type: JSON.media_type().to_string(),
                payload: original,
            }]
        );
    }

    #[test]
    fn test_absent_deletion_is_byte_identical() {
        let input = min_event();
        let message = StructuredMessage::from_event(&JSON, &input).unwrap();
        let original = message.payload().to_vec();
        let chain = Transformers::new().with(DeleteAttribute::new(AttributeKind::Time));

        let mut writer = RecordingWriter::structured_only();
        let path = bind(message.into(), &mut writer, &chain, &token()).unwrap();

        assert_eq!(path, BindPath::Materialized(Encoding::Structured));
        match writer.calls() {
            [WriterCall::Structured { payload, .. }] => assert_eq!(payload, &original),
            other => panic!("unexpected calls: {other:?}"),
        }
    }

    #[test]
    fn test_required_attribute_protected_on_every_path() {
        let chain = Transformers::new().with(DeleteAttribute::new(AttributeKind::Id));
        for repr in Representation::ALL {
            for dest in Destination::ALL {
                let probe = FinishProbe::new();
                let mut writer = dest.writer();
                let err = bind(probe.attach(repr.message(&full_event())), &mut writer, &chain, &token())
                    .unwrap_err();

                assert_eq!(err, BindingError::CannotUnsetRequiredAttribute { attribute: "id" });
                assert_eq!(probe.errors(), [Some(err.clone())], "{repr:?} -> {dest:?}");
            }
        }
    }

    #[test]
    fn test_non_interference() {
        let chain = Transformers::new()
            .with(DeleteAttribute::new(AttributeKind::Subject))
            .with(DeleteExtension::new("exstring"));
        for repr in Representation::ALL {
            for dest in Destination::ALL {
                let mut writer = dest.writer();
                bind(repr.message(&full_event()), &mut writer, &chain, &token()).unwrap();

                let mut want = full_event();
                want.unset(AttributeKind::Subject).unwrap();
                want.unset_extension("exstring");
                assert_eq!(writer.event().unwrap(), want, "{repr:?} -> {dest:?}");
            }
        }
    }

    #[test]
    fn test_payload_and_extensions_agree_across_paths() {
        let chain = Transformers::new().with(DeleteAttribute::new(AttributeKind::Time));
        let mut want = full_event();
        want.unset(AttributeKind::Time).unwrap();

        for repr in Representation::ALL {
            for dest in Destination::ALL {
                let mut writer = dest.writer();
                bind(repr.message(&full_event()), &mut writer, &chain, &token()).unwrap();

                let got = writer.event().unwrap();
                assert_eq!(got.data(), Some(FULL_EVENT_PAYLOAD.as_bytes()), "{repr:?} -> {dest:?}");
                assert_eq!(got.extension("exbinary"), Some(&Value::from("AQID")), "{repr:?} -> {dest:?}");
                assert_eq!(got, want, "{repr:?} -> {dest:?}");
            }
        }
    }

    #[test]
    fn test_reserved_extension_rejected_on_every_path() {
        for name in ["subject", "data"] {
            let chain = Transformers::new().with(UpdateExtension::add(name, "x").unwrap());
            for repr in Representation::ALL {
                for dest in Destination::ALL {
                    let mut writer = dest.writer();
                    let err = bind(repr.message(&min_event()), &mut writer, &chain, &token())
                        .unwrap_err();
                    assert!(
                        matches!(err, BindingError::InvalidValue { .. }),
                        "{name}: {repr:?} -> {dest:?}: {err}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_finish_once_on_success_and_failure() {
        let probe = FinishProbe::new();
        let mut writer = RecordingWriter::binary_only();
        bind(
            probe.attach(Representation::Binary.message(&min_event())),
            &mut writer,
            &Transformers::new(),
            &token(),
        )
        .unwrap();
        assert_eq!(probe.errors(), [None]);

        let probe = FinishProbe::new();
        let failing = Transformers::new().with(EventFn::new("reject", |_: &mut Event| {
            Err(BindingError::transformer("reject", "nope"))
        }));
        let err = bind(
            probe.attach(Representation::Event.message(&min_event())),
            &mut RecordingWriter::structured_only(),
            &failing,
            &token(),
        )
        .unwrap_err();
        assert_eq!(probe.errors(), [Some(err)]);
    }

    #[test]
    fn test_finish_error_surfaces_only_on_success() {
        let message = Message::from(min_event())
            .on_finish(|_| Err(BindingError::Aborted("ack failed".into())));
        let err = bind(message, &mut RecordingWriter::binary_only(), &Transformers::new(), &token())
            .unwrap_err();
        assert_eq!(err, BindingError::Aborted("ack failed".into()));

        // The bind error wins over the hook error.
        let message = Message::from(min_event())
            .on_finish(|_| Err(BindingError::Aborted("ack failed".into())));
        let chain = Transformers::new().with(DeleteAttribute::new(AttributeKind::Source));
        let err = bind(message, &mut RecordingWriter::binary_only(), &chain, &token()).unwrap_err();
        assert_eq!(err, BindingError::CannotUnsetRequiredAttribute { attribute: "source" });
    }

    #[test]
    fn test_finish_runs_on_panic() {
        let probe = FinishProbe::new();
        let panicking = Transformers::new().with(EventFn::new("boom", |_: &mut Event| -> BindingResult<()> {
            panic!("transformer exploded")
        }));
        let message = probe.attach(Representation::Event.message(&min_event()));

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            bind(message, &mut RecordingWriter::binary_only(), &panicking, &token())
        }));

        assert!(outcome.is_err());
        assert_eq!(probe.count(), 1);
        assert!(matches!(probe.errors()[0], Some(BindingError::Aborted(_))));
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = token();
        cancel.cancel();
        let probe = FinishProbe::new();
        let mut writer = RecordingWriter::both();

        let err = bind(probe.attach(Representation::Binary.message(&full_event())), &mut writer, &Transformers::new(), &cancel)
            .unwrap_err();

        assert_eq!(err, BindingError::Cancelled);
        assert!(writer.calls().is_empty());
        assert_eq!(probe.errors(), [Some(BindingError::Cancelled)]);
    }

    /// Cancels the token after the first attribute reaches it.
    struct CancelAfterFirst {
        cancel: CancellationToken,
        calls: usize,
    }

    impl BinaryWriter for CancelAfterFirst {
        fn set_attribute(&mut self, _: &'static AttributeDescriptor, _: Value) -> BindingResult<()> {
            self.calls += 1;
            self.cancel.cancel();
            Ok(())
        }
        fn set_extension(&mut self, _: &str, _: Value) -> BindingResult<()> {
            self.calls += 1;
            Ok(())
        }
        fn set_data(&mut self, _: &[u8]) -> BindingResult<()> {
            self.calls += 1;
            Ok(())
        }
    }

    impl MessageWriter for CancelAfterFirst {
        fn binary(&mut self) -> Option<&mut dyn BinaryWriter> {
            Some(self)
        }
    }

    #[test]
    fn test_cancelled_mid_stream() {
        let cancel = token();
        let mut writer = CancelAfterFirst {
            cancel: cancel.clone(),
            calls: 0,
        };
        let message = BinaryMessage::from_event(&full_event());

        let err = bind(message.into(), &mut writer, &Transformers::new(), &cancel).unwrap_err();
        assert_eq!(err, BindingError::Cancelled);
        assert_eq!(writer.calls, 1);
    }

    #[test]
    fn test_no_destination_encoding() {
        struct Nowhere;
        impl MessageWriter for Nowhere {}

        let err = bind(min_event().into(), &mut Nowhere, &Transformers::new(), &token()).unwrap_err();
        assert!(err.is_encoding_not_supported());
    }

    #[test]
    fn test_to_event() {
        let chain = Transformers::new().with(UpdateAttribute::add(AttributeKind::Subject, "added"));
        for repr in Representation::ALL {
            let probe = FinishProbe::new();
            let event = to_event(probe.attach(repr.message(&min_event())), &chain).unwrap();
            assert_eq!(event.context().subject(), Some("added"));
            assert_eq!(probe.errors(), [None]);
        }
    }

    #[test]
    fn test_parallel_binds() {
        let chain = Transformers::new().with(DeleteAttribute::new(AttributeKind::Time));
        let cancel = token();
        std::thread::scope(|scope| {
            for repr in Representation::ALL {
                let chain = &chain;
                let cancel = &cancel;
                scope.spawn(move || {
                    for _ in 0..32 {
                        let mut writer = RecordingWriter::both();
                        bind(repr.message(&full_event()), &mut writer, chain, cancel).unwrap();
                        assert_eq!(writer.event().unwrap().get(AttributeKind::Time), None);
                    }
                });
            }
        });
    }
}
