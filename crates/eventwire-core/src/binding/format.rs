//! Structured event formats.
//!
//! A [`Format`] serializes a whole event, metadata and payload, into one
//! byte payload identified by a media type. The JSON format is built in;
//! [`lookup`] resolves a `Content-Type` value to a registered format.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value as JsonValue;
use serde_json::value::RawValue;

use super::writer::{BinaryWriter, EventBuilder};
use crate::error::{BindingError, BindingResult};
use crate::foundation::event::Event;
use crate::foundation::spec::{AttributeKind, SpecVersion};
use crate::foundation::value::Value;

/// Media type of the JSON event format.
pub const JSON_MEDIA_TYPE: &str = "application/cloudevents+json";

/// A structured encoding of a whole event.
pub trait Format: Send + Sync + fmt::Debug {
    /// Media type without parameters, e.g. `application/cloudevents+json`.
    fn media_type(&self) -> &str;

    fn marshal(&self, event: &Event) -> BindingResult<Vec<u8>>;

    fn unmarshal(&self, payload: &[u8]) -> BindingResult<Event>;
}

/// The JSON event format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

/// Shared instance of [`JsonFormat`].
pub static JSON: JsonFormat = JsonFormat;

static FORMATS: [&dyn Format; 1] = [&JsonFormat];

/// Resolves a media type, ignoring parameters and case.
pub fn lookup(media_type: &str) -> Option<&'static dyn Format> {
    let base = media_type.split(';').next().unwrap_or_default().trim();
    FORMATS
        .iter()
        .copied()
        .find(|f| f.media_type().eq_ignore_ascii_case(base))
}

fn codec(reason: impl fmt::Display) -> BindingError {
    BindingError::codec(JSON_MEDIA_TYPE, reason)
}

fn base_media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Absent content type means JSON.
fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|ct| {
        let base = base_media_type(ct);
        base == "application/json" || base == "text/json" || base.ends_with("+json")
    })
}

fn is_text(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        let base = base_media_type(ct);
        base.starts_with("text/") || base == "application/xml" || base.ends_with("+xml")
    })
}

fn extension_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Integer(i) => JsonValue::from(*i),
        other => JsonValue::String(other.to_string()),
    }
}

fn extension_from_json(name: &str, value: &JsonValue) -> BindingResult<Value> {
    match value {
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(Value::Integer)
            .ok_or_else(|| codec(format!("extension '{name}': {n} is not a 32-bit integer"))),
        _ => Err(codec(format!("extension '{name}' must be a scalar"))),
    }
}

/// Embeds a JSON payload as-is, provided its text survives as a raw value
/// byte for byte. Surrounding whitespace would not, so such payloads go out
/// as `data_base64`.
fn raw_json(data: &[u8]) -> Option<Box<RawValue>> {
    let text = std::str::from_utf8(data).ok()?;
    let raw = RawValue::from_string(text.to_string()).ok()?;
    (raw.get().len() == text.len()).then_some(raw)
}

fn raw_text(data: &[u8]) -> Option<Box<RawValue>> {
    let text = std::str::from_utf8(data).ok()?;
    serde_json::value::to_raw_value(text).ok()
}

fn parse_member(key: &str, raw: &RawValue) -> BindingResult<JsonValue> {
    serde_json::from_str(raw.get()).map_err(|e| codec(format!("member '{key}': {e}")))
}

impl Format for JsonFormat {
    fn media_type(&self) -> &str {
        JSON_MEDIA_TYPE
    }

    fn marshal(&self, event: &Event) -> BindingResult<Vec<u8>> {
        let context = event.context();
        let mut members: BTreeMap<String, Box<RawValue>> = BTreeMap::new();

        for (attribute, value) in context.attributes() {
            let raw = serde_json::value::to_raw_value(&value.to_string()).map_err(codec)?;
            members.insert(attribute.name().to_string(), raw);
        }
        for (name, value) in context.extensions().iter() {
            let raw = serde_json::value::to_raw_value(&extension_to_json(value)).map_err(codec)?;
            members.insert(name.to_string(), raw);
        }

        if let Some(data) = event.data() {
            let content_type = context.data_content_type();
            let embedded = if is_json(content_type) {
                raw_json(data)
            } else if is_text(content_type) {
                raw_text(data)
            } else {
                None
            };

            match embedded {
                Some(raw) => members.insert("data".to_string(), raw),
                None => {
                    let encoded = serde_json::value::to_raw_value(&STANDARD.encode(data))
                        .map_err(codec)?;
                    members.insert("data_base64".to_string(), encoded)
                }
            };
        }

        serde_json::to_vec(&members).map_err(codec)
    }

    fn unmarshal(&self, payload: &[u8]) -> BindingResult<Event> {
        let members: BTreeMap<String, Box<RawValue>> =
            serde_json::from_slice(payload).map_err(codec)?;

        let version: SpecVersion = match members.get("specversion") {
            Some(raw) => match parse_member("specversion", raw)? {
                JsonValue::String(s) => s.parse()?,
                _ => return Err(codec("'specversion' must be a string")),
            },
            None => return Err(codec("missing 'specversion'")),
        };

        let mut builder = EventBuilder::new();
        builder.start(version)?;

        let mut content_type = None;
        for (key, raw) in &members {
            if key == "data" || key == "data_base64" {
                continue;
            }
            let value = parse_member(key, raw)?;
            if value.is_null() {
                continue;
            }
            match version.semantic_of(key) {
                Some(attribute) => {
                    let JsonValue::String(s) = value else {
                        return Err(codec(format!("attribute '{key}' must be a string")));
                    };
                    if attribute.kind() == AttributeKind::DataContentType {
                        content_type = Some(s.clone());
                    }
                    builder.set_attribute(attribute, Value::String(s))?;
                }
                None => builder.set_extension(key, extension_from_json(key, &value)?)?,
            }
        }

        let present = |key: &str| members.get(key).filter(|raw| raw.get() != "null");
        match (present("data"), present("data_base64")) {
            (Some(_), Some(_)) => {
                return Err(codec("'data' and 'data_base64' are mutually exclusive"));
            }
            (Some(raw), None) => {
                let bytes = if is_json(content_type.as_deref()) {
                    raw.get().as_bytes().to_vec()
                } else {
                    match parse_member("data", raw)? {
                        JsonValue::String(s) => s.into_bytes(),
                        _ => raw.get().as_bytes().to_vec(),
                    }
                };
                builder.set_data(&bytes)?;
            }
            (None, Some(raw)) => {
                let JsonValue::String(encoded) = parse_member("data_base64", raw)? else {
                    return Err(codec("'data_base64' must be a string"));
                };
                let bytes = STANDARD
                    .decode(encoded)
                    .map_err(|e| codec(format!("invalid 'data_base64': {e}")))?;
                builder.set_data(&bytes)?;
            }
            (None, None) => {}
        }

        builder.build().map_err(|e| match e {
            BindingError::UnsupportedSpecVersion(_) | BindingError::Codec { .. } => e,
            other => codec(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::context::EventContext;
    use chrono::{TimeZone, Utc};

    fn event() -> Event {
        let mut e = Event::new(
            EventContext::new(SpecVersion::V10, "1", "http://example.com/source", "com.example")
                .unwrap(),
        );
        e.set(
            AttributeKind::Time,
            Utc.with_ymd_and_hms(2020, 3, 21, 12, 34, 56).unwrap(),
        )
        .unwrap();
        e.set(AttributeKind::Subject, "topic").unwrap();
        e.set_extension("exbool", true).unwrap();
        e.set_extension("exint", 42).unwrap();
        e.set_extension("exstring", "value").unwrap();
        e
    }

    fn json(event: &Event) -> JsonValue {
        serde_json::from_slice(&JSON.marshal(event).unwrap()).unwrap()
    }

    #[test]
    fn test_lookup() {
        assert!(lookup("application/cloudevents+json").is_some());
        assert!(lookup("Application/CloudEvents+JSON; charset=utf-8").is_some());
        assert!(lookup("application/json").is_none());
    }

    #[test]
    fn test_marshal_layout() {
        let mut e = event();
        e.set_data("application/json", r#"{"hello":"world"}"#).unwrap();
        let v = json(&e);

        assert_eq!(v["specversion"], "1.0");
        assert_eq!(v["time"], "2020-03-21T12:34:56Z");
        assert_eq!(v["exbool"], true);
        assert_eq!(v["exint"], 42);
        assert_eq!(v["data"]["hello"], "world");
        assert!(v.get("data_base64").is_none());
    }

    #[test]
    fn test_roundtrip_with_payloads() {
        for (content_type, data) in [
            ("application/json", br#"{"a":[1,2]}"#.to_vec()),
            ("text/plain", b"hello".to_vec()),
            ("application/octet-stream", vec![0, 159, 146, 150]),
        ] {
            let mut e = event();
            e.set_data(content_type, data).unwrap();
            let bytes = JSON.marshal(&e).unwrap();
            assert_eq!(JSON.unmarshal(&bytes).unwrap(), e, "{content_type}");
        }
    }

    #[test]
    fn test_json_payload_passes_through_verbatim() {
        let payload = "{\"b\": 1,\n  \"a\": 0.10000000000000000001}";
        let mut e = event();
        e.set_data("application/json", payload).unwrap();

        let bytes = JSON.marshal(&e).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains(payload), "{text}");

        let back = JSON.unmarshal(&bytes).unwrap();
        assert_eq!(back.data(), Some(payload.as_bytes()));
        assert_eq!(back, e);
    }

    #[test]
    fn test_json_payload_with_padding_uses_base64() {
        let mut e = event();
        e.set_data("application/json", "{\"a\": 1}\n").unwrap();
        let v = json(&e);
        assert!(v.get("data").is_none());
        assert_eq!(JSON.unmarshal(&JSON.marshal(&e).unwrap()).unwrap(), e);
    }

    #[test]
    fn test_unmarshal_keeps_data_text() {
        let payload = br#"{"specversion":"1.0","id":"1","source":"/s","type":"t","data": [1.50, {"z": 0, "y": 1}]}"#;
        let e = JSON.unmarshal(payload).unwrap();
        assert_eq!(e.data(), Some(&br#"[1.50, {"z": 0, "y": 1}]"#[..]));
    }

    #[test]
    fn test_binary_extension_is_carried_as_string() {
        let mut e = event();
        e.set_extension("exbinary", Value::Binary(vec![1, 2, 3])).unwrap();
        assert_eq!(json(&e)["exbinary"], "AQID");

        let back = JSON.unmarshal(&JSON.marshal(&e).unwrap()).unwrap();
        assert_eq!(back.extension("exbinary"), Some(&Value::from("AQID")));
        assert_eq!(back, e);
    }

    #[test]
    fn test_binary_payload_uses_base64() {
        let mut e = event();
        e.set_data("application/octet-stream", vec![1, 2, 3]).unwrap();
        let v = json(&e);
        assert_eq!(v["data_base64"], "AQID");
        assert!(v.get("data").is_none());
    }

    #[test]
    fn test_marshal_is_deterministic() {
        let e = event();
        assert_eq!(JSON.marshal(&e).unwrap(), JSON.marshal(&e.clone()).unwrap());
    }

    #[test]
    fn test_legacy_keys() {
        let payload = br#"{"specversion":"0.2","id":"1","source":"/s","type":"t","contenttype":"text/plain","data":"hi"}"#;
        let e = JSON.unmarshal(payload).unwrap();
        assert_eq!(e.spec_version(), SpecVersion::V02);
        assert_eq!(e.context().data_content_type(), Some("text/plain"));
        assert_eq!(e.data(), Some(&b"hi"[..]));
    }

    #[test]
    fn test_unmarshal_errors() {
        let unsupported = JSON
            .unmarshal(br#"{"specversion":"9.9","id":"1","source":"/s","type":"t"}"#)
            .unwrap_err();
        assert_eq!(unsupported, BindingError::UnsupportedSpecVersion("9.9".into()));

        let missing = JSON
            .unmarshal(br#"{"specversion":"1.0","id":"1","type":"t"}"#)
            .unwrap_err();
        assert!(matches!(missing, BindingError::Codec { .. }));

        assert!(JSON.unmarshal(b"not json").is_err());
        assert!(
            JSON.unmarshal(br#"{"specversion":"1.0","id":"1","source":"/s","type":"t","ext":[1]}"#)
                .is_err()
        );
    }
}
