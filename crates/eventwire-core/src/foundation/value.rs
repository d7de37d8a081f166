//! Attribute and extension values.
//!
//! Values follow the event type system: booleans, 32-bit integers, strings,
//! opaque bytes, URIs, URI-references and UTC timestamps. Every value has a
//! canonical string form used when it travels as a header.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{BindingError, BindingResult};

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Integer,
    String,
    Binary,
    Uri,
    UriRef,
    Timestamp,
}

impl ValueType {
    /// Returns true for the string-shaped types that are interchangeable.
    pub fn is_textual(self) -> bool {
        matches!(self, Self::String | Self::Uri | Self::UriRef)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "Boolean",
            Self::Integer => "Integer",
            Self::String => "String",
            Self::Binary => "Binary",
            Self::Uri => "URI",
            Self::UriRef => "URI-reference",
            Self::Timestamp => "Timestamp",
        };
        f.write_str(name)
    }
}

/// A typed attribute or extension value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    Integer(i32),
    String(String),
    Binary(Vec<u8>),
    Uri(String),
    UriRef(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Returns the type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Integer(_) => ValueType::Integer,
            Self::String(_) => ValueType::String,
            Self::Binary(_) => ValueType::Binary,
            Self::Uri(_) => ValueType::Uri,
            Self::UriRef(_) => ValueType::UriRef,
            Self::Timestamp(_) => ValueType::Timestamp,
        }
    }

    /// Returns the text of a string, URI or URI-reference value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Uri(s) | Self::UriRef(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp if this is a timestamp value.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Parses the canonical string form of a value of type `ty`.
    ///
    /// `name` is only used for error reporting.
    pub fn parse(name: &str, ty: ValueType, raw: &str) -> BindingResult<Self> {
        let invalid = |reason: String| BindingError::invalid_value(name, reason);
        match ty {
            ValueType::Bool => match raw {
                "true" => Ok(Self::Bool(true)),
                "false" => Ok(Self::Bool(false)),
                _ => Err(invalid(format!("'{raw}' is not a boolean"))),
            },
            ValueType::Integer => raw
                .parse::<i32>()
                .map(Self::Integer)
                .map_err(|e| invalid(format!("'{raw}' is not an integer: {e}"))),
            ValueType::String => Ok(Self::String(raw.to_string())),
            ValueType::Binary => STANDARD
                .decode(raw)
                .map(Self::Binary)
                .map_err(|e| invalid(format!("invalid base64: {e}"))),
            ValueType::Uri => {
                if has_scheme(raw) {
                    Ok(Self::Uri(raw.to_string()))
                } else {
                    Err(invalid(format!("'{raw}' is not an absolute URI")))
                }
            }
            ValueType::UriRef => Ok(Self::UriRef(raw.to_string())),
            ValueType::Timestamp => DateTime::parse_from_rfc3339(raw)
                .map(|t| Self::Timestamp(t.with_timezone(&Utc)))
                .map_err(|e| invalid(format!("'{raw}' is not an RFC 3339 timestamp: {e}"))),
        }
    }

    /// Converts this value into type `ty`.
    ///
    /// Textual types convert freely into each other, strings are parsed into
    /// the target type, anything else is rejected.
    pub fn coerce(self, name: &str, ty: ValueType) -> BindingResult<Self> {
        let from = self.value_type();
        if from == ty {
            return Ok(self);
        }
        match self {
            Self::String(s) | Self::Uri(s) | Self::UriRef(s) if ty.is_textual() => match ty {
                ValueType::String => Ok(Self::String(s)),
                ValueType::UriRef => Ok(Self::UriRef(s)),
                _ => Self::parse(name, ty, &s),
            },
            Self::String(s) => Self::parse(name, ty, &s),
            _ => Err(BindingError::invalid_value(
                name,
                format!("expected {ty}, got {from}"),
            )),
        }
    }
}

fn has_scheme(raw: &str) -> bool {
    match raw.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) | Self::Uri(s) | Self::UriRef(s) => f.write_str(s),
            Self::Binary(bytes) => f.write_str(&STANDARD.encode(bytes)),
            Self::Timestamp(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}
