//! Message encodings.

use std::fmt;

/// How a message carries its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Metadata as discrete fields, payload carried separately.
    Binary,
    /// The whole event serialized in one payload of a known format.
    Structured,
    /// No wire encoding, e.g. a fully materialized event.
    Unknown,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Binary => "binary",
            Self::Structured => "structured",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
