//! Attribute registry.
//!
//! Each known spec version owns an immutable table of [`AttributeDescriptor`]s
//! mapping semantic attribute kinds to their version-specific wire keys. The
//! tables are `static` and shared by every bind without synchronization.
//!
//! ```text
//!  kind             0.2           0.3              1.0
//!  SpecVersion      specversion   specversion      specversion
//!  Id               id            id               id
//!  Source           source        source           source
//!  Type             type          type             type
//!  DataContentType  contenttype   datacontenttype  datacontenttype
//!  DataSchema       schemaurl     schemaurl        dataschema
//!  Subject          -             subject          subject
//!  Time             time          time             time
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::value::{Value, ValueType};
use crate::error::{BindingError, BindingResult};

// ============================================================================
// Spec Version
// ============================================================================

/// A known revision of the event specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpecVersion {
    #[serde(rename = "0.2")]
    V02,
    #[serde(rename = "0.3")]
    V03,
    #[serde(rename = "1.0")]
    V10,
}

impl SpecVersion {
    /// All versions with a registry table, oldest first.
    pub const ALL: [SpecVersion; 3] = [SpecVersion::V02, SpecVersion::V03, SpecVersion::V10];

    /// Returns the version string as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V02 => "0.2",
            Self::V03 => "0.3",
            Self::V10 => "1.0",
        }
    }

    /// Returns the attribute table of this version, in write order.
    pub fn descriptors(self) -> &'static [AttributeDescriptor] {
        match self {
            Self::V02 => &V02_ATTRIBUTES,
            Self::V03 => &V03_ATTRIBUTES,
            Self::V10 => &V10_ATTRIBUTES,
        }
    }

    /// Returns the descriptor of `kind` in this version, if the version defines it.
    pub fn attribute(self, kind: AttributeKind) -> Option<&'static AttributeDescriptor> {
        self.descriptors().iter().find(|d| d.kind == kind)
    }

    /// Resolves a wire key (case-insensitive) to its descriptor.
    pub fn semantic_of(self, wire_key: &str) -> Option<&'static AttributeDescriptor> {
        self.descriptors()
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(wire_key))
    }
}

impl FromStr for SpecVersion {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0.2" => Ok(Self::V02),
            "0.3" => Ok(Self::V03),
            "1.0" => Ok(Self::V10),
            other => Err(BindingError::UnsupportedSpecVersion(other.to_string())),
        }
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the ordered attribute table of `version`.
pub fn descriptors_for(version: SpecVersion) -> &'static [AttributeDescriptor] {
    version.descriptors()
}

/// Resolves `wire_key` within `version`.
pub fn semantic_of(wire_key: &str, version: SpecVersion) -> Option<&'static AttributeDescriptor> {
    version.semantic_of(wire_key)
}

// ============================================================================
// Attribute Kind
// ============================================================================

/// Version-independent identity of a context attribute.
///
/// Declaration order is the registry write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    SpecVersion,
    Id,
    Source,
    Type,
    DataContentType,
    DataSchema,
    Subject,
    Time,
}

impl AttributeKind {
    /// Every kind, in registry order.
    pub const ALL: [AttributeKind; 8] = [
        AttributeKind::SpecVersion,
        AttributeKind::Id,
        AttributeKind::Source,
        AttributeKind::Type,
        AttributeKind::DataContentType,
        AttributeKind::DataSchema,
        AttributeKind::Subject,
        AttributeKind::Time,
    ];

    /// Returns the semantic (1.0) name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpecVersion => "specversion",
            Self::Id => "id",
            Self::Source => "source",
            Self::Type => "type",
            Self::DataContentType => "datacontenttype",
            Self::DataSchema => "dataschema",
            Self::Subject => "subject",
            Self::Time => "time",
        }
    }

    /// Returns true if every version requires this attribute.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Self::SpecVersion | Self::Id | Self::Source | Self::Type
        )
    }
}

impl FromStr for AttributeKind {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .or_else(|| {
                // Older wire keys resolve to the same semantic attribute.
                SpecVersion::ALL
                    .into_iter()
                    .find_map(|v| v.semantic_of(&lower))
                    .map(|d| d.kind)
            })
            .ok_or_else(|| BindingError::invalid_value(s, "not a known attribute"))
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Attribute Descriptor
// ============================================================================

/// Registry entry describing one attribute in one spec version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeDescriptor {
    kind: AttributeKind,
    name: &'static str,
    required: bool,
    value_type: ValueType,
    version: SpecVersion,
}

impl AttributeDescriptor {
    const fn new(
        version: SpecVersion,
        kind: AttributeKind,
        name: &'static str,
        required: bool,
        value_type: ValueType,
    ) -> Self {
        Self {
            kind,
            name,
            required,
            value_type,
            version,
        }
    }

    /// Semantic identity.
    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// Version-specific wire key.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn version(&self) -> SpecVersion {
        self.version
    }

    /// Converts `value` to this attribute's type and enforces non-empty
    /// required values.
    pub fn coerce(&self, value: Value) -> BindingResult<Value> {
        let value = value.coerce(self.name, self.value_type)?;
        if self.required && value.as_str().is_some_and(str::is_empty) {
            return Err(BindingError::invalid_value(
                self.name,
                "required attribute cannot be empty",
            ));
        }
        Ok(value)
    }
}

use AttributeKind as K;
use SpecVersion::{V02, V03, V10};
use ValueType as T;

static V02_ATTRIBUTES: [AttributeDescriptor; 7] = [
    AttributeDescriptor::new(V02, K::SpecVersion, "specversion", true, T::String),
    AttributeDescriptor::new(V02, K::Id, "id", true, T::String),
    AttributeDescriptor::new(V02, K::Source, "source", true, T::UriRef),
    AttributeDescriptor::new(V02, K::Type, "type", true, T::String),
    AttributeDescriptor::new(V02, K::DataContentType, "contenttype", false, T::String),
    AttributeDescriptor::new(V02, K::DataSchema, "schemaurl", false, T::UriRef),
    AttributeDescriptor::new(V02, K::Time, "time", false, T::Timestamp),
];

static V03_ATTRIBUTES: [AttributeDescriptor; 8] = [
    AttributeDescriptor::new(V03, K::SpecVersion, "specversion", true, T::String),
    AttributeDescriptor::new(V03, K::Id, "id", true, T::String),
    AttributeDescriptor::new(V03, K::Source, "source", true, T::UriRef),
    AttributeDescriptor::new(V03, K::Type, "type", true, T::String),
    AttributeDescriptor::new(V03, K::DataContentType, "datacontenttype", false, T::String),
    AttributeDescriptor::new(V03, K::DataSchema, "schemaurl", false, T::UriRef),
    AttributeDescriptor::new(V03, K::Subject, "subject", false, T::String),
    AttributeDescriptor::new(V03, K::Time, "time", false, T::Timestamp),
];

static V10_ATTRIBUTES: [AttributeDescriptor; 8] = [
    AttributeDescriptor::new(V10, K::SpecVersion, "specversion", true, T::String),
    AttributeDescriptor::new(V10, K::Id, "id", true, T::String),
    AttributeDescriptor::new(V10, K::Source, "source", true, T::UriRef),
    AttributeDescriptor::new(V10, K::Type, "type", true, T::String),
    AttributeDescriptor::new(V10, K::DataContentType, "datacontenttype", false, T::String),
    AttributeDescriptor::new(V10, K::DataSchema, "dataschema", false, T::Uri),
    AttributeDescriptor::new(V10, K::Subject, "subject", false, T::String),
    AttributeDescriptor::new(V10, K::Time, "time", false, T::Timestamp),
];
