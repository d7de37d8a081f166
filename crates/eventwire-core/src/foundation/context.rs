//! Versioned event context.
//!
//! [`EventContext`] holds the metadata of an event: the required attributes,
//! the optional attributes (absent is distinct from empty) and the extensions.
//! All access by [`AttributeKind`] is resolved through the registry table of
//! the context's [`SpecVersion`].

use chrono::{DateTime, Utc};
use tracing::trace;
use uuid::Uuid;

use super::extensions::Extensions;
use super::spec::{AttributeDescriptor, AttributeKind, SpecVersion};
use super::value::{Value, ValueType};
use crate::error::{BindingError, BindingResult};

/// The metadata portion of an event.
///
/// Required attributes are always present and non-empty; every mutator
/// preserves that invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    version: SpecVersion,
    id: String,
    source: String,
    ty: String,
    data_content_type: Option<String>,
    data_schema: Option<String>,
    subject: Option<String>,
    time: Option<DateTime<Utc>>,
    extensions: Extensions,
}

impl EventContext {
    /// Creates a context with the required attributes.
    pub fn new(
        version: SpecVersion,
        id: impl Into<String>,
        source: impl Into<String>,
        ty: impl Into<String>,
    ) -> BindingResult<Self> {
        let required = |kind: AttributeKind, value: String| -> BindingResult<String> {
            let descriptor = Self::lookup(version, kind)?;
            Ok(text(descriptor.coerce(Value::String(value))?))
        };

        Ok(Self {
            version,
            id: required(AttributeKind::Id, id.into())?,
            source: required(AttributeKind::Source, source.into())?,
            ty: required(AttributeKind::Type, ty.into())?,
            data_content_type: None,
            data_schema: None,
            subject: None,
            time: None,
            extensions: Extensions::new(),
        })
    }

    /// Creates a context with a random UUID as its id.
    pub fn generated(
        version: SpecVersion,
        source: impl Into<String>,
        ty: impl Into<String>,
    ) -> BindingResult<Self> {
        Self::new(version, Uuid::new_v4().to_string(), source, ty)
    }

    fn lookup(
        version: SpecVersion,
        kind: AttributeKind,
    ) -> BindingResult<&'static AttributeDescriptor> {
        version
            .attribute(kind)
            .ok_or(BindingError::UnknownAttribute {
                attribute: kind.as_str(),
                version,
            })
    }

    pub fn version(&self) -> SpecVersion {
        self.version
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ty(&self) -> &str {
        &self.ty
    }

    pub fn data_content_type(&self) -> Option<&str> {
        self.data_content_type.as_deref()
    }

    pub fn data_schema(&self) -> Option<&str> {
        self.data_schema.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns the descriptor of `kind` in this context's version.
    pub fn descriptor(&self, kind: AttributeKind) -> Option<&'static AttributeDescriptor> {
        self.version.attribute(kind)
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    /// Returns the value of an attribute, or `None` if it is absent or not
    /// defined in this version.
    pub fn get(&self, kind: AttributeKind) -> Option<Value> {
        let descriptor = self.descriptor(kind)?;
        let textual = |s: &str| match descriptor.value_type() {
            ValueType::Uri => Value::Uri(s.to_string()),
            ValueType::UriRef => Value::UriRef(s.to_string()),
            _ => Value::String(s.to_string()),
        };

        match kind {
            AttributeKind::SpecVersion => Some(textual(self.version.as_str())),
            AttributeKind::Id => Some(textual(&self.id)),
            AttributeKind::Source => Some(textual(&self.source)),
            AttributeKind::Type => Some(textual(&self.ty)),
            AttributeKind::DataContentType => self.data_content_type.as_deref().map(textual),
            AttributeKind::DataSchema => self.data_schema.as_deref().map(textual),
            AttributeKind::Subject => self.subject.as_deref().map(textual),
            AttributeKind::Time => self.time.map(Value::Timestamp),
        }
    }

    /// Sets an attribute, converting the value to the attribute's type.
    ///
    /// Setting [`AttributeKind::SpecVersion`] converts the whole context.
    pub fn set(&mut self, kind: AttributeKind, value: impl Into<Value>) -> BindingResult<()> {
        let descriptor = Self::lookup(self.version, kind)?;
        let value = descriptor.coerce(value.into())?;

        match kind {
            AttributeKind::SpecVersion => {
                let target: SpecVersion = text(value).parse()?;
                *self = self.to_version(target)?;
            }
            AttributeKind::Id => self.id = text(value),
            AttributeKind::Source => self.source = text(value),
            AttributeKind::Type => self.ty = text(value),
            AttributeKind::DataContentType => self.data_content_type = Some(text(value)),
            AttributeKind::DataSchema => self.data_schema = Some(text(value)),
            AttributeKind::Subject => self.subject = Some(text(value)),
            AttributeKind::Time => self.time = value.as_timestamp(),
        }
        Ok(())
    }

    /// Removes an optional attribute.
    ///
    /// Fails with [`BindingError::CannotUnsetRequiredAttribute`] for required
    /// attributes. Unsetting an absent attribute, or one this version does not
    /// define, is a no-op.
    pub fn unset(&mut self, kind: AttributeKind) -> BindingResult<()> {
        let Some(descriptor) = self.descriptor(kind) else {
            return Ok(());
        };
        if descriptor.required() {
            return Err(BindingError::CannotUnsetRequiredAttribute {
                attribute: descriptor.name(),
            });
        }

        match kind {
            AttributeKind::DataContentType => self.data_content_type = None,
            AttributeKind::DataSchema => self.data_schema = None,
            AttributeKind::Subject => self.subject = None,
            AttributeKind::Time => self.time = None,
            AttributeKind::SpecVersion
            | AttributeKind::Id
            | AttributeKind::Source
            | AttributeKind::Type => {}
        }
        Ok(())
    }

    /// Iterates the present attributes in registry order, specversion first.
    pub fn attributes(&self) -> impl Iterator<Item = (&'static AttributeDescriptor, Value)> + '_ {
        self.version
            .descriptors()
            .iter()
            .filter_map(|d| self.get(d.kind()).map(|v| (d, v)))
    }

    // ------------------------------------------------------------------------
    // Extensions
    // ------------------------------------------------------------------------

    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.extensions.get(name)
    }

    /// Sets an extension. Names that shadow an attribute of this version are
    /// rejected.
    pub fn set_extension(&mut self, name: &str, value: impl Into<Value>) -> BindingResult<()> {
        Extensions::check_reserved(self.version, name)?;
        self.extensions.insert(name, value.into())?;
        Ok(())
    }

    /// Removes an extension. Removing an absent extension is a no-op.
    pub fn unset_extension(&mut self, name: &str) -> Option<Value> {
        self.extensions.remove(name)
    }

    // ------------------------------------------------------------------------
    // Version conversion
    // ------------------------------------------------------------------------

    /// Returns a copy of this context expressed in `target`.
    ///
    /// Optional attributes the target does not define become extensions under
    /// their semantic name; extensions named like a target attribute are
    /// promoted to that attribute.
    pub fn to_version(&self, target: SpecVersion) -> BindingResult<Self> {
        if target == self.version {
            return Ok(self.clone());
        }

        let mut out = Self::new(target, &self.id, &self.source, &self.ty)?;
        for (descriptor, value) in self.attributes() {
            let kind = descriptor.kind();
            if kind.is_required() {
                continue;
            }
            if target.attribute(kind).is_some() {
                out.set(kind, value)?;
            } else {
                trace!(attribute = %kind, version = %target, "Demoting attribute to extension");
                out.extensions.insert(kind.as_str(), value)?;
            }
        }

        for (name, value) in self.extensions.iter() {
            match target.semantic_of(name) {
                Some(descriptor) => {
                    trace!(extension = %name, version = %target, "Promoting extension to attribute");
                    out.set(descriptor.kind(), value.clone())?;
                }
                None => {
                    out.extensions.insert(name, value.clone())?;
                }
            }
        }

        Ok(out)
    }
}

fn text(value: Value) -> String {
    match value {
        Value::String(s) | Value::Uri(s) | Value::UriRef(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> EventContext {
        EventContext::new(SpecVersion::V10, "1", "/source", "com.example.test").unwrap()
    }

    #[test]
    fn test_new_rejects_empty_required() {
        let err = EventContext::new(SpecVersion::V10, "", "/source", "t").unwrap_err();
        assert!(matches!(err, BindingError::InvalidValue { ref name, .. } if name == "id"));
    }

    #[test]
    fn test_generated_id() {
        let ctx = EventContext::generated(SpecVersion::V03, "/source", "t").unwrap();
        assert!(Uuid::parse_str(ctx.id()).is_ok());
    }

    #[test]
    fn test_set_and_unset_optional() {
        let mut ctx = context();
        ctx.set(AttributeKind::Subject, "aaa").unwrap();
        assert_eq!(ctx.subject(), Some("aaa"));

        ctx.unset(AttributeKind::Subject).unwrap();
        assert_eq!(ctx.subject(), None);

        // Absent optional: no-op.
        ctx.unset(AttributeKind::Subject).unwrap();
        ctx.unset(AttributeKind::Time).unwrap();
    }

    #[test]
    fn test_empty_subject_is_not_absent() {
        let mut ctx = context();
        ctx.set(AttributeKind::Subject, "").unwrap();
        assert_eq!(ctx.get(AttributeKind::Subject), Some(Value::from("")));
    }

    #[test]
    fn test_unset_required_fails() {
        let mut ctx = context();
        for kind in [
            AttributeKind::SpecVersion,
            AttributeKind::Id,
            AttributeKind::Source,
            AttributeKind::Type,
        ] {
            let err = ctx.unset(kind).unwrap_err();
            assert!(matches!(err, BindingError::CannotUnsetRequiredAttribute { .. }));
        }
        assert_eq!(ctx.id(), "1");
    }

    #[test]
    fn test_required_can_be_replaced() {
        let mut ctx = context();
        ctx.set(AttributeKind::Id, "2").unwrap();
        assert_eq!(ctx.id(), "2");
        assert!(ctx.set(AttributeKind::Id, "").is_err());
        assert_eq!(ctx.id(), "2");
    }

    #[test]
    fn test_time_from_string() {
        let mut ctx = context();
        ctx.set(AttributeKind::Time, "2020-01-02T03:04:05Z").unwrap();
        assert_eq!(
            ctx.time(),
            Some(Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn test_unknown_attribute_in_version() {
        let mut ctx = EventContext::new(SpecVersion::V02, "1", "/s", "t").unwrap();
        assert_eq!(ctx.get(AttributeKind::Subject), None);
        ctx.unset(AttributeKind::Subject).unwrap();
        let err = ctx.set(AttributeKind::Subject, "x").unwrap_err();
        assert!(matches!(err, BindingError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_extension_ops() {
        let mut ctx = context();
        ctx.set_extension("aaa", "bbb").unwrap();
        assert_eq!(ctx.extension("AAA"), Some(&Value::from("bbb")));
        assert_eq!(ctx.unset_extension("ccc"), None);
        assert_eq!(ctx.unset_extension("aaa"), Some(Value::from("bbb")));
        assert!(ctx.extensions().is_empty());
    }

    #[test]
    fn test_reserved_extension_names() {
        let mut ctx = context();
        assert!(ctx.set_extension("subject", "x").is_err());
        assert!(ctx.set_extension("data", "x").is_err());

        // 0.2 has no subject attribute, so the name is free.
        let mut old = EventContext::new(SpecVersion::V02, "1", "/s", "t").unwrap();
        old.set_extension("subject", "x").unwrap();
    }

    #[test]
    fn test_attributes_in_registry_order() {
        let mut ctx = context();
        ctx.set(AttributeKind::Time, "2020-01-02T03:04:05Z").unwrap();
        ctx.set(AttributeKind::Subject, "s").unwrap();
        let names: Vec<_> = ctx.attributes().map(|(d, _)| d.name()).collect();
        assert_eq!(names, ["specversion", "id", "source", "type", "subject", "time"]);
    }

    #[test]
    fn test_version_roundtrip_through_v02() {
        let mut ctx = context();
        ctx.set(AttributeKind::Subject, "sub").unwrap();
        ctx.set(AttributeKind::DataContentType, "text/plain").unwrap();
        ctx.set_extension("ext", 7).unwrap();

        let old = ctx.to_version(SpecVersion::V02).unwrap();
        assert_eq!(old.version(), SpecVersion::V02);
        assert_eq!(old.extension("subject"), Some(&Value::from("sub")));
        assert_eq!(
            old.get(AttributeKind::DataContentType),
            Some(Value::from("text/plain"))
        );

        let back = old.to_version(SpecVersion::V10).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn test_set_specversion_converts() {
        let mut ctx = context();
        ctx.set(AttributeKind::SpecVersion, "0.3").unwrap();
        assert_eq!(ctx.version(), SpecVersion::V03);
        assert!(ctx.set(AttributeKind::SpecVersion, "2.0").is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let original = context();
        let mut copy = original.clone();
        copy.set(AttributeKind::Subject, "changed").unwrap();
        copy.set_extension("aaa", "bbb").unwrap();

        assert_eq!(original.subject(), None);
        assert!(original.extensions().is_empty());
    }
}
