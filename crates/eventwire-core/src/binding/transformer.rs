//! Event transformers.
//!
//! A [`Transformer`] mutates an event on its way from source to destination.
//! Each transformer has a whole-event form ([`Transformer::transform`]) and,
//! when it can work field by field, a streaming form that wraps a
//! [`BinaryWriter`]. Both forms produce the same observable result.
//!
//! [`Transformers`] is an ordered chain; the first failure aborts it.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace};

use super::writer::BinaryWriter;
use crate::error::{BindingError, BindingResult};
use crate::foundation::event::Event;
use crate::foundation::extensions::Extensions;
use crate::foundation::spec::{AttributeDescriptor, AttributeKind, SpecVersion};
use crate::foundation::value::Value;

/// A single event mutation.
pub trait Transformer: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Applies the mutation to a materialized event.
    fn transform(&self, event: &mut Event) -> BindingResult<()>;

    /// Returns true if [`wrap_binary`](Self::wrap_binary) implements the
    /// mutation without materializing the event.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Wraps `writer` so the mutation is applied as fields stream through.
    fn wrap_binary<'a>(&'a self, writer: Box<dyn BinaryWriter + 'a>) -> Box<dyn BinaryWriter + 'a> {
        writer
    }
}

// ============================================================================
// Chain
// ============================================================================

/// An ordered chain of transformers. Cloning shares the transformers.
#[derive(Clone, Default)]
pub struct Transformers {
    chain: Vec<Arc<dyn Transformer>>,
}

impl Transformers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transformer.
    pub fn with(mut self, transformer: impl Transformer + 'static) -> Self {
        self.push(transformer);
        self
    }

    pub fn push(&mut self, transformer: impl Transformer + 'static) {
        self.chain.push(Arc::new(transformer));
    }

    pub fn push_shared(&mut self, transformer: Arc<dyn Transformer>) {
        self.chain.push(transformer);
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Transformer>> {
        self.chain.iter()
    }

    /// Returns true if every member can stream.
    pub fn supports_streaming(&self) -> bool {
        self.chain.iter().all(|t| t.supports_streaming())
    }

    /// Applies the chain in order.
    pub fn apply(&self, event: &mut Event) -> BindingResult<()> {
        for transformer in &self.chain {
            if let Err(e) = transformer.transform(event) {
                debug!(transformer = transformer.name(), error = %e, "Transformer failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Wraps `writer` with every member; the first transformer sees each
    /// field first.
    pub fn wrap_binary<'a>(&'a self, writer: Box<dyn BinaryWriter + 'a>) -> Box<dyn BinaryWriter + 'a> {
        self.chain
            .iter()
            .rev()
            .fold(writer, |inner, transformer| transformer.wrap_binary(inner))
    }
}

impl fmt::Debug for Transformers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.chain.iter().map(|t| t.name()))
            .finish()
    }
}

impl FromIterator<Arc<dyn Transformer>> for Transformers {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Transformer>>>(iter: I) -> Self {
        Self {
            chain: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Delete
// ============================================================================

/// Removes an optional attribute. Deleting a required attribute fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteAttribute {
    kind: AttributeKind,
}

impl DeleteAttribute {
    pub fn new(kind: AttributeKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }
}

impl Transformer for DeleteAttribute {
    fn name(&self) -> &str {
        "delete_attribute"
    }

    fn transform(&self, event: &mut Event) -> BindingResult<()> {
        event.unset(self.kind)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn wrap_binary<'a>(&'a self, writer: Box<dyn BinaryWriter + 'a>) -> Box<dyn BinaryWriter + 'a> {
        Box::new(DeleteAttributeWriter {
            kind: self.kind,
            inner: writer,
        })
    }
}

struct DeleteAttributeWriter<'a> {
    kind: AttributeKind,
    inner: Box<dyn BinaryWriter + 'a>,
}

impl BinaryWriter for DeleteAttributeWriter<'_> {
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        self.inner.start(version)
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()> {
        if attribute.kind() != self.kind {
            return self.inner.set_attribute(attribute, value);
        }
        if attribute.required() {
            return Err(BindingError::CannotUnsetRequiredAttribute {
                attribute: attribute.name(),
            });
        }
        trace!(attribute = attribute.name(), "Dropped attribute");
        Ok(())
    }

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()> {
        self.inner.set_extension(name, value)
    }

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()> {
        self.inner.set_data(data)
    }

    fn end(&mut self) -> BindingResult<()> {
        self.inner.end()
    }
}

/// Removes an extension, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteExtension {
    name: String,
}

impl DeleteExtension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.name
    }
}

impl Transformer for DeleteExtension {
    fn name(&self) -> &str {
        "delete_extension"
    }

    fn transform(&self, event: &mut Event) -> BindingResult<()> {
        event.unset_extension(&self.name);
        Ok(())
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn wrap_binary<'a>(&'a self, writer: Box<dyn BinaryWriter + 'a>) -> Box<dyn BinaryWriter + 'a> {
        Box::new(DeleteExtensionWriter {
            name: &self.name,
            inner: writer,
        })
    }
}

struct DeleteExtensionWriter<'a> {
    name: &'a str,
    inner: Box<dyn BinaryWriter + 'a>,
}

impl BinaryWriter for DeleteExtensionWriter<'_> {
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        self.inner.start(version)
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()> {
        self.inner.set_attribute(attribute, value)
    }

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()> {
        if name.eq_ignore_ascii_case(self.name) {
            trace!(extension = name, "Dropped extension");
            return Ok(());
        }
        self.inner.set_extension(name, value)
    }

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()> {
        self.inner.set_data(data)
    }

    fn end(&mut self) -> BindingResult<()> {
        self.inner.end()
    }
}

// ============================================================================
// Update
// ============================================================================

/// Computes a new value from the current one; `None` in means absent,
/// `None` out means delete.
pub type Updater = dyn Fn(Option<&Value>) -> BindingResult<Option<Value>> + Send + Sync;

/// Rewrites an attribute through an updater function.
///
/// The updater is called once per bind: with the current value when the
/// attribute is present, with `None` otherwise.
#[derive(Clone)]
pub struct UpdateAttribute {
    kind: AttributeKind,
    updater: Arc<Updater>,
}

impl UpdateAttribute {
    pub fn new<F>(kind: AttributeKind, updater: F) -> Self
    where
        F: Fn(Option<&Value>) -> BindingResult<Option<Value>> + Send + Sync + 'static,
    {
        Self {
            kind,
            updater: Arc::new(updater),
        }
    }

    /// Sets the attribute only if it is absent.
    pub fn add(kind: AttributeKind, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(kind, move |current| {
            Ok(Some(current.cloned().unwrap_or_else(|| value.clone())))
        })
    }

    /// Stamps the current time on events without one.
    pub fn default_time_now() -> Self {
        Self::new(AttributeKind::Time, |current| {
            Ok(Some(
                current
                    .cloned()
                    .unwrap_or_else(|| Value::Timestamp(Utc::now())),
            ))
        })
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }
}

impl fmt::Debug for UpdateAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateAttribute")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Transformer for UpdateAttribute {
    fn name(&self) -> &str {
        "update_attribute"
    }

    fn transform(&self, event: &mut Event) -> BindingResult<()> {
        let current = event.get(self.kind);
        match (self.updater)(current.as_ref())? {
            Some(value) => event.set(self.kind, value),
            None => event.unset(self.kind),
        }
    }

    /// Changing the spec version converts the whole context, which needs the
    /// materialized event.
    fn supports_streaming(&self) -> bool {
        self.kind != AttributeKind::SpecVersion
    }

    fn wrap_binary<'a>(&'a self, writer: Box<dyn BinaryWriter + 'a>) -> Box<dyn BinaryWriter + 'a> {
        Box::new(UpdateAttributeWriter {
            transformer: self,
            inner: writer,
            version: None,
            seen: false,
        })
    }
}

struct UpdateAttributeWriter<'a> {
    transformer: &'a UpdateAttribute,
    inner: Box<dyn BinaryWriter + 'a>,
    version: Option<SpecVersion>,
    seen: bool,
}

impl UpdateAttributeWriter<'_> {
    fn write(&mut self, attribute: &'static AttributeDescriptor, current: Option<&Value>) -> BindingResult<()> {
        match (self.transformer.updater)(current)? {
            Some(value) => self.inner.set_attribute(attribute, attribute.coerce(value)?),
            None if attribute.required() => Err(BindingError::CannotUnsetRequiredAttribute {
                attribute: attribute.name(),
            }),
            None => Ok(()),
        }
    }
}

impl BinaryWriter for UpdateAttributeWriter<'_> {
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        self.version = Some(version);
        self.seen = false;
        self.inner.start(version)
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()> {
        if attribute.kind() != self.transformer.kind {
            return self.inner.set_attribute(attribute, value);
        }
        self.seen = true;
        self.write(attribute, Some(&value))
    }

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()> {
        self.inner.set_extension(name, value)
    }

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()> {
        self.inner.set_data(data)
    }

    fn end(&mut self) -> BindingResult<()> {
        if !self.seen {
            if let Some(version) = self.version {
                let kind = self.transformer.kind;
                match version.attribute(kind) {
                    Some(attribute) => self.write(attribute, None)?,
                    None => {
                        if (self.transformer.updater)(None)?.is_some() {
                            return Err(BindingError::UnknownAttribute {
                                attribute: kind.as_str(),
                                version,
                            });
                        }
                    }
                }
            }
        }
        self.inner.end()
    }
}

/// Rewrites an extension through an updater function.
#[derive(Clone)]
pub struct UpdateExtension {
    name: String,
    updater: Arc<Updater>,
}

impl UpdateExtension {
    pub fn new<F>(name: &str, updater: F) -> BindingResult<Self>
    where
        F: Fn(Option<&Value>) -> BindingResult<Option<Value>> + Send + Sync + 'static,
    {
        Ok(Self {
            name: Extensions::normalize_name(name)?,
            updater: Arc::new(updater),
        })
    }

    /// Sets the extension only if it is absent.
    pub fn add(name: &str, value: impl Into<Value>) -> BindingResult<Self> {
        let value = value.into();
        Self::new(name, move |current| {
            Ok(Some(current.cloned().unwrap_or_else(|| value.clone())))
        })
    }

    pub fn extension(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for UpdateExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateExtension")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Transformer for UpdateExtension {
    fn name(&self) -> &str {
        "update_extension"
    }

    fn transform(&self, event: &mut Event) -> BindingResult<()> {
        let current = event.extension(&self.name).cloned();
        match (self.updater)(current.as_ref())? {
            Some(value) => event.set_extension(&self.name, value),
            None => {
                event.unset_extension(&self.name);
                Ok(())
            }
        }
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn wrap_binary<'a>(&'a self, writer: Box<dyn BinaryWriter + 'a>) -> Box<dyn BinaryWriter + 'a> {
        Box::new(UpdateExtensionWriter {
            transformer: self,
            inner: writer,
            version: None,
            seen: false,
        })
    }
}

struct UpdateExtensionWriter<'a> {
    transformer: &'a UpdateExtension,
    inner: Box<dyn BinaryWriter + 'a>,
    version: Option<SpecVersion>,
    seen: bool,
}

impl BinaryWriter for UpdateExtensionWriter<'_> {
    fn start(&mut self, version: SpecVersion) -> BindingResult<()> {
        self.version = Some(version);
        self.seen = false;
        self.inner.start(version)
    }

    fn set_attribute(
        &mut self,
        attribute: &'static AttributeDescriptor,
        value: Value,
    ) -> BindingResult<()> {
        self.inner.set_attribute(attribute, value)
    }

    fn set_extension(&mut self, name: &str, value: Value) -> BindingResult<()> {
        if !name.eq_ignore_ascii_case(&self.transformer.name) {
            return self.inner.set_extension(name, value);
        }
        self.seen = true;
        match (self.transformer.updater)(Some(&value))? {
            Some(value) => self.inner.set_extension(name, value),
            None => Ok(()),
        }
    }

    fn set_data(&mut self, data: &[u8]) -> BindingResult<()> {
        self.inner.set_data(data)
    }

    fn end(&mut self) -> BindingResult<()> {
        if !self.seen {
            if let Some(value) = (self.transformer.updater)(None)? {
                if let Some(version) = self.version {
                    Extensions::check_reserved(version, &self.transformer.name)?;
                }
                self.inner.set_extension(&self.transformer.name, value)?;
            }
        }
        self.inner.end()
    }
}

// ============================================================================
// Whole-event transformers
// ============================================================================

/// Converts the event to another spec version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertVersion {
    target: SpecVersion,
}

impl ConvertVersion {
    pub fn new(target: SpecVersion) -> Self {
        Self { target }
    }
}

impl Transformer for ConvertVersion {
    fn name(&self) -> &str {
        "convert_version"
    }

    fn transform(&self, event: &mut Event) -> BindingResult<()> {
        let converted = event.context().to_version(self.target)?;
        *event.context_mut() = converted;
        Ok(())
    }
}

/// A named closure over the whole event.
pub struct EventFn<F> {
    name: String,
    f: F,
}

impl<F> EventFn<F>
where
    F: Fn(&mut Event) -> BindingResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Transformer for EventFn<F>
where
    F: Fn(&mut Event) -> BindingResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, event: &mut Event) -> BindingResult<()> {
        (self.f)(event)
    }
}
