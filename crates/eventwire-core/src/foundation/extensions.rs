//! Extension attributes.

use std::collections::BTreeMap;

use super::spec::SpecVersion;
use super::value::Value;
use crate::error::{BindingError, BindingResult};

/// Names that structured formats reserve for the payload.
const RESERVED_NAMES: [&str; 2] = ["data", "data_base64"];

/// Case-insensitive map of extension name to scalar value.
///
/// Names are stored lower-cased, so iteration yields them in lexicographic
/// order regardless of insertion order. Values are stored as boolean, integer
/// or string; other types are kept in their canonical string form, which is
/// all a structured format can carry for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    entries: BTreeMap<String, Value>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that `name` is a legal extension name and returns its stored form.
    pub fn normalize_name(name: &str) -> BindingResult<String> {
        if name.is_empty() {
            return Err(BindingError::invalid_value(name, "extension name is empty"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BindingError::invalid_value(
                name,
                "extension names must be ASCII alphanumeric",
            ));
        }
        Ok(name.to_ascii_lowercase())
    }

    /// Rejects names that are attribute wire keys of `version` or payload
    /// members of the structured form.
    pub fn check_reserved(version: SpecVersion, name: &str) -> BindingResult<()> {
        let lower = name.to_ascii_lowercase();
        if version.semantic_of(&lower).is_some() || RESERVED_NAMES.contains(&lower.as_str()) {
            return Err(BindingError::invalid_value(
                name,
                format!("reserved in spec version {version}"),
            ));
        }
        Ok(())
    }

    /// The stored form of an extension value.
    pub fn canonical(value: Value) -> Value {
        match value {
            Value::Bool(_) | Value::Integer(_) | Value::String(_) => value,
            Value::Uri(s) | Value::UriRef(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Inserts or replaces an extension, returning the previous value.
    pub fn insert(&mut self, name: &str, value: Value) -> BindingResult<Option<Value>> {
        let key = Self::normalize_name(name)?;
        Ok(self.entries.insert(key, Self::canonical(value)))
    }

    /// Removes an extension. Removing an absent name is a no-op.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates extensions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<'a> IntoIterator for &'a Extensions {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut ext = Extensions::new();
        ext.insert("TraceParent", Value::from("00-abc")).unwrap();

        assert!(ext.contains("traceparent"));
        assert_eq!(ext.get("TRACEPARENT"), Some(&Value::from("00-abc")));
        assert_eq!(ext.iter().next().map(|(k, _)| k), Some("traceparent"));
    }

    #[test]
    fn test_insert_replaces() {
        let mut ext = Extensions::new();
        assert_eq!(ext.insert("aaa", Value::from("bbb")).unwrap(), None);
        assert_eq!(
            ext.insert("AAA", Value::Integer(1)).unwrap(),
            Some(Value::from("bbb"))
        );
        assert_eq!(ext.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut ext = Extensions::new();
        ext.insert("aaa", Value::from("bbb")).unwrap();
        assert_eq!(ext.remove("ccc"), None);
        assert_eq!(ext.len(), 1);
    }

    #[test]
    fn test_invalid_names() {
        let mut ext = Extensions::new();
        assert!(ext.insert("", Value::Bool(true)).is_err());
        assert!(ext.insert("with-dash", Value::Bool(true)).is_err());
        assert!(ext.is_empty());
    }

    #[test]
    fn test_values_stored_canonically() {
        let mut ext = Extensions::new();
        ext.insert("blob", Value::Binary(vec![1, 2, 3])).unwrap();
        ext.insert("link", Value::Uri("http://example.com".into())).unwrap();
        ext.insert("flag", Value::Bool(true)).unwrap();

        assert_eq!(ext.get("blob"), Some(&Value::from("AQID")));
        assert_eq!(ext.get("link"), Some(&Value::from("http://example.com")));
        assert_eq!(ext.get("flag"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_reserved_names() {
        assert!(Extensions::check_reserved(SpecVersion::V10, "subject").is_err());
        assert!(Extensions::check_reserved(SpecVersion::V02, "subject").is_ok());
        assert!(Extensions::check_reserved(SpecVersion::V02, "contenttype").is_err());
        assert!(Extensions::check_reserved(SpecVersion::V10, "DATA").is_err());
        assert!(Extensions::check_reserved(SpecVersion::V10, "region").is_ok());
    }

    #[test]
    fn test_iteration_is_sorted() {
        let mut ext = Extensions::new();
        ext.insert("zeta", Value::Integer(1)).unwrap();
        ext.insert("alpha", Value::Integer(2)).unwrap();
        let names: Vec<_> = ext.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
