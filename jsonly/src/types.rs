//! Common type definitions.
//!
//! This module defines:
//! - Type aliases for entity IDs (UserId, DocumentId, etc.)
//! - [`DocumentValue`], the opaque payload carried by every document-store
//!   operation
//!
//! # ID Types
//!
//! The document store addresses everything by string keys. Some are generated
//! (UUIDs), some are composite (`{uid}-{folder}-{name}` for templates), so the
//! aliases are plain strings rather than a structured id type:
//!
//! - [`UserId`]: identity-provider user id, also the `users` document id
//! - [`DocumentId`]: any document id within a collection
//! - [`TemplateId`]: template document id (generated or composite)
//! - [`TaskId`]: analysis-backend async task id

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Error, Result};

// Type aliases for IDs
pub type UserId = String;
pub type DocumentId = String;
pub type TemplateId = String;
pub type TaskId = String;

/// An opaque document payload: a string-keyed map of JSON values.
///
/// This is the unit of storage for the document store. No schema is enforced
/// beyond "valid JSON object"; services that need structure decode it into
/// their own model types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentValue(Map<String, Value>);

impl DocumentValue {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Read a field as a string slice, `None` if absent or not a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Overlay `other` on top of this document. Top-level fields from `other`
    /// replace fields of the same name; everything else is kept.
    pub fn merge_from(&mut self, other: &DocumentValue) {
        for (field, value) in &other.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for DocumentValue {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<DocumentValue> for Value {
    fn from(doc: DocumentValue) -> Self {
        Value::Object(doc.0)
    }
}

impl TryFrom<Value> for DocumentValue {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidDocument {
                reason: format!("expected a JSON object, got {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_value_from_json_object() {
        let doc = DocumentValue::try_from(json!({"a": 1, "b": "two"})).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("a"), Some(&json!(1)));
        assert_eq!(doc.get_str("b"), Some("two"));
        assert_eq!(doc.get_str("a"), None);
    }

    #[test]
    fn test_document_value_rejects_non_objects() {
        let err = DocumentValue::try_from(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument { .. }));
    }

    #[test]
    fn test_merge_from_replaces_top_level_fields() {
        let mut doc = DocumentValue::try_from(json!({"a": 1, "b": {"x": 1}})).unwrap();
        let patch = DocumentValue::try_from(json!({"b": {"y": 2}, "c": 3})).unwrap();
        doc.merge_from(&patch);

        assert_eq!(doc.get("a"), Some(&json!(1)));
        // merge is shallow: nested objects are replaced, not combined
        assert_eq!(doc.get("b"), Some(&json!({"y": 2})));
        assert_eq!(doc.get("c"), Some(&json!(3)));
    }

    #[test]
    fn test_serde_round_trip_is_transparent() {
        let doc = DocumentValue::try_from(json!({"nbPages": 4})).unwrap();
        let encoded = serde_json::to_string(&doc).unwrap();
        assert_eq!(encoded, r#"{"nbPages":4}"#);

        let decoded: DocumentValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, doc);
    }
}
