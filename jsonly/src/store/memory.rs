//! In-memory document store.
//!
//! Backs tests and local development; hosted stores implement the same trait.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::Result;
use crate::store::DocumentStore;
use crate::types::{DocumentId, DocumentValue};

/// Thread-safe in-memory [`DocumentStore`].
///
/// Cloning is cheap and shares the underlying data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<DashMap<String, DashMap<DocumentId, DocumentValue>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in `collection`.
    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|docs| docs.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<DocumentValue>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).map(|doc| doc.value().clone())))
    }

    async fn set(&self, collection: &str, id: &str, document: DocumentValue) -> Result<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, patch: DocumentValue) -> Result<()> {
        let docs = self.collections.entry(collection.to_string()).or_default();
        docs.entry(id.to_string()).or_default().merge_from(&patch);
        Ok(())
    }

    async fn add(&self, collection: &str, document: DocumentValue) -> Result<DocumentId> {
        let id = Uuid::new_v4().to_string();
        self.set(collection, &id, document).await?;
        Ok(id)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(docs) = self.collections.get(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(DocumentId, DocumentValue)>> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(docs
            .iter()
            .filter(|entry| entry.value().get(field) == Some(value))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> DocumentValue {
        DocumentValue::try_from(value).unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let store = InMemoryStore::new();

        store.set("users", "u1", doc(json!({"email": "a@b.c"}))).await.unwrap();

        let fetched = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(fetched.get_str("email"), Some("a@b.c"));
        assert!(store.get("users", "missing").await.unwrap().is_none());
        assert!(store.get("templates", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_whole_document() {
        let store = InMemoryStore::new();

        store.set("users", "u1", doc(json!({"a": 1, "b": 2}))).await.unwrap();
        store.set("users", "u1", doc(json!({"c": 3}))).await.unwrap();

        let fetched = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched.get("c"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_merge_keeps_unrelated_fields() {
        let store = InMemoryStore::new();

        store.set("templates", "t1", doc(json!({"folder": "Default", "webhookUrl": "old"}))).await.unwrap();
        store.merge("templates", "t1", doc(json!({"webhookUrl": "new"}))).await.unwrap();

        let fetched = store.get("templates", "t1").await.unwrap().unwrap();
        assert_eq!(fetched.get_str("folder"), Some("Default"));
        assert_eq!(fetched.get_str("webhookUrl"), Some("new"));
    }

    #[tokio::test]
    async fn test_merge_creates_missing_document() {
        let store = InMemoryStore::new();

        store.merge("templates", "t1", doc(json!({"webhookUrl": "url"}))).await.unwrap();

        let fetched = store.get("templates", "t1").await.unwrap().unwrap();
        assert_eq!(fetched.get_str("webhookUrl"), Some("url"));
    }

    #[tokio::test]
    async fn test_add_generates_distinct_ids() {
        let store = InMemoryStore::new();

        let first = store.add("documentAnalyses", doc(json!({"nbPages": 1}))).await.unwrap();
        let second = store.add("documentAnalyses", doc(json!({"nbPages": 2}))).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.collection_len("documentAnalyses"), 2);
        assert!(store.get("documentAnalyses", &first).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryStore::new();

        store.set("users", "u1", doc(json!({"a": 1}))).await.unwrap();
        store.delete("users", "u1").await.unwrap();
        store.delete("users", "u1").await.unwrap();
        store.delete("never-created", "u1").await.unwrap();

        assert!(store.get("users", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_eq_filters_by_field() {
        let store = InMemoryStore::new();

        store.set("templates", "t1", doc(json!({"userId": "u1", "folder": "A"}))).await.unwrap();
        store.set("templates", "t2", doc(json!({"userId": "u1", "folder": "B"}))).await.unwrap();
        store.set("templates", "t3", doc(json!({"userId": "u2", "folder": "A"}))).await.unwrap();

        let mine = store.query_eq("templates", "userId", &json!("u1")).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|(_, d)| d.get_str("userId") == Some("u1")));

        let empty = store.query_eq("missing", "userId", &json!("u1")).await.unwrap();
        assert!(empty.is_empty());
    }
}
