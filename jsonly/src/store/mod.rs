//! Document storage abstraction.
//!
//! Everything the product persists lives in a document database addressed by
//! (collection name, document id): user records in [`USERS_COLLECTION`],
//! templates, and document-analysis rows. The hosted store sits behind the
//! [`DocumentStore`] trait; [`InMemoryStore`] backs tests and local use.
//!
//! The [`queue`] submodule holds the single-slot write queue that serializes
//! user-document writes on top of whichever store is injected.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::types::{DocumentId, DocumentValue};

pub mod memory;
pub mod queue;

pub use memory::InMemoryStore;
pub use queue::{WriteQueue, WriteRequest, WriteStatus};

/// Collection holding one document per user, keyed by the provider uid.
pub const USERS_COLLECTION: &str = "users";

/// Trait over a document database addressed by (collection, document id).
///
/// Modeled on hosted document stores: collections spring into existence on
/// first write, deletes are idempotent, and equality queries scan a single
/// collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    ///
    /// Returns `Ok(None)` when the document does not exist; `Err` is reserved
    /// for store failures.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<DocumentValue>>;

    /// Write one document, replacing any existing content.
    async fn set(&self, collection: &str, id: &str, document: DocumentValue) -> Result<()>;

    /// Merge fields into one document.
    ///
    /// Top-level fields in `patch` replace fields of the same name; other
    /// fields are kept. Creates the document when it does not exist.
    async fn merge(&self, collection: &str, id: &str, patch: DocumentValue) -> Result<()>;

    /// Add a document under a generated id.
    ///
    /// # Returns
    /// The generated document id.
    async fn add(&self, collection: &str, document: DocumentValue) -> Result<DocumentId>;

    /// Delete one document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Return all documents in `collection` whose `field` equals `value`,
    /// paired with their ids. Order is unspecified; callers sort.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(DocumentId, DocumentValue)>>;
}
