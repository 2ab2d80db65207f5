use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;

/// One stored record plus the bookkeeping the store assigns to it.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    /// Optimistic-concurrency version, bumped on every successful write.
    pub version: u64,
    /// Monotonic insertion sequence across the whole store. `list` and
    /// `find` return documents in this order.
    pub seq: u64,
    pub body: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backing document store the engine runs against.
///
/// The dispatch engine's race-freedom rests on `compare_and_swap` being
/// atomic: the version check and the write must not interleave with
/// another writer on the same document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document. Fails with a conflict if the id is already
    /// present in the collection.
    async fn insert(&self, collection: &str, id: Uuid, body: Value) -> Result<Document>;

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>>;

    /// Unconditional last-writer-wins update of an existing document.
    async fn put(&self, collection: &str, id: Uuid, body: Value) -> Result<Document>;

    /// Version-checked update. Fails with a conflict when the stored
    /// version differs from `expected_version` or the document is gone.
    async fn compare_and_swap(
        &self,
        collection: &str,
        id: Uuid,
        expected_version: u64,
        body: Value,
    ) -> Result<Document>;

    /// Returns true when a document was removed.
    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool>;

    /// Top-level field equality query, results in insertion order.
    async fn find(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>>;

    /// Every document of a collection, in insertion order.
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;
}

/// A decoded record together with the version/seq needed for CAS writes.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: u64,
    pub seq: u64,
    pub record: T,
}

impl<T: DeserializeOwned> Versioned<T> {
    pub fn decode(doc: Document) -> Result<Self> {
        let record = serde_json::from_value(doc.body)
            .map_err(|e| Error::Store(format!("Failed to decode document {}: {}", doc.id, e)))?;
        Ok(Self {
            version: doc.version,
            seq: doc.seq,
            record,
        })
    }
}

/// Serialize a record into a store body.
pub fn to_body<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|e| Error::Store(format!("Failed to encode document: {}", e)).into())
}
