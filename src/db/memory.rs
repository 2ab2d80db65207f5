use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::document::{Document, DocumentStore};
use crate::error::Error;

/// In-memory document store with per-document optimistic versioning.
///
/// Compare-and-swap atomicity comes from doing the read-check-write under
/// a single write guard, which is all the engine needs from a real
/// document store's transactional primitive.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<Uuid, Document>>>,
    seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn shared() -> Arc<dyn DocumentStore> {
        Arc::new(Self::new())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, id: Uuid, body: Value) -> Result<Document> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        if docs.contains_key(&id) {
            return Err(Error::conflict(collection, id).into());
        }

        let now = Utc::now();
        let doc = Document {
            id,
            version: 1,
            seq: self.next_seq(),
            body,
            created_at: now,
            updated_at: now,
        };
        docs.insert(id, doc.clone());

        Ok(doc)
    }

    async fn get(&self, collection: &str, id: Uuid) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(&id))
            .cloned())
    }

    async fn put(&self, collection: &str, id: Uuid, body: Value) -> Result<Document> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        let doc = docs
            .get_mut(&id)
            .ok_or_else(|| Error::Store(format!("{}/{} does not exist", collection, id)))?;

        doc.version += 1;
        doc.body = body;
        doc.updated_at = Utc::now();

        Ok(doc.clone())
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        id: Uuid,
        expected_version: u64,
        body: Value,
    ) -> Result<Document> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        let doc = match docs.get_mut(&id) {
            Some(doc) => doc,
            None => return Err(Error::conflict(collection, id).into()),
        };

        if doc.version != expected_version {
            return Err(Error::conflict(collection, id).into());
        }

        doc.version += 1;
        doc.body = body;
        doc.updated_at = Utc::now();

        Ok(doc.clone())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map(|docs| docs.remove(&id).is_some())
            .unwrap_or(false))
    }

    async fn find(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let mut hits: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc.body.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        hits.sort_by_key(|doc| doc.seq);
        Ok(hits)
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let mut docs: Vec<Document> = collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();

        docs.sort_by_key(|doc| doc.seq);
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_conflict;
    use serde_json::json;

    #[tokio::test]
    async fn insert_then_get_roundtrips() -> Result<()> {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        let doc = store.insert("things", id, json!({"name": "a"})).await?;
        assert_eq!(doc.version, 1);

        let fetched = store.get("things", id).await?.expect("document");
        assert_eq!(fetched.body, json!({"name": "a"}));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() -> Result<()> {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        store.insert("things", id, json!({})).await?;
        let err = store.insert("things", id, json!({})).await.unwrap_err();
        assert!(is_conflict(&err));
        Ok(())
    }

    #[tokio::test]
    async fn cas_rejects_stale_version() -> Result<()> {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        let doc = store.insert("things", id, json!({"n": 0})).await?;
        let updated = store
            .compare_and_swap("things", id, doc.version, json!({"n": 1}))
            .await?;
        assert_eq!(updated.version, 2);

        // The original version is stale now.
        let err = store
            .compare_and_swap("things", id, doc.version, json!({"n": 2}))
            .await
            .unwrap_err();
        assert!(is_conflict(&err));

        let current = store.get("things", id).await?.unwrap();
        assert_eq!(current.body, json!({"n": 1}));
        Ok(())
    }

    #[tokio::test]
    async fn cas_on_missing_document_conflicts() {
        let store = MemoryStore::new();
        let err = store
            .compare_and_swap("things", Uuid::new_v4(), 1, json!({}))
            .await
            .unwrap_err();
        assert!(is_conflict(&err));
    }

    #[tokio::test]
    async fn find_filters_and_keeps_insertion_order() -> Result<()> {
        let store = MemoryStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let other = Uuid::new_v4();

        store.insert("things", first, json!({"kind": "x"})).await?;
        store.insert("things", other, json!({"kind": "y"})).await?;
        store.insert("things", second, json!({"kind": "x"})).await?;

        let hits = store.find("things", "kind", &json!("x")).await?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, first);
        assert_eq!(hits[1].id, second);
        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_presence() -> Result<()> {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        store.insert("things", id, json!({})).await?;
        assert!(store.delete("things", id).await?);
        assert!(!store.delete("things", id).await?);
        assert!(store.get("things", id).await?.is_none());
        Ok(())
    }
}
