use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub mod document;
pub mod memory;
pub mod models;
pub mod repositories;

pub use document::{to_body, Document, DocumentStore, Versioned};
pub use memory::MemoryStore;

/// Store service owning the document store handle
pub struct StoreService {
    pub store: Arc<dyn DocumentStore>,
}

impl StoreService {
    /// Create a new store service backed by the in-memory store
    pub fn new_in_memory() -> Self {
        info!("Initializing in-memory document store");

        Self {
            store: MemoryStore::shared(),
        }
    }

    /// Health check for the store: write, read back and remove a probe
    /// document.
    pub async fn health_check(&self) -> Result<bool> {
        let probe_id = Uuid::new_v4();

        let outcome = async {
            self.store
                .insert("system_probes", probe_id, json!({ "probe": true }))
                .await?;
            let read_back = self.store.get("system_probes", probe_id).await?;
            self.store.delete("system_probes", probe_id).await?;
            anyhow::Ok(read_back.is_some())
        }
        .await;

        match outcome {
            Ok(found) => Ok(found),
            Err(e) => {
                error!("Store health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
