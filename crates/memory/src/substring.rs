//! Substring-search memory store: persistent JSON storage, no embeddings.
//!
//! The always-available backend. Records are loaded into memory on open and
//! written back as a whole on [`MemoryStore::persist`].
//!
//! Storage location: `<base>.json`

use async_trait::async_trait;
use mnemos_core::error::MemoryError;
use mnemos_core::memory::{MemoryRecord, MemoryStore, Metadata, SearchHit, StoreInfo};
use mnemos_core::RequestId;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::{StoreDocument, write_json_atomic};

/// A file-backed store matched by case-insensitive substring.
pub struct SubstringStore {
    path: PathBuf,
    max_items: usize,
    doc: RwLock<StoreDocument>,
}

impl SubstringStore {
    /// Open the store at exactly `path`, loading existing records.
    pub fn open(path: impl Into<PathBuf>, max_items: usize) -> Self {
        let path = path.into();
        let doc = StoreDocument::load(&path);
        info!(path = %path.display(), records = doc.len(), "Substring memory store opened");
        Self {
            path,
            max_items: max_items.max(1),
            doc: RwLock::new(doc),
        }
    }

    /// `<base>.json`
    pub fn path_for(base: &Path) -> PathBuf {
        let mut s = base.as_os_str().to_owned();
        s.push(".json");
        PathBuf::from(s)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Does `query_lower` occur in the text or any metadata value?
fn matches(text: &str, metadata: &Metadata, query_lower: &str) -> bool {
    if text.to_lowercase().contains(query_lower) {
        return true;
    }
    metadata.values().any(|v| {
        let rendered = match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered.to_lowercase().contains(query_lower)
    })
}

#[async_trait]
impl MemoryStore for SubstringStore {
    async fn add(
        &self,
        text: &str,
        metadata: Metadata,
        request_id: &RequestId,
    ) -> Result<usize, MemoryError> {
        let (index, evicted) = self
            .doc
            .write()
            .await
            .push_bounded(text, metadata, self.max_items);
        info!(request_id = %request_id, index, evicted, "memory.add");
        Ok(index)
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        request_id: &RequestId,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        let doc = self.doc.read().await;
        let query_lower = query.to_lowercase();

        let hits: Vec<SearchHit> = doc
            .texts
            .iter()
            .zip(doc.metadatas.iter())
            .filter(|(t, m)| matches(t, m, &query_lower))
            .take(k)
            .map(|(t, m)| SearchHit {
                text: t.clone(),
                metadata: m.clone(),
                score: 1.0,
            })
            .collect();

        debug!(
            request_id = %request_id,
            query = %query.chars().take(200).collect::<String>(),
            hits = hits.len(),
            "memory.search"
        );
        Ok(hits)
    }

    async fn persist(&self, request_id: &RequestId) -> bool {
        let doc = self.doc.read().await.clone();
        match write_json_atomic(&self.path, &doc) {
            Ok(()) => {
                info!(request_id = %request_id, path = %self.path.display(), records = doc.len(), "memory.persist.success");
                true
            }
            Err(e) => {
                warn!(request_id = %request_id, path = %self.path.display(), error = %e, "memory.persist.fail");
                false
            }
        }
    }

    async fn info(&self) -> StoreInfo {
        StoreInfo {
            backend: "substring".into(),
            records: self.doc.read().await.len(),
            paths: vec![self.path.clone()],
        }
    }

    async fn records(&self) -> Vec<MemoryRecord> {
        self.doc.read().await.records()
    }
}
