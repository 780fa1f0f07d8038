//! Memory trait: durable append-only record store with search.
//!
//! Records live in two parallel ordered sequences (texts and metadatas).
//! A record's position is its identity: [`MemoryStore::add`] returns it, and
//! it survives persistence and reload. Eviction of the oldest record shifts
//! every later index down by one, so callers must not cache indices across
//! an `add` that may evict.
//!
//! Two interchangeable implementations exist in `mnemos-memory`:
//! - substring search (always available)
//! - cosine-similarity search over embeddings (when an [`Embedder`] works)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::error::MemoryError;
use crate::request_id::RequestId;

/// Free-form record metadata. Conventional keys: `type`, `ts`, `request_id`.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata `type` of a saved conversation turn.
pub const KIND_TURN: &str = "turn";
/// Metadata `type` of a stored user persona.
pub const KIND_PERSONA: &str = "persona";
/// Metadata `type` of a free-form note.
pub const KIND_NOTE: &str = "note";

/// A single stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl MemoryRecord {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// The record's `type` tag, if any.
    pub fn kind(&self) -> Option<&str> {
        self.metadata.get("type").and_then(|v| v.as_str())
    }
}

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity for vector search; a flat 1.0 for substring search.
    pub score: f32,
}

/// Lightweight store introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Which implementation is active ("substring" or "vector").
    pub backend: String,
    /// Number of stored records.
    pub records: usize,
    /// Files the store reads and writes.
    pub paths: Vec<PathBuf>,
}

/// Seconds since the Unix epoch, as stored in the `ts` metadata key.
pub fn timestamp_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// The core MemoryStore trait.
///
/// Both implementations satisfy the same contract so calling code never
/// branches on which one is active.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append a record, evicting index 0 first when at capacity.
    ///
    /// Returns the new record's index (post-eviction numbering). Empty
    /// metadata is replaced by `{"ts": <now>}`.
    async fn add(
        &self,
        text: &str,
        metadata: Metadata,
        request_id: &RequestId,
    ) -> Result<usize, MemoryError>;

    /// Return at most `k` hits for `query`.
    ///
    /// Vector search orders by descending cosine similarity. Substring search
    /// returns hits in stored order with a fixed score of 1.0.
    async fn search(
        &self,
        query: &str,
        k: usize,
        request_id: &RequestId,
    ) -> Result<Vec<SearchHit>, MemoryError>;

    /// Write the full state to disk via temp file + atomic rename.
    ///
    /// Never fails loudly: returns `false` and logs the cause.
    async fn persist(&self, request_id: &RequestId) -> bool;

    /// Record count and storage paths.
    async fn info(&self) -> StoreInfo;

    /// Ordered snapshot of every stored record.
    async fn records(&self) -> Vec<MemoryRecord>;
}

/// An embedding backend used by the vector store.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, for logs and `info`.
    fn model(&self) -> &str;

    /// Embed each input text; output order matches input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError>;
}
