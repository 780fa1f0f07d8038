//! On-disk store document and the shared record sequence.
//!
//! Both store implementations persist the same `{ "texts": [...],
//! "metadatas": [...] }` JSON document. Writes go to a temp file in the
//! target directory and are then renamed over the destination, so a reader
//! never observes a half-written file.

use mnemos_core::error::MemoryError;
use mnemos_core::memory::{Metadata, MemoryRecord, timestamp_now};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Two parallel, position-indexed sequences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub metadatas: Vec<Metadata>,
}

impl StoreDocument {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Load from `path`. Missing or corrupt files yield an empty document.
    pub fn load(path: &Path) -> Self {
        let mut doc: Self = match read_json(path) {
            Some(doc) => doc,
            None => return Self::default(),
        };
        doc.repair(path);
        debug!(path = %path.display(), records = doc.len(), "Store document loaded");
        doc
    }

    /// Truncate both sequences to the shorter length.
    fn repair(&mut self, path: &Path) {
        let (t, m) = (self.texts.len(), self.metadatas.len());
        if t != m {
            warn!(
                path = %path.display(),
                texts = t,
                metadatas = m,
                "Store document has mismatched lengths; truncating to the shorter"
            );
            let n = t.min(m);
            self.texts.truncate(n);
            self.metadatas.truncate(n);
        }
    }

    /// Drop index 0 when at `max_items`, then append.
    ///
    /// Returns `(new_index, evicted)`.
    pub fn push_bounded(&mut self, text: &str, metadata: Metadata, max_items: usize) -> (usize, bool) {
        let mut evicted = false;
        while !self.texts.is_empty() && self.texts.len() >= max_items {
            self.texts.remove(0);
            self.metadatas.remove(0);
            evicted = true;
        }
        let metadata = if metadata.is_empty() {
            default_metadata()
        } else {
            metadata
        };
        self.texts.push(text.to_string());
        self.metadatas.push(metadata);
        (self.texts.len() - 1, evicted)
    }

    pub fn records(&self) -> Vec<MemoryRecord> {
        self.texts
            .iter()
            .zip(self.metadatas.iter())
            .map(|(t, m)| MemoryRecord::new(t.clone(), m.clone()))
            .collect()
    }
}

/// `{"ts": <now>}`, used when a caller supplies no metadata.
pub fn default_metadata() -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("ts".into(), serde_json::json!(timestamp_now()));
    meta
}

/// Read and deserialize a JSON file, logging (not failing) on corruption.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read store file; starting empty");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt store file; starting empty");
            None
        }
    }
}

/// Pretty-print `value` to a temp file beside `path`, then rename it into place.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), MemoryError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| MemoryError::Storage(format!("Failed to create store directory: {e}")))?;

    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| MemoryError::Storage(format!("Failed to serialize store: {e}")))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp.")
        .suffix(".json")
        .tempfile_in(dir)
        .map_err(|e| MemoryError::Storage(format!("Failed to create temp file: {e}")))?;
    tmp.write_all(&body)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| MemoryError::Storage(format!("Failed to write temp file: {e}")))?;
    tmp.persist(path)
        .map_err(|e| MemoryError::Storage(format!("Failed to replace {}: {}", path.display(), e.error)))?;
    Ok(())
}
