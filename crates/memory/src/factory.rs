//! Backend selection.
//!
//! The vector store is preferred; any failure to reach the embedder (or to
//! open the vector files) falls back to the substring store. The choice is
//! made once per process and callers only ever see `Arc<dyn MemoryStore>`.

use mnemos_core::memory::{Embedder, MemoryStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::substring::SubstringStore;
use crate::vector::VectorStore;

const PROBE_TEXT: &str = "embedding probe";

/// Open the best available store rooted at `base`.
pub async fn open_store(
    base: &Path,
    max_items: usize,
    embedder: Option<Arc<dyn Embedder>>,
) -> Arc<dyn MemoryStore> {
    if let Some(embedder) = embedder {
        match probe(embedder.as_ref()).await {
            Ok(dim) => match VectorStore::open(base, max_items, embedder.clone()).await {
                Ok(store) => {
                    info!(model = %embedder.model(), dim, "Using vector memory store");
                    return Arc::new(store);
                }
                Err(e) => warn!(error = %e, "Vector store unavailable; falling back to substring search"),
            },
            Err(e) => warn!(
                model = %embedder.model(),
                error = %e,
                "Embedding backend unavailable; falling back to substring search"
            ),
        }
    }

    Arc::new(SubstringStore::open(SubstringStore::path_for(base), max_items))
}

/// Offline view of whatever store exists at `base`, for inspection.
///
/// Vector-store records are read from `<base>.meta.json` and searched by
/// substring, so no embedder is needed. Nothing is written unless the caller
/// persists.
pub fn open_offline(base: &Path, max_items: usize) -> SubstringStore {
    let meta = VectorStore::meta_path_for(base);
    let path = if meta.exists() {
        meta
    } else {
        SubstringStore::path_for(base)
    };
    SubstringStore::open(path, max_items)
}

async fn probe(embedder: &dyn Embedder) -> Result<usize, mnemos_core::error::MemoryError> {
    let vectors = embedder.embed(&[PROBE_TEXT.to_string()]).await?;
    match vectors.first() {
        Some(v) if !v.is_empty() => Ok(v.len()),
        _ => Err(mnemos_core::error::MemoryError::EmbeddingFailed(
            "probe returned an empty embedding".into(),
        )),
    }
}
