//! Vector memory store: cosine similarity over embeddings.
//!
//! Keeps a third sequence (one vector per record) alongside texts and
//! metadatas. Vectors are persisted next to the record document so a restart
//! does not need to re-embed the whole history.
//!
//! Storage location: `<base>.meta.json` + `<base>.vectors.json`

use async_trait::async_trait;
use mnemos_core::error::MemoryError;
use mnemos_core::memory::{Embedder, MemoryRecord, MemoryStore, Metadata, SearchHit, StoreInfo};
use mnemos_core::RequestId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::{StoreDocument, read_json, write_json_atomic};

const EMBED_BATCH: usize = 64;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VectorFile {
    #[serde(default)]
    model: String,
    #[serde(default)]
    vectors: Vec<Vec<f32>>,
}

struct State {
    doc: StoreDocument,
    vectors: Vec<Vec<f32>>,
}

/// A similarity-searched store backed by an [`Embedder`].
pub struct VectorStore {
    meta_path: PathBuf,
    vectors_path: PathBuf,
    max_items: usize,
    embedder: Arc<dyn Embedder>,
    state: RwLock<State>,
}

impl VectorStore {
    /// Open the store at `base`, re-embedding records whose vectors are
    /// missing or were produced by a different model.
    pub async fn open(
        base: &Path,
        max_items: usize,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, MemoryError> {
        let meta_path = Self::meta_path_for(base);
        let vectors_path = with_suffix(base, ".vectors.json");

        let doc = StoreDocument::load(&meta_path);
        let file: VectorFile = read_json(&vectors_path).unwrap_or_default();

        let vectors = if file.vectors.len() == doc.len() && file.model == embedder.model() {
            file.vectors
        } else {
            if !doc.is_empty() {
                warn!(
                    records = doc.len(),
                    vectors = file.vectors.len(),
                    "Vector file out of sync with records; re-embedding"
                );
            }
            embed_all(embedder.as_ref(), &doc.texts).await?
        };

        info!(
            path = %meta_path.display(),
            records = doc.len(),
            model = %embedder.model(),
            "Vector memory store opened"
        );

        Ok(Self {
            meta_path,
            vectors_path,
            max_items: max_items.max(1),
            embedder,
            state: RwLock::new(State { doc, vectors }),
        })
    }

    /// `<base>.meta.json`: the texts and metadata, in the substring store's format.
    pub fn meta_path_for(base: &Path) -> PathBuf {
        with_suffix(base, ".meta.json")
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::EmbeddingFailed("embedder returned no vector".into()))
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

async fn embed_all(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
    let mut out = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(EMBED_BATCH) {
        let vectors = embedder.embed(chunk).await?;
        if vectors.len() != chunk.len() {
            return Err(MemoryError::EmbeddingFailed(format!(
                "expected {} vectors, got {}",
                chunk.len(),
                vectors.len()
            )));
        }
        out.extend(vectors);
    }
    Ok(out)
}

#[async_trait]
impl MemoryStore for VectorStore {
    async fn add(
        &self,
        text: &str,
        metadata: Metadata,
        request_id: &RequestId,
    ) -> Result<usize, MemoryError> {
        let vector = self.embed_one(text).await?;

        let mut state = self.state.write().await;
        let (index, evicted) = state.doc.push_bounded(text, metadata, self.max_items);
        // Keep vectors aligned: drop from the front until lengths match again.
        state.vectors.push(vector);
        while state.vectors.len() > state.doc.len() {
            state.vectors.remove(0);
        }
        info!(request_id = %request_id, index, evicted, "memory.add");
        Ok(index)
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        request_id: &RequestId,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        if k == 0 || self.state.read().await.doc.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embed_one(query).await?;

        let state = self.state.read().await;
        let mut scored: Vec<(f32, usize)> = state
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (cosine_similarity(v, &query_vec), i))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .filter_map(|(score, i)| {
                Some(SearchHit {
                    text: state.doc.texts.get(i)?.clone(),
                    metadata: state.doc.metadatas.get(i)?.clone(),
                    score,
                })
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
        let (doc, file) = {
            let state = self.state.read().await;
            (
                state.doc.clone(),
                VectorFile {
                    model: self.embedder.model().to_string(),
                    vectors: state.vectors.clone(),
                },
            )
        };

        let result = write_json_atomic(&self.vectors_path, &file)
            .and_then(|_| write_json_atomic(&self.meta_path, &doc));
        match result {
            Ok(()) => {
                info!(request_id = %request_id, path = %self.meta_path.display(), records = doc.len(), "memory.persist.success");
                true
            }
            Err(e) => {
                warn!(request_id = %request_id, path = %self.meta_path.display(), error = %e, "memory.persist.fail");
                false
            }
        }
    }

    async fn info(&self) -> StoreInfo {
        StoreInfo {
            backend: "vector".into(),
            records: self.state.read().await.doc.len(),
            paths: vec![self.meta_path.clone(), self.vectors_path.clone()],
        }
    }

    async fn records(&self) -> Vec<MemoryRecord> {
        self.state.read().await.doc.records()
    }
}
