//! Memory-augmented model wrapper.
//!
//! Before every call the wrapped model sees the store's best matches for the
//! user's utterance, prepended to the prompt. The recall query is fixed for
//! the turn, so one wrapper is built per turn.

use async_trait::async_trait;
use mnemos_core::error::ProviderError;
use mnemos_core::memory::{MemoryStore, SearchHit};
use mnemos_core::{ModelCall, RequestId};
use std::sync::Arc;
use tracing::{debug, warn};

const SNIPPET_TEXT_CHARS: usize = 300;

pub struct MemoryAugmentedModel {
    inner: Arc<dyn ModelCall>,
    store: Arc<dyn MemoryStore>,
    query: String,
    recall_limit: usize,
}

impl MemoryAugmentedModel {
    pub fn new(
        inner: Arc<dyn ModelCall>,
        store: Arc<dyn MemoryStore>,
        query: impl Into<String>,
        recall_limit: usize,
    ) -> Self {
        Self {
            inner,
            store,
            query: query.into(),
            recall_limit,
        }
    }

    async fn snippet(&self, request_id: &RequestId) -> String {
        if self.recall_limit == 0 || self.query.trim().is_empty() {
            return String::new();
        }
        match self.store.search(&self.query, self.recall_limit, request_id).await {
            Ok(hits) if !hits.is_empty() => {
                debug!(request_id = %request_id, hits = hits.len(), "Recalled memories for prompt");
                format_snippet(&hits)
            }
            Ok(_) => String::new(),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Memory recall failed");
                String::new()
            }
        }
    }
}

fn format_snippet(hits: &[SearchHit]) -> String {
    let mut lines = vec!["Related long-term memory (for reference):".to_string()];
    for hit in hits {
        let text: String = hit.text.chars().take(SNIPPET_TEXT_CHARS).collect();
        lines.push(format!(
            "- score={:.4}, meta={}, text={}",
            hit.score,
            serde_json::Value::Object(hit.metadata.clone()),
            text
        ));
    }
    lines.join("\n") + "\n\n"
}

#[async_trait]
impl ModelCall for MemoryAugmentedModel {
    async fn call(&self, prompt: &str, request_id: &RequestId) -> Result<String, ProviderError> {
        let snippet = self.snippet(request_id).await;
        let full_prompt = format!("{snippet}{prompt}");
        self.inner.call(&full_prompt, request_id).await
    }
}
