//! System-prompt hooks, and the persona injector built on them.

use async_trait::async_trait;
use mnemos_core::memory::{KIND_PERSONA, MemoryStore};
use mnemos_core::RequestId;
use std::sync::Arc;
use tracing::debug;

/// Rewrites the system prompt before a turn's context is assembled.
#[async_trait]
pub trait SystemPromptHook: Send + Sync {
    async fn apply(&self, system_prompt: &str, request_id: &RequestId) -> String;
}

/// Longest persona text injected per record, in characters.
const MAX_PERSONA_CHARS: usize = 500;

/// Appends stored persona records to the system prompt.
pub struct PersonaInjector {
    store: Arc<dyn MemoryStore>,
}

impl PersonaInjector {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    async fn profile_lines(&self) -> Vec<String> {
        self.store
            .records()
            .await
            .into_iter()
            .filter(|r| r.kind() == Some(KIND_PERSONA))
            .map(|r| {
                let name = r
                    .metadata
                    .get("persona_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unnamed")
                    .to_string();
                let text: String = r.text.trim().chars().take(MAX_PERSONA_CHARS).collect();
                format!("- ({name}) {text}")
            })
            .collect()
    }
}

#[async_trait]
impl SystemPromptHook for PersonaInjector {
    async fn apply(&self, system_prompt: &str, request_id: &RequestId) -> String {
        let lines = self.profile_lines().await;
        if lines.is_empty() {
            return system_prompt.to_string();
        }
        debug!(request_id = %request_id, personas = lines.len(), "Injecting persona records");

        let profile = format!("Known user profile (from long-term memory):\n{}", lines.join("\n"));
        let base = system_prompt.trim();
        if base.is_empty() {
            profile
        } else {
            format!("{base}\n\n{profile}")
        }
    }
}
