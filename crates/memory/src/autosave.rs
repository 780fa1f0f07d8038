//! Background persistence of finished conversation turns.
//!
//! After each answered turn the session hands `(user, assistant)` to
//! [`AutoSaver::save_turn`] on a detached task. The saver filters sensitive
//! content, optionally de-duplicates, condenses the turn and writes it as a
//! `type=turn` record.

use mnemos_config::{AutoSaveMode, MemoryConfig};
use mnemos_core::memory::{KIND_TURN, MemoryStore, Metadata, timestamp_now};
use mnemos_core::RequestId;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

/// Recent records checked for duplicates in `on_change` mode.
const DEDUP_WINDOW: usize = 10;

static SENSITIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)api[_-]?key\s*[:=]\s*[A-Za-z0-9\-._]{8,}",
        r"(?i)secret\s*[:=]\s*[A-Za-z0-9\-._]{8,}",
        r"(?i)password\s*[:=]\s*\S{4,}",
        r"(?i)-----BEGIN (RSA|PRIVATE) KEY-----",
        r"(?i)ssh-rsa\s+[A-Za-z0-9+/=]{100,}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// True when `text` looks like it carries a credential.
pub fn contains_sensitive(text: &str) -> bool {
    !text.is_empty() && SENSITIVE_PATTERNS.iter().any(|re| re.is_match(text))
}

fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(5).map(|b| format!("{b:02x}")).collect()
}

/// Condensing rules for saved turns.
#[derive(Debug, Clone)]
pub struct AutoSavePolicy {
    pub mode: AutoSaveMode,
    pub summarize: bool,
    pub min_length_to_summarize: usize,
}

impl From<&MemoryConfig> for AutoSavePolicy {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            mode: config.auto_save,
            summarize: config.summarize,
            min_length_to_summarize: config.min_length_to_summarize,
        }
    }
}

impl AutoSavePolicy {
    /// Condense `text` for storage.
    ///
    /// Lengths are measured in characters.
    pub fn summarize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let chars: Vec<char> = text.chars().collect();
        if !self.summarize {
            return chars.iter().take(3000).collect();
        }
        if chars.len() < self.min_length_to_summarize {
            return chars.iter().take(1000).collect();
        }
        let head: String = chars.iter().take(300).collect();
        let tail: String = chars[chars.len().saturating_sub(200)..].iter().collect();
        let head = head.split_whitespace().collect::<Vec<_>>().join(" ");
        let tail = tail.split_whitespace().collect::<Vec<_>>().join(" ");
        format!("{head} ... {tail}").chars().take(1200).collect()
    }
}

/// Writes finished turns into the long-term store.
#[derive(Clone)]
pub struct AutoSaver {
    store: Arc<dyn MemoryStore>,
    policy: AutoSavePolicy,
}

impl AutoSaver {
    pub fn new(store: Arc<dyn MemoryStore>, policy: AutoSavePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &AutoSavePolicy {
        &self.policy
    }

    /// Save one turn. Returns the record index, or `None` when skipped.
    ///
    /// Never fails: errors are logged and reported as `None`.
    pub async fn save_turn(
        &self,
        user_text: &str,
        assistant_text: &str,
        request_id: &RequestId,
    ) -> Option<usize> {
        if self.policy.mode == AutoSaveMode::Off {
            return None;
        }
        if contains_sensitive(user_text) || contains_sensitive(assistant_text) {
            info!(request_id = %request_id, "memory.autosave.skip_sensitive");
            return None;
        }

        let combined = format!("User: {user_text}\nAssistant: {assistant_text}");
        let summary = self.policy.summarize(&combined);

        if self.policy.mode == AutoSaveMode::OnChange && self.is_duplicate(&summary).await {
            debug!(request_id = %request_id, "memory.autosave.duplicate");
            return None;
        }

        let mut meta = Metadata::new();
        meta.insert("type".into(), KIND_TURN.into());
        meta.insert("source".into(), "auto".into());
        meta.insert("request_id".into(), request_id.as_str().into());
        meta.insert("ts".into(), serde_json::json!(timestamp_now()));
        meta.insert("user_len".into(), user_text.chars().count().into());
        meta.insert("assistant_len".into(), assistant_text.chars().count().into());

        let index = match self.store.add(&summary, meta, request_id).await {
            Ok(i) => i,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "memory.autosave.add_failed");
                return None;
            }
        };
        info!(request_id = %request_id, index, summary_len = summary.len(), "memory.autosave.saved_turn");

        if !self.store.persist(request_id).await {
            warn!(request_id = %request_id, index, "memory.autosave.persist_failed");
        }
        Some(index)
    }

    async fn is_duplicate(&self, summary: &str) -> bool {
        let target = short_hash(summary);
        self.store
            .records()
            .await
            .iter()
            .rev()
            .take(DEDUP_WINDOW)
            .any(|r| short_hash(&r.text) == target)
    }
}
