//! Memory tools let the agent (and slash-commands) read and write its
//! long-term memory.
//!
//! All six tools share one `Arc<dyn MemoryStore>`. Writes persist
//! immediately so a saved persona survives a crash of the session.

use async_trait::async_trait;
use mnemos_core::error::ToolError;
use mnemos_core::memory::{KIND_NOTE, KIND_PERSONA, MemoryStore, Metadata, timestamp_now};
use mnemos_core::tool::{Tool, ToolOutput};
use mnemos_core::RequestId;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Hits returned by `RecallMemory`.
pub const RECALL_LIMIT: usize = 5;

const PERSONA_PREFIX: &str = "persona_name:";

/// Split `persona_name:<name>\n<body>` into `(name, body)`.
///
/// Without the prefix, the name is the first line of the text. An empty body
/// falls back to the name.
pub fn parse_persona_arg(arg: &str) -> (String, String) {
    match arg.strip_prefix(PERSONA_PREFIX) {
        Some(rest) => {
            let mut lines = rest.lines();
            let name = lines.next().unwrap_or_default().trim().to_string();
            let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();
            let body = if body.is_empty() { name.clone() } else { body };
            (name, body)
        }
        None => {
            let name = arg.lines().next().unwrap_or_default().to_string();
            (name, arg.to_string())
        }
    }
}

fn base_meta(kind: &str, request_id: &RequestId) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("type".into(), kind.into());
    meta.insert("ts".into(), serde_json::json!(timestamp_now()));
    meta.insert("request_id".into(), request_id.as_str().into());
    meta.insert("source".into(), "manual_save".into());
    meta
}

#[derive(Debug, Serialize)]
struct SavedRecord {
    saved_index: usize,
    persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Metadata>,
}

/// `SavePersona`: store a user profile record (`type=persona`).
pub struct SavePersonaTool {
    store: Arc<dyn MemoryStore>,
}

impl SavePersonaTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SavePersonaTool {
    fn name(&self) -> &str {
        "SavePersona"
    }

    fn description(&self) -> &str {
        "Save a persona (facts about the user) to long-term memory. \
         Argument: the persona text, optionally prefixed with 'persona_name:<name>' on its own line."
    }

    async fn invoke(&self, arg: &str, request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let (name, body) = parse_persona_arg(arg);
        if body.trim().is_empty() {
            return Err(ToolError::InvalidArguments("persona text is empty".into()));
        }

        let mut meta = base_meta(KIND_PERSONA, request_id);
        meta.insert("persona_name".into(), name.clone().into());

        let saved_index = self
            .store
            .add(&body, meta.clone(), request_id)
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;
        let persisted = self.store.persist(request_id).await;
        info!(request_id = %request_id, persona_idx = saved_index, persona_name = %name, persisted, "save_persona.complete");

        ToolOutput::structured(&SavedRecord {
            saved_index,
            persisted,
            meta: Some(meta),
        })
    }
}

/// `SaveMemory`: store an arbitrary note (`type=note`).
pub struct SaveMemoryTool {
    store: Arc<dyn MemoryStore>,
}

impl SaveMemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveMemoryTool {
    fn name(&self) -> &str {
        "SaveMemory"
    }

    fn description(&self) -> &str {
        "Save arbitrary text to long-term memory. Argument: the text to remember."
    }

    async fn invoke(&self, arg: &str, request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        if arg.trim().is_empty() {
            return Err(ToolError::InvalidArguments("nothing to save".into()));
        }
        let saved_index = self
            .store
            .add(arg, base_meta(KIND_NOTE, request_id), request_id)
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;
        let persisted = self.store.persist(request_id).await;
        info!(request_id = %request_id, memory_idx = saved_index, "save_memory");

        ToolOutput::structured(&SavedRecord {
            saved_index,
            persisted,
            meta: None,
        })
    }
}

/// `RecallMemory`: search the store.
pub struct RecallMemoryTool {
    store: Arc<dyn MemoryStore>,
}

impl RecallMemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RecallMemoryTool {
    fn name(&self) -> &str {
        "RecallMemory"
    }

    fn description(&self) -> &str {
        "Recall memories related to a query. Argument: the search query."
    }

    async fn invoke(&self, arg: &str, request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let hits = self
            .store
            .search(arg.trim(), RECALL_LIMIT, request_id)
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;
        ToolOutput::structured(&hits)
    }
}

#[derive(Debug, Serialize)]
struct PersonaEntry {
    meta: Metadata,
    text: String,
}

/// `ListPersonas`: every `type=persona` record, in stored order.
pub struct ListPersonasTool {
    store: Arc<dyn MemoryStore>,
}

impl ListPersonasTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListPersonasTool {
    fn name(&self) -> &str {
        "ListPersonas"
    }

    fn description(&self) -> &str {
        "List stored personas. Takes no argument."
    }

    async fn invoke(&self, _arg: &str, _request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let personas: Vec<PersonaEntry> = self
            .store
            .records()
            .await
            .into_iter()
            .filter(|r| r.kind() == Some(KIND_PERSONA))
            .map(|r| PersonaEntry {
                meta: r.metadata,
                text: r.text,
            })
            .collect();
        ToolOutput::structured(&personas)
    }
}

/// `PersistMemory`: flush the store to disk.
pub struct PersistMemoryTool {
    store: Arc<dyn MemoryStore>,
}

impl PersistMemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PersistMemoryTool {
    fn name(&self) -> &str {
        "PersistMemory"
    }

    fn description(&self) -> &str {
        "Persist long-term memory to disk. Takes no argument."
    }

    async fn invoke(&self, _arg: &str, request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let persisted = self.store.persist(request_id).await;
        Ok(ToolOutput::Structured(serde_json::json!({ "persisted": persisted })))
    }
}

/// `LoadMemory`: report the store's backend, size and files.
pub struct LoadMemoryTool {
    store: Arc<dyn MemoryStore>,
}

impl LoadMemoryTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for LoadMemoryTool {
    fn name(&self) -> &str {
        "LoadMemory"
    }

    fn description(&self) -> &str {
        "Show long-term memory info (backend, record count, files). Takes no argument."
    }

    async fn invoke(&self, _arg: &str, _request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let info = self.store.info().await;
        ToolOutput::structured(&serde_json::json!({ "info": info }))
    }
}
