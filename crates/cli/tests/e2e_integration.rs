//! End-to-end tests for the Mnemos session pipeline.
//!
//! These drive a [`Session`] over the real memory tools and a file-backed
//! substring store, with a scripted model standing in for the hosted LLM.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use mnemos_agent::{DispatchLoop, Session, default_system_prompt};
use mnemos_config::{AutoSaveMode, MemoryConfig};
use mnemos_core::error::ProviderError;
use mnemos_core::memory::MemoryStore;
use mnemos_core::tool::ToolRegistry;
use mnemos_core::{ModelCall, RequestId};
use mnemos_memory::{AutoSavePolicy, AutoSaver, SubstringStore};
use mnemos_tools::register_memory_tools;

// ── Mock model ───────────────────────────────────────────────────────────

/// Returns scripted responses in order, then `fallback` forever.
struct ScriptedModel {
    script: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(script: &[&str]) -> Self {
        Self {
            script: Mutex::new(script.iter().map(|s| s.to_string()).collect()),
            fallback: "(script exhausted)".into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn always(response: &str) -> Self {
        Self {
            fallback: response.into(),
            ..Self::new(&[])
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait::async_trait]
impl ModelCall for ScriptedModel {
    async fn call(&self, prompt: &str, _request_id: &RequestId) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

struct Harness {
    session: Session,
    store: Arc<dyn MemoryStore>,
    model: Arc<ScriptedModel>,
}

fn harness(path: &Path, max_items: usize, mode: AutoSaveMode, model: ScriptedModel) -> Harness {
    let store: Arc<dyn MemoryStore> = Arc::new(SubstringStore::open(path, max_items));
    let mut registry = ToolRegistry::new();
    register_memory_tools(&mut registry, store.clone());
    let registry = Arc::new(registry);

    let dispatch = DispatchLoop::new(registry.clone())
        .with_system_prompt(default_system_prompt(&registry))
        .with_max_rounds(2);
    let config = MemoryConfig {
        auto_save: mode,
        max_items,
        ..MemoryConfig::default()
    };
    let saver = AutoSaver::new(store.clone(), AutoSavePolicy::from(&config));
    let model = Arc::new(model);
    let session = Session::new(dispatch, model.clone(), store.clone(), saver);
    Harness {
        session,
        store,
        model,
    }
}

async fn texts(store: &Arc<dyn MemoryStore>) -> Vec<String> {
    store.records().await.into_iter().map(|r| r.text).collect()
}

// ── Dispatch loop through the session ────────────────────────────────────

#[tokio::test]
async fn e2e_line_directive_saves_memory_then_answers() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        &dir.path().join("mem.json"),
        100,
        AutoSaveMode::Off,
        ScriptedModel::new(&["CALL_TOOL: SaveMemory the cat sat on the mat", "Noted."]),
    );

    let reply = h.session.handle("remember that the cat sat on the mat").await.unwrap();
    assert_eq!(reply.text, "Noted.");
    assert_eq!(h.model.calls(), 2);

    let second = h.model.prompt(1);
    assert!(second.contains("[ToolInvocation]\nTool: SaveMemory\nArgs: the cat sat on the mat"));
    assert!(second.contains("\"saved_index\": 0"));

    let records = h.store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind(), Some("note"));
    assert_eq!(records[0].text, "the cat sat on the mat");
}

#[tokio::test]
async fn e2e_json_directive_recalls_memory() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        &dir.path().join("mem.json"),
        100,
        AutoSaveMode::Off,
        ScriptedModel::new(&[
            r#"Let me look. CALL_TOOL_JSON: {"tool": "RecallMemory", "args": "cat"}"#,
            "The cat sat on the mat.",
        ]),
    );
    h.session.handle("/save the cat sat on the mat").await.unwrap();
    h.session.handle("/save dogs bark at night").await.unwrap();

    let reply = h.session.handle("where did the cat sit?").await.unwrap();
    assert_eq!(reply.text, "The cat sat on the mat.");

    let second = h.model.prompt(1);
    assert!(second.contains("Tool: RecallMemory\nArgs: cat"));
    let observation = second.split("[ToolInvocation]").nth(1).unwrap();
    assert!(observation.contains("the cat sat on the mat"));
    assert!(!observation.contains("dogs bark"));
}

#[tokio::test]
async fn e2e_tool_limit_forces_final_round() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        &dir.path().join("mem.json"),
        100,
        AutoSaveMode::Off,
        ScriptedModel::always("CALL_TOOL: LoadMemory"),
    );

    let reply = h.session.handle("show me memory info").await.unwrap();
    // max_rounds = 2: three tool rounds plus the forced final call.
    assert_eq!(h.model.calls(), 4);
    assert_eq!(reply.text, "CALL_TOOL: LoadMemory");
    assert!(h.model.prompt(3).contains("The maximum number of tool calls has been reached"));
    assert!(!h.model.prompt(2).contains("The maximum number of tool calls has been reached"));
}

#[tokio::test]
async fn e2e_unknown_tool_is_reported_to_model() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        &dir.path().join("mem.json"),
        100,
        AutoSaveMode::Off,
        ScriptedModel::new(&["CALL_TOOL: Teleport to Mars", "I cannot do that."]),
    );

    let reply = h.session.handle("teleport me").await.unwrap();
    assert_eq!(reply.text, "I cannot do that.");
    let second = h.model.prompt(1);
    assert!(second.contains("[ToolError] Unknown tool: Teleport"));
    assert!(second.contains("Do not call tools that do not exist."));
    assert!(h.store.records().await.is_empty());
}

#[tokio::test]
async fn e2e_time_question_skips_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        &dir.path().join("mem.json"),
        100,
        AutoSaveMode::Off,
        ScriptedModel::always("should not be called"),
    );

    let reply = h.session.handle("What year is it?").await.unwrap();
    assert!(reply.text.starts_with("It is "));
    assert!(reply.text.contains("Today's date is"));
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn e2e_turn_is_autosaved_and_recalled_next_turn() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        &dir.path().join("mem.json"),
        100,
        AutoSaveMode::Always,
        ScriptedModel::new(&["Tokio is an async runtime.", "You asked about Tokio."]),
    );

    let first = h.session.handle("tell me about tokio").await.unwrap();
    first.autosave.unwrap().await.unwrap();
    let records = h.store.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind(), Some("turn"));

    h.session.handle("tokio").await.unwrap();
    let recalled = h.model.prompt(1);
    assert!(recalled.starts_with("Related long-term memory (for reference):"));
    assert!(recalled.contains("Tokio is an async runtime."));
}

// ── Store behavior through slash commands ────────────────────────────────

#[tokio::test]
async fn e2e_persist_and_reload_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mem.json");
    {
        let h = harness(&path, 100, AutoSaveMode::Off, ScriptedModel::always("x"));
        for text in ["first", "second", "third"] {
            h.session.handle(&format!("/save {text}")).await.unwrap();
        }
        let reply = h.session.handle("/persist").await.unwrap();
        assert!(reply.text.contains("\"persisted\": true"));
    }

    let reopened: Arc<dyn MemoryStore> = Arc::new(SubstringStore::open(&path, 100));
    assert_eq!(texts(&reopened).await, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn e2e_capacity_evicts_oldest() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir.path().join("mem.json"), 2, AutoSaveMode::Off, ScriptedModel::always("x"));

    h.session.handle("/save a").await.unwrap();
    h.session.handle("/save b").await.unwrap();
    let third = h.session.handle("/save c").await.unwrap();

    assert!(third.text.contains("\"saved_index\": 1"));
    assert_eq!(texts(&h.store).await, vec!["b", "c"]);
}

#[tokio::test]
async fn e2e_recall_is_case_insensitive_substring() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir.path().join("mem.json"), 100, AutoSaveMode::Off, ScriptedModel::always("x"));

    h.session.handle("/save the cat sat on the mat").await.unwrap();
    h.session.handle("/save dogs bark").await.unwrap();

    let reply = h.session.handle("/recall CAT").await.unwrap();
    assert!(reply.text.contains("the cat sat on the mat"));
    assert!(!reply.text.contains("dogs bark"));
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn e2e_persona_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        &dir.path().join("mem.json"),
        100,
        AutoSaveMode::Off,
        ScriptedModel::always("Hello!"),
    );

    let reply = h.session.handle("Hi, my name is Alice").await.unwrap();
    assert_eq!(reply.notices, vec!["[system] Saved persona: Alice".to_string()]);

    let listed = h.session.handle("/list_personas").await.unwrap();
    assert!(listed.text.contains("Alice"));
}
