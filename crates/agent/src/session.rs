//! Session driver: turns input lines into slash-command tool calls or
//! dispatch-loop turns, and schedules the background auto-save.

use mnemos_core::memory::MemoryStore;
use mnemos_core::{ModelCall, RequestId};
use mnemos_memory::AutoSaver;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::augment::MemoryAugmentedModel;
use crate::dispatch::DispatchLoop;

static PERSONA_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:my name is|call me)\s+([^\s,.!?;]{1,30})").expect("valid regex")
});

static PERSONA_ZH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:我叫|我是)\s*([^\s,，。.!！?？;；]{1,30})").expect("valid regex"));

/// Slash commands and the tools they call directly.
const SLASH_COMMANDS: &[(&str, &str)] = &[
    ("/save_persona", "SavePersona"),
    ("/list_personas", "ListPersonas"),
    ("/save", "SaveMemory"),
    ("/recall", "RecallMemory"),
    ("/persist", "PersistMemory"),
    ("/load", "LoadMemory"),
    ("/fetch", "FetchRenderedPage"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Exit,
    Empty,
    Command { tool: &'static str, arg: String },
    Prompt(String),
}

/// Classify one input line.
pub fn classify(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return Input::Exit;
    }
    if line.starts_with('/') {
        let (cmd, arg) = line
            .split_once(char::is_whitespace)
            .map(|(c, a)| (c, a.trim()))
            .unwrap_or((line, ""));
        if let Some((_, tool)) = SLASH_COMMANDS.iter().find(|(name, _)| *name == cmd) {
            return Input::Command {
                tool,
                arg: arg.to_string(),
            };
        }
    }
    Input::Prompt(line.to_string())
}

/// The name a user gives for themselves, if the utterance states one.
pub fn detect_persona_name(text: &str) -> Option<String> {
    PERSONA_EN
        .captures(text)
        .or_else(|| PERSONA_ZH.captures(text))
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Result of one handled line.
pub struct Reply {
    pub text: String,
    /// The id every log line, tool call and saved record of this line carries.
    pub request_id: RequestId,
    /// System notices shown before the answer (persona auto-saves and the like).
    pub notices: Vec<String>,
    /// The pending turn auto-save, if one was scheduled.
    pub autosave: Option<JoinHandle<()>>,
}

impl Reply {
    fn text(text: String, request_id: RequestId) -> Self {
        Self {
            text,
            request_id,
            notices: Vec::new(),
            autosave: None,
        }
    }
}

pub struct Session {
    dispatch: DispatchLoop,
    model: Arc<dyn ModelCall>,
    store: Arc<dyn MemoryStore>,
    saver: Arc<AutoSaver>,
    recall_limit: usize,
}

impl Session {
    pub fn new(
        dispatch: DispatchLoop,
        model: Arc<dyn ModelCall>,
        store: Arc<dyn MemoryStore>,
        saver: AutoSaver,
    ) -> Self {
        Self {
            dispatch,
            model,
            store,
            saver: Arc::new(saver),
            recall_limit: 5,
        }
    }

    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit;
        self
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Handle one input line. `None` means the session should end.
    pub async fn handle(&self, line: &str) -> Option<Reply> {
        match classify(line) {
            Input::Exit => None,
            Input::Empty => Some(Reply::text(String::new(), RequestId::new())),
            Input::Command { tool, arg } => {
                let rid = RequestId::new();
                let text = self.run_command(tool, &arg, &rid).await;
                Some(Reply::text(text, rid))
            }
            Input::Prompt(prompt) => {
                let rid = RequestId::new();
                Some(rid.scope(self.turn(prompt)).await)
            }
        }
    }

    async fn run_command(&self, tool: &str, arg: &str, request_id: &RequestId) -> String {
        debug!(request_id = %request_id, tool, "Slash command");
        match self.dispatch.tools().invoke(tool, arg, request_id).await {
            Ok(out) => match out.as_json() {
                Some(json) => serde_json::to_string_pretty(json).unwrap_or_else(|_| out.render()),
                None => out.render(),
            },
            Err(e) => format!("[error] {e}"),
        }
    }

    /// One dispatch-loop turn. Runs inside the request-id scope.
    async fn turn(&self, prompt: String) -> Reply {
        let rid = RequestId::current().unwrap_or_default();
        info!(request_id = %rid, input_chars = prompt.chars().count(), "Turn started");

        let mut notices = Vec::new();
        if let Some(name) = detect_persona_name(&prompt) {
            let arg = format!("persona_name:{name}\nsource:autosave\nutterance:{prompt}");
            match self.dispatch.tools().invoke("SavePersona", &arg, &rid).await {
                Ok(_) => notices.push(format!("[system] Saved persona: {name}")),
                Err(e) => {
                    warn!(request_id = %rid, error = %e, "Persona auto-save failed");
                    notices.push(format!("[system] Could not save persona: {e}"));
                }
            }
        }

        let model: Arc<dyn ModelCall> = Arc::new(MemoryAugmentedModel::new(
            self.model.clone(),
            self.store.clone(),
            prompt.clone(),
            self.recall_limit,
        ));
        let answer = self.dispatch.run(&prompt, model, &rid).await;
        info!(request_id = %rid, answer_chars = answer.chars().count(), "Turn finished");

        // The task-local id does not follow `spawn`; move a captured copy in.
        let saver = self.saver.clone();
        let captured = rid.clone();
        let user = prompt;
        let assistant = answer.clone();
        let autosave = self.dispatch.pool().spawn_detached(async move {
            saver.save_turn(&user, &assistant, &captured).await;
        });

        Reply {
            text: answer,
            request_id: rid,
            notices,
            autosave: Some(autosave),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedModel;
    use mnemos_config::{AutoSaveMode, MemoryConfig};
    use mnemos_core::tool::ToolRegistry;
    use mnemos_memory::{AutoSavePolicy, SubstringStore};
    use mnemos_tools::register_memory_tools;

    fn session(dir: &std::path::Path, model: Arc<ScriptedModel>, mode: AutoSaveMode) -> Session {
        let store: Arc<dyn MemoryStore> = Arc::new(SubstringStore::open(dir.join("mem.json"), 100));
        let mut registry = ToolRegistry::new();
        register_memory_tools(&mut registry, store.clone());
        let config = MemoryConfig {
            auto_save: mode,
            ..MemoryConfig::default()
        };
        let saver = AutoSaver::new(store.clone(), AutoSavePolicy::from(&config));
        Session::new(DispatchLoop::new(Arc::new(registry)), model, store, saver)
    }

    #[test]
    fn classify_lines() {
        assert_eq!(classify("  "), Input::Empty);
        assert_eq!(classify("EXIT"), Input::Exit);
        assert_eq!(classify("quit"), Input::Exit);
        assert_eq!(
            classify("/save buy milk"),
            Input::Command { tool: "SaveMemory", arg: "buy milk".into() }
        );
        assert_eq!(
            classify("/save_persona Alice"),
            Input::Command { tool: "SavePersona", arg: "Alice".into() }
        );
        assert_eq!(classify("/persist"), Input::Command { tool: "PersistMemory", arg: String::new() });
        assert_eq!(classify("/unknown thing"), Input::Prompt("/unknown thing".into()));
        assert_eq!(classify("hello"), Input::Prompt("hello".into()));
    }

    #[test]
    fn persona_names_are_detected() {
        assert_eq!(detect_persona_name("Hi, my name is Alice."), Some("Alice".into()));
        assert_eq!(detect_persona_name("please call me Bob"), Some("Bob".into()));
        assert_eq!(detect_persona_name("你好，我叫小明。"), Some("小明".into()));
        assert_eq!(detect_persona_name("what's the weather"), None);
    }

    #[tokio::test]
    async fn exit_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path(), Arc::new(ScriptedModel::always("x")), AutoSaveMode::Off);
        assert!(s.handle("exit").await.is_none());
    }

    #[tokio::test]
    async fn turn_answers_and_autosaves() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::always("Rust is a systems language."));
        let s = session(dir.path(), model.clone(), AutoSaveMode::Always);

        let reply = s.handle("Tell me about Rust").await.unwrap();
        assert_eq!(reply.text, "Rust is a systems language.");
        reply.autosave.unwrap().await.unwrap();

        let records = s.store().records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), Some("turn"));
        assert!(records[0].text.starts_with("User: Tell me about Rust"));
        assert_eq!(records[0].metadata["request_id"], reply.request_id.as_str());
    }

    #[tokio::test]
    async fn persona_statement_is_saved_with_notice() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::always("Nice to meet you."));
        let s = session(dir.path(), model.clone(), AutoSaveMode::Off);

        let reply = s.handle("my name is Alice").await.unwrap();
        assert_eq!(reply.notices, vec!["[system] Saved persona: Alice".to_string()]);

        let records = s.store().records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), Some("persona"));
        assert_eq!(records[0].metadata["persona_name"], "Alice");
        assert!(model.last_prompt().starts_with("Related long-term memory"));
    }

    #[tokio::test]
    async fn slash_commands_bypass_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::always("unused"));
        let s = session(dir.path(), model.clone(), AutoSaveMode::Always);

        let saved = s.handle("/save the cat sat on the mat").await.unwrap();
        assert!(saved.text.contains("\"saved_index\": 0"));
        assert!(saved.autosave.is_none());

        let recalled = s.handle("/recall cat").await.unwrap();
        assert!(recalled.text.contains("the cat sat on the mat"));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn unregistered_slash_tool_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path(), Arc::new(ScriptedModel::always("x")), AutoSaveMode::Off);
        let reply = s.handle("/fetch https://example.com").await.unwrap();
        assert!(reply.text.starts_with("[error]"));
        assert!(reply.text.contains("FetchRenderedPage"));
    }
}
