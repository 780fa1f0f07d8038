//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool is a plain request/response unit: one string argument in, one
//! [`ToolOutput`] out. Tools never need to know about the dispatch loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use crate::error::ToolError;
use crate::request_id::RequestId;

/// The result of a tool invocation.
///
/// `Text` is embedded verbatim; `Structured` keeps its JSON for programmatic
/// callers and is pretty-printed when embedded into a model context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl ToolOutput {
    /// Build a structured output from any serializable value.
    pub fn structured<T: Serialize>(value: &T) -> Result<Self, ToolError> {
        serde_json::to_value(value)
            .map(Self::Structured)
            .map_err(|e| ToolError::InvalidArguments(format!("Unserializable tool output: {e}")))
    }

    /// Normalize to a string for context embedding.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// The core Tool trait.
///
/// Each built-in (SavePersona, RecallMemory, FetchRenderedPage, …) implements
/// this trait and is registered in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique, case-sensitive name the model uses in directives.
    fn name(&self) -> &str;

    /// A description of what this tool does (listed in the system prompt).
    fn description(&self) -> &str;

    /// Invoke the tool with its raw argument string.
    async fn invoke(&self, arg: &str, request_id: &RequestId) -> Result<ToolOutput, ToolError>;

    /// Time the tool needs to finish on its own. The dispatch loop never
    /// gives a call a shorter deadline than this.
    fn min_deadline(&self) -> Option<Duration> {
        None
    }
}

/// A registry of available tools, keyed by exact name.
///
/// The dispatch loop only reads from it; registration happens at startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Invoke a tool by name.
    pub async fn invoke(
        &self,
        name: &str,
        arg: &str,
        request_id: &RequestId,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.invoke(arg, request_id).await
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// One `- Name: description` line per tool, sorted by name.
    pub fn describe(&self) -> String {
        self.names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "Echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        async fn invoke(&self, arg: &str, _request_id: &RequestId) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::Text(arg.to_string()))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.get("Echo").is_some());
        assert!(registry.get("echo").is_none(), "lookup is case-sensitive");
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_describe_lists_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.describe(), "- Echo: Echoes back the input");
        assert_eq!(registry.names(), vec!["Echo"]);
    }

    #[tokio::test]
    async fn registry_invoke_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let out = registry
            .invoke("Echo", "hello world", &RequestId::new())
            .await
            .unwrap();
        assert_eq!(out, ToolOutput::Text("hello world".into()));
    }

    #[tokio::test]
    async fn registry_invoke_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .invoke("Nope", "", &RequestId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn structured_output_renders_pretty_json() {
        let out = ToolOutput::Structured(serde_json::json!({"persisted": true}));
        assert!(out.render().contains("\"persisted\": true"));
        assert!(out.as_json().is_some());
        assert_eq!(ToolOutput::Text("x".into()).render(), "x");
    }

    #[test]
    fn tool_output_is_tagged() {
        let json = serde_json::to_value(ToolOutput::Text("hi".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "text", "value": "hi"}));
    }
}
