//! Shared test doubles for the agent crate.

use async_trait::async_trait;
use mnemos_core::error::{ProviderError, ToolError};
use mnemos_core::tool::{Tool, ToolOutput};
use mnemos_core::{ModelCall, RequestId};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A model that replays scripted results, then repeats `fallback` forever.
///
/// Every prompt it receives is recorded for later assertions.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: Result<String, ProviderError>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: &[&str]) -> Self {
        Self::with_results(responses.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(results: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            fallback: Ok("(script exhausted)".into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `text`.
    pub fn always(text: &str) -> Self {
        let mut model = Self::with_results(Vec::new());
        model.fallback = Ok(text.to_string());
        model
    }

    pub fn failing(error: ProviderError) -> Self {
        let mut model = Self::with_results(Vec::new());
        model.fallback = Err(error);
        model
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ModelCall for ScriptedModel {
    async fn call(&self, prompt: &str, _request_id: &RequestId) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// A model that never answers within any reasonable deadline.
pub struct StalledModel;

#[async_trait]
impl ModelCall for StalledModel {
    async fn call(&self, _prompt: &str, _request_id: &RequestId) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".into())
    }
}

/// Returns `echo:<arg>`.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "Echo"
    }

    fn description(&self) -> &str {
        "Echo the argument back"
    }

    async fn invoke(&self, arg: &str, _request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::Text(format!("echo:{arg}")))
    }
}

/// Always fails.
pub struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "Broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn invoke(&self, _arg: &str, _request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        Err(ToolError::failed("Broken", "disk on fire"))
    }
}
