//! The dispatch loop: one user utterance in, one final answer out.
//!
//! Each round calls the model with the accumulated context, looks for a tool
//! directive in the response and, if one is present, runs the tool and
//! appends the observation before the next round. A response without a
//! directive is the final answer. After `max_rounds + 1` rounds the model is
//! asked one last time to answer with what it has.
//!
//! The loop never retries a failed model call; it ends the turn with a short
//! failure message instead. Tool failures are fed back to the model as
//! observations.

use chrono::{Datelike, Local};
use mnemos_config::AgentConfig;
use mnemos_core::tool::ToolRegistry;
use mnemos_core::{ModelCall, RequestId};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::directive::parse_directive;
use crate::persona::SystemPromptHook;
use crate::pool::WorkerPool;

/// Tool results are cut to this many characters inside the context.
pub const MAX_RESULT_CHARS: usize = 1000;

const CONTINUE_INSTRUCTION: &str = "\nContinue from the tool result above and write the final answer \
(issue another CALL_TOOL: directive only if you still need one).";

const FINAL_ROUND_INSTRUCTION: &str =
    "\n\nThe maximum number of tool calls has been reached. Answer now using the information above.";

const ELISION_MARKER: &str = "\n\n[... earlier tool rounds elided ...]\n\n";

static TIME_QUERY_ZH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"今年是哪一?年|现在是(哪一?年|什么年|几几年)|当前年份|今天是?(几号|几月几[号日]|什么日子)|今天的日期")
        .expect("valid regex")
});

static TIME_QUERY_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(what|which)\s+(year|date|day)\s+is\s+(it|today|this)\b|\bwhat'?s\s+(the\s+)?(current\s+)?(year|date)\b|\bwhat\s+is\s+the\s+current\s+(year|date)\b|\btoday'?s\s+date\b",
    )
    .expect("valid regex")
});

/// Answer year/date questions from the local clock.
fn answer_time_query(prompt: &str) -> Option<String> {
    let now = Local::now();
    if TIME_QUERY_ZH.is_match(prompt) {
        return Some(format!(
            "今年是 {} 年。今天是 {}。",
            now.year(),
            now.format("%Y-%m-%d")
        ));
    }
    if TIME_QUERY_EN.is_match(prompt) {
        return Some(format!(
            "It is {}. Today's date is {}.",
            now.year(),
            now.format("%Y-%m-%d")
        ));
    }
    None
}

/// Keep the first `head_len` bytes, elide the oldest middle part and keep the
/// newest tail so the result is about `max_chars` characters long.
///
/// Returns `None` when `context` already fits.
fn cap_context(context: &str, head_len: usize, max_chars: usize) -> Option<String> {
    if max_chars == 0 || context.chars().count() <= max_chars {
        return None;
    }
    let (head, rest) = context.split_at(head_len.min(context.len()));
    let fixed = head.chars().count() + ELISION_MARKER.chars().count();
    let tail_budget = max_chars.saturating_sub(fixed).max(max_chars / 4);
    let rest_chars = rest.chars().count();
    if rest_chars <= tail_budget {
        return None;
    }
    let tail: String = rest.chars().skip(rest_chars - tail_budget).collect();
    Some(format!("{head}{ELISION_MARKER}{tail}"))
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub struct DispatchLoop {
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_rounds: usize,
    prompt_hook: Option<Arc<dyn SystemPromptHook>>,
    pool: WorkerPool,
    call_timeout: Duration,
    max_context_chars: usize,
}

impl DispatchLoop {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            system_prompt: String::new(),
            max_rounds: 3,
            prompt_hook: None,
            pool: WorkerPool::default(),
            call_timeout: Duration::from_secs(90),
            max_context_chars: 24_000,
        }
    }

    /// Apply the `[agent]` section of the configuration.
    pub fn from_config(tools: Arc<ToolRegistry>, config: &AgentConfig) -> Self {
        Self::new(tools)
            .with_max_rounds(config.max_rounds)
            .with_pool(WorkerPool::new(config.worker_pool_size))
            .with_call_timeout(Duration::from_secs(config.call_timeout_secs))
            .with_max_context_chars(config.max_context_chars)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_prompt_hook(mut self, hook: Arc<dyn SystemPromptHook>) -> Self {
        self.prompt_hook = Some(hook);
        self
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    /// Deadline for each model and tool call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// `0` disables the cap.
    pub fn with_max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run one turn and return the final answer.
    pub async fn run(
        &self,
        user_prompt: &str,
        model: Arc<dyn ModelCall>,
        request_id: &RequestId,
    ) -> String {
        if let Some(answer) = answer_time_query(user_prompt) {
            info!(request_id = %request_id, "Answered time query from local clock");
            return answer;
        }

        let system = match &self.prompt_hook {
            Some(hook) => hook.apply(&self.system_prompt, request_id).await,
            None => self.system_prompt.clone(),
        };
        let mut context = [system.trim(), user_prompt.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let head_len = context.len();
        debug!(
            request_id = %request_id,
            context_preview = %truncate_chars(&context, 1200),
            "Initial context assembled"
        );

        for round in 0..=self.max_rounds {
            debug!(request_id = %request_id, round, context_chars = context.len(), "Calling model");
            let response = match self.call_model(&model, &context, request_id).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(request_id = %request_id, round, error = %e, "Model call failed");
                    return format!("Model call failed: {e}");
                }
            };
            debug!(
                request_id = %request_id,
                round,
                response_preview = %truncate_chars(&response, 1000),
                "Model responded"
            );

            let Some(directive) = parse_directive(&response) else {
                info!(request_id = %request_id, rounds = round + 1, "Final answer");
                return response;
            };

            if !self.tools.contains(&directive.tool) {
                warn!(request_id = %request_id, tool = %directive.tool, "Model requested unknown tool");
                context.push_str(&format!(
                    "\n\n[ToolError] Unknown tool: {}\nModel output:\n{}\nDo not call tools that do not exist.",
                    directive.tool, response
                ));
                self.enforce_cap(&mut context, head_len, request_id);
                continue;
            }

            let start = Instant::now();
            info!(
                request_id = %request_id,
                tool = %directive.tool,
                args = %truncate_chars(&directive.args, 1000),
                "Invoking tool"
            );
            let result = self
                .invoke_tool(&directive.tool, &directive.args, request_id)
                .await;
            let elapsed = start.elapsed();
            match &result {
                Ok(out) => info!(
                    request_id = %request_id,
                    tool = %directive.tool,
                    elapsed_ms = elapsed.as_millis() as u64,
                    result_preview = %truncate_chars(out, 1000),
                    "Tool finished"
                ),
                Err(e) => warn!(
                    request_id = %request_id,
                    tool = %directive.tool,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Tool failed"
                ),
            }
            let result = match result {
                Ok(out) => out,
                Err(e) => format!("Tool execution failed: {e}"),
            };

            context.push_str("\n\n");
            context.push_str(response.trim());
            context.push_str(&format!(
                "\n\n[ToolInvocation]\nTool: {}\nArgs: {}\nResult (truncated):\n{}\n(elapsed: {:.2}s)\n",
                directive.tool,
                directive.args,
                truncate_chars(&result, MAX_RESULT_CHARS),
                elapsed.as_secs_f64()
            ));
            context.push_str(CONTINUE_INSTRUCTION);
            self.enforce_cap(&mut context, head_len, request_id);
        }

        warn!(request_id = %request_id, max_rounds = self.max_rounds, "Tool call limit reached; forcing final answer");
        context.push_str(FINAL_ROUND_INSTRUCTION);
        match self.call_model(&model, &context, request_id).await {
            Ok(text) => text,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Final model call failed");
                format!("Model call failed (final round): {e}")
            }
        }
    }

    async fn call_model(
        &self,
        model: &Arc<dyn ModelCall>,
        context: &str,
        request_id: &RequestId,
    ) -> Result<String, String> {
        let model = model.clone();
        let prompt = context.to_string();
        let rid = request_id.clone();
        match self
            .pool
            .run(self.call_timeout, async move { model.call(&prompt, &rid).await })
            .await
        {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn invoke_tool(
        &self,
        name: &str,
        args: &str,
        request_id: &RequestId,
    ) -> Result<String, String> {
        let Some(tool) = self.tools.get(name) else {
            return Err(format!("Tool not found: {name}"));
        };
        let deadline = tool
            .min_deadline()
            .map_or(self.call_timeout, |d| d.max(self.call_timeout));
        let args = args.to_string();
        let rid = request_id.clone();
        match self
            .pool
            .run(deadline, async move { tool.invoke(&args, &rid).await })
            .await
        {
            Ok(Ok(out)) => Ok(out.render()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn enforce_cap(&self, context: &mut String, head_len: usize, request_id: &RequestId) {
        if let Some(capped) = cap_context(context, head_len, self.max_context_chars) {
            debug!(
                request_id = %request_id,
                before = context.chars().count(),
                after = capped.chars().count(),
                "Context capped"
            );
            *context = capped;
        }
    }
}
