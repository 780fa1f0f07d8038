//! Tool-call directives embedded in model output.
//!
//! Two syntaxes are recognized, tried in this order:
//!
//! ```text
//! CALL_TOOL_JSON: {"tool": "FetchRenderedPage", "args": "https://example.com"}
//! CALL_TOOL: FetchRenderedPage https://example.com
//! ```
//!
//! The JSON form may span lines and accepts `name`/`arguments` as aliases.
//! A JSON payload that fails to decode falls through to the line form. The
//! line form matches the first line (after trimming) that starts with the
//! keyword; the keyword is case-insensitive, the tool name is not.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static JSON_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)CALL_TOOL_JSON:\s*").expect("valid regex"));

static LINE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^CALL_TOOL:\s*([A-Za-z0-9_]+)(?:\s+(.*))?$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveForm {
    Json,
    Line,
}

/// A parsed request to invoke one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDirective {
    pub tool: String,
    pub args: String,
    pub form: DirectiveForm,
}

/// Extract the directive from a model response, if there is one.
pub fn parse_directive(text: &str) -> Option<ToolDirective> {
    parse_json_form(text).or_else(|| parse_line_form(text))
}

fn parse_json_form(text: &str) -> Option<ToolDirective> {
    let marker = JSON_MARKER.find(text)?;
    let rest = &text[marker.end()..];
    if !rest.starts_with('{') {
        return None;
    }

    // Decode exactly one value; trailing prose after the object is ignored.
    let payload = serde_json::Deserializer::from_str(rest)
        .into_iter::<Value>()
        .next()?
        .ok()?;

    let tool = first_present(&payload, &["tool", "name"])?
        .as_str()?
        .trim()
        .to_string();
    if tool.is_empty() {
        return None;
    }

    let args = match first_present(&payload, &["args", "arguments"]) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    Some(ToolDirective {
        tool,
        args,
        form: DirectiveForm::Json,
    })
}

/// First key whose value is present, non-null and not an empty string.
fn first_present<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| {
        payload
            .get(*k)
            .filter(|v| !v.is_null() && v.as_str() != Some(""))
    })
}

fn parse_line_form(text: &str) -> Option<ToolDirective> {
    text.lines().map(str::trim).find_map(|line| {
        let caps = LINE_DIRECTIVE.captures(line)?;
        Some(ToolDirective {
            tool: caps[1].to_string(),
            args: caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
            form: DirectiveForm::Line,
        })
    })
}
