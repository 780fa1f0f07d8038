//! Default system prompt.

use mnemos_core::tool::ToolRegistry;

/// Build the system prompt: tool-call protocol plus the registered tools.
pub fn default_system_prompt(tools: &ToolRegistry) -> String {
    let mut prompt = String::from(
        "You are an assistant that can call external tools. When you need fresh facts, \
         the rendered text of a web page, your long-term memory or portfolio analysis, \
         request a tool on a line of its own using exactly one of these forms \
         (the tool name must match the list below exactly):\n\n\
         CALL_TOOL: ToolName <arg string>\n\
         or\n\
         CALL_TOOL_JSON: {\"tool\": \"ToolName\", \"args\": \"...\"}\n\n\
         For example:\n\
         CALL_TOOL: FetchRenderedPage https://example.com\n\n\
         After a tool result comes back, continue and write the final answer, citing \
         what the tool returned. The number of tool calls per question is limited.",
    );

    if !tools.is_empty() {
        prompt.push_str("\n\nAvailable tools:\n");
        prompt.push_str(&tools.describe());
    }
    prompt
}
