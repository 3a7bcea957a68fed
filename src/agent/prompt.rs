//! System prompt construction.

use crate::tools::ToolSpec;

/// Build the system prompt handed to every provider call.
pub fn build_system_prompt(tools: &[ToolSpec]) -> String {
    let tool_descriptions = tools
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a helpful assistant with access to tools.

## Available Tools
{tool_descriptions}

## Rules
1. Use tools when they would improve your answer - search for current facts, run code for calculations, use workflows for text processing
2. After tool results come back, answer the user's question directly from them
3. Keep answers concise and cite search result links when you used them
4. If no tool is needed, just answer"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_lists_every_tool() {
        let specs = vec![
            ToolSpec {
                name: "google_search".into(),
                description: "search the web".into(),
                parameters: json!({}),
            },
            ToolSpec {
                name: "ai_pipe".into(),
                description: "run a workflow".into(),
                parameters: json!({}),
            },
        ];
        let prompt = build_system_prompt(&specs);
        assert!(prompt.contains("**google_search**"));
        assert!(prompt.contains("**ai_pipe**"));
    }
}
