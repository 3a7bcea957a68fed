//! Conversation log types.
//!
//! One `ConversationEntry` per dialogue turn fragment. The log is append-only
//! and trimmed from the front by the memory manager; every tool-role entry
//! answers a `ToolCallRequest` emitted by the preceding assistant entry.

use serde::{Deserialize, Serialize};

/// Role of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (fed back as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// The closed set of callable tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "google_search")]
    GoogleSearch,
    #[serde(rename = "ai_pipe")]
    AiPipe,
    #[serde(rename = "execute_javascript")]
    ExecuteJavascript,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GoogleSearch => "google_search",
            ToolName::AiPipe => "ai_pipe",
            ToolName::ExecuteJavascript => "execute_javascript",
        }
    }

    /// Parse a vendor-reported tool name; unknown names are dropped by the
    /// gateway with a warning rather than failing the whole response.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "google_search" => Some(ToolName::GoogleSearch),
            "ai_pipe" => Some(ToolName::AiPipe),
            "execute_javascript" => Some(ToolName::ExecuteJavascript),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the LLM (or the mock responder).
///
/// Created by the provider gateway, consumed exactly once by the tool
/// executor. `id` correlates the eventual result back to this request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: ToolName,
    pub arguments: serde_json::Value,
}

/// One turn fragment in the dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,

    /// May be empty for assistant entries that only carry tool calls.
    #[serde(default)]
    pub content: String,

    /// Present only on assistant entries that requested tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,

    /// Present only on tool-role entries; back-reference to the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCallRequest>>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, appending a visible
/// marker when anything was dropped.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}... [truncated]", kept)
}
