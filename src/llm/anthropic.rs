//! Anthropic messages binding.
//!
//! Anthropic's native shape uses typed content blocks: assistant tool calls
//! are `tool_use` blocks and tool results travel back inside a user message
//! as `tool_result` blocks. Consecutive tool-role entries are merged into one
//! user message so roles keep alternating.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{cap_outbound, LlmResponse};
use crate::conversation::{ConversationEntry, Role, ToolCallRequest, ToolName};
use crate::error::AgentError;
use crate::tools::ToolSpec;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

/// Vendor ceilings, below the global caps.
const MAX_MESSAGES: usize = 12;
const MAX_MESSAGE_CHARS: usize = 4000;

pub(crate) fn validate_credential(credential: &str) -> Result<(), AgentError> {
    let trimmed = credential.trim();
    if trimmed.starts_with("sk-ant-") && trimmed.len() >= 24 {
        Ok(())
    } else {
        Err(AgentError::Credential(
            "Anthropic API keys start with 'sk-ant-' and are at least 24 characters".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<BlockOut>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum BlockOut {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    content: Vec<BlockIn>,
}

#[derive(Debug, Deserialize)]
struct BlockIn {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

pub(crate) async fn send(
    client: &Client,
    model: &str,
    system: &str,
    messages: &[ConversationEntry],
    tools: &[ToolSpec],
    credential: &str,
) -> Result<LlmResponse, AgentError> {
    validate_credential(credential)?;

    let request = build_request(model, system, messages, tools);

    let response = client
        .post(MESSAGES_URL)
        .header("x-api-key", credential.trim())
        .header("anthropic-version", API_VERSION)
        .json(&request)
        .send()
        .await
        .map_err(|e| AgentError::Upstream(format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AgentError::Upstream(format!(
            "provider returned {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )));
    }

    let body: ChatResponse = response
        .json()
        .await
        .map_err(|e| AgentError::Upstream(format!("malformed provider payload: {}", e)))?;

    Ok(normalize(body))
}

fn build_request<'a>(
    model: &'a str,
    system: &'a str,
    messages: &[ConversationEntry],
    tools: &'a [ToolSpec],
) -> ChatRequest<'a> {
    let mut wire: Vec<WireMessage> = Vec::new();

    for entry in cap_outbound(messages, MAX_MESSAGES, MAX_MESSAGE_CHARS) {
        match entry.role {
            Role::User => wire.push(WireMessage {
                role: "user",
                content: vec![BlockOut::Text {
                    text: entry.content,
                }],
            }),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !entry.content.is_empty() {
                    blocks.push(BlockOut::Text {
                        text: entry.content,
                    });
                }
                for call in entry.tool_calls.unwrap_or_default() {
                    blocks.push(BlockOut::ToolUse {
                        id: call.id,
                        name: call.name.as_str().to_string(),
                        input: call.arguments,
                    });
                }
                if !blocks.is_empty() {
                    wire.push(WireMessage {
                        role: "assistant",
                        content: blocks,
                    });
                }
            }
            Role::Tool => {
                let block = BlockOut::ToolResult {
                    tool_use_id: entry.tool_call_id.unwrap_or_default(),
                    content: entry.content,
                };
                // Fold consecutive tool results into one user message.
                match wire.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && matches!(last.content.first(), Some(BlockOut::ToolResult { .. })) =>
                    {
                        last.content.push(block)
                    }
                    _ => wire.push(WireMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
        }
    }

    let wire_tools = if tools.is_empty() {
        None
    } else {
        Some(
            tools
                .iter()
                .map(|spec| WireTool {
                    name: &spec.name,
                    description: &spec.description,
                    input_schema: &spec.parameters,
                })
                .collect(),
        )
    };

    ChatRequest {
        model,
        max_tokens: MAX_TOKENS,
        system: if system.is_empty() { None } else { Some(system) },
        messages: wire,
        tools: wire_tools,
    }
}

fn normalize(body: ChatResponse) -> LlmResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in body.content {
        match block.kind.as_str() {
            "text" => {
                if let Some(t) = block.text {
                    text.push_str(&t);
                }
            }
            "tool_use" => {
                let name = block.name.as_deref().and_then(ToolName::parse);
                match (block.id, name) {
                    (Some(id), Some(name)) => tool_calls.push(ToolCallRequest {
                        id,
                        name,
                        arguments: block.input.unwrap_or_else(|| json!({})),
                    }),
                    _ => tracing::warn!("dropping malformed tool_use block"),
                }
            }
            _ => {}
        }
    }

    LlmResponse {
        content: if text.is_empty() { None } else { Some(text) },
        tool_calls,
    }
}
