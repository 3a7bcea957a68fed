//! OpenAI chat-completions binding.
//!
//! Also the wire format for every OpenAI-compatible backend: `aipipe` reuses
//! `send` with its own base URL and credential check.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{cap_outbound, LlmResponse};
use crate::conversation::{ConversationEntry, Role, ToolCallRequest, ToolName};
use crate::error::AgentError;
use crate::tools::ToolSpec;

pub(crate) const BASE_URL: &str = "https://api.openai.com/v1";

/// Vendor ceilings, below the global caps.
const MAX_MESSAGES: usize = 16;
const MAX_MESSAGE_CHARS: usize = 4000;

pub(crate) fn validate_credential(credential: &str) -> Result<(), AgentError> {
    let trimmed = credential.trim();
    if trimmed.starts_with("sk-") && trimmed.len() >= 20 {
        Ok(())
    } else {
        Err(AgentError::Credential(
            "OpenAI API keys start with 'sk-' and are at least 20 characters".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolDef<'a>,
}

#[derive(Debug, Serialize)]
struct WireToolDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

pub(crate) async fn send(
    client: &Client,
    base_url: &str,
    model: &str,
    system: &str,
    messages: &[ConversationEntry],
    tools: &[ToolSpec],
    credential: &str,
) -> Result<LlmResponse, AgentError> {
    if base_url == BASE_URL {
        validate_credential(credential)?;
    }

    let request = build_request(model, system, messages, tools);
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let response = client
        .post(&url)
        .bearer_auth(credential.trim())
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

    normalize(body)
}

fn build_request<'a>(
    model: &'a str,
    system: &str,
    messages: &[ConversationEntry],
    tools: &'a [ToolSpec],
) -> ChatRequest<'a> {
    let mut wire = Vec::new();
    if !system.is_empty() {
        wire.push(WireMessage {
            role: "system",
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for entry in cap_outbound(messages, MAX_MESSAGES, MAX_MESSAGE_CHARS) {
        wire.push(match entry.role {
            Role::User => WireMessage {
                role: "user",
                content: Some(entry.content),
                tool_calls: None,
                tool_call_id: None,
            },
            Role::Assistant => WireMessage {
                role: "assistant",
                content: if entry.content.is_empty() {
                    None
                } else {
                    Some(entry.content)
                },
                tool_calls: entry.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .map(|call| WireToolCall {
                            id: call.id,
                            kind: "function".to_string(),
                            function: WireFunction {
                                name: call.name.as_str().to_string(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: None,
            },
            Role::Tool => WireMessage {
                role: "tool",
                content: Some(entry.content),
                tool_calls: None,
                tool_call_id: entry.tool_call_id,
            },
        });
    }

    let wire_tools = if tools.is_empty() {
        None
    } else {
        Some(
            tools
                .iter()
                .map(|spec| WireTool {
                    kind: "function",
                    function: WireToolDef {
                        name: &spec.name,
                        description: &spec.description,
                        parameters: &spec.parameters,
                    },
                })
                .collect(),
        )
    };

    ChatRequest {
        model,
        messages: wire,
        tools: wire_tools,
    }
}

fn normalize(body: ChatResponse) -> Result<LlmResponse, AgentError> {
    let message = body
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| AgentError::Upstream("provider returned no choices".to_string()))?;

    let mut tool_calls = Vec::new();
    for call in message.tool_calls.unwrap_or_default() {
        let Some(name) = ToolName::parse(&call.function.name) else {
            tracing::warn!(name = %call.function.name, "dropping call to unregistered tool");
            continue;
        };
        let arguments =
            serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
        tool_calls.push(ToolCallRequest {
            id: call.id,
            name,
            arguments,
        });
    }

    Ok(LlmResponse {
        content: message.content.filter(|c| !c.is_empty()),
        tool_calls,
    })
}
