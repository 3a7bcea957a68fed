//! Google Gemini binding (generateContent).
//!
//! Gemini speaks contents/parts rather than messages, calls functions via
//! `functionCall` parts with no call id, and wants results back as
//! `functionResponse` parts keyed by function name. Ids are generated here on
//! the way in; tool-role entries are mapped back to names via the ids on the
//! preceding assistant entries.

use std::collections::HashMap;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{cap_outbound, LlmResponse};
use crate::conversation::{ConversationEntry, Role, ToolCallRequest, ToolName};
use crate::error::AgentError;
use crate::tools::ToolSpec;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Vendor ceilings, below the global caps.
const MAX_MESSAGES: usize = 12;
const MAX_MESSAGE_CHARS: usize = 4000;

pub(crate) fn validate_credential(credential: &str) -> Result<(), AgentError> {
    let trimmed = credential.trim();
    if trimmed.starts_with("AIza") && trimmed.len() >= 30 {
        Ok(())
    } else {
        Err(AgentError::Credential(
            "Google API keys start with 'AIza' and are at least 30 characters".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolsDecl<'a>>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<PartOut>,
}

#[derive(Debug, Serialize)]
struct PartOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl PartOut {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            function_call: None,
            function_response: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
struct ToolsDecl<'a> {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<FunctionDecl<'a>>,
}

#[derive(Debug, Serialize)]
struct FunctionDecl<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartIn>,
}

#[derive(Debug, Deserialize)]
struct PartIn {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "functionCall", default)]
    function_call: Option<FunctionCall>,
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

    let request = build_request(system, messages, tools);
    let url = format!(
        "{}/{}:generateContent?key={}",
        BASE_URL,
        model,
        urlencoding::encode(credential.trim())
    );

    let response = client
        .post(&url)
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

    let body: GenerateContentResponse = response
        .json()
        .await
        .map_err(|e| AgentError::Upstream(format!("malformed provider payload: {}", e)))?;

    normalize(body)
}

fn build_request<'a>(
    system: &str,
    messages: &[ConversationEntry],
    tools: &'a [ToolSpec],
) -> GenerateContentRequest<'a> {
    // Tool results reference calls by id; Gemini wants them keyed by name.
    let mut call_names: HashMap<String, ToolName> = HashMap::new();
    for entry in messages {
        for call in entry.tool_calls.iter().flatten() {
            call_names.insert(call.id.clone(), call.name);
        }
    }

    let mut contents = Vec::new();
    for entry in cap_outbound(messages, MAX_MESSAGES, MAX_MESSAGE_CHARS) {
        match entry.role {
            Role::User => contents.push(Content {
                role: Some("user"),
                parts: vec![PartOut::text(entry.content)],
            }),
            Role::Assistant => {
                let mut parts = Vec::new();
                if !entry.content.is_empty() {
                    parts.push(PartOut::text(entry.content));
                }
                for call in entry.tool_calls.unwrap_or_default() {
                    parts.push(PartOut {
                        text: None,
                        function_call: Some(FunctionCall {
                            name: call.name.as_str().to_string(),
                            args: call.arguments,
                        }),
                        function_response: None,
                    });
                }
                if !parts.is_empty() {
                    contents.push(Content {
                        role: Some("model"),
                        parts,
                    });
                }
            }
            Role::Tool => {
                let name = entry
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| call_names.get(id))
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let response: Value = serde_json::from_str(&entry.content)
                    .unwrap_or_else(|_| json!({ "content": entry.content }));
                let response = if response.is_object() {
                    response
                } else {
                    json!({ "content": response })
                };
                contents.push(Content {
                    role: Some("user"),
                    parts: vec![PartOut {
                        text: None,
                        function_call: None,
                        function_response: Some(FunctionResponse { name, response }),
                    }],
                });
            }
        }
    }

    let wire_tools = if tools.is_empty() {
        None
    } else {
        Some(vec![ToolsDecl {
            function_declarations: tools
                .iter()
                .map(|spec| FunctionDecl {
                    name: &spec.name,
                    description: &spec.description,
                    parameters: &spec.parameters,
                })
                .collect(),
        }])
    };

    GenerateContentRequest {
        contents,
        system_instruction: if system.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: vec![PartOut::text(system.to_string())],
            })
        },
        tools: wire_tools,
        generation_config: GenerationConfig {
            temperature: 0.7,
            max_output_tokens: 2048,
        },
    }
}

fn normalize(body: GenerateContentResponse) -> Result<LlmResponse, AgentError> {
    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::Upstream("provider returned no candidates".to_string()))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in candidate.content.parts {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(call) = part.function_call {
            let Some(name) = ToolName::parse(&call.name) else {
                tracing::warn!(name = %call.name, "dropping call to unregistered function");
                continue;
            };
            tool_calls.push(ToolCallRequest {
                id: format!("call_{}", Uuid::new_v4().simple()),
                name,
                arguments: call.args,
            });
        }
    }

    Ok(LlmResponse {
        content: if text.is_empty() { None } else { Some(text) },
        tool_calls,
    })
}
