//! Provider gateway.
//!
//! Normalizes four heterogeneous LLM backends into one internal shape,
//! `LlmResponse { content, tool_calls }`. A blank or sentinel credential
//! selects demo mode (the mock responder) without attempting a live call;
//! any live-call failure degrades to the mock responder as well, logged but
//! never fatal to the turn.

pub mod aipipe;
pub mod anthropic;
pub mod gemini;
pub mod mock;
pub mod openai;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::conversation::{truncate_with_marker, ConversationEntry, ToolCallRequest};
use crate::error::AgentError;
use crate::tools::ToolSpec;

/// The closed set of supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Anthropic,
    Google,
    AiPipe,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::AiPipe => "aipipe",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            "google" | "gemini" => Ok(Provider::Google),
            "aipipe" => Ok(Provider::AiPipe),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// The uniform response shape every binding normalizes into.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Normalizing front door over all provider bindings.
pub struct Gateway {
    client: reqwest::Client,
    limits: Limits,
}

impl Gateway {
    pub fn new(limits: Limits) -> Self {
        let client = reqwest::Client::builder()
            .timeout(limits.provider_timeout)
            .build()
            .unwrap_or_default();
        Self { client, limits }
    }

    /// Send the (windowed) conversation to a provider. A demo credential goes
    /// straight to the mock responder; a live attempt can fail with
    /// `Credential` or `Upstream`.
    pub async fn send(
        &self,
        provider: Provider,
        model: &str,
        system: &str,
        messages: &[ConversationEntry],
        tools: &[ToolSpec],
        credential: &str,
    ) -> Result<LlmResponse, AgentError> {
        if is_demo_credential(credential) {
            tracing::debug!(%provider, "no live credential, using mock responder");
            return Ok(mock::respond(provider, model, messages));
        }

        let mut response = match provider {
            Provider::OpenAI => {
                openai::send(
                    &self.client,
                    openai::BASE_URL,
                    model,
                    system,
                    messages,
                    tools,
                    credential,
                )
                .await?
            }
            Provider::Anthropic => {
                anthropic::send(&self.client, model, system, messages, tools, credential).await?
            }
            Provider::Google => {
                gemini::send(&self.client, model, system, messages, tools, credential).await?
            }
            Provider::AiPipe => {
                aipipe::send(&self.client, model, system, messages, tools, credential).await?
            }
        };

        ensure_unique_ids(&response.tool_calls)?;

        if let Some(content) = response.content.take() {
            let capped = truncate_with_marker(&content, self.limits.max_content_chars);
            if !capped.is_empty() {
                response.content = Some(capped);
            }
        }

        Ok(response)
    }

    /// Send, degrading every failure to the mock responder. Live failures are
    /// demo mode, not errors; the fallback is logged, never swallowed.
    pub async fn send_or_mock(
        &self,
        provider: Provider,
        model: &str,
        system: &str,
        messages: &[ConversationEntry],
        tools: &[ToolSpec],
        credential: &str,
    ) -> LlmResponse {
        match self
            .send(provider, model, system, messages, tools, credential)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%provider, error = %err, "provider call failed, degrading to demo mode");
                mock::respond(provider, model, messages)
            }
        }
    }
}

/// Blank, whitespace, or placeholder credentials select demo mode.
pub fn is_demo_credential(credential: &str) -> bool {
    let trimmed = credential.trim();
    trimmed.is_empty()
        || matches!(
            trimmed.to_lowercase().as_str(),
            "your_api_key" | "your-api-key" | "your-api-key-here" | "demo" | "none"
        )
}

/// Duplicate tool-call ids within one response are a vendor defect; the loop
/// cannot correlate results against them.
fn ensure_unique_ids(calls: &[ToolCallRequest]) -> Result<(), AgentError> {
    let mut seen = HashSet::new();
    for call in calls {
        if !seen.insert(call.id.as_str()) {
            return Err(AgentError::Upstream(format!(
                "duplicate tool call id in response: {}",
                call.id
            )));
        }
    }
    Ok(())
}

/// Apply a binding's own ceilings: at most `max_messages` trailing entries,
/// each content capped at `max_chars`. Vendor context limits differ, so these
/// sit below the global caps.
pub(crate) fn cap_outbound(
    messages: &[ConversationEntry],
    max_messages: usize,
    max_chars: usize,
) -> Vec<ConversationEntry> {
    let start = messages.len().saturating_sub(max_messages);
    messages[start..]
        .iter()
        .map(|entry| {
            let mut entry = entry.clone();
            entry.content = truncate_with_marker(&entry.content, max_chars);
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ToolName;
    use serde_json::json;

    #[test]
    fn demo_credentials_are_recognized() {
        assert!(is_demo_credential(""));
        assert!(is_demo_credential("   "));
        assert!(is_demo_credential("YOUR_API_KEY"));
        assert!(!is_demo_credential("sk-live-abcdef0123456789"));
    }

    #[test]
    fn provider_tags_round_trip() {
        for provider in [
            Provider::OpenAI,
            Provider::Anthropic,
            Provider::Google,
            Provider::AiPipe,
        ] {
            let parsed: Provider = provider.as_str().parse().unwrap();
            assert_eq!(parsed, provider);
        }
        assert!("cohere".parse::<Provider>().is_err());
    }

    #[test]
    fn duplicate_tool_call_ids_are_a_defect() {
        let call = |id: &str| ToolCallRequest {
            id: id.into(),
            name: ToolName::GoogleSearch,
            arguments: json!({}),
        };
        assert!(ensure_unique_ids(&[call("a"), call("b")]).is_ok());
        assert!(ensure_unique_ids(&[call("a"), call("a")]).is_err());
    }

    #[test]
    fn outbound_capping_windows_and_truncates() {
        let messages: Vec<ConversationEntry> = (0..10)
            .map(|i| ConversationEntry::user(format!("{}{}", "y".repeat(50), i)))
            .collect();
        let capped = cap_outbound(&messages, 4, 20);
        assert_eq!(capped.len(), 4);
        assert!(capped.iter().all(|m| m.content.ends_with("... [truncated]")));
    }

    #[tokio::test]
    async fn blank_credential_returns_mock_not_error() {
        let gateway = Gateway::new(Limits::for_tests());
        let messages = vec![ConversationEntry::user("hello there")];
        let response = gateway
            .send(Provider::OpenAI, "gpt-4o-mini", "", &messages, &[], "")
            .await
            .unwrap();
        assert!(response.content.is_some() || response.has_tool_calls());
    }

    #[tokio::test]
    async fn malformed_credential_degrades_in_send_or_mock() {
        let gateway = Gateway::new(Limits::for_tests());
        let messages = vec![ConversationEntry::user("hello there")];
        let response = gateway
            .send_or_mock(
                Provider::Anthropic,
                "claude-3-5-haiku",
                "",
                &messages,
                &[],
                "not-a-real-key",
            )
            .await;
        assert!(response.content.is_some() || response.has_tool_calls());
    }
}
