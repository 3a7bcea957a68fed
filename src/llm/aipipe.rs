//! AI Pipe binding.
//!
//! AI Pipe fronts an OpenAI-compatible completions API, so the wire format is
//! the `openai` module's; only the base URL and the credential check differ
//! (AI Pipe tokens are JWTs, not `sk-` keys).

use reqwest::Client;

use super::{openai, LlmResponse};
use crate::conversation::ConversationEntry;
use crate::error::AgentError;
use crate::tools::ToolSpec;

const BASE_URL: &str = "https://aipipe.org/openrouter/v1";

pub(crate) fn validate_credential(credential: &str) -> Result<(), AgentError> {
    let trimmed = credential.trim();
    if trimmed.len() >= 20 && trimmed.contains('.') && !trimmed.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(AgentError::Credential(
            "AI Pipe tokens are dot-separated JWTs of at least 20 characters".to_string(),
        ))
    }
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
    openai::send(client, BASE_URL, model, system, messages, tools, credential).await
}
