//! API request and response types.
//!
//! Request fields are all optional at the serde layer so that missing fields
//! surface as documented 400 responses from the handlers, not as framework
//! rejections. Credentials ride on every request; an absent credential means
//! demo mode, never an error.

use serde::{Deserialize, Serialize};

use crate::agent::TurnEvent;
use crate::conversation::ConversationEntry;
use crate::tools::execute::SandboxOutcome;
use crate::tools::ToolSpec;

/// Request to `POST /api/llm`.
#[derive(Debug, Deserialize)]
pub struct LlmRequest {
    /// Provider tag: `openai`, `anthropic`, `google`, or `aipipe`.
    pub provider: Option<String>,

    /// Model identifier in the provider's own naming.
    pub model: Option<String>,

    /// The conversation slice to send. Required, non-empty.
    pub messages: Option<Vec<ConversationEntry>>,

    /// Tool specs to offer; defaults to the registered tool set.
    pub tools: Option<Vec<ToolSpec>>,

    /// LLM credential. Blank selects demo mode.
    pub api_key: Option<String>,
}

/// Request to `POST /api/search`.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub num_results: Option<u32>,
    pub api_key: Option<String>,
    pub cx: Option<String>,
}

/// Request to `POST /api/ai-pipe`.
#[derive(Debug, Deserialize)]
pub struct AiPipeRequest {
    pub workflow: Option<String>,
    pub data: Option<String>,
}

/// Request to `POST /api/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub code: Option<String>,
}

/// Response from `POST /api/execute`. Failure is reported inside the body;
/// this endpoint never returns a non-2xx status.
#[derive(Debug, Serialize)]
pub struct ExecuteReply {
    #[serde(flatten)]
    pub outcome: SandboxOutcome,
    pub timestamp: String,
}

/// Request to `POST /api/agent`: one full agent turn.
#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    pub message: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub google_cx: Option<String>,
}

/// Response from `POST /api/agent`.
#[derive(Debug, Serialize)]
pub struct AgentReply {
    pub events: Vec<TurnEvent>,
    pub reply: Option<String>,
    pub conversation_len: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthReply {
    pub status: &'static str,
    pub timestamp: String,
    #[serde(rename = "cacheSize")]
    pub cache_size: usize,
    /// Seconds since the server started.
    pub uptime: u64,
}

/// Uniform error body for 4xx responses.
#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub error: String,
}
