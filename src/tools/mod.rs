//! Tool implementations and the batch executor.
//!
//! Three tools are registered: web search, the data-workflow proxy, and
//! sandboxed JavaScript execution. The registry dispatches a whole assistant
//! turn's tool calls concurrently and joins on all of them, returning results
//! in call order regardless of completion order.

pub mod ai_pipe;
pub mod execute;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::conversation::{ToolCallRequest, ToolName};

pub use ai_pipe::AiPipeTool;
pub use execute::ExecuteJsTool;
pub use search::SearchTool;

/// Per-request context passed to every tool execution. Credentials ride on
/// each request; the server holds no persisted secret state.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Google Custom Search API key, if the caller supplied one.
    pub search_key: Option<String>,
    /// Google Custom Search engine id.
    pub search_cx: Option<String>,
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments, in the shape LLM function
    /// calling expects.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value>;
}

/// Declarative tool description handed to providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Uniform result envelope. `content` is serialized JSON; `tool_call_id` is
/// how the agent loop correlates out-of-order completions back into
/// conversation order.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub content: String,
    pub ok: bool,
}

/// The fixed set of registered tools.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    tool_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(
        search: Arc<SearchTool>,
        ai_pipe: Arc<AiPipeTool>,
        execute: Arc<ExecuteJsTool>,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            tools: vec![search, ai_pipe, execute],
            tool_timeout,
        }
    }

    fn get(&self, name: ToolName) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Declarative specs for every registered tool.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().as_str().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Execute one tool call, normalizing every failure path into the result
    /// envelope. Never returns an error to the caller.
    pub async fn execute(&self, call: &ToolCallRequest, ctx: &ToolContext) -> ToolOutcome {
        let tool = match self.get(call.name) {
            Some(tool) => tool,
            None => {
                return ToolOutcome {
                    tool_call_id: call.id.clone(),
                    content: json!({ "error": format!("unknown tool: {}", call.name) })
                        .to_string(),
                    ok: false,
                }
            }
        };

        tracing::debug!(tool = %call.name, id = %call.id, "executing tool call");

        let timeout = if call.name == ToolName::ExecuteJavascript {
            // The sandbox enforces its own wall-clock bound; give it headroom
            // so the outer timeout never races the structured timeout result.
            self.tool_timeout + Duration::from_secs(2)
        } else {
            self.tool_timeout
        };

        let result = tokio::time::timeout(timeout, tool.execute(call.arguments.clone(), ctx)).await;

        match result {
            Ok(Ok(value)) => ToolOutcome {
                tool_call_id: call.id.clone(),
                content: value.to_string(),
                ok: true,
            },
            Ok(Err(err)) => {
                tracing::warn!(tool = %call.name, error = %err, "tool execution failed");
                ToolOutcome {
                    tool_call_id: call.id.clone(),
                    content: json!({ "error": err.to_string() }).to_string(),
                    ok: false,
                }
            }
            Err(_) => {
                tracing::warn!(tool = %call.name, "tool execution timed out");
                ToolOutcome {
                    tool_call_id: call.id.clone(),
                    content: json!({
                        "error": format!("tool timed out after {:?}", timeout)
                    })
                    .to_string(),
                    ok: false,
                }
            }
        }
    }

    /// Fan out one assistant turn's tool calls concurrently and join on all
    /// of them. The returned outcomes are in call order.
    pub async fn execute_batch(
        &self,
        calls: &[ToolCallRequest],
        ctx: &ToolContext,
    ) -> Vec<ToolOutcome> {
        let futures = calls.iter().map(|call| self.execute(call, ctx));
        futures::future::join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::memory::MemoryManager;

    fn registry() -> ToolRegistry {
        let limits = Limits::for_tests();
        let memory = Arc::new(MemoryManager::new(limits.clone()));
        ToolRegistry::new(
            Arc::new(SearchTool::new(Arc::clone(&memory))),
            Arc::new(AiPipeTool::new()),
            Arc::new(ExecuteJsTool::new(limits.sandbox_timeout)),
            limits.tool_timeout,
        )
    }

    #[test]
    fn specs_cover_all_three_tools() {
        let specs = registry().specs();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["google_search", "ai_pipe", "execute_javascript"]);
        for spec in &specs {
            assert!(!spec.description.is_empty());
            assert_eq!(spec.parameters["type"], "object");
        }
    }

    #[tokio::test]
    async fn outcome_carries_originating_call_id() {
        let registry = registry();
        let call = ToolCallRequest {
            id: "call_1".into(),
            name: ToolName::ExecuteJavascript,
            arguments: json!({ "code": "return 40 + 2;" }),
        };
        let outcome = registry.execute(&call, &ToolContext::default()).await;
        assert_eq!(outcome.tool_call_id, "call_1");
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn batch_of_k_calls_yields_k_outcomes_in_call_order() {
        let registry = registry();
        let calls = vec![
            ToolCallRequest {
                id: "call_a".into(),
                name: ToolName::ExecuteJavascript,
                arguments: json!({ "code": "return 1;" }),
            },
            ToolCallRequest {
                id: "call_b".into(),
                name: ToolName::GoogleSearch,
                arguments: json!({ "query": "rust language", "num_results": 2 }),
            },
            ToolCallRequest {
                id: "call_c".into(),
                name: ToolName::AiPipe,
                arguments: json!({ "workflow": "summarize", "data": "hello" }),
            },
        ];

        let outcomes = registry
            .execute_batch(&calls, &ToolContext::default())
            .await;

        assert_eq!(outcomes.len(), 3);
        let ids: Vec<&str> = outcomes.iter().map(|o| o.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["call_a", "call_b", "call_c"]);
    }

    #[tokio::test]
    async fn unknown_arguments_produce_error_envelope_not_panic() {
        let registry = registry();
        let call = ToolCallRequest {
            id: "call_x".into(),
            name: ToolName::GoogleSearch,
            arguments: json!({}),
        };
        let outcome = registry.execute(&call, &ToolContext::default()).await;
        assert_eq!(outcome.tool_call_id, "call_x");
        assert!(!outcome.ok);
        let parsed: Value = serde_json::from_str(&outcome.content).unwrap();
        assert!(parsed["error"].as_str().is_some());
    }
}
