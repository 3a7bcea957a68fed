//! Core agent loop implementation.
//!
//! State machine per turn:
//! `AwaitingUserInput → Thinking → (ExecutingTools → Thinking)* → AwaitingUserInput`.
//! The session always returns to the idle state, even when a turn fails.

use std::sync::Arc;

use serde::Serialize;

use crate::agent::prompt::build_system_prompt;
use crate::config::Limits;
use crate::conversation::{truncate_with_marker, ConversationEntry, ToolName};
use crate::error::AgentError;
use crate::llm::{Gateway, Provider};
use crate::memory::MemoryManager;
use crate::tools::{ToolContext, ToolRegistry};

/// Agent-visible happenings within one turn, in order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// The model produced visible content. Surfaced immediately, independent
    /// of whether tool calls follow.
    Assistant { content: String },
    /// A tool call was issued.
    ToolCall { id: String, name: ToolName },
    /// A tool call completed.
    ToolResult { id: String, ok: bool },
    /// The turn was aborted.
    Error { message: String },
}

/// Everything one turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub events: Vec<TurnEvent>,
    /// The final assistant message, when the turn ended normally.
    pub reply: Option<String>,
}

/// One user's conversation loop. Owns the single-in-flight-turn invariant;
/// the memory manager it is constructed with owns all bounded state.
pub struct AgentSession {
    memory: Arc<MemoryManager>,
    gateway: Arc<Gateway>,
    tools: Arc<ToolRegistry>,
    limits: Limits,
    turn_lock: tokio::sync::Mutex<()>,
}

impl AgentSession {
    pub fn new(
        memory: Arc<MemoryManager>,
        gateway: Arc<Gateway>,
        tools: Arc<ToolRegistry>,
        limits: Limits,
    ) -> Self {
        Self {
            memory,
            gateway,
            tools,
            limits,
            turn_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one full turn: accept user input, loop between thinking and tool
    /// execution until the model stops requesting tools, return the events.
    ///
    /// Rejects with `TurnInFlight` while another turn is mid-flight — this is
    /// the backpressure mechanism, not an internal failure.
    pub async fn handle_message(
        &self,
        input: &str,
        provider: Provider,
        model: &str,
        credential: &str,
        tool_ctx: &ToolContext,
    ) -> Result<TurnOutcome, AgentError> {
        let _turn = self
            .turn_lock
            .try_lock()
            .map_err(|_| AgentError::TurnInFlight)?;

        let input = input.trim();
        if input.is_empty() {
            return Err(AgentError::Validation("empty message".to_string()));
        }
        let input = truncate_with_marker(input, self.limits.max_input_chars);

        self.memory.append(ConversationEntry::user(input)).await;

        let specs = self.tools.specs();
        let system = build_system_prompt(&specs);
        let mut events = Vec::new();
        let mut reply = None;

        for iteration in 0..self.limits.max_loop_iterations {
            tracing::debug!(iteration = iteration + 1, %provider, "agent thinking");

            // The loop works from its own cloned slice; a concurrent sweep
            // can trim the log without disturbing this call.
            let slice = self.memory.outbound_slice().await;
            let response = self
                .gateway
                .send_or_mock(provider, model, &system, &slice, &specs, credential)
                .await;

            if let Some(content) = response.content.as_deref().filter(|c| !c.is_empty()) {
                events.push(TurnEvent::Assistant {
                    content: content.to_string(),
                });
            }

            if !response.has_tool_calls() {
                reply = response.content.clone();
                self.memory
                    .append(ConversationEntry::assistant(
                        response.content.unwrap_or_default(),
                        None,
                    ))
                    .await;
                return Ok(TurnOutcome { events, reply });
            }

            // The assistant entry must be durably appended before any of its
            // tool calls may begin.
            let calls = response.tool_calls.clone();
            self.memory
                .append(ConversationEntry::assistant(
                    response.content.unwrap_or_default(),
                    Some(calls.clone()),
                ))
                .await;
            for call in &calls {
                events.push(TurnEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name,
                });
            }

            // Fan out, join, then append results in call order.
            let outcomes = self.tools.execute_batch(&calls, tool_ctx).await;
            for outcome in outcomes {
                events.push(TurnEvent::ToolResult {
                    id: outcome.tool_call_id.clone(),
                    ok: outcome.ok,
                });
                self.memory
                    .append(ConversationEntry::tool(
                        outcome.tool_call_id,
                        outcome.content,
                    ))
                    .await;
            }
        }

        tracing::warn!(
            limit = self.limits.max_loop_iterations,
            "turn hit the iteration limit"
        );
        events.push(TurnEvent::Error {
            message: format!(
                "stopped after {} think/execute cycles without a final answer",
                self.limits.max_loop_iterations
            ),
        });
        Ok(TurnOutcome { events, reply })
    }

    /// Full retained conversation, for local display.
    pub async fn conversation(&self) -> Vec<ConversationEntry> {
        self.memory.snapshot().await
    }

    pub async fn conversation_len(&self) -> usize {
        self.memory.conversation_len().await
    }

    /// Discard the conversation wholesale.
    pub async fn clear(&self) {
        self.memory.clear_conversation().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::tools::{AiPipeTool, ExecuteJsTool, SearchTool};

    fn session() -> AgentSession {
        let limits = Limits::for_tests();
        let memory = Arc::new(MemoryManager::new(limits.clone()));
        let tools = Arc::new(ToolRegistry::new(
            Arc::new(SearchTool::new(Arc::clone(&memory))),
            Arc::new(AiPipeTool::new()),
            Arc::new(ExecuteJsTool::new(limits.sandbox_timeout)),
            limits.tool_timeout,
        ));
        let gateway = Arc::new(Gateway::new(limits.clone()));
        AgentSession::new(memory, gateway, tools, limits)
    }

    async fn demo_turn(session: &AgentSession, input: &str) -> TurnOutcome {
        session
            .handle_message(input, Provider::OpenAI, "gpt-4o-mini", "", &ToolContext::default())
            .await
            .expect("turn should complete")
    }

    #[tokio::test]
    async fn plain_message_completes_without_tools() {
        let session = session();
        let outcome = demo_turn(&session, "hello there").await;
        assert!(outcome.reply.is_some());
        assert!(outcome
            .events
            .iter()
            .all(|e| matches!(e, TurnEvent::Assistant { .. })));

        let log = session.conversation().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].role, Role::User);
        assert_eq!(log[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn search_turn_runs_tools_and_terminates() {
        let session = session();
        let outcome = demo_turn(&session, "search for rust async runtimes").await;

        assert!(outcome.reply.is_some(), "turn must reach a final answer");
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, TurnEvent::ToolCall { .. })));
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, TurnEvent::ToolResult { ok: true, .. })));

        // Conversation order: user, assistant(with calls), tool result(s),
        // final assistant.
        let log = session.conversation().await;
        assert_eq!(log[0].role, Role::User);
        assert_eq!(log[1].role, Role::Assistant);
        assert!(log[1].tool_calls.is_some());
        assert_eq!(log[2].role, Role::Tool);
        assert_eq!(log.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn tool_results_match_issued_calls_exactly() {
        let session = session();
        demo_turn(&session, "search for ibm").await;

        let log = session.conversation().await;
        let issued: Vec<String> = log
            .iter()
            .flat_map(|e| e.tool_calls.iter().flatten())
            .map(|c| c.id.clone())
            .collect();
        let answered: Vec<String> = log
            .iter()
            .filter(|e| e.role == Role::Tool)
            .filter_map(|e| e.tool_call_id.clone())
            .collect();

        assert_eq!(issued.len(), answered.len());
        assert_eq!(issued, answered);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_the_loop() {
        let session = session();
        let err = session
            .handle_message("   ", Provider::OpenAI, "gpt-4o-mini", "", &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
        assert_eq!(session.conversation_len().await, 0);
    }

    #[tokio::test]
    async fn second_turn_is_rejected_while_one_is_in_flight() {
        let session = session();
        let _held = session.turn_lock.lock().await;
        let err = session
            .handle_message("hello", Provider::OpenAI, "gpt-4o-mini", "", &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::TurnInFlight));
    }

    #[tokio::test]
    async fn conversation_stays_bounded_across_many_turns() {
        let limits = Limits {
            max_conversation_len: 8,
            ..Limits::for_tests()
        };
        let memory = Arc::new(MemoryManager::new(limits.clone()));
        let tools = Arc::new(ToolRegistry::new(
            Arc::new(SearchTool::new(Arc::clone(&memory))),
            Arc::new(AiPipeTool::new()),
            Arc::new(ExecuteJsTool::new(limits.sandbox_timeout)),
            limits.tool_timeout,
        ));
        let gateway = Arc::new(Gateway::new(limits.clone()));
        let session = AgentSession::new(memory, gateway, tools, limits);

        demo_turn(&session, "anchor message").await;
        for i in 0..10 {
            demo_turn(&session, &format!("message number {}", i)).await;
        }

        let log = session.conversation().await;
        assert!(log.len() <= 8);
        assert_eq!(log[0].content, "anchor message");
    }

    #[tokio::test]
    async fn oversized_input_is_truncated_with_marker() {
        let session = session();
        let big = "a".repeat(5000);
        demo_turn(&session, &big).await;
        let log = session.conversation().await;
        assert!(log[0].content.ends_with("... [truncated]"));
        assert!(log[0].content.chars().count() < 2200);
    }

    #[tokio::test]
    async fn clear_discards_the_conversation() {
        let session = session();
        demo_turn(&session, "hello").await;
        session.clear().await;
        assert_eq!(session.conversation_len().await, 0);
    }
}
