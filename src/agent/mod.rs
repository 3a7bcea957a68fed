//! Agent module - the orchestration loop.
//!
//! The agent follows a "tools in a loop" pattern per user turn:
//! 1. Append the user message to the bounded conversation
//! 2. Call the provider gateway (or the mock responder) with the tool specs
//! 3. If the response requests tools, execute the whole batch in parallel
//!    and feed the results back
//! 4. Repeat with no new user input until no tools are requested
//!
//! One turn runs at a time; new input while a turn is in flight is rejected.

mod agent_loop;
mod prompt;

pub use agent_loop::{AgentSession, TurnEvent, TurnOutcome};
pub use prompt::build_system_prompt;
