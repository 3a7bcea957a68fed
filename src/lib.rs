//! Agent relay: a small HTTP server that runs an LLM "tools in a loop" agent.
//!
//! One conversation, four interchangeable providers (OpenAI, Anthropic,
//! Google, AIPipe), three tools (web search, a data-workflow proxy, and
//! sandboxed JavaScript). Every external dependency has a deterministic
//! degraded mode, so the whole system works end to end with zero credentials.

pub mod agent;
pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod memory;
pub mod tools;

pub use config::Config;
