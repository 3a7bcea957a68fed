//! Error taxonomy for the agent server.
//!
//! The guiding rule: nothing from a vendor call or a tool execution may
//! terminate a turn uncaught. Only `Validation` (and `TurnInFlight`) surface
//! as true failures at the HTTP boundary; `Credential` and `Upstream` degrade
//! to the mock responder, `Sandbox` is returned as a structured failure value.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Malformed or missing required input. Rejected before entering the loop.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A vendor credential failed its shape check. Degrades to demo mode.
    #[error("malformed credential: {0}")]
    Credential(String),

    /// Network, timeout, non-success status, or malformed vendor payload.
    /// Degrades to the mock responder, logged as a warning.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// A sandboxed execution fault. Returned as a structured failure value,
    /// never propagated as an exception to the caller.
    #[error("sandbox failure: {0}")]
    Sandbox(String),

    /// A turn is already in flight for this session; new input is rejected
    /// until the loop returns to its idle state.
    #[error("a turn is already in flight")]
    TurnInFlight,

    /// Unexpected defect. Logged with full detail, surfaced generically.
    #[error("internal error: {0}")]
    Internal(String),
}
