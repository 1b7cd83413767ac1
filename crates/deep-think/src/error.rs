//! Unified error taxonomy for refinement and orchestration runs.
//!
//! Only two classes of failure ever surface as `Err` from a run: a failing
//! call to the text-generation backend, and an unrecoverable decode of the
//! agent-configuration payload. Budget exhaustion and verification failure
//! are normal terminal outcomes, reported through progress events and the
//! returned result — never through this type.
//!
//! Inside the multi-agent fan-out, any `ThinkError` raised by a nested engine
//! is caught at the agent boundary and downgraded to `AgentResult::error`; it
//! is fatal only to that agent.

use thiserror::Error;

/// Unified error type for engine and orchestrator operations.
#[derive(Debug, Error)]
pub enum ThinkError {
    /// A call to the text-generation backend failed (network, timeout,
    /// provider rejection). Not retried at this layer.
    #[error("Text generation failed: {0}")]
    Backend(String),

    /// The agent-configuration payload could not be recovered, even after
    /// the free-text fallback. Fatal to the whole multi-agent run.
    #[error("Agent configuration parse failure: {0}")]
    AgentConfigParse(String),

    /// Run options are invalid; rejected before any backend call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Escape hatch for client implementations.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ThinkError {
    /// Build a `Backend` variant from any displayable cause.
    pub fn backend(cause: impl std::fmt::Display) -> Self {
        Self::Backend(cause.to_string())
    }
}
