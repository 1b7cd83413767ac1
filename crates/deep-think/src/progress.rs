//! Progress events and the single-writer sinks that carry them.
//!
//! Both engines report state transitions as [`ProgressEvent`] values on a
//! [`ProgressSink`]. Events are transient: the core never retains them past
//! emission, and the surrounding boundary is expected to forward each one
//! immediately (re-encoded as wire events by the host application).
//!
//! A dropped receiver is the external cancellation signal for event
//! consumption: sends to a closed channel are discarded and the run keeps
//! going — aborting in-flight generation calls is the client's concern.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{AgentStatus, Verification};

// ── Events ───────────────────────────────────────────────────────────────────

/// A state transition reported by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A run has started on the given problem.
    Init { problem: String },
    /// Clarifying questions were generated.
    Asking { questions: String },
    /// Interactive mode: the run is paused until answers arrive.
    WaitingForAnswers { questions: String },
    /// A thinking plan was generated.
    Planning { plan: String },
    /// A generation phase is underway.
    Thinking { iteration: u32, phase: String },
    /// A candidate solution was produced.
    Solution { iteration: u32, solution: String },
    /// A verification pass finished.
    Verification { iteration: u32, passed: bool },
    /// A correction call is about to revise the solution.
    Correction { iteration: u32 },
    /// The final summary is being generated.
    Summarizing { message: String },
    /// The run reached its confidence threshold.
    Success { solution: String, iterations: u32 },
    /// The run gave up (error budget) or ran out of iterations.
    Failure { reason: String },
    /// Free-form status message.
    Progress { message: String },
}

// ── Progress sink ────────────────────────────────────────────────────────────

/// Cloneable handle onto the single ordered event stream of a run.
///
/// Backed by an unbounded mpsc channel; the null sink drops everything.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink/receiver pair. The caller drains the receiver; dropping it
    /// silently stops event delivery without affecting the run.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards every event.
    pub fn null() -> Self {
        Self { tx: None }
    }

    /// Emit one event. Never fails: a closed channel discards the event.
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::debug!("progress receiver dropped; event discarded");
            }
        }
    }
}

// ── Agent updates ────────────────────────────────────────────────────────────

/// Partial mutation of one agent's [`crate::types::AgentResult`], published
/// once per mutation during a multi-agent run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approach: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifications: Option<Vec<Verification>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentUpdate {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_approach(mut self, approach: impl Into<String>) -> Self {
        self.approach = Some(approach.into());
        self
    }

    pub fn with_specific_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.specific_prompt = Some(prompt.into());
        self
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = Some(solution.into());
        self
    }

    pub fn with_verifications(mut self, verifications: Vec<Verification>) -> Self {
        self.verifications = Some(verifications);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Sink for [`AgentUpdate`] records, same closed-channel semantics as
/// [`ProgressSink`].
#[derive(Debug, Clone)]
pub struct AgentUpdateSink {
    tx: Option<mpsc::UnboundedSender<AgentUpdate>>,
}

impl AgentUpdateSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn null() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, update: AgentUpdate) {
        if let Some(tx) = &self.tx {
            if tx.send(update).is_err() {
                tracing::debug!("agent update receiver dropped; update discarded");
            }
        }
    }
}
