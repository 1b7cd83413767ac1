//! Domain types shared by the refinement engine and the orchestrator.
//!
//! | Type               | Produced by            | Consumed by                  |
//! |--------------------|------------------------|------------------------------|
//! | `Verification`     | verification stage     | loop bookkeeping, results    |
//! | `IterationRecord`  | each loop pass         | `DeepThinkResult`            |
//! | `AgentConfig`      | planning stage         | agent fan-out                |
//! | `AgentResult`      | per-agent task         | synthesis, `UltraThinkResult`|
//! | `DeepThinkResult`  | `RefinementEngine`     | caller                       |
//! | `UltraThinkResult` | `MultiAgentOrchestrator` | caller                     |

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::sources::Source;

// ── Verification ─────────────────────────────────────────────────────────────

/// Outcome of one verification pass over a candidate solution.
///
/// `passed` is derived from the confirmation answer's text, not from a
/// structured boolean: it is true iff the answer contains the
/// case-insensitive substring `"yes"`. That parsing rule is part of the
/// contract and lives in [`Verification::confirms`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub timestamp: DateTime<Utc>,
    pub passed: bool,
    /// Critique prefix describing what is wrong; empty when `passed`.
    pub bug_report: String,
    /// Raw text of the yes/no confirmation answer.
    pub good_verify: String,
}

impl Verification {
    /// Build a verification from the critique pieces, deriving `passed`
    /// from the confirmation text and stamping the current time.
    pub fn new(bug_report: impl Into<String>, good_verify: impl Into<String>) -> Self {
        let good_verify = good_verify.into();
        Self {
            timestamp: Utc::now(),
            passed: Self::confirms(&good_verify),
            bug_report: bug_report.into(),
            good_verify,
        }
    }

    /// The confirmation parsing rule: does the answer affirm correctness?
    pub fn confirms(answer: &str) -> bool {
        answer.to_lowercase().contains("yes")
    }
}

// ── Iterations ───────────────────────────────────────────────────────────────

/// How a loop pass ended for its candidate solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    /// Verification passed; the solution stands unchanged.
    Completed,
    /// Verification failed; a correction follows.
    Correcting,
}

/// Append-only log entry for one pass of the verify/correct loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Zero-based pass index, matching append order.
    pub index: u32,
    /// The candidate solution this pass verified.
    pub solution: String,
    pub verification: Verification,
    pub status: IterationStatus,
}

// ── Agent configuration ──────────────────────────────────────────────────────

/// One strategic approach produced by the planning stage. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub agent_id: String,
    pub approach: String,
    pub specific_prompt: String,
}

/// Declared shape for structured agent-config generation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentConfigList {
    pub configs: Vec<AgentConfig>,
}

// ── Agent results ────────────────────────────────────────────────────────────

/// Lifecycle of one agent within a multi-agent run.
///
/// Status only moves forward, except that `Failed` may be reached from any
/// non-terminal state; both `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Thinking,
    Verifying,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Thinking => 1,
            Self::Verifying => 2,
            Self::Completed => 3,
            Self::Failed => 4,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Thinking => "thinking",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Mutable record of one agent's progress and final output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub approach: String,
    pub specific_prompt: String,
    pub status: AgentStatus,
    /// Linear progress estimate, 0–100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifications: Option<Vec<Verification>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    /// Fresh result for a not-yet-started agent.
    pub fn pending(config: &AgentConfig) -> Self {
        Self {
            agent_id: config.agent_id.clone(),
            approach: config.approach.clone(),
            specific_prompt: config.specific_prompt.clone(),
            status: AgentStatus::Pending,
            progress: 0,
            solution: None,
            verifications: None,
            error: None,
        }
    }

    /// Move the status forward. Returns `false` (and leaves the status
    /// untouched) when the transition would go backward or leave a
    /// terminal state.
    pub fn advance(&mut self, next: AgentStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if next == AgentStatus::Failed || next.rank() >= self.status.rank() {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AgentStatus::Completed
    }
}

// ── Terminal results ─────────────────────────────────────────────────────────

/// Terminal snapshot of a single-track run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepThinkResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_answers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// The improved first candidate from initial exploration.
    pub initial_thought: String,
    pub iterations: Vec<IterationRecord>,
    pub verifications: Vec<Verification>,
    pub final_solution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub total_iterations: u32,
    pub successful_verifications: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

/// Terminal snapshot of a multi-agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UltraThinkResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_answers: Option<String>,
    pub plan: String,
    pub agent_results: Vec<AgentResult>,
    pub synthesis: String,
    pub final_solution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub total_agents: usize,
    pub completed_agents: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str) -> AgentConfig {
        AgentConfig {
            agent_id: id.into(),
            approach: "first principles".into(),
            specific_prompt: "start from the axioms".into(),
        }
    }

    #[test]
    fn confirmation_rule_is_case_insensitive_substring() {
        assert!(Verification::confirms("Yes, the solution is correct."));
        assert!(Verification::confirms("YES"));
        assert!(Verification::confirms("the answer is yes."));
        assert!(!Verification::confirms("no, there is a critical error"));
        assert!(!Verification::confirms(""));
    }

    #[test]
    fn verification_derives_passed_from_text() {
        let passing = Verification::new("", "yes");
        assert!(passing.passed);
        let failing = Verification::new("off-by-one in step 2", "no");
        assert!(!failing.passed);
        assert_eq!(failing.bug_report, "off-by-one in step 2");
    }

    #[test]
    fn agent_status_moves_forward_only() {
        let mut result = AgentResult::pending(&config("agent_01"));
        assert!(result.advance(AgentStatus::Thinking));
        assert!(result.advance(AgentStatus::Verifying));
        // Backward transition is refused.
        assert!(!result.advance(AgentStatus::Thinking));
        assert_eq!(result.status, AgentStatus::Verifying);
        assert!(result.advance(AgentStatus::Completed));
        // Terminal states are sticky.
        assert!(!result.advance(AgentStatus::Failed));
        assert_eq!(result.status, AgentStatus::Completed);
    }

    #[test]
    fn failed_reachable_from_any_non_terminal_state() {
        for status in [AgentStatus::Pending, AgentStatus::Thinking, AgentStatus::Verifying] {
            let mut result = AgentResult::pending(&config("agent_01"));
            result.status = status;
            assert!(result.advance(AgentStatus::Failed));
            assert!(result.status.is_terminal());
        }
    }

    #[test]
    fn failed_is_terminal() {
        let mut result = AgentResult::pending(&config("agent_01"));
        assert!(result.advance(AgentStatus::Failed));
        assert!(!result.advance(AgentStatus::Completed));
        assert_eq!(result.status, AgentStatus::Failed);
    }

    #[test]
    fn agent_config_uses_camel_case_wire_names() {
        let json = r#"{"agentId": "agent_01", "approach": "a", "specificPrompt": "p"}"#;
        let parsed: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.agent_id, "agent_01");
        assert_eq!(parsed.specific_prompt, "p");
    }

    #[test]
    fn agent_config_schema_names_required_fields() {
        let schema = schemars::schema_for!(AgentConfigList);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("configs"));
        assert!(json.contains("agentId"));
        assert!(json.contains("specificPrompt"));
    }

    #[test]
    fn iteration_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&IterationStatus::Correcting).unwrap(),
            r#""correcting""#
        );
    }
}
