//! Pipeline stages and stage→model routing.
//!
//! Every generation call in a run belongs to a named stage, and each stage
//! can be routed to a distinct model. Unset stages silently resolve to the
//! run's default model.
//!
//! | Stage          | Used by                                  |
//! |----------------|------------------------------------------|
//! | initial        | first solution draft                     |
//! | improvement    | self-critique pass over the first draft  |
//! | verification   | critique + yes/no confirmation           |
//! | correction     | revision from a bug report               |
//! | summary        | user-facing final summary                |
//! | planning       | multi-agent strategy plan                |
//! | agent_config   | structured agent-configuration payload   |
//! | agent_thinking | default model of nested agent engines    |
//! | synthesis      | fusion of all agent outputs              |

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named phase of the pipeline that can be routed to a distinct model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initial,
    Improvement,
    Verification,
    Correction,
    Summary,
    Planning,
    AgentConfig,
    AgentThinking,
    Synthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initial => "initial",
            Self::Improvement => "improvement",
            Self::Verification => "verification",
            Self::Correction => "correction",
            Self::Summary => "summary",
            Self::Planning => "planning",
            Self::AgentConfig => "agent_config",
            Self::AgentThinking => "agent_thinking",
            Self::Synthesis => "synthesis",
        };
        write!(f, "{name}")
    }
}

/// Per-stage model overrides. Unset entries fall back to the run default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelStageConfig {
    pub initial: Option<String>,
    pub improvement: Option<String>,
    pub verification: Option<String>,
    pub correction: Option<String>,
    pub summary: Option<String>,
    pub planning: Option<String>,
    pub agent_config: Option<String>,
    pub agent_thinking: Option<String>,
    pub synthesis: Option<String>,
}

impl ModelStageConfig {
    fn get(&self, stage: Stage) -> Option<&str> {
        let entry = match stage {
            Stage::Initial => &self.initial,
            Stage::Improvement => &self.improvement,
            Stage::Verification => &self.verification,
            Stage::Correction => &self.correction,
            Stage::Summary => &self.summary,
            Stage::Planning => &self.planning,
            Stage::AgentConfig => &self.agent_config,
            Stage::AgentThinking => &self.agent_thinking,
            Stage::Synthesis => &self.synthesis,
        };
        entry.as_deref()
    }
}

/// Resolves a pipeline stage to the model that should serve it.
#[derive(Debug, Clone)]
pub struct ModelStageRouter {
    default_model: String,
    stages: ModelStageConfig,
}

impl ModelStageRouter {
    pub fn new(default_model: impl Into<String>, stages: ModelStageConfig) -> Self {
        Self {
            default_model: default_model.into(),
            stages,
        }
    }

    /// The run's default model, used for every unconfigured stage.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Model identifier for the given stage.
    pub fn resolve(&self, stage: Stage) -> &str {
        self.stages.get(stage).unwrap_or(&self.default_model)
    }
}
