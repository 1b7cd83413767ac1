//! Run configuration for both engines.
//!
//! Options are plain data with defaults matching the production pipeline
//! (30 iterations, 3 consecutive successful verifications, 10 consecutive
//! errors before giving up) and a `validate()` gate called before the first
//! backend call.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::{SearchContextSize, SearchTool};
use crate::stages::{ModelStageConfig, ModelStageRouter};

/// Iteration budget for the verify/correct loop.
pub const DEFAULT_MAX_ITERATIONS: u32 = 30;
/// Consecutive passes required before the loop exits in success.
pub const DEFAULT_REQUIRED_SUCCESSFUL_VERIFICATIONS: u32 = 3;
/// Consecutive failures tolerated before the loop gives up.
pub const DEFAULT_MAX_ERRORS_BEFORE_GIVE_UP: u32 = 10;
/// Search hits requested from a provider's built-in tool.
pub const DEFAULT_SEARCH_MAX_RESULTS: u32 = 5;

/// Model-name prefixes that advertise a built-in search tool.
const SEARCH_CAPABLE_PREFIXES: [&str; 3] = ["gpt-4o", "gpt-4.1", "gpt-5"];

// ── Web search ───────────────────────────────────────────────────────────────

/// Which search capability to use when web search is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchProviderConfig {
    /// Provider choice; `"model"` means the backend model's own tool.
    pub provider: String,
    pub max_results: u32,
}

impl Default for SearchProviderConfig {
    fn default() -> Self {
        Self {
            provider: "model".to_string(),
            max_results: DEFAULT_SEARCH_MAX_RESULTS,
        }
    }
}

// ── Engine options ───────────────────────────────────────────────────────────

/// Configuration for one single-track run. The orchestrator derives one of
/// these per agent from its own options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// The problem to solve. Immutable input to the run.
    pub problem_statement: String,
    /// Auxiliary prompt fragments appended to the initial thinking context.
    pub other_prompts: Vec<String>,
    /// Free text folded into the system framing as a knowledge base.
    pub knowledge_context: Option<String>,
    pub max_iterations: u32,
    pub required_successful_verifications: u32,
    pub max_errors_before_give_up: u32,
    pub enable_web_search: bool,
    pub search_provider: SearchProviderConfig,
    /// Generate clarifying questions before exploring.
    pub enable_ask_questions: bool,
    /// Pause after the asking stage and return the questions to the caller.
    pub enable_interactive_mode: bool,
    /// Answers collected from a previous interactive pause.
    pub user_answers: Option<String>,
    /// Generate a thinking plan before exploring.
    pub enable_planning: bool,
    /// Model used for every stage without an explicit override.
    pub default_model: String,
    pub model_stages: ModelStageConfig,
}

impl EngineOptions {
    pub fn new(problem_statement: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            problem_statement: problem_statement.into(),
            other_prompts: Vec::new(),
            knowledge_context: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            required_successful_verifications: DEFAULT_REQUIRED_SUCCESSFUL_VERIFICATIONS,
            max_errors_before_give_up: DEFAULT_MAX_ERRORS_BEFORE_GIVE_UP,
            enable_web_search: false,
            search_provider: SearchProviderConfig::default(),
            enable_ask_questions: false,
            enable_interactive_mode: false,
            user_answers: None,
            enable_planning: false,
            default_model: default_model.into(),
            model_stages: ModelStageConfig::default(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_required_successful_verifications(mut self, required: u32) -> Self {
        self.required_successful_verifications = required;
        self
    }

    pub fn with_max_errors_before_give_up(mut self, max_errors: u32) -> Self {
        self.max_errors_before_give_up = max_errors;
        self
    }

    pub fn with_other_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.other_prompts.push(prompt.into());
        self
    }

    pub fn with_knowledge_context(mut self, context: impl Into<String>) -> Self {
        self.knowledge_context = Some(context.into());
        self
    }

    pub fn with_web_search(mut self, search_provider: SearchProviderConfig) -> Self {
        self.enable_web_search = true;
        self.search_provider = search_provider;
        self
    }

    pub fn with_ask_questions(mut self) -> Self {
        self.enable_ask_questions = true;
        self
    }

    pub fn with_interactive_mode(mut self) -> Self {
        self.enable_interactive_mode = true;
        self
    }

    pub fn with_user_answers(mut self, answers: impl Into<String>) -> Self {
        self.user_answers = Some(answers.into());
        self
    }

    pub fn with_planning(mut self) -> Self {
        self.enable_planning = true;
        self
    }

    pub fn with_model_stages(mut self, stages: ModelStageConfig) -> Self {
        self.model_stages = stages;
        self
    }

    /// Validate budgets and required inputs; rejected runs never reach the
    /// backend.
    pub fn validate(&self) -> Result<(), String> {
        if self.problem_statement.trim().is_empty() {
            return Err("problem_statement must not be empty".to_string());
        }
        if self.default_model.trim().is_empty() {
            return Err("default_model must not be empty".to_string());
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be > 0".to_string());
        }
        if self.required_successful_verifications == 0 {
            return Err("required_successful_verifications must be > 0".to_string());
        }
        if self.max_errors_before_give_up == 0 {
            return Err("max_errors_before_give_up must be > 0".to_string());
        }
        Ok(())
    }

    /// Stage router seeded from these options.
    pub fn router(&self) -> ModelStageRouter {
        ModelStageRouter::new(self.default_model.clone(), self.model_stages.clone())
    }

    /// Search-tool declaration for tool-augmented calls, when web search is
    /// on and the default model advertises the capability by name prefix.
    pub fn search_tool(&self) -> Option<SearchTool> {
        if !self.enable_web_search || self.search_provider.provider != "model" {
            return None;
        }
        let capable = SEARCH_CAPABLE_PREFIXES
            .iter()
            .any(|prefix| self.default_model.starts_with(prefix));
        if !capable {
            return None;
        }
        let context_size = if self.search_provider.max_results > DEFAULT_SEARCH_MAX_RESULTS {
            SearchContextSize::High
        } else {
            SearchContextSize::Medium
        };
        Some(SearchTool { context_size })
    }

    /// Provider-specific search options, keyed by model-name substring.
    pub fn provider_options(&self) -> Option<serde_json::Value> {
        if !self.enable_web_search || self.search_provider.provider != "model" {
            return None;
        }
        if !self.default_model.contains("openrouter") {
            return None;
        }
        Some(json!({
            "openrouter": {
                "plugins": [{ "id": "web", "max_results": self.search_provider.max_results }],
            }
        }))
    }
}

// ── Orchestrator options ─────────────────────────────────────────────────────

/// Configuration for a multi-agent run: the base engine options inherited by
/// every agent, plus the optional agent-count cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorOptions {
    pub engine: EngineOptions,
    /// Maximum number of agents to run. When unset, the planning stage
    /// decides the population size.
    pub max_agents: Option<usize>,
}

impl OrchestratorOptions {
    pub fn new(engine: EngineOptions) -> Self {
        Self {
            engine,
            max_agents: None,
        }
    }

    pub fn with_max_agents(mut self, max_agents: usize) -> Self {
        self.max_agents = Some(max_agents);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;
        if self.max_agents == Some(0) {
            return Err("max_agents must be > 0 when set".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> EngineOptions {
        EngineOptions::new("prove the claim", "base-model")
    }

    #[test]
    fn defaults_match_production_budgets() {
        let opts = options();
        assert_eq!(opts.max_iterations, 30);
        assert_eq!(opts.required_successful_verifications, 3);
        assert_eq!(opts.max_errors_before_give_up, 10);
        assert!(!opts.enable_web_search);
        opts.validate().expect("defaults should validate");
    }

    #[test]
    fn zero_budgets_rejected() {
        assert!(options().with_max_iterations(0).validate().is_err());
        assert!(options()
            .with_required_successful_verifications(0)
            .validate()
            .is_err());
        assert!(options()
            .with_max_errors_before_give_up(0)
            .validate()
            .is_err());
    }

    #[test]
    fn empty_problem_rejected() {
        let opts = EngineOptions::new("   ", "base-model");
        assert!(opts.validate().is_err());
    }

    #[test]
    fn search_tool_requires_capable_model_prefix() {
        let opts = EngineOptions::new("p", "gpt-4o-mini")
            .with_web_search(SearchProviderConfig::default());
        assert_eq!(
            opts.search_tool(),
            Some(SearchTool {
                context_size: SearchContextSize::Medium
            })
        );

        let opts = EngineOptions::new("p", "claude-opus")
            .with_web_search(SearchProviderConfig::default());
        assert!(opts.search_tool().is_none());
    }

    #[test]
    fn search_tool_context_size_scales_with_max_results() {
        let opts = EngineOptions::new("p", "gpt-5").with_web_search(SearchProviderConfig {
            provider: "model".into(),
            max_results: 10,
        });
        assert_eq!(
            opts.search_tool(),
            Some(SearchTool {
                context_size: SearchContextSize::High
            })
        );
    }

    #[test]
    fn search_disabled_yields_no_tool() {
        let opts = EngineOptions::new("p", "gpt-4o");
        assert!(opts.search_tool().is_none());
        assert!(opts.provider_options().is_none());
    }

    #[test]
    fn openrouter_models_get_plugin_options() {
        let opts = EngineOptions::new("p", "openrouter/some-model")
            .with_web_search(SearchProviderConfig::default());
        let value = opts.provider_options().expect("plugin options expected");
        assert_eq!(value["openrouter"]["plugins"][0]["id"], "web");
        assert_eq!(value["openrouter"]["plugins"][0]["max_results"], 5);
        // The plugin path does not also declare a search tool.
        assert!(opts.search_tool().is_none());
    }

    #[test]
    fn orchestrator_zero_cap_rejected() {
        let opts = OrchestratorOptions::new(options()).with_max_agents(0);
        assert!(opts.validate().is_err());
        let opts = OrchestratorOptions::new(options()).with_max_agents(3);
        assert!(opts.validate().is_ok());
    }
}
