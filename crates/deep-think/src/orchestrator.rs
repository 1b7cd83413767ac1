//! Multi-agent planning, fan-out, and synthesis.
//!
//! ```text
//! Phase 1: Plan
//!   one generation call → strategy plan text
//!
//! Phase 2: Agent configs
//!   structured generation → Vec<AgentConfig>
//!   (free-text fallback with fence stripping on failure)
//!
//! Phase 3: Fan-out
//!   JoinSet::spawn(isolated RefinementEngine, config_i) × N
//!
//! Phase 4: Join + synthesis
//!   full barrier → digest → one generation call → synthesis
//!
//! Phase 5: Summary
//!   one generation call → user-facing summary
//! ```
//!
//! Agents are fully isolated: each gets its own engine with asking and
//! planning disabled; only the source accumulator and the progress sinks are
//! shared. A failure inside one agent — an error or a panic — is captured at
//! the join point as that agent's `Failed` result and never aborts siblings
//! or the orchestration.

use std::sync::Arc;

use schemars::schema_for;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client::{GenerationRequest, TextGenerationClient};
use crate::config::{EngineOptions, OrchestratorOptions};
use crate::engine::RefinementEngine;
use crate::error::ThinkError;
use crate::progress::{AgentUpdate, AgentUpdateSink, ProgressEvent, ProgressSink};
use crate::prompts;
use crate::sources::SourceCollector;
use crate::stages::{ModelStageRouter, Stage};
use crate::types::{AgentConfig, AgentConfigList, AgentResult, AgentStatus, UltraThinkResult};

/// Characters of offending text carried in a parse-failure diagnostic.
const PARSE_FAILURE_EXCERPT_CHARS: usize = 200;

/// Builds a strategy plan, fans out one isolated [`RefinementEngine`] per
/// agent configuration, and synthesizes all agent outputs into one answer.
pub struct MultiAgentOrchestrator {
    options: OrchestratorOptions,
    client: Arc<dyn TextGenerationClient>,
    router: ModelStageRouter,
    sources: Arc<SourceCollector>,
    progress: ProgressSink,
    agent_updates: AgentUpdateSink,
}

impl MultiAgentOrchestrator {
    pub fn new(options: OrchestratorOptions, client: Arc<dyn TextGenerationClient>) -> Self {
        let router = options.engine.router();
        Self {
            options,
            client,
            router,
            sources: Arc::new(SourceCollector::new()),
            progress: ProgressSink::null(),
            agent_updates: AgentUpdateSink::null(),
        }
    }

    /// Replace the progress sink (defaults to the null sink).
    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Sink receiving one update per `AgentResult` mutation.
    pub fn with_agent_updates(mut self, agent_updates: AgentUpdateSink) -> Self {
        self.agent_updates = agent_updates;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        self.progress.emit(event);
    }

    // ── Phase 1: Plan ────────────────────────────────────────────────────

    async fn generate_plan(&self) -> Result<String, ThinkError> {
        self.emit(ProgressEvent::Progress {
            message: "Generating thinking plan...".to_string(),
        });

        let problem = &self.options.engine.problem_statement;
        let planning_input = match self.options.engine.user_answers.as_deref() {
            Some(answers) => {
                format!("{problem}\n\n### User Provided Context ###\n{answers}")
            }
            None => problem.clone(),
        };

        let output = self
            .client
            .generate(GenerationRequest::prompt(
                self.router.resolve(Stage::Planning),
                prompts::build_ultra_plan_prompt(&planning_input),
            ))
            .await?;
        Ok(output.text)
    }

    // ── Phase 2: Agent configs ───────────────────────────────────────────

    /// Structured generation of the agent configurations, with one
    /// free-text fallback. A second failure is fatal to the whole run.
    async fn generate_agent_configs(&self, plan: &str) -> Result<Vec<AgentConfig>, ThinkError> {
        self.emit(ProgressEvent::Progress {
            message: "Generating agent configurations...".to_string(),
        });

        let model = self.router.resolve(Stage::AgentConfig);
        let prompt = prompts::build_agent_prompts_prompt(plan);

        let structured = self
            .client
            .generate_structured(model, schema_for!(AgentConfigList), &prompt)
            .await
            .and_then(|value| {
                parse_agent_configs_value(value).map_err(ThinkError::AgentConfigParse)
            });

        match structured {
            Ok(configs) => Ok(configs),
            Err(error) => {
                warn!(%error, "structured agent config generation failed, falling back to text");
                let raw = self
                    .client
                    .generate(GenerationRequest::prompt(model, prompt))
                    .await?
                    .text;
                parse_agent_configs_text(&raw)
            }
        }
    }

    // ── Phase 3: Fan-out ─────────────────────────────────────────────────

    /// Engine options for one isolated agent: asking/planning disabled, the
    /// agent's specific prompt appended as auxiliary context, and the
    /// agent-thinking stage resolution as the nested default model.
    fn agent_engine_options(&self, config: &AgentConfig) -> EngineOptions {
        let mut options = self.options.engine.clone();
        options.enable_ask_questions = false;
        options.enable_interactive_mode = false;
        options.enable_planning = false;
        options.other_prompts.push(config.specific_prompt.clone());
        options.default_model = self.router.resolve(Stage::AgentThinking).to_string();
        options
    }

    /// Run every selected agent concurrently and join them all. Results come
    /// back in config order; a panicked task yields a `Failed` result.
    async fn run_agents(&self, configs: Vec<AgentConfig>) -> Vec<AgentResult> {
        let mut join_set: JoinSet<(usize, AgentResult)> = JoinSet::new();

        for (index, config) in configs.iter().cloned().enumerate() {
            let options = self.agent_engine_options(&config);
            let client = self.client.clone();
            let sources = self.sources.clone();
            let updates = self.agent_updates.clone();
            join_set.spawn(async move {
                let result = run_agent(options, config, client, sources, updates).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<AgentResult>> = vec![None; configs.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    debug!(
                        agent_id = %result.agent_id,
                        status = %result.status,
                        "agent joined"
                    );
                    slots[index] = Some(result);
                }
                Err(join_error) => {
                    // The supervising task itself died; the per-agent slot is
                    // reconstructed below from its config.
                    warn!(error = %join_error, "agent supervisor task aborted");
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let mut result = AgentResult::pending(&configs[index]);
                    result.advance(AgentStatus::Failed);
                    result.error = Some("agent task aborted before reporting a result".to_string());
                    result
                })
            })
            .collect()
    }

    // ── Phase 4/5: Synthesis and summary ─────────────────────────────────

    async fn synthesize(&self, agent_results: &[AgentResult]) -> Result<String, ThinkError> {
        self.emit(ProgressEvent::Progress {
            message: "Synthesizing results...".to_string(),
        });

        let digest = render_agent_digest(agent_results);
        let output = self
            .client
            .generate(GenerationRequest::prompt(
                self.router.resolve(Stage::Synthesis),
                prompts::build_synthesis_prompt(&self.options.engine.problem_statement, &digest),
            ))
            .await?;
        Ok(output.text)
    }

    async fn summarize(&self, synthesis: &str) -> Result<String, ThinkError> {
        self.emit(ProgressEvent::Summarizing {
            message: "Creating final summary for user...".to_string(),
        });

        let output = self
            .client
            .generate(GenerationRequest::prompt(
                self.router.resolve(Stage::Summary),
                prompts::build_final_summary_prompt(
                    &self.options.engine.problem_statement,
                    synthesis,
                ),
            ))
            .await?;
        Ok(output.text)
    }

    // ── Run ──────────────────────────────────────────────────────────────

    /// Execute the full multi-agent pipeline to a terminal result.
    pub async fn run(&self) -> Result<UltraThinkResult, ThinkError> {
        self.options
            .validate()
            .map_err(ThinkError::Configuration)?;

        let problem = self.options.engine.problem_statement.clone();
        self.emit(ProgressEvent::Init {
            problem: problem.clone(),
        });

        let mut questions = None;
        if self.options.engine.enable_ask_questions {
            self.emit(ProgressEvent::Progress {
                message: "Generating clarification questions...".to_string(),
            });
            let output = self
                .client
                .generate(GenerationRequest::prompt(
                    self.router.default_model(),
                    prompts::build_ask_questions_prompt(&problem),
                ))
                .await?;
            let text = output.text;
            self.emit(ProgressEvent::Asking {
                questions: text.clone(),
            });
            questions = Some(text);
        }

        let plan = self.generate_plan().await?;
        let configs = self.generate_agent_configs(&plan).await?;

        // The planning stage decides the population unless a cap is set.
        let selected: Vec<AgentConfig> = match self.options.max_agents {
            Some(cap) => configs.into_iter().take(cap).collect(),
            None => configs,
        };
        let total_agents = selected.len();

        for config in &selected {
            self.agent_updates.emit(
                AgentUpdate::new(&config.agent_id)
                    .with_approach(&config.approach)
                    .with_specific_prompt(&config.specific_prompt),
            );
        }

        info!(total_agents, "fanning out agents");
        self.emit(ProgressEvent::Progress {
            message: format!("Running {total_agents} agents in parallel..."),
        });

        let agent_results = self.run_agents(selected).await;
        let completed_agents = agent_results.iter().filter(|r| r.is_completed()).count();
        info!(total_agents, completed_agents, "all agents joined");

        let synthesis = self.synthesize(&agent_results).await?;
        let summary = self.summarize(&synthesis).await?;

        self.emit(ProgressEvent::Success {
            solution: summary.clone(),
            iterations: 1,
        });

        Ok(UltraThinkResult {
            questions,
            user_answers: self.options.engine.user_answers.clone(),
            plan,
            agent_results,
            final_solution: synthesis.clone(),
            synthesis,
            summary: Some(summary),
            total_agents,
            completed_agents,
            sources: self.sources.snapshot_optional(),
        })
    }
}

// ── Per-agent supervision ────────────────────────────────────────────────────

/// Drive one isolated engine, translating its progress events onto the
/// agent's result and update sink. Errors and panics from the nested run are
/// captured here; they are terminal for this agent only.
async fn run_agent(
    options: EngineOptions,
    config: AgentConfig,
    client: Arc<dyn TextGenerationClient>,
    sources: Arc<SourceCollector>,
    updates: AgentUpdateSink,
) -> AgentResult {
    let mut result = AgentResult::pending(&config);
    result.advance(AgentStatus::Thinking);
    result.progress = 10;
    updates.emit(
        AgentUpdate::new(&config.agent_id)
            .with_status(AgentStatus::Thinking)
            .with_progress(10),
    );

    let (sink, mut events) = ProgressSink::channel();
    let engine = RefinementEngine::new(options, client)
        .with_sources(sources)
        .with_progress(sink);

    // The engine runs on its own task so a panic is contained; the event
    // pump below drains until the engine (and its sink) is dropped.
    let run = tokio::spawn(async move { engine.run().await });

    while let Some(event) = events.recv().await {
        apply_agent_event(&mut result, &event, &updates);
    }

    match run.await {
        Ok(Ok(nested)) => {
            result.solution = Some(nested.final_solution);
            result.verifications = Some(nested.verifications);
            // A failure event from the nested loop (budget exhaustion) has
            // already made this agent terminal; completion is not an upgrade.
            if result.status != AgentStatus::Failed {
                result.advance(AgentStatus::Completed);
                result.progress = 100;
                updates.emit(
                    AgentUpdate::new(&result.agent_id)
                        .with_status(AgentStatus::Completed)
                        .with_progress(100)
                        .with_solution(result.solution.clone().unwrap_or_default())
                        .with_verifications(result.verifications.clone().unwrap_or_default()),
                );
            }
        }
        Ok(Err(error)) => {
            fail_agent(&mut result, error.to_string(), &updates);
        }
        Err(join_error) => {
            fail_agent(
                &mut result,
                format!("agent task panicked: {join_error}"),
                &updates,
            );
        }
    }

    result
}

fn fail_agent(result: &mut AgentResult, error: String, updates: &AgentUpdateSink) {
    warn!(agent_id = %result.agent_id, %error, "agent failed");
    result.advance(AgentStatus::Failed);
    result.error = Some(error.clone());
    updates.emit(
        AgentUpdate::new(&result.agent_id)
            .with_status(AgentStatus::Failed)
            .with_error(error),
    );
}

/// Map a nested engine event onto the owning agent's result fields.
fn apply_agent_event(result: &mut AgentResult, event: &ProgressEvent, updates: &AgentUpdateSink) {
    match event {
        ProgressEvent::Thinking { iteration, .. } => {
            let progress = (20 + iteration * 2).min(80) as u8;
            if result.advance(AgentStatus::Thinking) {
                result.progress = progress;
                updates.emit(
                    AgentUpdate::new(&result.agent_id)
                        .with_status(AgentStatus::Thinking)
                        .with_progress(progress),
                );
            }
        }
        ProgressEvent::Verification { .. } => {
            if result.advance(AgentStatus::Verifying) {
                updates.emit(
                    AgentUpdate::new(&result.agent_id).with_status(AgentStatus::Verifying),
                );
            }
        }
        ProgressEvent::Success { .. } => {
            if result.advance(AgentStatus::Completed) {
                result.progress = 100;
                updates.emit(
                    AgentUpdate::new(&result.agent_id)
                        .with_status(AgentStatus::Completed)
                        .with_progress(100),
                );
            }
        }
        ProgressEvent::Failure { reason } => {
            if result.advance(AgentStatus::Failed) {
                result.error = Some(reason.clone());
                updates.emit(
                    AgentUpdate::new(&result.agent_id)
                        .with_status(AgentStatus::Failed)
                        .with_error(reason.clone()),
                );
            }
        }
        _ => {}
    }
}

// ── Digest rendering ─────────────────────────────────────────────────────────

/// Plain-text digest of all agent results for the synthesis call.
fn render_agent_digest(agent_results: &[AgentResult]) -> String {
    agent_results
        .iter()
        .enumerate()
        .map(|(index, result)| {
            let error_line = match &result.error {
                Some(error) => format!("**Error:** {error}\n"),
                None => String::new(),
            };
            let solution = result
                .solution
                .as_deref()
                .unwrap_or("No solution generated");
            format!(
                "\n### Agent {}: {}\n\n**Status:** {}\n{}\n**Solution:**\n{}\n",
                index + 1,
                result.approach,
                result.status,
                error_line,
                solution,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

// ── Config payload parsing ───────────────────────────────────────────────────

/// Accept either a bare array of configs or a `{"configs": [...]}` object.
fn parse_agent_configs_value(value: serde_json::Value) -> Result<Vec<AgentConfig>, String> {
    let array = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut object) => object
            .remove("configs")
            .ok_or_else(|| "expected an array or an object with a `configs` array".to_string())?,
        other => {
            return Err(format!(
                "expected an array or object, got {}",
                json_kind(&other)
            ))
        }
    };
    serde_json::from_value(array).map_err(|e| format!("agent config shape mismatch: {e}"))
}

/// Free-text fallback: strip markdown fences and parse what remains.
fn parse_agent_configs_text(raw: &str) -> Result<Vec<AgentConfig>, ThinkError> {
    let cleaned = strip_code_fences(raw);

    let value: serde_json::Value = serde_json::from_str(cleaned).map_err(|e| {
        ThinkError::AgentConfigParse(format!(
            "not valid JSON: {e}. Response text: {}...",
            excerpt(cleaned)
        ))
    })?;

    parse_agent_configs_value(value).map_err(|reason| {
        ThinkError::AgentConfigParse(format!(
            "{reason}. Response text: {}...",
            excerpt(cleaned)
        ))
    })
}

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn excerpt(text: &str) -> String {
    text.chars().take(PARSE_FAILURE_EXCERPT_CHARS).collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(approach: &str, status: AgentStatus) -> AgentResult {
        AgentResult {
            agent_id: "agent_01".into(),
            approach: approach.into(),
            specific_prompt: "p".into(),
            status,
            progress: 0,
            solution: None,
            verifications: None,
            error: None,
        }
    }

    #[test]
    fn parse_bare_array() {
        let raw = r#"[{"agentId": "agent_01", "approach": "a", "specificPrompt": "p"}]"#;
        let configs = parse_agent_configs_text(raw).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].agent_id, "agent_01");
    }

    #[test]
    fn parse_fenced_array() {
        let raw = "```json\n[{\"agentId\": \"a1\", \"approach\": \"x\", \"specificPrompt\": \"y\"}]\n```";
        let configs = parse_agent_configs_text(raw).unwrap();
        assert_eq!(configs.len(), 1);
    }

    #[test]
    fn parse_configs_object() {
        let raw = r#"{"configs": [{"agentId": "a1", "approach": "x", "specificPrompt": "y"},
                                   {"agentId": "a2", "approach": "z", "specificPrompt": "w"}]}"#;
        let configs = parse_agent_configs_text(raw).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].agent_id, "a2");
    }

    #[test]
    fn parse_garbage_reports_excerpt() {
        let raw = "I could not produce JSON, sorry about that.";
        let err = parse_agent_configs_text(raw).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("I could not produce JSON"));
    }

    #[test]
    fn parse_wrong_shape_reports_excerpt() {
        let raw = r#"{"plans": ["not configs"]}"#;
        let err = parse_agent_configs_text(raw).unwrap_err();
        assert!(err.to_string().contains("configs"));
    }

    #[test]
    fn strip_fences_handles_plain_and_fenced() {
        assert_eq!(strip_code_fences("[1]"), "[1]");
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
    }

    #[test]
    fn excerpt_truncates_long_text() {
        let long = "x".repeat(500);
        assert_eq!(excerpt(&long).len(), PARSE_FAILURE_EXCERPT_CHARS);
    }

    #[test]
    fn digest_includes_status_error_and_fallback_solution() {
        let mut failed = result_with("bottom-up", AgentStatus::Failed);
        failed.error = Some("timeout".into());
        let mut completed = result_with("top-down", AgentStatus::Completed);
        completed.solution = Some("final text".into());

        let digest = render_agent_digest(&[failed, completed]);
        assert!(digest.contains("### Agent 1: bottom-up"));
        assert!(digest.contains("**Status:** failed"));
        assert!(digest.contains("**Error:** timeout"));
        assert!(digest.contains("No solution generated"));
        assert!(digest.contains("### Agent 2: top-down"));
        assert!(digest.contains("final text"));
    }

    #[test]
    fn thinking_event_progress_is_capped_at_80() {
        let updates = AgentUpdateSink::null();
        let mut result = result_with("a", AgentStatus::Pending);
        apply_agent_event(
            &mut result,
            &ProgressEvent::Thinking {
                iteration: 500,
                phase: "initial-exploration".into(),
            },
            &updates,
        );
        assert_eq!(result.progress, 80);
        assert_eq!(result.status, AgentStatus::Thinking);
    }

    #[test]
    fn failure_event_is_terminal_for_the_agent() {
        let updates = AgentUpdateSink::null();
        let mut result = result_with("a", AgentStatus::Verifying);
        apply_agent_event(
            &mut result,
            &ProgressEvent::Failure {
                reason: "max iterations reached".into(),
            },
            &updates,
        );
        assert_eq!(result.status, AgentStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("max iterations reached"));

        // A late success event does not resurrect the agent.
        apply_agent_event(
            &mut result,
            &ProgressEvent::Success {
                solution: "s".into(),
                iterations: 3,
            },
            &updates,
        );
        assert_eq!(result.status, AgentStatus::Failed);
    }

    #[test]
    fn verification_event_moves_agent_to_verifying() {
        let updates = AgentUpdateSink::null();
        let mut result = result_with("a", AgentStatus::Thinking);
        apply_agent_event(
            &mut result,
            &ProgressEvent::Verification {
                iteration: 0,
                passed: false,
            },
            &updates,
        );
        assert_eq!(result.status, AgentStatus::Verifying);
    }
}
