//! Multi-agent orchestration integration tests.
//!
//! Agent calls interleave concurrently, so a replay queue cannot script a
//! run. The keyed client instead recognizes each pipeline stage by the shape
//! of its request (system framing, message history, template fragments) and
//! answers accordingly; failure and panic injection are keyed on marker
//! strings planted in agent-specific prompts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use deep_think::{
    prompts, AgentStatus, AgentUpdateSink, EngineOptions, GenerationOutput, GenerationRequest,
    ModelStageConfig, MultiAgentOrchestrator, OrchestratorOptions, ProgressEvent, ProgressSink,
    PromptInput, TextGenerationClient, ThinkError,
};

// ── Keyed backend ────────────────────────────────────────────────────────────

/// Routes responses by recognizing the stage each request belongs to.
struct KeyedClient {
    /// Response for `generate_structured`; `None` simulates a backend with
    /// no structured support.
    structured: Option<Result<serde_json::Value, String>>,
    /// Text returned for the agent-config prompt on the fallback path.
    fallback_config_text: String,
    /// Answer to every yes/no confirmation question.
    confirm_answer: String,
    /// Fail any free-text call whose input contains this marker.
    fail_marker: Option<String>,
    /// Panic on any free-text call whose input contains this marker.
    panic_marker: Option<String>,
    structured_calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl KeyedClient {
    fn new(structured: Option<Result<serde_json::Value, String>>) -> Arc<Self> {
        Self::builder(structured).build()
    }

    fn builder(structured: Option<Result<serde_json::Value, String>>) -> KeyedClientBuilder {
        KeyedClientBuilder {
            client: Self {
                structured,
                fallback_config_text: "[]".to_string(),
                confirm_answer: "yes".to_string(),
                fail_marker: None,
                panic_marker: None,
                structured_calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            },
        }
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, request: &GenerationRequest) -> String {
        let text = request.input_text();

        if request.system.as_deref() == Some(prompts::VERIFICATION_SYSTEM_PROMPT) {
            return "critique".into();
        }
        if text.starts_with(prompts::CONFIRM_VERIFICATION_PROMPT) {
            return self.confirm_answer.clone();
        }
        if text.starts_with(prompts::FINAL_SUMMARY_PROMPT) {
            return "the summary".into();
        }
        if text.contains("Design a multi-perspective analysis plan") {
            return "the plan".into();
        }
        if text.contains("Create specific instructions for each agent") {
            return self.fallback_config_text.clone();
        }
        if text.contains("Synthesize these results into a unified") {
            return "the synthesis".into();
        }
        if text.contains("Generate 1-7 focused follow-up questions") {
            return "1. What matters most?".into();
        }
        if let PromptInput::Messages(messages) = &request.input {
            if let Some(last) = messages.last() {
                if last.content == prompts::SELF_IMPROVEMENT_PROMPT {
                    return "improved".into();
                }
                if last.content.starts_with(prompts::CORRECTION_PROMPT) {
                    return "corrected".into();
                }
            }
        }
        "draft".into()
    }
}

struct KeyedClientBuilder {
    client: KeyedClient,
}

impl KeyedClientBuilder {
    fn confirm_answer(mut self, answer: &str) -> Self {
        self.client.confirm_answer = answer.to_string();
        self
    }

    fn fallback_config_text(mut self, text: &str) -> Self {
        self.client.fallback_config_text = text.to_string();
        self
    }

    fn fail_on(mut self, marker: &str) -> Self {
        self.client.fail_marker = Some(marker.to_string());
        self
    }

    fn panic_on(mut self, marker: &str) -> Self {
        self.client.panic_marker = Some(marker.to_string());
        self
    }

    fn build(self) -> Arc<KeyedClient> {
        Arc::new(self.client)
    }
}

#[async_trait]
impl TextGenerationClient for KeyedClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, ThinkError> {
        self.requests.lock().unwrap().push(request.clone());
        let text = request.input_text();
        if let Some(marker) = &self.panic_marker {
            if text.contains(marker.as_str()) {
                panic!("injected panic for {marker}");
            }
        }
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(ThinkError::Backend("injected failure".into()));
            }
        }
        Ok(GenerationOutput::new(self.respond(&request)))
    }

    async fn generate_structured(
        &self,
        _model: &str,
        _schema: schemars::schema::RootSchema,
        _prompt: &str,
    ) -> Result<serde_json::Value, ThinkError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        match &self.structured {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(ThinkError::Backend(message.clone())),
            None => Err(ThinkError::Backend(
                "structured generation unsupported".into(),
            )),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn configs_json(count: usize) -> serde_json::Value {
    let configs: Vec<serde_json::Value> = (1..=count)
        .map(|i| {
            json!({
                "agentId": format!("agent_{i:02}"),
                "approach": format!("approach {i}"),
                "specificPrompt": format!("agent directive {i}"),
            })
        })
        .collect();
    json!({ "configs": configs })
}

fn base_options() -> OrchestratorOptions {
    // Threshold of one keeps each agent at a single verification pass.
    OrchestratorOptions::new(
        EngineOptions::new("What is the best approach?", "base-model")
            .with_required_successful_verifications(1),
    )
}

fn drain_events(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>,
) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_agents_complete_and_synthesize() {
    let client = KeyedClient::new(Some(Ok(configs_json(3))));
    let (sink, rx) = ProgressSink::channel();
    let orchestrator =
        MultiAgentOrchestrator::new(base_options(), client.clone()).with_progress(sink);

    let result = orchestrator.run().await.unwrap();

    assert_eq!(result.total_agents, 3);
    assert_eq!(result.completed_agents, 3);
    assert_eq!(result.agent_results.len(), 3);
    // Results preserve config order regardless of completion order.
    let ids: Vec<&str> = result
        .agent_results
        .iter()
        .map(|r| r.agent_id.as_str())
        .collect();
    assert_eq!(ids, vec!["agent_01", "agent_02", "agent_03"]);
    for agent in &result.agent_results {
        assert_eq!(agent.status, AgentStatus::Completed);
        assert_eq!(agent.progress, 100);
        assert_eq!(agent.solution.as_deref(), Some("improved"));
        assert_eq!(agent.verifications.as_ref().map(Vec::len), Some(1));
    }
    assert_eq!(result.plan, "the plan");
    assert_eq!(result.synthesis, "the synthesis");
    assert_eq!(result.final_solution, "the synthesis");
    assert_eq!(result.summary.as_deref(), Some("the summary"));

    let events = drain_events(rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Success { .. })));
}

#[tokio::test]
async fn agent_cap_selects_prefix_of_planned_configs() {
    let client = KeyedClient::new(Some(Ok(configs_json(5))));
    let orchestrator =
        MultiAgentOrchestrator::new(base_options().with_max_agents(3), client.clone());

    let result = orchestrator.run().await.unwrap();

    assert_eq!(result.total_agents, 3);
    assert_eq!(result.agent_results.len(), 3);
    let ids: Vec<&str> = result
        .agent_results
        .iter()
        .map(|r| r.agent_id.as_str())
        .collect();
    assert_eq!(ids, vec!["agent_01", "agent_02", "agent_03"]);
}

#[tokio::test]
async fn uncapped_run_uses_every_planned_config() {
    let client = KeyedClient::new(Some(Ok(configs_json(4))));
    let orchestrator = MultiAgentOrchestrator::new(base_options(), client.clone());

    let result = orchestrator.run().await.unwrap();
    assert_eq!(result.total_agents, 4);
    assert_eq!(result.completed_agents, 4);
}

// ── Failure containment ──────────────────────────────────────────────────────

#[tokio::test]
async fn one_failing_agent_never_aborts_siblings() {
    // "agent directive 2" lands in agent 2's exploration context, so only
    // that agent's backend calls fail.
    let client = KeyedClient::builder(Some(Ok(configs_json(3))))
        .fail_on("agent directive 2")
        .build();
    let orchestrator = MultiAgentOrchestrator::new(base_options(), client.clone());

    let result = orchestrator.run().await.unwrap();

    assert_eq!(result.total_agents, 3);
    assert_eq!(result.completed_agents, 2);
    let failed = &result.agent_results[1];
    assert_eq!(failed.status, AgentStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("injected failure"));
    assert_eq!(result.agent_results[0].status, AgentStatus::Completed);
    assert_eq!(result.agent_results[2].status, AgentStatus::Completed);
    // Synthesis and summary still run over the mixed outcomes.
    assert_eq!(result.synthesis, "the synthesis");
    assert_eq!(result.summary.as_deref(), Some("the summary"));
}

#[tokio::test]
async fn panicking_agent_is_captured_at_the_join_point() {
    let client = KeyedClient::builder(Some(Ok(configs_json(3))))
        .panic_on("agent directive 2")
        .build();
    let orchestrator = MultiAgentOrchestrator::new(base_options(), client.clone());

    let result = orchestrator.run().await.unwrap();

    assert_eq!(result.completed_agents, 2);
    let failed = &result.agent_results[1];
    assert_eq!(failed.status, AgentStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("panicked"));
}

#[tokio::test]
async fn budget_exhausted_agent_stays_failed_with_best_effort_solution() {
    // Every verification fails and the error budget is one, so each nested
    // engine emits a failure event and returns its best effort.
    let mut options = base_options();
    options.engine.max_errors_before_give_up = 1;
    let client = KeyedClient::builder(Some(Ok(configs_json(2))))
        .confirm_answer("no")
        .build();
    let orchestrator = MultiAgentOrchestrator::new(options, client.clone());

    let result = orchestrator.run().await.unwrap();

    assert_eq!(result.total_agents, 2);
    assert_eq!(result.completed_agents, 0);
    for agent in &result.agent_results {
        assert_eq!(agent.status, AgentStatus::Failed);
        assert!(agent
            .error
            .as_deref()
            .unwrap()
            .contains("too many consecutive verification failures"));
        // The nested run still returned; its best effort is recorded.
        assert_eq!(agent.solution.as_deref(), Some("improved"));
    }
    // The orchestration itself still synthesizes and summarizes.
    assert_eq!(result.summary.as_deref(), Some("the summary"));
}

// ── Config generation fallback ───────────────────────────────────────────────

#[tokio::test]
async fn structured_failure_falls_back_to_fenced_text() {
    let fenced = format!(
        "```json\n{}\n```",
        serde_json::to_string(&configs_json(2)["configs"]).unwrap()
    );
    let client = KeyedClient::builder(Some(Err("schema unsupported".into())))
        .fallback_config_text(&fenced)
        .build();
    let orchestrator = MultiAgentOrchestrator::new(base_options(), client.clone());

    let result = orchestrator.run().await.unwrap();

    assert_eq!(client.structured_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.total_agents, 2);
    assert_eq!(result.completed_agents, 2);
}

#[tokio::test]
async fn unparseable_fallback_is_fatal_with_excerpt() {
    let client = KeyedClient::builder(Some(Err("schema unsupported".into())))
        .fallback_config_text("I am unable to produce JSON today.")
        .build();
    let orchestrator = MultiAgentOrchestrator::new(base_options(), client.clone());

    let error = orchestrator.run().await.unwrap_err();
    assert!(matches!(error, ThinkError::AgentConfigParse(_)));
    assert!(error.to_string().contains("I am unable to produce JSON"));
}

#[tokio::test]
async fn structured_shape_mismatch_also_falls_back() {
    // Structured generation succeeds but returns the wrong shape; the
    // fallback text path recovers.
    let fenced = serde_json::to_string(&configs_json(2)["configs"]).unwrap();
    let client = KeyedClient::builder(Some(Ok(json!({"plans": []}))))
        .fallback_config_text(&fenced)
        .build();
    let orchestrator = MultiAgentOrchestrator::new(base_options(), client.clone());

    let result = orchestrator.run().await.unwrap();
    assert_eq!(result.total_agents, 2);
}

// ── Options plumbing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn user_answers_fold_into_the_planning_input() {
    let mut options = base_options();
    options.engine.user_answers = Some("the budget is fixed".into());
    let client = KeyedClient::new(Some(Ok(configs_json(2))));
    let orchestrator = MultiAgentOrchestrator::new(options, client.clone());

    let result = orchestrator.run().await.unwrap();
    assert_eq!(result.user_answers.as_deref(), Some("the budget is fixed"));

    let plan_request = client
        .requests()
        .into_iter()
        .find(|r| r.input_text().contains("Design a multi-perspective analysis plan"))
        .expect("plan call expected");
    assert!(plan_request
        .input_text()
        .contains("### User Provided Context ###"));
    assert!(plan_request.input_text().contains("the budget is fixed"));
}

#[tokio::test]
async fn asking_phase_reports_questions_without_pausing() {
    let mut options = base_options();
    options.engine.enable_ask_questions = true;
    let client = KeyedClient::new(Some(Ok(configs_json(2))));
    let (sink, rx) = ProgressSink::channel();
    let orchestrator = MultiAgentOrchestrator::new(options, client.clone()).with_progress(sink);

    let result = orchestrator.run().await.unwrap();

    assert_eq!(result.questions.as_deref(), Some("1. What matters most?"));
    // The run proceeded all the way to a synthesis.
    assert_eq!(result.synthesis, "the synthesis");

    let events = drain_events(rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Asking { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ProgressEvent::WaitingForAnswers { .. })));
}

#[tokio::test]
async fn nested_engines_inherit_the_agent_thinking_model() {
    let mut options = base_options();
    options.engine.model_stages = ModelStageConfig {
        agent_thinking: Some("agent-model".into()),
        planning: Some("planner-model".into()),
        ..Default::default()
    };
    let client = KeyedClient::new(Some(Ok(configs_json(2))));
    let orchestrator = MultiAgentOrchestrator::new(options, client.clone());

    orchestrator.run().await.unwrap();

    let requests = client.requests();
    assert!(requests
        .iter()
        .any(|r| r.model == "planner-model"
            && r.input_text().contains("Design a multi-perspective analysis plan")));
    // Agent exploration calls run on the agent-thinking model.
    assert!(requests
        .iter()
        .any(|r| r.model == "agent-model" && r.input_text().contains("agent directive 1")));
}

#[tokio::test]
async fn nested_engines_skip_asking_and_planning() {
    let mut options = base_options();
    // Asking is on at the orchestrator level; nested engines must not ask
    // again or plan.
    options.engine.enable_ask_questions = true;
    options.engine.enable_planning = true;
    let client = KeyedClient::new(Some(Ok(configs_json(2))));
    let orchestrator = MultiAgentOrchestrator::new(options, client.clone());

    orchestrator.run().await.unwrap();

    let ask_calls = client
        .requests()
        .iter()
        .filter(|r| {
            r.input_text()
                .contains("Generate 1-7 focused follow-up questions")
        })
        .count();
    assert_eq!(ask_calls, 1);
    // No nested engine issued a single-track thinking-plan call.
    assert!(!client
        .requests()
        .iter()
        .any(|r| r.input_text().contains("create a structured thinking plan")));
}

// ── Agent updates ────────────────────────────────────────────────────────────

#[tokio::test]
async fn agent_updates_flow_once_per_mutation() {
    let client = KeyedClient::new(Some(Ok(configs_json(2))));
    let (updates, mut updates_rx) = AgentUpdateSink::channel();
    let orchestrator =
        MultiAgentOrchestrator::new(base_options(), client.clone()).with_agent_updates(updates);

    orchestrator.run().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(update) = updates_rx.try_recv() {
        seen.push(update);
    }

    // Selection announcements come first, carrying the approach.
    assert_eq!(seen[0].agent_id, "agent_01");
    assert_eq!(seen[0].approach.as_deref(), Some("approach 1"));
    assert_eq!(seen[1].agent_id, "agent_02");

    for agent_id in ["agent_01", "agent_02"] {
        assert!(seen.iter().any(|u| u.agent_id == agent_id
            && u.status == Some(AgentStatus::Thinking)
            && u.progress == Some(10)));
        assert!(seen.iter().any(|u| u.agent_id == agent_id
            && u.status == Some(AgentStatus::Completed)
            && u.progress == Some(100)
            && u.solution.is_some()));
    }
}
