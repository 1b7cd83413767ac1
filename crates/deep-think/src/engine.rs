//! Single-track refinement engine.
//!
//! Runs the ask/plan/explore/verify/correct state machine for one problem:
//!
//! ```text
//! Init → [Asking] → [WaitingForAnswers] → [Planning] → InitialExploration
//!      → { Verifying ⇄ Correcting } → Summarizing → Terminal(Success|Failure)
//! ```
//!
//! The loop is strictly sequential: every stage suspends the task until its
//! generation call completes. Budget exhaustion and verification failure are
//! normal outcomes — the run always produces a summary and a complete result
//! object, and only a failing backend call surfaces as `Err`.
//!
//! ## Loop budgets
//!
//! | Budget                              | Effect when reached               |
//! |-------------------------------------|-----------------------------------|
//! | `max_iterations`                    | loop exits; failure event emitted |
//! | `required_successful_verifications` | loop exits on the success path    |
//! | `max_errors_before_give_up`         | loop breaks before re-verifying   |
//!
//! The consecutive-success counter advances exactly once per verification
//! pass and resets on any failure; the consecutive-error counter does the
//! reverse. A passing pass re-verifies the *unchanged* solution — only a
//! correction ever advances the candidate.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::{GenerationOutput, GenerationRequest, Message, TextGenerationClient};
use crate::config::EngineOptions;
use crate::error::ThinkError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::prompts;
use crate::sources::SourceCollector;
use crate::stages::{ModelStageRouter, Stage};
use crate::types::{DeepThinkResult, IterationRecord, IterationStatus, Verification};

/// How the verify/correct loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Consecutive-success threshold reached.
    Solved,
    /// Consecutive-error budget consumed.
    GaveUp,
    /// Iteration budget consumed.
    Exhausted,
}

/// Single-track iterative refinement over one problem statement.
pub struct RefinementEngine {
    options: EngineOptions,
    client: Arc<dyn TextGenerationClient>,
    router: ModelStageRouter,
    sources: Arc<SourceCollector>,
    progress: ProgressSink,
}

impl RefinementEngine {
    pub fn new(options: EngineOptions, client: Arc<dyn TextGenerationClient>) -> Self {
        let router = options.router();
        Self {
            options,
            client,
            router,
            sources: Arc::new(SourceCollector::new()),
            progress: ProgressSink::null(),
        }
    }

    /// Replace the progress sink (defaults to the null sink).
    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Share an externally-owned source accumulator. Used by the
    /// orchestrator so all agents append into one collection.
    pub fn with_sources(mut self, sources: Arc<SourceCollector>) -> Self {
        self.sources = sources;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        self.progress.emit(event);
    }

    /// Attach the run's search tool / provider options to a request.
    fn searchable(&self, mut request: GenerationRequest) -> GenerationRequest {
        if let Some(tool) = self.options.search_tool() {
            request = request.with_search_tool(tool);
        }
        if let Some(options) = self.options.provider_options() {
            request = request.with_provider_options(options);
        }
        request
    }

    fn collect_sources(&self, output: &GenerationOutput) {
        if let Some(metadata) = &output.metadata {
            self.sources.record(metadata.sources());
        }
    }

    // ── Asking ───────────────────────────────────────────────────────────

    /// Generate 1–7 clarifying questions about the problem.
    ///
    /// Standalone entry point for interactive mode: emits `asking` and, when
    /// `wait_for_answers` is set, `waiting_for_answers`; the caller collects
    /// the user's reply and starts a fresh run with `user_answers` set.
    pub async fn ask_questions(&self, wait_for_answers: bool) -> Result<String, ThinkError> {
        self.emit(ProgressEvent::Progress {
            message: "Generating clarification questions...".to_string(),
        });

        let prompt = prompts::build_ask_questions_prompt(&self.options.problem_statement);
        let output = self
            .client
            .generate(GenerationRequest::prompt(
                self.router.default_model(),
                prompt,
            ))
            .await?;

        let questions = output.text;
        self.emit(ProgressEvent::Asking {
            questions: questions.clone(),
        });
        if wait_for_answers {
            self.emit(ProgressEvent::WaitingForAnswers {
                questions: questions.clone(),
            });
        }
        Ok(questions)
    }

    // ── Planning ─────────────────────────────────────────────────────────

    async fn generate_thinking_plan(&self) -> Result<String, ThinkError> {
        self.emit(ProgressEvent::Progress {
            message: "Generating thinking plan...".to_string(),
        });

        let prompt = prompts::build_thinking_plan_prompt(
            &self.options.problem_statement,
            self.options.user_answers.as_deref(),
        );
        let output = self
            .client
            .generate(GenerationRequest::prompt(
                self.router.default_model(),
                prompt,
            ))
            .await?;

        let plan = output.text;
        self.emit(ProgressEvent::Planning { plan: plan.clone() });
        Ok(plan)
    }

    // ── Verification ─────────────────────────────────────────────────────

    /// Critique the candidate, then ask a separate yes/no confirmation
    /// question over the critique. `passed` comes from the confirmation
    /// text, never from the critique itself.
    async fn verify_solution(&self, solution: &str) -> Result<Verification, ThinkError> {
        let detailed = extract_after_marker(solution, prompts::DETAILED_SOLUTION_MARKER);
        let verification_prompt =
            prompts::build_verification_prompt(&self.options.problem_statement, &detailed);

        self.emit(ProgressEvent::Progress {
            message: "Verifying solution...".to_string(),
        });

        let model = self.router.resolve(Stage::Verification);
        let critique = self
            .client
            .generate(
                GenerationRequest::prompt(model, verification_prompt)
                    .with_system(prompts::VERIFICATION_SYSTEM_PROMPT),
            )
            .await?
            .text;

        let confirm_prompt = prompts::build_confirm_verification_prompt(&critique);
        let good_verify = self
            .client
            .generate(GenerationRequest::prompt(model, confirm_prompt))
            .await?
            .text;

        let bug_report = if Verification::confirms(&good_verify) {
            String::new()
        } else {
            extract_before_marker(&critique, prompts::BUG_REPORT_MARKER)
        };
        Ok(Verification::new(bug_report, good_verify))
    }

    // ── Initial exploration ──────────────────────────────────────────────

    /// Two-step exploration: draft a first solution, then have the backend
    /// critique and improve it. The improved solution is the first
    /// candidate, verified before the loop starts.
    async fn initial_exploration(
        &self,
        other_prompts: &[String],
    ) -> Result<(String, Verification), ThinkError> {
        self.emit(ProgressEvent::Thinking {
            iteration: 0,
            phase: "initial-exploration".to_string(),
        });

        let full_prompt = prompts::build_initial_thinking_prompt(
            &self.options.problem_statement,
            other_prompts,
            self.options.knowledge_context.as_deref(),
        );
        let first = self
            .client
            .generate(self.searchable(GenerationRequest::prompt(
                self.router.resolve(Stage::Initial),
                full_prompt,
            )))
            .await?;
        self.collect_sources(&first);

        let first_solution = first.text;
        self.emit(ProgressEvent::Solution {
            iteration: 0,
            solution: first_solution.clone(),
        });

        self.emit(ProgressEvent::Thinking {
            iteration: 0,
            phase: "self-improvement".to_string(),
        });

        let system = prompts::with_knowledge_context(self.options.knowledge_context.as_deref());
        let messages = vec![
            Message::user(&self.options.problem_statement),
            Message::assistant(&first_solution),
            Message::user(prompts::SELF_IMPROVEMENT_PROMPT),
        ];
        let improved = self
            .client
            .generate(
                self.searchable(
                    GenerationRequest::messages(self.router.resolve(Stage::Improvement), messages)
                        .with_system(system),
                ),
            )
            .await?;
        self.collect_sources(&improved);

        let improved_solution = improved.text;
        self.emit(ProgressEvent::Solution {
            iteration: 0,
            solution: improved_solution.clone(),
        });

        let verification = self.verify_solution(&improved_solution).await?;
        self.emit(ProgressEvent::Verification {
            iteration: 0,
            passed: verification.passed,
        });

        Ok((improved_solution, verification))
    }

    // ── Correction ───────────────────────────────────────────────────────

    async fn correct_solution(
        &self,
        solution: &str,
        bug_report: &str,
    ) -> Result<String, ThinkError> {
        let system = prompts::with_knowledge_context(self.options.knowledge_context.as_deref());
        let messages = vec![
            Message::user(&self.options.problem_statement),
            Message::assistant(solution),
            Message::user(format!("{}\n\n{}", prompts::CORRECTION_PROMPT, bug_report)),
        ];
        let output = self
            .client
            .generate(
                self.searchable(
                    GenerationRequest::messages(self.router.resolve(Stage::Correction), messages)
                        .with_system(system),
                ),
            )
            .await?;
        self.collect_sources(&output);
        Ok(output.text)
    }

    // ── Summarizing ──────────────────────────────────────────────────────

    async fn summarize(&self, solution: &str) -> Result<String, ThinkError> {
        self.emit(ProgressEvent::Summarizing {
            message: "Generating final summary...".to_string(),
        });

        let prompt =
            prompts::build_final_summary_prompt(&self.options.problem_statement, solution);
        let output = self
            .client
            .generate(GenerationRequest::prompt(
                self.router.resolve(Stage::Summary),
                prompt,
            ))
            .await?;
        Ok(output.text)
    }

    // ── Run ──────────────────────────────────────────────────────────────

    /// Execute the full pipeline to a terminal result.
    ///
    /// With ask-questions and interactive mode both enabled, only the
    /// Asking stage runs and the result carries the questions alone; the
    /// caller resumes with a fresh run and `user_answers` populated.
    pub async fn run(&self) -> Result<DeepThinkResult, ThinkError> {
        self.options
            .validate()
            .map_err(ThinkError::Configuration)?;

        let problem = self.options.problem_statement.clone();
        self.emit(ProgressEvent::Init {
            problem: problem.clone(),
        });

        let mut questions = None;
        if self.options.enable_ask_questions {
            let text = self
                .ask_questions(self.options.enable_interactive_mode)
                .await?;
            questions = Some(text);
            if self.options.enable_interactive_mode {
                // Hard pause: the caller collects answers and starts over.
                return Ok(self.questions_only_result(questions));
            }
        }

        let mut other_prompts = self.options.other_prompts.clone();
        let mut plan = None;
        if self.options.enable_planning {
            let text = self.generate_thinking_plan().await?;
            other_prompts.push(format!("\n### Thinking Plan ###\n{text}\n"));
            plan = Some(text);
        }

        let (initial_solution, mut verification) =
            self.initial_exploration(&other_prompts).await?;
        let initial_thought = initial_solution.clone();
        let mut solution = initial_solution;

        let max_iterations = self.options.max_iterations;
        let required = self.options.required_successful_verifications;
        let max_errors = self.options.max_errors_before_give_up;

        let mut iterations: Vec<IterationRecord> = Vec::new();
        let mut verifications: Vec<Verification> = Vec::new();
        let mut success_count: u32 = 0;
        let mut error_count: u32 = 0;
        let mut exit = LoopExit::Exhausted;

        for index in 0..max_iterations {
            let passed = verification.passed;
            verifications.push(verification.clone());
            iterations.push(IterationRecord {
                index,
                solution: solution.clone(),
                verification: verification.clone(),
                status: if passed {
                    IterationStatus::Completed
                } else {
                    IterationStatus::Correcting
                },
            });

            if passed {
                success_count += 1;
                error_count = 0;
            } else {
                success_count = 0;
                error_count += 1;

                if error_count >= max_errors {
                    warn!(iteration = index, error_count, "error budget consumed, giving up");
                    self.emit(ProgressEvent::Failure {
                        reason: "too many consecutive verification failures".to_string(),
                    });
                    exit = LoopExit::GaveUp;
                    break;
                }

                self.emit(ProgressEvent::Correction { iteration: index });
                solution = self
                    .correct_solution(&solution, &verification.bug_report)
                    .await?;
                self.emit(ProgressEvent::Solution {
                    iteration: index + 1,
                    solution: solution.clone(),
                });
            }

            if success_count >= required {
                exit = LoopExit::Solved;
                break;
            }

            // A passing pass below the threshold re-verifies the unchanged
            // solution; a corrected solution gets its first verification.
            verification = self.verify_solution(&solution).await?;
            self.emit(ProgressEvent::Verification {
                iteration: index + 1,
                passed: verification.passed,
            });
        }

        // Every exit path produces a summary and a complete result.
        let summary = self.summarize(&solution).await?;
        let total_iterations = iterations.len() as u32;

        match exit {
            LoopExit::Solved => {
                info!(total_iterations, "refinement converged");
                self.emit(ProgressEvent::Success {
                    solution: summary.clone(),
                    iterations: total_iterations,
                });
            }
            LoopExit::GaveUp => {
                debug!(total_iterations, "summarized best effort after give-up");
            }
            LoopExit::Exhausted => {
                warn!(total_iterations, "iteration budget exhausted");
                self.emit(ProgressEvent::Failure {
                    reason: "max iterations reached".to_string(),
                });
            }
        }

        Ok(DeepThinkResult {
            questions,
            user_answers: self.options.user_answers.clone(),
            plan,
            initial_thought,
            iterations,
            verifications,
            final_solution: solution,
            summary: Some(summary),
            total_iterations,
            successful_verifications: success_count,
            sources: self.sources.snapshot_optional(),
        })
    }

    fn questions_only_result(&self, questions: Option<String>) -> DeepThinkResult {
        DeepThinkResult {
            questions,
            user_answers: self.options.user_answers.clone(),
            plan: None,
            initial_thought: String::new(),
            iterations: Vec::new(),
            verifications: Vec::new(),
            final_solution: String::new(),
            summary: None,
            total_iterations: 0,
            successful_verifications: 0,
            sources: None,
        }
    }
}

// ── Marker extraction ────────────────────────────────────────────────────────

/// Text after the first occurrence of `marker`, trimmed. Empty when the
/// marker is absent.
pub(crate) fn extract_after_marker(text: &str, marker: &str) -> String {
    match text.find(marker) {
        Some(index) => text[index + marker.len()..].trim().to_string(),
        None => String::new(),
    }
}

/// Text before the first occurrence of `marker`, trimmed. The whole text
/// when the marker is absent.
pub(crate) fn extract_before_marker(text: &str, marker: &str) -> String {
    match text.find(marker) {
        Some(index) => text[..index].trim().to_string(),
        None => text.trim().to_string(),
    }
}
