//! Iterative refinement and multi-agent synthesis over a pluggable
//! text-generation backend.
//!
//! Two engines share one substrate. [`engine::RefinementEngine`] runs a
//! single ask/plan/explore/verify/correct loop until a confidence threshold
//! is met or a budget runs out. [`orchestrator::MultiAgentOrchestrator`]
//! plans a set of strategic approaches, runs one isolated engine per
//! approach concurrently, and fuses the outputs into one answer.
//!
//! The backend is abstract: callers implement [`client::TextGenerationClient`]
//! for their provider and hand it in. Progress streams out over
//! [`progress::ProgressSink`]; citations accumulate in
//! [`sources::SourceCollector`].
//!
//! ## Modules
//!
//! | Module         | Purpose                                            |
//! |----------------|----------------------------------------------------|
//! | `client`       | Text-generation capability consumed by the engines |
//! | `config`       | Run options, budgets, search gating                |
//! | `engine`       | Single-track refinement state machine              |
//! | `error`        | Unified error taxonomy                             |
//! | `orchestrator` | Plan / fan-out / join / synthesis                  |
//! | `progress`     | Event types and single-writer sinks                |
//! | `prompts`      | Stage prompt templates and markers                 |
//! | `sources`      | Citation records and the run accumulator           |
//! | `stages`       | Stage names and stage→model routing                |
//! | `types`        | Domain types and terminal results                  |

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod sources;
pub mod stages;
pub mod types;

use std::sync::Arc;

pub use client::{
    GenerationOutput, GenerationRequest, Message, MessageRole, PromptInput, ProviderMetadata,
    SearchContextSize, SearchHit, SearchTool, TextGenerationClient,
};
pub use config::{EngineOptions, OrchestratorOptions, SearchProviderConfig};
pub use engine::RefinementEngine;
pub use error::ThinkError;
pub use orchestrator::MultiAgentOrchestrator;
pub use progress::{AgentUpdate, AgentUpdateSink, ProgressEvent, ProgressSink};
pub use sources::{Source, SourceCollector};
pub use stages::{ModelStageConfig, ModelStageRouter, Stage};
pub use types::{
    AgentConfig, AgentResult, AgentStatus, DeepThinkResult, IterationRecord, IterationStatus,
    UltraThinkResult, Verification,
};

/// Run a single-track refinement to completion with the null progress sink.
pub async fn run_deep_think(
    options: EngineOptions,
    client: Arc<dyn TextGenerationClient>,
) -> Result<DeepThinkResult, ThinkError> {
    RefinementEngine::new(options, client).run().await
}

/// Run a multi-agent orchestration to completion with the null sinks.
pub async fn run_ultra_think(
    options: OrchestratorOptions,
    client: Arc<dyn TextGenerationClient>,
) -> Result<UltraThinkResult, ThinkError> {
    MultiAgentOrchestrator::new(options, client).run().await
}
