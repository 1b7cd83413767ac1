//! The text-generation capability the engines consume.
//!
//! The core never talks to a backend vendor directly. It requires exactly
//! two operations — free-text generation and structured generation against a
//! declared JSON schema — expressed by [`TextGenerationClient`]. Host
//! applications implement the trait for their provider of choice; tests
//! drive the engines with scripted implementations.
//!
//! Responses may carry [`ProviderMetadata`], a tagged per-provider variant
//! from which citation records are extracted. Each variant knows how to
//! surface its own records; the engines only ever call
//! [`ProviderMetadata::sources`].

use async_trait::async_trait;
use schemars::schema::RootSchema;
use serde::{Deserialize, Serialize};

use crate::error::ThinkError;
use crate::sources::Source;

// ── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn of a message history handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Requests ─────────────────────────────────────────────────────────────────

/// A single prompt or a full message history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    Prompt(String),
    Messages(Vec<Message>),
}

/// How much search context a tool-augmented call should request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchContextSize {
    Medium,
    High,
}

/// Declaration of the backend's built-in web-search tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTool {
    pub context_size: SearchContextSize,
}

/// One free-text generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier, already resolved through the stage router.
    pub model: String,
    /// Optional system framing.
    pub system: Option<String>,
    pub input: PromptInput,
    /// Web-search tool declaration, when the run and model support it.
    pub search_tool: Option<SearchTool>,
    /// Provider-specific options forwarded verbatim (e.g. a search plugin
    /// block); the client interprets or ignores them.
    pub provider_options: Option<serde_json::Value>,
}

impl GenerationRequest {
    pub fn prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            input: PromptInput::Prompt(prompt.into()),
            search_tool: None,
            provider_options: None,
        }
    }

    pub fn messages(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            system: None,
            input: PromptInput::Messages(messages),
            search_tool: None,
            provider_options: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_search_tool(mut self, tool: SearchTool) -> Self {
        self.search_tool = Some(tool);
        self
    }

    pub fn with_provider_options(mut self, options: serde_json::Value) -> Self {
        self.provider_options = Some(options);
        self
    }

    /// The rendered prompt, or the concatenated message contents.
    ///
    /// Diagnostic helper for logging and tests.
    pub fn input_text(&self) -> String {
        match &self.input {
            PromptInput::Prompt(prompt) => prompt.clone(),
            PromptInput::Messages(messages) => messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

/// A search hit reported by a provider's built-in search tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Citation-bearing response metadata, tagged by provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderMetadata {
    OpenAi { results: Vec<SearchHit> },
    OpenRouter { results: Vec<SearchHit> },
}

impl ProviderMetadata {
    /// Extract citation records from this provider's shape.
    pub fn sources(&self) -> Vec<Source> {
        let results = match self {
            Self::OpenAi { results } | Self::OpenRouter { results } => results,
        };
        results
            .iter()
            .map(|hit| {
                let mut source = Source::new(&hit.url).with_title(&hit.title);
                if !hit.snippet.is_empty() {
                    source = source.with_content(&hit.snippet);
                }
                source
            })
            .collect()
    }
}

/// Result of one free-text generation call.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub text: String,
    pub metadata: Option<ProviderMetadata>,
}

impl GenerationOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ProviderMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ── Client trait ─────────────────────────────────────────────────────────────

/// Abstract text-generation backend.
///
/// Implementations own all vendor concerns: transport, auth, retries,
/// timeouts, and how tool declarations or provider options map onto the
/// wire. Failures surface as [`ThinkError::Backend`] (or `Internal` for
/// implementation-specific causes) and are fatal to the calling run.
#[async_trait]
pub trait TextGenerationClient: Send + Sync {
    /// Generate free text from a prompt or message history.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, ThinkError>;

    /// Generate a value conforming to the declared JSON schema.
    async fn generate_structured(
        &self,
        model: &str,
        schema: RootSchema,
        prompt: &str,
    ) -> Result<serde_json::Value, ThinkError>;
}
