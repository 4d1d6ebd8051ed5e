//! The stage processor: prompt, call, parse, classify.
//!
//! Nothing escapes [`StageProcessor::run_stage`] as an error or panic; every
//! outcome is a [`StageOutcome`] the orchestrator can persist as-is.

use std::time::Duration;

use quillcast_core::{Stage, TokenUsage};
use serde::de::DeserializeOwned;

use crate::client::{ChatMessage, Completion, CompletionRequest, Generator};
use crate::error::{GenerationError, StageErrorKind};
use crate::parse::parse_payload;
use crate::payloads::{
    ArticleDraft, ContentStrategy, HumanizedDraft, KeywordSet, ReviewedArticle, SourceCandidates,
    SourceInsights,
};
use crate::prompts::{PromptPair, SourceAnalysisInput, StageInput};
use crate::retry::retry_with_backoff;

/// Model selection for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// Upper bound on a single generation call, retries excluded.
    pub call_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 1_000,
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// Parsed output of a stage, one variant per stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePayload {
    Keywords(KeywordSet),
    Strategy(ContentStrategy),
    Candidates(SourceCandidates),
    Draft(ArticleDraft),
    Humanized(HumanizedDraft),
    Reviewed(ReviewedArticle),
}

impl StagePayload {
    /// JSON form stored on the stage artifact.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            StagePayload::Keywords(p) => serde_json::to_value(p),
            StagePayload::Strategy(p) => serde_json::to_value(p),
            StagePayload::Candidates(p) => serde_json::to_value(p),
            StagePayload::Draft(p) => serde_json::to_value(p),
            StagePayload::Humanized(p) => serde_json::to_value(p),
            StagePayload::Reviewed(p) => serde_json::to_value(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub kind: StageErrorKind,
    pub message: String,
    /// Last model output, when the failure happened after a response arrived.
    pub raw_response: Option<String>,
}

impl StageFailure {
    fn from_error(err: &GenerationError, raw_response: Option<String>) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            raw_response,
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A successfully parsed call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub value: T,
    pub model: String,
    pub raw_response: String,
    /// Usage of the call whose output was accepted. Unparseable attempts are
    /// not counted.
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Success {
        payload: StagePayload,
        model: String,
        raw_response: String,
        usage: TokenUsage,
    },
    Failure {
        kind: StageErrorKind,
        message: String,
        raw_response: Option<String>,
    },
}

impl StageOutcome {
    fn from_result<T>(
        result: Result<Generated<T>, StageFailure>,
        wrap: fn(T) -> StagePayload,
    ) -> Self {
        match result {
            Ok(generated) => StageOutcome::Success {
                payload: wrap(generated.value),
                model: generated.model,
                raw_response: generated.raw_response,
                usage: generated.usage,
            },
            Err(failure) => StageOutcome::Failure {
                kind: failure.kind,
                message: failure.message,
                raw_response: failure.raw_response,
            },
        }
    }
}

pub struct StageProcessor<G> {
    generator: G,
    config: ProcessorConfig,
}

impl<G: Generator> StageProcessor<G> {
    pub fn new(generator: G, config: ProcessorConfig) -> Self {
        Self { generator, config }
    }

    /// Run one stage end to end.
    ///
    /// `source_discovery` here produces the candidate list only; fetching and
    /// aggregation happen in the batch runner.
    pub async fn run_stage(&self, input: &StageInput, model: &ModelConfig) -> StageOutcome {
        let stage = input.stage();
        let prompt = input.prompt();
        tracing::info!(stage = %stage, model = %model.model, "running stage");

        match stage {
            Stage::KeywordResearch => StageOutcome::from_result(
                self.run_prompt::<KeywordSet>(stage.as_str(), &prompt, model).await,
                StagePayload::Keywords,
            ),
            Stage::ContentStrategy => StageOutcome::from_result(
                self.run_prompt::<ContentStrategy>(stage.as_str(), &prompt, model)
                    .await
                    .and_then(require_planned_article),
                StagePayload::Strategy,
            ),
            Stage::SourceDiscovery => StageOutcome::from_result(
                self.run_prompt::<SourceCandidates>(stage.as_str(), &prompt, model).await,
                StagePayload::Candidates,
            ),
            Stage::Writing => StageOutcome::from_result(
                self.run_prompt::<ArticleDraft>(stage.as_str(), &prompt, model).await,
                StagePayload::Draft,
            ),
            Stage::Humanization => StageOutcome::from_result(
                self.run_prompt::<HumanizedDraft>(stage.as_str(), &prompt, model).await,
                StagePayload::Humanized,
            ),
            Stage::Review => StageOutcome::from_result(
                self.run_prompt::<ReviewedArticle>(stage.as_str(), &prompt, model).await,
                StagePayload::Reviewed,
            ),
        }
    }

    /// Analyse one fetched source page.
    ///
    /// # Errors
    ///
    /// Returns the classified [`StageFailure`] if the call or parse fails.
    pub async fn analyze_source(
        &self,
        input: &SourceAnalysisInput,
        model: &ModelConfig,
    ) -> Result<Generated<SourceInsights>, StageFailure> {
        self.run_prompt::<SourceInsights>("source_analysis", &input.prompt(), model)
            .await
    }

    /// Call, parse, and on a parse failure re-prompt once with a stricter
    /// instruction.
    async fn run_prompt<T: DeserializeOwned>(
        &self,
        label: &str,
        prompt: &PromptPair,
        model: &ModelConfig,
    ) -> Result<Generated<T>, StageFailure> {
        let first = self
            .call(prompt, model)
            .await
            .map_err(|e| StageFailure::from_error(&e, None))?;

        match parse_payload::<T>(&first.content) {
            Ok(value) => return Ok(generated(value, first)),
            Err(e) => {
                tracing::warn!(stage = label, error = %e, "unparseable output, re-prompting once");
            }
        }

        let second = self
            .call(&prompt.stricter(), model)
            .await
            .map_err(|e| StageFailure::from_error(&e, Some(first.content.clone())))?;

        match parse_payload::<T>(&second.content) {
            Ok(value) => Ok(generated(value, second)),
            Err(e) => {
                tracing::warn!(stage = label, error = %e, "output still unparseable after re-prompt");
                Err(StageFailure::from_error(&e, Some(second.content)))
            }
        }
    }

    async fn call(
        &self,
        prompt: &PromptPair,
        model: &ModelConfig,
    ) -> Result<Completion, GenerationError> {
        let request = CompletionRequest {
            model: model.model.clone(),
            messages: vec![
                ChatMessage::system(prompt.system.clone()),
                ChatMessage::user(prompt.user.clone()),
            ],
            temperature: model.temperature,
            max_tokens: model.max_tokens,
        };
        let timeout = self.config.call_timeout;

        retry_with_backoff(self.config.max_retries, self.config.backoff_base_ms, || {
            let request = &request;
            async move {
                tokio::time::timeout(timeout, self.generator.complete(request))
                    .await
                    .unwrap_or(Err(GenerationError::Timeout(timeout.as_secs())))
            }
        })
        .await
    }
}

fn generated<T>(value: T, completion: Completion) -> Generated<T> {
    Generated {
        value,
        model: completion.model,
        raw_response: completion.content,
        usage: completion.usage,
    }
}

fn require_planned_article(
    generated: Generated<ContentStrategy>,
) -> Result<Generated<ContentStrategy>, StageFailure> {
    if generated.value.articles.is_empty() {
        return Err(StageFailure {
            kind: StageErrorKind::ParseError,
            message: "content strategy planned no articles".to_string(),
            raw_response: Some(generated.raw_response),
        });
    }
    Ok(generated)
}
