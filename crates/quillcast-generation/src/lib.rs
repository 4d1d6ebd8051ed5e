pub mod client;
pub mod error;
pub mod parse;
pub mod payloads;
pub mod processor;
pub mod prompts;
pub(crate) mod retry;

pub use client::{ChatMessage, Completion, CompletionRequest, GenerationClient, Generator};
pub use error::{GenerationError, StageErrorKind};
pub use parse::{extract_json, parse_payload};
pub use payloads::{
    AggregatedStrategy, ArticleDraft, ContentStrategy, HumanizedDraft, Keyword, KeywordPriority,
    KeywordSet, Outline, OutlineSection, PlannedArticle, ResearchContext, ReviewedArticle,
    SourceCandidate, SourceCandidates, SourceInsights, SourceResult, VoiceProfile,
    KEYWORDS_BLOCK_KEY, TITLE_BLOCK_KEY,
};
pub use processor::{
    Generated, ModelConfig, ProcessorConfig, StageFailure, StageOutcome, StagePayload,
    StageProcessor,
};
pub use prompts::{CampaignContext, PromptPair, SourceAnalysisInput, StageInput};
