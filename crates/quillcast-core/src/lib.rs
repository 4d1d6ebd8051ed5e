pub mod app_config;
pub mod article;
pub mod campaign;
pub mod config;
pub mod content_blocks;
pub mod pricing;
pub mod source;
pub mod usage;

pub use app_config::{AppConfig, Environment};
pub use article::{
    truncate_meta_description, ArticleStatus, Platform, SyncStatus, MAX_META_DESCRIPTION_LEN,
};
pub use campaign::{progress_for, ArticleLength, CampaignStatus, Stage};
pub use config::{load_app_config, load_app_config_from_env};
pub use content_blocks::{find_block, find_heading, find_list, render_blocks, BlockKind, ContentBlock};
pub use pricing::{load_pricing, ModelEntry, ModelPrice, PricingTable};
pub use source::SourceStatus;
pub use usage::TokenUsage;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read pricing file {path}: {source}")]
    PricingFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pricing file: {0}")]
    PricingFileParse(#[source] serde_yaml::Error),

    #[error("invalid pricing table: {0}")]
    InvalidPricing(String),
}

/// Errors raised when parsing domain enums from their stored string form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid campaign status: {0}")]
    InvalidCampaignStatus(String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("invalid article length: {0}")]
    InvalidArticleLength(String),

    #[error("invalid article status: {0}")]
    InvalidArticleStatus(String),

    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("invalid sync status: {0}")]
    InvalidSyncStatus(String),

    #[error("invalid source status: {0}")]
    InvalidSourceStatus(String),
}
