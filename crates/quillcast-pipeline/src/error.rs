use quillcast_billing::BillingError;
use quillcast_core::{CoreError, Stage};
use quillcast_db::DbError;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("campaign {0} not found")]
    NotFound(Uuid),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("stage {0} already succeeded; request a rerun to run it again")]
    StageAlreadySucceeded(Stage),

    #[error("campaign {0} already has a stage running")]
    CampaignBusy(Uuid),

    #[error("insufficient balance: {current_balance} available, {required} required")]
    InsufficientBalance {
        current_balance: Decimal,
        required: Decimal,
    },

    /// A stored payload no longer decodes into its stage type.
    #[error("stored {stage} artifact is unusable: {reason}")]
    InvalidArtifact { stage: Stage, reason: String },

    #[error(transparent)]
    Billing(BillingError),

    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<BillingError> for PipelineError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InsufficientBalance {
                current_balance,
                required,
            } => PipelineError::InsufficientBalance {
                current_balance,
                required,
            },
            BillingError::Store(e) => PipelineError::Store(e),
            other => PipelineError::Billing(other),
        }
    }
}

impl PipelineError {
    pub(crate) fn transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        PipelineError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
