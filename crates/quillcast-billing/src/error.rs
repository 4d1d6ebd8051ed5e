use quillcast_db::DbError;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BillingError {
    /// The balance does not cover the estimated cost; the paid call must not run.
    #[error("insufficient balance: {current_balance} available, {required} required")]
    InsufficientBalance {
        current_balance: Decimal,
        required: Decimal,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("user {0} has no subscription")]
    NoSubscription(Uuid),

    #[error("payment API key is not configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment API returned {status}: {message}")]
    Payment { status: u16, message: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] DbError),
}
