use thiserror::Error;

/// Errors returned by the generation-service client and response parsing.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// No API key was configured for the generation service.
    #[error("generation API key is not configured")]
    MissingApiKey,

    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation service rate limited the request: {0}")]
    RateLimited(String),

    #[error("generation service requires payment: {0}")]
    PaymentRequired(String),

    #[error("generation service rejected credentials (HTTP {status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("generation service returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("generation call timed out after {0}s")]
    Timeout(u64),

    /// The response envelope carried no message content.
    #[error("generation response had no content")]
    EmptyResponse,

    /// The response envelope could not be deserialized.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The message content did not contain JSON of the expected shape.
    #[error("could not parse model output: {0}")]
    Parse(String),
}

/// Stable classification of a failed stage, persisted as `error_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageErrorKind {
    ConfigError,
    UpstreamRateLimited,
    UpstreamPaymentRequired,
    UpstreamAuthError,
    UpstreamError,
    Timeout,
    ParseError,
}

impl StageErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StageErrorKind::ConfigError => "config_error",
            StageErrorKind::UpstreamRateLimited => "upstream_rate_limited",
            StageErrorKind::UpstreamPaymentRequired => "upstream_payment_required",
            StageErrorKind::UpstreamAuthError => "upstream_auth_error",
            StageErrorKind::UpstreamError => "upstream_error",
            StageErrorKind::Timeout => "timeout",
            StageErrorKind::ParseError => "parse_error",
        }
    }

    /// Whether a back-off retry can plausibly succeed. Parse errors get their
    /// own single re-prompt instead. An `UpstreamError` from a 4xx response
    /// is still final; only server-side statuses are retried.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            StageErrorKind::UpstreamRateLimited
                | StageErrorKind::UpstreamError
                | StageErrorKind::Timeout
        )
    }

    /// Message shown to the campaign owner.
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            StageErrorKind::ConfigError => {
                "The content generation service is not configured. Contact support."
            }
            StageErrorKind::UpstreamRateLimited => {
                "The content generation service is busy. Please resume in a few minutes."
            }
            StageErrorKind::UpstreamPaymentRequired => {
                "The content generation service account needs attention. Contact support."
            }
            StageErrorKind::UpstreamAuthError => {
                "The content generation service rejected our credentials. Contact support."
            }
            StageErrorKind::UpstreamError => {
                "The content generation service failed. Please resume the campaign."
            }
            StageErrorKind::Timeout => {
                "The content generation service took too long. Please resume the campaign."
            }
            StageErrorKind::ParseError => {
                "The generated output could not be understood. Please resume the campaign."
            }
        }
    }
}

impl std::fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GenerationError {
    #[must_use]
    pub fn kind(&self) -> StageErrorKind {
        match self {
            GenerationError::MissingApiKey => StageErrorKind::ConfigError,
            GenerationError::RateLimited(_) => StageErrorKind::UpstreamRateLimited,
            GenerationError::PaymentRequired(_) => StageErrorKind::UpstreamPaymentRequired,
            GenerationError::Unauthorized { .. } => StageErrorKind::UpstreamAuthError,
            GenerationError::Http(e) if e.is_timeout() => StageErrorKind::Timeout,
            GenerationError::Timeout(_) => StageErrorKind::Timeout,
            GenerationError::Http(_)
            | GenerationError::Upstream { .. }
            | GenerationError::EmptyResponse => StageErrorKind::UpstreamError,
            GenerationError::Deserialize { .. } | GenerationError::Parse(_) => {
                StageErrorKind::ParseError
            }
        }
    }
}
