use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Fetch/analysis outcome for one research source.
///
/// `Partial` means the page was fetched but the analysis sub-call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Pending,
    Success,
    Partial,
    Failed,
}

impl SourceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Success => "success",
            SourceStatus::Partial => "partial",
            SourceStatus::Failed => "failed",
        }
    }

    /// Whether the source contributes content to aggregation.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, SourceStatus::Success | SourceStatus::Partial)
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SourceStatus::Pending),
            "success" => Ok(SourceStatus::Success),
            "partial" => Ok(SourceStatus::Partial),
            "failed" => Ok(SourceStatus::Failed),
            _ => Err(CoreError::InvalidSourceStatus(s.to_string())),
        }
    }
}
