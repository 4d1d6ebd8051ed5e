//! Article and CMS-sync vocabulary.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Hard cap on stored meta descriptions, in characters.
pub const MAX_META_DESCRIPTION_LEN: usize = 160;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    Published,
    SyncError,
}

impl ArticleStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Published => "published",
            ArticleStatus::SyncError => "sync_error",
        }
    }
}

impl std::fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ArticleStatus::Draft),
            "published" => Ok(ArticleStatus::Published),
            "sync_error" => Ok(ArticleStatus::SyncError),
            _ => Err(CoreError::InvalidArticleStatus(s.to_string())),
        }
    }
}

/// External CMS an article can be distributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Wordpress,
    Shopify,
}

impl Platform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Wordpress => "wordpress",
            Platform::Shopify => "shopify",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wordpress" => Ok(Platform::Wordpress),
            "shopify" => Ok(Platform::Shopify),
            _ => Err(CoreError::InvalidPlatform(s.to_string())),
        }
    }
}

/// Per-(article, platform) distribution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    SyncError,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::SyncError => "sync_error",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "sync_error" => Ok(SyncStatus::SyncError),
            _ => Err(CoreError::InvalidSyncStatus(s.to_string())),
        }
    }
}

/// Clamp a generated meta description to [`MAX_META_DESCRIPTION_LEN`]
/// characters, replacing the overflow with `"..."`.
///
/// Counts characters rather than bytes so multi-byte text is never split.
#[must_use]
pub fn truncate_meta_description(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MAX_META_DESCRIPTION_LEN {
        return trimmed.to_string();
    }
    let keep = MAX_META_DESCRIPTION_LEN - ELLIPSIS.len();
    let mut out: String = trimmed.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_hundred_chars_truncate_to_157_plus_ellipsis() {
        let raw = "a".repeat(200);
        let out = truncate_meta_description(&raw);
        assert_eq!(out.chars().count(), 160);
        assert!(out.ends_with("..."));
        assert_eq!(&out[..157], "a".repeat(157));
    }

    #[test]
    fn short_descriptions_are_kept() {
        assert_eq!(truncate_meta_description("  Fresh cold brew.  "), "Fresh cold brew.");
        let exact = "b".repeat(160);
        assert_eq!(truncate_meta_description(&exact), exact);
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let raw = "é".repeat(170);
        let out = truncate_meta_description(&raw);
        assert_eq!(out.chars().count(), 160);
    }

    #[test]
    fn platform_and_status_parse() {
        assert_eq!("shopify".parse::<Platform>(), Ok(Platform::Shopify));
        assert!("ghost".parse::<Platform>().is_err());
        assert_eq!("sync_error".parse::<SyncStatus>(), Ok(SyncStatus::SyncError));
        assert_eq!("published".parse::<ArticleStatus>(), Ok(ArticleStatus::Published));
    }
}
