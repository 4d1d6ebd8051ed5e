//! Batched fetch-and-analyse over a list of candidate sources.
//!
//! Sources are processed in fixed-size batches: concurrently within a batch,
//! sequentially across batches, with a pause in between to stay under the
//! scraper's rate limits. A failure is confined to its own source.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use quillcast_core::SourceStatus;
use quillcast_generation::{SourceCandidate, SourceInsights, SourceResult};

use crate::client::PageFetcher;
use crate::error::SourceError;

/// Pages with less main content than this are not worth analysing.
pub const MIN_CONTENT_CHARS: usize = 100;
/// Excerpt kept when the page was fetched but analysis failed.
pub const PARTIAL_EXCERPT_CHARS: usize = 1_000;
/// Excerpt kept alongside successful analysis.
pub const SUCCESS_EXCERPT_CHARS: usize = 4_000;

pub const INSUFFICIENT_CONTENT: &str = "insufficient content";

/// Produces insights for one fetched page.
#[async_trait]
pub trait SourceAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        url: &str,
        content: &str,
        keyword_context: &str,
    ) -> Result<SourceInsights, SourceError>;
}

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pause: Duration::from_millis(1_000),
        }
    }
}

/// Drop candidates whose URL is not absolute http(s), and repeats of a URL
/// already seen. Kept URLs are trimmed; order is otherwise preserved.
#[must_use]
pub fn usable_candidates(candidates: &[SourceCandidate]) -> Vec<SourceCandidate> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .map(|c| SourceCandidate {
            url: c.url.trim().to_string(),
            ..c.clone()
        })
        .filter(|c| {
            reqwest::Url::parse(&c.url)
                .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        })
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

/// Fetch and analyse every source. The result has one entry per input, in
/// input order; callers decide whether enough of them are usable.
pub async fn fetch_and_analyze_sources<F, A>(
    fetcher: &F,
    analyzer: &A,
    sources: &[SourceCandidate],
    keyword_context: &str,
    config: &BatchConfig,
) -> Vec<SourceResult>
where
    F: PageFetcher + ?Sized,
    A: SourceAnalyzer + ?Sized,
{
    let batch_size = config.batch_size.max(1);
    let mut results = Vec::with_capacity(sources.len());

    for (index, batch) in sources.chunks(batch_size).enumerate() {
        if index > 0 && !config.batch_pause.is_zero() {
            tokio::time::sleep(config.batch_pause).await;
        }
        tracing::debug!(batch = index, size = batch.len(), "processing source batch");

        let outcomes = join_all(
            batch
                .iter()
                .map(|candidate| process_source(fetcher, analyzer, candidate, keyword_context)),
        )
        .await;
        results.extend(outcomes);
    }

    let usable = results.iter().filter(|r| r.status.is_usable()).count();
    tracing::info!(total = results.len(), usable, "source acquisition finished");
    results
}

async fn process_source<F, A>(
    fetcher: &F,
    analyzer: &A,
    candidate: &SourceCandidate,
    keyword_context: &str,
) -> SourceResult
where
    F: PageFetcher + ?Sized,
    A: SourceAnalyzer + ?Sized,
{
    let candidate_title = Some(candidate.title.clone()).filter(|t| !t.trim().is_empty());
    let mut result = SourceResult {
        url: candidate.url.clone(),
        title: candidate_title,
        description: None,
        status: SourceStatus::Pending,
        content_excerpt: None,
        insights: None,
        error: None,
    };

    let page = match fetcher.fetch(&candidate.url).await {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!(url = %candidate.url, error = %e, "source fetch failed");
            result.status = SourceStatus::Failed;
            result.error = Some(e.to_string());
            return result;
        }
    };

    if page.title.is_some() {
        result.title = page.title;
    }
    result.description = page.description;

    let content = page.markdown.trim();
    if content.chars().count() < MIN_CONTENT_CHARS {
        result.status = SourceStatus::Failed;
        result.error = Some(INSUFFICIENT_CONTENT.to_string());
        return result;
    }

    match analyzer.analyze(&candidate.url, content, keyword_context).await {
        Ok(insights) => {
            result.status = SourceStatus::Success;
            result.content_excerpt = Some(excerpt(content, SUCCESS_EXCERPT_CHARS));
            result.insights = Some(insights);
        }
        Err(e) => {
            tracing::warn!(url = %candidate.url, error = %e, "source analysis failed, keeping excerpt");
            result.status = SourceStatus::Partial;
            result.content_excerpt = Some(excerpt(content, PARTIAL_EXCERPT_CHARS));
            result.error = Some(e.to_string());
        }
    }
    result
}

fn excerpt(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> SourceCandidate {
        SourceCandidate {
            url: url.to_string(),
            title: String::new(),
            reason: String::new(),
        }
    }

    #[test]
    fn usable_candidates_filters_and_dedupes() {
        let kept = usable_candidates(&[
            candidate("https://a.example/guide"),
            candidate("not a url"),
            candidate("ftp://files.example/x"),
            candidate("https://a.example/guide"),
            candidate("http://b.example"),
        ]);
        let urls: Vec<&str> = kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/guide", "http://b.example"]);
    }

    #[test]
    fn kept_urls_are_trimmed_before_dedup() {
        let kept = usable_candidates(&[
            candidate("  https://a.example/guide\n"),
            candidate("https://a.example/guide"),
            candidate("\thttps://b.example/science "),
        ]);
        let urls: Vec<&str> = kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/guide", "https://b.example/science"]);
    }

    #[test]
    fn excerpt_counts_chars() {
        assert_eq!(excerpt("ééé", 2), "éé");
    }
}
