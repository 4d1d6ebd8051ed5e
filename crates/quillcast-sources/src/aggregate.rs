//! Merge per-source insights into one research strategy.

use std::collections::HashSet;

use quillcast_generation::{AggregatedStrategy, SourceResult};

const MAX_TOPICS: usize = 15;
const MAX_INSIGHTS: usize = 20;
const MAX_ANGLES: usize = 10;

/// Merge usable sources, most relevant first.
///
/// Entries are deduplicated case-insensitively; the first (most relevant)
/// spelling wins. `source_count` counts every usable source, including
/// partial ones without insights; `average_relevance` averages only the
/// analysed ones.
#[must_use]
pub fn aggregate_sources(results: &[SourceResult]) -> AggregatedStrategy {
    let usable: Vec<&SourceResult> = results.iter().filter(|r| r.status.is_usable()).collect();

    let mut analysed: Vec<_> = usable.iter().filter_map(|r| r.insights.as_ref()).collect();
    // Stable sort keeps input order among equal scores.
    analysed.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));

    let average_relevance = if analysed.is_empty() {
        0.0
    } else {
        let sum: u32 = analysed.iter().map(|i| u32::from(i.relevance_score)).sum();
        f64::from(sum) / f64::from(u32::try_from(analysed.len()).unwrap_or(u32::MAX))
    };

    AggregatedStrategy {
        topics: merge(analysed.iter().map(|i| &i.topics), MAX_TOPICS),
        key_insights: merge(analysed.iter().map(|i| &i.key_insights), MAX_INSIGHTS),
        content_angles: merge(analysed.iter().map(|i| &i.content_angles), MAX_ANGLES),
        source_count: usable.len(),
        average_relevance,
    }
}

fn merge<'a>(lists: impl Iterator<Item = &'a Vec<String>>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for item in lists.flatten() {
        let trimmed = item.trim();
        if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
            continue;
        }
        merged.push(trimmed.to_string());
        if merged.len() == cap {
            break;
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillcast_core::SourceStatus;
    use quillcast_generation::SourceInsights;

    fn result(status: SourceStatus, insights: Option<(u8, &[&str])>) -> SourceResult {
        SourceResult {
            url: "https://example.com".to_string(),
            title: None,
            description: None,
            status,
            content_excerpt: None,
            insights: insights.map(|(score, topics)| SourceInsights {
                topics: topics.iter().map(ToString::to_string).collect(),
                key_insights: vec![],
                content_angles: vec![],
                relevance_score: score,
            }),
            error: None,
        }
    }

    #[test]
    fn merges_by_relevance_and_dedupes_case_insensitively() {
        let results = vec![
            result(SourceStatus::Success, Some((4, &["Steeping", "Grind size"]))),
            result(SourceStatus::Success, Some((9, &["steeping", "Nitro"]))),
            result(SourceStatus::Failed, None),
            result(SourceStatus::Partial, None),
        ];
        let agg = aggregate_sources(&results);
        assert_eq!(agg.topics, vec!["steeping", "Nitro", "Grind size"]);
        assert_eq!(agg.source_count, 3);
        assert!((agg.average_relevance - 6.5).abs() < f64::EPSILON);
    }

    #[test]
    fn nothing_usable_is_empty() {
        let agg = aggregate_sources(&[result(SourceStatus::Failed, None)]);
        assert_eq!(agg, AggregatedStrategy::default());
    }
}
