//! Batch runner tests: a wiremock scraper plus scripted analyzers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quillcast_core::SourceStatus;
use quillcast_generation::{SourceCandidate, SourceInsights};
use quillcast_sources::{
    fetch_and_analyze_sources, BatchConfig, PageFetcher, ScrapeClient, ScrapedPage,
    SourceAnalyzer, SourceError, INSUFFICIENT_CONTENT,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedAnalyzer;

#[async_trait]
impl SourceAnalyzer for FixedAnalyzer {
    async fn analyze(
        &self,
        _url: &str,
        _content: &str,
        _keyword_context: &str,
    ) -> Result<SourceInsights, SourceError> {
        Ok(SourceInsights {
            topics: vec!["cold brew".to_string()],
            key_insights: vec!["Steep 12-18 hours".to_string()],
            content_angles: vec![],
            relevance_score: 8,
        })
    }
}

struct FailingAnalyzer;

#[async_trait]
impl SourceAnalyzer for FailingAnalyzer {
    async fn analyze(
        &self,
        _url: &str,
        _content: &str,
        _keyword_context: &str,
    ) -> Result<SourceInsights, SourceError> {
        Err(SourceError::Analysis("parse_error".to_string()))
    }
}

fn candidate(url: String) -> SourceCandidate {
    SourceCandidate {
        url,
        title: "Candidate".to_string(),
        reason: "relevant".to_string(),
    }
}

fn scrape_ok(markdown: &str, title: &str) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "data": {
            "markdown": markdown,
            "metadata": { "title": title, "description": "desc" }
        }
    })
}

fn no_pause() -> BatchConfig {
    BatchConfig {
        batch_size: 3,
        batch_pause: Duration::ZERO,
    }
}

#[tokio::test]
async fn three_sources_fail_independently_in_input_order() {
    let server = MockServer::start().await;
    let long_body = "Cold brew coffee is brewed with cold water over many hours. ".repeat(10);

    Mock::given(method("POST"))
        .and(path("/scrape"))
        .and(body_partial_json(serde_json::json!({ "url": "https://a.example/404" })))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .and(body_partial_json(serde_json::json!({ "url": "https://b.example/short" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(scrape_ok("Too short.", "Short")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scrape"))
        .and(header("authorization", "Bearer scrape-key"))
        .and(body_partial_json(serde_json::json!({
            "url": "https://c.example/guide",
            "formats": ["markdown"],
            "onlyMainContent": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(scrape_ok(&long_body, "Guide")))
        .mount(&server)
        .await;

    let client = ScrapeClient::with_base_url(Some("scrape-key"), 5, &server.uri()).unwrap();
    let sources = vec![
        candidate("https://a.example/404".to_string()),
        candidate("https://b.example/short".to_string()),
        candidate("https://c.example/guide".to_string()),
    ];

    let results =
        fetch_and_analyze_sources(&client, &FixedAnalyzer, &sources, "cold brew", &no_pause())
            .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].url, "https://a.example/404");
    assert_eq!(results[0].status, SourceStatus::Failed);
    assert!(results[0].error.as_deref().unwrap().contains("404"));

    assert_eq!(results[1].status, SourceStatus::Failed);
    assert_eq!(results[1].error.as_deref(), Some(INSUFFICIENT_CONTENT));

    assert_eq!(results[2].status, SourceStatus::Success);
    assert_eq!(results[2].title.as_deref(), Some("Guide"));
    assert_eq!(results[2].insights.as_ref().unwrap().relevance_score, 8);
    assert!(results[2].content_excerpt.is_some());
}

#[tokio::test]
async fn analysis_failure_keeps_short_excerpt_as_partial() {
    let server = MockServer::start().await;
    let long_body = "x".repeat(5_000);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(scrape_ok(&long_body, "Long")))
        .mount(&server)
        .await;

    let client = ScrapeClient::with_base_url(Some("k"), 5, &server.uri()).unwrap();
    let sources = vec![candidate("https://a.example/long".to_string())];

    let partial =
        fetch_and_analyze_sources(&client, &FailingAnalyzer, &sources, "", &no_pause()).await;
    assert_eq!(partial[0].status, SourceStatus::Partial);
    assert_eq!(partial[0].content_excerpt.as_ref().unwrap().len(), 1_000);
    assert!(partial[0].insights.is_none());

    let full = fetch_and_analyze_sources(&client, &FixedAnalyzer, &sources, "", &no_pause()).await;
    assert_eq!(full[0].content_excerpt.as_ref().unwrap().len(), 4_000);
}

#[tokio::test]
async fn scraper_reported_failure_is_failed_source() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "error": "blocked by robots.txt"
        })))
        .mount(&server)
        .await;

    let client = ScrapeClient::with_base_url(Some("k"), 5, &server.uri()).unwrap();
    let results = fetch_and_analyze_sources(
        &client,
        &FixedAnalyzer,
        &[candidate("https://a.example".to_string())],
        "",
        &no_pause(),
    )
    .await;
    assert_eq!(results[0].status, SourceStatus::Failed);
    assert!(results[0].error.as_deref().unwrap().contains("robots"));
}

#[tokio::test]
async fn missing_scraper_key_fails_every_source_without_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = ScrapeClient::with_base_url(None, 5, &server.uri()).unwrap();
    let results = fetch_and_analyze_sources(
        &client,
        &FixedAnalyzer,
        &[candidate("https://a.example".to_string())],
        "",
        &no_pause(),
    )
    .await;
    assert_eq!(results[0].status, SourceStatus::Failed);
}

/// Records the highest number of fetches in flight at once.
struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl PageFetcher for ConcurrencyProbe {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ScrapedPage {
            url: url.to_string(),
            markdown: "m".repeat(200),
            title: None,
            description: None,
        })
    }
}

#[tokio::test]
async fn batches_bound_concurrency_and_keep_order() {
    let probe = Arc::new(ConcurrencyProbe {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let sources: Vec<SourceCandidate> = (0..7)
        .map(|i| candidate(format!("https://s{i}.example")))
        .collect();

    let results = fetch_and_analyze_sources(
        probe.as_ref(),
        &FixedAnalyzer,
        &sources,
        "",
        &BatchConfig {
            batch_size: 3,
            batch_pause: Duration::from_millis(5),
        },
    )
    .await;

    assert_eq!(probe.peak.load(Ordering::SeqCst), 3);
    let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
    let expected: Vec<String> = (0..7).map(|i| format!("https://s{i}.example")).collect();
    assert_eq!(urls, expected);
    assert!(results.iter().all(|r| r.status == SourceStatus::Success));
}
