//! End-to-end stage runs over the in-memory store with a scripted generator
//! and fetcher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quillcast_billing::StageEstimates;
use quillcast_core::{ArticleLength, CampaignStatus, PricingTable, Stage, TokenUsage};
use quillcast_db::{ArticleStore, CampaignStore, LedgerStore, MemoryStore};
use quillcast_generation::{Completion, CompletionRequest, GenerationError, Generator, ProcessorConfig};
use quillcast_pipeline::{
    Orchestrator, PipelineConfig, PipelineError, QuickSetup, RunOutcome, StageResult,
    SOURCE_FETCH_ERROR,
};
use quillcast_sources::{BatchConfig, PageFetcher, ScrapedPage, SourceError};
use rust_decimal::Decimal;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Replies with queued contents in order; errors once the queue is empty.
#[derive(Default)]
struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    delay: Mutex<Duration>,
}

impl ScriptedGenerator {
    fn push(&self, content: impl Into<String>) {
        self.responses.lock().unwrap().push_back(content.into());
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.map(|content| Completion {
            content,
            model: "openai/gpt-4o-mini".to_string(),
            usage: TokenUsage::new(100, 50),
        })
        .ok_or(GenerationError::EmptyResponse)
    }
}

struct StaticFetcher {
    fail: bool,
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage, SourceError> {
        if self.fail {
            return Err(SourceError::UnexpectedStatus {
                status: 503,
                url: url.to_string(),
            });
        }
        Ok(ScrapedPage {
            url: url.to_string(),
            markdown: "Cold brew is coffee steeped in cold water for twelve hours or more. ".repeat(5),
            title: Some(format!("Page at {url}")),
            description: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Scripted stage outputs
// ---------------------------------------------------------------------------

const KEYWORDS: &str =
    r#"{"keywords":[{"keyword":"cold brew ratio","intent":"informational","priority":"high"}]}"#;
const STRATEGY: &str = r#"{"search_terms":["cold brew ratio"],"articles":[{"title":"Cold Brew Ratios","primary_keyword":"cold brew ratio","secondary_keywords":["concentrate"],"angle":"practical"}]}"#;
const CANDIDATES: &str = r#"{"sources":[{"url":"https://a.example/guide","title":"Guide","reason":"thorough"},{"url":"https://b.example/science","title":"Science","reason":"data"}]}"#;
const INSIGHTS: &str = r#"{"topics":["ratios"],"key_insights":["1:8 is a good start"],"content_angles":["beginner"],"relevance_score":8}"#;
const DRAFT: &str = r#"{"title":"Cold Brew Ratios","outline":{"sections":[{"heading":"Basics","points":["1:8"]}]},"html_content":"<h2>Basics</h2><p>Use 1:8.</p>","meta_description":"Ratios.","keywords":["cold brew ratio"]}"#;
const HUMANIZED: &str = r#"{"voice_profile":{"tone":"warm"},"title":"Cold Brew Ratios","html_content":"<p>Honestly, 1:8.</p>","meta_description":"Ratios.","keywords":["cold brew ratio"]}"#;

fn reviewed() -> String {
    serde_json::json!({
        "title": "Cold Brew Ratios",
        "html_content": "<p>Honestly, 1:8 is all you need.</p>",
        "meta_description": "m".repeat(200),
        "keywords": ["cold brew ratio", "cold brew"],
        "review_notes": ["tightened intro"]
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<MemoryStore>,
    generator: Arc<ScriptedGenerator>,
    orchestrator: Orchestrator,
    user_id: Uuid,
}

fn config(estimates: StageEstimates) -> PipelineConfig {
    PipelineConfig {
        processor: ProcessorConfig {
            max_retries: 0,
            backoff_base_ms: 0,
            call_timeout: Duration::from_secs(5),
        },
        batch: BatchConfig {
            batch_size: 3,
            batch_pause: Duration::ZERO,
        },
        estimates,
        ..PipelineConfig::new("openai/gpt-4o-mini")
    }
}

async fn harness(balance: Decimal, estimates: StageEstimates, fetch_fails: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(ScriptedGenerator::default());
    let user_id = Uuid::new_v4();
    store
        .credit(user_id, balance, "test", serde_json::json!({}))
        .await
        .unwrap();
    let orchestrator = Orchestrator::new(
        store.clone(),
        generator.clone(),
        Arc::new(StaticFetcher { fail: fetch_fails }),
        PricingTable::default(),
        config(estimates),
    );
    Harness {
        store,
        generator,
        orchestrator,
        user_id,
    }
}

fn setup(user_id: Uuid) -> QuickSetup {
    QuickSetup {
        user_id,
        brand_id: Uuid::new_v4(),
        website_url: "https://brew.example".to_string(),
        brand_context: "Small-batch roaster".to_string(),
        country: "US".to_string(),
        language: "en".to_string(),
        keywords: vec!["cold brew".to_string()],
        target_articles: 1,
        article_length: ArticleLength::Medium,
    }
}

fn script_through_sources(generator: &ScriptedGenerator) {
    generator.push(KEYWORDS);
    generator.push(STRATEGY);
    generator.push(CANDIDATES);
    generator.push(INSIGHTS);
    generator.push(INSIGHTS);
}

async fn run_next(h: &Harness, id: Uuid) -> StageResult {
    match h.orchestrator.run_next_stage(id).await.unwrap() {
        RunOutcome::Ran(report) => report.result,
        RunOutcome::Completed(_) => panic!("nothing left to run"),
    }
}

fn assert_succeeded(result: &StageResult) {
    assert!(
        matches!(result, StageResult::Succeeded { .. }),
        "expected success, got {result:?}"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_run_completes_only_after_review() {
    let h = harness(Decimal::TEN, StageEstimates::default(), false).await;
    let campaign = h.orchestrator.create_campaign(&setup(h.user_id)).await.unwrap();
    assert_eq!(campaign.status().unwrap(), CampaignStatus::KeywordResearch);
    assert_eq!(campaign.progress, 0);

    script_through_sources(&h.generator);
    h.generator.push(DRAFT);
    h.generator.push(HUMANIZED);
    h.generator.push(reviewed());

    let mut article_id = None;
    for stage in Stage::ALL {
        let current = h.orchestrator.campaign(campaign.id).await.unwrap();
        assert_ne!(current.status().unwrap(), CampaignStatus::Completed);
        assert_eq!(current.current_stage().unwrap(), Some(stage));

        let result = run_next(&h, campaign.id).await;
        assert_succeeded(&result);
        if let StageResult::Succeeded { article_id: id, .. } = result {
            article_id = article_id.or(id);
        }
    }

    let done = h.orchestrator.campaign(campaign.id).await.unwrap();
    assert_eq!(done.status().unwrap(), CampaignStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.current_stage().unwrap(), None);
    assert_eq!(
        h.store.successful_stages(campaign.id).await.unwrap(),
        Stage::ALL.to_vec()
    );

    let article = h
        .store
        .get_article(article_id.expect("review creates the article"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.meta_description.chars().count(), 160);
    assert!(article.meta_description.ends_with("..."));
    assert_eq!(article.campaign_id, Some(campaign.id));

    let sources = h.store.list_sources(campaign.id).await.unwrap();
    assert_eq!(sources.len(), 2);

    // two analyses plus six stage calls, all charged
    assert_eq!(h.generator.calls(), 8);
    assert!(h.store.balance(h.user_id).await.unwrap() < Decimal::TEN);

    assert!(matches!(
        h.orchestrator.run_next_stage(campaign.id).await,
        Err(PipelineError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn resume_after_writing_failure_runs_only_writing() {
    let h = harness(Decimal::TEN, StageEstimates::default(), false).await;
    let campaign = h.orchestrator.create_campaign(&setup(h.user_id)).await.unwrap();

    script_through_sources(&h.generator);
    for _ in 0..3 {
        assert_succeeded(&run_next(&h, campaign.id).await);
    }

    // unparseable twice: the original call and the stricter re-prompt
    h.generator.push("I cannot produce JSON today.");
    h.generator.push("Still no JSON, sorry.");
    let failed = run_next(&h, campaign.id).await;
    assert!(matches!(failed, StageResult::Failed { ref kind, .. } if kind == "parse_error"));

    let after_failure = h.orchestrator.campaign(campaign.id).await.unwrap();
    assert_eq!(after_failure.status().unwrap(), CampaignStatus::Failed);
    assert_eq!(after_failure.current_stage().unwrap(), Some(Stage::Writing));
    assert!(after_failure.error_message.is_some());
    assert_eq!(after_failure.progress, 50);

    let calls_before = h.generator.calls();
    h.generator.push(DRAFT);
    let resumed = h.orchestrator.resume(campaign.id).await.unwrap();
    let RunOutcome::Ran(report) = resumed else {
        panic!("resume should run a stage");
    };
    assert_eq!(report.stage, Stage::Writing);
    assert_succeeded(&report.result);
    assert_eq!(h.generator.calls() - calls_before, 1);

    assert_eq!(report.campaign.status().unwrap(), CampaignStatus::Humanization);
    assert!(report.campaign.error_message.is_none());

    let artifacts = h.store.list_artifacts(campaign.id).await.unwrap();
    let count = |stage: Stage| artifacts.iter().filter(|a| a.stage == stage.as_str()).count();
    assert_eq!(count(Stage::KeywordResearch), 1);
    assert_eq!(count(Stage::ContentStrategy), 1);
    assert_eq!(count(Stage::SourceDiscovery), 1);
    assert_eq!(count(Stage::Writing), 2);
}

#[tokio::test]
async fn rerun_appends_a_new_version_without_moving_status() {
    let h = harness(Decimal::TEN, StageEstimates::default(), false).await;
    let campaign = h.orchestrator.create_campaign(&setup(h.user_id)).await.unwrap();

    h.generator.push(KEYWORDS);
    h.generator.push(
        r#"{"keywords":[{"keyword":"cold brew concentrate","intent":"commercial","priority":"medium"}]}"#,
    );
    assert_succeeded(&run_next(&h, campaign.id).await);
    let first = h
        .store
        .latest_successful_artifact(campaign.id, Stage::KeywordResearch)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        h.orchestrator
            .run_stage(campaign.id, Stage::KeywordResearch, false)
            .await,
        Err(PipelineError::StageAlreadySucceeded(Stage::KeywordResearch))
    ));

    let rerun = h
        .orchestrator
        .run_stage(campaign.id, Stage::KeywordResearch, true)
        .await
        .unwrap();
    assert!(matches!(rerun.result, StageResult::Succeeded { version: 2, .. }));
    assert_eq!(rerun.campaign.status().unwrap(), CampaignStatus::ContentStrategy);
    assert_eq!(rerun.campaign.progress, 16);

    let versions: Vec<_> = h
        .store
        .list_artifacts(campaign.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.stage == Stage::KeywordResearch.as_str())
        .collect();
    assert_eq!(versions.len(), 2);
    let v1 = versions.iter().find(|a| a.version == 1).expect("version 1 kept");
    assert_eq!(v1.id, first.id);
    assert_eq!(v1.payload, first.payload);
    assert_eq!(v1.raw_response, first.raw_response);

    let latest = h
        .store
        .latest_successful_artifact(campaign.id, Stage::KeywordResearch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, 2);
    assert_ne!(latest.payload, first.payload);
}

#[tokio::test]
async fn insufficient_balance_makes_no_generation_call() {
    let h = harness(
        Decimal::new(2, 2),
        StageEstimates::uniform(Decimal::new(5, 2)),
        false,
    )
    .await;
    let campaign = h.orchestrator.create_campaign(&setup(h.user_id)).await.unwrap();
    h.generator.push(KEYWORDS);

    let err = h.orchestrator.run_next_stage(campaign.id).await.unwrap_err();
    match err {
        PipelineError::InsufficientBalance {
            current_balance,
            required,
        } => {
            assert_eq!(current_balance, Decimal::new(2, 2));
            assert_eq!(required, Decimal::new(5, 2));
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }
    assert_eq!(h.generator.calls(), 0);

    let after = h.orchestrator.campaign(campaign.id).await.unwrap();
    assert_eq!(after.status().unwrap(), CampaignStatus::Failed);
    assert!(after.error_message.unwrap().contains("0.02"));
    assert!(h.store.list_artifacts(campaign.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn every_failed_fetch_fails_source_discovery() {
    let h = harness(Decimal::TEN, StageEstimates::default(), true).await;
    let campaign = h.orchestrator.create_campaign(&setup(h.user_id)).await.unwrap();

    h.generator.push(KEYWORDS);
    h.generator.push(STRATEGY);
    h.generator.push(CANDIDATES);
    assert_succeeded(&run_next(&h, campaign.id).await);
    assert_succeeded(&run_next(&h, campaign.id).await);

    let result = run_next(&h, campaign.id).await;
    assert!(matches!(result, StageResult::Failed { ref kind, .. } if kind == SOURCE_FETCH_ERROR));

    let sources = h.store.list_sources(campaign.id).await.unwrap();
    assert_eq!(sources.len(), 2);
    assert!(sources.iter().all(|s| s.status == "failed"));

    let after = h.orchestrator.campaign(campaign.id).await.unwrap();
    assert_eq!(after.status().unwrap(), CampaignStatus::Failed);
    assert_eq!(after.current_stage().unwrap(), Some(Stage::SourceDiscovery));
}

#[tokio::test]
async fn stages_cannot_be_skipped_and_failed_campaigns_wait_for_resume() {
    let h = harness(Decimal::TEN, StageEstimates::default(), false).await;
    let campaign = h.orchestrator.create_campaign(&setup(h.user_id)).await.unwrap();

    assert!(matches!(
        h.orchestrator.run_stage(campaign.id, Stage::Writing, false).await,
        Err(PipelineError::InvalidTransition { .. })
    ));

    let failed = h
        .orchestrator
        .mark_failed(campaign.id, "brand asked to pause")
        .await
        .unwrap();
    assert_eq!(failed.status().unwrap(), CampaignStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("brand asked to pause"));

    assert!(matches!(
        h.orchestrator.run_next_stage(campaign.id).await,
        Err(PipelineError::InvalidTransition { .. })
    ));
    assert_eq!(h.generator.calls(), 0);

    h.generator.push(KEYWORDS);
    let resumed = h.orchestrator.resume(campaign.id).await.unwrap();
    assert!(matches!(resumed, RunOutcome::Ran(ref r) if r.stage == Stage::KeywordResearch));
}

#[tokio::test]
async fn operator_abort_is_not_undone_by_a_running_stage() {
    let h = harness(Decimal::TEN, StageEstimates::default(), false).await;
    let campaign = h.orchestrator.create_campaign(&setup(h.user_id)).await.unwrap();
    h.generator.set_delay(Duration::from_millis(200));
    h.generator.push(KEYWORDS);

    let (report, aborted) = tokio::join!(
        h.orchestrator
            .run_stage(campaign.id, Stage::KeywordResearch, false),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.orchestrator
                .mark_failed(campaign.id, "brand asked to pause")
                .await
        }
    );
    assert_eq!(aborted.unwrap().status().unwrap(), CampaignStatus::Failed);

    // the finished call is kept as an artifact but does not move the campaign
    let report = report.unwrap();
    assert_succeeded(&report.result);
    assert_eq!(report.campaign.status().unwrap(), CampaignStatus::Failed);

    let after = h.orchestrator.campaign(campaign.id).await.unwrap();
    assert_eq!(after.status().unwrap(), CampaignStatus::Failed);
    assert_eq!(after.error_message.as_deref(), Some("brand asked to pause"));
    assert_eq!(
        h.store.successful_stages(campaign.id).await.unwrap(),
        vec![Stage::KeywordResearch]
    );

    assert!(matches!(
        h.orchestrator.run_next_stage(campaign.id).await,
        Err(PipelineError::InvalidTransition { .. })
    ));

    h.generator.set_delay(Duration::ZERO);
    h.generator.push(STRATEGY);
    let resumed = h.orchestrator.resume(campaign.id).await.unwrap();
    assert!(matches!(resumed, RunOutcome::Ran(ref r) if r.stage == Stage::ContentStrategy));
}

#[tokio::test]
async fn plan_next_stage_calls_nothing() {
    let h = harness(Decimal::TEN, StageEstimates::default(), false).await;
    let campaign = h.orchestrator.create_campaign(&setup(h.user_id)).await.unwrap();

    assert_eq!(
        h.orchestrator.plan_next_stage(campaign.id).await.unwrap(),
        Some(Stage::KeywordResearch)
    );
    assert_eq!(h.generator.calls(), 0);
    assert!(matches!(
        h.orchestrator.plan_next_stage(Uuid::new_v4()).await,
        Err(PipelineError::NotFound(_))
    ));
}
