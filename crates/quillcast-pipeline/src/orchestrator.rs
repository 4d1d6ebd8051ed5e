//! Drives campaigns through their stages.
//!
//! Each stage run is: check the transition, gate on the estimated cost,
//! build the typed input from the previous stage's stored payload, call the
//! processor, charge the accepted call, persist the artifact, and only then
//! move the campaign forward.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use quillcast_billing::{Charge, ChargeContext, QuotaGate, StageEstimates};
use quillcast_core::{AppConfig, CampaignStatus, PricingTable, Stage, TokenUsage};
use quillcast_db::{
    ArticleStore, CampaignRow, CampaignStore, CampaignUpdate, NewArticle, NewSource,
    NewStageArtifact, Store,
};
use quillcast_generation::{
    CampaignContext, ContentStrategy, Generator, ModelConfig, ProcessorConfig, ResearchContext,
    ReviewedArticle, StageInput, StageOutcome, StagePayload, StageProcessor,
};
use quillcast_sources::{
    aggregate_sources, fetch_and_analyze_sources, usable_candidates, BatchConfig, PageFetcher,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::analyzer::MeteredAnalyzer;
use crate::error::PipelineError;
use crate::setup::QuickSetup;
use crate::state::{
    check_can_fail, check_can_run, next_stage, progress, status_after_success, status_for_resume,
};

/// Error kind stored when source discovery yields no usable page.
pub const SOURCE_FETCH_ERROR: &str = "source_fetch_error";

const SOURCE_FETCH_USER_MESSAGE: &str =
    "None of the research sources could be fetched. Please resume the campaign.";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub model: ModelConfig,
    pub processor: ProcessorConfig,
    pub batch: BatchConfig,
    pub estimates: StageEstimates,
}

impl PipelineConfig {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: ModelConfig::new(model),
            processor: ProcessorConfig::default(),
            batch: BatchConfig::default(),
            estimates: StageEstimates::default(),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            model: ModelConfig::new(config.generation_model.clone()),
            processor: ProcessorConfig {
                max_retries: config.generation_max_retries,
                backoff_base_ms: config.generation_backoff_base_ms,
                call_timeout: std::time::Duration::from_secs(config.generation_timeout_secs),
            },
            batch: BatchConfig {
                batch_size: config.source_batch_size,
                batch_pause: std::time::Duration::from_millis(config.source_batch_pause_ms),
            },
            estimates: StageEstimates::default(),
        }
    }
}

/// How a stage run ended. Either way the attempt is persisted as an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Succeeded {
        version: i32,
        /// Set when a review run produced the campaign's article.
        article_id: Option<Uuid>,
    },
    Failed {
        kind: String,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    pub result: StageResult,
    /// Campaign state after the run.
    pub campaign: CampaignRow,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Ran(StageReport),
    /// Nothing left to run; the campaign is completed.
    Completed(CampaignRow),
}

struct StageSuccess {
    payload: serde_json::Value,
    model: String,
    raw_response: String,
    reviewed: Option<ReviewedArticle>,
}

struct StageFault {
    kind: String,
    message: String,
    user_message: String,
    raw_response: Option<String>,
}

pub struct Orchestrator {
    campaigns: Arc<dyn CampaignStore>,
    articles: Arc<dyn ArticleStore>,
    gate: QuotaGate,
    processor: StageProcessor<Arc<dyn Generator>>,
    fetcher: Arc<dyn PageFetcher>,
    model: ModelConfig,
    batch: BatchConfig,
    running: Mutex<HashSet<Uuid>>,
}

/// Releases a campaign's run slot when dropped.
struct RunGuard<'a> {
    running: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.id);
        }
    }
}

impl Orchestrator {
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        generator: Arc<dyn Generator>,
        fetcher: Arc<dyn PageFetcher>,
        pricing: PricingTable,
        config: PipelineConfig,
    ) -> Self {
        let gate = QuotaGate::new(store.clone(), pricing).with_estimates(config.estimates);
        Self {
            campaigns: store.clone(),
            articles: store,
            gate,
            processor: StageProcessor::new(generator, config.processor),
            fetcher,
            model: config.model,
            batch: config.batch,
            running: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn gate(&self) -> &QuotaGate {
        &self.gate
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for bad input or
    /// [`PipelineError::Store`] if the insert fails.
    pub async fn create_campaign(&self, setup: &QuickSetup) -> Result<CampaignRow, PipelineError> {
        let new = setup.validate()?;
        let campaign = self.campaigns.insert_campaign(&new).await?;
        tracing::info!(
            campaign_id = %campaign.id,
            user_id = %campaign.user_id,
            keywords = campaign.keywords.len(),
            "campaign created"
        );
        Ok(campaign)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] for an unknown id.
    pub async fn campaign(&self, id: Uuid) -> Result<CampaignRow, PipelineError> {
        self.campaigns
            .get_campaign(id)
            .await?
            .ok_or(PipelineError::NotFound(id))
    }

    /// The stage `run_next_stage` would run, without running anything.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] for an unknown id.
    pub async fn plan_next_stage(&self, id: Uuid) -> Result<Option<Stage>, PipelineError> {
        let campaign = self.campaign(id).await?;
        if campaign.status()?.is_completed() {
            return Ok(None);
        }
        let successful = self.campaigns.successful_stages(id).await?;
        Ok(next_stage(&successful))
    }

    /// Run the first stage that has not succeeded yet.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::run_stage`]; additionally
    /// [`PipelineError::InvalidTransition`] for a completed campaign.
    pub async fn run_next_stage(&self, id: Uuid) -> Result<RunOutcome, PipelineError> {
        let campaign = self.campaign(id).await?;
        let status = campaign.status()?;
        let successful = self.campaigns.successful_stages(id).await?;

        match next_stage(&successful) {
            Some(stage) => Ok(RunOutcome::Ran(self.run_stage(id, stage, false).await?)),
            None if status.is_completed() => Err(PipelineError::transition(status, "next stage")),
            None => Ok(RunOutcome::Completed(self.finish(id).await?)),
        }
    }

    /// Run one stage. `rerun` allows running a stage that already succeeded;
    /// the new attempt is appended as a new artifact version.
    ///
    /// A failed attempt is persisted and fails the campaign; it is reported
    /// as [`StageResult::Failed`], not as an error.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidTransition`] / [`PipelineError::StageAlreadySucceeded`]
    ///   when the stage may not run now.
    /// - [`PipelineError::InsufficientBalance`] when the balance does not cover
    ///   the stage estimate; nothing is called and the campaign is failed.
    /// - [`PipelineError::CampaignBusy`] if another run holds the campaign.
    /// - [`PipelineError::Store`] / [`PipelineError::InvalidArtifact`] on
    ///   persistence problems.
    pub async fn run_stage(
        &self,
        id: Uuid,
        stage: Stage,
        rerun: bool,
    ) -> Result<StageReport, PipelineError> {
        let _guard = self.claim(id)?;
        self.run_claimed(id, stage, rerun).await
    }

    /// Return a failed or interrupted campaign to its next stage and run it.
    /// Stages that already succeeded are never run again.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidTransition`] for a completed campaign, plus
    /// everything [`Orchestrator::run_stage`] returns.
    pub async fn resume(&self, id: Uuid) -> Result<RunOutcome, PipelineError> {
        let _guard = self.claim(id)?;
        let campaign = self.campaign(id).await?;
        let status = campaign.status()?;
        let successful = self.campaigns.successful_stages(id).await?;
        let resumed = status_for_resume(status, &successful)?;

        let Some(stage) = resumed.stage() else {
            return Ok(RunOutcome::Completed(self.finish(id).await?));
        };
        if resumed != status || campaign.error_message.is_some() {
            self.campaigns
                .update_campaign_state(
                    id,
                    &CampaignUpdate {
                        status: resumed,
                        current_step: Some(stage),
                        progress: progress(resumed, &successful),
                        error_message: None,
                    },
                )
                .await?;
            tracing::info!(campaign_id = %id, from = %status, to = %resumed, "campaign resumed");
        }
        Ok(RunOutcome::Ran(self.run_claimed(id, stage, false).await?))
    }

    /// Operator abort. Artifacts are left untouched.
    ///
    /// Does not wait for a running stage: once the campaign is failed, that
    /// stage's result is stored but no longer moves the campaign.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Validation`] for a blank reason,
    /// [`PipelineError::InvalidTransition`] for a completed campaign.
    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<CampaignRow, PipelineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PipelineError::Validation("a reason is required".to_string()));
        }
        let campaign = self.campaign(id).await?;
        check_can_fail(campaign.status()?)?;
        let successful = self.campaigns.successful_stages(id).await?;
        let stage = campaign
            .current_stage()?
            .or_else(|| next_stage(&successful))
            .unwrap_or(Stage::Review);
        tracing::info!(campaign_id = %id, reason, "campaign marked failed by operator");
        Ok(self
            .campaigns
            .update_campaign_state(id, &failure_update(stage, &successful, reason.to_string()))
            .await?)
    }

    // -----------------------------------------------------------------------
    // internals
    // -----------------------------------------------------------------------

    async fn run_claimed(
        &self,
        id: Uuid,
        stage: Stage,
        rerun: bool,
    ) -> Result<StageReport, PipelineError> {
        let campaign = self.campaign(id).await?;
        let status = campaign.status()?;
        let successful = self.campaigns.successful_stages(id).await?;
        check_can_run(status, stage, &successful, rerun)?;

        let charge_context = ChargeContext {
            user_id: campaign.user_id,
            brand_id: Some(campaign.brand_id),
            campaign_id: Some(id),
        };
        if let Err(e) = self
            .gate
            .ensure_affordable(campaign.user_id, self.gate.estimated_cost(stage))
            .await
        {
            let err = PipelineError::from(e);
            if let PipelineError::InsufficientBalance {
                current_balance,
                required,
            } = &err
            {
                let message = format!(
                    "Insufficient balance: ${current_balance} available, ${required} required."
                );
                self.fail(id, status, stage, &successful, message).await?;
            }
            return Err(err);
        }

        let input = self.stage_input(&campaign, stage).await?;
        let started = self
            .campaigns
            .transition_campaign_state(
                id,
                status,
                &CampaignUpdate {
                    status,
                    current_step: Some(stage),
                    progress: progress(status, &successful),
                    error_message: None,
                },
            )
            .await?;
        if started.is_none() {
            let current = self.campaign(id).await?;
            return Err(PipelineError::transition(current.status, stage));
        }
        tracing::info!(campaign_id = %id, stage = %stage, rerun, "running stage");

        let execution = if stage == Stage::SourceDiscovery {
            self.discover_sources(id, &input, charge_context).await?
        } else {
            self.generate(stage, &input, charge_context).await?
        };

        match execution {
            Ok(success) => {
                self.complete_stage(&campaign, status, stage, successful, success)
                    .await
            }
            Err(fault) => {
                self.campaigns
                    .insert_artifact(&NewStageArtifact {
                        campaign_id: id,
                        stage,
                        raw_response: fault.raw_response.unwrap_or_default(),
                        payload: None,
                        success: false,
                        model: self.model.model.clone(),
                        error_kind: Some(fault.kind.clone()),
                        error_message: Some(fault.message.clone()),
                    })
                    .await?;
                tracing::warn!(
                    campaign_id = %id,
                    stage = %stage,
                    kind = %fault.kind,
                    error = %fault.message,
                    "stage failed"
                );
                let message = format!("{stage} failed: {}", fault.user_message);
                let campaign = self.fail(id, status, stage, &successful, message).await?;
                Ok(StageReport {
                    stage,
                    result: StageResult::Failed {
                        kind: fault.kind,
                        message: fault.message,
                    },
                    campaign,
                })
            }
        }
    }

    fn claim(&self, id: Uuid) -> Result<RunGuard<'_>, PipelineError> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| PipelineError::CampaignBusy(id))?;
        if !running.insert(id) {
            return Err(PipelineError::CampaignBusy(id));
        }
        Ok(RunGuard {
            running: &self.running,
            id,
        })
    }

    /// Fail a campaign the current run started from `expected`. If the
    /// status moved meanwhile the stored row wins and is returned unchanged.
    async fn fail(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        stage: Stage,
        successful: &[Stage],
        message: String,
    ) -> Result<CampaignRow, PipelineError> {
        let update = failure_update(stage, successful, message);
        match self
            .campaigns
            .transition_campaign_state(id, expected, &update)
            .await?
        {
            Some(row) => Ok(row),
            None => self.campaign(id).await,
        }
    }

    async fn finish(&self, id: Uuid) -> Result<CampaignRow, PipelineError> {
        Ok(self
            .campaigns
            .update_campaign_state(
                id,
                &CampaignUpdate {
                    status: CampaignStatus::Completed,
                    current_step: None,
                    progress: 100,
                    error_message: None,
                },
            )
            .await?)
    }

    async fn complete_stage(
        &self,
        campaign: &CampaignRow,
        status: CampaignStatus,
        stage: Stage,
        mut successful: Vec<Stage>,
        success: StageSuccess,
    ) -> Result<StageReport, PipelineError> {
        let artifact = self
            .campaigns
            .insert_artifact(&NewStageArtifact {
                campaign_id: campaign.id,
                stage,
                raw_response: success.raw_response,
                payload: Some(success.payload),
                success: true,
                model: success.model,
                error_kind: None,
                error_message: None,
            })
            .await?;

        let article_id = match &success.reviewed {
            Some(reviewed) => Some(self.create_article(campaign, reviewed).await?),
            None => None,
        };

        if !successful.contains(&stage) {
            successful.push(stage);
        }
        let next_status = status_after_success(status, stage)?;
        let transitioned = self
            .campaigns
            .transition_campaign_state(
                campaign.id,
                status,
                &CampaignUpdate {
                    status: next_status,
                    current_step: next_status.stage(),
                    progress: progress(next_status, &successful),
                    error_message: None,
                },
            )
            .await?;
        let updated = match transitioned {
            Some(row) => {
                tracing::info!(
                    campaign_id = %campaign.id,
                    stage = %stage,
                    version = artifact.version,
                    status = %next_status,
                    progress = row.progress,
                    "stage succeeded"
                );
                row
            }
            None => {
                let current = self.campaign(campaign.id).await?;
                tracing::warn!(
                    campaign_id = %campaign.id,
                    stage = %stage,
                    version = artifact.version,
                    status = %current.status,
                    "campaign changed while the stage ran; artifact kept, status left as is"
                );
                current
            }
        };

        Ok(StageReport {
            stage,
            result: StageResult::Succeeded {
                version: artifact.version,
                article_id,
            },
            campaign: updated,
        })
    }

    async fn create_article(
        &self,
        campaign: &CampaignRow,
        reviewed: &ReviewedArticle,
    ) -> Result<Uuid, PipelineError> {
        let mut keywords = reviewed.article_keywords();
        if keywords.is_empty() {
            keywords.clone_from(&campaign.keywords);
        }
        let article = self
            .articles
            .insert_article(&NewArticle::new(
                campaign.brand_id,
                Some(campaign.id),
                reviewed.article_title(),
                reviewed.body_html(),
                &reviewed.meta_description,
                keywords,
            ))
            .await?;
        tracing::info!(campaign_id = %campaign.id, article_id = %article.id, "draft article created");
        Ok(article.id)
    }

    async fn charge(
        &self,
        context: ChargeContext,
        stage: Stage,
        model: &str,
        usage: TokenUsage,
    ) -> Result<(), PipelineError> {
        self.gate
            .charge_for_stage(context, stage.as_str(), model, Charge::Usage(usage))
            .await?;
        Ok(())
    }

    async fn generate(
        &self,
        stage: Stage,
        input: &StageInput,
        context: ChargeContext,
    ) -> Result<Result<StageSuccess, StageFault>, PipelineError> {
        match self.processor.run_stage(input, &self.model).await {
            StageOutcome::Success {
                payload,
                model,
                raw_response,
                usage,
            } => {
                self.charge(context, stage, &model, usage).await?;
                let reviewed = match &payload {
                    StagePayload::Reviewed(reviewed) => Some(reviewed.clone()),
                    _ => None,
                };
                let payload = payload
                    .to_json()
                    .map_err(|e| PipelineError::InvalidArtifact {
                        stage,
                        reason: e.to_string(),
                    })?;
                Ok(Ok(StageSuccess {
                    payload,
                    model,
                    raw_response,
                    reviewed,
                }))
            }
            StageOutcome::Failure {
                kind,
                message,
                raw_response,
            } => Ok(Err(StageFault {
                kind: kind.as_str().to_string(),
                message,
                user_message: kind.user_message().to_string(),
                raw_response,
            })),
        }
    }

    /// Candidate listing, then batched fetch and metered analysis, then
    /// local aggregation into the stored [`ResearchContext`].
    async fn discover_sources(
        &self,
        campaign_id: Uuid,
        input: &StageInput,
        context: ChargeContext,
    ) -> Result<Result<StageSuccess, StageFault>, PipelineError> {
        let stage = Stage::SourceDiscovery;
        let (model, raw_response, candidates) =
            match self.processor.run_stage(input, &self.model).await {
                StageOutcome::Success {
                    payload: StagePayload::Candidates(candidates),
                    model,
                    raw_response,
                    usage,
                } => {
                    self.charge(context, stage, &model, usage).await?;
                    (model, raw_response, candidates)
                }
                StageOutcome::Success { .. } => {
                    return Err(PipelineError::InvalidArtifact {
                        stage,
                        reason: "processor returned a non-candidate payload".to_string(),
                    })
                }
                StageOutcome::Failure {
                    kind,
                    message,
                    raw_response,
                } => {
                    return Ok(Err(StageFault {
                        kind: kind.as_str().to_string(),
                        message,
                        user_message: kind.user_message().to_string(),
                        raw_response,
                    }))
                }
            };

        let candidates = usable_candidates(&candidates.sources);
        if candidates.is_empty() {
            return Ok(Err(source_fetch_fault(
                "no candidate source had a usable URL".to_string(),
                raw_response,
            )));
        }

        let keyword_context = match input {
            StageInput::SourceDiscovery { strategy, .. } => keyword_context(strategy),
            _ => String::new(),
        };
        let analyzer = MeteredAnalyzer {
            processor: &self.processor,
            gate: &self.gate,
            model: &self.model,
            context,
        };
        let results = fetch_and_analyze_sources(
            self.fetcher.as_ref(),
            &analyzer,
            &candidates,
            &keyword_context,
            &self.batch,
        )
        .await;

        for result in &results {
            let insights = result
                .insights
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| PipelineError::InvalidArtifact {
                    stage,
                    reason: e.to_string(),
                })?;
            self.campaigns
                .upsert_source(&NewSource {
                    campaign_id,
                    url: result.url.clone(),
                    title: result.title.clone(),
                    description: result.description.clone(),
                    status: result.status,
                    content_excerpt: result.content_excerpt.clone(),
                    insights,
                    error: result.error.clone(),
                })
                .await?;
        }

        if !results.iter().any(|r| r.status.is_usable()) {
            return Ok(Err(source_fetch_fault(
                format!("none of {} sources could be fetched", results.len()),
                raw_response,
            )));
        }

        let strategy = aggregate_sources(&results);
        let research = ResearchContext {
            sources: results,
            strategy,
        };
        let payload = serde_json::to_value(&research).map_err(|e| PipelineError::InvalidArtifact {
            stage,
            reason: e.to_string(),
        })?;
        Ok(Ok(StageSuccess {
            payload,
            model,
            raw_response,
            reviewed: None,
        }))
    }

    async fn stage_input(
        &self,
        campaign: &CampaignRow,
        stage: Stage,
    ) -> Result<StageInput, PipelineError> {
        let context = campaign_context(campaign)?;
        let id = campaign.id;
        Ok(match stage {
            Stage::KeywordResearch => StageInput::KeywordResearch { context },
            Stage::ContentStrategy => StageInput::ContentStrategy {
                context,
                keywords: self.load(id, Stage::KeywordResearch).await?,
            },
            Stage::SourceDiscovery => StageInput::SourceDiscovery {
                context,
                strategy: self.load(id, Stage::ContentStrategy).await?,
            },
            Stage::Writing => {
                let strategy: ContentStrategy = self.load(id, Stage::ContentStrategy).await?;
                let article = strategy.lead_article().cloned().ok_or_else(|| {
                    PipelineError::InvalidArtifact {
                        stage: Stage::ContentStrategy,
                        reason: "no planned articles".to_string(),
                    }
                })?;
                StageInput::Writing {
                    context,
                    article,
                    research: self.load(id, Stage::SourceDiscovery).await?,
                }
            }
            Stage::Humanization => StageInput::Humanization {
                context,
                draft: self.load(id, Stage::Writing).await?,
            },
            Stage::Review => StageInput::Review {
                context,
                draft: self.load(id, Stage::Humanization).await?,
            },
        })
    }

    /// Latest successful payload of `stage`, decoded.
    async fn load<T: DeserializeOwned>(
        &self,
        campaign_id: Uuid,
        stage: Stage,
    ) -> Result<T, PipelineError> {
        let invalid = |reason: String| PipelineError::InvalidArtifact { stage, reason };
        let artifact = self
            .campaigns
            .latest_successful_artifact(campaign_id, stage)
            .await?
            .ok_or_else(|| invalid("no successful artifact".to_string()))?;
        let payload = artifact
            .payload
            .ok_or_else(|| invalid("artifact has no payload".to_string()))?;
        serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))
    }
}

fn failure_update(stage: Stage, successful: &[Stage], message: String) -> CampaignUpdate {
    CampaignUpdate {
        status: CampaignStatus::Failed,
        current_step: Some(stage),
        progress: progress(CampaignStatus::Failed, successful),
        error_message: Some(message),
    }
}

fn campaign_context(campaign: &CampaignRow) -> Result<CampaignContext, PipelineError> {
    Ok(CampaignContext {
        website_url: campaign.website_url.clone(),
        brand_context: campaign.brand_context.clone(),
        country: campaign.country.clone(),
        language: campaign.language.clone(),
        article_length: campaign.article_length()?,
        seed_keywords: campaign.keywords.clone(),
        target_articles: u32::try_from(campaign.target_articles).unwrap_or(1),
    })
}

fn keyword_context(strategy: &ContentStrategy) -> String {
    if !strategy.search_terms.is_empty() {
        return strategy.search_terms.join(", ");
    }
    strategy
        .lead_article()
        .map(|a| {
            std::iter::once(a.primary_keyword.as_str())
                .chain(a.secondary_keywords.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn source_fetch_fault(message: String, raw_response: String) -> StageFault {
    StageFault {
        kind: SOURCE_FETCH_ERROR.to_string(),
        message,
        user_message: SOURCE_FETCH_USER_MESSAGE.to_string(),
        raw_response: Some(raw_response),
    }
}
