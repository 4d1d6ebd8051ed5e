//! In-process store with the same contract as [`crate::PgStore`].
//!
//! Used by pipeline tests and dry runs. All state sits behind one mutex that
//! is never held across an await point, so every trait method is atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use quillcast_core::{ArticleStatus, CampaignStatus, Platform, Stage, SyncStatus};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::CREDIT_MODEL_NAME;
use crate::store::{ArticleStore, CampaignStore, IntegrationStore, LedgerStore};
use crate::{
    ArticleRow, BillingProfileRow, BillingProfileUpdate, CampaignRow, CampaignUpdate, DbError,
    DebitOutcome, IntegrationRow, LedgerEntryRow, NewArticle, NewCampaign, NewIntegration,
    NewLedgerEntry, NewSource, NewStageArtifact, SourceRow, StageArtifactRow, SyncRecordRow,
    SyncResult,
};

#[derive(Default)]
struct State {
    campaigns: HashMap<Uuid, CampaignRow>,
    artifacts: Vec<StageArtifactRow>,
    sources: Vec<SourceRow>,
    articles: HashMap<Uuid, ArticleRow>,
    sync_records: Vec<SyncRecordRow>,
    integrations: Vec<IntegrationRow>,
    balances: HashMap<Uuid, Decimal>,
    ledger: Vec<LedgerEntryRow>,
    profiles: HashMap<Uuid, BillingProfileRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, DbError> {
        self.state
            .lock()
            .map_err(|_| DbError::Invariant("memory store lock poisoned".to_string()))
    }
}

impl State {
    fn append_ledger(
        &mut self,
        entry: &NewLedgerEntry,
        cost_usd: Decimal,
        balance_after: Decimal,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.ledger.push(LedgerEntryRow {
            id,
            user_id: entry.user_id,
            service_name: entry.service_name.clone(),
            model_name: entry.model_name.clone(),
            prompt_tokens: entry.prompt_tokens,
            completion_tokens: entry.completion_tokens,
            total_tokens: entry.total_tokens,
            cost_usd,
            brand_id: entry.brand_id,
            metadata: entry.metadata.clone(),
            balance_after,
            created_at: Utc::now(),
        });
        id
    }
}

// Mirrors the CHECK constraints on `campaigns`.
fn check_campaign_update(update: &CampaignUpdate) -> Result<(), DbError> {
    if !(0..=100).contains(&update.progress) {
        return Err(DbError::Invariant(format!(
            "progress out of range: {}",
            update.progress
        )));
    }
    if update.status == CampaignStatus::Failed && update.error_message.is_none() {
        return Err(DbError::Invariant(
            "failed campaign requires an error message".to_string(),
        ));
    }
    if update.progress == 100 && update.status != CampaignStatus::Completed {
        return Err(DbError::Invariant(
            "progress 100 requires status completed".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn insert_campaign(&self, new: &NewCampaign) -> Result<CampaignRow, DbError> {
        if new.target_articles < 1 {
            return Err(DbError::Invariant(
                "target_articles must be at least 1".to_string(),
            ));
        }
        let now = Utc::now();
        let row = CampaignRow {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            brand_id: new.brand_id,
            website_url: new.website_url.clone(),
            brand_context: new.brand_context.clone(),
            country: new.country.clone(),
            language: new.language.clone(),
            keywords: new.keywords.clone(),
            target_articles: new.target_articles,
            article_length: new.article_length.as_str().to_string(),
            status: CampaignStatus::KeywordResearch.as_str().to_string(),
            current_step: Some(Stage::KeywordResearch.as_str().to_string()),
            progress: 0,
            error_message: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state()?.campaigns.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<CampaignRow>, DbError> {
        Ok(self.state()?.campaigns.get(&id).cloned())
    }

    async fn list_campaigns(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CampaignRow>, DbError> {
        let state = self.state()?;
        let mut rows: Vec<CampaignRow> = state
            .campaigns
            .values()
            .filter(|c| c.user_id == user_id && c.archived_at.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn update_campaign_state(
        &self,
        id: Uuid,
        update: &CampaignUpdate,
    ) -> Result<CampaignRow, DbError> {
        check_campaign_update(update)?;
        let mut state = self.state()?;
        let row = state.campaigns.get_mut(&id).ok_or(DbError::NotFound)?;
        row.status = update.status.as_str().to_string();
        row.current_step = update.current_step.map(|s| s.as_str().to_string());
        row.progress = update.progress;
        row.error_message.clone_from(&update.error_message);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn transition_campaign_state(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        update: &CampaignUpdate,
    ) -> Result<Option<CampaignRow>, DbError> {
        check_campaign_update(update)?;
        let mut state = self.state()?;
        let row = state.campaigns.get_mut(&id).ok_or(DbError::NotFound)?;
        if row.status != expected.as_str() {
            return Ok(None);
        }
        row.status = update.status.as_str().to_string();
        row.current_step = update.current_step.map(|s| s.as_str().to_string());
        row.progress = update.progress;
        row.error_message.clone_from(&update.error_message);
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn archive_campaign(&self, id: Uuid) -> Result<(), DbError> {
        let mut state = self.state()?;
        let row = state.campaigns.get_mut(&id).ok_or(DbError::NotFound)?;
        if row.archived_at.is_none() {
            let now = Utc::now();
            row.archived_at = Some(now);
            row.updated_at = now;
        }
        Ok(())
    }

    async fn insert_artifact(&self, new: &NewStageArtifact) -> Result<StageArtifactRow, DbError> {
        let mut state = self.state()?;
        if !state.campaigns.contains_key(&new.campaign_id) {
            return Err(DbError::NotFound);
        }
        let version = state
            .artifacts
            .iter()
            .filter(|a| a.campaign_id == new.campaign_id && a.stage == new.stage.as_str())
            .map(|a| a.version)
            .max()
            .unwrap_or(0)
            + 1;
        let row = StageArtifactRow {
            id: Uuid::new_v4(),
            campaign_id: new.campaign_id,
            stage: new.stage.as_str().to_string(),
            version,
            raw_response: new.raw_response.clone(),
            payload: new.payload.clone(),
            success: new.success,
            model: new.model.clone(),
            error_kind: new.error_kind.clone(),
            error_message: new.error_message.clone(),
            created_at: Utc::now(),
        };
        state.artifacts.push(row.clone());
        Ok(row)
    }

    async fn latest_successful_artifact(
        &self,
        campaign_id: Uuid,
        stage: Stage,
    ) -> Result<Option<StageArtifactRow>, DbError> {
        Ok(self
            .state()?
            .artifacts
            .iter()
            .filter(|a| a.campaign_id == campaign_id && a.stage == stage.as_str() && a.success)
            .max_by_key(|a| a.version)
            .cloned())
    }

    async fn successful_stages(&self, campaign_id: Uuid) -> Result<Vec<Stage>, DbError> {
        let state = self.state()?;
        let mut stages = Vec::new();
        for artifact in state
            .artifacts
            .iter()
            .filter(|a| a.campaign_id == campaign_id && a.success)
        {
            let stage = artifact.stage()?;
            if !stages.contains(&stage) {
                stages.push(stage);
            }
        }
        stages.sort();
        Ok(stages)
    }

    async fn list_artifacts(&self, campaign_id: Uuid) -> Result<Vec<StageArtifactRow>, DbError> {
        Ok(self
            .state()?
            .artifacts
            .iter()
            .filter(|a| a.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn upsert_source(&self, new: &NewSource) -> Result<SourceRow, DbError> {
        let mut state = self.state()?;
        let now = Utc::now();
        if let Some(existing) = state
            .sources
            .iter_mut()
            .find(|s| s.campaign_id == new.campaign_id && s.url == new.url)
        {
            existing.title.clone_from(&new.title);
            existing.description.clone_from(&new.description);
            existing.status = new.status.as_str().to_string();
            existing.content_excerpt.clone_from(&new.content_excerpt);
            existing.insights.clone_from(&new.insights);
            existing.error.clone_from(&new.error);
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let row = SourceRow {
            id: Uuid::new_v4(),
            campaign_id: new.campaign_id,
            url: new.url.clone(),
            title: new.title.clone(),
            description: new.description.clone(),
            status: new.status.as_str().to_string(),
            content_excerpt: new.content_excerpt.clone(),
            insights: new.insights.clone(),
            error: new.error.clone(),
            created_at: now,
            updated_at: now,
        };
        state.sources.push(row.clone());
        Ok(row)
    }

    async fn list_sources(&self, campaign_id: Uuid) -> Result<Vec<SourceRow>, DbError> {
        Ok(self
            .state()?
            .sources
            .iter()
            .filter(|s| s.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn insert_article(&self, new: &NewArticle) -> Result<ArticleRow, DbError> {
        let now = Utc::now();
        let row = ArticleRow {
            id: Uuid::new_v4(),
            brand_id: new.brand_id,
            campaign_id: new.campaign_id,
            title: new.title.clone(),
            html_content: new.html_content.clone(),
            meta_description: new.meta_description.clone(),
            keywords: new.keywords.clone(),
            status: ArticleStatus::Draft.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        self.state()?.articles.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<ArticleRow>, DbError> {
        Ok(self.state()?.articles.get(&id).cloned())
    }

    async fn get_sync_record(
        &self,
        article_id: Uuid,
        platform: Platform,
    ) -> Result<Option<SyncRecordRow>, DbError> {
        Ok(self
            .state()?
            .sync_records
            .iter()
            .find(|r| r.article_id == article_id && r.platform == platform.as_str())
            .cloned())
    }

    async fn record_sync_result(
        &self,
        article_id: Uuid,
        platform: Platform,
        result: &SyncResult,
    ) -> Result<SyncRecordRow, DbError> {
        let (sync_status, article_status, external_id, last_error) = match result {
            SyncResult::Synced { external_id } => (
                SyncStatus::Synced,
                ArticleStatus::Published,
                Some(external_id.clone()),
                None,
            ),
            SyncResult::Failed { error } => (
                SyncStatus::SyncError,
                ArticleStatus::SyncError,
                None,
                Some(error.clone()),
            ),
        };

        let mut state = self.state()?;
        let now = Utc::now();
        let article = state.articles.get_mut(&article_id).ok_or(DbError::NotFound)?;
        article.status = article_status.as_str().to_string();
        article.updated_at = now;

        if let Some(record) = state
            .sync_records
            .iter_mut()
            .find(|r| r.article_id == article_id && r.platform == platform.as_str())
        {
            record.status = sync_status.as_str().to_string();
            if external_id.is_some() {
                record.external_id = external_id;
            }
            record.last_error = last_error;
            record.last_attempt_at = Some(now);
            record.updated_at = now;
            return Ok(record.clone());
        }

        let record = SyncRecordRow {
            id: Uuid::new_v4(),
            article_id,
            platform: platform.as_str().to_string(),
            status: sync_status.as_str().to_string(),
            external_id,
            last_error,
            last_attempt_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        state.sync_records.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl IntegrationStore for MemoryStore {
    async fn get_integration(
        &self,
        brand_id: Uuid,
        platform: Platform,
    ) -> Result<Option<IntegrationRow>, DbError> {
        Ok(self
            .state()?
            .integrations
            .iter()
            .find(|i| i.brand_id == brand_id && i.platform == platform.as_str())
            .cloned())
    }

    async fn upsert_integration(&self, new: &NewIntegration) -> Result<IntegrationRow, DbError> {
        let mut state = self.state()?;
        let now = Utc::now();
        state
            .integrations
            .retain(|i| !(i.brand_id == new.brand_id && i.platform == new.platform.as_str()));
        let row = IntegrationRow {
            id: Uuid::new_v4(),
            brand_id: new.brand_id,
            platform: new.platform.as_str().to_string(),
            base_url: new.base_url.clone(),
            username: new.username.clone(),
            secret: new.secret.clone(),
            blog_id: new.blog_id.clone(),
            publish_status: new.publish_status.clone(),
            created_at: now,
            updated_at: now,
        };
        state.integrations.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, DbError> {
        Ok(self
            .state()?
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn debit(&self, entry: &NewLedgerEntry) -> Result<DebitOutcome, DbError> {
        if entry.cost_usd.is_sign_negative() {
            return Err(DbError::Invariant(format!(
                "debit cost must be non-negative, got {}",
                entry.cost_usd
            )));
        }
        let mut state = self.state()?;
        let current_balance = state
            .balances
            .get(&entry.user_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if current_balance < entry.cost_usd {
            return Ok(DebitOutcome::Insufficient { current_balance });
        }
        let new_balance = current_balance - entry.cost_usd;
        state.balances.insert(entry.user_id, new_balance);
        let entry_id = state.append_ledger(entry, entry.cost_usd, new_balance);
        Ok(DebitOutcome::Debited {
            new_balance,
            entry_id,
        })
    }

    async fn credit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        service_name: &str,
        metadata: serde_json::Value,
    ) -> Result<Decimal, DbError> {
        if amount <= Decimal::ZERO {
            return Err(DbError::Invariant(format!(
                "credit amount must be positive, got {amount}"
            )));
        }
        let mut state = self.state()?;
        let new_balance =
            state.balances.get(&user_id).copied().unwrap_or(Decimal::ZERO) + amount;
        state.balances.insert(user_id, new_balance);
        let entry = NewLedgerEntry {
            user_id,
            service_name: service_name.to_string(),
            model_name: CREDIT_MODEL_NAME.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost_usd: -amount,
            brand_id: None,
            metadata,
        };
        state.append_ledger(&entry, -amount, new_balance);
        Ok(new_balance)
    }

    async fn ledger_entries(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntryRow>, DbError> {
        let state = self.state()?;
        Ok(state
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(usize::try_from(limit.max(0)).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn billing_profile(&self, user_id: Uuid) -> Result<Option<BillingProfileRow>, DbError> {
        Ok(self.state()?.profiles.get(&user_id).cloned())
    }

    async fn upsert_billing_profile(
        &self,
        user_id: Uuid,
        update: &BillingProfileUpdate,
    ) -> Result<BillingProfileRow, DbError> {
        let mut state = self.state()?;
        let profile = state
            .profiles
            .entry(user_id)
            .or_insert_with(|| BillingProfileRow {
                user_id,
                email: None,
                payment_customer_id: None,
                subscription_id: None,
                subscription_status: None,
                updated_at: Utc::now(),
            });
        if update.email.is_some() {
            profile.email.clone_from(&update.email);
        }
        if update.payment_customer_id.is_some() {
            profile
                .payment_customer_id
                .clone_from(&update.payment_customer_id);
        }
        if update.subscription_id.is_some() {
            profile.subscription_id.clone_from(&update.subscription_id);
        }
        if update.subscription_status.is_some() {
            profile
                .subscription_status
                .clone_from(&update.subscription_status);
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}
