//! Store traits the pipeline, publishing, and billing crates depend on.
//!
//! [`PgStore`] delegates to the free query functions in this crate;
//! [`crate::MemoryStore`] implements the same contract in-process.

use async_trait::async_trait;
use quillcast_core::{CampaignStatus, Platform, Stage};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    articles, campaigns, integrations, ledger, sources, stage_artifacts, ArticleRow,
    BillingProfileRow, BillingProfileUpdate, CampaignRow, CampaignUpdate, DbError, DebitOutcome,
    IntegrationRow, LedgerEntryRow, NewArticle, NewCampaign, NewIntegration, NewLedgerEntry,
    NewSource, NewStageArtifact, SourceRow, StageArtifactRow, SyncRecordRow, SyncResult,
};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Campaign rows, their append-only stage artifacts, and research sources.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert_campaign(&self, new: &NewCampaign) -> Result<CampaignRow, DbError>;

    async fn get_campaign(&self, id: Uuid) -> Result<Option<CampaignRow>, DbError>;

    async fn list_campaigns(&self, user_id: Uuid, limit: i64)
        -> Result<Vec<CampaignRow>, DbError>;

    async fn update_campaign_state(
        &self,
        id: Uuid,
        update: &CampaignUpdate,
    ) -> Result<CampaignRow, DbError>;

    /// Like `update_campaign_state`, but only while the stored status is
    /// `expected`. `Ok(None)` means the status moved on and nothing changed.
    async fn transition_campaign_state(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        update: &CampaignUpdate,
    ) -> Result<Option<CampaignRow>, DbError>;

    /// Hide the campaign from listings. Idempotent.
    async fn archive_campaign(&self, id: Uuid) -> Result<(), DbError>;

    async fn insert_artifact(&self, new: &NewStageArtifact) -> Result<StageArtifactRow, DbError>;

    async fn latest_successful_artifact(
        &self,
        campaign_id: Uuid,
        stage: Stage,
    ) -> Result<Option<StageArtifactRow>, DbError>;

    /// Stages with at least one successful artifact, in pipeline order.
    async fn successful_stages(&self, campaign_id: Uuid) -> Result<Vec<Stage>, DbError>;

    async fn list_artifacts(&self, campaign_id: Uuid) -> Result<Vec<StageArtifactRow>, DbError>;

    async fn upsert_source(&self, new: &NewSource) -> Result<SourceRow, DbError>;

    async fn list_sources(&self, campaign_id: Uuid) -> Result<Vec<SourceRow>, DbError>;
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn insert_article(&self, new: &NewArticle) -> Result<ArticleRow, DbError>;

    async fn get_article(&self, id: Uuid) -> Result<Option<ArticleRow>, DbError>;

    async fn get_sync_record(
        &self,
        article_id: Uuid,
        platform: Platform,
    ) -> Result<Option<SyncRecordRow>, DbError>;

    async fn record_sync_result(
        &self,
        article_id: Uuid,
        platform: Platform,
        result: &SyncResult,
    ) -> Result<SyncRecordRow, DbError>;
}

#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn get_integration(
        &self,
        brand_id: Uuid,
        platform: Platform,
    ) -> Result<Option<IntegrationRow>, DbError>;

    async fn upsert_integration(&self, new: &NewIntegration) -> Result<IntegrationRow, DbError>;
}

/// Per-user balances. `debit` must be atomic with respect to other debits
/// and credits for the same user.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, DbError>;

    async fn debit(&self, entry: &NewLedgerEntry) -> Result<DebitOutcome, DbError>;

    async fn credit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        service_name: &str,
        metadata: serde_json::Value,
    ) -> Result<Decimal, DbError>;

    async fn ledger_entries(&self, user_id: Uuid, limit: i64)
        -> Result<Vec<LedgerEntryRow>, DbError>;

    async fn billing_profile(&self, user_id: Uuid) -> Result<Option<BillingProfileRow>, DbError>;

    async fn upsert_billing_profile(
        &self,
        user_id: Uuid,
        update: &BillingProfileUpdate,
    ) -> Result<BillingProfileRow, DbError>;
}

/// Everything a full deployment persists.
pub trait Store: CampaignStore + ArticleStore + IntegrationStore + LedgerStore {}

impl<T> Store for T where T: CampaignStore + ArticleStore + IntegrationStore + LedgerStore {}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CampaignStore for PgStore {
    async fn insert_campaign(&self, new: &NewCampaign) -> Result<CampaignRow, DbError> {
        campaigns::insert_campaign(&self.pool, new).await
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<CampaignRow>, DbError> {
        campaigns::get_campaign(&self.pool, id).await
    }

    async fn list_campaigns(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CampaignRow>, DbError> {
        campaigns::list_campaigns_for_user(&self.pool, user_id, limit).await
    }

    async fn update_campaign_state(
        &self,
        id: Uuid,
        update: &CampaignUpdate,
    ) -> Result<CampaignRow, DbError> {
        campaigns::update_campaign_state(&self.pool, id, update).await
    }

    async fn transition_campaign_state(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        update: &CampaignUpdate,
    ) -> Result<Option<CampaignRow>, DbError> {
        campaigns::transition_campaign_state(&self.pool, id, expected, update).await
    }

    async fn archive_campaign(&self, id: Uuid) -> Result<(), DbError> {
        campaigns::archive_campaign(&self.pool, id).await
    }

    async fn insert_artifact(&self, new: &NewStageArtifact) -> Result<StageArtifactRow, DbError> {
        stage_artifacts::insert_stage_artifact(&self.pool, new).await
    }

    async fn latest_successful_artifact(
        &self,
        campaign_id: Uuid,
        stage: Stage,
    ) -> Result<Option<StageArtifactRow>, DbError> {
        stage_artifacts::latest_successful_artifact(&self.pool, campaign_id, stage).await
    }

    async fn successful_stages(&self, campaign_id: Uuid) -> Result<Vec<Stage>, DbError> {
        stage_artifacts::successful_stages(&self.pool, campaign_id).await
    }

    async fn list_artifacts(&self, campaign_id: Uuid) -> Result<Vec<StageArtifactRow>, DbError> {
        stage_artifacts::list_stage_artifacts(&self.pool, campaign_id).await
    }

    async fn upsert_source(&self, new: &NewSource) -> Result<SourceRow, DbError> {
        sources::upsert_source(&self.pool, new).await
    }

    async fn list_sources(&self, campaign_id: Uuid) -> Result<Vec<SourceRow>, DbError> {
        sources::list_sources(&self.pool, campaign_id).await
    }
}

#[async_trait]
impl ArticleStore for PgStore {
    async fn insert_article(&self, new: &NewArticle) -> Result<ArticleRow, DbError> {
        articles::insert_article(&self.pool, new).await
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<ArticleRow>, DbError> {
        articles::get_article(&self.pool, id).await
    }

    async fn get_sync_record(
        &self,
        article_id: Uuid,
        platform: Platform,
    ) -> Result<Option<SyncRecordRow>, DbError> {
        articles::get_sync_record(&self.pool, article_id, platform).await
    }

    async fn record_sync_result(
        &self,
        article_id: Uuid,
        platform: Platform,
        result: &SyncResult,
    ) -> Result<SyncRecordRow, DbError> {
        articles::record_sync_result(&self.pool, article_id, platform, result).await
    }
}

#[async_trait]
impl IntegrationStore for PgStore {
    async fn get_integration(
        &self,
        brand_id: Uuid,
        platform: Platform,
    ) -> Result<Option<IntegrationRow>, DbError> {
        integrations::get_integration(&self.pool, brand_id, platform).await
    }

    async fn upsert_integration(&self, new: &NewIntegration) -> Result<IntegrationRow, DbError> {
        integrations::upsert_integration(&self.pool, new).await
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, DbError> {
        ledger::get_balance(&self.pool, user_id).await
    }

    async fn debit(&self, entry: &NewLedgerEntry) -> Result<DebitOutcome, DbError> {
        ledger::debit_balance(&self.pool, entry).await
    }

    async fn credit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        service_name: &str,
        metadata: serde_json::Value,
    ) -> Result<Decimal, DbError> {
        ledger::credit_balance(&self.pool, user_id, amount, service_name, metadata).await
    }

    async fn ledger_entries(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntryRow>, DbError> {
        ledger::list_ledger_entries(&self.pool, user_id, limit).await
    }

    async fn billing_profile(&self, user_id: Uuid) -> Result<Option<BillingProfileRow>, DbError> {
        ledger::get_billing_profile(&self.pool, user_id).await
    }

    async fn upsert_billing_profile(
        &self,
        user_id: Uuid,
        update: &BillingProfileUpdate,
    ) -> Result<BillingProfileRow, DbError> {
        ledger::upsert_billing_profile(&self.pool, user_id, update).await
    }
}
