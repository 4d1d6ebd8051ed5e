//! Campaign command handlers.
//!
//! Stage runs go through the same orchestrator the HTTP API uses, so the
//! transition rules, quota gate, and artifact history are identical.

use std::sync::Arc;

use clap::Subcommand;
use quillcast_core::{load_pricing, AppConfig, ArticleLength, PricingTable, Stage};
use quillcast_db::{CampaignRow, CampaignStore, PgStore};
use quillcast_generation::GenerationClient;
use quillcast_pipeline::{
    Orchestrator, PipelineConfig, QuickSetup, RunOutcome, StageReport, StageResult,
};
use quillcast_sources::ScrapeClient;
use uuid::Uuid;

/// Sub-commands available under `campaign`.
#[derive(Debug, Subcommand)]
pub enum CampaignCommands {
    /// Create a campaign from quick-setup fields
    Create {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        brand: Uuid,
        #[arg(long)]
        website_url: String,
        #[arg(long, default_value = "US")]
        country: String,
        #[arg(long, default_value = "en")]
        language: String,
        /// Seed keyword; repeat for several
        #[arg(long = "keyword")]
        keywords: Vec<String>,
        #[arg(long, default_value = "")]
        brand_context: String,
        #[arg(long, default_value = "1")]
        target_articles: u32,
        /// short, medium, or long
        #[arg(long, default_value = "medium")]
        length: ArticleLength,
    },
    /// Run the next stage, or a named one
    Run {
        id: Uuid,
        /// Run this stage instead of the next pending one
        #[arg(long)]
        stage: Option<Stage>,
        /// Allow running a stage that already succeeded
        #[arg(long, requires = "stage")]
        rerun: bool,
        /// Keep running stages until the campaign completes or fails
        #[arg(long, conflicts_with = "stage")]
        all: bool,
        /// Print the stage that would run without calling anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Resume a failed or interrupted campaign at its next stage
    Resume { id: Uuid },
    /// Mark a campaign failed
    Fail {
        id: Uuid,
        #[arg(long)]
        reason: String,
    },
    /// Show status, progress, and stage history
    Show { id: Uuid },
}

pub(crate) fn load_pricing_table(config: &AppConfig) -> anyhow::Result<PricingTable> {
    Ok(match &config.pricing_path {
        Some(path) => load_pricing(path)?,
        None => PricingTable::default(),
    })
}

fn build_orchestrator(store: Arc<PgStore>, config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let generator = GenerationClient::with_base_url(
        config.generation_api_key.as_deref(),
        config.generation_timeout_secs,
        &config.generation_base_url,
    )
    .map_err(|e| anyhow::anyhow!("failed to build generation client: {e}"))?;
    let scraper = ScrapeClient::with_base_url(
        config.scraper_api_key.as_deref(),
        config.scraper_timeout_secs,
        &config.scraper_base_url,
    )
    .map_err(|e| anyhow::anyhow!("failed to build scrape client: {e}"))?;

    Ok(Orchestrator::new(
        store,
        Arc::new(generator),
        Arc::new(scraper),
        load_pricing_table(config)?,
        PipelineConfig::from_app_config(config),
    ))
}

/// # Errors
///
/// Returns an error if a client cannot be built or the pipeline rejects the
/// request. A failed stage is printed, not returned as an error.
pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: CampaignCommands,
) -> anyhow::Result<()> {
    let store = Arc::new(PgStore::new(pool.clone()));
    let orchestrator = build_orchestrator(store.clone(), config)?;

    match command {
        CampaignCommands::Create {
            user,
            brand,
            website_url,
            country,
            language,
            keywords,
            brand_context,
            target_articles,
            length,
        } => {
            let campaign = orchestrator
                .create_campaign(&QuickSetup {
                    user_id: user,
                    brand_id: brand,
                    website_url,
                    brand_context,
                    country,
                    language,
                    keywords,
                    target_articles,
                    article_length: length,
                })
                .await?;
            println!("created campaign {}", campaign.id);
            print_campaign(&campaign);
        }
        CampaignCommands::Run {
            id,
            stage,
            rerun,
            all,
            dry_run,
        } => {
            if dry_run {
                let planned = match stage {
                    Some(stage) => Some(stage),
                    None => orchestrator.plan_next_stage(id).await?,
                };
                match planned {
                    Some(stage) => println!("dry-run: would run {stage} for campaign {id}"),
                    None => println!("dry-run: campaign {id} has no stage left to run"),
                }
                return Ok(());
            }
            match stage {
                Some(stage) => print_report(&orchestrator.run_stage(id, stage, rerun).await?),
                None if all => run_to_end(&orchestrator, id).await?,
                None => print_outcome(&orchestrator.run_next_stage(id).await?),
            }
        }
        CampaignCommands::Resume { id } => print_outcome(&orchestrator.resume(id).await?),
        CampaignCommands::Fail { id, reason } => {
            let campaign = orchestrator.mark_failed(id, &reason).await?;
            print_campaign(&campaign);
        }
        CampaignCommands::Show { id } => show(store.as_ref(), &orchestrator, id).await?,
    }

    Ok(())
}

async fn run_to_end(orchestrator: &Orchestrator, id: Uuid) -> anyhow::Result<()> {
    loop {
        let outcome = orchestrator.run_next_stage(id).await?;
        print_outcome(&outcome);
        if !keep_running(&outcome) {
            return Ok(());
        }
    }
}

/// `run --all` continues only after a success that left the campaign on a
/// further stage. Review success completes it; an operator abort fails it.
pub(crate) fn keep_running(outcome: &RunOutcome) -> bool {
    match outcome {
        RunOutcome::Ran(StageReport {
            result: StageResult::Succeeded { .. },
            campaign,
            ..
        }) => campaign.status().is_ok_and(|s| s.stage().is_some()),
        RunOutcome::Ran(_) | RunOutcome::Completed(_) => false,
    }
}

async fn show(store: &PgStore, orchestrator: &Orchestrator, id: Uuid) -> anyhow::Result<()> {
    let campaign = orchestrator.campaign(id).await?;
    print_campaign(&campaign);

    let artifacts = store.list_artifacts(id).await?;
    if !artifacts.is_empty() {
        println!("\n{:<18} {:>3}  {:<8} {}", "STAGE", "VER", "RESULT", "ERROR");
        for artifact in &artifacts {
            println!(
                "{:<18} {:>3}  {:<8} {}",
                artifact.stage,
                artifact.version,
                if artifact.success { "ok" } else { "failed" },
                artifact.error_kind.as_deref().unwrap_or("")
            );
        }
    }

    let sources = store.list_sources(id).await?;
    if !sources.is_empty() {
        println!("\nsources:");
        for source in &sources {
            println!("  [{}] {}", source.status, source.url);
        }
    }
    Ok(())
}

fn print_campaign(campaign: &CampaignRow) {
    println!(
        "campaign {}: status={} step={} progress={}%",
        campaign.id,
        campaign.status,
        campaign.current_step.as_deref().unwrap_or("-"),
        campaign.progress
    );
    if let Some(message) = &campaign.error_message {
        println!("  error: {message}");
    }
}

fn print_report(report: &StageReport) {
    match &report.result {
        StageResult::Succeeded {
            version,
            article_id,
        } => {
            println!("{} succeeded (v{version})", report.stage);
            if let Some(article_id) = article_id {
                println!("  draft article {article_id}");
            }
        }
        StageResult::Failed { kind, message } => {
            println!("{} failed [{kind}]: {message}", report.stage);
        }
    }
    print_campaign(&report.campaign);
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Ran(report) => print_report(report),
        RunOutcome::Completed(campaign) => {
            println!("all stages done");
            print_campaign(campaign);
        }
    }
}
