use std::sync::Arc;

use clap::Subcommand;
use quillcast_core::{AppConfig, Platform};
use quillcast_db::PgStore;
use quillcast_publish::{PublishConfig, SyncAdapter, SyncOutcome};
use uuid::Uuid;

/// Sub-commands available under `article`.
#[derive(Debug, Subcommand)]
pub enum ArticleCommands {
    /// Publish an article to the brand's WordPress or Shopify site
    Sync {
        id: Uuid,
        #[arg(long)]
        brand: Uuid,
        /// wordpress or shopify
        #[arg(long)]
        platform: Platform,
        /// Update the remote post even if it is already synced
        #[arg(long)]
        force: bool,
    },
}

/// # Errors
///
/// Returns an error when the article or integration is missing, or when the
/// CMS rejects the post.
pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: ArticleCommands,
) -> anyhow::Result<()> {
    let store = Arc::new(PgStore::new(pool.clone()));
    let adapter = SyncAdapter::with_config(
        store.clone(),
        store,
        PublishConfig {
            timeout_secs: config.publish_timeout_secs,
            max_retries: config.publish_max_retries,
            ..PublishConfig::default()
        },
    )?;

    match command {
        ArticleCommands::Sync {
            id,
            brand,
            platform,
            force,
        } => match adapter.sync_article(id, brand, platform, force).await? {
            SyncOutcome::AlreadySynced { external_id } => {
                println!("already synced to {platform} as {external_id}; pass --force to update");
            }
            SyncOutcome::Published {
                external_id,
                updated,
            } => {
                let verb = if updated { "updated" } else { "published" };
                println!("{verb} on {platform} as {external_id}");
            }
            SyncOutcome::Failed { error } => {
                anyhow::bail!("{platform} rejected article {id}: {error}");
            }
        },
    }
    Ok(())
}
