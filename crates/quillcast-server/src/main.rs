mod api;
mod middleware;

use std::sync::Arc;

use quillcast_core::{load_pricing, PricingTable};
use quillcast_db::PgStore;
use quillcast_generation::GenerationClient;
use quillcast_pipeline::{Orchestrator, PipelineConfig};
use quillcast_publish::{PublishConfig, SyncAdapter};
use quillcast_sources::ScrapeClient;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = quillcast_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = quillcast_db::PoolConfig::from_app_config(&config);
    let pool = quillcast_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = quillcast_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let pricing = match &config.pricing_path {
        Some(path) => load_pricing(path)?,
        None => PricingTable::default(),
    };
    let generator = GenerationClient::with_base_url(
        config.generation_api_key.as_deref(),
        config.generation_timeout_secs,
        &config.generation_base_url,
    )?;
    let scraper = ScrapeClient::with_base_url(
        config.scraper_api_key.as_deref(),
        config.scraper_timeout_secs,
        &config.scraper_base_url,
    )?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(generator),
        Arc::new(scraper),
        pricing,
        PipelineConfig::from_app_config(&config),
    );
    let sync = SyncAdapter::with_config(
        store.clone(),
        store.clone(),
        PublishConfig {
            timeout_secs: config.publish_timeout_secs,
            max_retries: config.publish_max_retries,
            ..PublishConfig::default()
        },
    )?;

    let auth = AuthState::from_env(matches!(
        config.env,
        quillcast_core::Environment::Development
    ))?;
    let state = AppState {
        campaigns: store,
        orchestrator: Arc::new(orchestrator),
        sync: Arc::new(sync),
        pool: Some(pool),
    };
    let app = build_app(state, auth, default_rate_limit_state());

    tracing::info!(addr = %config.bind_addr, env = %config.env, "quillcast-server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received, draining connections");
}
