mod article;
mod balance;
mod billing;
mod campaign;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::article::ArticleCommands;
use crate::balance::BalanceCommands;
use crate::billing::BillingCommands;
use crate::campaign::CampaignCommands;

#[derive(Debug, Parser)]
#[command(name = "quillcast-cli")]
#[command(about = "Quillcast content pipeline operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Create, run, and inspect campaigns
    Campaign {
        #[command(subcommand)]
        command: CampaignCommands,
    },
    /// Distribute finished articles
    Article {
        #[command(subcommand)]
        command: ArticleCommands,
    },
    /// Inspect and top up user balances
    Balance {
        #[command(subcommand)]
        command: BalanceCommands,
    },
    /// Payment customers and trial subscriptions
    Billing {
        #[command(subcommand)]
        command: BillingCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("quillcast-cli: run with --help for available commands");
        return Ok(());
    };

    let config = quillcast_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = quillcast_db::PoolConfig::from_app_config(&config);
    let pool = quillcast_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                quillcast_db::health_check(&pool).await?;
                println!("database: ok");
            }
            DbCommands::Migrate => {
                let applied = quillcast_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        },
        Commands::Campaign { command } => campaign::run(&pool, &config, command).await?,
        Commands::Article { command } => article::run(&pool, &config, command).await?,
        Commands::Balance { command } => balance::run(&pool, &config, command).await?,
        Commands::Billing { command } => billing::run(&pool, &config, command).await?,
    }

    Ok(())
}
