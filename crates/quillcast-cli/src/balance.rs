use std::sync::Arc;

use clap::Subcommand;
use quillcast_billing::QuotaGate;
use quillcast_core::AppConfig;
use quillcast_db::PgStore;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::campaign::load_pricing_table;

/// Sub-commands available under `balance`.
#[derive(Debug, Subcommand)]
pub enum BalanceCommands {
    /// Print a user's balance in USD
    Show { user: Uuid },
    /// Add funds to a user's balance
    Credit {
        user: Uuid,
        /// Amount in USD, e.g. 10.00
        amount: Decimal,
        #[arg(long, default_value = "manual top-up")]
        reason: String,
    },
}

/// # Errors
///
/// Returns an error for a non-positive credit or a store failure.
pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: BalanceCommands,
) -> anyhow::Result<()> {
    let gate = QuotaGate::new(
        Arc::new(PgStore::new(pool.clone())),
        load_pricing_table(config)?,
    );

    match command {
        BalanceCommands::Show { user } => {
            println!("{user}: ${}", gate.balance(user).await?);
        }
        BalanceCommands::Credit {
            user,
            amount,
            reason,
        } => {
            let balance = gate.credit_balance(user, amount, &reason).await?;
            tracing::info!(user_id = %user, %amount, "balance credited");
            println!("{user}: ${balance}");
        }
    }
    Ok(())
}
