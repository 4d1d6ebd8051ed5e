use clap::Subcommand;
use quillcast_billing::{cancel_user_subscription, start_trial, PaymentClient};
use quillcast_core::AppConfig;
use quillcast_db::{LedgerStore, PgStore};
use uuid::Uuid;

const PAYMENT_TIMEOUT_SECS: u64 = 30;

/// Sub-commands available under `billing`.
#[derive(Debug, Subcommand)]
pub enum BillingCommands {
    /// Create the payment customer if needed and start a trial subscription
    Trial {
        user: Uuid,
        #[arg(long)]
        email: String,
        /// Price to subscribe to after the trial
        #[arg(long, env = "PAYMENT_PRICE_ID")]
        price: String,
        #[arg(long, default_value_t = 14)]
        trial_days: u32,
    },
    /// Cancel the user's stored subscription
    Cancel { user: Uuid },
    /// Print the stored billing profile
    Show { user: Uuid },
}

/// # Errors
///
/// Returns an error if the payment key is missing, the payment API rejects
/// the request, or the profile cannot be read or written.
pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: BillingCommands,
) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    let payments = || {
        PaymentClient::with_base_url(
            config.payment_api_key.as_deref(),
            PAYMENT_TIMEOUT_SECS,
            &config.payment_base_url,
        )
    };

    match command {
        BillingCommands::Trial {
            user,
            email,
            price,
            trial_days,
        } => {
            let subscription =
                start_trial(&store, &payments()?, user, &email, &price, trial_days).await?;
            println!(
                "{user}: subscription {} ({})",
                subscription.id, subscription.status
            );
        }
        BillingCommands::Cancel { user } => {
            let subscription = cancel_user_subscription(&store, &payments()?, user).await?;
            println!(
                "{user}: subscription {} ({})",
                subscription.id, subscription.status
            );
        }
        BillingCommands::Show { user } => match store.billing_profile(user).await? {
            Some(profile) => {
                println!(
                    "{user}: customer={} subscription={} status={}",
                    profile.payment_customer_id.as_deref().unwrap_or("-"),
                    profile.subscription_id.as_deref().unwrap_or("-"),
                    profile.subscription_status.as_deref().unwrap_or("-")
                );
            }
            None => println!("{user}: no billing profile"),
        },
    }
    Ok(())
}
