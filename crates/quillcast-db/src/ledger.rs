//! Database operations for `token_balances`, `token_usage_ledger`, and
//! `billing_profiles`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Model name written on ledger entries that add funds.
pub const CREDIT_MODEL_NAME: &str = "credit";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the append-only `token_usage_ledger` table.
///
/// Debits carry a positive `cost_usd`; credits carry the negated amount.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerEntryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_name: String,
    pub model_name: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost_usd: Decimal,
    pub brand_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    /// Balance immediately after this entry was applied.
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A usage charge to debit from a user's balance.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: Uuid,
    pub service_name: String,
    pub model_name: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost_usd: Decimal,
    pub brand_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { new_balance: Decimal, entry_id: Uuid },
    Insufficient { current_balance: Decimal },
}

/// A row from the `billing_profiles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BillingProfileRow {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub payment_customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct BillingProfileUpdate {
    pub email: Option<String>,
    pub payment_customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
}

const LEDGER_COLUMNS: &str = "id, user_id, service_name, model_name, prompt_tokens, \
     completion_tokens, total_tokens, cost_usd, brand_id, metadata, balance_after, created_at";

// ---------------------------------------------------------------------------
// balance operations
// ---------------------------------------------------------------------------

/// Current balance; users without a balance row have zero.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_balance(pool: &PgPool, user_id: Uuid) -> Result<Decimal, DbError> {
    let balance: Option<Decimal> =
        sqlx::query_scalar::<_, Decimal>("SELECT balance FROM token_balances WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(balance.unwrap_or(Decimal::ZERO))
}

/// Atomically debit `entry.cost_usd` and append the ledger entry.
///
/// The conditional `UPDATE ... WHERE balance >= cost` is the only place the
/// balance decreases, so two concurrent debits can never overdraw: the second
/// one either sees the reduced balance or matches no row.
///
/// # Errors
///
/// Returns [`DbError::Invariant`] for a negative cost, or [`DbError::Sqlx`]
/// if any statement fails.
pub async fn debit_balance(pool: &PgPool, entry: &NewLedgerEntry) -> Result<DebitOutcome, DbError> {
    if entry.cost_usd.is_sign_negative() {
        return Err(DbError::Invariant(format!(
            "debit cost must be non-negative, got {}",
            entry.cost_usd
        )));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO token_balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(entry.user_id)
        .execute(&mut *tx)
        .await?;

    let new_balance: Option<Decimal> = sqlx::query_scalar::<_, Decimal>(
        "UPDATE token_balances SET balance = balance - $2, updated_at = NOW() \
         WHERE user_id = $1 AND balance >= $2 \
         RETURNING balance",
    )
    .bind(entry.user_id)
    .bind(entry.cost_usd)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(new_balance) = new_balance else {
        let current_balance: Decimal = sqlx::query_scalar::<_, Decimal>(
            "SELECT balance FROM token_balances WHERE user_id = $1",
        )
        .bind(entry.user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.rollback().await?;
        return Ok(DebitOutcome::Insufficient { current_balance });
    };

    let entry_id = insert_ledger_entry(&mut tx, entry, entry.cost_usd, new_balance).await?;
    tx.commit().await?;

    Ok(DebitOutcome::Debited {
        new_balance,
        entry_id,
    })
}

/// Add `amount` to a user's balance and append a credit ledger entry.
///
/// Returns the new balance.
///
/// # Errors
///
/// Returns [`DbError::Invariant`] for a non-positive amount, or
/// [`DbError::Sqlx`] if any statement fails.
pub async fn credit_balance(
    pool: &PgPool,
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

    let mut tx = pool.begin().await?;

    let new_balance: Decimal = sqlx::query_scalar::<_, Decimal>(
        "INSERT INTO token_balances (user_id, balance) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE SET \
             balance    = token_balances.balance + EXCLUDED.balance, \
             updated_at = NOW() \
         RETURNING balance",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(&mut *tx)
    .await?;

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
    insert_ledger_entry(&mut tx, &entry, entry.cost_usd, new_balance).await?;
    tx.commit().await?;

    Ok(new_balance)
}

async fn insert_ledger_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &NewLedgerEntry,
    cost_usd: Decimal,
    balance_after: Decimal,
) -> Result<Uuid, DbError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO token_usage_ledger \
             (id, user_id, service_name, model_name, prompt_tokens, completion_tokens, \
              total_tokens, cost_usd, brand_id, metadata, balance_after) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(id)
    .bind(entry.user_id)
    .bind(&entry.service_name)
    .bind(&entry.model_name)
    .bind(entry.prompt_tokens)
    .bind(entry.completion_tokens)
    .bind(entry.total_tokens)
    .bind(cost_usd)
    .bind(entry.brand_id)
    .bind(&entry.metadata)
    .bind(balance_after)
    .execute(&mut **tx)
    .await?;

    Ok(id)
}

/// Most recent ledger entries for a user, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ledger_entries(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<LedgerEntryRow>, DbError> {
    let rows = sqlx::query_as::<_, LedgerEntryRow>(&format!(
        "SELECT {LEDGER_COLUMNS} FROM token_usage_ledger \
         WHERE user_id = $1 \
         ORDER BY created_at DESC \
         LIMIT $2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// billing_profiles operations
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_billing_profile(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<BillingProfileRow>, DbError> {
    let row = sqlx::query_as::<_, BillingProfileRow>(
        "SELECT user_id, email, payment_customer_id, subscription_id, subscription_status, \
                updated_at \
         FROM billing_profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Create or patch a billing profile.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_billing_profile(
    pool: &PgPool,
    user_id: Uuid,
    update: &BillingProfileUpdate,
) -> Result<BillingProfileRow, DbError> {
    let row = sqlx::query_as::<_, BillingProfileRow>(
        "INSERT INTO billing_profiles \
             (user_id, email, payment_customer_id, subscription_id, subscription_status) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (user_id) DO UPDATE SET \
             email               = COALESCE(EXCLUDED.email, billing_profiles.email), \
             payment_customer_id = COALESCE(EXCLUDED.payment_customer_id, billing_profiles.payment_customer_id), \
             subscription_id     = COALESCE(EXCLUDED.subscription_id, billing_profiles.subscription_id), \
             subscription_status = COALESCE(EXCLUDED.subscription_status, billing_profiles.subscription_status), \
             updated_at          = NOW() \
         RETURNING user_id, email, payment_customer_id, subscription_id, subscription_status, \
                   updated_at",
    )
    .bind(user_id)
    .bind(update.email.as_deref())
    .bind(update.payment_customer_id.as_deref())
    .bind(update.subscription_id.as_deref())
    .bind(update.subscription_status.as_deref())
    .fetch_one(pool)
    .await?;

    Ok(row)
}
