//! Balance checks before paid calls and debits after them.

use std::sync::Arc;

use quillcast_core::{PricingTable, Stage};
use quillcast_db::{DebitOutcome, LedgerStore, NewLedgerEntry};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::cost::{resolve_cost, Charge, ResolvedCost, StageEstimates};
use crate::error::BillingError;

/// Result of charging a finished call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Charged {
        new_balance: Decimal,
        cost: Decimal,
    },
    /// Nothing was debited. `tokens_needed` is the USD cost the charge required.
    Insufficient {
        current_balance: Decimal,
        tokens_needed: Decimal,
    },
}

/// Who a charge is billed to and what it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeContext {
    pub user_id: Uuid,
    pub brand_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
}

pub struct QuotaGate {
    ledger: Arc<dyn LedgerStore>,
    pricing: PricingTable,
    estimates: StageEstimates,
}

impl QuotaGate {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, pricing: PricingTable) -> Self {
        Self {
            ledger,
            pricing,
            estimates: StageEstimates::default(),
        }
    }

    #[must_use]
    pub fn with_estimates(mut self, estimates: StageEstimates) -> Self {
        self.estimates = estimates;
        self
    }

    #[must_use]
    pub fn estimates(&self) -> &StageEstimates {
        &self.estimates
    }

    #[must_use]
    pub fn estimated_cost(&self, stage: Stage) -> Decimal {
        self.estimates.for_stage(stage)
    }

    /// # Errors
    ///
    /// Returns [`BillingError::Store`] if the balance cannot be read.
    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, BillingError> {
        Ok(self.ledger.balance(user_id).await?)
    }

    /// Succeed only if `user_id` can cover `required`. Must be called before
    /// the paid call it guards; returns the balance seen.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InsufficientBalance`] when the balance is short,
    /// or [`BillingError::Store`] if it cannot be read.
    pub async fn ensure_affordable(
        &self,
        user_id: Uuid,
        required: Decimal,
    ) -> Result<Decimal, BillingError> {
        let current_balance = self.ledger.balance(user_id).await?;
        if current_balance < required {
            tracing::info!(
                %user_id,
                %current_balance,
                %required,
                "balance check refused paid call"
            );
            return Err(BillingError::InsufficientBalance {
                current_balance,
                required,
            });
        }
        Ok(current_balance)
    }

    /// Price a finished call and debit it atomically with its ledger entry.
    ///
    /// Only calls whose output was accepted should be charged.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Store`] on persistence failure.
    pub async fn charge_for_stage(
        &self,
        context: ChargeContext,
        service_name: &str,
        model: &str,
        charge: Charge,
    ) -> Result<ChargeOutcome, BillingError> {
        let resolved = resolve_cost(&self.pricing, model, &charge);
        let entry = ledger_entry(context, service_name, model, &resolved);

        match self.ledger.debit(&entry).await? {
            DebitOutcome::Debited {
                new_balance,
                entry_id,
            } => {
                tracing::debug!(
                    user_id = %context.user_id,
                    service = service_name,
                    model,
                    cost = %resolved.cost,
                    %new_balance,
                    %entry_id,
                    "charged paid call"
                );
                Ok(ChargeOutcome::Charged {
                    new_balance,
                    cost: resolved.cost,
                })
            }
            DebitOutcome::Insufficient { current_balance } => {
                tracing::warn!(
                    user_id = %context.user_id,
                    service = service_name,
                    cost = %resolved.cost,
                    %current_balance,
                    "debit refused, balance too low"
                );
                Ok(ChargeOutcome::Insufficient {
                    current_balance,
                    tokens_needed: resolved.cost,
                })
            }
        }
    }

    /// Top up a balance. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidAmount`] for a non-positive amount, or
    /// [`BillingError::Store`] on persistence failure.
    pub async fn credit_balance(
        &self,
        user_id: Uuid,
        amount: Decimal,
        reason: &str,
    ) -> Result<Decimal, BillingError> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::InvalidAmount(format!(
                "credit must be positive, got {amount}"
            )));
        }
        let new_balance = self
            .ledger
            .credit(
                user_id,
                amount,
                "credit",
                serde_json::json!({ "reason": reason }),
            )
            .await?;
        tracing::info!(%user_id, %amount, %new_balance, "balance credited");
        Ok(new_balance)
    }
}

fn ledger_entry(
    context: ChargeContext,
    service_name: &str,
    model: &str,
    resolved: &ResolvedCost,
) -> NewLedgerEntry {
    let tokens = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
    NewLedgerEntry {
        user_id: context.user_id,
        service_name: service_name.to_string(),
        model_name: model.to_string(),
        prompt_tokens: tokens(resolved.prompt_tokens),
        completion_tokens: tokens(resolved.completion_tokens),
        total_tokens: tokens(resolved.total_tokens),
        cost_usd: resolved.cost,
        brand_id: context.brand_id,
        metadata: serde_json::json!({ "campaign_id": context.campaign_id }),
    }
}
