//! Turning reported token usage into a USD cost.

use quillcast_core::{PricingTable, Stage, TokenUsage};
use rust_decimal::Decimal;

/// Share of a bare total attributed to the prompt when the provider does not
/// split the count. An estimate: real ratios vary by stage and model.
pub const ASSUMED_PROMPT_PERCENT: u64 = 70;

/// Ledger precision (`NUMERIC(14, 6)`).
const COST_DECIMAL_PLACES: u32 = 6;

/// What a finished call should be charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    /// Price the reported usage against the pricing table.
    Usage(TokenUsage),
    /// Charge exactly this amount; token counts are recorded as zero.
    Flat(rust_decimal::Decimal),
}

/// A charge priced out, with the token counts the ledger records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCost {
    pub cost: Decimal,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Split usage into (prompt, completion). A missing side is derived from the
/// total when possible; a bare total falls back to the assumed ratio.
#[must_use]
pub fn split_usage(usage: &TokenUsage) -> (u64, u64) {
    match (usage.prompt_tokens, usage.completion_tokens) {
        (Some(prompt), Some(completion)) => (prompt, completion),
        (Some(prompt), None) => (prompt, usage.total().saturating_sub(prompt)),
        (None, Some(completion)) => (usage.total().saturating_sub(completion), completion),
        (None, None) => {
            let total = usage.total();
            let prompt = total * ASSUMED_PROMPT_PERCENT / 100;
            (prompt, total - prompt)
        }
    }
}

/// Price a charge. A flat amount wins over any usage; otherwise the model's
/// per-1K rates apply (the table's fallback for unknown models).
#[must_use]
pub fn resolve_cost(pricing: &PricingTable, model: &str, charge: &Charge) -> ResolvedCost {
    match charge {
        Charge::Flat(amount) => ResolvedCost {
            cost: amount.round_dp(COST_DECIMAL_PLACES),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        },
        Charge::Usage(usage) => {
            let (prompt, completion) = split_usage(usage);
            let price = pricing.price_for(model);
            let thousand = Decimal::from(1_000u32);
            let cost = Decimal::from(prompt) / thousand * price.prompt_per_1k
                + Decimal::from(completion) / thousand * price.completion_per_1k;
            ResolvedCost {
                cost: cost.round_dp(COST_DECIMAL_PLACES),
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }
        }
    }
}

/// Pre-call cost estimates used by the gate before any paid call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEstimates {
    pub keyword_research: Decimal,
    pub content_strategy: Decimal,
    /// The candidate-listing call only; each page analysis is gated separately.
    pub source_discovery: Decimal,
    pub writing: Decimal,
    pub humanization: Decimal,
    pub review: Decimal,
    pub source_analysis: Decimal,
}

impl StageEstimates {
    #[must_use]
    pub fn for_stage(&self, stage: Stage) -> Decimal {
        match stage {
            Stage::KeywordResearch => self.keyword_research,
            Stage::ContentStrategy => self.content_strategy,
            Stage::SourceDiscovery => self.source_discovery,
            Stage::Writing => self.writing,
            Stage::Humanization => self.humanization,
            Stage::Review => self.review,
        }
    }

    /// Every stage estimated at the same amount. Handy for tests.
    #[must_use]
    pub fn uniform(amount: Decimal) -> Self {
        Self {
            keyword_research: amount,
            content_strategy: amount,
            source_discovery: amount,
            writing: amount,
            humanization: amount,
            review: amount,
            source_analysis: amount,
        }
    }
}

impl Default for StageEstimates {
    fn default() -> Self {
        Self {
            keyword_research: Decimal::new(1, 2),
            content_strategy: Decimal::new(1, 2),
            source_discovery: Decimal::new(1, 2),
            writing: Decimal::new(5, 2),
            humanization: Decimal::new(3, 2),
            review: Decimal::new(3, 2),
            source_analysis: Decimal::new(5, 3),
        }
    }
}
