//! Per-model token pricing table.
//!
//! Built-in defaults cover the models the pipeline ships with; operators can
//! replace the whole table with a YAML file (see [`load_pricing`]).

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// USD price per 1 000 prompt and completion tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub prompt_per_1k: Decimal,
    pub completion_per_1k: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: String,
    #[serde(flatten)]
    pub price: ModelPrice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTable {
    /// Applied to any model not listed in `models`.
    pub fallback: ModelPrice,
    pub models: Vec<ModelEntry>,
}

impl PricingTable {
    /// Price for `model`, matched case-insensitively, else the fallback.
    #[must_use]
    pub fn price_for(&self, model: &str) -> ModelPrice {
        self.models
            .iter()
            .find(|entry| entry.model.eq_ignore_ascii_case(model))
            .map_or(self.fallback, |entry| entry.price)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let entry = |model: &str, prompt: Decimal, completion: Decimal| ModelEntry {
            model: model.to_string(),
            price: ModelPrice {
                prompt_per_1k: prompt,
                completion_per_1k: completion,
            },
        };
        Self {
            fallback: ModelPrice {
                prompt_per_1k: Decimal::new(5, 3),
                completion_per_1k: Decimal::new(15, 3),
            },
            models: vec![
                entry("openai/gpt-4o", Decimal::new(25, 4), Decimal::new(10, 3)),
                entry("openai/gpt-4o-mini", Decimal::new(15, 5), Decimal::new(6, 4)),
                entry(
                    "anthropic/claude-3.5-sonnet",
                    Decimal::new(3, 3),
                    Decimal::new(15, 3),
                ),
                entry(
                    "anthropic/claude-3-haiku",
                    Decimal::new(25, 5),
                    Decimal::new(125, 5),
                ),
            ],
        }
    }
}

/// Load and validate a pricing table from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_pricing(path: &Path) -> Result<PricingTable, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PricingFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_pricing(&content)
}

fn parse_pricing(content: &str) -> Result<PricingTable, ConfigError> {
    let table: PricingTable =
        serde_yaml::from_str(content).map_err(ConfigError::PricingFileParse)?;
    validate_pricing(&table)?;
    Ok(table)
}

fn validate_pricing(table: &PricingTable) -> Result<(), ConfigError> {
    let check = |label: &str, price: &ModelPrice| -> Result<(), ConfigError> {
        if price.prompt_per_1k.is_sign_negative() || price.completion_per_1k.is_sign_negative() {
            return Err(ConfigError::InvalidPricing(format!(
                "{label} has a negative price"
            )));
        }
        Ok(())
    };

    check("fallback", &table.fallback)?;

    let mut seen = HashSet::new();
    for entry in &table.models {
        if entry.model.trim().is_empty() {
            return Err(ConfigError::InvalidPricing(
                "model name must be non-empty".to_string(),
            ));
        }
        if !seen.insert(entry.model.to_lowercase()) {
            return Err(ConfigError::InvalidPricing(format!(
                "duplicate model: '{}'",
                entry.model
            )));
        }
        check(&entry.model, &entry.price)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
fallback:
  prompt_per_1k: "0.01"
  completion_per_1k: "0.03"
models:
  - model: openai/gpt-4o-mini
    prompt_per_1k: "0.00015"
    completion_per_1k: "0.0006"
"#;

    #[test]
    fn parses_yaml_table() {
        let table = parse_pricing(SAMPLE).expect("parse");
        assert_eq!(table.models.len(), 1);
        assert_eq!(
            table.price_for("OpenAI/GPT-4o-mini").prompt_per_1k,
            Decimal::new(15, 5)
        );
    }

    #[test]
    fn unknown_model_uses_fallback() {
        let table = parse_pricing(SAMPLE).expect("parse");
        assert_eq!(table.price_for("mistral/large"), table.fallback);
    }

    #[test]
    fn rejects_duplicate_models() {
        let yaml = r#"
fallback:
  prompt_per_1k: "0.01"
  completion_per_1k: "0.03"
models:
  - model: a
    prompt_per_1k: "0.01"
    completion_per_1k: "0.01"
  - model: A
    prompt_per_1k: "0.02"
    completion_per_1k: "0.02"
"#;
        let err = parse_pricing(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPricing(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn rejects_negative_prices() {
        let yaml = r#"
fallback:
  prompt_per_1k: "-0.01"
  completion_per_1k: "0.03"
models: []
"#;
        assert!(matches!(
            parse_pricing(yaml),
            Err(ConfigError::InvalidPricing(_))
        ));
    }

    #[test]
    fn default_table_is_valid() {
        validate_pricing(&PricingTable::default()).expect("defaults validate");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_pricing(Path::new("/nonexistent/pricing.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::PricingFileIo { .. }));
    }
}
