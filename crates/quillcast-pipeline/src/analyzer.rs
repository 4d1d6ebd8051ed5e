//! Per-source analysis as a metered sub-call: gated before, charged after.

use std::sync::Arc;

use async_trait::async_trait;
use quillcast_billing::{Charge, ChargeContext, QuotaGate};
use quillcast_generation::{
    Generator, ModelConfig, SourceAnalysisInput, SourceInsights, StageProcessor,
};
use quillcast_sources::{SourceAnalyzer, SourceError};

pub(crate) const SOURCE_ANALYSIS_SERVICE: &str = "source_analysis";

pub(crate) struct MeteredAnalyzer<'a> {
    pub processor: &'a StageProcessor<Arc<dyn Generator>>,
    pub gate: &'a QuotaGate,
    pub model: &'a ModelConfig,
    pub context: ChargeContext,
}

#[async_trait]
impl SourceAnalyzer for MeteredAnalyzer<'_> {
    async fn analyze(
        &self,
        url: &str,
        content: &str,
        keyword_context: &str,
    ) -> Result<SourceInsights, SourceError> {
        self.gate
            .ensure_affordable(self.context.user_id, self.gate.estimates().source_analysis)
            .await
            .map_err(|e| SourceError::Analysis(e.to_string()))?;

        let input = SourceAnalysisInput {
            keyword_context: keyword_context.to_string(),
            url: url.to_string(),
            content: content.to_string(),
        };
        let generated = self
            .processor
            .analyze_source(&input, self.model)
            .await
            .map_err(|failure| SourceError::Analysis(failure.to_string()))?;

        self.gate
            .charge_for_stage(
                self.context,
                SOURCE_ANALYSIS_SERVICE,
                &generated.model,
                Charge::Usage(generated.usage),
            )
            .await
            .map_err(|e| SourceError::Analysis(e.to_string()))?;

        Ok(generated.value)
    }
}
