//! Difficulty estimation: classifies a query as
//! `easy|medium|hard` with a numeric score.

mod ensemble;
mod heuristic;
mod llm;

pub use ensemble::{CombinationMode, EnsembleDifficulty};
pub use heuristic::HeuristicDifficulty;
pub use llm::LlmDifficulty;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::DifficultyEstimate;

/// Arbitrary context (conversation history, domain hints) passed to
/// estimators alongside the raw query.
pub type EstimationContext = HashMap<String, Value>;

#[async_trait]
pub trait DifficultyEstimator: Send + Sync {
    async fn estimate(&self, query: &str, context: &EstimationContext) -> Result<DifficultyEstimate>;

    /// Processes queries in order, aborting at the first invalid query
    ///.
    async fn estimate_batch(
        &self,
        queries: &[String],
        context: &EstimationContext,
    ) -> Result<Vec<DifficultyEstimate>> {
        let mut out = Vec::with_capacity(queries.len());
        for q in queries {
            out.push(self.estimate(q, context).await?);
        }
        Ok(out)
    }
}
