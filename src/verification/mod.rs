//! Verification: heterogeneous verifiers composed by a
//! `VerificationRunner` with pluggable score aggregation.

mod deterministic;
mod llm_outcome;
pub(crate) mod prm;
mod runner;

pub use deterministic::{ComparisonMode, DeterministicVerifier};
pub use llm_outcome::LlmOutcomeVerifier;
pub use prm::{PrmClassification, ProcessRewardModel};
pub use runner::{AggregationMode, ErrorPolicy, VerificationRunner, VerifierEntry, VerifyOptions};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Candidate, VerificationResult};

/// Arbitrary candidate context (ground truth, reasoning trace, etc.)
/// threaded through to verifiers.
#[derive(Debug, Clone, Default)]
pub struct VerificationContext {
    pub ground_truth: Option<String>,
    pub reasoning_trace: Option<Vec<String>>,
}

/// `verify(candidate, context) → VerificationResult | error`.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, candidate: &Candidate, context: &VerificationContext) -> Result<VerificationResult>;

    async fn verify_batch(
        &self,
        candidates: &[Candidate],
        context: &VerificationContext,
    ) -> Vec<Result<VerificationResult>> {
        let mut out = Vec::with_capacity(candidates.len());
        for c in candidates {
            out.push(self.verify(c, context).await);
        }
        out
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}
