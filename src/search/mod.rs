//! Search strategies: alternative candidate exploration
//! under verifier guidance.

mod beam;
mod diverse;
mod mcts;

pub use beam::BeamSearch;
pub use diverse::DiverseDecoding;
pub use mcts::Mcts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::generator::Generator;
use crate::types::Candidate;
use crate::verification::{VerificationContext, Verifier};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// `search(prompt, generator, verifier, opts) → best_candidate | error`.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    async fn search(
        &self,
        prompt: &str,
        generator: Arc<dyn Generator>,
        verifier: Arc<dyn Verifier>,
        opts: &SearchOptions,
    ) -> Result<Candidate>;
}

pub(crate) async fn score_candidate(
    verifier: &Arc<dyn Verifier>,
    candidate: &Candidate,
    context: &VerificationContext,
) -> f64 {
    verifier
        .verify(candidate, context)
        .await
        .ok()
        .and_then(|r| r.score)
        .unwrap_or(f64::NEG_INFINITY)
}
