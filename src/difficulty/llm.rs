//! `LLMDifficulty`: delegates to the `Generator` abstraction
//! with a dedicated prompt; honours a timeout. In test mode it operates
//! in simulation (no external call) and always succeeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout as tokio_timeout;

use crate::error::{Error, Result};
use crate::generator::{GenerateOptions, Generator};
use crate::types::DifficultyEstimate;
use crate::verification::prm::extract_score;

use super::{DifficultyEstimator, EstimationContext};

pub struct LlmDifficulty {
    generator: Arc<dyn Generator>,
    timeout: Duration,
    test_mode: bool,
}

impl LlmDifficulty {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            timeout: Duration::from_millis(10_000),
            test_mode: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs in simulation without calling the generator; always succeeds.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    fn simulate(query: &str) -> DifficultyEstimate {
        let score = ((query.len() as f64 / 200.0).min(1.0)).clamp(0.0, 1.0);
        DifficultyEstimate::new(score, 0.5).with_reasoning("simulated (test mode)")
    }
}

#[async_trait]
impl DifficultyEstimator for LlmDifficulty {
    async fn estimate(&self, query: &str, _context: &EstimationContext) -> Result<DifficultyEstimate> {
        if self.test_mode {
            return Ok(Self::simulate(query));
        }

        let prompt = format!(
            "Rate the difficulty of answering this query from 0 (trivial) to 1 (expert-level). \
             Respond with 'Score: X'.\nQuery: {query}"
        );

        let response = match tokio_timeout(self.timeout, self.generator.generate(&prompt, &GenerateOptions::default())).await {
            Ok(r) => r?,
            Err(_) => return Err(Error::timeout(self.timeout.as_millis() as u64)),
        };

        let text = response.content.unwrap_or_default();
        let score = extract_score(&text, (0.0, 1.0));
        Ok(DifficultyEstimate::new(score, 0.8).with_reasoning(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::test_support::FixedGenerator;

    #[tokio::test]
    async fn test_mode_never_calls_generator() {
        let generator = Arc::new(FixedGenerator::new("Score: 0.9", 0.0));
        let estimator = LlmDifficulty::new(generator.clone()).with_test_mode(true);
        let estimate = estimator.estimate("short query", &EstimationContext::default()).await.unwrap();
        assert_eq!(generator.call_count(), 0);
        assert!(estimate.score >= 0.0 && estimate.score <= 1.0);
    }

    #[tokio::test]
    async fn delegates_to_generator_when_not_in_test_mode() {
        let generator = Arc::new(FixedGenerator::new("Score: 0.9", 0.0));
        let estimator = LlmDifficulty::new(generator);
        let estimate = estimator.estimate("explain quantum computing", &EstimationContext::default()).await.unwrap();
        assert!((estimate.score - 0.9).abs() < 1e-9);
    }
}
