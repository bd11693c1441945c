//! `LLMOutcomeVerifier`: delegates to a `Generator` with an
//! outcome-scoring prompt.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::generator::{GenerateOptions, Generator};
use crate::types::{Candidate, VerificationResult};
use crate::verification::prm::extract_score;

use super::{VerificationContext, Verifier};

const OUTCOME_SCORE_RANGE: (f64, f64) = (0.0, 1.0);

pub struct LlmOutcomeVerifier {
    generator: Arc<dyn Generator>,
}

impl LlmOutcomeVerifier {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    fn build_prompt(candidate: &Candidate, context: &VerificationContext) -> String {
        let mut prompt = String::from(
            "Score the following answer's correctness on a scale from 0 to 1. Respond with 'Score: X'.\n",
        );
        if let Some(gt) = &context.ground_truth {
            prompt.push_str(&format!("Expected: {gt}\n"));
        }
        prompt.push_str(&format!("Answer: {}\n", candidate.content.as_deref().unwrap_or("")));
        prompt
    }
}

#[async_trait]
impl Verifier for LlmOutcomeVerifier {
    async fn verify(&self, candidate: &Candidate, context: &VerificationContext) -> Result<VerificationResult> {
        let prompt = Self::build_prompt(candidate, context);
        let response = self
            .generator
            .generate(&prompt, &GenerateOptions::default())
            .await?;
        let text = response.content.unwrap_or_default();
        let score = extract_score(&text, OUTCOME_SCORE_RANGE);

        Ok(VerificationResult::new()
            .with_candidate_id(candidate.id.clone())
            .with_score(score)
            .with_confidence(0.8)
            .with_reasoning(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::test_support::FixedGenerator;

    #[tokio::test]
    async fn delegates_to_generator_and_extracts_score() {
        let generator = Arc::new(FixedGenerator::new("Score: 0.9", 0.0));
        let verifier = LlmOutcomeVerifier::new(generator);
        let candidate = Candidate::new().with_content("42");
        let result = verifier
            .verify(&candidate, &VerificationContext::default())
            .await
            .unwrap();
        assert!((result.score.unwrap() - 0.9).abs() < 1e-9);
    }
}
