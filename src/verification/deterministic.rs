//! `DeterministicVerifier`: compares a candidate's extracted
//! answer against a ground truth.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Candidate, VerificationResult};

use super::{Verifier, VerificationContext};

fn whitespace_normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComparisonMode {
    Exact { whitespace_normalized: bool },
    Numerical { tolerance: f64 },
    Substring,
}

#[derive(Debug, Clone)]
pub struct DeterministicVerifier {
    mode: ComparisonMode,
}

impl DeterministicVerifier {
    pub fn new(mode: ComparisonMode) -> Self {
        Self { mode }
    }

    fn compare(&self, answer: &str, ground_truth: &str) -> bool {
        match self.mode {
            ComparisonMode::Exact { whitespace_normalized } => {
                if whitespace_normalized {
                    whitespace_normalize(answer) == whitespace_normalize(ground_truth)
                } else {
                    answer == ground_truth
                }
            }
            ComparisonMode::Numerical { tolerance } => {
                match (answer.trim().parse::<f64>(), ground_truth.trim().parse::<f64>()) {
                    (Ok(a), Ok(b)) => (a - b).abs() <= tolerance,
                    _ => false,
                }
            }
            ComparisonMode::Substring => answer.contains(ground_truth),
        }
    }
}

#[async_trait]
impl Verifier for DeterministicVerifier {
    async fn verify(&self, candidate: &Candidate, context: &VerificationContext) -> Result<VerificationResult> {
        let answer = candidate.content.as_deref().unwrap_or("");
        let ground_truth = context.ground_truth.as_deref().unwrap_or("");
        let matches = self.compare(answer, ground_truth);

        Ok(VerificationResult::new()
            .with_candidate_id(candidate.id.clone())
            .with_score(if matches { 1.0 } else { 0.0 })
            .with_confidence(1.0)
            .with_reasoning(if matches {
                "matches ground truth".to_string()
            } else {
                "does not match ground truth".to_string()
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(content: &str) -> Candidate {
        Candidate::new().with_content(content)
    }

    fn context(ground_truth: &str) -> VerificationContext {
        VerificationContext {
            ground_truth: Some(ground_truth.to_string()),
            reasoning_trace: None,
        }
    }

    #[tokio::test]
    async fn exact_whitespace_normalized_match() {
        let verifier = DeterministicVerifier::new(ComparisonMode::Exact { whitespace_normalized: true });
        let result = verifier
            .verify(&candidate("  42  "), &context("42"))
            .await
            .unwrap();
        assert_eq!(result.score, Some(1.0));
        assert_eq!(result.confidence, Some(1.0));
    }

    #[tokio::test]
    async fn numerical_within_tolerance() {
        let verifier = DeterministicVerifier::new(ComparisonMode::Numerical { tolerance: 0.01 });
        let result = verifier
            .verify(&candidate("3.14"), &context("3.141"))
            .await
            .unwrap();
        assert_eq!(result.score, Some(1.0));
    }

    #[tokio::test]
    async fn substring_match() {
        let verifier = DeterministicVerifier::new(ComparisonMode::Substring);
        let result = verifier
            .verify(&candidate("the answer is 42 exactly"), &context("42"))
            .await
            .unwrap();
        assert_eq!(result.score, Some(1.0));
    }

    #[tokio::test]
    async fn mismatch_scores_zero() {
        let verifier = DeterministicVerifier::new(ComparisonMode::Exact { whitespace_normalized: false });
        let result = verifier
            .verify(&candidate("41"), &context("42"))
            .await
            .unwrap();
        assert_eq!(result.score, Some(0.0));
    }
}
