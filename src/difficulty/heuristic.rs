//! `HeuristicDifficulty`: pure, O(length) scoring via a `LazyLock<Regex>`
//! pattern bank, producing a continuous `[0,1]` difficulty score.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{Error, Result};
use crate::types::DifficultyEstimate;

use super::{DifficultyEstimator, EstimationContext};

const MAX_QUERY_BYTES: usize = 50_000;

static SUBJECT_DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(quantum|algorithm|theorem|derivative|integral|entropy|asymptotic|protocol|architecture|distributed|concurren\w*|thermodynamic|relativity)\b")
        .expect("valid regex")
});

static REASONING_CUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(why|how does|explain|prove|derive|compare|analy[sz]e|evaluate|trade-?off|implications?)\b")
        .expect("valid regex")
});

static SPECIAL_CHAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z0-9\s]").expect("valid regex")
});

#[derive(Debug, Clone, Copy)]
pub struct HeuristicDifficulty {
    length_weight: f64,
    token_weight: f64,
    special_char_weight: f64,
    subject_domain_weight: f64,
    reasoning_cue_weight: f64,
}

impl Default for HeuristicDifficulty {
    fn default() -> Self {
        Self {
            length_weight: 0.25,
            token_weight: 0.2,
            special_char_weight: 0.1,
            subject_domain_weight: 0.25,
            reasoning_cue_weight: 0.2,
        }
    }
}

impl HeuristicDifficulty {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(Error::invalid_query("query must not be empty"));
        }
        let len = query.len();
        if len > MAX_QUERY_BYTES {
            return Err(Error::QueryTooLong {
                len,
                max: MAX_QUERY_BYTES,
            });
        }
        Ok(())
    }

    fn score(&self, query: &str) -> f64 {
        let length = query.chars().count() as f64;
        let tokens: Vec<&str> = query.split_whitespace().collect();
        let token_count = tokens.len() as f64;

        // Length: saturates around 400 characters.
        let length_score = (length / 400.0).min(1.0);
        // Token count: saturates around 80 tokens.
        let token_score = (token_count / 80.0).min(1.0);

        let special_chars = SPECIAL_CHAR_PATTERN.find_iter(query).count() as f64;
        let special_char_score = if length > 0.0 {
            (special_chars / length * 5.0).min(1.0)
        } else {
            0.0
        };

        let subject_hits = SUBJECT_DOMAIN_PATTERN.find_iter(query).count() as f64;
        let subject_domain_score = (subject_hits / 3.0).min(1.0);

        let reasoning_hits = REASONING_CUE_PATTERN.find_iter(query).count() as f64;
        let reasoning_cue_score = (reasoning_hits / 2.0).min(1.0);

        let raw = self.length_weight * length_score
            + self.token_weight * token_score
            + self.special_char_weight * special_char_score
            + self.subject_domain_weight * subject_domain_score
            + self.reasoning_cue_weight * reasoning_cue_score;

        raw.clamp(0.0, 1.0)
    }
}

#[async_trait]
impl DifficultyEstimator for HeuristicDifficulty {
    async fn estimate(&self, query: &str, _context: &EstimationContext) -> Result<DifficultyEstimate> {
        Self::validate(query)?;
        let score = self.score(query);
        Ok(DifficultyEstimate::new(score, 1.0)
            .with_reasoning(format!("heuristic score {score:.3} from length/token/keyword signals")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DifficultyLevel;

    #[tokio::test]
    async fn rejects_empty_query() {
        let estimator = HeuristicDifficulty::new();
        let result = estimator.estimate("", &EstimationContext::default()).await;
        assert!(matches!(result, Err(Error::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn accepts_query_at_49999_bytes() {
        let query = "a".repeat(49_999);
        let estimator = HeuristicDifficulty::new();
        assert!(estimator.estimate(&query, &EstimationContext::default()).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_query_at_50001_bytes() {
        let query = "a".repeat(50_001);
        let estimator = HeuristicDifficulty::new();
        let result = estimator.estimate(&query, &EstimationContext::default()).await;
        assert!(matches!(result, Err(Error::QueryTooLong { .. })));
    }

    #[tokio::test]
    async fn short_plain_query_is_easy() {
        let estimator = HeuristicDifficulty::new();
        let estimate = estimator.estimate("What is 2+2?", &EstimationContext::default()).await.unwrap();
        assert_eq!(estimate.level, DifficultyLevel::Easy);
    }

    #[tokio::test]
    async fn long_technical_query_is_hard() {
        let estimator = HeuristicDifficulty::new();
        let query = "Explain in detail how quantum entanglement relates to the thermodynamic entropy bounds \
            of a distributed protocol, and analyze the trade-offs of asymptotic complexity versus architecture \
            decisions; derive the implications for concurrency and compare with classical relativity arguments, \
            covering at least five distinct theorems and their proofs along the way in a thorough survey."
            .repeat(2);
        let estimate = estimator.estimate(&query, &EstimationContext::default()).await.unwrap();
        assert_eq!(estimate.level, DifficultyLevel::Hard);
    }

    #[tokio::test]
    async fn is_deterministic_given_identical_input() {
        let estimator = HeuristicDifficulty::new();
        let a = estimator.estimate("explain the algorithm", &EstimationContext::default()).await.unwrap();
        let b = estimator.estimate("explain the algorithm", &EstimationContext::default()).await.unwrap();
        assert_eq!(a.score, b.score);
    }
}
