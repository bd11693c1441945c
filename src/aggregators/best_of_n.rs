//! Best-of-N aggregation: selects the candidate with the
//! maximum score, treating absent scores as negative infinity.

use std::collections::HashMap;

use serde_json::json;

use crate::error::{Error, Result};
use crate::types::Candidate;

use super::{majority_vote::normalize_answer, AggregationOutcome, Aggregator};

#[derive(Debug, Clone, Default)]
pub struct BestOfN;

impl BestOfN {
    pub fn new() -> Self {
        Self
    }
}

impl Aggregator for BestOfN {
    fn aggregate(&self, candidates: &[Candidate]) -> Result<AggregationOutcome> {
        if candidates.is_empty() {
            return Err(Error::NoCandidates);
        }

        let (index, _) = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.score.unwrap_or(f64::NEG_INFINITY)))
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .expect("non-empty candidate set");

        let best_candidate = candidates[index].clone();
        let mut metadata = HashMap::new();
        metadata.insert("selected_index".to_string(), json!(index));
        metadata.insert("score".to_string(), json!(best_candidate.score));

        Ok(AggregationOutcome {
            best_candidate,
            metadata,
        })
    }

    fn distribution(&self, candidates: &[Candidate]) -> HashMap<String, i64> {
        let mut counts = HashMap::new();
        for c in candidates {
            let answer = normalize_answer(c.content.as_deref().unwrap_or(""));
            *counts.entry(answer).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_highest_score() {
        let candidates = vec![
            Candidate::new().with_score(0.2),
            Candidate::new().with_score(0.9),
            Candidate::new().with_score(0.5),
        ];
        let outcome = BestOfN::new().aggregate(&candidates).unwrap();
        assert_eq!(outcome.best_candidate.score, Some(0.9));
    }

    #[test]
    fn treats_absent_score_as_negative_infinity() {
        let candidates = vec![Candidate::new(), Candidate::new().with_score(-5.0)];
        let outcome = BestOfN::new().aggregate(&candidates).unwrap();
        assert_eq!(outcome.best_candidate.score, Some(-5.0));
    }

    #[test]
    fn empty_candidates_is_no_candidates_error() {
        assert!(matches!(BestOfN::new().aggregate(&[]), Err(Error::NoCandidates)));
    }
}
