//! Weighted aggregation: linear combination of candidate
//! score with optional extra signals; default weights are equivalent to
//! `BestOfN`.

use std::collections::HashMap;

use serde_json::json;

use crate::error::{Error, Result};
use crate::types::Candidate;

use super::{majority_vote::normalize_answer, AggregationOutcome, Aggregator};

/// An additional scoring signal contributed by e.g. a verifier, keyed by
/// candidate id.
#[derive(Debug, Clone, Default)]
pub struct ExtraSignal {
    pub weight: f64,
    pub values: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct Weighted {
    score_weight: f64,
    extra_signals: Vec<ExtraSignal>,
}

impl Default for Weighted {
    fn default() -> Self {
        // Equivalent to BestOfN: score weight 1.0, no extra signals.
        Self {
            score_weight: 1.0,
            extra_signals: Vec::new(),
        }
    }
}

impl Weighted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score_weight(mut self, weight: f64) -> Self {
        self.score_weight = weight;
        self
    }

    pub fn with_extra_signal(mut self, signal: ExtraSignal) -> Self {
        self.extra_signals.push(signal);
        self
    }

    fn combined_score(&self, candidate: &Candidate) -> f64 {
        let mut total = self.score_weight * candidate.score.unwrap_or(f64::NEG_INFINITY);
        for signal in &self.extra_signals {
            if let Some(v) = signal.values.get(&candidate.id) {
                total += signal.weight * v;
            }
        }
        total
    }
}

impl Aggregator for Weighted {
    fn aggregate(&self, candidates: &[Candidate]) -> Result<AggregationOutcome> {
        if candidates.is_empty() {
            return Err(Error::NoCandidates);
        }

        let (index, combined) = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.combined_score(c)))
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .expect("non-empty candidate set");

        let best_candidate = candidates[index].clone();
        let mut metadata = HashMap::new();
        metadata.insert("selected_index".to_string(), json!(index));
        metadata.insert("combined_score".to_string(), json!(combined));

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
    fn default_weighted_matches_best_of_n() {
        let candidates = vec![Candidate::new().with_score(0.1), Candidate::new().with_score(0.8)];
        let outcome = Weighted::new().aggregate(&candidates).unwrap();
        assert_eq!(outcome.best_candidate.score, Some(0.8));
    }

    #[test]
    fn extra_signal_can_flip_the_winner() {
        let a = Candidate::new().with_score(0.5);
        let b = Candidate::new().with_score(0.4);
        let mut values = HashMap::new();
        values.insert(b.id.clone(), 10.0);
        let signal = ExtraSignal { weight: 1.0, values };
        let aggregator = Weighted::new().with_extra_signal(signal);
        let outcome = aggregator.aggregate(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(outcome.best_candidate.id, b.id);
    }
}
