//! `EnsembleDifficulty`: composes N estimators over `Box<dyn
//! DifficultyEstimator>` with a configurable combination mode.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DifficultyEstimate, DifficultyLevel};

use super::{DifficultyEstimator, EstimationContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationMode {
    WeightedAverage,
    MajorityVote,
    MaxConfidence,
    Average,
}

pub struct EnsembleDifficulty {
    estimators: Vec<Box<dyn DifficultyEstimator>>,
    weights: Option<Vec<f64>>,
    mode: CombinationMode,
    fallback: Option<Box<dyn DifficultyEstimator>>,
}

impl EnsembleDifficulty {
    pub fn new(estimators: Vec<Box<dyn DifficultyEstimator>>) -> Self {
        Self {
            estimators,
            weights: None,
            mode: CombinationMode::WeightedAverage,
            fallback: None,
        }
    }

    /// Weights must match the estimator count; they are normalised
    /// internally.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_mode(mut self, mode: CombinationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_fallback(mut self, fallback: Box<dyn DifficultyEstimator>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn normalized_weights(&self) -> Vec<f64> {
        match &self.weights {
            Some(w) if w.len() == self.estimators.len() => {
                let total: f64 = w.iter().sum();
                if total > 0.0 {
                    w.iter().map(|x| x / total).collect()
                } else {
                    vec![1.0 / self.estimators.len() as f64; self.estimators.len()]
                }
            }
            _ => vec![1.0 / self.estimators.len() as f64; self.estimators.len()],
        }
    }

    fn combine(&self, estimates: Vec<DifficultyEstimate>) -> DifficultyEstimate {
        match self.mode {
            CombinationMode::WeightedAverage | CombinationMode::Average => {
                let weights = if self.mode == CombinationMode::Average {
                    vec![1.0 / estimates.len() as f64; estimates.len()]
                } else {
                    self.normalized_weights()
                };
                let score = estimates
                    .iter()
                    .zip(weights.iter())
                    .map(|(e, w)| e.score * w)
                    .sum::<f64>();
                let confidence = estimates
                    .iter()
                    .zip(weights.iter())
                    .map(|(e, w)| e.confidence * w)
                    .sum::<f64>();
                DifficultyEstimate::new(score, confidence)
                    .with_reasoning("ensemble: weighted/average combination")
            }
            CombinationMode::MaxConfidence => {
                let best = estimates
                    .into_iter()
                    .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
                    .expect("non-empty estimates");
                DifficultyEstimate::new(best.score, best.confidence)
                    .with_reasoning("ensemble: max-confidence estimator")
            }
            CombinationMode::MajorityVote => {
                let mut counts: std::collections::HashMap<DifficultyLevel, usize> = std::collections::HashMap::new();
                for e in &estimates {
                    *counts.entry(e.level).or_insert(0) += 1;
                }
                let (level, _) = counts
                    .into_iter()
                    .max_by_key(|(_, c)| *c)
                    .expect("non-empty estimates");
                let matching: Vec<&DifficultyEstimate> = estimates.iter().filter(|e| e.level == level).collect();
                let avg_score = matching.iter().map(|e| e.score).sum::<f64>() / matching.len() as f64;
                let avg_confidence = matching.iter().map(|e| e.confidence).sum::<f64>() / matching.len() as f64;
                DifficultyEstimate::new(avg_score, avg_confidence)
                    .with_reasoning("ensemble: majority vote over difficulty levels")
            }
        }
    }
}

#[async_trait]
impl DifficultyEstimator for EnsembleDifficulty {
    async fn estimate(&self, query: &str, context: &EstimationContext) -> Result<DifficultyEstimate> {
        let mut estimates = Vec::with_capacity(self.estimators.len());
        let mut first_error = None;

        for estimator in &self.estimators {
            match estimator.estimate(query, context).await {
                Ok(e) => estimates.push(e),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if estimates.is_empty() {
            if let Some(fallback) = &self.fallback {
                return fallback.estimate(query, context).await;
            }
            return Err(first_error.expect("at least one estimator must have been attempted"));
        }

        Ok(self.combine(estimates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct FixedEstimator(f64, f64);
    #[async_trait]
    impl DifficultyEstimator for FixedEstimator {
        async fn estimate(&self, _q: &str, _c: &EstimationContext) -> Result<DifficultyEstimate> {
            Ok(DifficultyEstimate::new(self.0, self.1))
        }
    }

    struct FailingEstimator;
    #[async_trait]
    impl DifficultyEstimator for FailingEstimator {
        async fn estimate(&self, _q: &str, _c: &EstimationContext) -> Result<DifficultyEstimate> {
            Err(Error::generator_failed("boom"))
        }
    }

    #[tokio::test]
    async fn weighted_average_combines_scores() {
        let ensemble = EnsembleDifficulty::new(vec![
            Box::new(FixedEstimator(0.2, 1.0)),
            Box::new(FixedEstimator(0.8, 1.0)),
        ])
        .with_weights(vec![1.0, 1.0]);
        let estimate = ensemble.estimate("q", &EstimationContext::default()).await.unwrap();
        assert!((estimate.score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn falls_back_when_all_estimators_fail() {
        let ensemble = EnsembleDifficulty::new(vec![Box::new(FailingEstimator), Box::new(FailingEstimator)])
            .with_fallback(Box::new(FixedEstimator(0.5, 1.0)));
        let estimate = ensemble.estimate("q", &EstimationContext::default()).await.unwrap();
        assert_eq!(estimate.score, 0.5);
    }

    #[tokio::test]
    async fn surfaces_first_error_without_fallback() {
        let ensemble = EnsembleDifficulty::new(vec![Box::new(FailingEstimator)]);
        let result = ensemble.estimate("q", &EstimationContext::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn majority_vote_picks_dominant_level() {
        let ensemble = EnsembleDifficulty::new(vec![
            Box::new(FixedEstimator(0.1, 1.0)),
            Box::new(FixedEstimator(0.2, 1.0)),
            Box::new(FixedEstimator(0.9, 1.0)),
        ])
        .with_mode(CombinationMode::MajorityVote);
        let estimate = ensemble.estimate("q", &EstimationContext::default()).await.unwrap();
        assert_eq!(estimate.level, DifficultyLevel::Easy);
    }
}
