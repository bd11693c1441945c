//! `VerificationRunner`: composes heterogeneous verifiers as
//! `Vec<(Box<dyn Verifier>, config, weight)>` with pluggable score
//! aggregation and error handling.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::Value;
use tokio::time::timeout as tokio_timeout;

use crate::error::{Error, Result};
use crate::telemetry;
use crate::types::{Candidate, VerificationResult};

use super::{Verifier, VerificationContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    WeightedAvg,
    Max,
    Min,
    Sum,
    Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    Continue,
    Halt,
}

/// Per-run overrides honoured by `verify_candidate`.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub mode: Option<AggregationMode>,
    pub timeout: Option<Duration>,
}

pub struct VerifierEntry {
    pub verifier: Box<dyn Verifier>,
    pub config: HashMap<String, Value>,
    pub weight: f64,
}

impl VerifierEntry {
    pub fn new(verifier: Box<dyn Verifier>, weight: f64) -> Self {
        Self {
            verifier,
            config: HashMap::new(),
            weight,
        }
    }
}

pub struct VerificationRunner {
    verifiers: Vec<VerifierEntry>,
    parallel: bool,
    aggregation: AggregationMode,
    on_error: ErrorPolicy,
    default_timeout: Duration,
}

impl VerificationRunner {
    pub fn new(verifiers: Vec<VerifierEntry>) -> Self {
        Self {
            verifiers,
            parallel: false,
            aggregation: AggregationMode::WeightedAvg,
            on_error: ErrorPolicy::Continue,
            default_timeout: Duration::from_millis(30_000),
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_aggregation(mut self, mode: AggregationMode) -> Self {
        self.aggregation = mode;
        self
    }

    pub fn with_on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub async fn verify_candidate(
        &self,
        candidate: &Candidate,
        context: &VerificationContext,
        opts: &VerifyOptions,
    ) -> Result<VerificationResult> {
        telemetry::verification_start(&candidate.id);
        let start = Instant::now();

        if self.verifiers.is_empty() {
            telemetry::verification_stop(&candidate.id, start.elapsed());
            return Ok(VerificationResult::new()
                .with_candidate_id(candidate.id.clone())
                .with_score(0.0)
                .with_reasoning("No verification results"));
        }

        let run_timeout = opts.timeout.unwrap_or(self.default_timeout);
        let mode = opts.mode.unwrap_or(self.aggregation);

        let run_one = |entry: &VerifierEntry| {
            let fut = entry.verifier.verify(candidate, context);
            async move {
                match tokio_timeout(run_timeout, fut).await {
                    Ok(res) => res,
                    Err(_) => Err(Error::timeout(run_timeout.as_millis() as u64)),
                }
            }
        };

        let mut results: Vec<Result<VerificationResult>> = Vec::with_capacity(self.verifiers.len());
        if self.parallel {
            let futures = self.verifiers.iter().map(run_one);
            results = join_all(futures).await;
        } else {
            for entry in &self.verifiers {
                let result = run_one(entry).await;
                if result.is_err() && self.on_error == ErrorPolicy::Halt {
                    results.push(result);
                    break;
                }
                results.push(result);
            }
        }

        if self.on_error == ErrorPolicy::Halt {
            if let Some(Err(e)) = results.iter().find(|r| r.is_err()) {
                telemetry::verification_stop(&candidate.id, start.elapsed());
                return Err(Error::verification_failed(e.to_string()));
            }
        }

        let mut weighted_results: Vec<(&VerifierEntry, &VerificationResult)> = Vec::new();
        let mut error_count = 0usize;
        for (entry, result) in self.verifiers.iter().zip(results.iter()) {
            match result {
                Ok(r) => weighted_results.push((entry, r)),
                Err(_) => error_count += 1,
            }
        }

        let combined = combine(&weighted_results, mode);
        telemetry::verification_stop(&candidate.id, start.elapsed());
        let mut result = combined.into_result(error_count);
        result.candidate_id = Some(candidate.id.clone());
        Ok(result)
    }

    pub async fn verify_all_candidates(
        &self,
        candidates: &[Candidate],
        context: &VerificationContext,
        opts: &VerifyOptions,
    ) -> Vec<Result<VerificationResult>> {
        let mut out = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let result = self.verify_candidate(candidate, context, opts).await;
            out.push(result);
        }
        out
    }
}

struct Combined {
    score: f64,
    confidence: Option<f64>,
    step_scores: HashMap<String, f64>,
    verifier_count: usize,
}

impl Combined {
    fn into_result(self, error_count: usize) -> VerificationResult {
        let reasoning = if self.verifier_count > 0 {
            "Combined verification".to_string()
        } else {
            "No verification results".to_string()
        };
        let mut metadata: HashMap<String, Value> = HashMap::new();
        metadata.insert("verifier_count".to_string(), serde_json::json!(self.verifier_count));
        metadata.insert("error_count".to_string(), serde_json::json!(error_count));

        let mut result = VerificationResult::new()
            .with_score(self.score)
            .with_reasoning(reasoning);
        if let Some(conf) = self.confidence {
            result = result.with_confidence(conf);
        }
        if !self.step_scores.is_empty() {
            result = result.with_step_scores(self.step_scores);
        }
        result.metadata = metadata;
        result
    }
}

fn combine(entries: &[(&VerifierEntry, &VerificationResult)], mode: AggregationMode) -> Combined {
    if entries.is_empty() {
        return Combined {
            score: 0.0,
            confidence: None,
            step_scores: HashMap::new(),
            verifier_count: 0,
        };
    }

    let scores: Vec<f64> = entries.iter().map(|(_, r)| r.score.unwrap_or(0.0)).collect();
    let weights: Vec<f64> = entries.iter().map(|(e, _)| e.weight).collect();

    let score = match mode {
        AggregationMode::WeightedAvg => {
            let weight_sum: f64 = weights.iter().sum();
            if weight_sum == 0.0 {
                0.0
            } else {
                scores.iter().zip(weights.iter()).map(|(s, w)| s * w).sum::<f64>() / weight_sum
            }
        }
        AggregationMode::Sum => scores.iter().sum(),
        AggregationMode::Product => scores.iter().product(),
        AggregationMode::Max => scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        AggregationMode::Min => scores.iter().cloned().fold(f64::INFINITY, f64::min),
    };

    let confidences: Vec<f64> = entries.iter().filter_map(|(_, r)| r.confidence).collect();
    let confidence = if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
    };

    let mut step_scores = HashMap::new();
    for (_, r) in entries {
        if let Some(s) = &r.step_scores {
            for (k, v) in s {
                step_scores.insert(k.clone(), *v);
            }
        }
    }

    Combined {
        score,
        confidence,
        step_scores,
        verifier_count: entries.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::{ComparisonMode, DeterministicVerifier};
    use async_trait::async_trait;

    fn candidate(content: &str) -> Candidate {
        Candidate::new().with_content(content)
    }

    struct FailingVerifier;
    #[async_trait]
    impl Verifier for FailingVerifier {
        async fn verify(&self, _c: &Candidate, _ctx: &VerificationContext) -> Result<VerificationResult> {
            Err(Error::verification_failed("boom"))
        }
    }

    #[tokio::test]
    async fn empty_verifier_list_returns_zero_score() {
        let runner = VerificationRunner::new(vec![]);
        let result = runner
            .verify_candidate(&candidate("42"), &VerificationContext::default(), &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(result.score, Some(0.0));
        assert_eq!(result.reasoning.as_deref(), Some("No verification results"));
    }

    #[tokio::test]
    async fn weighted_average_combines_scores() {
        let v1 = DeterministicVerifier::new(ComparisonMode::Exact { whitespace_normalized: true });
        let v2 = DeterministicVerifier::new(ComparisonMode::Exact { whitespace_normalized: true });
        let runner = VerificationRunner::new(vec![
            VerifierEntry::new(Box::new(v1), 1.0),
            VerifierEntry::new(Box::new(v2), 1.0),
        ]);
        let context = VerificationContext {
            ground_truth: Some("42".to_string()),
            reasoning_trace: None,
        };
        let result = runner
            .verify_candidate(&candidate("42"), &context, &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(result.score, Some(1.0));
        assert_eq!(result.reasoning.as_deref(), Some("Combined verification"));
    }

    #[tokio::test]
    async fn continue_policy_drops_failures_but_counts_them() {
        let v1 = DeterministicVerifier::new(ComparisonMode::Exact { whitespace_normalized: true });
        let runner = VerificationRunner::new(vec![
            VerifierEntry::new(Box::new(v1), 1.0),
            VerifierEntry::new(Box::new(FailingVerifier), 1.0),
        ])
        .with_on_error(ErrorPolicy::Continue);
        let context = VerificationContext {
            ground_truth: Some("42".to_string()),
            reasoning_trace: None,
        };
        let result = runner
            .verify_candidate(&candidate("42"), &context, &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(result.metadata["error_count"], serde_json::json!(1));
        assert_eq!(result.metadata["verifier_count"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn halt_policy_surfaces_first_failure() {
        let runner = VerificationRunner::new(vec![VerifierEntry::new(Box::new(FailingVerifier), 1.0)])
            .with_on_error(ErrorPolicy::Halt);
        let result = runner
            .verify_candidate(&candidate("42"), &VerificationContext::default(), &VerifyOptions::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn verify_all_candidates_preserves_order_and_never_drops() {
        let v1 = DeterministicVerifier::new(ComparisonMode::Exact { whitespace_normalized: true });
        let runner = VerificationRunner::new(vec![VerifierEntry::new(Box::new(v1), 1.0)]);
        let context = VerificationContext {
            ground_truth: Some("42".to_string()),
            reasoning_trace: None,
        };
        let candidates = vec![candidate("42"), candidate("41"), candidate("42")];
        let results = runner.verify_all_candidates(&candidates, &context, &VerifyOptions::default()).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().score, Some(1.0));
        assert_eq!(results[1].as_ref().unwrap().score, Some(0.0));
    }
}
