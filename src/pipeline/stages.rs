//! Per-stage execution. Each stage receives the accumulated
//! `PipelineState` and its own sub-config, and returns stage metadata or
//! an error; the caller in `pipeline::mod` applies the required/optional
//! failure policy and records the trace entry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::calibration::CalibrationGate;
use crate::difficulty::DifficultyEstimator;
use crate::error::{Error, Result};
use crate::generator::{GenerateOptions, Generator};
use crate::reflection::ReflectionLoop;
use crate::search::{SearchOptions, SearchStrategy};
use crate::self_consistency::{AdaptiveSelfConsistency, SelfConsistencyConfig};
use crate::types::{
    Candidate, ConfidenceEstimate, DifficultyEstimate, DifficultyLevel, ReflexionMemoryEntry, RoutingResult,
    VerificationResult,
};
use crate::verification::{VerificationContext, VerificationRunner, VerifyOptions};

/// External retrieval backend. A full RAG implementation is out of scope;
/// this is the extension seam a caller wires a vector-store client into.
#[async_trait]
pub trait RagRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, sub_config: &Value) -> Result<Vec<String>>;
}

/// Mutable state threaded through the configured stages, one run per
/// `Pipeline::run` call.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub query: String,
    pub difficulty: Option<DifficultyEstimate>,
    pub retrieved_context: Option<Vec<String>>,
    pub candidates: Vec<Candidate>,
    pub verification: Option<VerificationResult>,
    pub routing: Option<RoutingResult>,
    pub reflection_mistakes: Vec<ReflexionMemoryEntry>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl PipelineState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    fn best_candidate(&self) -> Option<&Candidate> {
        self.candidates
            .iter()
            .max_by(|a, b| {
                a.score
                    .unwrap_or(f64::NEG_INFINITY)
                    .partial_cmp(&b.score.unwrap_or(f64::NEG_INFINITY))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

pub async fn run_difficulty_estimation(
    estimator: &Arc<dyn DifficultyEstimator>,
    state: &mut PipelineState,
    _sub_config: &Value,
) -> Result<HashMap<String, Value>> {
    let estimate = estimator.estimate(&state.query, &HashMap::new()).await?;
    let mut metadata = HashMap::new();
    metadata.insert("level".to_string(), json!(estimate.level.as_str()));
    metadata.insert("score".to_string(), json!(estimate.score));
    state.difficulty = Some(estimate);
    Ok(metadata)
}

pub async fn run_rag(
    retriever: &Arc<dyn RagRetriever>,
    state: &mut PipelineState,
    sub_config: &Value,
) -> Result<HashMap<String, Value>> {
    let retrieved = retriever.retrieve(&state.query, sub_config).await?;
    let mut metadata = HashMap::new();
    metadata.insert("num_documents".to_string(), json!(retrieved.len()));
    state.retrieved_context = Some(retrieved);
    Ok(metadata)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_generation(
    generator: Arc<dyn Generator>,
    self_consistency_config: SelfConsistencyConfig,
    state: &mut PipelineState,
    sub_config: &Value,
) -> Result<HashMap<String, Value>> {
    let requested_n = sub_config.get("num_candidates").and_then(Value::as_u64);

    if let Some(n) = requested_n {
        let opts = GenerateOptions::default().with_num_candidates(n as u32);
        let candidates = generator.generate_batch(&state.query, &opts).await?;
        let mut metadata = HashMap::new();
        metadata.insert("actual_n".to_string(), json!(candidates.len()));
        let tokens: u64 = candidates.iter().filter_map(|c| c.tokens_used).sum();
        state.output_tokens += tokens;
        state.candidates = candidates;
        return Ok(metadata);
    }

    let difficulty_level = state.difficulty.as_ref().map(|d| d.level).unwrap_or(DifficultyLevel::Medium);
    let sc = AdaptiveSelfConsistency::new(self_consistency_config)?;
    let (winner, sc_metadata) = sc.run(&state.query, generator.clone(), Some(difficulty_level)).await?;

    let actual_n = sc_metadata.get("actual_n").and_then(Value::as_u64).unwrap_or(1);
    // Regenerate the full candidate set so downstream stages (verification,
    // search) have more than the single consensus winner to work with.
    let opts = GenerateOptions::default().with_num_candidates(actual_n.max(1) as u32);
    let mut candidates = generator.generate_batch(&state.query, &opts).await?;
    if candidates.iter().all(|c| c.content != winner.content) {
        candidates.push(winner);
    }
    let tokens: u64 = candidates.iter().filter_map(|c| c.tokens_used).sum();
    state.output_tokens += tokens;
    state.candidates = candidates;

    let mut metadata: HashMap<String, Value> = sc_metadata;
    metadata.insert("num_candidates".to_string(), json!(state.candidates.len()));
    Ok(metadata)
}

pub async fn run_verification(
    runner: &Arc<VerificationRunner>,
    state: &mut PipelineState,
    _sub_config: &Value,
) -> Result<HashMap<String, Value>> {
    let candidate = state
        .best_candidate()
        .cloned()
        .ok_or_else(|| Error::NoCandidates)?;
    let context = VerificationContext::default();
    let result = runner.verify_candidate(&candidate, &context, &VerifyOptions::default()).await?;
    let mut metadata = HashMap::new();
    metadata.insert("score".to_string(), json!(result.score));
    state.verification = Some(result);
    Ok(metadata)
}

pub async fn run_search(
    strategy: &Arc<dyn SearchStrategy>,
    generator: Arc<dyn Generator>,
    verifier: Arc<dyn crate::verification::Verifier>,
    state: &mut PipelineState,
    _sub_config: &Value,
) -> Result<HashMap<String, Value>> {
    let best = strategy
        .search(&state.query, generator, verifier, &SearchOptions::default())
        .await?;
    let mut metadata = HashMap::new();
    metadata.insert("selected_score".to_string(), json!(best.score));
    if !state.candidates.iter().any(|c| c.id == best.id) {
        state.candidates.push(best);
    }
    Ok(metadata)
}

pub async fn run_reflection(
    reflection_loop: &Arc<ReflectionLoop>,
    state: &mut PipelineState,
    _sub_config: &Value,
) -> Result<HashMap<String, Value>> {
    let initial = state.best_candidate().cloned().ok_or_else(|| Error::NoCandidates)?;
    let outcome = reflection_loop.run(&state.query, initial).await?;
    let mut metadata = HashMap::new();
    metadata.insert("converged".to_string(), json!(outcome.converged));
    metadata.insert("total_iterations".to_string(), json!(outcome.total_iterations));
    if !state.candidates.iter().any(|c| c.id == outcome.best_candidate.id) {
        state.candidates.push(outcome.best_candidate);
    }
    Ok(metadata)
}

pub async fn run_calibration(
    gate: &CalibrationGate,
    state: &mut PipelineState,
    _sub_config: &Value,
) -> Result<HashMap<String, Value>> {
    let candidate = state.best_candidate().cloned().ok_or_else(|| Error::NoCandidates)?;
    let score = state
        .verification
        .as_ref()
        .and_then(|v| v.score)
        .or(candidate.score)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let estimate = ConfidenceEstimate::new(score, "pipeline")?;
    let routing = gate.route(&candidate, &estimate);
    let mut metadata = HashMap::new();
    metadata.insert("action".to_string(), json!(routing.action.as_str()));
    metadata.insert("level".to_string(), json!(routing.confidence_level.as_str()));
    state.routing = Some(routing);
    Ok(metadata)
}
