//! `AdaptiveSelfConsistency`: compute-aware sampling loop with early
//! termination on consensus, batching candidate generation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use crate::aggregators::normalize_answer;
use crate::error::{Error, Result};
use crate::generator::{GenerateOptions, Generator};
use crate::telemetry;
use crate::types::{Candidate, DifficultyLevel};

#[derive(Debug, Clone, Copy)]
pub struct SelfConsistencyConfig {
    pub min_candidates: u32,
    pub max_candidates: u32,
    pub batch_size: u32,
    pub early_stop_threshold: f64,
}

impl Default for SelfConsistencyConfig {
    fn default() -> Self {
        Self {
            min_candidates: 3,
            max_candidates: 10,
            batch_size: 3,
            early_stop_threshold: 0.8,
        }
    }
}

impl SelfConsistencyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_candidates == 0 {
            return Err(Error::InvalidNumCandidates(0));
        }
        if self.max_candidates < self.min_candidates {
            return Err(Error::MinCandidatesExceedsMax {
                min: self.min_candidates as usize,
                max: self.max_candidates as usize,
            });
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidNumCandidates(0));
        }
        if !(0.0..=1.0).contains(&self.early_stop_threshold) {
            return Err(Error::InvalidEarlyStopThreshold(self.early_stop_threshold));
        }
        Ok(())
    }
}

fn initial_n_for_level(level: DifficultyLevel) -> u32 {
    match level {
        DifficultyLevel::Easy => 3,
        DifficultyLevel::Medium => 5,
        DifficultyLevel::Hard => 10,
    }
}

fn max_n_for_level(level: DifficultyLevel) -> u32 {
    match level {
        DifficultyLevel::Easy => 5,
        DifficultyLevel::Medium => 10,
        DifficultyLevel::Hard => 20,
    }
}

/// `adjust_n(level, current, …)` — next batch size, clamped at zero.
pub fn adjust_n(batch_size: u32, max_n: u32, current: u32) -> u32 {
    batch_size.min(max_n.saturating_sub(current))
}

/// Extracts a canonical answer per candidate and returns the relative
/// frequency of the mode, ties broken by first-seen order. Fails with
/// `no_candidates` on an empty list.
pub fn check_consensus(candidates: &[Candidate]) -> Result<f64> {
    if candidates.is_empty() {
        return Err(Error::NoCandidates);
    }
    let normalized: Vec<String> = candidates
        .iter()
        .map(|c| normalize_answer(c.content.as_deref().unwrap_or("")))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u32> = HashMap::new();
    for answer in &normalized {
        if !counts.contains_key(answer) {
            order.push(answer.clone());
        }
        *counts.entry(answer.clone()).or_insert(0) += 1;
    }
    let mode_count = order.iter().map(|a| counts[a]).max().unwrap_or(0);
    Ok(mode_count as f64 / normalized.len() as f64)
}

pub struct AdaptiveSelfConsistency {
    config: SelfConsistencyConfig,
}

impl AdaptiveSelfConsistency {
    pub fn new(config: SelfConsistencyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub async fn run(
        &self,
        query: &str,
        generator: Arc<dyn Generator>,
        difficulty_level: Option<DifficultyLevel>,
    ) -> Result<(Candidate, HashMap<String, Value>)> {
        telemetry::self_consistency_start();
        let start = Instant::now();

        let level = difficulty_level.unwrap_or(DifficultyLevel::Medium);
        let target_n = initial_n_for_level(level).max(self.config.min_candidates);
        let max_n = max_n_for_level(level).min(self.config.max_candidates);

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut consensus = 0.0;
        let mut early_stopped = false;

        loop {
            let remaining_to_target = target_n.saturating_sub(candidates.len() as u32);
            let remaining_to_max = max_n.saturating_sub(candidates.len() as u32);
            let batch_n = if remaining_to_target > 0 {
                self.config.batch_size.min(remaining_to_target)
            } else {
                adjust_n(self.config.batch_size, max_n, candidates.len() as u32)
            };

            if batch_n == 0 {
                break;
            }

            let opts = GenerateOptions::default().with_num_candidates(batch_n);
            let batch = match generator.generate_batch(query, &opts).await {
                Ok(b) => b,
                Err(e) => {
                    telemetry::self_consistency_exception(start.elapsed(), &e.to_string());
                    return Err(e);
                }
            };
            candidates.extend(batch);

            consensus = check_consensus(&candidates)?;

            if candidates.len() as u32 >= self.config.min_candidates && consensus >= self.config.early_stop_threshold {
                early_stopped = true;
                break;
            }

            if candidates.len() as u32 >= max_n {
                break;
            }
        }

        let normalized: Vec<String> = candidates
            .iter()
            .map(|c| normalize_answer(c.content.as_deref().unwrap_or("")))
            .collect();
        let mut order: Vec<String> = Vec::new();
        for a in &normalized {
            if !order.contains(a) {
                order.push(a.clone());
            }
        }
        let mut counts: HashMap<String, u32> = HashMap::new();
        for a in &normalized {
            *counts.entry(a.clone()).or_insert(0) += 1;
        }
        let winning_answer = order
            .iter()
            .max_by_key(|a| counts[*a])
            .cloned()
            .unwrap_or_default();
        let winner_index = normalized.iter().position(|a| a == &winning_answer).unwrap_or(0);
        let result_candidate = candidates[winner_index].clone();

        let actual_n = candidates.len() as u32;
        telemetry::self_consistency_stop(start.elapsed(), actual_n, consensus, early_stopped);

        let mut metadata = HashMap::new();
        metadata.insert("actual_n".to_string(), json!(actual_n));
        metadata.insert("early_stopped".to_string(), json!(early_stopped));
        metadata.insert("consensus".to_string(), json!(consensus));
        metadata.insert("initial_n".to_string(), json!(target_n));
        metadata.insert("max_n".to_string(), json!(max_n));
        metadata.insert("difficulty_level".to_string(), json!(level.as_str()));

        Ok((result_candidate, metadata))
    }
}
