//! `LLMProcessRewardModel`: scores individual reasoning steps via a
//! `LazyLock<Regex>` pattern bank over free-form critique text.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;
use crate::generator::{GenerateOptions, Generator};
use crate::types::{Candidate, VerificationResult};

use super::{VerificationContext, Verifier};

/// Matches `Step N: Score: X` (or `Rating`/`Step Score`), case-insensitive.
static STEP_INDEXED_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)step\s*(\d+)\s*:\s*(?:score|step score|rating)\s*:\s*(-?\d+(?:\.\d+)?)").expect("valid regex")
});

/// Matches a bare `Score:`/`Step Score:`/`Rating:` value.
static SIMPLE_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:step\s*score|score|rating)\s*:\s*(-?\d+(?:\.\d+)?)").expect("valid regex")
});

fn midpoint(range: (f64, f64)) -> f64 {
    (range.0 + range.1) / 2.0
}

/// Extract a single score from a model response; unparseable text yields
/// the midpoint of `range`.
pub fn extract_score(text: &str, range: (f64, f64)) -> f64 {
    if let Some(caps) = SIMPLE_SCORE.captures(text) {
        if let Some(m) = caps.get(1) {
            if let Ok(v) = m.as_str().parse::<f64>() {
                return v.clamp(range.0, range.1);
            }
        }
    }
    midpoint(range)
}

/// Extract one score per reasoning step. When the step-indexed form
/// (`Step N: Score: X`) is present it wins; otherwise simple ordered
/// scores are matched positionally. Padding with the midpoint when the
/// model returns fewer scores than steps; truncating when more.
pub fn extract_trace_scores(text: &str, num_steps: usize, range: (f64, f64)) -> Vec<f64> {
    let indexed: Vec<(usize, f64)> = STEP_INDEXED_SCORE
        .captures_iter(text)
        .filter_map(|caps| {
            let idx: usize = caps.get(1)?.as_str().parse().ok()?;
            let score: f64 = caps.get(2)?.as_str().parse().ok()?;
            Some((idx, score.clamp(range.0, range.1)))
        })
        .collect();

    let mut scores = vec![midpoint(range); num_steps];

    if !indexed.is_empty() {
        for (idx, score) in indexed {
            if idx >= 1 && idx <= num_steps {
                scores[idx - 1] = score;
            }
        }
        return scores;
    }

    let simple: Vec<f64> = SIMPLE_SCORE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
        .map(|v| v.clamp(range.0, range.1))
        .collect();

    for (i, slot) in scores.iter_mut().enumerate() {
        if let Some(v) = simple.get(i) {
            *slot = *v;
        }
    }
    scores
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrmClassification {
    Correct,
    Incorrect,
    Neutral,
}

/// Normalised `x = (s-min)/(max-min)`; `x≥0.7 → correct`, `x≤0.3 →
/// incorrect`, else `neutral`.
pub fn classify(score: f64, range: (f64, f64)) -> PrmClassification {
    let x = (score - range.0) / (range.1 - range.0);
    if x >= 0.7 {
        PrmClassification::Correct
    } else if x <= 0.3 {
        PrmClassification::Incorrect
    } else {
        PrmClassification::Neutral
    }
}

pub struct ProcessRewardModel {
    generator: Arc<dyn Generator>,
    range: (f64, f64),
}

impl ProcessRewardModel {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            range: (0.0, 1.0),
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = (min, max);
        self
    }

    pub async fn score_step(&self, step: &str) -> Result<f64> {
        let prompt = format!("Rate this reasoning step from {} to {}. Respond with 'Score: X'.\n{step}", self.range.0, self.range.1);
        let response = self.generator.generate(&prompt, &GenerateOptions::default()).await?;
        Ok(extract_score(&response.content.unwrap_or_default(), self.range))
    }

    pub async fn score_trace(&self, steps: &[String]) -> Result<Vec<f64>> {
        let joined = steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Step {}: {s}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Rate each reasoning step from {} to {}. Respond with 'Step N: Score: X' for each.\n{joined}",
            self.range.0, self.range.1
        );
        let response = self.generator.generate(&prompt, &GenerateOptions::default()).await?;
        Ok(extract_trace_scores(&response.content.unwrap_or_default(), steps.len(), self.range))
    }
}

#[async_trait]
impl Verifier for ProcessRewardModel {
    async fn verify(&self, candidate: &Candidate, _context: &VerificationContext) -> Result<VerificationResult> {
        let steps: Vec<String> = candidate
            .reasoning
            .as_deref()
            .unwrap_or("")
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();

        if steps.is_empty() {
            let score = self.score_step(candidate.content.as_deref().unwrap_or("")).await?;
            return Ok(VerificationResult::new()
                .with_candidate_id(candidate.id.clone())
                .with_score(score)
                .with_confidence(0.7));
        }

        let scores = self.score_trace(&steps).await?;
        let step_scores = scores
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("step_{}", i + 1), *s))
            .collect();
        let avg = scores.iter().sum::<f64>() / scores.len() as f64;

        Ok(VerificationResult::new()
            .with_candidate_id(candidate.id.clone())
            .with_score(avg)
            .with_confidence(0.7)
            .with_step_scores(step_scores))
    }
}
