//! Reflection loop: critique-revise cycles with convergence detection
//! across severity, content similarity, and score-delta signals.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::memory::ReflexionMemory;
use crate::similarity::edit_distance_similarity;
use crate::types::{Candidate, CritiqueResult};

/// Context threaded to the critiquer/reviser, carrying a monotonically
/// increasing iteration index.
#[derive(Debug, Clone)]
pub struct ReflectionContext {
    pub iteration: u32,
    pub prompt: String,
}

#[async_trait]
pub trait Critiquer: Send + Sync {
    async fn critique(&self, candidate: &Candidate, context: &ReflectionContext) -> Result<CritiqueResult>;
}

#[async_trait]
pub trait Reviser: Send + Sync {
    async fn revise(&self, candidate: &Candidate, critique: &CritiqueResult, context: &ReflectionContext) -> Result<Candidate>;
}

#[derive(Debug, Clone, Copy)]
pub struct ReflectionConfig {
    pub max_iterations: u32,
    pub convergence_threshold: f64,
    pub memory_store_severity_threshold: f64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            convergence_threshold: 0.1,
            memory_store_severity_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    Converged,
    MaxIterations,
}

#[derive(Debug, Clone)]
pub struct ReflectionStep {
    pub candidate: Candidate,
    pub critique: CritiqueResult,
}

#[derive(Debug, Clone)]
pub struct ReflectionOutcome {
    pub best_candidate: Candidate,
    pub iterations: Vec<ReflectionStep>,
    pub converged: bool,
    pub reason: TerminationReason,
    pub total_iterations: u32,
}

/// `improvement_score(prev, curr, critique)` := `1 − critique.severity` if
/// critique present, else `curr.score − prev.score`, else `0`.
pub fn improvement_score(prev: &Candidate, curr: &Candidate, critique: Option<&CritiqueResult>) -> f64 {
    if let Some(c) = critique {
        1.0 - c.severity
    } else {
        match (prev.score, curr.score) {
            (Some(p), Some(c)) => c - p,
            _ => 0.0,
        }
    }
}

pub struct ReflectionLoop {
    critiquer: Arc<dyn Critiquer>,
    reviser: Arc<dyn Reviser>,
    memory: Option<Arc<ReflexionMemory>>,
    config: ReflectionConfig,
}

impl ReflectionLoop {
    pub fn new(critiquer: Arc<dyn Critiquer>, reviser: Arc<dyn Reviser>) -> Self {
        Self {
            critiquer,
            reviser,
            memory: None,
            config: ReflectionConfig::default(),
        }
    }

    pub fn with_memory(mut self, memory: Arc<ReflexionMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_config(mut self, config: ReflectionConfig) -> Self {
        self.config = config;
        self
    }

    fn convergence_holds(&self, critique: &CritiqueResult, prev: &Candidate, curr: &Candidate) -> bool {
        if critique.severity <= self.config.convergence_threshold {
            return true;
        }
        let prev_content = prev.content.as_deref().unwrap_or("");
        let curr_content = curr.content.as_deref().unwrap_or("");
        let content_change = 1.0 - edit_distance_similarity(prev_content, curr_content);
        if content_change < self.config.convergence_threshold {
            return true;
        }
        if let (Some(p), Some(c)) = (prev.score, curr.score) {
            if (c - p).abs() < self.config.convergence_threshold {
                return true;
            }
        }
        false
    }

    pub async fn run(&self, prompt: &str, initial: Candidate) -> Result<ReflectionOutcome> {
        let mut current = initial.clone();
        let mut history: Vec<ReflectionStep> = Vec::new();
        let mut reason = TerminationReason::MaxIterations;
        let mut converged = false;

        for iteration in 0..self.config.max_iterations {
            let context = ReflectionContext {
                iteration,
                prompt: prompt.to_string(),
            };

            let critique = self.critiquer.critique(&current, &context).await?;

            if let Some(memory) = &self.memory {
                if critique.severity > self.config.memory_store_severity_threshold {
                    memory.store_from_critique(prompt, &critique)?;
                }
            }

            let revised = self.reviser.revise(&current, &critique, &context).await?;
            let is_convergent = self.convergence_holds(&critique, &current, &revised);

            history.push(ReflectionStep {
                candidate: current.clone(),
                critique: critique.clone(),
            });

            current = revised;

            if is_convergent {
                converged = true;
                reason = TerminationReason::Converged;
                break;
            }
        }

        history.push(ReflectionStep {
            candidate: current.clone(),
            critique: CritiqueResult::new(0.0),
        });

        // Best candidate: maximum score over the iteration history
        // (initial included); ties broken by latest.
        let best_candidate = history
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                let sa = a.candidate.score.unwrap_or(f64::NEG_INFINITY);
                let sb = b.candidate.score.unwrap_or(f64::NEG_INFINITY);
                sa.partial_cmp(&sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(ia.cmp(ib))
            })
            .map(|(_, step)| step.candidate.clone())
            .unwrap_or(current);

        Ok(ReflectionOutcome {
            best_candidate,
            total_iterations: history.len() as u32,
            iterations: history,
            converged,
            reason,
        })
    }
}

pub fn outcome_to_map(outcome: &ReflectionOutcome) -> serde_json::Map<String, Value> {
    let mut m = serde_json::Map::new();
    m.insert("converged".to_string(), json!(outcome.converged));
    m.insert("total_iterations".to_string(), json!(outcome.total_iterations));
    m.insert(
        "reason".to_string(),
        json!(match outcome.reason {
            TerminationReason::Converged => "converged",
            TerminationReason::MaxIterations => "max_iterations",
        }),
    );
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCritiquer(f64);
    #[async_trait]
    impl Critiquer for FixedCritiquer {
        async fn critique(&self, _c: &Candidate, _ctx: &ReflectionContext) -> Result<CritiqueResult> {
            Ok(CritiqueResult::new(self.0))
        }
    }

    struct AppendingReviser;
    #[async_trait]
    impl Reviser for AppendingReviser {
        async fn revise(&self, c: &Candidate, _critique: &CritiqueResult, ctx: &ReflectionContext) -> Result<Candidate> {
            let content = format!("{} revised@{}", c.content.as_deref().unwrap_or(""), ctx.iteration);
            Ok(Candidate::new().with_content(content).with_score(c.score.unwrap_or(0.0) + 0.1))
        }
    }

    #[tokio::test]
    async fn converges_when_severity_below_threshold() {
        let loop_runner = ReflectionLoop::new(Arc::new(FixedCritiquer(0.05)), Arc::new(AppendingReviser));
        let initial = Candidate::new().with_content("draft").with_score(0.5);
        let outcome = loop_runner.run("prompt", initial).await.unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.reason, TerminationReason::Converged);
    }

    #[tokio::test]
    async fn hits_max_iterations_when_severity_stays_high() {
        let loop_runner = ReflectionLoop::new(Arc::new(FixedCritiquer(0.9)), Arc::new(AppendingReviser))
            .with_config(ReflectionConfig {
                max_iterations: 2,
                convergence_threshold: 0.01,
                memory_store_severity_threshold: 0.5,
            });
        let initial = Candidate::new().with_content("draft").with_score(0.5);
        let outcome = loop_runner.run("prompt", initial).await.unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.reason, TerminationReason::MaxIterations);
    }

    #[test]
    fn improvement_score_uses_critique_when_present() {
        let prev = Candidate::new().with_score(0.5);
        let curr = Candidate::new().with_score(0.6);
        let critique = CritiqueResult::new(0.3);
        assert!((improvement_score(&prev, &curr, Some(&critique)) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn improvement_score_falls_back_to_score_delta() {
        let prev = Candidate::new().with_score(0.5);
        let curr = Candidate::new().with_score(0.6);
        assert!((improvement_score(&prev, &curr, None) - 0.1).abs() < 1e-9);
    }
}
