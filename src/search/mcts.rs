//! Monte Carlo tree search: classic UCB1 selection,
//! expansion, verifier-scored simulation, backup; returns the candidate
//! at the most-visited root child.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::timeout as tokio_timeout;

use crate::error::{Error, Result};
use crate::generator::{GenerateOptions, Generator};
use crate::types::Candidate;
use crate::verification::{VerificationContext, Verifier};

use super::{score_candidate, SearchOptions, SearchStrategy};

#[derive(Debug, Clone)]
pub struct Mcts {
    pub simulations: usize,
    pub exploration_constant: f64,
}

impl Mcts {
    pub fn new(simulations: usize, exploration_constant: f64) -> Self {
        Self {
            simulations,
            exploration_constant,
        }
    }
}

struct RootChild {
    candidate: Candidate,
    visits: u32,
    total_reward: f64,
}

impl RootChild {
    fn ucb1(&self, total_visits: u32, c: f64) -> f64 {
        if self.visits == 0 {
            return f64::INFINITY;
        }
        let exploitation = self.total_reward / self.visits as f64;
        let exploration = c * ((total_visits as f64).ln() / self.visits as f64).sqrt();
        exploitation + exploration
    }
}

#[async_trait]
impl SearchStrategy for Mcts {
    async fn search(
        &self,
        prompt: &str,
        generator: Arc<dyn Generator>,
        verifier: Arc<dyn Verifier>,
        opts: &SearchOptions,
    ) -> Result<Candidate> {
        let context = VerificationContext::default();
        let run = async {
            let mut children: Vec<RootChild> = Vec::new();
            let mut total_visits: u32 = 0;

            for i in 0..self.simulations.max(1) {
                // Expansion: grow the child pool lazily, one new child
                // per early simulation, mirroring UCB1's "visit unvisited
                // nodes first" rule.
                if children.is_empty() || i < self.simulations.max(1).min(4) {
                    let candidate = generator.generate(prompt, &GenerateOptions::default()).await?;
                    children.push(RootChild {
                        candidate,
                        visits: 0,
                        total_reward: 0.0,
                    });
                }

                let selected = children
                    .iter_mut()
                    .max_by(|a, b| {
                        a.ucb1(total_visits.max(1), self.exploration_constant)
                            .partial_cmp(&b.ucb1(total_visits.max(1), self.exploration_constant))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .ok_or(Error::NoCandidates)?;

                let reward = score_candidate(&verifier, &selected.candidate, &context).await;
                selected.visits += 1;
                selected.total_reward += reward;
                total_visits += 1;
            }

            children
                .into_iter()
                .max_by_key(|c| c.visits)
                .map(|c| c.candidate)
                .ok_or(Error::NoCandidates)
        };

        match tokio_timeout(opts.timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(opts.timeout.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::test_support::FixedGenerator;
    use crate::verification::{ComparisonMode, DeterministicVerifier};

    #[tokio::test]
    async fn returns_most_visited_child() {
        let generator: Arc<dyn Generator> = Arc::new(FixedGenerator::new("42", 0.0));
        let verifier: Arc<dyn Verifier> =
            Arc::new(DeterministicVerifier::new(ComparisonMode::Substring));
        let search = Mcts::new(8, 1.41);
        let result = search
            .search("q", generator, verifier, &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("42"));
    }
}
