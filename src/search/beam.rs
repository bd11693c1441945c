//! Beam search: at each level, expand every beam by sampling
//! `branching_factor` continuations, score with the verifier, keep the
//! top `beam_width`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::timeout as tokio_timeout;

use crate::error::{Error, Result};
use crate::generator::{GenerateOptions, Generator};
use crate::types::Candidate;
use crate::verification::{VerificationContext, Verifier};

use super::{score_candidate, SearchOptions, SearchStrategy};

#[derive(Debug, Clone)]
pub struct BeamSearch {
    pub beam_width: usize,
    pub depth: usize,
    pub branching_factor: usize,
}

impl BeamSearch {
    pub fn new(beam_width: usize, depth: usize, branching_factor: usize) -> Self {
        Self {
            beam_width,
            depth,
            branching_factor,
        }
    }
}

#[async_trait]
impl SearchStrategy for BeamSearch {
    async fn search(
        &self,
        prompt: &str,
        generator: Arc<dyn Generator>,
        verifier: Arc<dyn Verifier>,
        opts: &SearchOptions,
    ) -> Result<Candidate> {
        let context = VerificationContext::default();
        let run = async {
            let mut beam: Vec<(Candidate, f64)> = Vec::new();

            for _ in 0..self.depth.max(1) {
                let mut expansions: Vec<(Candidate, f64)> = Vec::new();
                let seeds: Vec<Option<Candidate>> = if beam.is_empty() {
                    vec![None]
                } else {
                    beam.iter().map(|(c, _)| Some(c.clone())).collect()
                };

                for seed in &seeds {
                    for _ in 0..self.branching_factor.max(1) {
                        let seed_prompt = match seed {
                            Some(c) => format!("{prompt}\n{}", c.content.as_deref().unwrap_or("")),
                            None => prompt.to_string(),
                        };
                        let candidate = generator
                            .generate(&seed_prompt, &GenerateOptions::default())
                            .await?;
                        let score = score_candidate(&verifier, &candidate, &context).await;
                        expansions.push((candidate, score));
                    }
                }

                if expansions.is_empty() {
                    return Err(Error::NoCandidates);
                }

                expansions.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
                expansions.truncate(self.beam_width.max(1));
                beam = expansions;
            }

            beam.into_iter()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(c, _)| c)
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
    async fn beam_width_one_returns_single_best_leaf() {
        let generator: Arc<dyn Generator> = Arc::new(FixedGenerator::new("42", 0.0));
        let verifier: Arc<dyn Verifier> =
            Arc::new(DeterministicVerifier::new(ComparisonMode::Substring));
        let search = BeamSearch::new(1, 2, 2);
        let result = search
            .search("what is 6*7?", generator, verifier, &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn empty_generation_surfaces_error() {
        struct EmptyGenerator;
        #[async_trait]
        impl Generator for EmptyGenerator {
            async fn generate(&self, _q: &str, _o: &GenerateOptions) -> Result<Candidate> {
                Err(Error::generator_failed("no output"))
            }
        }
        let generator: Arc<dyn Generator> = Arc::new(EmptyGenerator);
        let verifier: Arc<dyn Verifier> =
            Arc::new(DeterministicVerifier::new(ComparisonMode::Substring));
        let search = BeamSearch::new(2, 1, 2);
        let result = search
            .search("prompt", generator, verifier, &SearchOptions::default())
            .await;
        assert!(result.is_err());
    }
}
