//! Generator contract. A `Generator` is a black-box LM caller; concrete
//! LM inference is out of scope — this module defines only the contract
//! the rest of the pipeline consumes.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::Candidate;

/// Options recognised by all generators.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub num_candidates: u32,
    pub temperature: Option<f64>,
    pub max_concurrency: u32,
    pub timeout_ms: u64,
    pub model: Option<String>,
    pub extra: HashMap<String, Value>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            num_candidates: 1,
            temperature: None,
            max_concurrency: 1,
            timeout_ms: 30_000,
            model: None,
            extra: HashMap::new(),
        }
    }
}

impl GenerateOptions {
    pub fn with_num_candidates(mut self, n: u32) -> Self {
        self.num_candidates = n;
        self
    }

    pub fn with_temperature(mut self, t: f64) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_concurrency(mut self, n: u32) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// The black-box contract the pipeline consumes for candidate generation.
/// Implementations may be a single LM call, a tool-augmented agent, or a
/// test double; the pipeline only depends on this trait.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, query: &str, options: &GenerateOptions) -> Result<Candidate>;

    /// Default batch implementation sequentially calls `generate`
    /// `options.num_candidates` times; implementations that can batch
    /// more efficiently should override this.
    async fn generate_batch(&self, query: &str, options: &GenerateOptions) -> Result<Vec<Candidate>> {
        let mut out = Vec::with_capacity(options.num_candidates as usize);
        for _ in 0..options.num_candidates {
            out.push(self.generate(query, options).await?);
        }
        Ok(out)
    }

    /// Whether this generator exposes a meaningful streaming form. The
    /// pipeline tolerates its absence.
    fn supports_streaming(&self) -> bool {
        false
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A deterministic generator returning a fixed response, used across
    /// unit tests for self-consistency, aggregators, and the pipeline.
    pub struct FixedGenerator {
        pub response: String,
        pub score: f64,
        calls: AtomicUsize,
    }

    impl FixedGenerator {
        pub fn new(response: impl Into<String>, score: f64) -> Self {
            Self {
                response: response.into(),
                score,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(&self, _query: &str, _options: &GenerateOptions) -> Result<Candidate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Candidate::new()
                .with_content(self.response.clone())
                .with_score(self.score)
                .with_tokens_used(10))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FixedGenerator;
    use super::*;

    #[tokio::test]
    async fn default_batch_calls_generate_num_candidates_times() {
        let gen = FixedGenerator::new("hi", 0.5);
        let opts = GenerateOptions::default().with_num_candidates(4);
        let batch = gen.generate_batch("q", &opts).await.unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(gen.call_count(), 4);
    }
}
