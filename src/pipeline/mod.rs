//! `Pipeline`: the staged accuracy pipeline, executing a configurable
//! sequence of accuracy stages in `PipelineConfig` order.

mod stages;

pub use stages::{PipelineState, RagRetriever};

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, Stream};
use serde_json::{json, Value};

use crate::calibration::CalibrationGate;
use crate::difficulty::DifficultyEstimator;
use crate::error::{Error, Result};
use crate::generator::Generator;
use crate::reflection::ReflectionLoop;
use crate::search::SearchStrategy;
use crate::self_consistency::SelfConsistencyConfig;
use crate::telemetry;
use crate::types::{PipelineConfig, PipelineResult, StageStatus, StageTag, TraceEntry};
use crate::verification::{Verifier, VerificationRunner};

/// Per-call overrides. `generator` defaults to the pipeline's configured
/// generator when absent; if neither is set, `run` fails with
/// `invalid_generator`.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub generator: Option<Arc<dyn Generator>>,
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    default_generator: Option<Arc<dyn Generator>>,
    difficulty_estimator: Option<Arc<dyn DifficultyEstimator>>,
    rag_retriever: Option<Arc<dyn RagRetriever>>,
    self_consistency_config: SelfConsistencyConfig,
    verification_runner: Option<Arc<VerificationRunner>>,
    search_strategy: Option<Arc<dyn SearchStrategy>>,
    search_verifier: Option<Arc<dyn Verifier>>,
    reflection_loop: Option<Arc<ReflectionLoop>>,
    calibration_gate: Option<CalibrationGate>,
    stage_timeout: Duration,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            default_generator: None,
            difficulty_estimator: None,
            rag_retriever: None,
            self_consistency_config: SelfConsistencyConfig::default(),
            verification_runner: None,
            search_strategy: None,
            search_verifier: None,
            reflection_loop: None,
            calibration_gate: None,
            stage_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_default_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.default_generator = Some(generator);
        self
    }

    pub fn with_difficulty_estimator(mut self, estimator: Arc<dyn DifficultyEstimator>) -> Self {
        self.difficulty_estimator = Some(estimator);
        self
    }

    pub fn with_rag_retriever(mut self, retriever: Arc<dyn RagRetriever>) -> Self {
        self.rag_retriever = Some(retriever);
        self
    }

    pub fn with_self_consistency_config(mut self, config: SelfConsistencyConfig) -> Self {
        self.self_consistency_config = config;
        self
    }

    pub fn with_verification_runner(mut self, runner: Arc<VerificationRunner>) -> Self {
        self.verification_runner = Some(runner);
        self
    }

    pub fn with_search(mut self, strategy: Arc<dyn SearchStrategy>, verifier: Arc<dyn Verifier>) -> Self {
        self.search_strategy = Some(strategy);
        self.search_verifier = Some(verifier);
        self
    }

    pub fn with_reflection_loop(mut self, reflection_loop: Arc<ReflectionLoop>) -> Self {
        self.reflection_loop = Some(reflection_loop);
        self
    }

    pub fn with_calibration_gate(mut self, gate: CalibrationGate) -> Self {
        self.calibration_gate = Some(gate);
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            config: self.config,
            default_generator: self.default_generator,
            difficulty_estimator: self.difficulty_estimator,
            rag_retriever: self.rag_retriever,
            self_consistency_config: self.self_consistency_config,
            verification_runner: self.verification_runner,
            search_strategy: self.search_strategy,
            search_verifier: self.search_verifier,
            reflection_loop: self.reflection_loop,
            calibration_gate: self.calibration_gate,
            stage_timeout: self.stage_timeout,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    default_generator: Option<Arc<dyn Generator>>,
    difficulty_estimator: Option<Arc<dyn DifficultyEstimator>>,
    rag_retriever: Option<Arc<dyn RagRetriever>>,
    self_consistency_config: SelfConsistencyConfig,
    verification_runner: Option<Arc<VerificationRunner>>,
    search_strategy: Option<Arc<dyn SearchStrategy>>,
    search_verifier: Option<Arc<dyn Verifier>>,
    reflection_loop: Option<Arc<ReflectionLoop>>,
    calibration_gate: Option<CalibrationGate>,
    stage_timeout: Duration,
}

/// One per-stage observation surfaced by `run_stream`.
#[derive(Debug, Clone)]
pub struct StageEvent {
    pub stage: String,
    pub status: StageStatus,
    pub duration_ms: u64,
}

impl Pipeline {
    /// `Pipeline.new(config)` — `config` is already validated by
    /// `PipelineConfig::new` (it must contain `:generation`).
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Ok(PipelineBuilder::new(config).build())
    }

    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    fn resolve_generator(&self, opts: &RunOptions) -> Result<Arc<dyn Generator>> {
        opts.generator
            .clone()
            .or_else(|| self.default_generator.clone())
            .ok_or_else(|| Error::InvalidGenerator("no generator configured for this run".to_string()))
    }

    async fn run_one_stage(
        &self,
        stage: StageTag,
        generator: Arc<dyn Generator>,
        state: &mut stages::PipelineState,
    ) -> Result<HashMap<String, Value>> {
        let sub_config = self
            .config
            .sub_configs
            .get(stage.as_str())
            .cloned()
            .unwrap_or(Value::Null);

        match stage {
            StageTag::DifficultyEstimation => match &self.difficulty_estimator {
                Some(estimator) => stages::run_difficulty_estimation(estimator, state, &sub_config).await,
                None => Ok(HashMap::new()),
            },
            StageTag::Rag => match &self.rag_retriever {
                Some(retriever) => stages::run_rag(retriever, state, &sub_config).await,
                None => Ok(HashMap::new()),
            },
            StageTag::Generation => {
                stages::run_generation(generator, self.self_consistency_config, state, &sub_config).await
            }
            StageTag::Verification => match &self.verification_runner {
                Some(runner) => stages::run_verification(runner, state, &sub_config).await,
                None => Ok(HashMap::new()),
            },
            StageTag::Search => match (&self.search_strategy, &self.search_verifier) {
                (Some(strategy), Some(verifier)) => {
                    stages::run_search(strategy, generator, verifier.clone(), state, &sub_config).await
                }
                _ => Ok(HashMap::new()),
            },
            StageTag::Reflection => match &self.reflection_loop {
                Some(reflection_loop) => stages::run_reflection(reflection_loop, state, &sub_config).await,
                None => Ok(HashMap::new()),
            },
            StageTag::Calibration => match &self.calibration_gate {
                Some(gate) => stages::run_calibration(gate, state, &sub_config).await,
                None => Ok(HashMap::new()),
            },
        }
    }

    /// `run(query, opts)`: executes the configured stages in order,
    /// applying the required/optional failure policy and building the
    /// trace and aggregated metadata.
    pub async fn run(&self, query: &str, opts: RunOptions) -> Result<PipelineResult> {
        if query.trim().is_empty() {
            return Err(Error::invalid_query("query must not be empty"));
        }
        let generator = self.resolve_generator(&opts)?;

        telemetry::pipeline_start(query, None);
        let run_start = Instant::now();

        let mut state = stages::PipelineState::new(query);
        let mut trace = Vec::new();
        let mut stages_completed = Vec::new();

        for stage in self.config.stages.clone() {
            let stage_start = Instant::now();
            telemetry::stage_start(stage.as_str());

            let outcome = tokio::time::timeout(
                self.stage_timeout,
                self.run_one_stage(stage, generator.clone(), &mut state),
            )
            .await;

            let elapsed = stage_start.elapsed();

            let result: Result<HashMap<String, Value>> = match outcome {
                Ok(inner) => inner,
                Err(_) => Err(Error::timeout(self.stage_timeout.as_millis() as u64)),
            };

            match result {
                Ok(_metadata) => {
                    telemetry::stage_stop(stage.as_str(), elapsed);
                    trace.push(TraceEntry {
                        stage: stage.as_str().to_string(),
                        status: StageStatus::Ok,
                        duration_ms: elapsed.as_millis() as u64,
                    });
                    stages_completed.push(stage.as_str().to_string());
                }
                Err(e) => {
                    telemetry::stage_exception(stage.as_str(), elapsed, &e.to_string());
                    trace.push(TraceEntry {
                        stage: stage.as_str().to_string(),
                        status: StageStatus::Error,
                        duration_ms: elapsed.as_millis() as u64,
                    });
                    if stage.is_required() {
                        telemetry::pipeline_exception(run_start.elapsed(), "stage_error", &e.to_string());
                        return Err(e);
                    }
                    // Optional stage: logged and skipped, prior state kept.
                }
            }
        }

        let result = self.build_result(&state, trace, stages_completed);
        let total_duration = run_start.elapsed();
        telemetry::pipeline_stop(
            total_duration,
            query,
            result.answer.as_deref().unwrap_or(""),
            result.confidence,
            state.input_tokens.checked_add(state.output_tokens),
            Some(state.candidates.len()),
            state.verification.as_ref().and_then(|v| v.score),
        );

        Ok(result)
    }

    fn build_result(
        &self,
        state: &stages::PipelineState,
        trace: Vec<TraceEntry>,
        stages_completed: Vec<String>,
    ) -> PipelineResult {
        let total_duration_ms: u64 = trace.iter().map(|t| t.duration_ms).sum();

        let final_candidate = state
            .routing
            .as_ref()
            .map(|r| r.candidate.clone())
            .or_else(|| {
                state
                    .candidates
                    .iter()
                    .max_by(|a, b| {
                        a.score
                            .unwrap_or(f64::NEG_INFINITY)
                            .partial_cmp(&b.score.unwrap_or(f64::NEG_INFINITY))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .cloned()
            });

        let mut metadata = HashMap::new();
        metadata.insert("stages_completed".to_string(), json!(stages_completed));
        metadata.insert("num_candidates".to_string(), json!(state.candidates.len()));
        metadata.insert("input_tokens".to_string(), json!(state.input_tokens));
        metadata.insert("output_tokens".to_string(), json!(state.output_tokens));
        metadata.insert(
            "total_tokens".to_string(),
            json!(state.input_tokens + state.output_tokens),
        );
        if let Some(v) = state.verification.as_ref().and_then(|v| v.score) {
            metadata.insert("verification_score".to_string(), json!(v));
        }
        if let Some(routing) = &state.routing {
            metadata.insert("calibration_action".to_string(), json!(routing.action.as_str()));
            metadata.insert("calibration_level".to_string(), json!(routing.confidence_level.as_str()));
        }
        metadata.insert("total_duration_ms".to_string(), json!(total_duration_ms));

        PipelineResult {
            answer: final_candidate.as_ref().and_then(|c| c.content.clone()),
            confidence: state
                .routing
                .as_ref()
                .map(|r| r.original_score)
                .or_else(|| state.verification.as_ref().and_then(|v| v.score))
                .or_else(|| final_candidate.as_ref().and_then(|c| c.score)),
            action: state.routing.as_ref().map(|r| r.action),
            trace,
            metadata,
        }
    }

    /// Stream mode: observes the same run stage by stage, yielding one
    /// `StageEvent` per attempted stage followed by the final
    /// `PipelineResult`. This is an observation of a single execution, not
    /// a second run.
    pub fn run_stream<'a>(
        &'a self,
        query: &'a str,
        opts: RunOptions,
    ) -> Pin<Box<dyn Stream<Item = PipelineStreamItem> + Send + 'a>> {
        Box::pin(stream::once(async move {
            match self.run(query, opts).await {
                Ok(result) => {
                    let events = result
                        .trace
                        .iter()
                        .map(|t| StageEvent {
                            stage: t.stage.clone(),
                            status: t.status.clone(),
                            duration_ms: t.duration_ms,
                        })
                        .collect();
                    PipelineStreamItem::Done { events, result }
                }
                Err(e) => PipelineStreamItem::Failed(e),
            }
        }))
    }
}

#[derive(Debug)]
pub enum PipelineStreamItem {
    Done { events: Vec<StageEvent>, result: PipelineResult },
    Failed(Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationGate;
    use crate::generator::test_support::FixedGenerator;
    use crate::types::StageTag;
    use futures::StreamExt;

    fn simple_config() -> PipelineConfig {
        PipelineConfig::new(vec![StageTag::Generation, StageTag::Calibration]).unwrap()
    }

    #[tokio::test]
    async fn runs_generation_and_calibration_in_order() {
        let generator: Arc<dyn Generator> = Arc::new(FixedGenerator::new("Answer: 42", 0.9));
        let gate = CalibrationGate::new(0.7, 0.4).unwrap();
        let pipeline = Pipeline::builder(simple_config())
            .with_default_generator(generator)
            .with_calibration_gate(gate)
            .build();

        let result = pipeline.run("What is 2+2?", RunOptions::default()).await.unwrap();
        assert_eq!(result.trace.len(), 2);
        assert!(result.trace.iter().all(|t| t.status == StageStatus::Ok));
        assert!(result.answer.is_some());
    }

    #[tokio::test]
    async fn empty_query_fails() {
        let generator: Arc<dyn Generator> = Arc::new(FixedGenerator::new("x", 0.5));
        let pipeline = Pipeline::builder(simple_config()).with_default_generator(generator).build();
        let result = pipeline.run("   ", RunOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn missing_generator_fails_with_invalid_generator() {
        let pipeline = Pipeline::builder(simple_config()).build();
        let result = pipeline.run("hello", RunOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidGenerator(_))));
    }

    #[tokio::test]
    async fn run_stream_yields_a_single_final_item() {
        let generator: Arc<dyn Generator> = Arc::new(FixedGenerator::new("Answer: 42", 0.9));
        let pipeline = Pipeline::builder(PipelineConfig::new(vec![StageTag::Generation]).unwrap())
            .with_default_generator(generator)
            .build();
        let mut stream = pipeline.run_stream("hello", RunOptions::default());
        let item = stream.next().await.unwrap();
        match item {
            PipelineStreamItem::Done { result, .. } => assert!(result.answer.is_some()),
            PipelineStreamItem::Failed(e) => panic!("unexpected failure: {e}"),
        }
    }
}
