//! # accuracy-core
//!
//! The core accuracy pipeline for an LLM answering system: adaptive
//! self-consistency sampling, pluggable verification, a reflection loop
//! with episodic memory, calibrated routing and selective generation, and
//! a staged pipeline orchestrator tying them together with telemetry.
//!
//! ## Core components
//!
//! - **Generator**: the black-box sampling seam (`generator`)
//! - **Self-consistency**: adaptive, difficulty-aware sampling (`self_consistency`)
//! - **Verification**: pluggable verifiers composed by a runner (`verification`)
//! - **Search**: beam search, MCTS, and diverse decoding over candidates (`search`)
//! - **Reflection**: critique/revise loop with episodic memory (`reflection`, `memory`)
//! - **Calibration**: confidence-threshold routing and selective generation (`calibration`, `selective`)
//! - **Uncertainty**: aleatoric/epistemic query classification (`uncertainty`)
//! - **Pipeline**: the staged orchestrator composing all of the above (`pipeline`)
//! - **Signals**: the `Run` directive and `accuracy.result`/`accuracy.error` output shapes (`signals`)
//! - **Presets**: the named pipeline configurations a directive resolves to (`presets`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use accuracy_core::{Pipeline, PipelineConfig, RunOptions, StageTag};
//!
//! let config = PipelineConfig::new(vec![StageTag::Generation, StageTag::Calibration])?;
//! let pipeline = Pipeline::builder(config)
//!     .with_default_generator(my_generator)
//!     .build();
//! let result = pipeline.run("What is the capital of France?", RunOptions::default()).await?;
//! # Ok::<(), accuracy_core::Error>(())
//! ```

pub mod aggregators;
pub mod budget;
pub mod calibration;
pub mod difficulty;
pub mod error;
pub mod generator;
pub mod memory;
pub mod pipeline;
pub mod presets;
pub mod ratelimiter;
pub mod reflection;
pub mod search;
pub mod selective;
pub mod self_consistency;
pub mod signals;
pub mod similarity;
pub mod telemetry;
pub mod tool_executor;
pub mod types;
pub mod uncertainty;
pub mod verification;

pub use aggregators::{AggregationOutcome, Aggregator, BestOfN, ExtraSignal, MajorityVote, Weighted};
pub use budget::{ComputeBudgeter, CustomAllocationOptions, RemainingBudget, UsageStats};
pub use calibration::{CalibrationGate, LowAction, MediumAction};
pub use difficulty::{CombinationMode, DifficultyEstimator, EnsembleDifficulty, EstimationContext, HeuristicDifficulty, LlmDifficulty};
pub use error::{Error, Result};
pub use generator::{GenerateOptions, Generator};
pub use memory::{prime_query, ReflexionMemory, ReflexionMemoryConfig, StorageMode};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineState, PipelineStreamItem, RagRetriever, RunOptions, StageEvent};
pub use presets::{customize, Preset};
pub use ratelimiter::{RateLimitStatus, RateLimiter};
pub use reflection::{
    improvement_score, outcome_to_map, Critiquer, ReflectionConfig, ReflectionContext, ReflectionLoop,
    ReflectionOutcome, ReflectionStep, Reviser, TerminationReason,
};
pub use search::{BeamSearch, DiverseDecoding, Mcts, SearchOptions, SearchStrategy};
pub use selective::SelectiveGeneration;
pub use self_consistency::{AdaptiveSelfConsistency, SelfConsistencyConfig};
pub use signals::{ErrorSignal, ResultSignal, Run};
pub use similarity::{combined_similarity, edit_distance_similarity, jaccard_similarity};
pub use tool_executor::{ExecOptions, ExecResult, ExitDecode, Sandbox, ToolExecutor};
pub use types::{
    Candidate, ComputeBudget, ConfidenceEstimate, ConfidenceLevel, CritiqueResult, Decision, DecisionResult,
    DifficultyEstimate, DifficultyLevel, GenerationResult, PipelineConfig, PipelineResult, ReflexionMemoryEntry,
    RoutingAction, RoutingResult, StageStatus, StageTag, SuggestedAction, TraceEntry, UncertaintyResult,
    UncertaintyType, VerificationResult,
};
pub use uncertainty::{PatternBank, UncertaintyQuantification};
pub use verification::{
    AggregationMode, ComparisonMode, DeterministicVerifier, ErrorPolicy, LlmOutcomeVerifier, PrmClassification,
    ProcessRewardModel, VerificationContext, VerificationRunner, Verifier, VerifierEntry, VerifyOptions,
};
