//! Error types for accuracy-core.

use thiserror::Error;

/// Result type alias using accuracy-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across the accuracy pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Query failed input validation (empty, whitespace-only, etc).
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Query exceeds the maximum accepted length.
    #[error("query too long: {len} bytes (max {max})")]
    QueryTooLong { len: usize, max: usize },

    /// A requested candidate count was zero, negative, or otherwise malformed.
    #[error("invalid num_candidates: {0}")]
    InvalidNumCandidates(i64),

    /// Calibration thresholds are malformed (e.g. low threshold >= high threshold).
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    /// A routing/decision action tag was not recognised.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// A score fell outside its required `[0, 1]` range.
    #[error("invalid score: {0}")]
    InvalidScore(f64),

    /// A confidence level tag was not recognised.
    #[error("invalid confidence level: {0}")]
    InvalidConfidenceLevel(String),

    /// `min_candidates` was not less than or equal to `max_candidates`.
    #[error("min_candidates ({min}) must be <= max_candidates ({max})")]
    MinCandidatesExceedsMax { min: usize, max: usize },

    /// `early_stop_threshold` was outside `[0, 1]`.
    #[error("early_stop_threshold must be between 0 and 1, got {0}")]
    InvalidEarlyStopThreshold(f64),

    /// A custom uncertainty/difficulty pattern list failed to compile.
    #[error("invalid patterns: {0}")]
    InvalidPatterns(String),

    /// A level tag was not found in a custom allocation/budget table.
    #[error("unknown level: {0}")]
    UnknownLevel(String),

    /// A required prompt/query field was absent.
    #[error("prompt is required")]
    PromptRequired,

    /// The compute budgeter's global or per-resource limit would be exceeded.
    #[error("budget exhausted: {resource}")]
    BudgetExhausted { resource: String },

    /// A rate-limited key has no remaining admissions in its current window.
    #[error("rate limited: {key}")]
    RateLimited { key: String },

    /// An operation exceeded its allotted time.
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Verification could not be completed for a candidate.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// A batch critique operation failed outright.
    #[error("batch critique failed: {0}")]
    BatchCritiqueFailed(String),

    /// A `Generator` implementation returned an error.
    #[error("generator failed: {0}")]
    GeneratorFailed(String),

    /// The supplied generator does not satisfy the `Generator` contract.
    #[error("invalid generator: {0}")]
    InvalidGenerator(String),

    /// An aggregator or verifier was asked to operate on an empty candidate set.
    #[error("no candidates to aggregate")]
    NoCandidates,

    /// A requested working directory for the tool executor does not exist.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// An environment variable key is on the tool executor's deny-list.
    #[error("forbidden environment key: {0}")]
    ForbiddenEnvironmentKey(String),

    /// The requested sandbox runtime is not available on this host.
    #[error("sandbox runtime unavailable: {runtime}")]
    SandboxUnavailable { runtime: String },

    /// A command was rejected because it is not on the allow-list.
    #[error("command not allowed: {0}")]
    CommandNotAllowed(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal invariant violation; should not occur for valid inputs.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an `InvalidQuery` error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Create a `BudgetExhausted` error.
    pub fn budget_exhausted(resource: impl Into<String>) -> Self {
        Self::BudgetExhausted {
            resource: resource.into(),
        }
    }

    /// Create a `RateLimited` error.
    pub fn rate_limited(key: impl Into<String>) -> Self {
        Self::RateLimited { key: key.into() }
    }

    /// Create a `Timeout` error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a `GeneratorFailed` error.
    pub fn generator_failed(message: impl Into<String>) -> Self {
        Self::GeneratorFailed(message.into())
    }

    /// Create a `VerificationFailed` error.
    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self::VerificationFailed(message.into())
    }

    /// Create a `SandboxUnavailable` error.
    pub fn sandbox_unavailable(runtime: impl Into<String>) -> Self {
        Self::SandboxUnavailable {
            runtime: runtime.into(),
        }
    }
}
