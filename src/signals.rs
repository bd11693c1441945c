//! Directive and result signal surface: the inbound `Run`
//! directive and the two outbound signal shapes a strategy adapter emits
//! after driving a `Pipeline` run.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::types::{Candidate, PipelineResult};

/// An inbound `accuracy.run` signal, `{query, preset?, config?}`, resolved
/// into a directive carrying defaults.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub query: String,
    pub preset: String,
    pub config: HashMap<String, Value>,
    pub timeout: Duration,
}

impl Run {
    /// Resolves an inbound signal: `preset` defaults to `"balanced"`,
    /// `timeout` defaults to 30 000 ms.
    pub fn from_signal(query: impl Into<String>, preset: Option<String>, config: Option<HashMap<String, Value>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            preset: preset.unwrap_or_else(|| "balanced".to_string()),
            config: config.unwrap_or_default(),
            timeout: Duration::from_millis(30_000),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outbound `accuracy.result` signal.
#[derive(Debug, Clone)]
pub struct ResultSignal {
    pub call_id: String,
    pub query: String,
    pub preset: String,
    pub answer: Option<String>,
    pub confidence: Option<f64>,
    pub candidates: Vec<Candidate>,
    pub duration_ms: u64,
    pub metadata: HashMap<String, Value>,
}

impl ResultSignal {
    pub fn from_pipeline_result(run: &Run, result: &PipelineResult, candidates: Vec<Candidate>) -> Self {
        let duration_ms = result
            .metadata
            .get("total_duration_ms")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Self {
            call_id: run.id.clone(),
            query: run.query.clone(),
            preset: run.preset.clone(),
            answer: result.answer.clone(),
            confidence: result.confidence,
            candidates,
            duration_ms,
            metadata: result.metadata.clone(),
        }
    }
}

/// Outbound `accuracy.error` signal.
#[derive(Debug, Clone)]
pub struct ErrorSignal {
    pub call_id: String,
    pub query: String,
    pub preset: String,
    pub error: String,
    pub message: String,
    pub stage: Option<String>,
}

impl ErrorSignal {
    pub fn from_error(run: &Run, error: &Error, stage: Option<String>) -> Self {
        Self {
            call_id: run.id.clone(),
            query: run.query.clone(),
            preset: run.preset.clone(),
            error: error_tag(error),
            message: error.to_string(),
            stage,
        }
    }
}

/// The closed error-tag vocabulary corresponding to an `Error`
/// variant, used as the `accuracy.error` signal's `error` field.
fn error_tag(error: &Error) -> String {
    match error {
        Error::InvalidQuery(_) => "invalid_query",
        Error::QueryTooLong { .. } => "query_too_long",
        Error::InvalidNumCandidates(_) => "invalid_num_candidates",
        Error::InvalidThresholds(_) => "invalid_thresholds",
        Error::InvalidAction(_) => "invalid_action",
        Error::InvalidScore(_) => "invalid_score",
        Error::InvalidConfidenceLevel(_) => "invalid_confidence_level",
        Error::MinCandidatesExceedsMax { .. } => "min_candidates_must_be_less_than_max",
        Error::InvalidEarlyStopThreshold(_) => "early_stop_threshold_must_be_between_0_and_1",
        Error::InvalidPatterns(_) => "invalid_patterns",
        Error::UnknownLevel(_) => "unknown_level",
        Error::PromptRequired => "prompt_required",
        Error::BudgetExhausted { .. } => "budget_exhausted",
        Error::RateLimited { .. } => "rate_limited",
        Error::Timeout { .. } => "timeout",
        Error::VerificationFailed(_) => "verification_failed",
        Error::BatchCritiqueFailed(_) => "batch_critique_failed",
        Error::GeneratorFailed(_) => "generator_failed",
        Error::InvalidGenerator(_) => "invalid_generator",
        Error::NoCandidates => "no_candidates",
        Error::DirectoryNotFound(_) => "directory_not_found",
        Error::ForbiddenEnvironmentKey(_) => "forbidden_environment_key",
        Error::SandboxUnavailable { .. } => "sandbox_unavailable",
        Error::CommandNotAllowed(_) => "command_not_allowed",
        Error::Serialization(_) => "serialization_error",
        Error::Internal(_) => "internal_error",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_from_signal_defaults_preset_and_timeout() {
        let run = Run::from_signal("What is 2+2?", None, None);
        assert_eq!(run.preset, "balanced");
        assert_eq!(run.timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn error_signal_carries_closed_tag() {
        let run = Run::from_signal("q", None, None);
        let error = Error::NoCandidates;
        let signal = ErrorSignal::from_error(&run, &error, Some("generation".to_string()));
        assert_eq!(signal.error, "no_candidates");
        assert_eq!(signal.stage.as_deref(), Some("generation"));
    }

    #[test]
    fn result_signal_reads_duration_from_metadata() {
        let run = Run::from_signal("q", Some("fast".to_string()), None);
        let mut metadata = HashMap::new();
        metadata.insert("total_duration_ms".to_string(), serde_json::json!(42));
        let result = PipelineResult {
            answer: Some("42".to_string()),
            confidence: Some(0.9),
            action: None,
            trace: vec![],
            metadata,
        };
        let signal = ResultSignal::from_pipeline_result(&run, &result, vec![]);
        assert_eq!(signal.duration_ms, 42);
        assert_eq!(signal.preset, "fast");
    }
}
