//! Core data model shared across the accuracy pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Convert a `serde_json::Value` into an `f64`, if possible.
fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
}

fn map_get<'a>(map: &'a HashMap<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key)
}

/// One generator output.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub score: Option<f64>,
    pub tokens_used: Option<u64>,
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl Candidate {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: None,
            reasoning: None,
            score: None,
            tokens_used: None,
            model: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_tokens_used(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a new `Candidate` with an updated score; mutation always
    /// produces a new value rather than mutating in place.
    pub fn rescored(&self, score: f64) -> Self {
        let mut next = self.clone();
        next.score = Some(score);
        next
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("id".into(), json!(self.id));
        m.insert("content".into(), json!(self.content));
        m.insert("reasoning".into(), json!(self.reasoning));
        m.insert("score".into(), json!(self.score));
        m.insert("tokens_used".into(), json!(self.tokens_used));
        m.insert("model".into(), json!(self.model));
        m.insert("timestamp".into(), json!(self.timestamp.to_rfc3339()));
        m.insert("metadata".into(), json!(self.metadata));
        m
    }

    pub fn from_map(map: &HashMap<String, Value>) -> Result<Self> {
        let id = map_get(map, "id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let content = map_get(map, "content")
            .and_then(Value::as_str)
            .map(str::to_string);
        let reasoning = map_get(map, "reasoning")
            .and_then(Value::as_str)
            .map(str::to_string);
        let score = map_get(map, "score").and_then(as_f64);
        let tokens_used = map_get(map, "tokens_used").and_then(Value::as_u64);
        let model = map_get(map, "model")
            .and_then(Value::as_str)
            .map(str::to_string);
        let timestamp = map_get(map, "timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let metadata = map_get(map, "metadata")
            .and_then(Value::as_object)
            .map(|o| o.clone().into_iter().collect())
            .unwrap_or_default();
        Ok(Self {
            id,
            content,
            reasoning,
            score,
            tokens_used,
            model,
            timestamp,
            metadata,
        })
    }
}

impl Default for Candidate {
    fn default() -> Self {
        Self::new()
    }
}

/// An ordered sequence of candidates plus derived aggregate fields.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub candidates: Vec<Candidate>,
    pub total_tokens: u64,
    pub best_candidate: Option<usize>,
    pub aggregation_method: String,
    pub metadata: HashMap<String, Value>,
}

impl GenerationResult {
    /// Builds a `GenerationResult` from a candidate set, re-deriving
    /// `total_tokens` and `best_candidate`'s invariant.
    pub fn new(candidates: Vec<Candidate>, aggregation_method: impl Into<String>) -> Self {
        let total_tokens = candidates.iter().map(|c| c.tokens_used.unwrap_or(0)).sum();
        let best_candidate = best_index(&candidates);
        Self {
            candidates,
            total_tokens,
            best_candidate,
            aggregation_method: aggregation_method.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.best_candidate.and_then(|i| self.candidates.get(i))
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert(
            "candidates".into(),
            json!(self.candidates.iter().map(Candidate::to_map).collect::<Vec<_>>()),
        );
        m.insert("total_tokens".into(), json!(self.total_tokens));
        m.insert(
            "best_candidate".into(),
            json!(self.best().map(Candidate::to_map)),
        );
        m.insert("aggregation_method".into(), json!(self.aggregation_method));
        m.insert("metadata".into(), json!(self.metadata));
        m
    }

    pub fn from_map(map: &HashMap<String, Value>) -> Result<Self> {
        let candidates = map_get(map, "candidates")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_object())
                    .map(|o| Candidate::from_map(&o.clone().into_iter().collect()))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();
        let aggregation_method = map_get(map, "aggregation_method")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let metadata = map_get(map, "metadata")
            .and_then(Value::as_object)
            .map(|o| o.clone().into_iter().collect())
            .unwrap_or_default();
        Ok(Self::new(candidates, aggregation_method).with_metadata_map(metadata))
    }

    fn with_metadata_map(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

fn best_index(candidates: &[Candidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.score.map(|s| (i, s)))
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

/// Difficulty level bucket. `easy ⇔ score<0.35`, `hard ⇔ score>0.65`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.35 {
            DifficultyLevel::Easy
        } else if score > 0.65 {
            DifficultyLevel::Hard
        } else {
            DifficultyLevel::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "easy" => Ok(DifficultyLevel::Easy),
            "medium" => Ok(DifficultyLevel::Medium),
            "hard" => Ok(DifficultyLevel::Hard),
            other => Err(Error::InvalidAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyEstimate {
    pub level: DifficultyLevel,
    pub score: f64,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl DifficultyEstimate {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            level: DifficultyLevel::from_score(score),
            score,
            confidence,
            reasoning: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// A resolved compute budget for a generation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputeBudget {
    pub num_candidates: u32,
    pub use_prm: bool,
    pub use_search: bool,
    pub max_refinements: u32,
    pub search_iterations: u32,
    pub prm_threshold: f64,
}

impl ComputeBudget {
    pub fn new(num_candidates: u32) -> Result<Self> {
        if num_candidates == 0 {
            return Err(Error::InvalidNumCandidates(0));
        }
        Ok(Self {
            num_candidates,
            use_prm: false,
            use_search: false,
            max_refinements: 0,
            search_iterations: 0,
            prm_threshold: 0.5,
        })
    }

    pub fn with_prm(mut self, use_prm: bool) -> Self {
        self.use_prm = use_prm;
        self
    }

    pub fn with_search(mut self, use_search: bool, search_iterations: u32) -> Self {
        self.use_search = use_search;
        self.search_iterations = search_iterations;
        self
    }

    pub fn with_max_refinements(mut self, max_refinements: u32) -> Self {
        self.max_refinements = max_refinements;
        self
    }

    pub fn with_prm_threshold(mut self, prm_threshold: f64) -> Self {
        self.prm_threshold = prm_threshold;
        self
    }

    /// `cost = num_candidates + (use_prm?num_candidates*0.5:0) +
    /// (use_search?search_iterations*0.01:0) + max_refinements`.
    pub fn cost(&self) -> f64 {
        let mut c = self.num_candidates as f64;
        if self.use_prm {
            c += self.num_candidates as f64 * 0.5;
        }
        if self.use_search {
            c += self.search_iterations as f64 * 0.01;
        }
        c += self.max_refinements as f64;
        c
    }

    /// The `easy` canonical preset: (3, no, no, 0) → cost 3.0.
    pub fn easy() -> Self {
        Self {
            num_candidates: 3,
            use_prm: false,
            use_search: false,
            max_refinements: 0,
            search_iterations: 0,
            prm_threshold: 0.5,
        }
    }

    /// The `medium` canonical preset: (5, yes, no, 1) → cost 8.5.
    pub fn medium() -> Self {
        Self {
            num_candidates: 5,
            use_prm: true,
            use_search: false,
            max_refinements: 1,
            search_iterations: 0,
            prm_threshold: 0.5,
        }
    }

    /// The `hard` canonical preset: (10, yes, yes@50, 2) → cost 17.5.
    pub fn hard() -> Self {
        Self {
            num_candidates: 10,
            use_prm: true,
            use_search: true,
            max_refinements: 2,
            search_iterations: 50,
            prm_threshold: 0.5,
        }
    }

    pub fn for_level(level: DifficultyLevel) -> Self {
        match level {
            DifficultyLevel::Easy => Self::easy(),
            DifficultyLevel::Medium => Self::medium(),
            DifficultyLevel::Hard => Self::hard(),
        }
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("num_candidates".into(), json!(self.num_candidates));
        m.insert("use_prm".into(), json!(self.use_prm));
        m.insert("use_search".into(), json!(self.use_search));
        m.insert("max_refinements".into(), json!(self.max_refinements));
        m.insert("search_iterations".into(), json!(self.search_iterations));
        m.insert("prm_threshold".into(), json!(self.prm_threshold));
        m.insert("cost".into(), json!(self.cost()));
        m
    }

    pub fn from_map(map: &HashMap<String, Value>) -> Result<Self> {
        let num_candidates = map_get(map, "num_candidates")
            .and_then(Value::as_u64)
            .unwrap_or(1) as u32;
        Ok(Self {
            num_candidates,
            use_prm: map_get(map, "use_prm").and_then(Value::as_bool).unwrap_or(false),
            use_search: map_get(map, "use_search").and_then(Value::as_bool).unwrap_or(false),
            max_refinements: map_get(map, "max_refinements").and_then(Value::as_u64).unwrap_or(0) as u32,
            search_iterations: map_get(map, "search_iterations").and_then(Value::as_u64).unwrap_or(0) as u32,
            prm_threshold: map_get(map, "prm_threshold").and_then(as_f64).unwrap_or(0.5),
        })
    }
}

/// The outcome of scoring a single candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub candidate_id: Option<String>,
    pub score: Option<f64>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub step_scores: Option<HashMap<String, f64>>,
    pub metadata: HashMap<String, Value>,
}

impl VerificationResult {
    pub fn new() -> Self {
        Self {
            candidate_id: None,
            score: None,
            confidence: None,
            reasoning: None,
            step_scores: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_candidate_id(mut self, id: impl Into<String>) -> Self {
        self.candidate_id = Some(id.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_step_scores(mut self, step_scores: HashMap<String, f64>) -> Self {
        self.step_scores = Some(step_scores);
        self
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("candidate_id".into(), json!(self.candidate_id));
        m.insert("score".into(), json!(self.score));
        m.insert("confidence".into(), json!(self.confidence));
        m.insert("reasoning".into(), json!(self.reasoning));
        m.insert("step_scores".into(), json!(self.step_scores));
        m.insert("metadata".into(), json!(self.metadata));
        m
    }

    pub fn from_map(map: &HashMap<String, Value>) -> Result<Self> {
        let step_scores = map_get(map, "step_scores").and_then(Value::as_object).map(|o| {
            o.iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect()
        });
        Ok(Self {
            candidate_id: map_get(map, "candidate_id").and_then(Value::as_str).map(str::to_string),
            score: map_get(map, "score").and_then(as_f64),
            confidence: map_get(map, "confidence").and_then(as_f64),
            reasoning: map_get(map, "reasoning").and_then(Value::as_str).map(str::to_string),
            step_scores,
            metadata: map_get(map, "metadata")
                .and_then(Value::as_object)
                .map(|o| o.clone().into_iter().collect())
                .unwrap_or_default(),
        })
    }
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// high ≥0.7; medium ∈[0.4,0.7); low <0.4.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            ConfidenceLevel::High
        } else if score >= 0.4 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceEstimate {
    pub score: f64,
    pub method: String,
    pub calibration: Option<String>,
    pub reasoning: Option<String>,
    pub token_confidences: Option<Vec<f64>>,
    pub metadata: HashMap<String, Value>,
}

impl ConfidenceEstimate {
    pub fn new(score: f64, method: impl Into<String>) -> Result<Self> {
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::InvalidScore(score));
        }
        Ok(Self {
            score,
            method: method.into(),
            calibration: None,
            reasoning: None,
            token_confidences: None,
            metadata: HashMap::new(),
        })
    }

    pub fn level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingAction {
    Direct,
    WithVerification,
    WithCitations,
    Abstain,
    Escalate,
}

impl RoutingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingAction::Direct => "direct",
            RoutingAction::WithVerification => "with_verification",
            RoutingAction::WithCitations => "with_citations",
            RoutingAction::Abstain => "abstain",
            RoutingAction::Escalate => "escalate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingResult {
    pub action: RoutingAction,
    pub candidate: Candidate,
    pub original_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub reasoning: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl RoutingResult {
    pub fn unmodified(&self) -> bool {
        matches!(self.action, RoutingAction::Direct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Answer,
    Abstain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionResult {
    pub decision: Decision,
    pub candidate: Candidate,
    pub ev_answer: f64,
    pub ev_abstain: f64,
    pub reasoning: Option<String>,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UncertaintyType {
    Aleatoric,
    Epistemic,
    None,
}

impl UncertaintyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyType::Aleatoric => "aleatoric",
            UncertaintyType::Epistemic => "epistemic",
            UncertaintyType::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestedAction {
    AnswerDirectly,
    ProvideOptions,
    Abstain,
    SuggestSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyResult {
    pub uncertainty_type: UncertaintyType,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub suggested_action: SuggestedAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CritiqueResult {
    pub severity: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub feedback: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl CritiqueResult {
    pub fn new(severity: f64) -> Self {
        Self {
            severity: severity.clamp(0.0, 1.0),
            issues: Vec::new(),
            suggestions: Vec::new(),
            feedback: None,
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflexionMemoryEntry {
    pub prompt: String,
    pub mistake: String,
    pub correction: String,
    pub severity: f64,
    pub keywords: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Stage tags accepted in `PipelineConfig.stages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageTag {
    DifficultyEstimation,
    Rag,
    Generation,
    Verification,
    Search,
    Reflection,
    Calibration,
}

impl StageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageTag::DifficultyEstimation => "difficulty_estimation",
            StageTag::Rag => "rag",
            StageTag::Generation => "generation",
            StageTag::Verification => "verification",
            StageTag::Search => "search",
            StageTag::Reflection => "reflection",
            StageTag::Calibration => "calibration",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "difficulty_estimation" => Ok(StageTag::DifficultyEstimation),
            "rag" => Ok(StageTag::Rag),
            "generation" => Ok(StageTag::Generation),
            "verification" => Ok(StageTag::Verification),
            "search" => Ok(StageTag::Search),
            "reflection" => Ok(StageTag::Reflection),
            "calibration" => Ok(StageTag::Calibration),
            other => Err(Error::InvalidAction(other.to_string())),
        }
    }

    /// Required stages: `:generation` always, `:calibration`
    /// when enabled in the stage list.
    pub fn is_required(&self) -> bool {
        matches!(self, StageTag::Generation | StageTag::Calibration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Ok,
    Error,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub stage: String,
    pub status: StageStatus,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub stages: Vec<StageTag>,
    pub sub_configs: HashMap<String, Value>,
}

impl PipelineConfig {
    pub fn new(stages: Vec<StageTag>) -> Result<Self> {
        if !stages.contains(&StageTag::Generation) {
            return Err(Error::invalid_query(
                "PipelineConfig must contain the :generation stage",
            ));
        }
        Ok(Self {
            stages,
            sub_configs: HashMap::new(),
        })
    }

    pub fn with_sub_config(mut self, stage: impl Into<String>, config: Value) -> Self {
        self.sub_configs.insert(stage.into(), config);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub answer: Option<String>,
    pub confidence: Option<f64>,
    pub action: Option<RoutingAction>,
    pub trace: Vec<TraceEntry>,
    pub metadata: HashMap<String, Value>,
}
