//! Calibration gate: routes a candidate to a confidence tier and applies
//! a deterministic content transform based on threshold bands.

use std::time::Instant;

use serde_json::json;

use crate::error::{Error, Result};
use crate::telemetry;
use crate::types::{Candidate, ConfidenceEstimate, ConfidenceLevel, RoutingAction, RoutingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumAction {
    WithVerification,
    WithCitations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowAction {
    Abstain,
    Escalate,
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationGate {
    pub high_threshold: f64,
    pub low_threshold: f64,
    pub medium_action: MediumAction,
    pub low_action: LowAction,
    pub emit_telemetry: bool,
}

impl CalibrationGate {
    pub fn new(high_threshold: f64, low_threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&high_threshold) || !(0.0..=1.0).contains(&low_threshold) {
            return Err(Error::InvalidThresholds("thresholds must be within [0, 1]".to_string()));
        }
        if high_threshold <= low_threshold {
            return Err(Error::InvalidThresholds("high_threshold must exceed low_threshold".to_string()));
        }
        Ok(Self {
            high_threshold,
            low_threshold,
            medium_action: MediumAction::WithVerification,
            low_action: LowAction::Abstain,
            emit_telemetry: true,
        })
    }

    pub fn with_medium_action(mut self, action: MediumAction) -> Self {
        self.medium_action = action;
        self
    }

    pub fn with_low_action(mut self, action: LowAction) -> Self {
        self.low_action = action;
        self
    }

    pub fn with_emit_telemetry(mut self, emit: bool) -> Self {
        self.emit_telemetry = emit;
        self
    }

    /// `score ≥ high` → direct; `low ≤ score < high` → the configured
    /// medium action; `score < low` → the configured low action. Both
    /// boundaries are closed toward the more-confident bucket.
    pub fn route(&self, candidate: &Candidate, confidence_estimate: &ConfidenceEstimate) -> RoutingResult {
        let start = Instant::now();
        let score = confidence_estimate.score;
        let mut routed = candidate.clone();
        let level = ConfidenceLevel::from_score(score);

        let action = if score >= self.high_threshold {
            RoutingAction::Direct
        } else if score >= self.low_threshold {
            match self.medium_action {
                MediumAction::WithVerification => {
                    append_suffix(&mut routed, "[Confidence: Medium] Please verify this information");
                    RoutingAction::WithVerification
                }
                MediumAction::WithCitations => {
                    append_suffix(
                        &mut routed,
                        "[Confidence: Medium] Consider verifying this information against additional sources",
                    );
                    RoutingAction::WithCitations
                }
            }
        } else {
            match self.low_action {
                LowAction::Abstain => {
                    routed.content = Some(
                        "I'm not confident enough to answer this accurately. Please consult an authoritative source.".to_string(),
                    );
                    routed.metadata.insert("abstained".to_string(), json!(true));
                    RoutingAction::Abstain
                }
                LowAction::Escalate => {
                    routed.content = Some(
                        "This question has been escalated for review due to low confidence in the automated response.".to_string(),
                    );
                    routed.metadata.insert("escalated".to_string(), json!(true));
                    RoutingAction::Escalate
                }
            }
        };

        if self.emit_telemetry {
            telemetry::calibration_route(start.elapsed(), action.as_str(), level.as_str(), score);
        }

        RoutingResult {
            action,
            candidate: routed,
            original_score: score,
            confidence_level: level,
            reasoning: confidence_estimate.reasoning.clone(),
            metadata: std::collections::HashMap::new(),
        }
    }
}

fn append_suffix(candidate: &mut Candidate, suffix: &str) {
    let content = candidate.content.clone().unwrap_or_default();
    candidate.content = Some(format!("{content}\n\n{suffix}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(score: f64) -> ConfidenceEstimate {
        ConfidenceEstimate::new(score, "test").unwrap()
    }

    #[test]
    fn high_threshold_boundary_is_direct() {
        let gate = CalibrationGate::new(0.7, 0.4).unwrap();
        let candidate = Candidate::new().with_content("answer");
        let result = gate.route(&candidate, &estimate(0.7));
        assert_eq!(result.action, RoutingAction::Direct);
        assert!(result.unmodified());
    }

    #[test]
    fn low_threshold_boundary_is_medium() {
        let gate = CalibrationGate::new(0.7, 0.4).unwrap();
        let candidate = Candidate::new().with_content("answer");
        let result = gate.route(&candidate, &estimate(0.4));
        assert_eq!(result.action, RoutingAction::WithVerification);
        assert!(result.candidate.content.unwrap().contains("Please verify this information"));
    }

    #[test]
    fn below_low_threshold_abstains_by_default() {
        let gate = CalibrationGate::new(0.7, 0.4).unwrap();
        let candidate = Candidate::new().with_content("answer");
        let result = gate.route(&candidate, &estimate(0.1));
        assert_eq!(result.action, RoutingAction::Abstain);
        assert_eq!(result.candidate.metadata.get("abstained"), Some(&json!(true)));
        assert!(result.candidate.content.unwrap().contains("not confident enough"));
    }

    #[test]
    fn citations_suffix_used_when_configured() {
        let gate = CalibrationGate::new(0.7, 0.4).unwrap().with_medium_action(MediumAction::WithCitations);
        let candidate = Candidate::new().with_content("answer");
        let result = gate.route(&candidate, &estimate(0.5));
        assert!(result.candidate.content.unwrap().contains("additional sources"));
    }

    #[test]
    fn escalate_marks_metadata_when_configured() {
        let gate = CalibrationGate::new(0.7, 0.4).unwrap().with_low_action(LowAction::Escalate);
        let candidate = Candidate::new().with_content("answer");
        let result = gate.route(&candidate, &estimate(0.1));
        assert_eq!(result.candidate.metadata.get("escalated"), Some(&json!(true)));
    }

    #[test]
    fn rejects_high_not_exceeding_low() {
        assert!(matches!(CalibrationGate::new(0.4, 0.4), Err(Error::InvalidThresholds(_))));
    }
}
