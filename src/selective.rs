//! Selective generation: expected-value or threshold-based
//! answer/abstain decisions layered on top of a confidence estimate.

use crate::error::{Error, Result};
use crate::types::{Candidate, ConfidenceEstimate, Decision, DecisionResult};

#[derive(Debug, Clone, Copy)]
pub struct SelectiveGeneration {
    pub reward: f64,
    pub penalty: f64,
    pub use_ev: bool,
    pub confidence_threshold: Option<f64>,
}

impl SelectiveGeneration {
    pub fn new(reward: f64, penalty: f64) -> Result<Self> {
        if !(reward > 0.0 && reward <= 1000.0) {
            return Err(Error::InvalidScore(reward));
        }
        if !(0.0..=1000.0).contains(&penalty) {
            return Err(Error::InvalidScore(penalty));
        }
        Ok(Self {
            reward,
            penalty,
            use_ev: true,
            confidence_threshold: None,
        })
    }

    pub fn with_use_ev(mut self, use_ev: bool) -> Self {
        self.use_ev = use_ev;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidScore(threshold));
        }
        self.confidence_threshold = Some(threshold);
        Ok(self)
    }

    pub fn answer_or_abstain(&self, candidate: &Candidate, estimate: &ConfidenceEstimate) -> DecisionResult {
        let c = estimate.score;
        let mut result_candidate = candidate.clone();

        let (decision, ev_answer, ev_abstain) = if self.use_ev {
            let ev_answer = c * self.reward - (1.0 - c) * self.penalty;
            let ev_abstain = 0.0;
            let decision = if ev_answer > ev_abstain { Decision::Answer } else { Decision::Abstain };
            (decision, ev_answer, ev_abstain)
        } else {
            let threshold = self.confidence_threshold.unwrap_or(0.5);
            let decision = if c >= threshold { Decision::Answer } else { Decision::Abstain };
            (decision, c, threshold)
        };

        if decision == Decision::Abstain {
            result_candidate.content = Some(format!(
                "I'm choosing not to answer this directly. Confidence: {:.2}. Expected value of answering: {:.2}.",
                c, ev_answer
            ));
        }

        DecisionResult {
            decision,
            candidate: result_candidate,
            ev_answer,
            ev_abstain,
            reasoning: estimate.reasoning.clone(),
            metadata: std::collections::HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(score: f64) -> ConfidenceEstimate {
        ConfidenceEstimate::new(score, "test").unwrap()
    }

    #[test]
    fn ev_mode_answers_when_positive_expected_value() {
        let sg = SelectiveGeneration::new(10.0, 1.0).unwrap();
        let candidate = Candidate::new().with_content("answer");
        let result = sg.answer_or_abstain(&candidate, &estimate(0.9));
        assert_eq!(result.decision, Decision::Answer);
    }

    #[test]
    fn ev_mode_abstains_when_expected_value_negative() {
        let sg = SelectiveGeneration::new(1.0, 100.0).unwrap();
        let candidate = Candidate::new().with_content("answer");
        let result = sg.answer_or_abstain(&candidate, &estimate(0.1));
        assert_eq!(result.decision, Decision::Abstain);
        let content = result.candidate.content.unwrap();
        assert!(content.contains("Confidence"));
        assert!(content.contains("Expected value"));
    }

    #[test]
    fn threshold_mode_compares_against_confidence_threshold() {
        let sg = SelectiveGeneration::new(10.0, 1.0)
            .unwrap()
            .with_use_ev(false)
            .with_confidence_threshold(0.6)
            .unwrap();
        let candidate = Candidate::new().with_content("answer");
        assert_eq!(sg.answer_or_abstain(&candidate, &estimate(0.7)).decision, Decision::Answer);
        assert_eq!(sg.answer_or_abstain(&candidate, &estimate(0.5)).decision, Decision::Abstain);
    }

    #[test]
    fn rejects_reward_out_of_range() {
        assert!(SelectiveGeneration::new(0.0, 1.0).is_err());
        assert!(SelectiveGeneration::new(1001.0, 1.0).is_err());
    }
}
