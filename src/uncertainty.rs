//! Uncertainty quantification: classifies a query into
//! `aleatoric`/`epistemic`/`none` via a `LazyLock<Regex>` pattern bank, in
//! the same idiom as `difficulty::heuristic` and `telemetry`'s redaction
//! patterns.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};

use crate::error::{Error, Result};
use crate::types::{SuggestedAction, UncertaintyResult, UncertaintyType};

static ALEATORIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(best|worst|greatest|most|least|favorite|prettiest|nicest|better|worse|opinion|think|feel|should I|which is better|more interesting|depends on)\b")
        .expect("valid regex")
});

static EPISTEMIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(will|predict|forecast|in the future|next year|going to|likely to|expect\w*|someday|eventually)\b")
        .expect("valid regex")
});

/// A custom pattern bank, validated at construction so invalid regex
/// strings fail fast with `invalid_patterns` rather than at classification
/// time.
pub struct PatternBank {
    aleatoric: RegexSet,
    epistemic: RegexSet,
}

impl PatternBank {
    pub fn new(aleatoric_patterns: &[String], epistemic_patterns: &[String]) -> Result<Self> {
        let aleatoric = RegexSet::new(aleatoric_patterns)
            .map_err(|e| Error::InvalidPatterns(format!("aleatoric patterns: {e}")))?;
        let epistemic = RegexSet::new(epistemic_patterns)
            .map_err(|e| Error::InvalidPatterns(format!("epistemic patterns: {e}")))?;
        Ok(Self { aleatoric, epistemic })
    }
}

pub struct UncertaintyQuantification {
    custom: Option<PatternBank>,
}

impl UncertaintyQuantification {
    pub fn new() -> Self {
        Self { custom: None }
    }

    pub fn with_custom_patterns(mut self, bank: PatternBank) -> Self {
        self.custom = Some(bank);
        self
    }

    fn scores(&self, text: &str) -> (f64, f64) {
        match &self.custom {
            Some(bank) => (
                bank.aleatoric.matches(text).iter().count() as f64,
                bank.epistemic.matches(text).iter().count() as f64,
            ),
            None => (
                ALEATORIC_PATTERN.find_iter(text).count() as f64,
                EPISTEMIC_PATTERN.find_iter(text).count() as f64,
            ),
        }
    }

    pub fn classify(&self, query: &str, confidence: f64) -> UncertaintyResult {
        let (aleatoric_hits, epistemic_hits) = self.scores(query);
        let total_signal = aleatoric_hits + epistemic_hits;

        let uncertainty_type = if total_signal == 0.0 {
            UncertaintyType::None
        } else if aleatoric_hits >= epistemic_hits {
            UncertaintyType::Aleatoric
        } else {
            UncertaintyType::Epistemic
        };

        let suggested_action = match uncertainty_type {
            UncertaintyType::Aleatoric => SuggestedAction::ProvideOptions,
            UncertaintyType::Epistemic if confidence >= 0.5 => SuggestedAction::Abstain,
            UncertaintyType::Epistemic => SuggestedAction::SuggestSource,
            UncertaintyType::None => SuggestedAction::AnswerDirectly,
        };

        UncertaintyResult {
            uncertainty_type,
            confidence,
            reasoning: Some(format!(
                "aleatoric_hits={aleatoric_hits}, epistemic_hits={epistemic_hits}"
            )),
            suggested_action,
        }
    }
}

impl Default for UncertaintyQuantification {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_aleatoric_on_superlative_or_opinion_language() {
        let uq = UncertaintyQuantification::new();
        let result = uq.classify("What is the best movie of all time?", 0.8);
        assert_eq!(result.uncertainty_type, UncertaintyType::Aleatoric);
        assert_eq!(result.suggested_action, SuggestedAction::ProvideOptions);
    }

    #[test]
    fn classifies_epistemic_on_prediction_language() {
        let uq = UncertaintyQuantification::new();
        let result = uq.classify("Will AI replace programmers in the future?", 0.8);
        assert_eq!(result.uncertainty_type, UncertaintyType::Epistemic);
        assert_eq!(result.suggested_action, SuggestedAction::Abstain);
    }

    #[test]
    fn epistemic_with_low_confidence_suggests_source() {
        let uq = UncertaintyQuantification::new();
        let result = uq.classify("Will it rain next year on this exact day?", 0.2);
        assert_eq!(result.suggested_action, SuggestedAction::SuggestSource);
    }

    #[test]
    fn plain_factual_query_is_none() {
        let uq = UncertaintyQuantification::new();
        let result = uq.classify("What is the capital of France?", 0.9);
        assert_eq!(result.uncertainty_type, UncertaintyType::None);
        assert_eq!(result.suggested_action, SuggestedAction::AnswerDirectly);
    }

    #[test]
    fn invalid_custom_pattern_fails() {
        let bank = PatternBank::new(&["(unclosed".to_string()], &[]);
        assert!(matches!(bank, Err(Error::InvalidPatterns(_))));
    }

    #[test]
    fn custom_patterns_override_defaults() {
        let bank = PatternBank::new(&[], &[r"\bmaybe\b".to_string()]).unwrap();
        let uq = UncertaintyQuantification::new().with_custom_patterns(bank);
        let result = uq.classify("Maybe it will happen", 0.9);
        assert_eq!(result.uncertainty_type, UncertaintyType::Epistemic);
    }
}
