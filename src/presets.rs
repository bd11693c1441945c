//! Preset catalogue: the stable named configurations a strategy
//! adapter resolves a `Run.preset` tag into. Each preset fully specifies a
//! stage list, candidate band, and calibration thresholds, and must pass
//! `PipelineConfig::new` validation (it includes `:generation`).

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::self_consistency::SelfConsistencyConfig;
use crate::types::{PipelineConfig, StageTag};

/// A resolved preset: the pipeline stage configuration plus the
/// calibration-gate thresholds a caller uses to build a `CalibrationGate`.
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: &'static str,
    pub config: PipelineConfig,
    pub self_consistency: SelfConsistencyConfig,
    pub calibration_high: f64,
    pub calibration_low: f64,
}

fn self_consistency(min: u32, max: u32, batch: u32, early_stop: f64) -> SelfConsistencyConfig {
    SelfConsistencyConfig {
        min_candidates: min,
        max_candidates: max,
        batch_size: batch,
        early_stop_threshold: early_stop,
    }
}

fn with_candidates(n: u64) -> Value {
    json!({ "num_candidates": n })
}

/// Low latency: single candidate, no verification or reflection, loose
/// calibration thresholds so most answers pass straight through.
pub fn fast() -> Preset {
    let config = PipelineConfig::new(vec![StageTag::Generation, StageTag::Calibration])
        .expect("fast preset always includes :generation")
        .with_sub_config("generation", with_candidates(1));
    Preset {
        name: "fast",
        config,
        self_consistency: self_consistency(1, 3, 1, 0.9),
        calibration_high: 0.6,
        calibration_low: 0.3,
    }
}

/// The default: difficulty-aware self-consistency sampling, verification,
/// and calibration at moderate thresholds.
pub fn balanced() -> Preset {
    let config = PipelineConfig::new(vec![
        StageTag::DifficultyEstimation,
        StageTag::Generation,
        StageTag::Verification,
        StageTag::Calibration,
    ])
    .expect("balanced preset always includes :generation");
    Preset {
        name: "balanced",
        config,
        self_consistency: SelfConsistencyConfig::default(),
        calibration_high: 0.7,
        calibration_low: 0.4,
    }
}

/// Maximum accuracy: wide candidate band, verification, a reflection pass,
/// and tight calibration thresholds that escalate rather than abstain.
pub fn accurate() -> Preset {
    let config = PipelineConfig::new(vec![
        StageTag::DifficultyEstimation,
        StageTag::Generation,
        StageTag::Verification,
        StageTag::Reflection,
        StageTag::Calibration,
    ])
    .expect("accurate preset always includes :generation");
    Preset {
        name: "accurate",
        config,
        self_consistency: self_consistency(5, 15, 5, 0.85),
        calibration_high: 0.8,
        calibration_low: 0.5,
    }
}

/// Coding tasks: verification-heavy, reflection enabled (compile-error /
/// lint-style critique loops), no rag.
pub fn coding() -> Preset {
    let config = PipelineConfig::new(vec![
        StageTag::Generation,
        StageTag::Verification,
        StageTag::Reflection,
        StageTag::Calibration,
    ])
    .expect("coding preset always includes :generation")
    .with_sub_config("generation", with_candidates(5));
    Preset {
        name: "coding",
        config,
        self_consistency: self_consistency(3, 8, 3, 0.8),
        calibration_high: 0.75,
        calibration_low: 0.45,
    }
}

/// Research/open-ended queries: retrieval-augmented, self-consistency,
/// search, and reflection all enabled ahead of calibration.
pub fn research() -> Preset {
    let config = PipelineConfig::new(vec![
        StageTag::DifficultyEstimation,
        StageTag::Rag,
        StageTag::Generation,
        StageTag::Search,
        StageTag::Reflection,
        StageTag::Calibration,
    ])
    .expect("research preset always includes :generation");
    Preset {
        name: "research",
        config,
        self_consistency: self_consistency(5, 12, 4, 0.85),
        calibration_high: 0.75,
        calibration_low: 0.45,
    }
}

/// Resolves a stable preset name (`fast`, `balanced`, `accurate`, `coding`,
/// `research`) to its `Preset`. Unknown tags fail with `unknown_level`,
/// matching the closed-tag-vocabulary failure mode used for custom
/// difficulty/budget tags elsewhere.
pub fn resolve(name: &str) -> Result<Preset> {
    match name {
        "fast" => Ok(fast()),
        "balanced" => Ok(balanced()),
        "accurate" => Ok(accurate()),
        "coding" => Ok(coding()),
        "research" => Ok(research()),
        other => Err(Error::UnknownLevel(other.to_string())),
    }
}

/// `customize(preset, overrides)`: overrides *replace* entire sub-config
/// sections rather than deep-merging, per stage name (e.g. `"generation"`,
/// `"calibration"`). The `"calibration"` key, if present, replaces the
/// gate thresholds wholesale via `{high, low}`.
pub fn customize(preset: Preset, overrides: &std::collections::HashMap<String, Value>) -> Preset {
    let mut preset = preset;
    for (stage, value) in overrides {
        if stage == "calibration" {
            if let Some(high) = value.get("high").and_then(Value::as_f64) {
                preset.calibration_high = high;
            }
            if let Some(low) = value.get("low").and_then(Value::as_f64) {
                preset.calibration_low = low;
            }
            continue;
        }
        preset.config = preset.config.with_sub_config(stage.clone(), value.clone());
    }
    preset
}
