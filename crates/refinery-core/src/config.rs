use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RefineError, Result};

pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;
pub const DEFAULT_RESOLUTION_THRESHOLD: f64 = 0.7;
pub const DEFAULT_SCOPE_WINDOW: usize = 50;
pub const DEFAULT_KG_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Weights blending the four confidence sub-scores.
///
/// They need not sum to one; the blended score is clipped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub match_quality: f64,
    pub attr_completeness: f64,
    pub text_specificity: f64,
    pub type_consistency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            match_quality: 0.4,
            attr_completeness: 0.2,
            text_specificity: 0.2,
            type_consistency: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("match_quality", self.match_quality),
            ("attr_completeness", self.attr_completeness),
            ("text_specificity", self.text_specificity),
            ("type_consistency", self.type_consistency),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RefineError::Config(format!(
                    "confidence weight {name} must be a finite non-negative number, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Stage toggles and tuning for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source_grounding: bool,
    pub overlap_dedup: bool,
    pub confidence_scoring: bool,
    pub entity_resolution: bool,
    pub relation_inference: bool,
    pub kg_injection: bool,
    pub confidence_weights: ScoreWeights,
    pub overlap_threshold: f64,
    pub type_aware_dedup: bool,
    pub resolution_threshold: f64,
    pub scope_window: usize,
    pub kg_confidence_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_grounding: true,
            overlap_dedup: true,
            confidence_scoring: true,
            entity_resolution: true,
            relation_inference: true,
            kg_injection: false,
            confidence_weights: ScoreWeights::default(),
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            type_aware_dedup: true,
            resolution_threshold: DEFAULT_RESOLUTION_THRESHOLD,
            scope_window: DEFAULT_SCOPE_WINDOW,
            kg_confidence_threshold: DEFAULT_KG_CONFIDENCE_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loaded pipeline configuration file");
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.confidence_weights.validate()?;

        let fractions = [
            ("overlap_threshold", self.overlap_threshold),
            ("resolution_threshold", self.resolution_threshold),
            ("kg_confidence_threshold", self.kg_confidence_threshold),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(RefineError::Config(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }

        if self.scope_window == 0 {
            return Err(RefineError::Config("scope_window must be at least 1".into()));
        }

        Ok(())
    }
}
