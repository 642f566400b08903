use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use refinery_core::item::{ExtractionItem, MatchType};

const HIGH_CONFIDENCE: f64 = 0.8;
const MEDIUM_CONFIDENCE: f64 = 0.5;

/// Histogram of item confidences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    /// `>= 0.8`
    pub high: usize,
    /// `>= 0.5`
    pub medium: usize,
    pub low: usize,
    pub unscored: usize,
}

/// Grounding tiers achieved across the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchQualitySummary {
    pub exact: usize,
    pub normalized: usize,
    pub fuzzy: usize,
    pub none: usize,
    /// Items that carry no match tier at all.
    pub ungrounded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_extractions: usize,
    pub dedup_removed: usize,
    pub by_type: BTreeMap<String, usize>,
    pub avg_confidence: f64,
    pub confidence_distribution: ConfidenceDistribution,
    pub match_quality: MatchQualitySummary,
    pub inferred_relations: usize,
}

impl PipelineStats {
    pub fn collect(
        extractions: &[ExtractionItem],
        dedup_removed: usize,
        inferred_relations: usize,
    ) -> Self {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut distribution = ConfidenceDistribution::default();
        let mut match_quality = MatchQualitySummary::default();
        let mut confidence_sum = 0.0;
        let mut scored = 0usize;

        for item in extractions {
            *by_type.entry(item.kind.as_str().to_string()).or_default() += 1;

            match item.confidence {
                Some(c) => {
                    confidence_sum += c;
                    scored += 1;
                    if c >= HIGH_CONFIDENCE {
                        distribution.high += 1;
                    } else if c >= MEDIUM_CONFIDENCE {
                        distribution.medium += 1;
                    } else {
                        distribution.low += 1;
                    }
                }
                None => distribution.unscored += 1,
            }

            match item.match_type() {
                Some(MatchType::Exact) => match_quality.exact += 1,
                Some(MatchType::Normalized) => match_quality.normalized += 1,
                Some(MatchType::Fuzzy) => match_quality.fuzzy += 1,
                Some(MatchType::Unmatched) => match_quality.none += 1,
                None => match_quality.ungrounded += 1,
            }
        }

        let avg_confidence = if scored == 0 {
            0.0
        } else {
            ((confidence_sum / scored as f64) * 10_000.0).round() / 10_000.0
        };

        Self {
            total_extractions: extractions.len(),
            dedup_removed,
            by_type,
            avg_confidence,
            confidence_distribution: distribution,
            match_quality,
            inferred_relations,
        }
    }
}
