use tracing::debug;

use refinery_core::config::ScoreWeights;
use refinery_core::item::{ExtractionItem, ItemKind};
use refinery_core::stage::Stage;

/// Sub-score for types that carry no attribute table.
const NEUTRAL_SCORE: f64 = 0.5;
/// Type consistency when no own-type attribute is present.
const CONSISTENCY_BASE: f64 = 0.7;
/// Penalty per attribute belonging to a different type.
const FOREIGN_ATTRIBUTE_PENALTY: f64 = 0.25;

/// Attributes a well-formed item of each type is expected to carry.
const EXPECTED_ATTRIBUTES: [(ItemKind, &[&str]); 4] = [
    (ItemKind::Rule, &["condition", "action"]),
    (ItemKind::Event, &["event_type", "direction"]),
    (ItemKind::Entity, &["entity_name", "entity_kind"]),
    (ItemKind::Constraint, &["check_type", "condition_cn"]),
];

fn expected_attributes(kind: &ItemKind) -> Option<&'static [&'static str]> {
    EXPECTED_ATTRIBUTES
        .iter()
        .find(|(k, _)| k == kind)
        .map(|(_, attrs)| *attrs)
}

/// The four sub-scores behind an item's confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub match_quality: f64,
    pub attr_completeness: f64,
    pub text_specificity: f64,
    pub type_consistency: f64,
}

impl ScoreBreakdown {
    pub fn blend(&self, weights: &ScoreWeights) -> f64 {
        let raw = self.match_quality * weights.match_quality
            + self.attr_completeness * weights.attr_completeness
            + self.text_specificity * weights.text_specificity
            + self.type_consistency * weights.type_consistency;
        round4(raw.clamp(0.0, 1.0))
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Produces a single confidence per item as a weighted blend of sub-scores.
#[derive(Default)]
pub struct ConfidenceScorer {
    weights: ScoreWeights,
}

impl ConfidenceScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn breakdown(item: &ExtractionItem) -> ScoreBreakdown {
        ScoreBreakdown {
            match_quality: match_quality(item),
            attr_completeness: attr_completeness(item),
            text_specificity: text_specificity(&item.text),
            type_consistency: type_consistency(item),
        }
    }

    pub fn score(&self, item: &ExtractionItem) -> f64 {
        Self::breakdown(item).blend(&self.weights)
    }
}

/// Absent locations count as the worst tier.
fn match_quality(item: &ExtractionItem) -> f64 {
    item.match_type().map_or(0.0, |m| m.confidence())
}

fn attr_completeness(item: &ExtractionItem) -> f64 {
    let Some(expected) = expected_attributes(&item.kind) else {
        return NEUTRAL_SCORE;
    };
    let present = expected.iter().filter(|a| item.has_attribute(a)).count();
    present as f64 / expected.len() as f64
}

/// Favors texts long enough to be specific but short enough to be a claim.
fn text_specificity(text: &str) -> f64 {
    match text.chars().count() {
        0 => 0.0,
        1..=2 => 0.2,
        3..=9 => 0.6,
        10..=200 => 1.0,
        201..=500 => 0.7,
        _ => 0.4,
    }
}

fn type_consistency(item: &ExtractionItem) -> f64 {
    let Some(own) = expected_attributes(&item.kind) else {
        return NEUTRAL_SCORE;
    };

    let base = if own.iter().any(|a| item.has_attribute(a)) {
        1.0
    } else {
        CONSISTENCY_BASE
    };

    let foreign = EXPECTED_ATTRIBUTES
        .iter()
        .filter(|(kind, _)| *kind != item.kind)
        .flat_map(|(_, attrs)| attrs.iter())
        .filter(|a| !own.contains(*a) && item.has_attribute(a))
        .count();

    (base - FOREIGN_ATTRIBUTE_PENALTY * foreign as f64).clamp(0.0, 1.0)
}

impl Stage for ConfidenceScorer {
    fn name(&self) -> &'static str {
        "confidence_scoring"
    }

    fn process(&self, items: &[ExtractionItem]) -> Vec<ExtractionItem> {
        let scored: Vec<ExtractionItem> = items
            .iter()
            .map(|item| {
                let mut scored = item.clone();
                // Relations carry upstream confidence; unscored ones stay asserted.
                if !item.kind.is_relation() {
                    scored.confidence = Some(self.score(item));
                }
                scored
            })
            .collect();

        let mean = if scored.is_empty() {
            0.0
        } else {
            scored.iter().filter_map(|i| i.confidence).sum::<f64>() / scored.len() as f64
        };
        debug!(items = scored.len(), mean_confidence = mean, "Confidence scoring complete");

        scored
    }
}

#[cfg(test)]
mod tests {
    use refinery_core::item::{MatchType, SourceLocation};

    use super::*;

    fn with_match(item: ExtractionItem, match_type: MatchType) -> ExtractionItem {
        item.with_location(SourceLocation {
            match_type: Some(match_type),
            ..SourceLocation::default()
        })
    }

    fn scores(scorer: &ConfidenceScorer, items: &[ExtractionItem]) -> Vec<f64> {
        scorer
            .process(items)
            .iter()
            .map(|i| i.confidence.unwrap())
            .collect()
    }

    #[test]
    fn test_exact_complete_rule_scores_high() {
        let rule = with_match(
            ExtractionItem::new("rule", "if condition then do action")
                .with_attribute("summary_cn", "条件判断规则")
                .with_attribute("condition", "满足条件")
                .with_attribute("action", "执行动作"),
            MatchType::Exact,
        );
        assert!(scores(&ConfidenceScorer::default(), &[rule])[0] >= 0.8);
    }

    #[test]
    fn test_unmatched_scores_low() {
        let item = with_match(ExtractionItem::new("entity", "x"), MatchType::Unmatched);
        assert!(scores(&ConfidenceScorer::default(), &[item])[0] < 0.4);
    }

    #[test]
    fn test_bounds() {
        let items = vec![
            with_match(ExtractionItem::new("entity", "a".repeat(500)), MatchType::Exact),
            with_match(ExtractionItem::new("entity", ""), MatchType::Unmatched),
            with_match(ExtractionItem::new("unknown_type", "test"), MatchType::Fuzzy),
        ];
        for score in scores(&ConfidenceScorer::default(), &items) {
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_completeness_rule_and_event() {
        let scorer = ConfidenceScorer::default();
        let complete_rule = with_match(
            ExtractionItem::new("rule", "if x then y")
                .with_attribute("condition", "x > 0")
                .with_attribute("action", "执行y"),
            MatchType::Exact,
        );
        let bare_rule = with_match(ExtractionItem::new("rule", "if x then y"), MatchType::Exact);
        let s = scores(&scorer, &[complete_rule, bare_rule]);
        assert!(s[0] > s[1]);

        let complete_event = with_match(
            ExtractionItem::new("event", "OnClick event fires")
                .with_attribute("event_type", "click")
                .with_attribute("direction", "publish"),
            MatchType::Exact,
        );
        let bare_event = with_match(ExtractionItem::new("event", "OnClick event fires"), MatchType::Exact);
        let s = scores(&scorer, &[complete_event, bare_event]);
        assert!(s[0] > s[1]);
    }

    #[test]
    fn test_foreign_attributes_penalized() {
        let correct = with_match(
            ExtractionItem::new("entity", "class Foo")
                .with_attribute("entity_name", "Foo")
                .with_attribute("entity_kind", "class"),
            MatchType::Exact,
        );
        let wrong = with_match(
            ExtractionItem::new("entity", "class Foo")
                .with_attribute("condition", "x > 0")
                .with_attribute("action", "do something"),
            MatchType::Exact,
        );
        let breakdown = ConfidenceScorer::breakdown(&wrong);
        assert!((breakdown.type_consistency - 0.2).abs() < 1e-9);

        let s = scores(&ConfidenceScorer::default(), &[correct, wrong]);
        assert!(s[0] > s[1]);
    }

    #[test]
    fn test_custom_weights() {
        let scorer = ConfidenceScorer::new(ScoreWeights {
            match_quality: 1.0,
            attr_completeness: 0.0,
            text_specificity: 0.0,
            type_consistency: 0.0,
        });
        let items = vec![
            with_match(ExtractionItem::new("entity", "test"), MatchType::Exact),
            with_match(ExtractionItem::new("entity", "test"), MatchType::Fuzzy),
        ];
        assert_eq!(scores(&scorer, &items), vec![1.0, 0.6]);
    }

    #[test]
    fn test_text_specificity_sweet_spot() {
        let scorer = ConfidenceScorer::default();
        let items = vec![
            with_match(ExtractionItem::new("entity", "a".repeat(50)), MatchType::Exact),
            with_match(ExtractionItem::new("entity", "ab"), MatchType::Exact),
            with_match(ExtractionItem::new("entity", "a".repeat(800)), MatchType::Exact),
        ];
        let s = scores(&scorer, &items);
        assert!(s[0] > s[1]);
        assert!(s[0] > s[2]);
    }

    #[test]
    fn test_missing_location_and_unknown_type() {
        let scorer = ConfidenceScorer::default();
        let items = vec![
            ExtractionItem::new("entity", "no location info"),
            with_match(ExtractionItem::new("custom_type", "some text"), MatchType::Exact),
        ];
        let s = scores(&scorer, &items);
        assert!(s[0] >= 0.0);

        let unknown = ConfidenceScorer::breakdown(&items[1]);
        assert_eq!(unknown.attr_completeness, NEUTRAL_SCORE);
        assert_eq!(unknown.type_consistency, NEUTRAL_SCORE);
    }

    #[test]
    fn test_relation_confidence_carried_through() {
        let items = vec![
            ExtractionItem::relation("Solver", "Actor", "uses").with_confidence(0.9),
            ExtractionItem::relation("Solver", "Map", "owns"),
        ];
        let result = ConfidenceScorer::default().process(&items);
        assert_eq!(result[0].confidence, Some(0.9));
        assert_eq!(result[1].confidence, None);
        assert_eq!(result[1].effective_confidence(), 1.0);
    }

    #[test]
    fn test_preserves_fields_and_input() {
        let items = vec![ExtractionItem::new("entity", "test").with_attribute("custom", "value")];
        let snapshot = items.clone();
        let result = ConfidenceScorer::default().process(&items);

        assert_eq!(items, snapshot);
        assert!(items[0].confidence.is_none());
        assert_eq!(result[0].extra["custom"], "value");
    }
}
