use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source file reported for items that arrive without one.
pub const UNKNOWN_SOURCE_FILE: &str = "unknown";

/// Confidence assumed for an upstream relation that carries none.
const ASSERTED_RELATION_CONFIDENCE: f64 = 1.0;

/// Confidence attached to every relation synthesized by inference.
pub const INFERRED_RELATION_CONFIDENCE: f64 = 0.6;

// ---------------------------------------------------------------------------
// Item kinds
// ---------------------------------------------------------------------------

/// The `type` of an extraction item.
///
/// The set is open: anything the upstream extractor emits that is not one of
/// the known kinds is carried as `Other` and round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemKind {
    Entity,
    Rule,
    Constraint,
    Event,
    State,
    Relation,
    Other(String),
}

impl ItemKind {
    pub fn as_str(&self) -> &str {
        match self {
            ItemKind::Entity => "entity",
            ItemKind::Rule => "rule",
            ItemKind::Constraint => "constraint",
            ItemKind::Event => "event",
            ItemKind::State => "state",
            ItemKind::Relation => "relation",
            ItemKind::Other(s) => s,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, ItemKind::Relation)
    }

    /// True when the item carried no usable `type` at all.
    pub fn is_blank(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl Default for ItemKind {
    fn default() -> Self {
        ItemKind::Other(String::new())
    }
}

impl From<String> for ItemKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "entity" => ItemKind::Entity,
            "rule" => ItemKind::Rule,
            "constraint" => ItemKind::Constraint,
            "event" => ItemKind::Event,
            "state" => ItemKind::State,
            "relation" => ItemKind::Relation,
            _ => ItemKind::Other(s),
        }
    }
}

impl From<&str> for ItemKind {
    fn from(s: &str) -> Self {
        ItemKind::from(s.to_string())
    }
}

impl From<ItemKind> for String {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source location
// ---------------------------------------------------------------------------

/// Grounding tier achieved when locating an item's text in its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Normalized,
    Fuzzy,
    #[serde(rename = "none")]
    Unmatched,
}

impl MatchType {
    /// Location confidence (and match-quality sub-score) of the tier.
    pub fn confidence(self) -> f64 {
        match self {
            MatchType::Exact => 1.0,
            MatchType::Normalized => 0.85,
            MatchType::Fuzzy => 0.6,
            MatchType::Unmatched => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Normalized => "normalized",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Unmatched => "none",
        }
    }
}

/// Positional metadata attached by grounding.
///
/// Every field is optional: upstream records may arrive with a partial
/// location (only a `line`, or an interval with null bounds) and those must
/// survive the pipeline untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_interval: Option<[Option<usize>; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl SourceLocation {
    /// A successful match covering `[char_start, char_end)` on 1-indexed `line`.
    pub fn located(match_type: MatchType, char_start: usize, char_end: usize, line: usize) -> Self {
        Self {
            char_start: Some(char_start),
            char_end: Some(char_end),
            char_interval: Some([Some(char_start), Some(char_end)]),
            line: Some(line),
            match_type: Some(match_type),
            confidence: Some(match_type.confidence()),
        }
    }

    /// The text could not be found anywhere in the document.
    pub fn unmatched() -> Self {
        Self {
            match_type: Some(MatchType::Unmatched),
            ..Self::default()
        }
    }

    /// A location carrying only a line number.
    pub fn at_line(line: usize) -> Self {
        Self {
            line: Some(line),
            ..Self::default()
        }
    }

    /// A location carrying only a character interval.
    pub fn with_interval(char_start: usize, char_end: usize) -> Self {
        Self {
            char_interval: Some([Some(char_start), Some(char_end)]),
            ..Self::default()
        }
    }

    /// The usable `(start, end)` span, if both bounds are known and non-empty.
    ///
    /// `char_interval` wins over the `char_start`/`char_end` pair.
    pub fn span(&self) -> Option<(usize, usize)> {
        let (start, end) = match self.char_interval {
            Some([start, end]) => (start?, end?),
            None => (self.char_start?, self.char_end?),
        };
        (start < end).then_some((start, end))
    }
}

// ---------------------------------------------------------------------------
// Extraction item
// ---------------------------------------------------------------------------

/// Fields every item may carry that are not counted as descriptive attributes.
const CORE_FIELDS: [&str; 5] = ["type", "text", "source_file", "source_location", "confidence"];

/// A single structured claim pulled from a source document.
///
/// Known attributes are typed; anything else the extractor emitted is kept in
/// `extra` so that no stage loses information it does not understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionItem {
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_cn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inferred: Option<bool>,
    /// Texts of near-duplicate entities folded into this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ExtractionItem {
    pub fn new(kind: impl Into<ItemKind>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// An upstream-asserted relation between two item texts.
    pub fn relation(
        from: impl Into<String>,
        to: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            kind: ItemKind::Relation,
            from: Some(from.into()),
            to: Some(to.into()),
            relation_type: Some(relation_type.into()),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.source_location = Some(location);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    /// Set a named attribute, routing known names to their typed field.
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.typed_attribute_mut(name) {
            Some(slot) => *slot = Some(value),
            None => {
                self.extra.insert(name.to_string(), Value::String(value));
            }
        }
        self
    }

    fn typed_attribute_mut(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "summary_cn" => Some(&mut self.summary_cn),
            "condition" => Some(&mut self.condition),
            "action" => Some(&mut self.action),
            "event_type" => Some(&mut self.event_type),
            "direction" => Some(&mut self.direction),
            "entity_name" => Some(&mut self.entity_name),
            "entity_kind" => Some(&mut self.entity_kind),
            "from" => Some(&mut self.from),
            "to" => Some(&mut self.to),
            "relation_type" => Some(&mut self.relation_type),
            _ => None,
        }
    }

    fn typed_attributes(&self) -> [(&'static str, Option<&str>); 10] {
        [
            ("summary_cn", self.summary_cn.as_deref()),
            ("condition", self.condition.as_deref()),
            ("action", self.action.as_deref()),
            ("event_type", self.event_type.as_deref()),
            ("direction", self.direction.as_deref()),
            ("entity_name", self.entity_name.as_deref()),
            ("entity_kind", self.entity_kind.as_deref()),
            ("from", self.from.as_deref()),
            ("to", self.to.as_deref()),
            ("relation_type", self.relation_type.as_deref()),
        ]
    }

    /// Whether the named attribute is present with a non-empty value.
    pub fn has_attribute(&self, name: &str) -> bool {
        if let Some((_, value)) = self.typed_attributes().into_iter().find(|(n, _)| *n == name) {
            return value.is_some_and(|v| !v.is_empty());
        }
        match name {
            "aliases" => !self.aliases.is_empty(),
            "inferred" => self.inferred.is_some(),
            _ => self.extra.get(name).is_some_and(is_populated),
        }
    }

    /// Number of populated descriptive attributes, i.e. everything except
    /// `type`, `text`, `source_file`, `source_location` and `confidence`.
    pub fn populated_attribute_count(&self) -> usize {
        let typed = self
            .typed_attributes()
            .iter()
            .filter(|(_, value)| value.is_some_and(|v| !v.is_empty()))
            .count();
        let extra = self
            .extra
            .iter()
            .filter(|(key, value)| !CORE_FIELDS.contains(&key.as_str()) && is_populated(value))
            .count();
        typed + extra + usize::from(!self.aliases.is_empty()) + usize::from(self.inferred.is_some())
    }

    pub fn source_file_or_default(&self) -> &str {
        self.source_file.as_deref().unwrap_or(UNKNOWN_SOURCE_FILE)
    }

    pub fn line(&self) -> Option<usize> {
        self.source_location.as_ref().and_then(|loc| loc.line)
    }

    pub fn span(&self) -> Option<(usize, usize)> {
        self.source_location.as_ref().and_then(SourceLocation::span)
    }

    pub fn match_type(&self) -> Option<MatchType> {
        self.source_location.as_ref().and_then(|loc| loc.match_type)
    }

    /// Confidence used for threshold filtering.
    ///
    /// Unscored relations count as asserted; unscored claims count as zero.
    pub fn effective_confidence(&self) -> f64 {
        match self.confidence {
            Some(c) => c,
            None if self.kind.is_relation() => ASSERTED_RELATION_CONFIDENCE,
            None => 0.0,
        }
    }

    /// View a `relation` item as a relation record.
    pub fn as_relation(&self) -> Option<Relation> {
        if !self.kind.is_relation() {
            return None;
        }
        Some(Relation {
            kind: RelationTag::Relation,
            from: self.from.clone()?,
            to: self.to.clone()?,
            relation_type: self.relation_type.clone().unwrap_or_default(),
            confidence: self.effective_confidence(),
            inferred: self.inferred.unwrap_or(false),
        })
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Relation record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationTag {
    #[default]
    Relation,
}

/// A directed cross-reference between two item texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "type", default)]
    pub kind: RelationTag,
    pub from: String,
    pub to: String,
    pub relation_type: String,
    #[serde(default = "default_relation_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub inferred: bool,
}

fn default_relation_confidence() -> f64 {
    ASSERTED_RELATION_CONFIDENCE
}

impl Relation {
    pub fn inferred(
        from: impl Into<String>,
        to: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationTag::Relation,
            from: from.into(),
            to: to.into(),
            relation_type: relation_type.into(),
            confidence: INFERRED_RELATION_CONFIDENCE,
            inferred: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_kind_parsing() {
        assert_eq!(ItemKind::from("entity"), ItemKind::Entity);
        assert_eq!(ItemKind::from("relation"), ItemKind::Relation);
        assert_eq!(
            ItemKind::from("custom_type"),
            ItemKind::Other("custom_type".to_string())
        );
        assert!(ItemKind::default().is_blank());
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let raw = json!({
            "type": "constraint",
            "text": "NativeArray<ActorData>",
            "check_type": "type_constraint",
            "custom_field": "preserved"
        });
        let item: ExtractionItem = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(item.kind, ItemKind::Constraint);
        assert_eq!(item.extra["custom_field"], "preserved");
        assert!(item.has_attribute("check_type"));
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);
    }

    #[test]
    fn test_missing_type_and_text() {
        let item: ExtractionItem = serde_json::from_value(json!({"summary_cn": "x"})).unwrap();
        assert!(item.kind.is_blank());
        assert!(item.text.is_empty());
    }

    #[test]
    fn test_null_interval_has_no_span() {
        let item: ExtractionItem = serde_json::from_value(json!({
            "type": "entity",
            "text": "null interval",
            "source_location": {"char_interval": [null, null]}
        }))
        .unwrap();
        assert!(item.source_location.is_some());
        assert_eq!(item.span(), None);
    }

    #[test]
    fn test_span_prefers_interval() {
        let loc = SourceLocation {
            char_start: Some(1),
            char_end: Some(2),
            char_interval: Some([Some(4), Some(15)]),
            ..SourceLocation::default()
        };
        assert_eq!(loc.span(), Some((4, 15)));
        assert_eq!(SourceLocation::with_interval(5, 5).span(), None);
    }

    #[test]
    fn test_unmatched_location_serializes_null_confidence() {
        let value = serde_json::to_value(SourceLocation::unmatched()).unwrap();
        assert_eq!(value, json!({"match_type": "none", "confidence": null}));
    }

    #[test]
    fn test_populated_attribute_count() {
        let item = ExtractionItem::new("entity", "longer")
            .with_attribute("summary_cn", "summary")
            .with_attribute("extra", "val")
            .with_attribute("empty", "")
            .with_confidence(0.9)
            .with_source_file("a.cs");
        assert_eq!(item.populated_attribute_count(), 2);
        assert_eq!(ExtractionItem::new("entity", "short").populated_attribute_count(), 0);
    }

    #[test]
    fn test_effective_confidence() {
        assert_eq!(ExtractionItem::new("entity", "x").effective_confidence(), 0.0);
        assert_eq!(ExtractionItem::relation("A", "B", "uses").effective_confidence(), 1.0);
        assert_eq!(
            ExtractionItem::new("rule", "x").with_confidence(0.4).effective_confidence(),
            0.4
        );
    }

    #[test]
    fn test_as_relation() {
        let rel = ExtractionItem::relation("A", "B", "uses")
            .with_confidence(0.8)
            .as_relation()
            .unwrap();
        assert_eq!(rel.from, "A");
        assert_eq!(rel.to, "B");
        assert_eq!(rel.relation_type, "uses");
        assert!(!rel.inferred);
        assert!(ExtractionItem::new("entity", "A").as_relation().is_none());
    }

    #[test]
    fn test_inferred_relation_shape() {
        let value = serde_json::to_value(Relation::inferred("A", "B", "relates_to")).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "relation",
                "from": "A",
                "to": "B",
                "relation_type": "relates_to",
                "confidence": 0.6,
                "inferred": true
            })
        );
    }

    #[test]
    fn test_relation_without_type_or_confidence() {
        let rel: Relation =
            serde_json::from_value(json!({"from": "X", "to": "Y", "relation_type": "governs"}))
                .unwrap();
        assert_eq!(rel.confidence, 1.0);
        assert!(!rel.inferred);
    }
}
