use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use refinery_core::config::DEFAULT_SCOPE_WINDOW;
use refinery_core::item::{ExtractionItem, ItemKind, Relation};

/// Whether a rule emits one relation per ordered pair or one per unordered pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Bidirectional,
}

/// Static type-pair inference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferenceRule {
    /// rule → entity
    Governs,
    /// constraint → entity
    Validates,
    /// event → entity
    SubscribesTo,
    /// state → entity
    Transitions,
    /// entity ↔ entity
    RelatesTo,
}

impl InferenceRule {
    pub const ALL: [InferenceRule; 5] = [
        InferenceRule::Governs,
        InferenceRule::Validates,
        InferenceRule::SubscribesTo,
        InferenceRule::Transitions,
        InferenceRule::RelatesTo,
    ];

    /// Directional lookup: `(a, b)` never matches a rule declared for `(b, a)`.
    pub fn lookup(from: &ItemKind, to: &ItemKind) -> Option<Self> {
        match (from, to) {
            (ItemKind::Rule, ItemKind::Entity) => Some(InferenceRule::Governs),
            (ItemKind::Constraint, ItemKind::Entity) => Some(InferenceRule::Validates),
            (ItemKind::Event, ItemKind::Entity) => Some(InferenceRule::SubscribesTo),
            (ItemKind::State, ItemKind::Entity) => Some(InferenceRule::Transitions),
            (ItemKind::Entity, ItemKind::Entity) => Some(InferenceRule::RelatesTo),
            _ => None,
        }
    }

    pub fn relation_type(self) -> &'static str {
        match self {
            InferenceRule::Governs => "governs",
            InferenceRule::Validates => "validates",
            InferenceRule::SubscribesTo => "subscribes_to",
            InferenceRule::Transitions => "transitions",
            InferenceRule::RelatesTo => "relates_to",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            InferenceRule::RelatesTo => Direction::Bidirectional,
            _ => Direction::Forward,
        }
    }
}

/// Synthesizes relations between items that share a file and a line window.
pub struct RelationInferrer {
    scope_window: usize,
}

impl Default for RelationInferrer {
    fn default() -> Self {
        Self::new(DEFAULT_SCOPE_WINDOW)
    }
}

impl RelationInferrer {
    /// `scope_window` must be at least 1; configuration validation enforces it.
    pub fn new(scope_window: usize) -> Self {
        Self {
            scope_window: scope_window.max(1),
        }
    }

    /// Pass `items` through untouched alongside the relations inferred from them.
    pub fn process(&self, items: Vec<ExtractionItem>) -> (Vec<ExtractionItem>, Vec<Relation>) {
        let inferred = self.infer(&items);
        (items, inferred)
    }

    pub fn infer(&self, items: &[ExtractionItem]) -> Vec<Relation> {
        let scopes = self.group_by_scope(items);

        let inferred: Vec<Relation> = scopes
            .values()
            .flat_map(|scope| infer_in_scope(scope))
            .collect();

        debug!(
            scopes = scopes.len(),
            inferred = inferred.len(),
            window = self.scope_window,
            "Relation inference complete"
        );

        inferred
    }

    /// Items keyed by `(source_file, window start line)`; unlocated items are skipped.
    fn group_by_scope<'a>(
        &self,
        items: &'a [ExtractionItem],
    ) -> BTreeMap<(&'a str, usize), Vec<&'a ExtractionItem>> {
        let mut scopes: BTreeMap<(&str, usize), Vec<&ExtractionItem>> = BTreeMap::new();
        for item in items {
            let Some(line) = item.line() else {
                continue;
            };
            let window_start = (line / self.scope_window) * self.scope_window;
            scopes
                .entry((item.source_file_or_default(), window_start))
                .or_default()
                .push(item);
        }
        scopes
    }
}

fn infer_in_scope(items: &[&ExtractionItem]) -> Vec<Relation> {
    let mut seen: HashSet<(&str, &str, &'static str)> = HashSet::new();
    let mut relations = Vec::new();

    for (i, a) in items.iter().enumerate() {
        if a.kind.is_blank() || a.text.is_empty() {
            continue;
        }
        for (j, b) in items.iter().enumerate() {
            if i == j || b.kind.is_blank() || b.text.is_empty() {
                continue;
            }
            let Some(rule) = InferenceRule::lookup(&a.kind, &b.kind) else {
                continue;
            };
            if rule.direction() == Direction::Bidirectional && i > j {
                continue;
            }
            if seen.insert((a.text.as_str(), b.text.as_str(), rule.relation_type())) {
                relations.push(Relation::inferred(&a.text, &b.text, rule.relation_type()));
            }
        }
    }

    relations
}
