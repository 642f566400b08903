use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use petgraph::unionfind::UnionFind;
use tracing::debug;

use refinery_core::config::DEFAULT_RESOLUTION_THRESHOLD;
use refinery_core::item::{ExtractionItem, ItemKind};
use refinery_core::stage::Stage;

/// Weight applied to the length ratio when one name contains the other.
const CONTAINMENT_WEIGHT: f64 = 0.9;
/// Scale for edit-distance similarity of unrelated names; keeps them below 0.5.
const BASELINE_WEIGHT: f64 = 0.5;

/// Case- and whitespace-insensitive form of an entity name.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Similarity in `[0, 1]` between two entity names.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let (a_len, b_len) = (a.chars().count(), b.chars().count());
    let (shorter, longer, short_len, long_len) = if a_len <= b_len {
        (&a, &b, a_len, b_len)
    } else {
        (&b, &a, b_len, a_len)
    };
    if longer.contains(shorter.as_str()) {
        return CONTAINMENT_WEIGHT * short_len as f64 / long_len as f64;
    }

    BASELINE_WEIGHT * strsim::normalized_levenshtein(&a, &b)
}

/// Canonical preference: identifier-style (no inner whitespace), then longest
/// text, then highest confidence. Earlier positions win remaining ties.
fn prefer(a: &ExtractionItem, b: &ExtractionItem) -> Ordering {
    let spaced = |item: &ExtractionItem| item.text.trim().contains(char::is_whitespace);
    spaced(a)
        .cmp(&spaced(b))
        .then_with(|| b.text.chars().count().cmp(&a.text.chars().count()))
        .then_with(|| {
            b.confidence
                .unwrap_or(0.0)
                .total_cmp(&a.confidence.unwrap_or(0.0))
        })
}

/// Merges near-duplicate entities and rewrites relation references to the
/// surviving canonical text.
pub struct EntityResolver {
    threshold: f64,
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION_THRESHOLD)
    }
}

impl EntityResolver {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Connected components (as item indices, ascending) of the similarity
    /// graph over entity items. Singletons are omitted.
    fn clusters(&self, items: &[ExtractionItem]) -> Vec<Vec<usize>> {
        let entities: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.kind == ItemKind::Entity && !item.text.is_empty())
            .map(|(i, _)| i)
            .collect();

        let mut sets: UnionFind<usize> = UnionFind::new(entities.len());
        for a in 0..entities.len() {
            for b in (a + 1)..entities.len() {
                let score = similarity(&items[entities[a]].text, &items[entities[b]].text);
                if score >= self.threshold {
                    sets.union(a, b);
                }
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (local, &idx) in entities.iter().enumerate() {
            components.entry(sets.find_mut(local)).or_default().push(idx);
        }
        components.into_values().filter(|c| c.len() > 1).collect()
    }
}

impl Stage for EntityResolver {
    fn name(&self) -> &'static str {
        "entity_resolution"
    }

    fn process(&self, items: &[ExtractionItem]) -> Vec<ExtractionItem> {
        let clusters = self.clusters(items);
        if clusters.is_empty() {
            return items.to_vec();
        }

        // canonical item index -> absorbed texts
        let mut absorbed: HashMap<usize, Vec<String>> = HashMap::new();
        let mut merged_away = vec![false; items.len()];
        let mut renames: HashMap<&str, &str> = HashMap::new();

        for cluster in &clusters {
            let canonical = cluster
                .iter()
                .copied()
                .min_by(|&a, &b| prefer(&items[a], &items[b]).then(a.cmp(&b)))
                .unwrap_or(cluster[0]);
            let canonical_text = items[canonical].text.as_str();

            let mut aliases = Vec::new();
            for &member in cluster.iter().filter(|&&m| m != canonical) {
                merged_away[member] = true;
                let text = items[member].text.as_str();
                if text != canonical_text {
                    renames.insert(text, canonical_text);
                    if !aliases.iter().any(|a: &String| a == text) {
                        aliases.push(text.to_string());
                    }
                }
            }
            absorbed.insert(canonical, aliases);
        }

        let mut rewritten = 0usize;
        let result: Vec<ExtractionItem> = items
            .iter()
            .enumerate()
            .filter(|(i, _)| !merged_away[*i])
            .map(|(i, item)| {
                let mut out = item.clone();
                if let Some(aliases) = absorbed.get(&i) {
                    for alias in aliases {
                        if !out.aliases.contains(alias) {
                            out.aliases.push(alias.clone());
                        }
                    }
                } else if item.kind.is_relation() {
                    for end in [&mut out.from, &mut out.to] {
                        if let Some(target) = end.as_deref().and_then(|t| renames.get(t)) {
                            *end = Some(target.to_string());
                            rewritten += 1;
                        }
                    }
                }
                out
            })
            .collect();

        debug!(
            clusters = clusters.len(),
            merged = items.len() - result.len(),
            references_rewritten = rewritten,
            threshold = self.threshold,
            "Entity resolution complete"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_texts(items: &[ExtractionItem]) -> Vec<&str> {
        items
            .iter()
            .filter(|i| i.kind == ItemKind::Entity)
            .map(|i| i.text.as_str())
            .collect()
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("MGMultiGateSolver", "mgmultigatesolver"), 1.0);
        assert_eq!(similarity("my solver class", "MySolverClass"), 1.0);
        assert!((similarity("Solver", "MGSolver") - 0.675).abs() < 1e-9);
        assert!((similarity("Map", "MapManager") - 0.27).abs() < 1e-9);
        assert!(similarity("MGMultiGateSolver", "Actor") < 0.5);
        assert_eq!(similarity("", "Actor"), 0.0);
    }

    #[test]
    fn test_identical_entities_merged() {
        let items = vec![
            ExtractionItem::new("entity", "MGMultiGateSolver").with_attribute("summary_cn", "解算器1"),
            ExtractionItem::new("entity", "MGMultiGateSolver").with_attribute("summary_cn", "解算器2"),
        ];
        let result = EntityResolver::new(0.7).process(&items);
        assert_eq!(entity_texts(&result), vec!["MGMultiGateSolver"]);
        assert!(result[0].aliases.is_empty());
        assert_eq!(result[0].summary_cn.as_deref(), Some("解算器1"));
    }

    #[test]
    fn test_different_entities_kept() {
        let items = vec![
            ExtractionItem::new("entity", "MGMultiGateSolver"),
            ExtractionItem::new("entity", "Actor"),
        ];
        assert_eq!(EntityResolver::new(0.7).process(&items), items);
    }

    #[test]
    fn test_containment_respects_threshold() {
        let items = vec![
            ExtractionItem::new("entity", "Solver"),
            ExtractionItem::new("entity", "MGSolver"),
        ];
        assert_eq!(entity_texts(&EntityResolver::new(0.3).process(&items)), vec!["MGSolver"]);

        let items = vec![
            ExtractionItem::new("entity", "Map"),
            ExtractionItem::new("entity", "MapManager"),
        ];
        assert_eq!(EntityResolver::new(0.7).process(&items).len(), 2);
    }

    #[test]
    fn test_canonical_prefers_identifier_style() {
        let items = vec![
            ExtractionItem::new("entity", "my solver class"),
            ExtractionItem::new("entity", "MySolverClass"),
        ];
        let result = EntityResolver::new(0.5).process(&items);
        assert_eq!(entity_texts(&result), vec!["MySolverClass"]);
        assert_eq!(result[0].aliases, vec!["my solver class"]);
    }

    #[test]
    fn test_relation_references_rewritten() {
        let items = vec![
            ExtractionItem::new("entity", "Solver"),
            ExtractionItem::new("entity", "TheSolver"),
            ExtractionItem::relation("Solver", "Actor", "uses"),
        ];
        let result = EntityResolver::new(0.5).process(&items);

        let entities = entity_texts(&result);
        assert_eq!(entities, vec!["TheSolver"]);
        let relation = result.iter().find(|i| i.kind.is_relation()).unwrap();
        assert_eq!(relation.from.as_deref(), Some("TheSolver"));
        assert_eq!(relation.to.as_deref(), Some("Actor"));
    }

    #[test]
    fn test_transitive_cluster() {
        // "Solver" ~ "GateSolver" ~ "MultiGateSolver", but "Solver" and
        // "MultiGateSolver" alone fall below the threshold.
        let items = vec![
            ExtractionItem::new("entity", "Solver"),
            ExtractionItem::new("entity", "GateSolver"),
            ExtractionItem::new("entity", "MultiGateSolver"),
        ];
        assert!(similarity("Solver", "MultiGateSolver") < 0.5);
        let result = EntityResolver::new(0.5).process(&items);
        assert_eq!(entity_texts(&result), vec!["MultiGateSolver"]);
        assert_eq!(result[0].aliases, vec!["Solver", "GateSolver"]);
    }

    #[test]
    fn test_separate_clusters_stay_apart() {
        let items = vec![
            ExtractionItem::new("entity", "Solver"),
            ExtractionItem::new("entity", "ActorManager"),
            ExtractionItem::new("entity", "solver"),
            ExtractionItem::new("entity", "actor manager"),
        ];
        let result = EntityResolver::default().process(&items);
        assert_eq!(entity_texts(&result), vec!["Solver", "ActorManager"]);
        assert_eq!(result[0].aliases, vec!["solver"]);
        assert_eq!(result[1].aliases, vec!["actor manager"]);
    }

    #[test]
    fn test_confidence_breaks_canonical_tie() {
        let items = vec![
            ExtractionItem::new("entity", "Solver").with_confidence(0.4),
            ExtractionItem::new("entity", "solver").with_confidence(0.9),
        ];
        let result = EntityResolver::default().process(&items);
        assert_eq!(entity_texts(&result), vec!["solver"]);
        assert_eq!(result[0].aliases, vec!["Solver"]);
    }

    #[test]
    fn test_non_entities_untouched() {
        let items = vec![
            ExtractionItem::new("entity", "Foo"),
            ExtractionItem::new("rule", "some rule"),
            ExtractionItem::new("constraint", "some constraint"),
        ];
        assert_eq!(EntityResolver::default().process(&items), items);
    }

    #[test]
    fn test_trivial_inputs() {
        let resolver = EntityResolver::default();
        assert!(resolver.process(&[]).is_empty());

        let single = vec![ExtractionItem::new("entity", "OnlyOne")];
        assert_eq!(resolver.process(&single), single);

        let no_entities = vec![
            ExtractionItem::new("rule", "rule1"),
            ExtractionItem::new("constraint", "constraint1"),
        ];
        assert_eq!(resolver.process(&no_entities), no_entities);
    }

    #[test]
    fn test_input_not_mutated() {
        let items = vec![
            ExtractionItem::new("entity", "Solver"),
            ExtractionItem::new("entity", "TheSolver"),
            ExtractionItem::relation("Solver", "Actor", "uses"),
        ];
        let snapshot = items.clone();
        EntityResolver::new(0.5).process(&items);
        assert_eq!(items, snapshot);
    }
}
