use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use refinery_core::config::DEFAULT_KG_CONFIDENCE_THRESHOLD;
use refinery_core::item::{ExtractionItem, Relation};

/// Longest identifying text kept in a graph entity name.
const MAX_NAME_CHARS: usize = 80;
const FALLBACK_NAME: &str = "unnamed";
const FALLBACK_TYPE: &str = "unknown";

// ---------------------------------------------------------------------------
// Graph records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KgEntity {
    pub name: String,
    pub entity_type: String,
    pub observations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KgRelation {
    pub from: String,
    pub to: String,
    pub relation_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KgGraph {
    pub entities: Vec<KgEntity>,
    pub relations: Vec<KgRelation>,
}

impl KgGraph {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Injector
// ---------------------------------------------------------------------------

/// Projects refined items into a generic entity/relation graph, dropping
/// anything below the confidence threshold.
pub struct KgInjector {
    confidence_threshold: f64,
}

impl Default for KgInjector {
    fn default() -> Self {
        Self::new(DEFAULT_KG_CONFIDENCE_THRESHOLD)
    }
}

impl KgInjector {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn convert(&self, items: &[ExtractionItem], inferred: &[Relation]) -> KgGraph {
        let mut used_names: HashSet<String> = HashSet::new();
        let mut entities = Vec::new();
        let mut asserted = Vec::new();

        for item in items {
            if item.kind.is_relation() {
                match item.as_relation() {
                    Some(rel) => asserted.push(rel),
                    None => trace!(text = %item.text, "Skipping relation item without endpoints"),
                }
                continue;
            }
            if item.effective_confidence() < self.confidence_threshold {
                continue;
            }
            let name = unique_name(&mut used_names, base_name(item));
            entities.push(KgEntity {
                name,
                entity_type: type_label(item).to_string(),
                observations: observations(item),
            });
        }

        let mut seen: HashSet<KgRelation> = HashSet::new();
        let relations: Vec<KgRelation> = asserted
            .iter()
            .chain(inferred)
            .filter(|rel| rel.confidence >= self.confidence_threshold)
            .map(|rel| KgRelation {
                from: rel.from.clone(),
                to: rel.to.clone(),
                relation_type: rel.relation_type.clone(),
            })
            .filter(|rel| seen.insert(rel.clone()))
            .collect();

        debug!(
            entities = entities.len(),
            relations = relations.len(),
            threshold = self.confidence_threshold,
            "Knowledge-graph projection complete"
        );

        KgGraph {
            entities,
            relations,
        }
    }
}

fn type_label(item: &ExtractionItem) -> &str {
    if item.kind.is_blank() {
        FALLBACK_TYPE
    } else {
        item.kind.as_str()
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn summary(item: &ExtractionItem) -> Option<String> {
    item.summary_cn
        .as_deref()
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

fn base_name(item: &ExtractionItem) -> String {
    let ident = summary(item)
        .or_else(|| Some(collapse_whitespace(&item.text)).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let ident: String = ident.chars().take(MAX_NAME_CHARS).collect();
    format!("{}:{}", type_label(item), ident)
}

fn unique_name(used: &mut HashSet<String>, base: String) -> String {
    let mut candidate = base.clone();
    let mut suffix = 2;
    while used.contains(&candidate) {
        candidate = format!("{base}#{suffix}");
        suffix += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn observations(item: &ExtractionItem) -> Vec<String> {
    let mut obs = Vec::new();
    let summary = summary(item);

    if let Some(summary) = &summary {
        obs.push(summary.clone());
        if !item.text.is_empty() && item.text != *summary {
            obs.push(format!("Text: {}", item.text));
        }
    }
    if let Some(line) = item.line() {
        obs.push(format!("Source: {}:{}", item.source_file_or_default(), line));
    }
    obs.push(format!("Confidence: {:.2}", item.effective_confidence()));

    obs
}
