use std::cmp::Ordering;

use tracing::debug;

use refinery_core::config::DEFAULT_OVERLAP_THRESHOLD;
use refinery_core::item::ExtractionItem;
use refinery_core::stage::Stage;

/// Collapses items whose grounded spans substantially overlap, keeping the
/// most complete representative.
pub struct OverlapDeduplicator {
    overlap_threshold: f64,
    type_aware: bool,
}

impl Default for OverlapDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_OVERLAP_THRESHOLD, true)
    }
}

impl OverlapDeduplicator {
    pub fn new(overlap_threshold: f64, type_aware: bool) -> Self {
        Self {
            overlap_threshold,
            type_aware,
        }
    }

    /// `intersection / min(len_a, len_b)`; empty or inverted spans overlap nothing.
    pub fn overlap_ratio(a: (usize, usize), b: (usize, usize)) -> f64 {
        let intersection = a.1.min(b.1).saturating_sub(a.0.max(b.0));
        let shorter = a.1.saturating_sub(a.0).min(b.1.saturating_sub(b.0));
        if shorter == 0 {
            return 0.0;
        }
        intersection as f64 / shorter as f64
    }

    fn collides(
        &self,
        a: &ExtractionItem,
        a_span: (usize, usize),
        b: &ExtractionItem,
        b_span: (usize, usize),
    ) -> bool {
        if self.type_aware && a.kind != b.kind {
            return false;
        }
        Self::overlap_ratio(a_span, b_span) >= self.overlap_threshold
    }
}

/// Best-first ordering: completeness, then text length, then confidence.
fn rank(a: &ExtractionItem, b: &ExtractionItem) -> Ordering {
    b.populated_attribute_count()
        .cmp(&a.populated_attribute_count())
        .then_with(|| b.text.chars().count().cmp(&a.text.chars().count()))
        .then_with(|| {
            b.confidence
                .unwrap_or(0.0)
                .total_cmp(&a.confidence.unwrap_or(0.0))
        })
}

impl Stage for OverlapDeduplicator {
    fn name(&self) -> &'static str {
        "overlap_dedup"
    }

    fn process(&self, items: &[ExtractionItem]) -> Vec<ExtractionItem> {
        let mut candidates: Vec<(usize, (usize, usize))> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.span().map(|span| (i, span)))
            .collect();

        // Stable sort keeps input order among exact ties.
        candidates.sort_by(|(a, _), (b, _)| rank(&items[*a], &items[*b]));

        let mut dropped = vec![false; items.len()];
        let mut kept: Vec<(usize, (usize, usize))> = Vec::with_capacity(candidates.len());

        for (idx, span) in candidates {
            let loser = kept
                .iter()
                .any(|&(k, k_span)| self.collides(&items[k], k_span, &items[idx], span));
            if loser {
                dropped[idx] = true;
            } else {
                kept.push((idx, span));
            }
        }

        let result: Vec<ExtractionItem> = items
            .iter()
            .zip(&dropped)
            .filter(|(_, dropped)| !**dropped)
            .map(|(item, _)| item.clone())
            .collect();

        debug!(
            input = items.len(),
            output = result.len(),
            removed = items.len() - result.len(),
            threshold = self.overlap_threshold,
            type_aware = self.type_aware,
            "Overlap dedup complete"
        );

        result
    }
}
