use crate::item::ExtractionItem;

/// A list-to-list refinement step.
///
/// Implementations never modify `items`; they return a freshly built
/// collection (possibly shorter, when the stage drops or merges items).
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn process(&self, items: &[ExtractionItem]) -> Vec<ExtractionItem>;
}
