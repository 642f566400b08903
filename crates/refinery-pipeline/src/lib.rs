pub mod dedup;
pub mod grounding;
pub mod inference;
pub mod orchestrator;
pub mod resolution;
pub mod scoring;
pub mod stats;

pub use dedup::OverlapDeduplicator;
pub use grounding::SourceGrounder;
pub use inference::{Direction, InferenceRule, RelationInferrer};
pub use orchestrator::{ExtractionPipeline, PipelineOutput};
pub use resolution::EntityResolver;
pub use scoring::{ConfidenceScorer, ScoreBreakdown};
pub use stats::{ConfidenceDistribution, MatchQualitySummary, PipelineStats};
