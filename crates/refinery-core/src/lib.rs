pub mod config;
pub mod error;
pub mod item;
pub mod stage;

pub use config::{PipelineConfig, ScoreWeights};
pub use error::{RefineError, Result};
pub use item::{ExtractionItem, ItemKind, MatchType, Relation, SourceLocation, UNKNOWN_SOURCE_FILE};
pub use stage::Stage;
