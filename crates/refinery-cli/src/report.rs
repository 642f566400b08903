use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use refinery_pipeline::PipelineOutput;

/// Envelope written by the binary around one pipeline result.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub result: PipelineOutput,
}

impl RunReport {
    pub fn new(source: String, result: PipelineOutput) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            source,
            result,
        }
    }
}
