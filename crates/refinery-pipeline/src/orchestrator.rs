use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use refinery_core::config::PipelineConfig;
use refinery_core::error::Result;
use refinery_core::item::{ExtractionItem, Relation};
use refinery_core::stage::Stage;
use refinery_graph::{KgGraph, KgInjector};

use crate::dedup::OverlapDeduplicator;
use crate::grounding::SourceGrounder;
use crate::inference::RelationInferrer;
use crate::resolution::EntityResolver;
use crate::scoring::ConfidenceScorer;
use crate::stats::PipelineStats;

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub extractions: Vec<ExtractionItem>,
    pub inferred_relations: Vec<Relation>,
    pub stats: PipelineStats,
    /// Present only when knowledge-graph projection is enabled.
    pub kg_format: Option<KgGraph>,
}

/// Sequences grounding, dedup, scoring, entity resolution, relation inference
/// and graph projection over one document's extraction items.
pub struct ExtractionPipeline {
    config: PipelineConfig,
    source_file: Option<String>,
    grounder: SourceGrounder,
    dedup: OverlapDeduplicator,
    scorer: ConfidenceScorer,
    resolver: EntityResolver,
    inferrer: RelationInferrer,
    injector: KgInjector,
}

impl ExtractionPipeline {
    pub fn new(
        source_text: impl Into<String>,
        source_file: Option<String>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(source_text.into(), source_file, config))
    }

    /// Pipeline over `source_text` with the default configuration.
    pub fn with_defaults(source_text: impl Into<String>) -> Self {
        Self::from_validated(source_text.into(), None, PipelineConfig::default())
    }

    fn from_validated(
        source_text: String,
        source_file: Option<String>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            grounder: SourceGrounder::new(source_text),
            dedup: OverlapDeduplicator::new(config.overlap_threshold, config.type_aware_dedup),
            scorer: ConfidenceScorer::new(config.confidence_weights),
            resolver: EntityResolver::new(config.resolution_threshold),
            inferrer: RelationInferrer::new(config.scope_window),
            injector: KgInjector::new(config.kg_confidence_threshold),
            source_file,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[instrument(skip_all, fields(items = items.len(), source_file = ?self.source_file))]
    pub fn process(&self, items: &[ExtractionItem]) -> PipelineOutput {
        let stamped: Vec<ExtractionItem> = match &self.source_file {
            Some(file) => items
                .iter()
                .map(|item| item.clone().with_source_file(file.clone()))
                .collect(),
            None => items.to_vec(),
        };

        let grounded = run_stage(self.config.source_grounding, &self.grounder, stamped);

        let before_dedup = grounded.len();
        let deduped = run_stage(self.config.overlap_dedup, &self.dedup, grounded);
        let dedup_removed = before_dedup - deduped.len();

        let scored = run_stage(self.config.confidence_scoring, &self.scorer, deduped);
        let extractions = run_stage(self.config.entity_resolution, &self.resolver, scored);

        let (extractions, inferred_relations) = if self.config.relation_inference {
            self.inferrer.process(extractions)
        } else {
            debug!(stage = "relation_inference", "Stage disabled, passing through");
            (extractions, Vec::new())
        };

        let kg_format = self
            .config
            .kg_injection
            .then(|| self.injector.convert(&extractions, &inferred_relations));

        let stats = PipelineStats::collect(&extractions, dedup_removed, inferred_relations.len());

        info!(
            input = items.len(),
            extractions = stats.total_extractions,
            dedup_removed = stats.dedup_removed,
            inferred_relations = stats.inferred_relations,
            avg_confidence = stats.avg_confidence,
            kg_entities = kg_format.as_ref().map(|kg| kg.entities.len()),
            "Pipeline run complete"
        );

        PipelineOutput {
            extractions,
            inferred_relations,
            stats,
            kg_format,
        }
    }
}

fn run_stage(enabled: bool, stage: &dyn Stage, items: Vec<ExtractionItem>) -> Vec<ExtractionItem> {
    if !enabled {
        debug!(stage = stage.name(), "Stage disabled, passing through");
        return items;
    }
    stage.process(&items)
}
