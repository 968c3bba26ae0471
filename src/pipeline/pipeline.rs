use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::EtlConfig;
use crate::domain::records_to_frame;
use crate::error::Result;
use crate::metrics::LoaderMetrics;
use crate::pipeline::ingestion::{read_table, FileSpec};
use crate::pipeline::processing::categorical::CategoricalNormalizer;
use crate::pipeline::processing::enrich::{
    bias_summary, join_restaurant_info, log_dataset_summary, BiasSummary,
};
use crate::pipeline::processing::loader::{
    CategoricalObservation, LoaderConfig, ReviewBatch, ReviewLoader, SchemaAuditRow,
};
use crate::pipeline::processing::resolve::ColumnResolver;
use crate::pipeline::processing::validation::{
    CombinedValidationReport, ValidationEngine, ValidationEntry,
};
use crate::types::concat_frames;

/// A materialized input extract
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub spec: FileSpec,
    pub bytes: Vec<u8>,
}

impl SourceInput {
    pub fn new(spec: FileSpec, bytes: Vec<u8>) -> Self {
        Self { spec, bytes }
    }

    /// Read the whole file behind `spec` into memory
    pub fn read(spec: FileSpec) -> Result<Self> {
        let bytes = spec.read_bytes()?;
        Ok(Self { spec, bytes })
    }
}

/// An input rejected with a structural error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedInput {
    pub source_name: String,
    pub source_file: String,
    pub error: String,
}

/// Row accounting for one loaded source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source_name: String,
    pub source_file: String,
    pub raw_rows: usize,
    pub records: usize,
    pub rating_scale: Option<u32>,
}

/// Everything one batch run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Normalized reviews of all sources, restaurant metadata joined when given
    pub reviews: DataFrame,
    pub schema_audit: Vec<SchemaAuditRow>,
    pub categorical_report: Vec<CategoricalObservation>,
    pub validation: CombinedValidationReport,
    pub bias_summary: BiasSummary,
    pub sources: Vec<SourceSummary>,
    pub skipped: Vec<SkippedInput>,
}

/// Batch runner: load every review extract, validate, enrich
#[derive(Debug, Clone, Default)]
pub struct EtlPipeline {
    resolver: ColumnResolver,
    normalizer: CategoricalNormalizer,
    loader_config: LoaderConfig,
    engine: ValidationEngine,
}

impl EtlPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EtlConfig) -> Result<Self> {
        let synonyms = config.synonym_table()?;
        let maps = config.category_maps();
        Ok(Self {
            resolver: ColumnResolver::new(synonyms.clone()),
            normalizer: CategoricalNormalizer::new(maps.clone()),
            loader_config: config.loader.clone(),
            engine: ValidationEngine::with_config(config.validation_config())
                .with_synonyms(synonyms)
                .with_categories(maps),
        })
    }

    /// A loader sharing this pipeline's tables, with an empty accumulator
    pub fn loader(&self) -> ReviewLoader {
        ReviewLoader::new(
            self.resolver.clone(),
            self.normalizer.clone(),
            self.loader_config.clone(),
        )
    }

    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    /// Run the full batch. Inputs with structural errors are skipped and
    /// listed in the output; the run itself only fails on internal errors.
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub fn run(
        &self,
        inputs: &[SourceInput],
        restaurant_info: Option<&SourceInput>,
    ) -> Result<PipelineOutput> {
        let start = Instant::now();
        let mut loader = self.loader();
        let mut skipped = Vec::new();
        let mut loaded: Vec<(DataFrame, ReviewBatch, DataFrame)> = Vec::new();

        for input in inputs {
            let raw = match read_table(&input.spec, &input.bytes) {
                Ok(raw) => raw,
                Err(e) => {
                    skip(&mut skipped, &input.spec, e.to_string());
                    continue;
                }
            };
            let batch = loader.standardize(&input.spec, &raw);
            let analytic = batch.to_analytic_frame()?;
            loaded.push((raw, batch, analytic));
        }

        let metadata = match restaurant_info {
            Some(input) => match read_table(&input.spec, &input.bytes) {
                Ok(table) => {
                    info!("Loaded restaurant metadata: {} rows", table.height());
                    Some((input.spec.source_name.as_str(), table))
                }
                Err(e) => {
                    skip(&mut skipped, &input.spec, e.to_string());
                    None
                }
            },
            None => None,
        };

        let mut entries: Vec<ValidationEntry<'_>> = loaded
            .iter()
            .map(|(raw, batch, analytic)| {
                ValidationEntry::reviews(&batch.source_name, raw, analytic)
                    .with_coercion_failures(&batch.coercion_failures)
            })
            .collect();
        if let Some((source, table)) = &metadata {
            entries.push(ValidationEntry::restaurant_info(source, table));
        }
        let validation = self.engine.validate_with_integrity(&entries);

        let frames = loaded
            .iter()
            .map(|(_, batch, _)| batch.to_frame())
            .collect::<Result<Vec<_>>>()?;
        let mut reviews = if frames.is_empty() {
            records_to_frame(&[])?
        } else {
            concat_frames(&frames)?
        };
        info!("Combined review rows: {}", reviews.height());
        if let Some((source, table)) = &metadata {
            match join_restaurant_info(&reviews, table) {
                Ok(joined) => reviews = joined,
                Err(e) => warn!("Metadata join with '{}' skipped: {}", source, e),
            }
        }

        log_dataset_summary(&reviews);
        let bias_summary = bias_summary(&reviews);

        let sources = loaded
            .iter()
            .map(|(raw, batch, _)| SourceSummary {
                source_name: batch.source_name.clone(),
                source_file: batch.source_file.clone(),
                raw_rows: raw.height(),
                records: batch.len(),
                rating_scale: batch.rating_scale,
            })
            .collect();

        let accumulator = loader.take_accumulator();
        info!(
            "ETL run finished in {:.2}s with status {} ({} skipped inputs)",
            start.elapsed().as_secs_f64(),
            validation.status,
            skipped.len()
        );

        Ok(PipelineOutput {
            reviews,
            schema_audit: accumulator.schema_audit(),
            categorical_report: accumulator.categorical_report(),
            validation,
            bias_summary,
            sources,
            skipped,
        })
    }
}

fn skip(skipped: &mut Vec<SkippedInput>, spec: &FileSpec, error: String) {
    warn!("Skipping {}: {}", spec.file_name(), error);
    LoaderMetrics::record_skipped_input();
    skipped.push(SkippedInput {
        source_name: spec.source_name.clone(),
        source_file: spec.file_name(),
        error,
    });
}
