use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

use crate::constants::{MAX_REVIEW_LENGTH, TIP_PERCENTAGE_CAP};
use crate::domain::{
    records_to_analytic_frame, records_to_frame, CategoricalColumn, UnifiedField, UnifiedRecord,
};
use crate::error::Result;
use crate::metrics::LoaderMetrics;
use crate::pipeline::ingestion::{read_table, FileSpec};
use crate::pipeline::processing::categorical::CategoricalNormalizer;
use crate::pipeline::processing::coerce;
use crate::pipeline::processing::dedup::{DedupStats, Deduplicator};
use crate::pipeline::processing::resolve::{ColumnMapping, ColumnResolver};
use crate::types::{column_names, series_values, Value};

/// Tunables for the derived review fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Tip percentages above this are clamped
    pub tip_percentage_cap: f64,
    /// Characters kept in `review_text_trunc`
    pub max_review_length: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            tip_percentage_cap: TIP_PERCENTAGE_CAP,
            max_review_length: MAX_REVIEW_LENGTH,
        }
    }
}

/// Traceability entry: one resolved column of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaAuditRow {
    pub source_file: String,
    pub unified_field: UnifiedField,
    pub raw_field: String,
}

/// A distinct raw categorical value seen in one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalObservation {
    pub column: CategoricalColumn,
    pub source: String,
    pub value: String,
}

fn sort_observations(rows: &mut [CategoricalObservation]) {
    rows.sort_by(|a, b| {
        (a.column.as_str(), &a.source, &a.value).cmp(&(b.column.as_str(), &b.source, &b.value))
    });
}

/// Audit state gathered across every file a loader processes.
///
/// One accumulator belongs to one loader; parallel loads use one loader
/// each and `merge` the drained accumulators afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadAccumulator {
    schema_audit: Vec<SchemaAuditRow>,
    observed: BTreeMap<(CategoricalColumn, String), BTreeSet<String>>,
    unmapped: BTreeMap<(CategoricalColumn, String), BTreeSet<String>>,
}

impl LoadAccumulator {
    pub fn record_mapping(&mut self, source_file: &str, mapping: &ColumnMapping) {
        self.schema_audit.extend(mapping.iter().map(|c| SchemaAuditRow {
            source_file: source_file.to_string(),
            unified_field: c.field,
            raw_field: c.raw_name.clone(),
        }));
    }

    pub fn record_category(
        &mut self,
        column: CategoricalColumn,
        source: &str,
        value: &str,
        mapped: bool,
    ) {
        let key = (column, source.to_string());
        if !mapped {
            self.unmapped
                .entry(key.clone())
                .or_default()
                .insert(value.to_string());
        }
        self.observed.entry(key).or_default().insert(value.to_string());
    }

    /// Resolved columns sorted by (source_file, unified_field)
    pub fn schema_audit(&self) -> Vec<SchemaAuditRow> {
        let mut rows = self.schema_audit.clone();
        rows.sort_by(|a, b| {
            (&a.source_file, a.unified_field.as_str())
                .cmp(&(&b.source_file, b.unified_field.as_str()))
        });
        rows
    }

    /// Distinct raw values sorted by (column, source, value)
    pub fn categorical_report(&self) -> Vec<CategoricalObservation> {
        flatten(&self.observed)
    }

    /// Raw values without a canonical bucket, sorted like the report
    pub fn unmapped_categories(&self) -> Vec<CategoricalObservation> {
        flatten(&self.unmapped)
    }

    /// Unmapped values of one source keyed by column name
    pub fn unmapped_for_source(&self, source: &str) -> BTreeMap<String, Vec<String>> {
        self.unmapped
            .iter()
            .filter(|((_, s), _)| s == source)
            .map(|((column, _), values)| {
                (column.as_str().to_string(), values.iter().cloned().collect())
            })
            .collect()
    }

    pub fn merge(&mut self, other: LoadAccumulator) {
        self.schema_audit.extend(other.schema_audit);
        for (key, values) in other.observed {
            self.observed.entry(key).or_default().extend(values);
        }
        for (key, values) in other.unmapped {
            self.unmapped.entry(key).or_default().extend(values);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schema_audit.is_empty() && self.observed.is_empty()
    }
}

fn flatten(
    map: &BTreeMap<(CategoricalColumn, String), BTreeSet<String>>,
) -> Vec<CategoricalObservation> {
    let mut rows: Vec<CategoricalObservation> = map
        .iter()
        .flat_map(|((column, source), values)| {
            values.iter().map(move |value| CategoricalObservation {
                column: *column,
                source: source.clone(),
                value: value.clone(),
            })
        })
        .collect();
    sort_observations(&mut rows);
    rows
}

/// The normalized output of one input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewBatch {
    pub source_name: String,
    pub source_file: String,
    pub records: Vec<UnifiedRecord>,
    /// Unified fields the source actually carried
    pub present_fields: Vec<UnifiedField>,
    /// Scale the ratings were read on, when the file had ratings
    pub rating_scale: Option<u32>,
    /// Present raw values that failed numeric/date conversion, per field
    pub coercion_failures: BTreeMap<UnifiedField, usize>,
    pub dedup: DedupStats,
}

impl ReviewBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fixed 20-column normalized frame
    pub fn to_frame(&self) -> Result<DataFrame> {
        records_to_frame(&self.records)
    }

    /// Normalized frame plus `log_total_spent`, `review_length`, `review_text_trunc`
    pub fn to_analytic_frame(&self) -> Result<DataFrame> {
        records_to_analytic_frame(&self.records)
    }

    pub fn total_coercion_failures(&self) -> usize {
        self.coercion_failures.values().sum()
    }
}

/// Loads one review extract at a time into the unified schema:
/// column resolution, coercion, categorical mapping, deduplication.
#[derive(Debug, Clone, Default)]
pub struct ReviewLoader {
    resolver: ColumnResolver,
    normalizer: CategoricalNormalizer,
    deduplicator: Deduplicator,
    config: LoaderConfig,
    accumulator: LoadAccumulator,
}

impl ReviewLoader {
    pub fn new(
        resolver: ColumnResolver,
        normalizer: CategoricalNormalizer,
        config: LoaderConfig,
    ) -> Self {
        Self {
            resolver,
            normalizer,
            deduplicator: Deduplicator::new(),
            config,
            accumulator: LoadAccumulator::default(),
        }
    }

    /// Parse `bytes` as the extract described by `spec` and normalize it.
    /// Fails only when the input is not tabular data this loader reads.
    pub fn load_and_standardize(&mut self, spec: &FileSpec, bytes: &[u8]) -> Result<ReviewBatch> {
        let raw = read_table(spec, bytes)?;
        Ok(self.standardize(spec, &raw))
    }

    /// Normalize an already parsed raw frame
    #[instrument(skip(self, raw), fields(source = %spec.source_name, rows = raw.height()))]
    pub fn standardize(&mut self, spec: &FileSpec, raw: &DataFrame) -> ReviewBatch {
        let source_file = spec.file_name();
        let headers = column_names(raw);
        let mapping = self.resolver.resolve(&headers);
        self.accumulator.record_mapping(&source_file, &mapping);
        debug!("Resolved {} of {} columns", mapping.len(), headers.len());

        let resolved = ResolvedCells::extract(raw, &mapping);
        let mut failures: BTreeMap<UnifiedField, usize> = BTreeMap::new();
        let mut records: Vec<UnifiedRecord> = (0..raw.height())
            .map(|row| coerce_row(&resolved, row, &source_file, &mut failures))
            .collect();

        let rating_scale = if mapping.contains(UnifiedField::RatingRaw) {
            let scale = coerce::infer_rating_scale(records.iter().map(|r| r.rating_raw));
            for record in &mut records {
                record.rating_scale = Some(scale);
                record.rating_1_5 = coerce::rating_to_five_point(record.rating_raw, scale);
            }
            Some(scale)
        } else {
            None
        };

        for record in &mut records {
            record.tip_percentage = coerce::cap_tip_percentage(
                coerce::compute_tip_percentage(
                    record.tip_percentage,
                    record.total_spent,
                    record.tip_amount,
                ),
                self.config.tip_percentage_cap,
            );
            record.log_total_spent = coerce::log_total_spent(record.total_spent);
            record.review_length = coerce::review_length(record.review_text.as_deref());
            record.review_text_trunc = coerce::truncate_review(
                record.review_text.as_deref(),
                self.config.max_review_length,
            );
        }

        for column in CategoricalColumn::ALL {
            if mapping.contains(column.raw_field()) {
                self.normalize_categories(column, &spec.source_name, &mut records);
            }
        }

        let present_fields: Vec<UnifiedField> = mapping.iter().map(|c| c.field).collect();
        let (records, dedup) = self.deduplicator.deduplicate(&records, &present_fields);

        LoaderMetrics::record_file_loaded(raw.height(), records.len(), mapping.len());
        LoaderMetrics::record_dedup(&dedup);
        let failure_count: usize = failures.values().sum();
        if failure_count > 0 {
            LoaderMetrics::record_coercion_failures(failure_count);
        }

        info!(
            "Standardized {}: {} raw rows -> {} records (scale {:?}, {} coercion failures)",
            source_file,
            raw.height(),
            records.len(),
            rating_scale,
            failure_count
        );

        ReviewBatch {
            source_name: spec.source_name.clone(),
            source_file,
            records,
            present_fields,
            rating_scale,
            coercion_failures: failures,
            dedup,
        }
    }

    fn normalize_categories(
        &mut self,
        column: CategoricalColumn,
        source: &str,
        records: &mut [UnifiedRecord],
    ) {
        for record in records.iter_mut() {
            let (raw, normalized) = match column {
                CategoricalColumn::Gender => (&mut record.gender, &mut record.gender_norm),
                CategoricalColumn::Ethnicity => (&mut record.ethnicity, &mut record.ethnicity_norm),
                CategoricalColumn::AgeRange => (&mut record.age_range, &mut record.age_group),
            };
            match self.normalizer.normalize(column, raw.as_deref()) {
                Some(value) => {
                    self.accumulator
                        .record_category(column, source, &value.raw, value.mapped);
                    *normalized = Some(value.canonical);
                    *raw = Some(value.raw);
                }
                None => {
                    *normalized = None;
                    *raw = None;
                }
            }
        }
    }

    pub fn resolver(&self) -> &ColumnResolver {
        &self.resolver
    }

    pub fn normalizer(&self) -> &CategoricalNormalizer {
        &self.normalizer
    }

    pub fn accumulator(&self) -> &LoadAccumulator {
        &self.accumulator
    }

    pub fn schema_audit(&self) -> Vec<SchemaAuditRow> {
        self.accumulator.schema_audit()
    }

    pub fn categorical_report(&self) -> Vec<CategoricalObservation> {
        self.accumulator.categorical_report()
    }

    /// Hand over the accumulated audit state and start empty
    pub fn take_accumulator(&mut self) -> LoadAccumulator {
        std::mem::take(&mut self.accumulator)
    }

    pub fn reset(&mut self) {
        self.accumulator = LoadAccumulator::default();
    }
}

static MISSING: Value = Value::Missing;

/// Cells of the resolved raw columns, keyed by the field they feed
struct ResolvedCells {
    columns: BTreeMap<UnifiedField, Vec<Value>>,
}

impl ResolvedCells {
    fn extract(raw: &DataFrame, mapping: &ColumnMapping) -> Self {
        let series = raw.get_columns();
        let columns = mapping
            .iter()
            .filter_map(|c| series.get(c.index).map(|s| (c.field, series_values(s))))
            .collect();
        Self { columns }
    }

    fn get(&self, field: UnifiedField, row: usize) -> &Value {
        self.columns
            .get(&field)
            .and_then(|values| values.get(row))
            .unwrap_or(&MISSING)
    }
}

fn coerce_row(
    resolved: &ResolvedCells,
    row: usize,
    source_file: &str,
    failures: &mut BTreeMap<UnifiedField, usize>,
) -> UnifiedRecord {
    let cell = |field: UnifiedField| resolved.get(field, row);
    let mut number = |field: UnifiedField| -> Option<f64> {
        let value = cell(field);
        let parsed = coerce::parse_number(value);
        if parsed.is_none() && !value.is_missing() {
            *failures.entry(field).or_default() += 1;
        }
        parsed
    };

    let rating_raw = number(UnifiedField::RatingRaw);
    let total_spent = number(UnifiedField::TotalSpent);
    let tip_amount = number(UnifiedField::TipAmount);
    let tip_percentage = number(UnifiedField::TipPercentage);
    let party_size = number(UnifiedField::PartySize);

    let date_cell = cell(UnifiedField::ReviewDate);
    let review_date = coerce::parse_date(date_cell);
    if review_date.is_none() && !date_cell.is_missing() {
        *failures.entry(UnifiedField::ReviewDate).or_default() += 1;
    }

    UnifiedRecord {
        review_id: coerce::coerce_text(cell(UnifiedField::ReviewId)),
        customer_name: coerce::coerce_text(cell(UnifiedField::CustomerName)),
        review_date,
        rating_raw,
        review_text: coerce::clean_review_text(cell(UnifiedField::ReviewText)),
        location: coerce::coerce_text(cell(UnifiedField::Location)),
        restaurant_name: coerce::coerce_text(cell(UnifiedField::RestaurantName)),
        total_spent,
        tip_amount,
        tip_percentage,
        party_size,
        age_range: coerce::coerce_text(cell(UnifiedField::AgeRange)),
        gender: coerce::coerce_text(cell(UnifiedField::Gender)),
        ethnicity: coerce::coerce_text(cell(UnifiedField::Ethnicity)),
        source_file: Some(source_file.to_string()),
        ..UnifiedRecord::default()
    }
}
