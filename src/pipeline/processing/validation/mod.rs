//! Severity-graded validation of processed review tables.
//!
//! Reports only ever escalate (pass -> warn -> fail). Validation never
//! returns an error: every finding is a field of the report.

pub mod restaurant;

pub use restaurant::{RestaurantInfoChecks, RestaurantInfoReport};

use chrono::Utc;
use polars::prelude::{col, lit, DataFrame, DataType, IntoLazy, PolarsResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::constants::{
    AGE_RANGE_MISSING_WARN, MAX_REVIEW_LENGTH, REVIEW_LENGTH, REVIEW_TEXT_MISSING_FAIL,
    REVIEW_TEXT_MISSING_WARN, TIP_PERCENTAGE_CAP,
};
use crate::domain::{CategoricalColumn, UnifiedField};
use crate::metrics::ValidationMetrics;
use crate::pipeline::processing::categorical::{CategoricalNormalizer, CategoryMaps};
use crate::pipeline::processing::integrity::{integrity_report, IntegrityReport, Stage};
use crate::pipeline::processing::resolve::{ColumnResolver, SynonymTable};
use crate::types::{column_values, has_column, missing_fraction};

/// Fields a processed review table cannot do without
pub const REQUIRED_REVIEW_COLUMNS: [UnifiedField; 3] = [
    UnifiedField::ReviewId,
    UnifiedField::Rating1To5,
    UnifiedField::ReviewText,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Pass,
    Warn,
    Fail,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pass => "pass",
            ValidationStatus::Warn => "warn",
            ValidationStatus::Fail => "fail",
        }
    }

    pub fn severity(&self) -> u8 {
        *self as u8
    }

    /// Raise to `to` if it is more severe; never lowers
    pub fn escalate(&mut self, to: ValidationStatus) {
        if to > *self {
            *self = to;
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for review validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub review_text_missing_warn: f64,
    pub review_text_missing_fail: f64,
    pub age_range_missing_warn: f64,
    pub rating_min: f64,
    pub rating_max: f64,
    /// Highest acceptable post-cap tip percentage
    pub tip_percentage_max: f64,
    pub review_length_max: usize,
    /// Turn coercion failures into a warning
    pub strict_coercion: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            review_text_missing_warn: REVIEW_TEXT_MISSING_WARN,
            review_text_missing_fail: REVIEW_TEXT_MISSING_FAIL,
            age_range_missing_warn: AGE_RANGE_MISSING_WARN,
            rating_min: 1.0,
            rating_max: 5.0,
            tip_percentage_max: TIP_PERCENTAGE_CAP,
            review_length_max: MAX_REVIEW_LENGTH,
            strict_coercion: false,
        }
    }
}

/// Raw vs processed row accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupMetrics {
    pub rows_dropped_dedup: i64,
    /// Review ids attributed to more than one distinct customer in raw data
    pub conflicting_ids: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewChecks {
    pub missing_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_ids: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count_mismatch: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_ratings: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extreme_tips: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_reviews: Option<usize>,
    /// Missing fraction of review_text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_review_text_pct: Option<f64>,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub dedup: Option<DedupMetrics>,
}

/// Observed rating range next to the scale it was read on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingScaleNote {
    pub inferred_scale: u32,
    pub max_observed: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewWarnings {
    /// Missing fraction of review_text / age_range when above zero
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub missing_values: BTreeMap<String, f64>,
    /// Raw categorical values with no canonical bucket, per column
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unmapped_categories: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub coercion_failures: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_scale: Option<RatingScaleNote>,
}

impl ReviewWarnings {
    pub fn is_empty(&self) -> bool {
        self.missing_values.is_empty()
            && self.unmapped_categories.is_empty()
            && self.coercion_failures.is_empty()
            && self.rating_scale.is_none()
    }
}

/// Integrity snapshots before and after processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageIntegrity {
    pub raw: IntegrityReport,
    pub processed: IntegrityReport,
}

/// Validation outcome for one review source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub source: String,
    pub row_count_processed: usize,
    pub row_count_raw: Option<usize>,
    pub checks: ReviewChecks,
    pub warnings: ReviewWarnings,
    pub status: ValidationStatus,
    #[serde(default)]
    pub integrity: Option<StageIntegrity>,
}

/// Any per-source report of a combined run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceReport {
    Reviews(ValidationReport),
    RestaurantInfo(RestaurantInfoReport),
}

impl SourceReport {
    pub fn status(&self) -> ValidationStatus {
        match self {
            SourceReport::Reviews(r) => r.status,
            SourceReport::RestaurantInfo(r) => r.status,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            SourceReport::Reviews(r) => &r.source,
            SourceReport::RestaurantInfo(r) => &r.source,
        }
    }
}

/// Pipeline-level report: every source plus the worst status among them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedValidationReport {
    pub validation_id: String,
    pub timestamp: String,
    pub sources: Vec<SourceReport>,
    pub status: ValidationStatus,
}

/// One input to a combined run
#[derive(Debug, Clone, Copy)]
pub enum ValidationEntry<'a> {
    Reviews {
        source: &'a str,
        raw: &'a DataFrame,
        processed: &'a DataFrame,
        /// Per-field coercion failure counts from the loader
        coercion_failures: Option<&'a BTreeMap<UnifiedField, usize>>,
    },
    RestaurantInfo {
        source: &'a str,
        table: &'a DataFrame,
    },
}

impl<'a> ValidationEntry<'a> {
    pub fn reviews(source: &'a str, raw: &'a DataFrame, processed: &'a DataFrame) -> Self {
        ValidationEntry::Reviews {
            source,
            raw,
            processed,
            coercion_failures: None,
        }
    }

    pub fn restaurant_info(source: &'a str, table: &'a DataFrame) -> Self {
        ValidationEntry::RestaurantInfo { source, table }
    }

    /// Attach loader coercion counts; ignored for restaurant metadata
    pub fn with_coercion_failures(self, failures: &'a BTreeMap<UnifiedField, usize>) -> Self {
        match self {
            ValidationEntry::Reviews {
                source,
                raw,
                processed,
                ..
            } => ValidationEntry::Reviews {
                source,
                raw,
                processed,
                coercion_failures: Some(failures),
            },
            other => other,
        }
    }
}

/// Runs review and restaurant-metadata checks and folds them into one report
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    config: ValidationConfig,
    resolver: ColumnResolver,
    normalizer: CategoricalNormalizer,
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Synonyms used to relabel raw tables before comparing them
    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.resolver = ColumnResolver::new(synonyms);
        self
    }

    /// Canonical tables used by the unmapped-category check
    pub fn with_categories(mut self, maps: CategoryMaps) -> Self {
        self.normalizer = CategoricalNormalizer::new(maps);
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Check a processed review frame. `row_count_raw` enables the
    /// row-count comparison.
    pub fn validate_processed(
        &self,
        processed: &DataFrame,
        source: &str,
        row_count_raw: Option<usize>,
    ) -> ValidationReport {
        let cfg = &self.config;
        let mut status = ValidationStatus::Pass;
        let mut checks = ReviewChecks::default();
        let mut warnings = ReviewWarnings::default();

        checks.missing_columns = REQUIRED_REVIEW_COLUMNS
            .iter()
            .filter(|f| !has_column(processed, f.as_str()))
            .map(|f| f.as_str().to_string())
            .collect();
        if !checks.missing_columns.is_empty() {
            status.escalate(ValidationStatus::Fail);
        }

        if has_column(processed, UnifiedField::ReviewId.as_str()) {
            let dupes = duplicate_count(processed, UnifiedField::ReviewId.as_str());
            checks.duplicate_ids = Some(dupes);
            if dupes > 0 {
                status.escalate(ValidationStatus::Fail);
            }
        }

        if let Some(raw) = row_count_raw {
            let delta = raw as i64 - processed.height() as i64;
            checks.row_count_mismatch = Some(delta);
            if delta != 0 {
                status.escalate(ValidationStatus::Fail);
            }
        }

        checks.invalid_ratings = count_numeric(processed, UnifiedField::Rating1To5.as_str(), |r| {
            r < cfg.rating_min || r > cfg.rating_max
        });
        checks.extreme_tips = count_numeric(processed, UnifiedField::TipPercentage.as_str(), |t| {
            t > cfg.tip_percentage_max
        });
        checks.long_reviews = count_numeric(processed, REVIEW_LENGTH, |l| {
            l > cfg.review_length_max as f64
        });
        for count in [checks.invalid_ratings, checks.extreme_tips, checks.long_reviews]
            .into_iter()
            .flatten()
        {
            if count > 0 {
                status.escalate(ValidationStatus::Fail);
            }
        }

        for (field, threshold) in [
            (UnifiedField::ReviewText, cfg.review_text_missing_warn),
            (UnifiedField::AgeRange, cfg.age_range_missing_warn),
        ] {
            if let Some(pct) = missing_fraction(processed, field.as_str()) {
                if pct > 0.0 {
                    warnings.missing_values.insert(field.as_str().to_string(), pct);
                }
                if pct > threshold {
                    status.escalate(ValidationStatus::Warn);
                }
            }
        }

        if let Some(nulls) = missing_fraction(processed, UnifiedField::ReviewText.as_str()) {
            checks.null_review_text_pct = Some(nulls);
            if nulls > cfg.review_text_missing_fail {
                status.escalate(ValidationStatus::Fail);
            }
        }

        warnings.unmapped_categories = self.unmapped_categories(processed);
        if !warnings.unmapped_categories.is_empty() {
            status.escalate(ValidationStatus::Warn);
        }

        warnings.rating_scale = rating_scale_note(processed);

        ValidationReport {
            source: source.to_string(),
            row_count_processed: processed.height(),
            row_count_raw,
            checks,
            warnings,
            status,
            integrity: None,
        }
    }

    /// Distinct present raw values of each categorical column that the
    /// canonical tables do not cover, in first-seen order
    fn unmapped_categories(&self, processed: &DataFrame) -> BTreeMap<String, Vec<String>> {
        let mut out = BTreeMap::new();
        for column in CategoricalColumn::ALL {
            if !has_column(processed, column.normalized_column()) {
                continue;
            }
            let Some(cells) = column_values(processed, column.as_str()) else {
                continue;
            };
            let mut seen = HashSet::new();
            let values: Vec<String> = cells
                .iter()
                .filter_map(|v| v.key())
                .filter(|v| self.normalizer.is_unmapped(column, v))
                .filter(|v| seen.insert(v.clone()))
                .collect();
            if !values.is_empty() {
                out.insert(column.as_str().to_string(), values);
            }
        }
        out
    }

    /// Full validation across review sources and restaurant metadata.
    /// Raw review frames are relabeled to unified names before their
    /// integrity report and the id-conflict count.
    pub fn validate_with_integrity(&self, entries: &[ValidationEntry<'_>]) -> CombinedValidationReport {
        let mut combined = CombinedValidationReport {
            validation_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now()
                .naive_utc()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            sources: Vec::with_capacity(entries.len()),
            status: ValidationStatus::Pass,
        };

        for entry in entries {
            let report = match *entry {
                ValidationEntry::RestaurantInfo { source, table } => {
                    SourceReport::RestaurantInfo(self.validate_restaurant_info(table, source))
                }
                ValidationEntry::Reviews {
                    source,
                    raw,
                    processed,
                    coercion_failures,
                } => SourceReport::Reviews(self.validate_review_source(
                    source,
                    raw,
                    processed,
                    coercion_failures,
                )),
            };
            ValidationMetrics::record_source_report(report.status());
            if report.status() != ValidationStatus::Pass {
                warn!("Source '{}' validated as {}", report.source(), report.status());
            }
            combined.status.escalate(report.status());
            combined.sources.push(report);
        }

        ValidationMetrics::record_combined(combined.status, combined.sources.len());
        info!("Combined validation status: {}", combined.status);
        combined
    }

    fn validate_review_source(
        &self,
        source: &str,
        raw: &DataFrame,
        processed: &DataFrame,
        coercion_failures: Option<&BTreeMap<UnifiedField, usize>>,
    ) -> ValidationReport {
        let raw = match self.resolver.relabel(raw) {
            Ok(relabeled) => relabeled,
            Err(e) => {
                warn!("Could not relabel raw frame of '{}', using raw headers: {}", source, e);
                raw.clone()
            }
        };
        let pre = integrity_report(&raw, Stage::Raw);
        let post = integrity_report(processed, Stage::Processed);

        let mut report = self.validate_processed(processed, source, Some(raw.height()));
        report.integrity = Some(StageIntegrity {
            raw: pre,
            processed: post,
        });

        let metrics = dedup_metrics(&raw, processed);
        if metrics.conflicting_ids > 0 {
            report.status.escalate(ValidationStatus::Warn);
        }
        report.checks.dedup = Some(metrics);

        if let Some(failures) = coercion_failures {
            report.warnings.coercion_failures = failures
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(f, n)| (f.as_str().to_string(), *n))
                .collect();
            if self.config.strict_coercion && !report.warnings.coercion_failures.is_empty() {
                report.status.escalate(ValidationStatus::Warn);
            }
        }

        report
    }
}

/// Rows lost between raw and processed, plus review ids that the raw data
/// attributes to more than one distinct customer. Expects unified headers.
pub fn dedup_metrics(raw: &DataFrame, processed: &DataFrame) -> DedupMetrics {
    let rows_dropped_dedup = raw.height() as i64 - processed.height() as i64;

    let conflicting_ids = if has_column(raw, UnifiedField::ReviewId.as_str())
        && has_column(raw, UnifiedField::CustomerName.as_str())
    {
        conflicting_ids(raw).unwrap_or_else(|e| {
            warn!("Conflicting id count skipped: {}", e);
            0
        })
    } else {
        0
    };

    info!(
        "Dedup metrics: rows_dropped={}, conflicting_ids={}",
        rows_dropped_dedup, conflicting_ids
    );
    ValidationMetrics::record_dedup(rows_dropped_dedup, conflicting_ids);

    DedupMetrics {
        rows_dropped_dedup,
        conflicting_ids,
    }
}

fn conflicting_ids(raw: &DataFrame) -> PolarsResult<usize> {
    let review_id = UnifiedField::ReviewId.as_str();
    let conflicts = raw
        .clone()
        .lazy()
        .filter(col(review_id).is_not_null())
        .group_by([col(review_id)])
        .agg([col(UnifiedField::CustomerName.as_str())
            .drop_nulls()
            .n_unique()
            .alias("customers")])
        .filter(col("customers").gt(lit(1)))
        .collect()?;
    Ok(conflicts.height())
}

/// Repeated non-missing values beyond their first occurrence
fn duplicate_count(df: &DataFrame, column: &str) -> usize {
    let Ok(series) = df.column(column) else {
        return 0;
    };
    let present = series.len() - series.null_count();
    let distinct = series.drop_nulls().n_unique().unwrap_or(present);
    present.saturating_sub(distinct)
}

/// Rows whose numeric value in `column` satisfies `predicate`; `None` when
/// the column is absent. Present values that are not numbers count as hits.
fn count_numeric<F>(df: &DataFrame, column: &str, predicate: F) -> Option<usize>
where
    F: Fn(f64) -> bool,
{
    let series = df.column(column).ok()?;
    let numbers = series.cast(&DataType::Float64).ok()?;
    let unparsed = numbers.null_count().saturating_sub(series.null_count());
    let hits = numbers
        .f64()
        .ok()?
        .into_iter()
        .flatten()
        .filter(|v| predicate(*v))
        .count();
    Some(unparsed + hits)
}

fn column_max(df: &DataFrame, column: &str) -> Option<f64> {
    let numbers = df.column(column).ok()?.cast(&DataType::Float64).ok()?;
    let max = numbers
        .f64()
        .ok()?
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));
    max
}

fn rating_scale_note(processed: &DataFrame) -> Option<RatingScaleNote> {
    let scale = column_max(processed, UnifiedField::RatingScale.as_str())?;
    let max_observed = column_max(processed, UnifiedField::RatingRaw.as_str())?;
    if max_observed < scale {
        Some(RatingScaleNote {
            inferred_scale: scale as u32,
            max_observed,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{frame_from_rows, Value};

    const COLUMNS: [&str; 9] = [
        "review_id",
        "customer_name",
        "rating_raw",
        "rating_scale",
        "rating_1_5",
        "review_text",
        "age_range",
        "gender",
        "gender_norm",
    ];

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn processed(rows: Vec<Vec<Value>>) -> DataFrame {
        frame_from_rows(&COLUMNS, &rows).unwrap()
    }

    fn good_row(id: &str, text_value: Value) -> Vec<Value> {
        vec![
            text(id),
            text("ann"),
            Value::Number(5.0),
            Value::Number(5.0),
            Value::Number(5.0),
            text_value,
            text("18-25"),
            text("f"),
            text("female"),
        ]
    }

    #[test]
    fn test_escalation_never_lowers() {
        let mut status = ValidationStatus::Fail;
        status.escalate(ValidationStatus::Warn);
        assert_eq!(status, ValidationStatus::Fail);
        let mut status = ValidationStatus::Pass;
        status.escalate(ValidationStatus::Warn);
        assert_eq!(status, ValidationStatus::Warn);
    }

    #[test]
    fn test_clean_table_passes() {
        let table = processed(vec![good_row("1", text("tasty")), good_row("2", text("fine"))]);
        let report = ValidationEngine::new().validate_processed(&table, "downtown", Some(2));
        assert_eq!(report.status, ValidationStatus::Pass);
        assert_eq!(report.checks.duplicate_ids, Some(0));
        assert_eq!(report.checks.row_count_mismatch, Some(0));
        assert_eq!(report.checks.invalid_ratings, Some(0));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_required_column_fails() {
        let table =
            frame_from_rows(&["review_id", "rating_1_5"], &[vec![text("1"), Value::Number(4.0)]])
                .unwrap();
        let report = ValidationEngine::new().validate_processed(&table, "s", None);
        assert_eq!(report.status, ValidationStatus::Fail);
        assert_eq!(report.checks.missing_columns, vec!["review_text".to_string()]);
        assert_eq!(report.checks.null_review_text_pct, None);
    }

    #[test]
    fn test_review_text_missingness_tiers() {
        // 9 of 20 missing = 45%
        let rows: Vec<_> = (0..20)
            .map(|i| {
                let t = if i < 9 { Value::Missing } else { text(&format!("review {}", i)) };
                good_row(&i.to_string(), t)
            })
            .collect();
        let report = ValidationEngine::new().validate_processed(&processed(rows), "s", None);
        assert_eq!(report.status, ValidationStatus::Warn);
        assert_eq!(report.warnings.missing_values.get("review_text"), Some(&0.45));

        let rows: Vec<_> = (0..10)
            .map(|i| {
                let t = if i < 6 { Value::Missing } else { text(&format!("review {}", i)) };
                good_row(&i.to_string(), t)
            })
            .collect();
        let report = ValidationEngine::new().validate_processed(&processed(rows), "s", None);
        assert_eq!(report.status, ValidationStatus::Fail);
        assert_eq!(report.checks.null_review_text_pct, Some(0.6));
    }

    #[test]
    fn test_range_and_duplicate_failures() {
        let mut bad = good_row("1", text("b"));
        bad[4] = Value::Number(5.5);
        let table = processed(vec![good_row("1", text("a")), bad]);
        let report = ValidationEngine::new().validate_processed(&table, "s", Some(3));
        assert_eq!(report.status, ValidationStatus::Fail);
        assert_eq!(report.checks.duplicate_ids, Some(1));
        assert_eq!(report.checks.invalid_ratings, Some(1));
        assert_eq!(report.checks.row_count_mismatch, Some(1));
    }

    #[test]
    fn test_unmapped_category_warns() {
        let mut row = good_row("1", text("ok"));
        row[7] = text("unspecified");
        row[8] = text("unspecified");
        let report =
            ValidationEngine::new().validate_processed(&processed(vec![row]), "s", None);
        assert_eq!(report.status, ValidationStatus::Warn);
        assert_eq!(
            report.warnings.unmapped_categories.get("gender"),
            Some(&vec!["unspecified".to_string()])
        );
    }

    #[test]
    fn test_rating_scale_note_is_informational() {
        let mut row = good_row("1", text("ok"));
        row[2] = Value::Number(8.0);
        row[3] = Value::Number(10.0);
        row[4] = Value::Number(4.0);
        let report =
            ValidationEngine::new().validate_processed(&processed(vec![row]), "s", None);
        assert_eq!(report.status, ValidationStatus::Pass);
        assert_eq!(
            report.warnings.rating_scale,
            Some(RatingScaleNote {
                inferred_scale: 10,
                max_observed: 8.0
            })
        );
    }

    #[test]
    fn test_dedup_metrics_conflicts() {
        let raw = frame_from_rows(
            &["review_id", "customer_name"],
            &[
                vec![text("1"), text("ann")],
                vec![text("1"), text("bob")],
                vec![text("2"), text("cat")],
                vec![text("2"), text("cat")],
                vec![Value::Missing, text("dan")],
            ],
        )
        .unwrap();
        let processed = frame_from_rows(&["review_id"], &[vec![text("1")]]).unwrap();
        let metrics = dedup_metrics(&raw, &processed);
        assert_eq!(metrics.rows_dropped_dedup, 4);
        assert_eq!(metrics.conflicting_ids, 1);
    }

    #[test]
    fn test_combined_status_is_worst_of() {
        let engine = ValidationEngine::new();
        let passing = processed(vec![good_row("1", text("a"))]);
        let mut unmapped_row = good_row("1", text("a"));
        unmapped_row[7] = text("x");
        let warning = processed(vec![unmapped_row]);
        let failing = frame_from_rows(&["review_id"], &[]).unwrap();

        let entries = [
            ValidationEntry::reviews("a", &passing, &passing),
            ValidationEntry::reviews("b", &warning, &warning),
            ValidationEntry::reviews("c", &failing, &failing),
        ];
        let combined = engine.validate_with_integrity(&entries);
        let statuses: Vec<_> = combined.sources.iter().map(SourceReport::status).collect();
        assert_eq!(
            statuses,
            vec![ValidationStatus::Pass, ValidationStatus::Warn, ValidationStatus::Fail]
        );
        assert_eq!(combined.status, ValidationStatus::Fail);
        assert!(Uuid::parse_str(&combined.validation_id).is_ok());
    }

    #[test]
    fn test_conflicting_ids_escalate_clean_table_to_warn() {
        let table = processed(vec![good_row("1", text("a")), good_row("2", text("b"))]);
        let engine = ValidationEngine::new();
        assert_eq!(
            engine.validate_processed(&table, "s", Some(2)).status,
            ValidationStatus::Pass
        );

        // same id under two customers in the raw extract
        let raw = frame_from_rows(
            &["Review Number", "Guest Name"],
            &[vec![text("1"), text("ann")], vec![text("1"), text("bob")]],
        )
        .unwrap();
        let combined = engine.validate_with_integrity(&[ValidationEntry::reviews("s", &raw, &table)]);
        let SourceReport::Reviews(report) = &combined.sources[0] else {
            panic!("expected a review report");
        };
        assert_eq!(report.checks.dedup.map(|d| d.conflicting_ids), Some(1));
        assert_eq!(report.checks.row_count_mismatch, Some(0));
        assert_eq!(report.status, ValidationStatus::Warn);
        assert_eq!(combined.status, ValidationStatus::Warn);
    }

    #[test]
    fn test_age_range_missingness_alone_warns() {
        let rows = |missing: usize| -> Vec<Vec<Value>> {
            (0..10)
                .map(|i| {
                    let mut row = good_row(&i.to_string(), text("fine"));
                    if i < missing {
                        row[6] = Value::Missing;
                    }
                    row
                })
                .collect()
        };
        let engine = ValidationEngine::new();

        let at_threshold = engine.validate_processed(&processed(rows(2)), "s", Some(10));
        assert_eq!(at_threshold.status, ValidationStatus::Pass);
        assert_eq!(at_threshold.warnings.missing_values.get("age_range"), Some(&0.2));

        let above = engine.validate_processed(&processed(rows(3)), "s", Some(10));
        assert_eq!(above.status, ValidationStatus::Warn);
        assert_eq!(above.warnings.missing_values.get("age_range"), Some(&0.3));
        assert!(above.warnings.missing_values.get("review_text").is_none());
        assert_eq!(above.checks.null_review_text_pct, Some(0.0));
    }

    #[test]
    fn test_strict_coercion_warns_only_when_enabled() {
        let table = processed(vec![good_row("1", text("a"))]);
        let mut failures = BTreeMap::new();
        failures.insert(UnifiedField::TotalSpent, 2);
        let entry = ValidationEntry::reviews("s", &table, &table).with_coercion_failures(&failures);

        let lenient = ValidationEngine::new().validate_with_integrity(&[entry]);
        assert_eq!(lenient.status, ValidationStatus::Pass);

        let strict = ValidationEngine::with_config(ValidationConfig {
            strict_coercion: true,
            ..ValidationConfig::default()
        })
        .validate_with_integrity(&[entry]);
        assert_eq!(strict.status, ValidationStatus::Warn);
        let SourceReport::Reviews(report) = &strict.sources[0] else {
            panic!("expected a review report");
        };
        assert_eq!(report.warnings.coercion_failures.get("total_spent"), Some(&2));
    }

    #[test]
    fn test_report_json_shape() {
        let table = processed(vec![good_row("1", text("a"))]);
        let combined =
            ValidationEngine::new().validate_with_integrity(&[ValidationEntry::reviews("s", &table, &table)]);
        let json = serde_json::to_value(&combined).unwrap();
        assert_eq!(json["status"], "pass");
        let source = &json["sources"][0];
        assert_eq!(source["checks"]["rows_dropped_dedup"], 0);
        assert_eq!(source["checks"]["conflicting_ids"], 0);
        assert_eq!(source["integrity"]["raw"]["stage"], "raw");
        assert_eq!(source["integrity"]["processed"]["stage"], "processed");

        let back: CombinedValidationReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, combined);
    }
}
