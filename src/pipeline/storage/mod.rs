//! Writers for the pipeline outputs: CSV for frames and audit rows, pretty
//! JSON for reports.

use polars::prelude::DataFrame;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::pipeline::pipeline::PipelineOutput;
use crate::pipeline::processing::validation::CombinedValidationReport;
use crate::types::{column_names, series_values};

pub const REVIEWS_FILE: &str = "reviews_processed.csv";
pub const SCHEMA_AUDIT_FILE: &str = "schema_audit.csv";
pub const CATEGORICAL_REPORT_FILE: &str = "categorical_report.csv";
pub const VALIDATION_REPORT_FILE: &str = "validation_combined.json";
pub const BIAS_SUMMARY_FILE: &str = "bias_summary.json";

/// Write `df` with a header row; missing cells become empty fields
pub fn write_frame_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(column_names(df))?;
    let columns: Vec<_> = df.get_columns().iter().map(series_values).collect();
    for row in 0..df.height() {
        writer.write_record(
            columns
                .iter()
                .map(|cells| cells.get(row).map(|v| v.to_string()).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Write serializable rows, header taken from the field names
pub fn write_rows_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body)?;
    Ok(())
}

pub fn save_validation_report(report: &CombinedValidationReport, path: &Path) -> Result<()> {
    save_json(report, path)?;
    info!("Validation report saved to {}", path.display());
    Ok(())
}

/// Write every output of a run into `dir`, creating it when needed.
/// Returns the written paths.
pub fn write_outputs(output: &PipelineOutput, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let reviews = dir.join(REVIEWS_FILE);
    write_frame_csv(&output.reviews, &reviews)?;

    let audit = dir.join(SCHEMA_AUDIT_FILE);
    write_rows_csv(&output.schema_audit, &audit)?;

    let categorical = dir.join(CATEGORICAL_REPORT_FILE);
    write_rows_csv(&output.categorical_report, &categorical)?;

    let validation = dir.join(VALIDATION_REPORT_FILE);
    save_validation_report(&output.validation, &validation)?;

    let bias = dir.join(BIAS_SUMMARY_FILE);
    save_json(&output.bias_summary, &bias)?;
    info!("Saved bias summary to {}", bias.display());

    Ok(vec![reviews, audit, categorical, validation, bias])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UnifiedField;
    use crate::pipeline::processing::loader::SchemaAuditRow;
    use polars::prelude::df;

    #[test]
    fn test_frame_csv_renders_missing_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let frame = df!(
            "review_id" => &["1", "2"],
            "rating_1_5" => &[Some(3.5), None]
        )
        .unwrap();
        write_frame_csv(&frame, &path).unwrap();
        let body = fs::read_to_string(&path).unwrap();
        assert_eq!(body, "review_id,rating_1_5\n1,3.5\n2,\n");
    }

    #[test]
    fn test_audit_rows_use_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.csv");
        let rows = vec![SchemaAuditRow {
            source_file: "downtown.csv".into(),
            unified_field: UnifiedField::Rating1To5,
            raw_field: "score".into(),
        }];
        write_rows_csv(&rows, &path).unwrap();
        let body = fs::read_to_string(&path).unwrap();
        assert_eq!(
            body,
            "source_file,unified_field,raw_field\ndowntown.csv,rating_1_5,score\n"
        );
    }
}
