use std::fs;

use review_etl::domain::output_columns;
use review_etl::pipeline::processing::validation::{SourceReport, ValidationStatus};
use review_etl::pipeline::storage;
use review_etl::types::{cell, column_names, column_values};
use review_etl::{EtlConfig, EtlPipeline, FileSpec, SourceInput};

fn input(path: &str, source: &str, bytes: &[u8]) -> SourceInput {
    SourceInput::new(FileSpec::new(path, source), bytes.to_vec())
}

fn review_inputs() -> Vec<SourceInput> {
    vec![
        input(
            "tests/resources/downtown_reviews.csv",
            "downtown",
            include_bytes!("resources/downtown_reviews.csv"),
        ),
        input(
            "tests/resources/eastside_reviews.csv",
            "eastside",
            include_bytes!("resources/eastside_reviews.csv"),
        ),
        input(
            "tests/resources/midtown_reviews.txt",
            "midtown",
            include_bytes!("resources/midtown_reviews.txt"),
        ),
        input(
            "tests/resources/uptown_reviews.csv",
            "uptown",
            include_bytes!("resources/uptown_reviews.csv"),
        ),
    ]
}

fn restaurant_info() -> SourceInput {
    input(
        "tests/resources/restaurant_info.csv",
        "restaurant_info",
        include_bytes!("resources/restaurant_info.csv"),
    )
}

fn status_of(reports: &[SourceReport], source: &str) -> ValidationStatus {
    reports
        .iter()
        .find(|r| r.source() == source)
        .map(|r| r.status())
        .unwrap_or_else(|| panic!("no report for {}", source))
}

#[test]
fn test_full_run_reconciles_all_sources() {
    let info = restaurant_info();
    let output = EtlPipeline::new().run(&review_inputs(), Some(&info)).unwrap();

    assert!(output.skipped.is_empty());
    // downtown loses one blank row and one duplicate text, midtown a
    // second review without text
    let records: Vec<(&str, usize, usize)> = output
        .sources
        .iter()
        .map(|s| (s.source_name.as_str(), s.raw_rows, s.records))
        .collect();
    assert_eq!(
        records,
        vec![
            ("downtown", 5, 3),
            ("eastside", 3, 3),
            ("midtown", 4, 3),
            ("uptown", 3, 3)
        ]
    );
    assert_eq!(output.reviews.height(), 12);

    let scales: Vec<Option<u32>> = output.sources.iter().map(|s| s.rating_scale).collect();
    assert_eq!(scales, vec![Some(10), Some(100), Some(5), Some(5)]);

    // 20 unified columns plus the joined metadata
    let mut expected = output_columns();
    expected.extend(["avg_stars".to_string(), "total_reviews".to_string()]);
    assert_eq!(column_names(&output.reviews), expected);
    for row in 0..output.reviews.height() {
        assert!(cell(&output.reviews, row, "avg_stars").unwrap().as_f64().is_some());
    }
}

#[test]
fn test_full_run_statuses() {
    let info = restaurant_info();
    let output = EtlPipeline::new().run(&review_inputs(), Some(&info)).unwrap();
    let reports = &output.validation.sources;

    assert_eq!(reports.len(), 5);
    assert_eq!(status_of(reports, "downtown"), ValidationStatus::Fail);
    assert_eq!(status_of(reports, "eastside"), ValidationStatus::Pass);
    assert_eq!(status_of(reports, "midtown"), ValidationStatus::Fail);
    assert_eq!(status_of(reports, "uptown"), ValidationStatus::Warn);
    assert_eq!(status_of(reports, "restaurant_info"), ValidationStatus::Pass);
    assert_eq!(output.validation.status, ValidationStatus::Fail);

    let Some(SourceReport::Reviews(downtown)) = reports.iter().find(|r| r.source() == "downtown")
    else {
        panic!("downtown report missing");
    };
    assert_eq!(downtown.checks.row_count_mismatch, Some(2));
    assert_eq!(downtown.warnings.coercion_failures.get("review_date"), Some(&1));
    assert_eq!(downtown.warnings.coercion_failures.get("total_spent"), Some(&1));
    let integrity = downtown.integrity.as_ref().unwrap();
    assert_eq!(integrity.raw.total_rows, 5);
    assert_eq!(integrity.processed.total_rows, 3);

    let Some(SourceReport::Reviews(midtown)) = reports.iter().find(|r| r.source() == "midtown")
    else {
        panic!("midtown report missing");
    };
    assert_eq!(midtown.row_count_processed, 3);
    assert_eq!(midtown.checks.row_count_mismatch, Some(1));
    assert_eq!(midtown.warnings.missing_values.get("review_text"), Some(&(1.0 / 3.0)));
    assert_eq!(midtown.warnings.missing_values.get("age_range"), Some(&(1.0 / 3.0)));
    let integrity = midtown.integrity.as_ref().unwrap();
    assert_eq!(integrity.raw.missingness_pct.get("review_text"), Some(&0.5));

    let Some(SourceReport::Reviews(uptown)) = reports.iter().find(|r| r.source() == "uptown")
    else {
        panic!("uptown report missing");
    };
    assert_eq!(
        uptown.warnings.unmapped_categories.get("gender"),
        Some(&vec!["unspecified".to_string()])
    );
}

#[test]
fn test_tip_percentage_is_filled_and_capped() {
    let output = EtlPipeline::new().run(&review_inputs()[3..], None).unwrap();
    let tips: Vec<Option<f64>> = column_values(&output.reviews, "tip_percentage")
        .unwrap()
        .iter()
        .map(|v| v.as_f64())
        .collect();
    assert_eq!(tips, vec![Some(20.0), Some(10.0), Some(30.0)]);
}

#[test]
fn test_schema_audit_and_categorical_report() {
    let output = EtlPipeline::new().run(&review_inputs(), None).unwrap();

    let first = &output.schema_audit[0];
    assert_eq!(first.source_file, "downtown_reviews.csv");
    assert_eq!(first.unified_field.as_str(), "age_range");
    assert_eq!(first.raw_field, "age_range");
    assert!(output
        .schema_audit
        .iter()
        .any(|row| row.source_file == "eastside_reviews.csv"
            && row.unified_field.as_str() == "rating_raw"
            && row.raw_field == "satisfaction_score"));
    let files: Vec<&str> = output.schema_audit.iter().map(|r| r.source_file.as_str()).collect();
    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);

    assert!(output.categorical_report.iter().any(|obs| obs.column.as_str() == "gender"
        && obs.source == "uptown"
        && obs.value == "unspecified"));
    assert!(output.categorical_report.iter().any(|obs| obs.column.as_str() == "gender"
        && obs.source == "midtown"
        && obs.value == "non-binary"));
}

#[test]
fn test_unmapped_category_falls_back_to_raw_value() {
    let output = EtlPipeline::new().run(&review_inputs()[3..], None).unwrap();
    let genders: Vec<String> = column_values(&output.reviews, "gender_norm")
        .unwrap()
        .iter()
        .filter_map(|v| v.key())
        .collect();
    assert_eq!(genders, vec!["unspecified", "female", "male"]);
}

#[test]
fn test_bias_summary_counts() {
    let output = EtlPipeline::new().run(&review_inputs(), None).unwrap();

    let gender = &output.bias_summary["gender_norm"];
    assert_eq!(gender.counts.get("female"), Some(&6));
    // the second midtown male review has no text and is deduplicated
    assert_eq!(gender.counts.get("male"), Some(&4));
    assert_eq!(gender.counts.get("non_binary"), Some(&1));
    assert_eq!(gender.missing_pct, 0.0);

    let age = &output.bias_summary["age_group"];
    assert_eq!(age.counts.get("NA"), Some(&1));
    assert_eq!(age.missing_pct, 8.33);
}

#[test]
fn test_config_overrides_category_tables() {
    let config = EtlConfig::from_toml(include_str!("resources/etl_config.toml")).unwrap();
    let pipeline = EtlPipeline::from_config(&config).unwrap();
    let output = pipeline.run(&review_inputs()[3..], None).unwrap();

    assert_eq!(output.validation.status, ValidationStatus::Pass);
    let genders: Vec<String> = column_values(&output.reviews, "gender_norm")
        .unwrap()
        .iter()
        .filter_map(|v| v.key())
        .collect();
    assert_eq!(genders, vec!["na", "female", "male"]);
}

#[test]
fn test_bad_inputs_are_skipped() {
    let mut inputs = review_inputs();
    inputs.push(input("legacy.xlsx", "legacy", b"PK\x03\x04"));
    let output = EtlPipeline::new().run(&inputs, None).unwrap();

    assert_eq!(output.skipped.len(), 1);
    assert_eq!(output.skipped[0].source_name, "legacy");
    assert_eq!(output.validation.sources.len(), 4);
    assert_eq!(output.reviews.height(), 12);
}

#[test]
fn test_write_outputs() {
    let info = restaurant_info();
    let output = EtlPipeline::new().run(&review_inputs(), Some(&info)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("output");

    let written = storage::write_outputs(&output, &out_dir).unwrap();
    assert_eq!(written.len(), 5);
    for path in &written {
        assert!(path.exists(), "{} not written", path.display());
    }

    let reviews = fs::read_to_string(out_dir.join(storage::REVIEWS_FILE)).unwrap();
    assert_eq!(reviews.lines().count(), 13);
    assert!(reviews.starts_with("review_id,customer_name,"));

    let audit = fs::read_to_string(out_dir.join(storage::SCHEMA_AUDIT_FILE)).unwrap();
    assert!(audit.starts_with("source_file,unified_field,raw_field\n"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join(storage::VALIDATION_REPORT_FILE)).unwrap())
            .unwrap();
    assert_eq!(report["status"], "fail");
    assert_eq!(report["sources"].as_array().unwrap().len(), 5);
    assert!(report["sources"][4]["integrity"].is_null());
}
