use anyhow::{Context, Result};
use clap::Parser;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::{fs, path::PathBuf};

use review_etl::pipeline::processing::validation::{
    CombinedValidationReport, SourceReport, ValidationStatus,
};

/// Check a combined validation report against the v1 schema and summarize
/// what each source failed on.
#[derive(Parser, Debug)]
#[command(name = "validate-report", version, about = "Check and summarize a validation report")]
struct Cli {
    /// Report JSON written by the pipeline
    path: PathBuf,

    /// Schema file (defaults to schemas/validation_report.v1.json)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Exit with status 2 when the report's combined status is fail
    #[arg(long)]
    deny_fail: bool,
}

fn load_json(path: &PathBuf) -> Result<Value> {
    let data =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

/// Human readable list of the checks a source tripped
fn failed_checks(report: &SourceReport) -> Vec<String> {
    let mut out = Vec::new();
    let mut count = |label: &str, n: Option<usize>| {
        if let Some(n) = n.filter(|n| *n > 0) {
            out.push(format!("{}={}", label, n));
        }
    };
    match report {
        SourceReport::Reviews(r) => {
            let checks = &r.checks;
            count("duplicate_ids", checks.duplicate_ids);
            count("invalid_ratings", checks.invalid_ratings);
            count("extreme_tips", checks.extreme_tips);
            count("long_reviews", checks.long_reviews);
            count("conflicting_ids", checks.dedup.map(|d| d.conflicting_ids));
            if let Some(delta) = checks.row_count_mismatch.filter(|d| *d != 0) {
                out.push(format!("row_count_mismatch={}", delta));
            }
            if !checks.missing_columns.is_empty() {
                out.push(format!("missing_columns=[{}]", checks.missing_columns.join(",")));
            }
            for (column, pct) in &r.warnings.missing_values {
                out.push(format!("missing {}={:.1}%", column, pct * 100.0));
            }
            for (column, values) in &r.warnings.unmapped_categories {
                out.push(format!("unmapped {}=[{}]", column, values.join(",")));
            }
        }
        SourceReport::RestaurantInfo(r) => {
            let checks = &r.checks;
            count("invalid_avg_stars", checks.invalid_avg_stars);
            count("invalid_total_reviews", checks.invalid_total_reviews);
            if !checks.missing_columns.is_empty() {
                out.push(format!("missing_columns=[{}]", checks.missing_columns.join(",")));
            }
        }
    }
    out
}

fn print_summary(report: &CombinedValidationReport) {
    println!("report {} ({})", report.validation_id, report.timestamp);
    for source in &report.sources {
        let findings = failed_checks(source);
        if findings.is_empty() {
            println!("  {:<20} {}", source.source(), source.status());
        } else {
            println!(
                "  {:<20} {}  {}",
                source.source(),
                source.status(),
                findings.join("; ")
            );
        }
    }
    let failing = report
        .sources
        .iter()
        .filter(|s| s.status() == ValidationStatus::Fail)
        .count();
    println!(
        "combined: {} ({} of {} sources failing)",
        report.status,
        failing,
        report.sources.len()
    );
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let schema_path = args
        .schema
        .unwrap_or_else(|| PathBuf::from("schemas/validation_report.v1.json"));

    let schema_json = load_json(&schema_path)?;
    let instance = load_json(&args.path)?;

    // jsonschema 0.17 borrows the schema for the compiled validator's lifetime
    let schema_static: &'static Value = Box::leak(Box::new(schema_json));
    let compiled = JSONSchema::options()
        .compile(schema_static)
        .context("Failed to compile JSON Schema")?;

    if let Err(errors) = compiled.validate(&instance) {
        eprintln!("{} does not match the report schema:", args.path.display());
        for error in errors {
            eprintln!("- {} at {}", error, error.instance_path);
        }
        std::process::exit(1);
    }

    let report: CombinedValidationReport =
        serde_json::from_value(instance).context("Report matches the schema but not the report type")?;
    print_summary(&report);

    if args.deny_fail && report.status == ValidationStatus::Fail {
        std::process::exit(2);
    }
    Ok(())
}
