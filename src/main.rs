use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use review_etl::pipeline::processing::validation::ValidationStatus;
use review_etl::pipeline::storage;
use review_etl::{logging, metrics, EtlConfig, EtlPipeline, FileSpec, SourceInput};

#[derive(Parser)]
#[command(name = "review_etl")]
#[command(about = "Restaurant review schema reconciliation and validation")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate and enrich review extracts and write all outputs
    Run {
        /// Review extract as PATH or PATH=SOURCE (repeatable)
        #[arg(long = "input", required = true, value_parser = parse_input)]
        inputs: Vec<FileSpec>,
        /// Restaurant metadata table joined onto the reviews
        #[arg(long)]
        restaurant_info: Option<PathBuf>,
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Also write a Prometheus snapshot to metrics.prom
        #[arg(long)]
        metrics: bool,
    },
    /// Load extracts only and print the schema audit and categorical report
    Audit {
        #[arg(long = "input", required = true, value_parser = parse_input)]
        inputs: Vec<FileSpec>,
    },
}

/// `PATH=SOURCE`, or `PATH` with the file stem as source
fn parse_input(arg: &str) -> std::result::Result<FileSpec, String> {
    if let Some((path, source)) = arg.rsplit_once('=') {
        if !path.is_empty() && !source.is_empty() && !source.contains(['/', '\\']) {
            return Ok(FileSpec::new(path, source));
        }
    }
    let path = Path::new(arg);
    let source = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| format!("'{}' does not name a file", arg))?;
    Ok(FileSpec::new(path, source))
}

fn read_inputs(specs: Vec<FileSpec>) -> Result<Vec<SourceInput>> {
    specs
        .into_iter()
        .map(|spec| {
            let path = spec.path.clone();
            SourceInput::read(spec).with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect()
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EtlConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EtlConfig::default(),
    };
    let pipeline = EtlPipeline::from_config(&config).context("Invalid configuration")?;

    match cli.command {
        Commands::Run {
            inputs,
            restaurant_info,
            output_dir,
            metrics: write_metrics,
        } => {
            if write_metrics {
                metrics::init_metrics();
            }
            let inputs = read_inputs(inputs)?;
            let restaurant_info = match restaurant_info {
                Some(path) => {
                    let spec = FileSpec::new(&path, "restaurant_info");
                    Some(
                        SourceInput::read(spec)
                            .with_context(|| format!("Failed to read {}", path.display()))?,
                    )
                }
                None => None,
            };

            let output = pipeline.run(&inputs, restaurant_info.as_ref())?;
            let written = storage::write_outputs(&output, &output_dir)
                .with_context(|| format!("Failed to write outputs to {}", output_dir.display()))?;

            if write_metrics {
                if let Some(snapshot) = metrics::render() {
                    let path = output_dir.join("metrics.prom");
                    fs::write(&path, snapshot)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Metrics snapshot saved to {}", path.display());
                }
            }

            println!("\nETL results:");
            for source in &output.sources {
                println!(
                    "   {} ({}): {} raw rows -> {} records",
                    source.source_name, source.source_file, source.raw_rows, source.records
                );
            }
            for skipped in &output.skipped {
                println!("   skipped {}: {}", skipped.source_file, skipped.error);
            }
            println!("   validation: {} ({})", output.validation.status, output.validation.validation_id);
            for path in written {
                println!("   wrote {}", path.display());
            }

            if output.validation.status == ValidationStatus::Fail {
                warn!("Combined validation failed");
                std::process::exit(1);
            }
        }
        Commands::Audit { inputs } => {
            let mut loader = pipeline.loader();
            for input in read_inputs(inputs)? {
                match loader.load_and_standardize(&input.spec, &input.bytes) {
                    Ok(batch) => println!("{}: {} records", batch.source_file, batch.len()),
                    Err(e) => warn!("Skipping {}: {}", input.spec.file_name(), e),
                }
            }

            println!("\nSchema audit:");
            println!("   source_file,unified_field,raw_field");
            for row in loader.schema_audit() {
                println!("   {},{},{}", row.source_file, row.unified_field, row.raw_field);
            }
            println!("\nCategorical report:");
            println!("   column,source,value");
            for obs in loader.categorical_report() {
                println!("   {},{},{}", obs.column, obs.source, obs.value);
            }
        }
    }

    Ok(())
}
