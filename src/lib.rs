//! Schema reconciliation and validation for heterogeneous restaurant-review
//! extracts.
//!
//! Raw tabular bytes go in; a normalized review table, a schema audit trail,
//! a categorical value report and a severity-graded validation report come
//! out.

pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod types;

pub use config::EtlConfig;
pub use error::{EtlError, Result};
pub use pipeline::ingestion::FileSpec;
pub use pipeline::{EtlPipeline, PipelineOutput, SourceInput};
