//! Metrics for the review ETL.
//!
//! Each pipeline phase owns its metrics in a dedicated submodule so names
//! stay unique. The Prometheus recorder is installed without an HTTP
//! listener; callers pull a text snapshot through [`render`].

pub mod loader;
pub mod registry;
pub mod validation;

pub use loader::LoaderMetrics;
pub use validation::ValidationMetrics;

use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder and register every phase metric.
///
/// Idempotent. Without a call to this, metric macros are no-ops.
pub fn init_metrics() {
    INIT.call_once(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        match builder.install_recorder() {
            Ok(handle) => {
                if HANDLE.set(handle).is_err() {
                    warn!("METRICS: recorder handle was already stored");
                }
                info!("Prometheus recorder installed (in-process render only)");
                registry::register_all_metrics();
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
            }
        }
    });
}

/// Prometheus text exposition of everything recorded so far, or `None`
/// when [`init_metrics`] has not installed a recorder
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Implemented by each phase's metric collection
pub trait PhaseMetrics {
    /// Pre-register every metric of the phase so it shows up in snapshots
    /// before its first increment
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Builds metric names following `etl_{phase}_{name}[_total]`
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("etl_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("etl_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("etl_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
