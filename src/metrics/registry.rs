//! Catalog of every phase's metrics. Each metric name is owned by the phase
//! that registered it first; later claims are reported as conflicts.

use crate::metrics::{LoaderMetrics, MetricDoc, PhaseMetrics, ValidationMetrics};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A metric name claimed by two phases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricConflict {
    pub name: &'static str,
    pub owner: &'static str,
    pub claimant: &'static str,
}

#[derive(Debug, Default)]
pub struct MetricsCatalog {
    /// name -> (owning phase, doc)
    entries: BTreeMap<&'static str, (&'static str, MetricDoc)>,
    conflicts: Vec<MetricConflict>,
}

impl MetricsCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the documented metrics of one phase without touching the recorder
    pub fn add_phase(&mut self, phase: &'static str, docs: Vec<MetricDoc>) {
        for doc in docs {
            match self.entries.get(doc.name) {
                Some((owner, _)) => self.conflicts.push(MetricConflict {
                    name: doc.name,
                    owner: *owner,
                    claimant: phase,
                }),
                None => {
                    self.entries.insert(doc.name, (phase, doc));
                }
            }
        }
    }

    /// Pre-register the phase with the recorder and catalog its docs
    pub fn register<T: PhaseMetrics>(&mut self) {
        T::register_metrics();
        let docs = T::metrics_documentation();
        info!(
            "Registering {} metrics for phase '{}'",
            docs.len(),
            T::phase_name()
        );
        self.add_phase(T::phase_name(), docs);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn conflicts(&self) -> &[MetricConflict] {
        &self.conflicts
    }

    /// Cataloged metric names grouped by owning phase
    pub fn by_phase(&self) -> BTreeMap<&'static str, Vec<&MetricDoc>> {
        let mut grouped: BTreeMap<&'static str, Vec<&MetricDoc>> = BTreeMap::new();
        for (phase, doc) in self.entries.values() {
            grouped.entry(*phase).or_default().push(doc);
        }
        grouped
    }

    fn log_summary(&self) {
        for (phase, docs) in self.by_phase() {
            info!("Phase '{}': {} metrics", phase, docs.len());
            for doc in docs {
                info!(
                    "  - {} ({:?}) [{}]: {}",
                    doc.name,
                    doc.metric_type,
                    doc.labels.join(","),
                    doc.help
                );
            }
        }
    }
}

/// Register the loader and validation phases. Conflicts are logged, never
/// fatal; `ETL_METRICS_DEBUG` adds a per-metric listing.
pub fn register_all_metrics() -> MetricsCatalog {
    let mut catalog = MetricsCatalog::new();
    catalog.register::<LoaderMetrics>();
    catalog.register::<ValidationMetrics>();

    for conflict in catalog.conflicts() {
        warn!(
            "Metric '{}' is owned by phase '{}' but phase '{}' registers it again",
            conflict.name, conflict.owner, conflict.claimant
        );
    }
    info!(
        "Registered {} metrics across {} phases ({} conflicts)",
        catalog.len(),
        catalog.by_phase().len(),
        catalog.conflicts().len()
    );
    if std::env::var("ETL_METRICS_DEBUG").is_ok() {
        catalog.log_summary();
    }
    catalog
}
