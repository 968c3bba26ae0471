//! Validation phase metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::processing::validation::ValidationStatus;

pub struct ValidationMetrics;

impl ValidationMetrics {
    /// One per-source report finished
    pub fn record_source_report(status: ValidationStatus) {
        ::metrics::counter!(
            phase_metric!(counter, "validation", "source_reports"),
            "status" => status.as_str()
        )
        .increment(1);
    }

    pub fn record_combined(status: ValidationStatus, sources: usize) {
        ::metrics::counter!(
            phase_metric!(counter, "validation", "runs"),
            "status" => status.as_str()
        )
        .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "validation", "sources_per_run"))
            .record(sources as f64);
        ::metrics::gauge!(phase_metric!(gauge, "validation", "last_combined_status"))
            .set(status.severity() as f64);
    }

    pub fn record_dedup(rows_dropped: i64, conflicting_ids: usize) {
        if rows_dropped > 0 {
            ::metrics::counter!(phase_metric!(counter, "validation", "rows_dropped_dedup"))
                .increment(rows_dropped as u64);
        }
        ::metrics::counter!(phase_metric!(counter, "validation", "conflicting_ids"))
            .increment(conflicting_ids as u64);
    }
}

impl PhaseMetrics for ValidationMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "validation", "source_reports"));
        let _ = counter!(phase_metric!(counter, "validation", "runs"));
        let _ = counter!(phase_metric!(counter, "validation", "rows_dropped_dedup"));
        let _ = counter!(phase_metric!(counter, "validation", "conflicting_ids"));
        let _ = histogram!(phase_metric!(histogram, "validation", "sources_per_run"));
        let _ = gauge!(phase_metric!(gauge, "validation", "last_combined_status"));
    }

    fn phase_name() -> &'static str {
        "validation"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "validation", "source_reports"),
                metric_type: MetricType::Counter,
                help: "Per-source validation reports by final status",
                labels: vec!["status"],
            },
            MetricDoc {
                name: phase_metric!(counter, "validation", "runs"),
                metric_type: MetricType::Counter,
                help: "Combined validation runs by status",
                labels: vec!["status"],
            },
            MetricDoc {
                name: phase_metric!(counter, "validation", "rows_dropped_dedup"),
                metric_type: MetricType::Counter,
                help: "Raw rows missing from processed tables",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "validation", "conflicting_ids"),
                metric_type: MetricType::Counter,
                help: "Review ids attributed to more than one customer in raw data",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "validation", "sources_per_run"),
                metric_type: MetricType::Histogram,
                help: "Sources folded into one combined report",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "validation", "last_combined_status"),
                metric_type: MetricType::Gauge,
                help: "Status of the latest combined run (0 pass, 1 warn, 2 fail)",
                labels: vec![],
            },
        ]
    }
}
