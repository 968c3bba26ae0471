//! Loader phase metrics: files read, rows in and out, coercion failures and
//! rows removed by each dedup stage.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::processing::dedup::DedupStats;

pub struct LoaderMetrics;

impl LoaderMetrics {
    /// One file normalized
    pub fn record_file_loaded(rows_in: usize, rows_out: usize, columns_resolved: usize) {
        ::metrics::counter!(phase_metric!(counter, "loader", "files_loaded")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "loader", "rows_read"))
            .increment(rows_in as u64);
        ::metrics::counter!(phase_metric!(counter, "loader", "records_emitted"))
            .increment(rows_out as u64);
        ::metrics::histogram!(phase_metric!(histogram, "loader", "rows_per_file"))
            .record(rows_in as f64);
        ::metrics::histogram!(phase_metric!(histogram, "loader", "columns_resolved"))
            .record(columns_resolved as f64);
    }

    pub fn record_dedup(stats: &DedupStats) {
        ::metrics::counter!(phase_metric!(counter, "loader", "empty_rows_dropped"))
            .increment(stats.empty_rows_dropped as u64);
        ::metrics::counter!(phase_metric!(counter, "loader", "duplicate_texts_dropped"))
            .increment(stats.duplicate_texts_dropped as u64);
        ::metrics::counter!(phase_metric!(counter, "loader", "composite_duplicates_dropped"))
            .increment(stats.composite_duplicates_dropped as u64);
    }

    pub fn record_coercion_failures(count: usize) {
        ::metrics::counter!(phase_metric!(counter, "loader", "coercion_failures"))
            .increment(count as u64);
    }

    /// An input rejected with a structural error
    pub fn record_skipped_input() {
        ::metrics::counter!(phase_metric!(counter, "loader", "inputs_skipped")).increment(1);
    }
}

impl PhaseMetrics for LoaderMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "loader", "files_loaded"));
        let _ = counter!(phase_metric!(counter, "loader", "rows_read"));
        let _ = counter!(phase_metric!(counter, "loader", "records_emitted"));
        let _ = counter!(phase_metric!(counter, "loader", "empty_rows_dropped"));
        let _ = counter!(phase_metric!(counter, "loader", "duplicate_texts_dropped"));
        let _ = counter!(phase_metric!(counter, "loader", "composite_duplicates_dropped"));
        let _ = counter!(phase_metric!(counter, "loader", "coercion_failures"));
        let _ = counter!(phase_metric!(counter, "loader", "inputs_skipped"));

        let _ = histogram!(phase_metric!(histogram, "loader", "rows_per_file"));
        let _ = histogram!(phase_metric!(histogram, "loader", "columns_resolved"));
    }

    fn phase_name() -> &'static str {
        "loader"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "loader", "files_loaded"),
                metric_type: MetricType::Counter,
                help: "Review extracts normalized",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "rows_read"),
                metric_type: MetricType::Counter,
                help: "Raw rows read across all extracts",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "records_emitted"),
                metric_type: MetricType::Counter,
                help: "Normalized records kept after deduplication",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "empty_rows_dropped"),
                metric_type: MetricType::Counter,
                help: "Rows dropped because every sourced field was missing",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "duplicate_texts_dropped"),
                metric_type: MetricType::Counter,
                help: "Rows dropped for repeating an earlier review text",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "composite_duplicates_dropped"),
                metric_type: MetricType::Counter,
                help: "Rows dropped by the customer/text/date/restaurant key",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "coercion_failures"),
                metric_type: MetricType::Counter,
                help: "Present raw values that failed numeric or date conversion",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "loader", "inputs_skipped"),
                metric_type: MetricType::Counter,
                help: "Inputs rejected with a structural error",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "loader", "rows_per_file"),
                metric_type: MetricType::Histogram,
                help: "Raw rows per extract",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "loader", "columns_resolved"),
                metric_type: MetricType::Histogram,
                help: "Raw columns matched to a unified field per extract",
                labels: vec![],
            },
        ]
    }
}
