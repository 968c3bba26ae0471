use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use crate::domain::{UnifiedField, UnifiedRecord};

/// Fields making up the composite duplicate key, when present in the file
pub const COMPOSITE_KEY_FIELDS: [UnifiedField; 4] = [
    UnifiedField::CustomerName,
    UnifiedField::ReviewText,
    UnifiedField::ReviewDate,
    UnifiedField::RestaurantName,
];

/// Row counts around each dedup stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub input_rows: usize,
    pub empty_rows_dropped: usize,
    pub duplicate_texts_dropped: usize,
    pub composite_duplicates_dropped: usize,
    pub output_rows: usize,
}

impl DedupStats {
    pub fn total_dropped(&self) -> usize {
        self.input_rows - self.output_rows
    }
}

/// Removes empty and duplicate review rows in three ordered stages, keeping
/// the first occurrence and the original order of survivors
#[derive(Debug, Clone, Default)]
pub struct Deduplicator;

impl Deduplicator {
    pub fn new() -> Self {
        Self
    }

    /// `present` lists the unified fields the source file actually carried;
    /// it decides which composite key columns exist.
    pub fn deduplicate(
        &self,
        records: &[UnifiedRecord],
        present: &[UnifiedField],
    ) -> (Vec<UnifiedRecord>, DedupStats) {
        let mut stats = DedupStats {
            input_rows: records.len(),
            ..DedupStats::default()
        };

        // 1. rows without a single sourced value
        let kept: Vec<&UnifiedRecord> = records.iter().filter(|r| !is_empty_row(r)).collect();
        stats.empty_rows_dropped = records.len() - kept.len();
        info!("Dropped {} completely empty rows", stats.empty_rows_dropped);

        // 2. identical review text; a missing text is a key of its own
        let before = kept.len();
        let kept: Vec<&UnifiedRecord> = if present.contains(&UnifiedField::ReviewText) {
            let mut seen_texts: HashSet<Option<&str>> = HashSet::new();
            kept.into_iter()
                .filter(|&r| seen_texts.insert(r.review_text.as_deref()))
                .collect()
        } else {
            kept
        };
        stats.duplicate_texts_dropped = before - kept.len();
        info!("After dropping duplicate texts: {} rows", kept.len());

        // 3. composite key over whichever key columns the file had
        let key_fields: Vec<UnifiedField> = COMPOSITE_KEY_FIELDS
            .iter()
            .copied()
            .filter(|f| present.contains(f))
            .collect();
        let before = kept.len();
        let kept: Vec<&UnifiedRecord> = if key_fields.is_empty() {
            kept
        } else {
            let mut seen_keys: HashSet<Vec<Option<String>>> = HashSet::new();
            kept.into_iter()
                .filter(|r| {
                    let key: Vec<Option<String>> =
                        key_fields.iter().map(|f| r.value(*f).key()).collect();
                    seen_keys.insert(key)
                })
                .collect()
        };
        stats.composite_duplicates_dropped = before - kept.len();
        info!("After composite key deduplication: {} rows", kept.len());

        stats.output_rows = kept.len();
        info!(
            "Deduplication reduced rows from {} to {}",
            stats.input_rows, stats.output_rows
        );
        (kept.into_iter().cloned().collect(), stats)
    }
}

/// A row is empty when every field read from the source is missing. The
/// loader-stamped `source_file` and the file-level `rating_scale` and
/// `rating_1_5` do not count as content.
fn is_empty_row(record: &UnifiedRecord) -> bool {
    UnifiedField::ALL
        .iter()
        .filter(|f| !f.is_derived())
        .all(|f| record.is_missing(*f))
}
