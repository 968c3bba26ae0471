use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{count_numeric, StageIntegrity, ValidationEngine, ValidationStatus};
use crate::constants::{ADDRESS, AVG_STARS, TOTAL_REVIEWS};
use crate::domain::UnifiedField;
use crate::pipeline::processing::resolve::normalize_column_name;
use crate::types::{has_column, rename_columns};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestaurantInfoChecks {
    pub missing_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_avg_stars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_total_reviews: Option<usize>,
}

/// Validation outcome for a static restaurant metadata table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantInfoReport {
    pub source: String,
    pub row_count: usize,
    pub status: ValidationStatus,
    pub checks: RestaurantInfoChecks,
    /// Always null; keeps the per-source shape uniform
    pub integrity: Option<StageIntegrity>,
}

impl ValidationEngine {
    /// Metadata has no warn tier: any violation fails the report.
    /// Headers are normalized before the checks.
    pub fn validate_restaurant_info(&self, table: &DataFrame, source: &str) -> RestaurantInfoReport {
        let table = rename_columns(table, normalize_column_name).unwrap_or_else(|e| {
            warn!("Could not normalize headers of '{}': {}", source, e);
            table.clone()
        });
        let mut status = ValidationStatus::Pass;
        let mut checks = RestaurantInfoChecks {
            missing_columns: [
                UnifiedField::RestaurantName.as_str(),
                ADDRESS,
                AVG_STARS,
                TOTAL_REVIEWS,
            ]
            .iter()
            .filter(|c| !has_column(&table, c))
            .map(|c| c.to_string())
            .collect(),
            ..RestaurantInfoChecks::default()
        };
        if !checks.missing_columns.is_empty() {
            status.escalate(ValidationStatus::Fail);
        }

        checks.invalid_avg_stars = count_numeric(&table, AVG_STARS, |s| !(1.0..=5.0).contains(&s));
        checks.invalid_total_reviews = count_numeric(&table, TOTAL_REVIEWS, |n| n < 0.0);
        if checks.invalid_avg_stars.unwrap_or(0) > 0 || checks.invalid_total_reviews.unwrap_or(0) > 0
        {
            status.escalate(ValidationStatus::Fail);
        }

        RestaurantInfoReport {
            source: source.to_string(),
            row_count: table.height(),
            status,
            checks,
            integrity: None,
        }
    }
}
