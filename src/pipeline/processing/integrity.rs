use polars::prelude::{col, DataFrame, IntoLazy, PolarsResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::domain::UnifiedField;
use crate::types::{column_values, distinct_count, has_column, missingness, Value};

/// Pipeline stage a table snapshot was taken at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Raw,
    Processed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Raw => f.write_str("raw"),
            Stage::Processed => f.write_str("processed"),
        }
    }
}

/// Review counts for one restaurant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantBreakdown {
    pub restaurant_name: String,
    pub reviews: usize,
    pub unique_customers: usize,
    /// Share of all rows in the table, rounded to 2 decimals
    pub reviews_pct: f64,
}

/// Descriptive summary of one table snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub stage: Stage,
    pub total_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_reviews: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_reviews: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_customers: Option<usize>,
    /// Missing fraction per column; columns with no missing cells are left out
    pub missingness_pct: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_restaurant: Option<Vec<RestaurantBreakdown>>,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Summarize `df` at `stage`. Expects unified column names; a raw frame
/// should be relabeled through the column resolver first.
pub fn integrity_report(df: &DataFrame, stage: Stage) -> IntegrityReport {
    let review_id = UnifiedField::ReviewId.as_str();
    let customer = UnifiedField::CustomerName.as_str();
    let restaurant = UnifiedField::RestaurantName.as_str();

    let unique_reviews = distinct_count(df, review_id);
    let duplicate_reviews = unique_reviews.map(|u| df.height().saturating_sub(u));

    let missingness_pct = missingness(df)
        .into_iter()
        .filter(|(_, fraction)| *fraction > 0.0)
        .collect();

    let by_restaurant = if has_column(df, restaurant) && has_column(df, review_id) {
        match restaurant_breakdown(df) {
            Ok(groups) => Some(groups),
            Err(e) => {
                warn!("Restaurant breakdown skipped for {} frame: {}", stage, e);
                None
            }
        }
    } else {
        None
    };

    IntegrityReport {
        stage,
        total_rows: df.height(),
        unique_reviews,
        duplicate_reviews,
        unique_customers: distinct_count(df, customer),
        missingness_pct,
        by_restaurant,
    }
}

/// Per-restaurant counts. `reviews` counts rows with a review id; rows
/// without a restaurant name are not grouped.
fn restaurant_breakdown(df: &DataFrame) -> PolarsResult<Vec<RestaurantBreakdown>> {
    let restaurant = UnifiedField::RestaurantName.as_str();
    let customer = UnifiedField::CustomerName.as_str();

    let mut aggs = vec![col(UnifiedField::ReviewId.as_str()).count().alias("reviews")];
    if has_column(df, customer) {
        aggs.push(col(customer).drop_nulls().n_unique().alias("unique_customers"));
    }
    let grouped = df
        .clone()
        .lazy()
        .filter(col(restaurant).is_not_null())
        .group_by([col(restaurant)])
        .agg(aggs)
        .collect()?;

    let names = column_values(&grouped, restaurant).unwrap_or_default();
    let reviews = column_values(&grouped, "reviews").unwrap_or_default();
    let customers = column_values(&grouped, "unique_customers").unwrap_or_default();
    let count = |values: &[Value], row: usize| {
        values.get(row).and_then(Value::as_f64).unwrap_or(0.0) as usize
    };

    let total = df.height();
    let mut groups: Vec<RestaurantBreakdown> = names
        .iter()
        .enumerate()
        .filter_map(|(row, name)| {
            let review_count = count(&reviews, row);
            Some(RestaurantBreakdown {
                restaurant_name: name.key()?,
                reviews: review_count,
                unique_customers: count(&customers, row),
                reviews_pct: if total == 0 {
                    0.0
                } else {
                    round2(review_count as f64 / total as f64 * 100.0)
                },
            })
        })
        .collect();
    groups.sort_by(|a, b| a.restaurant_name.cmp(&b.restaurant_name));
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::df;

    fn reviews() -> DataFrame {
        df!(
            "review_id" => &[Some("1"), Some("2"), Some("2"), None],
            "customer_name" => &[Some("ann"), Some("bob"), Some("ann"), Some("dan")],
            "restaurant_name" => &[Some("Luigi's"), Some("Luigi's"), Some("Thai Palace"), Some("Luigi's")],
            "review_text" => &[Some("good"), None, Some("fine"), Some("ok")]
        )
        .unwrap()
    }

    #[test]
    fn test_counts_and_missingness() {
        let report = integrity_report(&reviews(), Stage::Processed);
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.unique_reviews, Some(2));
        assert_eq!(report.duplicate_reviews, Some(2));
        assert_eq!(report.unique_customers, Some(3));
        assert_eq!(report.missingness_pct.len(), 2);
        assert_eq!(report.missingness_pct["review_text"], 0.25);
        assert_eq!(report.missingness_pct["review_id"], 0.25);
    }

    #[test]
    fn test_restaurant_breakdown() {
        let report = integrity_report(&reviews(), Stage::Raw);
        let groups = report.by_restaurant.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].restaurant_name, "Luigi's");
        assert_eq!(groups[0].unique_customers, 3);
        assert_eq!(groups[1].restaurant_name, "Thai Palace");
        assert_eq!(groups[1].reviews, 1);
        assert_eq!(groups[1].reviews_pct, 25.0);
    }

    #[test]
    fn test_breakdown_counts_only_rows_with_review_id() {
        let report = integrity_report(&reviews(), Stage::Processed);
        let luigis = &report.by_restaurant.unwrap()[0];
        // three Luigi's rows, one without an id
        assert_eq!(luigis.reviews, 2);
        assert_eq!(luigis.reviews_pct, 50.0);
    }

    #[test]
    fn test_rows_without_restaurant_are_not_grouped() {
        let frame = df!(
            "review_id" => &[Some("1"), Some("2")],
            "restaurant_name" => &[Some("Luigi's"), None]
        )
        .unwrap();
        let groups = integrity_report(&frame, Stage::Raw).by_restaurant.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].reviews_pct, 50.0);
        assert_eq!(groups[0].unique_customers, 0);
    }

    #[test]
    fn test_optional_sections_absent_without_columns() {
        let frame = df!("comments" => &["x"]).unwrap();
        let report = integrity_report(&frame, Stage::Raw);
        assert_eq!(report.unique_reviews, None);
        assert!(report.by_restaurant.is_none());
        assert!(report.missingness_pct.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stage"], "raw");
        assert!(json.get("unique_reviews").is_none());
    }

    #[test]
    fn test_empty_frame() {
        let empty = df!(
            "review_id" => Vec::<Option<String>>::new(),
            "restaurant_name" => Vec::<Option<String>>::new()
        )
        .unwrap();
        let report = integrity_report(&empty, Stage::Processed);
        assert_eq!(report.total_rows, 0);
        assert_eq!(report.by_restaurant, Some(vec![]));
    }
}
