//! Post-load enrichment of the combined review frame: restaurant metadata
//! join and demographic bias summaries.

use polars::prelude::{
    col, len, DataFrame, IntoLazy, JoinArgs, JoinType, PolarsResult, SortMultipleOptions,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::constants::{AGE_GROUP, AVG_STARS, ETHNICITY_NORM, GENDER_NORM, TOTAL_REVIEWS};
use crate::domain::UnifiedField;
use crate::error::Result;
use crate::pipeline::processing::coerce;
use crate::pipeline::processing::integrity::round2;
use crate::pipeline::processing::resolve::normalize_column_name;
use crate::types::{
    column_values, has_column, missing_fraction, number_series, rename_columns, text_series,
    Value,
};

/// Normalized columns summarized for bias review, in report order
pub const BIAS_COLUMNS: [&str; 3] = [GENDER_NORM, AGE_GROUP, ETHNICITY_NORM];

/// Key under which missing values are counted
pub const MISSING_BUCKET: &str = "NA";

const ROW_INDEX: &str = "__row";

/// Left-join `avg_stars` and `total_reviews` onto `reviews` by
/// `restaurant_name`. The first metadata row per name wins; unmatched
/// reviews get missing values. Reviews come back unchanged when either side
/// lacks a `restaurant_name` column.
pub fn join_restaurant_info(reviews: &DataFrame, info: &DataFrame) -> Result<DataFrame> {
    let name_col = UnifiedField::RestaurantName.as_str();
    if !has_column(reviews, name_col) {
        return Ok(reviews.clone());
    }

    let info = rename_columns(info, normalize_column_name)?;
    let Some(names) = column_values(&info, name_col) else {
        warn!(
            "Restaurant metadata has no {} column; skipping metadata join",
            name_col
        );
        return Ok(reviews.clone());
    };
    let numeric = |column: &str| -> Vec<Value> {
        match column_values(&info, column) {
            Some(cells) => cells.iter().map(|v| coerce::parse_number(v).into()).collect(),
            None => vec![Value::Missing; names.len()],
        }
    };
    let lookup = DataFrame::new(vec![
        text_series(name_col, &names),
        number_series(AVG_STARS, &numeric(AVG_STARS)),
        number_series(TOTAL_REVIEWS, &numeric(TOTAL_REVIEWS)),
    ])?
    .lazy()
    .filter(col(name_col).is_not_null())
    .group_by_stable([col(name_col)])
    .agg([col(AVG_STARS).first(), col(TOTAL_REVIEWS).first()]);

    let joined = reviews
        .clone()
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(
            lookup,
            [col(name_col)],
            [col(name_col)],
            JoinArgs::new(JoinType::Left),
        )
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .drop([ROW_INDEX])
        .collect()?;

    info!(
        "Joined restaurant metadata onto {} reviews; columns added: {}, {}",
        joined.height(),
        AVG_STARS,
        TOTAL_REVIEWS
    );
    Ok(joined)
}

/// Value distribution of one demographic column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBias {
    /// Value -> row count; missing cells are counted under `NA`
    pub counts: BTreeMap<String, usize>,
    /// Percentage of missing cells, rounded to 2 decimals
    pub missing_pct: f64,
}

pub type BiasSummary = BTreeMap<String, ColumnBias>;

/// Row count per value of `column`, nulls under [`MISSING_BUCKET`]
fn value_counts(df: &DataFrame, column: &str) -> PolarsResult<BTreeMap<String, usize>> {
    let grouped = df
        .clone()
        .lazy()
        .group_by([col(column)])
        .agg([len().alias("count")])
        .collect()?;
    let keys = column_values(&grouped, column).unwrap_or_default();
    let counts = column_values(&grouped, "count").unwrap_or_default();
    let mut out = BTreeMap::new();
    for (key, count) in keys.iter().zip(counts.iter()) {
        let key = key.key().unwrap_or_else(|| MISSING_BUCKET.to_string());
        *out.entry(key).or_default() += count.as_f64().unwrap_or(0.0) as usize;
    }
    Ok(out)
}

/// Counts and missingness for each bias column present in `df`
pub fn bias_summary(df: &DataFrame) -> BiasSummary {
    BIAS_COLUMNS
        .iter()
        .filter(|column| has_column(df, column))
        .filter_map(|column| {
            let counts = value_counts(df, column)
                .map_err(|e| warn!("Bias counts skipped for {}: {}", column, e))
                .ok()?;
            let missing = missing_fraction(df, column).unwrap_or(0.0);
            Some((
                column.to_string(),
                ColumnBias {
                    counts,
                    missing_pct: round2(missing * 100.0),
                },
            ))
        })
        .collect()
}

/// Log row count plus the five most frequent values and the missing share
/// of each bias column
pub fn log_dataset_summary(df: &DataFrame) {
    info!("=== Final Dataset Summary ===");
    info!("Total rows: {}", df.height());

    for column in BIAS_COLUMNS {
        if !has_column(df, column) {
            continue;
        }
        let Ok(counts) = value_counts(df, column) else {
            continue;
        };
        let mut top: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(key, _)| key != MISSING_BUCKET)
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(5);

        let missing = missing_fraction(df, column).unwrap_or(0.0);
        info!(
            "{} -> top categories: {:?} | missing: {:.1}%",
            column,
            top,
            missing * 100.0
        );
    }
    info!("=============================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{cell, column_names, frame_from_rows};

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn reviews() -> DataFrame {
        frame_from_rows(
            &["review_id", "restaurant_name", "gender_norm"],
            &[
                vec![text("1"), text("Luigi's"), text("female")],
                vec![text("2"), text("Thai Palace"), text("male")],
                vec![text("3"), Value::Missing, text("female")],
                vec![text("4"), text("Nowhere"), Value::Missing],
                vec![text("5"), text("Luigi's"), text("male")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_join_first_row_wins_and_misses_are_missing() {
        let info = frame_from_rows(
            &["Restaurant Name", "Avg Stars", "Total Reviews"],
            &[
                vec![text("Luigi's"), text("4.5"), text("120")],
                vec![text("Luigi's"), text("1.0"), text("3")],
                vec![text("Thai Palace"), text("3.9"), text("n/a?")],
            ],
        )
        .unwrap();
        let joined = join_restaurant_info(&reviews(), &info).unwrap();
        assert_eq!(joined.height(), 5);
        assert_eq!(
            column_names(&joined),
            vec!["review_id", "restaurant_name", "gender_norm", "avg_stars", "total_reviews"]
        );
        assert_eq!(cell(&joined, 0, "avg_stars"), Some(Value::Number(4.5)));
        assert_eq!(cell(&joined, 0, "total_reviews"), Some(Value::Number(120.0)));
        assert_eq!(cell(&joined, 1, "avg_stars"), Some(Value::Number(3.9)));
        assert_eq!(cell(&joined, 1, "total_reviews"), Some(Value::Missing));
        assert_eq!(cell(&joined, 2, "avg_stars"), Some(Value::Missing));
        assert_eq!(cell(&joined, 3, "avg_stars"), Some(Value::Missing));
        assert_eq!(cell(&joined, 4, "avg_stars"), Some(Value::Number(4.5)));
    }

    #[test]
    fn test_join_keeps_review_order() {
        let info = frame_from_rows(
            &["restaurant_name", "avg_stars", "total_reviews"],
            &[
                vec![text("Thai Palace"), Value::Number(3.9), Value::Number(80.0)],
                vec![text("Luigi's"), Value::Number(4.5), Value::Number(120.0)],
            ],
        )
        .unwrap();
        let joined = join_restaurant_info(&reviews(), &info).unwrap();
        let ids: Vec<Value> = column_values(&joined, "review_id").unwrap();
        assert_eq!(ids, ["1", "2", "3", "4", "5"].map(text).to_vec());
    }

    #[test]
    fn test_metadata_without_names_skips_join() {
        let info = frame_from_rows(&["Name", "Avg Stars"], &[vec![text("Luigi's"), text("4")]])
            .unwrap();
        let joined = join_restaurant_info(&reviews(), &info).unwrap();
        assert!(joined.equals_missing(&reviews()));

        let no_names = frame_from_rows(&["review_id"], &[vec![text("1")]]).unwrap();
        assert!(join_restaurant_info(&no_names, &info)
            .unwrap()
            .equals_missing(&no_names));
    }

    #[test]
    fn test_bias_summary_counts_missing() {
        let summary = bias_summary(&reviews());
        assert_eq!(summary.len(), 1);
        let gender = &summary["gender_norm"];
        assert_eq!(gender.counts["female"], 2);
        assert_eq!(gender.counts["male"], 2);
        assert_eq!(gender.counts[MISSING_BUCKET], 1);
        assert_eq!(gender.missing_pct, 20.0);
    }
}
