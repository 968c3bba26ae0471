//! The unified review schema every source is normalized into.

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    AGE_GROUP, ETHNICITY_NORM, GENDER_NORM, LOG_TOTAL_SPENT, REVIEW_LENGTH, REVIEW_TEXT_TRUNC,
};
use crate::error::Result;
use crate::types::{number_series, text_series, Value};

/// One of the 17 standard fields of the unified schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedField {
    ReviewId,
    CustomerName,
    ReviewDate,
    RatingRaw,
    RatingScale,
    #[serde(rename = "rating_1_5")]
    Rating1To5,
    ReviewText,
    Location,
    RestaurantName,
    TotalSpent,
    TipAmount,
    TipPercentage,
    PartySize,
    AgeRange,
    Gender,
    Ethnicity,
    SourceFile,
}

impl UnifiedField {
    /// Standard fields in output column order
    pub const ALL: [UnifiedField; 17] = [
        UnifiedField::ReviewId,
        UnifiedField::CustomerName,
        UnifiedField::ReviewDate,
        UnifiedField::RatingRaw,
        UnifiedField::RatingScale,
        UnifiedField::Rating1To5,
        UnifiedField::ReviewText,
        UnifiedField::Location,
        UnifiedField::RestaurantName,
        UnifiedField::TotalSpent,
        UnifiedField::TipAmount,
        UnifiedField::TipPercentage,
        UnifiedField::PartySize,
        UnifiedField::AgeRange,
        UnifiedField::Gender,
        UnifiedField::Ethnicity,
        UnifiedField::SourceFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnifiedField::ReviewId => "review_id",
            UnifiedField::CustomerName => "customer_name",
            UnifiedField::ReviewDate => "review_date",
            UnifiedField::RatingRaw => "rating_raw",
            UnifiedField::RatingScale => "rating_scale",
            UnifiedField::Rating1To5 => "rating_1_5",
            UnifiedField::ReviewText => "review_text",
            UnifiedField::Location => "location",
            UnifiedField::RestaurantName => "restaurant_name",
            UnifiedField::TotalSpent => "total_spent",
            UnifiedField::TipAmount => "tip_amount",
            UnifiedField::TipPercentage => "tip_percentage",
            UnifiedField::PartySize => "party_size",
            UnifiedField::AgeRange => "age_range",
            UnifiedField::Gender => "gender",
            UnifiedField::Ethnicity => "ethnicity",
            UnifiedField::SourceFile => "source_file",
        }
    }

    /// Fields stored as Float64 in processed frames
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            UnifiedField::RatingRaw
                | UnifiedField::RatingScale
                | UnifiedField::Rating1To5
                | UnifiedField::TotalSpent
                | UnifiedField::TipAmount
                | UnifiedField::TipPercentage
                | UnifiedField::PartySize
        )
    }

    /// Fields stamped by the loader rather than read from the source
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            UnifiedField::RatingScale | UnifiedField::Rating1To5 | UnifiedField::SourceFile
        )
    }
}

impl fmt::Display for UnifiedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnifiedField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        UnifiedField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown unified field '{}'", s))
    }
}

/// Free-text demographic columns that are mapped onto canonical buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalColumn {
    Gender,
    Ethnicity,
    AgeRange,
}

impl CategoricalColumn {
    pub const ALL: [CategoricalColumn; 3] = [
        CategoricalColumn::Gender,
        CategoricalColumn::Ethnicity,
        CategoricalColumn::AgeRange,
    ];

    pub fn as_str(&self) -> &'static str {
        self.raw_field().as_str()
    }

    pub fn raw_field(&self) -> UnifiedField {
        match self {
            CategoricalColumn::Gender => UnifiedField::Gender,
            CategoricalColumn::Ethnicity => UnifiedField::Ethnicity,
            CategoricalColumn::AgeRange => UnifiedField::AgeRange,
        }
    }

    /// Name of the derived canonical column
    pub fn normalized_column(&self) -> &'static str {
        match self {
            CategoricalColumn::Gender => GENDER_NORM,
            CategoricalColumn::Ethnicity => ETHNICITY_NORM,
            CategoricalColumn::AgeRange => AGE_GROUP,
        }
    }
}

impl fmt::Display for CategoricalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized review row. `None` is the missing marker; every field is
/// always present on the struct so all sources share one shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub review_id: Option<String>,
    pub customer_name: Option<String>,
    pub review_date: Option<NaiveDateTime>,
    pub rating_raw: Option<f64>,
    pub rating_scale: Option<u32>,
    pub rating_1_5: Option<f64>,
    pub review_text: Option<String>,
    pub location: Option<String>,
    pub restaurant_name: Option<String>,
    pub total_spent: Option<f64>,
    pub tip_amount: Option<f64>,
    pub tip_percentage: Option<f64>,
    pub party_size: Option<f64>,
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub ethnicity: Option<String>,
    pub source_file: Option<String>,

    pub gender_norm: Option<String>,
    pub ethnicity_norm: Option<String>,
    pub age_group: Option<String>,
    pub log_total_spent: Option<f64>,
    pub review_length: Option<usize>,
    pub review_text_trunc: Option<String>,
}

impl UnifiedRecord {
    /// Cell for one standard field
    pub fn value(&self, field: UnifiedField) -> Value {
        match field {
            UnifiedField::ReviewId => self.review_id.clone().into(),
            UnifiedField::CustomerName => self.customer_name.clone().into(),
            UnifiedField::ReviewDate => self.review_date.into(),
            UnifiedField::RatingRaw => self.rating_raw.into(),
            UnifiedField::RatingScale => self.rating_scale.map(f64::from).into(),
            UnifiedField::Rating1To5 => self.rating_1_5.into(),
            UnifiedField::ReviewText => self.review_text.clone().into(),
            UnifiedField::Location => self.location.clone().into(),
            UnifiedField::RestaurantName => self.restaurant_name.clone().into(),
            UnifiedField::TotalSpent => self.total_spent.into(),
            UnifiedField::TipAmount => self.tip_amount.into(),
            UnifiedField::TipPercentage => self.tip_percentage.into(),
            UnifiedField::PartySize => self.party_size.into(),
            UnifiedField::AgeRange => self.age_range.clone().into(),
            UnifiedField::Gender => self.gender.clone().into(),
            UnifiedField::Ethnicity => self.ethnicity.clone().into(),
            UnifiedField::SourceFile => self.source_file.clone().into(),
        }
    }

    pub fn is_missing(&self, field: UnifiedField) -> bool {
        self.value(field).is_missing()
    }

    pub fn normalized(&self, column: CategoricalColumn) -> Option<&str> {
        match column {
            CategoricalColumn::Gender => self.gender_norm.as_deref(),
            CategoricalColumn::Ethnicity => self.ethnicity_norm.as_deref(),
            CategoricalColumn::AgeRange => self.age_group.as_deref(),
        }
    }
}

/// Column layout of the normalized output: the standard fields followed by
/// the three canonical categorical columns
pub fn output_columns() -> Vec<String> {
    UnifiedField::ALL
        .iter()
        .map(|f| f.as_str().to_string())
        .chain(
            CategoricalColumn::ALL
                .iter()
                .map(|c| c.normalized_column().to_string()),
        )
        .collect()
}

/// Output layout plus the numeric/text helpers derived during loading
pub fn analytic_columns() -> Vec<String> {
    let mut columns = output_columns();
    columns.extend(
        [LOG_TOTAL_SPENT, REVIEW_LENGTH, REVIEW_TEXT_TRUNC]
            .iter()
            .map(|c| c.to_string()),
    );
    columns
}

/// Whether an output or analytic column holds numbers
pub fn is_numeric_column(name: &str) -> bool {
    match name.parse::<UnifiedField>() {
        Ok(field) => field.is_numeric(),
        Err(_) => name == LOG_TOTAL_SPENT || name == REVIEW_LENGTH,
    }
}

fn output_cells(records: &[UnifiedRecord]) -> Vec<(String, Vec<Value>)> {
    let mut cells: Vec<(String, Vec<Value>)> = UnifiedField::ALL
        .iter()
        .map(|f| {
            let values = records.iter().map(|r| r.value(*f)).collect();
            (f.as_str().to_string(), values)
        })
        .collect();
    for column in CategoricalColumn::ALL {
        let values = records
            .iter()
            .map(|r| r.normalized(column).map(str::to_string).into())
            .collect();
        cells.push((column.normalized_column().to_string(), values));
    }
    cells
}

fn build_frame(cells: Vec<(String, Vec<Value>)>) -> Result<DataFrame> {
    let series = cells
        .iter()
        .map(|(name, values)| {
            if is_numeric_column(name) {
                number_series(name, values)
            } else {
                text_series(name, values)
            }
        })
        .collect();
    Ok(DataFrame::new(series)?)
}

/// Render records as the fixed normalized output frame
pub fn records_to_frame(records: &[UnifiedRecord]) -> Result<DataFrame> {
    build_frame(output_cells(records))
}

/// Render records with the derived helper columns kept
pub fn records_to_analytic_frame(records: &[UnifiedRecord]) -> Result<DataFrame> {
    let mut cells = output_cells(records);
    cells.push((
        LOG_TOTAL_SPENT.to_string(),
        records.iter().map(|r| r.log_total_spent.into()).collect(),
    ));
    cells.push((
        REVIEW_LENGTH.to_string(),
        records
            .iter()
            .map(|r| r.review_length.map(|l| l as f64).into())
            .collect(),
    ));
    cells.push((
        REVIEW_TEXT_TRUNC.to_string(),
        records.iter().map(|r| r.review_text_trunc.clone().into()).collect(),
    ));
    build_frame(cells)
}
