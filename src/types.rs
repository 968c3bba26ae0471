use chrono::NaiveDateTime;
use polars::prelude::{AnyValue, DataFrame, NamedFrom, Series};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EtlError, Result};

/// Timestamp layout used when a date cell is rendered as text
pub const DATE_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single cell of a tabular snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Explicit missing marker; serialized as `null`
    #[default]
    Missing,
    Number(f64),
    Date(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the cell. Text cells are parsed leniently.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Textual view of the cell, `None` when missing
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Missing => None,
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// Hashable identity used for distinct counts and grouping
    pub fn key(&self) -> Option<String> {
        self.as_text().map(Cow::into_owned)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Date(d) => write!(f, "{}", d.format(DATE_DISPLAY_FORMAT)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map(Value::Text).unwrap_or(Value::Missing)
    }
}

impl From<Option<&str>> for Value {
    fn from(v: Option<&str>) -> Self {
        v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Missing)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map(Value::Number).unwrap_or(Value::Missing)
    }
}

impl From<Option<NaiveDateTime>> for Value {
    fn from(v: Option<NaiveDateTime>) -> Self {
        v.map(Value::Date).unwrap_or(Value::Missing)
    }
}

impl From<AnyValue<'_>> for Value {
    fn from(v: AnyValue<'_>) -> Self {
        match v {
            AnyValue::Null => Value::Missing,
            AnyValue::String(s) => Value::Text(s.to_string()),
            AnyValue::StringOwned(s) => Value::Text(s.to_string()),
            other => match other.extract::<f64>() {
                Some(n) => Value::Number(n),
                None => Value::Text(other.to_string()),
            },
        }
    }
}

// Helpers over polars frames. Snapshots are treated as values: every
// transformation returns a new frame and leaves its input untouched.

/// Utf8 column; missing cells become nulls, dates are rendered as text
pub fn text_series(name: &str, values: &[Value]) -> Series {
    let cells: Vec<Option<String>> = values.iter().map(Value::key).collect();
    Series::new(name, cells)
}

/// Float64 column; cells without a numeric reading become nulls
pub fn number_series(name: &str, values: &[Value]) -> Series {
    let cells: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
    Series::new(name, cells)
}

/// Build a frame from row-major cells. Columns whose present cells are all
/// numbers become Float64, the rest Utf8.
pub fn frame_from_rows(columns: &[&str], rows: &[Vec<Value>]) -> Result<DataFrame> {
    let series = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values: Vec<Value> = rows
                .iter()
                .map(|row| row.get(i).cloned().unwrap_or_default())
                .collect();
            let numeric = values.iter().any(|v| matches!(v, Value::Number(_)))
                && values
                    .iter()
                    .all(|v| matches!(v, Value::Number(_) | Value::Missing));
            if numeric {
                number_series(name, &values)
            } else {
                text_series(name, &values)
            }
        })
        .collect();
    Ok(DataFrame::new(series)?)
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|n| n.to_string()).collect()
}

/// Cells of one series in row order
pub fn series_values(series: &Series) -> Vec<Value> {
    (0..series.len())
        .map(|i| series.get(i).map(Value::from).unwrap_or_default())
        .collect()
}

/// Cells of column `name`, `None` when the column is absent
pub fn column_values(df: &DataFrame, name: &str) -> Option<Vec<Value>> {
    df.column(name).ok().map(series_values)
}

/// Cell lookup by row position and column name
pub fn cell(df: &DataFrame, row: usize, name: &str) -> Option<Value> {
    let series = df.column(name).ok()?;
    if row >= series.len() {
        return None;
    }
    series.get(row).ok().map(Value::from)
}

/// Fraction of null cells in `name`. An empty frame has no missingness.
pub fn missing_fraction(df: &DataFrame, name: &str) -> Option<f64> {
    let series = df.column(name).ok()?;
    if df.height() == 0 {
        return Some(0.0);
    }
    Some(series.null_count() as f64 / df.height() as f64)
}

/// Missing fraction for every column
pub fn missingness(df: &DataFrame) -> BTreeMap<String, f64> {
    df.get_columns()
        .iter()
        .filter_map(|s| missing_fraction(df, s.name()).map(|f| (s.name().to_string(), f)))
        .collect()
}

/// Number of distinct non-null values in `name`
pub fn distinct_count(df: &DataFrame, name: &str) -> Option<usize> {
    let series = df.column(name).ok()?;
    series.drop_nulls().n_unique().ok()
}

/// Copy of `df` with every header passed through `rename`
pub fn rename_columns<F>(df: &DataFrame, rename: F) -> Result<DataFrame>
where
    F: FnMut(&str) -> String,
{
    let names: Vec<String> = df.get_column_names().into_iter().map(rename).collect();
    let mut out = df.clone();
    out.set_column_names(&names)?;
    Ok(out)
}

/// Stack frames with identical column layouts
pub fn concat_frames(frames: &[DataFrame]) -> Result<DataFrame> {
    let Some((first, rest)) = frames.split_first() else {
        return Ok(DataFrame::default());
    };
    let mut out = first.clone();
    for frame in rest {
        if frame.get_column_names() != out.get_column_names() {
            return Err(EtlError::SchemaMismatch(format!(
                "cannot concatenate frames with columns {:?} and {:?}",
                out.get_column_names(),
                frame.get_column_names()
            )));
        }
        out.vstack_mut(frame)?;
    }
    Ok(out)
}
