use once_cell::sync::Lazy;
use polars::prelude::DataFrame;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::constants::DEFAULT_SYNONYMS;
use crate::domain::UnifiedField;
use crate::error::{EtlError, Result};
use crate::types::{column_names, rename_columns};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Trim, lowercase and collapse whitespace runs to a single underscore
pub fn normalize_column_name(name: &str) -> String {
    WHITESPACE_RUN
        .replace_all(&name.trim().to_lowercase(), "_")
        .into_owned()
}

/// Recognized raw header aliases per unified field.
///
/// Aliases are stored normalized and kept in declared order; the order is
/// the match priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymTable {
    entries: Vec<(UnifiedField, Vec<String>)>,
}

impl SynonymTable {
    pub fn new(entries: Vec<(UnifiedField, Vec<String>)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(field, aliases)| {
                let aliases = aliases.iter().map(|a| normalize_column_name(a)).collect();
                (field, aliases)
            })
            .collect();
        Self { entries }
    }

    /// Replace the alias lists of the fields named in `overrides`. Fields not
    /// yet in the table are appended after the existing ones.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut entries = self.entries.clone();
        for (name, aliases) in overrides {
            let field: UnifiedField = name.parse().map_err(EtlError::Config)?;
            if field.is_derived() {
                return Err(EtlError::Config(format!(
                    "field '{}' is derived and cannot be mapped from a source column",
                    field
                )));
            }
            let aliases: Vec<String> = aliases.iter().map(|a| normalize_column_name(a)).collect();
            match entries.iter_mut().find(|(f, _)| *f == field) {
                Some(entry) => entry.1 = aliases,
                None => entries.push((field, aliases)),
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(UnifiedField, Vec<String>)] {
        &self.entries
    }

    pub fn aliases(&self, field: UnifiedField) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, a)| a.as_slice())
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        let entries = DEFAULT_SYNONYMS
            .iter()
            .filter_map(|(name, aliases)| {
                let field = name.parse::<UnifiedField>().ok()?;
                Some((field, aliases.iter().map(|a| a.to_string()).collect()))
            })
            .collect();
        Self::new(entries)
    }
}

/// One resolved column: which raw header feeds which unified field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedColumn {
    pub field: UnifiedField,
    /// Normalized raw header name
    pub raw_name: String,
    /// Position of the raw column in the source table
    pub index: usize,
}

/// Mapping unified field -> actual raw column for one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: Vec<ResolvedColumn>,
}

impl ColumnMapping {
    pub fn get(&self, field: UnifiedField) -> Option<&ResolvedColumn> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn contains(&self, field: UnifiedField) -> bool {
        self.get(field).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedColumn> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Maps raw source headers onto the unified schema
#[derive(Debug, Clone, Default)]
pub struct ColumnResolver {
    synonyms: SynonymTable,
}

impl ColumnResolver {
    pub fn new(synonyms: SynonymTable) -> Self {
        Self { synonyms }
    }

    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    /// Resolve raw headers. For each unified field the aliases are tried in
    /// declared order and the first one present wins; later aliases are not
    /// consulted. When two raw headers normalize to the same name the first
    /// one is used.
    pub fn resolve<S: AsRef<str>>(&self, raw_columns: &[S]) -> ColumnMapping {
        let normalized: Vec<String> = raw_columns
            .iter()
            .map(|c| normalize_column_name(c.as_ref()))
            .collect();

        let columns = self
            .synonyms
            .entries()
            .iter()
            .filter_map(|(field, aliases)| {
                aliases.iter().find_map(|alias| {
                    normalized
                        .iter()
                        .position(|n| n == alias)
                        .map(|index| ResolvedColumn {
                            field: *field,
                            raw_name: alias.clone(),
                            index,
                        })
                })
            })
            .collect();

        ColumnMapping { columns }
    }

    /// Copy of `frame` whose resolved headers carry unified names and whose
    /// remaining headers are normalized. Cells are untouched. A normalized
    /// header that collides with a name already taken gets a `.N` suffix.
    pub fn relabel(&self, frame: &DataFrame) -> Result<DataFrame> {
        let mapping = self.resolve(&column_names(frame));
        let mut taken: HashSet<String> = mapping
            .iter()
            .map(|c| c.field.as_str().to_string())
            .collect();
        let mut position = 0usize;
        rename_columns(frame, |name| {
            let idx = position;
            position += 1;
            if let Some(resolved) = mapping.iter().find(|c| c.index == idx) {
                return resolved.field.as_str().to_string();
            }
            let base = normalize_column_name(name);
            let mut candidate = base.clone();
            let mut n = 1;
            while !taken.insert(candidate.clone()) {
                candidate = format!("{}.{}", base, n);
                n += 1;
            }
            candidate
        })
    }
}
