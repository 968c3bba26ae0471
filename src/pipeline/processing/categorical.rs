use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{DEFAULT_AGE_RANGE_MAP, DEFAULT_ETHNICITY_MAP, DEFAULT_GENDER_MAP};
use crate::domain::CategoricalColumn;

/// Canonical bucket lookup tables for the demographic columns.
/// Keys are stored lowercased and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMaps {
    pub gender: BTreeMap<String, String>,
    pub ethnicity: BTreeMap<String, String>,
    pub age_range: BTreeMap<String, String>,
}

fn build_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for CategoryMaps {
    fn default() -> Self {
        Self {
            gender: build_map(DEFAULT_GENDER_MAP),
            ethnicity: build_map(DEFAULT_ETHNICITY_MAP),
            age_range: build_map(DEFAULT_AGE_RANGE_MAP),
        }
    }
}

impl CategoryMaps {
    pub fn get(&self, column: CategoricalColumn) -> &BTreeMap<String, String> {
        match column {
            CategoricalColumn::Gender => &self.gender,
            CategoricalColumn::Ethnicity => &self.ethnicity,
            CategoricalColumn::AgeRange => &self.age_range,
        }
    }

    /// Replace the table for one column, normalizing its keys
    pub fn with_column(mut self, column: CategoricalColumn, map: &BTreeMap<String, String>) -> Self {
        let normalized = map
            .iter()
            .map(|(k, v)| (normalize_category(k), v.clone()))
            .collect();
        match column {
            CategoricalColumn::Gender => self.gender = normalized,
            CategoricalColumn::Ethnicity => self.ethnicity = normalized,
            CategoricalColumn::AgeRange => self.age_range = normalized,
        }
        self
    }
}

pub fn normalize_category(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Result of mapping one raw categorical value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryValue {
    /// Lowercased, trimmed raw value
    pub raw: String,
    /// Canonical bucket, or the raw value itself when unmapped
    pub canonical: String,
    pub mapped: bool,
}

/// Maps free-text demographic values onto canonical buckets
#[derive(Debug, Clone, Default)]
pub struct CategoricalNormalizer {
    maps: CategoryMaps,
}

impl CategoricalNormalizer {
    pub fn new(maps: CategoryMaps) -> Self {
        Self { maps }
    }

    pub fn maps(&self) -> &CategoryMaps {
        &self.maps
    }

    /// Map one value. Blank values are treated as missing; unmapped values
    /// fall back to themselves.
    pub fn normalize(&self, column: CategoricalColumn, raw: Option<&str>) -> Option<CategoryValue> {
        let raw = normalize_category(raw?);
        if raw.is_empty() {
            return None;
        }
        let value = match self.maps.get(column).get(&raw) {
            Some(canonical) => CategoryValue {
                canonical: canonical.clone(),
                raw,
                mapped: true,
            },
            None => CategoryValue {
                canonical: raw.clone(),
                raw,
                mapped: false,
            },
        };
        Some(value)
    }

    /// Whether a present value has no canonical bucket
    pub fn is_unmapped(&self, column: CategoricalColumn, raw: &str) -> bool {
        let key = normalize_category(raw);
        !key.is_empty() && !self.maps.get(column).contains_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values_map_to_buckets() {
        let normalizer = CategoricalNormalizer::default();
        let v = normalizer
            .normalize(CategoricalColumn::Gender, Some("  M "))
            .unwrap();
        assert_eq!(v.raw, "m");
        assert_eq!(v.canonical, "male");
        assert!(v.mapped);

        let v = normalizer
            .normalize(CategoricalColumn::Ethnicity, Some("White"))
            .unwrap();
        assert_eq!(v.canonical, "caucasian");

        let v = normalizer
            .normalize(CategoricalColumn::AgeRange, Some("18-25"))
            .unwrap();
        assert_eq!(v.canonical, "young_adult");
    }

    #[test]
    fn test_unmapped_value_passes_through() {
        let normalizer = CategoricalNormalizer::default();
        let v = normalizer
            .normalize(CategoricalColumn::Gender, Some("Unspecified"))
            .unwrap();
        assert_eq!(v.canonical, "unspecified");
        assert!(!v.mapped);
        assert!(normalizer.is_unmapped(CategoricalColumn::Gender, "unspecified"));
        assert!(!normalizer.is_unmapped(CategoricalColumn::Gender, "Female"));
    }

    #[test]
    fn test_blank_is_missing() {
        let normalizer = CategoricalNormalizer::default();
        assert_eq!(normalizer.normalize(CategoricalColumn::Gender, Some("   ")), None);
        assert_eq!(normalizer.normalize(CategoricalColumn::Gender, None), None);
    }

    #[test]
    fn test_override_table_keys_are_normalized() {
        let mut custom = BTreeMap::new();
        custom.insert(" Woman ".to_string(), "female".to_string());
        let maps = CategoryMaps::default().with_column(CategoricalColumn::Gender, &custom);
        let normalizer = CategoricalNormalizer::new(maps);
        let v = normalizer
            .normalize(CategoricalColumn::Gender, Some("WOMAN"))
            .unwrap();
        assert_eq!(v.canonical, "female");
        assert!(normalizer.is_unmapped(CategoricalColumn::Gender, "m"));
    }
}
