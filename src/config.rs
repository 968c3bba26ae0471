use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::domain::CategoricalColumn;
use crate::error::{EtlError, Result};
use crate::pipeline::processing::categorical::CategoryMaps;
use crate::pipeline::processing::loader::LoaderConfig;
use crate::pipeline::processing::resolve::SynonymTable;
use crate::pipeline::processing::validation::ValidationConfig;

/// Runtime configuration read from a TOML file. Every section is optional.
///
/// ```toml
/// [loader]
/// tip_percentage_cap = 25.0
///
/// [validation]
/// strict_coercion = true
///
/// [synonyms]
/// review_text = ["review_text", "notes"]
///
/// [categories.gender]
/// woman = "female"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub loader: LoaderConfig,
    pub validation: ValidationConfig,
    /// Alias lists replacing the defaults of the named fields
    pub synonyms: BTreeMap<String, Vec<String>>,
    pub categories: CategoryOverrides,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoryOverrides {
    pub gender: Option<BTreeMap<String, String>>,
    pub ethnicity: Option<BTreeMap<String, String>>,
    pub age_range: Option<BTreeMap<String, String>>,
}

impl EtlConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EtlConfig = toml::from_str(content)?;
        // Surface bad field names at load time rather than first use
        config.synonym_table()?;
        Ok(config)
    }

    /// Default synonyms with the configured overrides applied
    pub fn synonym_table(&self) -> Result<SynonymTable> {
        SynonymTable::default().with_overrides(&self.synonyms)
    }

    pub fn category_maps(&self) -> CategoryMaps {
        let mut maps = CategoryMaps::default();
        for (column, table) in [
            (CategoricalColumn::Gender, &self.categories.gender),
            (CategoricalColumn::Ethnicity, &self.categories.ethnicity),
            (CategoricalColumn::AgeRange, &self.categories.age_range),
        ] {
            if let Some(table) = table {
                maps = maps.with_column(column, table);
            }
        }
        maps
    }

    /// Validation thresholds with the tip cap and review length limit taken
    /// from the loader section, so the checks match what the loader produces
    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            tip_percentage_max: self.loader.tip_percentage_cap,
            review_length_max: self.loader.max_review_length,
            ..self.validation.clone()
        }
    }
}
