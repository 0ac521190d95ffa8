use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::table::{EmissionFactorEntry, FactorTable, FactorUnit};

const BUILTIN_TABLE: &str = include_str!("default_table.toml");

#[derive(Debug, Error)]
pub enum TableError {
    #[error("could not read factor table `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse factor table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("factor table has no version")]
    MissingVersion,
    #[error("factor table contains an entry with an empty category key")]
    EmptyKey,
    #[error("factor for `{key}` must be a positive finite number, got {value}")]
    NonPositiveFactor { key: String, value: f64 },
    #[error("factor `{key}` has no source citation")]
    MissingCitation { key: String },
    #[error("factor table defines `{key}` more than once")]
    DuplicateKey { key: String },
    #[error("factor table is missing required fuel entry `{key}`")]
    MissingFuelEntry { key: String },
}

#[derive(Debug, Deserialize)]
struct TableDocument {
    version: String,
    #[serde(default, rename = "factor")]
    factors: Vec<FactorRow>,
}

#[derive(Debug, Deserialize)]
struct FactorRow {
    key: String,
    value: f64,
    unit: FactorUnit,
    source: String,
}

impl FactorTable {
    /// The table embedded at build time.
    pub fn builtin() -> Result<Self, TableError> {
        Self::from_toml_str(BUILTIN_TABLE)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, TableError> {
        let document = toml::from_str::<TableDocument>(raw)?;
        let entries = document
            .factors
            .into_iter()
            .map(|row| EmissionFactorEntry {
                category_key: row.key,
                factor_value: row.value,
                unit: row.unit,
                source_citation: row.source,
            })
            .collect();

        Self::new(document.version, entries)
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| TableError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    /// Loads `path` when given, the built-in table otherwise.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, TableError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }
}
