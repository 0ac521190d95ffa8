use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{loader::TableError, normalize_key};
use crate::domain::activity::{ActivityKind, FuelKind, FuelQuantityBasis};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorUnit {
    PerKgKm,
    PerKwh,
    PerLiter,
    PerKg,
}

impl FactorUnit {
    pub fn activity_kind(&self) -> ActivityKind {
        match self {
            Self::PerKgKm => ActivityKind::Logistics,
            Self::PerKwh => ActivityKind::Electricity,
            Self::PerLiter | Self::PerKg => ActivityKind::Fuel,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerKgKm => "per_kg_km",
            Self::PerKwh => "per_kwh",
            Self::PerLiter => "per_liter",
            Self::PerKg => "per_kg",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PerKgKm => "kgCO2e/kg-km",
            Self::PerKwh => "kgCO2e/kWh",
            Self::PerLiter => "kgCO2e/L",
            Self::PerKg => "kgCO2e/kg",
        }
    }
}

impl fmt::Display for FactorUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactorEntry {
    pub category_key: String,
    pub factor_value: f64,
    pub unit: FactorUnit,
    pub source_citation: String,
}

impl EmissionFactorEntry {
    pub fn activity_kind(&self) -> ActivityKind {
        self.unit.activity_kind()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FactorTable {
    version: String,
    fingerprint: String,
    entries: BTreeMap<String, EmissionFactorEntry>,
}

impl FactorTable {
    /// Builds a validated table. Keys are stored normalized.
    pub fn new(
        version: impl Into<String>,
        entries: Vec<EmissionFactorEntry>,
    ) -> Result<Self, TableError> {
        let version = version.into().trim().to_string();
        if version.is_empty() {
            return Err(TableError::MissingVersion);
        }

        let mut by_key = BTreeMap::new();
        for mut entry in entries {
            let key = normalize_key(&entry.category_key);
            if key.is_empty() {
                return Err(TableError::EmptyKey);
            }
            if !entry.factor_value.is_finite() || entry.factor_value <= 0.0 {
                return Err(TableError::NonPositiveFactor { key, value: entry.factor_value });
            }
            if entry.source_citation.trim().is_empty() {
                return Err(TableError::MissingCitation { key });
            }

            entry.category_key = key.clone();
            if by_key.insert(key.clone(), entry).is_some() {
                return Err(TableError::DuplicateKey { key });
            }
        }

        for basis in [FuelQuantityBasis::Liters, FuelQuantityBasis::Kilograms] {
            for fuel in FuelKind::ALL {
                let key = fuel.category_key(basis);
                let present = by_key
                    .get(&key)
                    .map(|entry| entry.activity_kind() == ActivityKind::Fuel)
                    .unwrap_or(false);
                if !present {
                    return Err(TableError::MissingFuelEntry { key });
                }
            }
        }

        let fingerprint = fingerprint(&version, &by_key);
        Ok(Self { version, fingerprint, entries: by_key })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Content hash; differs whenever any entry differs, even under a reused version.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, category_key: &str) -> Option<&EmissionFactorEntry> {
        self.entries.get(&normalize_key(category_key))
    }

    /// Lookup restricted to one activity kind; a key of another kind is a miss.
    pub fn lookup_for(
        &self,
        kind: ActivityKind,
        category_key: &str,
    ) -> Option<&EmissionFactorEntry> {
        self.lookup(category_key).filter(|entry| entry.activity_kind() == kind)
    }

    pub fn list_categories(&self, kind_filter: Option<ActivityKind>) -> Vec<&str> {
        self.entries
            .values()
            .filter(|entry| kind_filter.map_or(true, |kind| entry.activity_kind() == kind))
            .map(|entry| entry.category_key.as_str())
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &EmissionFactorEntry> {
        self.entries.values()
    }
}

fn fingerprint(version: &str, entries: &BTreeMap<String, EmissionFactorEntry>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(version.as_bytes());
    hasher.update(b"\n");
    for entry in entries.values() {
        let line = format!(
            "{}|{:016x}|{}|{}\n",
            entry.category_key,
            entry.factor_value.to_bits(),
            entry.unit.as_str(),
            entry.source_citation
        );
        hasher.update(line.as_bytes());
    }
    hasher.finalize().to_hex().as_str()[..16].to_string()
}
