use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Logistics,
    Electricity,
    Fuel,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 3] = [Self::Logistics, Self::Electricity, Self::Fuel];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logistics => "logistics",
            Self::Electricity => "electricity",
            Self::Fuel => "fuel",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "logistics" => Ok(Self::Logistics),
            "electricity" => Ok(Self::Electricity),
            "fuel" => Ok(Self::Fuel),
            other => {
                Err(format!("unknown activity kind `{other}` (expected logistics|electricity|fuel)"))
            }
        }
    }
}

/// Scope-1 fuels. Closed set: every variant must have a factor in a loaded table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelKind {
    Diesel,
    Gasoline,
    Lpg,
}

impl FuelKind {
    pub const ALL: [FuelKind; 3] = [Self::Diesel, Self::Gasoline, Self::Lpg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diesel => "diesel",
            Self::Gasoline => "gasoline",
            Self::Lpg => "lpg",
        }
    }

    /// Table key holding this fuel's factor for the given quantity basis.
    pub fn category_key(&self, basis: FuelQuantityBasis) -> String {
        match basis {
            FuelQuantityBasis::Liters => self.as_str().to_string(),
            FuelQuantityBasis::Kilograms => format!("{}_kg", self.as_str()),
        }
    }
}

impl fmt::Display for FuelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FuelKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "diesel" | "solar" => Ok(Self::Diesel),
            "gasoline" | "petrol" | "bensin" => Ok(Self::Gasoline),
            "lpg" => Ok(Self::Lpg),
            other => Err(format!("unknown fuel kind `{other}` (expected diesel|gasoline|lpg)")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelQuantityBasis {
    #[default]
    Liters,
    Kilograms,
}

impl FuelQuantityBasis {
    pub fn unit_label(&self) -> &'static str {
        match self {
            Self::Liters => "L",
            Self::Kilograms => "kg",
        }
    }
}

impl FromStr for FuelQuantityBasis {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "liters" | "litres" | "l" => Ok(Self::Liters),
            "kilograms" | "kg" => Ok(Self::Kilograms),
            other => {
                Err(format!("unsupported fuel quantity basis `{other}` (expected liters|kilograms)"))
            }
        }
    }
}

/// One user request worth of activity data. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub activity_kind: ActivityKind,
    /// weight_kg, kWh, or fuel quantity depending on `activity_kind`.
    pub quantity_primary: f64,
    /// distance_km; logistics only.
    pub quantity_secondary: Option<f64>,
    pub category_key: String,
}

impl ActivityRecord {
    pub fn logistics(weight_kg: f64, distance_km: f64, category_key: impl Into<String>) -> Self {
        Self {
            activity_kind: ActivityKind::Logistics,
            quantity_primary: weight_kg,
            quantity_secondary: Some(distance_km),
            category_key: category_key.into(),
        }
    }

    pub fn electricity(kwh: f64, category_key: impl Into<String>) -> Self {
        Self {
            activity_kind: ActivityKind::Electricity,
            quantity_primary: kwh,
            quantity_secondary: None,
            category_key: category_key.into(),
        }
    }

    pub fn fuel(quantity: f64, fuel_kind: FuelKind) -> Self {
        Self {
            activity_kind: ActivityKind::Fuel,
            quantity_primary: quantity,
            quantity_secondary: None,
            category_key: fuel_kind.as_str().to_string(),
        }
    }
}
