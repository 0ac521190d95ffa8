use crate::domain::activity::{ActivityKind, FuelQuantityBasis};
use crate::domain::result::EmissionResult;
use crate::errors::CalculationError;
use crate::factors::EmissionFactorEntry;

/// Validated activity quantities, one shape per activity kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Quantities {
    Logistics { weight_kg: f64, distance_km: f64 },
    Electricity { kwh: f64 },
    Fuel { quantity: f64, basis: FuelQuantityBasis },
}

impl Quantities {
    pub fn logistics(weight_kg: f64, distance_km: f64) -> Result<Self, CalculationError> {
        Ok(Self::Logistics {
            weight_kg: ensure_quantity("weight_kg", weight_kg)?,
            distance_km: ensure_quantity("distance_km", distance_km)?,
        })
    }

    pub fn electricity(kwh: f64) -> Result<Self, CalculationError> {
        Ok(Self::Electricity { kwh: ensure_quantity("kwh", kwh)? })
    }

    pub fn fuel(quantity: f64, basis: FuelQuantityBasis) -> Result<Self, CalculationError> {
        Ok(Self::Fuel { quantity: ensure_quantity("quantity", quantity)?, basis })
    }

    pub fn activity_kind(&self) -> ActivityKind {
        match self {
            Self::Logistics { .. } => ActivityKind::Logistics,
            Self::Electricity { .. } => ActivityKind::Electricity,
            Self::Fuel { .. } => ActivityKind::Fuel,
        }
    }

    /// `quantity_primary * quantity_secondary * factor`, multiplied in that order.
    pub fn total(&self, factor: f64) -> f64 {
        match *self {
            Self::Logistics { weight_kg, distance_km } => weight_kg * distance_km * factor,
            Self::Electricity { kwh } => kwh * factor,
            Self::Fuel { quantity, .. } => quantity * factor,
        }
    }

    /// Field named when the product itself is out of range.
    pub fn primary_field(&self) -> &'static str {
        match self {
            Self::Logistics { .. } => "weight_kg",
            Self::Electricity { .. } => "kwh",
            Self::Fuel { .. } => "quantity",
        }
    }

    fn describe(&self) -> String {
        match *self {
            Self::Logistics { weight_kg, distance_km } => {
                format!("{weight_kg} kg x {distance_km} km")
            }
            Self::Electricity { kwh } => format!("{kwh} kWh"),
            Self::Fuel { quantity, basis } => format!("{quantity} {}", basis.unit_label()),
        }
    }
}

/// Rejects negative and non-finite quantities, naming the field.
pub fn ensure_quantity(field: &str, value: f64) -> Result<f64, CalculationError> {
    if !value.is_finite() {
        return Err(CalculationError::invalid_input(
            field,
            format!("must be a finite number, got {value}"),
        ));
    }
    if value < 0.0 {
        return Err(CalculationError::invalid_input(
            field,
            format!("must be zero or greater, got {value}"),
        ));
    }
    Ok(value)
}

/// Applies `entry` to `quantities`. `requested` is set when `entry` stands in
/// for a category the table did not know. Finite inputs whose product
/// overflows are invalid input, never a non-finite total.
pub fn apply_factor(
    quantities: &Quantities,
    entry: &EmissionFactorEntry,
    requested: Option<&str>,
    factor_version: &str,
) -> Result<EmissionResult, CalculationError> {
    let factor = entry.factor_value;
    let total_kgco2e = quantities.total(factor);
    if !total_kgco2e.is_finite() {
        return Err(CalculationError::invalid_input(
            quantities.primary_field(),
            format!("{} is too large to produce a finite total", quantities.describe()),
        ));
    }

    let mut formula_trace = format!(
        "{} x {factor} {} [{}] = {total_kgco2e} kgCO2e",
        quantities.describe(),
        entry.unit.label(),
        entry.category_key
    );
    if let Some(requested) = requested {
        formula_trace.push_str(&format!(
            " (default substituted): requested `{requested}` is not registered, applied `{}`",
            entry.category_key
        ));
    }

    Ok(EmissionResult {
        activity_kind: quantities.activity_kind(),
        total_kgco2e,
        factor_used: factor,
        unit: entry.unit,
        category_key: entry.category_key.clone(),
        requested_category: requested.map(str::to_string),
        formula_trace,
        source_citation: entry.source_citation.clone(),
        factor_version: factor_version.to_string(),
    })
}
