use serde::{Deserialize, Serialize};

use crate::domain::activity::ActivityKind;
use crate::factors::FactorUnit;

/// Output of one calculation. Holds full `f64` precision; rounding is a
/// presentation concern. Carries no timestamps or ids so identical inputs
/// against the same table version produce identical results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmissionResult {
    pub activity_kind: ActivityKind,
    pub total_kgco2e: f64,
    pub factor_used: f64,
    pub unit: FactorUnit,
    /// Key whose factor was applied.
    pub category_key: String,
    /// Key the caller asked for, present only when a default was substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_category: Option<String>,
    pub formula_trace: String,
    pub source_citation: String,
    pub factor_version: String,
}

impl EmissionResult {
    pub fn was_substituted(&self) -> bool {
        self.requested_category.is_some()
    }
}
