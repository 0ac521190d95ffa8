pub mod engine;
pub mod policy;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::activity::{ActivityKind, ActivityRecord, FuelKind, FuelQuantityBasis};
use crate::domain::result::EmissionResult;
use crate::errors::{ApplicationError, CalculationError};
use crate::factors::FactorTable;

use self::{
    engine::{apply_factor, Quantities},
    policy::{CategoryPolicy, Resolution},
};

/// Factor table plus category policy. Holds no per-request state; every
/// operation is a pure function of its arguments and the current table.
#[derive(Clone, Debug)]
pub struct CalculationEngine {
    table: Arc<FactorTable>,
    policy: CategoryPolicy,
    fuel_basis: FuelQuantityBasis,
}

impl CalculationEngine {
    pub fn new(table: Arc<FactorTable>, policy: CategoryPolicy) -> Result<Self, CalculationError> {
        policy.validate_against(&table)?;
        Ok(Self { table, policy, fuel_basis: FuelQuantityBasis::default() })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ApplicationError> {
        let table = FactorTable::load_or_builtin(config.factors.table_path.as_deref())?;
        let policy = CategoryPolicy::from_settings(
            config.policy.on_unknown_category,
            config.policy.default_logistics_category.as_deref(),
            config.policy.default_electricity_category.as_deref(),
        );

        Ok(Self::new(Arc::new(table), policy)?.with_fuel_basis(config.policy.fuel_quantity_basis))
    }

    pub fn with_fuel_basis(mut self, basis: FuelQuantityBasis) -> Self {
        self.fuel_basis = basis;
        self
    }

    pub fn with_policy(mut self, policy: CategoryPolicy) -> Result<Self, CalculationError> {
        policy.validate_against(&self.table)?;
        self.policy = policy;
        Ok(self)
    }

    pub fn table(&self) -> &Arc<FactorTable> {
        &self.table
    }

    pub fn policy(&self) -> &CategoryPolicy {
        &self.policy
    }

    pub fn fuel_basis(&self) -> FuelQuantityBasis {
        self.fuel_basis
    }

    /// Swaps in a new table version and returns the previous one. Results
    /// already produced keep the `factor_version` they were computed under.
    pub fn replace_table(
        &mut self,
        table: FactorTable,
    ) -> Result<Arc<FactorTable>, CalculationError> {
        self.policy.validate_against(&table)?;
        Ok(std::mem::replace(&mut self.table, Arc::new(table)))
    }

    /// `weight_kg * distance_km * factor`.
    pub fn logistics(
        &self,
        weight_kg: f64,
        distance_km: f64,
        category_key: &str,
    ) -> Result<EmissionResult, CalculationError> {
        let quantities = Quantities::logistics(weight_kg, distance_km)?;
        self.resolve_and_apply(&quantities, category_key)
    }

    /// `kwh * factor`.
    pub fn electricity(
        &self,
        kwh: f64,
        category_key: &str,
    ) -> Result<EmissionResult, CalculationError> {
        let quantities = Quantities::electricity(kwh)?;
        self.resolve_and_apply(&quantities, category_key)
    }

    /// `quantity * factor[fuel_kind]`, quantity in the configured basis.
    pub fn fuel(
        &self,
        quantity: f64,
        fuel_kind: FuelKind,
    ) -> Result<EmissionResult, CalculationError> {
        let quantities = Quantities::fuel(quantity, self.fuel_basis)?;
        let key = fuel_kind.category_key(self.fuel_basis);
        let entry = self.table.lookup_for(ActivityKind::Fuel, &key).ok_or_else(|| {
            CalculationError::Configuration(format!(
                "factor table {} has no `{key}` fuel entry",
                self.table.version()
            ))
        })?;

        apply_factor(&quantities, entry, None, self.table.version())
    }

    pub fn compute(&self, record: &ActivityRecord) -> Result<EmissionResult, CalculationError> {
        match record.activity_kind {
            ActivityKind::Logistics => {
                let distance_km = record.quantity_secondary.ok_or_else(|| {
                    CalculationError::invalid_input("distance_km", "is required for logistics")
                })?;
                self.logistics(record.quantity_primary, distance_km, &record.category_key)
            }
            ActivityKind::Electricity => {
                reject_secondary(record)?;
                self.electricity(record.quantity_primary, &record.category_key)
            }
            ActivityKind::Fuel => {
                reject_secondary(record)?;
                let fuel_kind = record
                    .category_key
                    .parse::<FuelKind>()
                    .map_err(|message| CalculationError::invalid_input("fuel_kind", message))?;
                self.fuel(record.quantity_primary, fuel_kind)
            }
        }
    }

    fn resolve_and_apply(
        &self,
        quantities: &Quantities,
        category_key: &str,
    ) -> Result<EmissionResult, CalculationError> {
        let version = self.table.version();
        match self.policy.resolve(&self.table, quantities.activity_kind(), category_key) {
            Resolution::Exact(entry) => apply_factor(quantities, entry, None, version),
            Resolution::Substituted { requested, entry } => {
                apply_factor(quantities, entry, Some(&requested), version)
            }
            Resolution::Unresolved(request) => Err(CalculationError::UnknownCategory(request)),
        }
    }
}

fn reject_secondary(record: &ActivityRecord) -> Result<(), CalculationError> {
    if record.quantity_secondary.is_some() {
        return Err(CalculationError::invalid_input(
            "distance_km",
            format!("only applies to logistics, not {}", record.activity_kind),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::calc::{policy::CategoryPolicy, CalculationEngine};
    use crate::domain::activity::{ActivityKind, ActivityRecord, FuelKind, FuelQuantityBasis};
    use crate::errors::CalculationError;
    use crate::factors::FactorTable;

    const EPSILON: f64 = 1e-9;

    fn strict_engine() -> CalculationEngine {
        let table = FactorTable::builtin().expect("builtin table");
        CalculationEngine::new(Arc::new(table), CategoryPolicy::Strict).expect("engine")
    }

    fn permissive_engine() -> CalculationEngine {
        let table = FactorTable::builtin().expect("builtin table");
        let policy =
            CategoryPolicy::permissive().with_default(ActivityKind::Electricity, "listrik_indonesia");
        CalculationEngine::new(Arc::new(table), policy).expect("engine")
    }

    #[test]
    fn small_diesel_truck_scenario() {
        let result = strict_engine().logistics(10.0, 50.0, "truk_diesel_kecil").expect("computed");
        assert!((result.total_kgco2e - 0.14).abs() < EPSILON);
        assert_eq!(result.factor_used, 0.00028);
        assert_eq!(result.total_kgco2e, 10.0 * 50.0 * 0.00028);
        assert_eq!(result.factor_version, "2024.1");
        assert!(result.source_citation.contains("DEFRA"));
    }

    #[test]
    fn jawa_bali_grid_scenario() {
        let result = strict_engine().electricity(100.0, "listrik_jawa_bali").expect("computed");
        assert!((result.total_kgco2e - 79.0).abs() < EPSILON);
        assert_eq!(result.factor_used, 0.790);
    }

    #[test]
    fn diesel_fuel_scenario() {
        let result = strict_engine().fuel(20.0, FuelKind::Diesel).expect("computed");
        assert!((result.total_kgco2e - 53.6).abs() < EPSILON);
        assert_eq!(result.category_key, "diesel");
    }

    #[test]
    fn logistics_total_matches_formula_across_inputs() {
        let engine = strict_engine();
        let table = FactorTable::builtin().expect("builtin table");
        let weights = [0.0, 0.5, 10.0, 1_250.0];
        let distances = [0.0, 3.2, 50.0, 2_100.0];

        for key in table.list_categories(Some(ActivityKind::Logistics)) {
            let factor = table.lookup(key).map(|entry| entry.factor_value).unwrap_or_default();
            for weight in weights {
                for distance in distances {
                    let result = engine.logistics(weight, distance, key).expect("computed");
                    assert_eq!(result.total_kgco2e, weight * distance * factor, "{key}");
                    assert_eq!(result.factor_used, factor);
                }
            }
        }
    }

    #[test]
    fn strict_unknown_category_returns_clarification_not_a_number() {
        let engine = strict_engine();
        let error = engine.logistics(10.0, 50.0, "pesawat").err();

        let Some(CalculationError::UnknownCategory(request)) = error else {
            panic!("expected clarification request, got {error:?}");
        };
        assert_eq!(request.activity_kind, ActivityKind::Logistics);
        assert_eq!(
            request.candidate_categories,
            engine
                .table()
                .list_categories(Some(ActivityKind::Logistics))
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn permissive_unknown_grid_substitutes_default_and_says_so() {
        let result = permissive_engine().electricity(100.0, "listrik_papua").expect("substituted");
        assert_eq!(result.category_key, "listrik_indonesia");
        assert_eq!(result.requested_category.as_deref(), Some("listrik_papua"));
        assert_eq!(result.factor_used, 0.79);
        assert!(result.formula_trace.contains("(default substituted)"));
        assert!(result.formula_trace.contains("listrik_papua"));
    }

    #[test]
    fn permissive_known_grid_is_not_substituted() {
        let result = permissive_engine().electricity(10.0, "Listrik Sumatera").expect("computed");
        assert_eq!(result.category_key, "listrik_sumatera");
        assert!(!result.was_substituted());
    }

    #[test]
    fn negative_inputs_are_invalid_input() {
        let engine = strict_engine();
        assert!(matches!(
            engine.logistics(10.0, -5.0, "truk_diesel_kecil"),
            Err(CalculationError::InvalidInput { ref field, .. }) if field == "distance_km"
        ));
        assert!(matches!(
            engine.electricity(-1.0, "listrik_jawa_bali"),
            Err(CalculationError::InvalidInput { ref field, .. }) if field == "kwh"
        ));
        assert!(matches!(
            engine.fuel(-20.0, FuelKind::Lpg),
            Err(CalculationError::InvalidInput { ref field, .. }) if field == "quantity"
        ));
    }

    #[test]
    fn overflowing_totals_are_invalid_input() {
        let engine = strict_engine();
        assert!(matches!(
            engine.logistics(1e200, 1e200, "truk_diesel_kecil"),
            Err(CalculationError::InvalidInput { ref field, .. }) if field == "weight_kg"
        ));
        assert!(matches!(
            engine.electricity(f64::MAX, "listrik_jawa_bali"),
            Ok(result) if result.total_kgco2e.is_finite()
        ));
        assert!(matches!(
            engine.fuel(f64::MAX, FuelKind::Diesel),
            Err(CalculationError::InvalidInput { ref field, .. }) if field == "quantity"
        ));
    }

    #[test]
    fn invalid_input_is_reported_before_category_resolution() {
        let error = strict_engine().logistics(-1.0, 5.0, "pesawat").err();
        assert!(matches!(error, Some(CalculationError::InvalidInput { .. })));
    }

    #[test]
    fn same_record_twice_gives_identical_results() {
        let engine = permissive_engine();
        let records = [
            ActivityRecord::logistics(12.5, 340.0, "kapal_kontainer"),
            ActivityRecord::electricity(88.8, "listrik_papua"),
            ActivityRecord::fuel(20.0, FuelKind::Gasoline),
        ];

        for record in &records {
            let first = engine.compute(record).expect("computed");
            let second = engine.compute(record).expect("computed");
            assert_eq!(first, second);
            assert_eq!(first.total_kgco2e.to_bits(), second.total_kgco2e.to_bits());
        }
    }

    #[test]
    fn compute_rejects_distance_outside_logistics() {
        let mut record = ActivityRecord::electricity(1.0, "listrik_jawa_bali");
        record.quantity_secondary = Some(10.0);
        assert!(matches!(
            strict_engine().compute(&record),
            Err(CalculationError::InvalidInput { ref field, .. }) if field == "distance_km"
        ));
    }

    #[test]
    fn compute_requires_distance_for_logistics() {
        let mut record = ActivityRecord::logistics(1.0, 1.0, "kereta_barang");
        record.quantity_secondary = None;
        assert!(strict_engine().compute(&record).is_err());
    }

    #[test]
    fn compute_rejects_unknown_fuel_name() {
        let mut record = ActivityRecord::fuel(1.0, FuelKind::Diesel);
        record.category_key = "kerosene".to_string();
        assert!(matches!(
            strict_engine().compute(&record),
            Err(CalculationError::InvalidInput { ref field, .. }) if field == "fuel_kind"
        ));
    }

    #[test]
    fn kilogram_basis_selects_mass_factors() {
        let engine = strict_engine().with_fuel_basis(FuelQuantityBasis::Kilograms);
        let result = engine.fuel(10.0, FuelKind::Diesel).expect("computed");
        assert_eq!(result.category_key, "diesel_kg");
        assert_eq!(result.total_kgco2e, 10.0 * 3.21);
    }

    #[test]
    fn replacing_table_keeps_earlier_results_under_their_version() {
        let mut engine = strict_engine();
        let before = engine.electricity(100.0, "listrik_jawa_bali").expect("computed");

        let raw = include_str!("../factors/default_table.toml")
            .replace("version = \"2024.1\"", "version = \"2025.1\"")
            .replace("value = 0.790", "value = 0.87");
        let next = FactorTable::from_toml_str(&raw).expect("next table");
        let previous = engine.replace_table(next).expect("replace");

        let after = engine.electricity(100.0, "listrik_jawa_bali").expect("computed");
        assert_eq!(previous.version(), "2024.1");
        assert_eq!(before.factor_version, "2024.1");
        assert!((before.total_kgco2e - 79.0).abs() < EPSILON);
        assert_eq!(after.factor_version, "2025.1");
        assert!((after.total_kgco2e - 87.0).abs() < EPSILON);
    }

    #[test]
    fn engine_rejects_default_missing_from_table() {
        let table = FactorTable::builtin().expect("builtin table");
        let policy =
            CategoryPolicy::permissive().with_default(ActivityKind::Electricity, "listrik_papua");
        assert!(matches!(
            CalculationEngine::new(Arc::new(table), policy),
            Err(CalculationError::Configuration(_))
        ));
    }
}
