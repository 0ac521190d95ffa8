use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use karbon_core::calc::CalculationEngine;
use karbon_core::domain::activity::{ActivityKind, FuelKind};
use karbon_core::domain::result::EmissionResult;
use karbon_core::errors::CalculationError;
use karbon_core::report::format_for_display;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::ToolSpec;

pub const LOGISTICS_TOOL: &str = "calculate_logistics_emissions";
pub const ELECTRICITY_TOOL: &str = "calculate_electricity_emissions";
pub const FUEL_TOOL: &str = "calculate_fuel_emissions";
pub const LIST_CATEGORIES_TOOL: &str = "list_emission_categories";

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<Value>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// The four emission tools over one shared engine.
    pub fn with_emission_tools(engine: Arc<CalculationEngine>, display_decimals: u8) -> Self {
        let mut registry = Self::default();
        registry.register(LogisticsTool { engine: Arc::clone(&engine), display_decimals });
        registry.register(ElectricityTool { engine: Arc::clone(&engine), display_decimals });
        registry.register(FuelTool { engine: Arc::clone(&engine), display_decimals });
        registry.register(ListCategoriesTool { engine });
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec()).collect()
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self.tools.get(name).ok_or_else(|| anyhow!("tool `{name}` is not registered"))?;
        tool.execute(input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// JSON body every calculation tool returns, tagged by `status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok {
        result: EmissionResult,
        display_total: String,
    },
    ClarificationRequired {
        activity_kind: ActivityKind,
        requested_category: String,
        message: String,
        candidate_categories: Vec<String>,
    },
    InvalidInput {
        field: String,
        message: String,
    },
}

impl ToolOutcome {
    /// Configuration failures are not outcomes the model can act on; they
    /// surface as errors.
    pub fn from_calculation(
        computed: Result<EmissionResult, CalculationError>,
        display_decimals: u8,
    ) -> Result<Self> {
        match computed {
            Ok(result) => Ok(Self::Ok {
                display_total: format_for_display(result.total_kgco2e, display_decimals),
                result,
            }),
            Err(CalculationError::UnknownCategory(request)) => Ok(Self::ClarificationRequired {
                activity_kind: request.activity_kind,
                requested_category: request.requested_category,
                message: request.message,
                candidate_categories: request.candidate_categories,
            }),
            Err(CalculationError::InvalidInput { field, message }) => {
                Ok(Self::InvalidInput { field, message })
            }
            Err(error @ CalculationError::Configuration(_)) => Err(error.into()),
        }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput { field: field.to_string(), message: message.into() }
    }

    pub fn into_value(self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn number_arg(input: &Value, field: &str) -> Result<f64, ToolOutcome> {
    match input.get(field) {
        None | Some(Value::Null) => Err(ToolOutcome::invalid(field, "is required")),
        Some(Value::Number(number)) => {
            number.as_f64().ok_or_else(|| ToolOutcome::invalid(field, "must be a number"))
        }
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ToolOutcome::invalid(field, format!("must be a number, got `{text}`"))),
        Some(other) => Err(ToolOutcome::invalid(field, format!("must be a number, got {other}"))),
    }
}

fn string_arg(input: &Value, field: &str) -> Option<String> {
    input.get(field).and_then(Value::as_str).map(str::to_string)
}

struct LogisticsTool {
    engine: Arc<CalculationEngine>,
    display_decimals: u8,
}

#[async_trait]
impl Tool for LogisticsTool {
    fn name(&self) -> &'static str {
        LOGISTICS_TOOL
    }

    fn description(&self) -> &'static str {
        "Compute freight emissions as weight_kg x distance_km x the factor of a registered \
         transport category. Call list_emission_categories when unsure of the category."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "weight_kg": { "type": "number", "description": "Shipment weight in kilograms" },
                "distance_km": { "type": "number", "description": "Distance travelled in kilometres" },
                "category_key": { "type": "string", "description": "Transport category, e.g. truk_diesel_kecil" }
            },
            "required": ["weight_kg", "distance_km", "category_key"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let weight_kg = match number_arg(&input, "weight_kg") {
            Ok(value) => value,
            Err(outcome) => return outcome.into_value(),
        };
        let distance_km = match number_arg(&input, "distance_km") {
            Ok(value) => value,
            Err(outcome) => return outcome.into_value(),
        };
        let category_key = string_arg(&input, "category_key").unwrap_or_default();

        let computed = self.engine.logistics(weight_kg, distance_km, &category_key);
        ToolOutcome::from_calculation(computed, self.display_decimals)?.into_value()
    }
}

struct ElectricityTool {
    engine: Arc<CalculationEngine>,
    display_decimals: u8,
}

#[async_trait]
impl Tool for ElectricityTool {
    fn name(&self) -> &'static str {
        ELECTRICITY_TOOL
    }

    fn description(&self) -> &'static str {
        "Compute electricity emissions as kwh x the factor of a registered grid category."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "kwh": { "type": "number", "description": "Electricity used in kWh" },
                "category_key": { "type": "string", "description": "Grid category, e.g. listrik_jawa_bali" }
            },
            "required": ["kwh", "category_key"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let kwh = match number_arg(&input, "kwh") {
            Ok(value) => value,
            Err(outcome) => return outcome.into_value(),
        };
        let category_key = string_arg(&input, "category_key").unwrap_or_default();

        let computed = self.engine.electricity(kwh, &category_key);
        ToolOutcome::from_calculation(computed, self.display_decimals)?.into_value()
    }
}

struct FuelTool {
    engine: Arc<CalculationEngine>,
    display_decimals: u8,
}

#[async_trait]
impl Tool for FuelTool {
    fn name(&self) -> &'static str {
        FUEL_TOOL
    }

    fn description(&self) -> &'static str {
        "Compute fuel combustion emissions as quantity x the factor of diesel, gasoline or lpg."
    }

    fn parameters(&self) -> Value {
        let unit = self.engine.fuel_basis().unit_label();
        json!({
            "type": "object",
            "properties": {
                "quantity": { "type": "number", "description": format!("Fuel burned, in {unit}") },
                "fuel_kind": { "type": "string", "enum": ["diesel", "gasoline", "lpg"] }
            },
            "required": ["quantity", "fuel_kind"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let quantity = match number_arg(&input, "quantity") {
            Ok(value) => value,
            Err(outcome) => return outcome.into_value(),
        };
        let fuel_kind = match string_arg(&input, "fuel_kind")
            .ok_or_else(|| "is required".to_string())
            .and_then(|raw| raw.parse::<FuelKind>())
        {
            Ok(kind) => kind,
            Err(message) => return ToolOutcome::invalid("fuel_kind", message).into_value(),
        };

        let computed = self.engine.fuel(quantity, fuel_kind);
        ToolOutcome::from_calculation(computed, self.display_decimals)?.into_value()
    }
}

struct ListCategoriesTool {
    engine: Arc<CalculationEngine>,
}

#[async_trait]
impl Tool for ListCategoriesTool {
    fn name(&self) -> &'static str {
        LIST_CATEGORIES_TOOL
    }

    fn description(&self) -> &'static str {
        "List registered emission categories, optionally for one activity kind."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "kind": { "type": "string", "enum": ["logistics", "electricity", "fuel"] }
            }
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let kinds = match string_arg(&input, "kind") {
            Some(raw) => match raw.parse::<ActivityKind>() {
                Ok(kind) => vec![kind],
                Err(message) => return ToolOutcome::invalid("kind", message).into_value(),
            },
            None => ActivityKind::ALL.to_vec(),
        };

        let table = self.engine.table();
        let categories = kinds
            .into_iter()
            .map(|kind| (kind.as_str().to_string(), json!(table.list_categories(Some(kind)))))
            .collect::<serde_json::Map<_, _>>();

        Ok(json!({
            "status": "ok",
            "factor_version": table.version(),
            "categories": categories,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use karbon_core::calc::policy::CategoryPolicy;
    use karbon_core::calc::CalculationEngine;
    use karbon_core::domain::activity::ActivityKind;
    use karbon_core::factors::FactorTable;
    use serde_json::json;

    use super::{ToolRegistry, ELECTRICITY_TOOL, FUEL_TOOL, LIST_CATEGORIES_TOOL, LOGISTICS_TOOL};

    fn registry(policy: CategoryPolicy) -> ToolRegistry {
        let table = FactorTable::builtin().expect("builtin table");
        let engine = CalculationEngine::new(Arc::new(table), policy).expect("engine");
        ToolRegistry::with_emission_tools(Arc::new(engine), 2)
    }

    #[tokio::test]
    async fn registry_advertises_all_emission_tools() {
        let registry = registry(CategoryPolicy::Strict);
        let names = registry.specs().into_iter().map(|spec| spec.name).collect::<Vec<_>>();
        assert_eq!(registry.len(), 4);
        for name in [LOGISTICS_TOOL, ELECTRICITY_TOOL, FUEL_TOOL, LIST_CATEGORIES_TOOL] {
            assert!(names.iter().any(|candidate| candidate == name), "{name} missing");
        }
    }

    #[tokio::test]
    async fn logistics_tool_returns_engine_result() {
        let output = registry(CategoryPolicy::Strict)
            .execute(
                LOGISTICS_TOOL,
                json!({ "weight_kg": 10, "distance_km": "50", "category_key": "Truk Diesel Kecil" }),
            )
            .await
            .expect("tool runs");

        assert_eq!(output["status"], "ok");
        assert_eq!(output["display_total"], "0.14");
        assert_eq!(output["result"]["category_key"], "truk_diesel_kecil");
        assert_eq!(output["result"]["factor_version"], "2024.1");
    }

    #[tokio::test]
    async fn unknown_category_returns_clarification_payload() {
        let output = registry(CategoryPolicy::Strict)
            .execute(
                LOGISTICS_TOOL,
                json!({ "weight_kg": 10, "distance_km": 50, "category_key": "pesawat" }),
            )
            .await
            .expect("tool runs");

        assert_eq!(output["status"], "clarification_required");
        assert_eq!(output["requested_category"], "pesawat");
        let candidates = output["candidate_categories"].as_array().expect("candidates");
        assert!(candidates.iter().any(|key| key == "pesawat_kargo_domestik"));
        assert!(output.get("result").is_none());
    }

    #[tokio::test]
    async fn permissive_electricity_tool_flags_substitution() {
        let policy =
            CategoryPolicy::permissive().with_default(ActivityKind::Electricity, "listrik_indonesia");
        let output = registry(policy)
            .execute(ELECTRICITY_TOOL, json!({ "kwh": 100, "category_key": "listrik_papua" }))
            .await
            .expect("tool runs");

        assert_eq!(output["status"], "ok");
        assert_eq!(output["result"]["requested_category"], "listrik_papua");
        assert_eq!(output["result"]["category_key"], "listrik_indonesia");
    }

    #[tokio::test]
    async fn overflowing_inputs_never_report_a_total() {
        let output = registry(CategoryPolicy::Strict)
            .execute(
                LOGISTICS_TOOL,
                json!({
                    "weight_kg": 1e200,
                    "distance_km": 1e200,
                    "category_key": "truk_diesel_kecil",
                }),
            )
            .await
            .expect("tool runs");

        assert_eq!(output["status"], "invalid_input");
        assert_eq!(output["field"], "weight_kg");
        assert!(output.get("display_total").is_none());
    }

    #[tokio::test]
    async fn missing_and_malformed_arguments_name_the_field() {
        let registry = registry(CategoryPolicy::Strict);

        let missing = registry
            .execute(ELECTRICITY_TOOL, json!({ "category_key": "listrik_jawa_bali" }))
            .await
            .expect("tool runs");
        assert_eq!(missing["status"], "invalid_input");
        assert_eq!(missing["field"], "kwh");

        let negative = registry
            .execute(FUEL_TOOL, json!({ "quantity": -3, "fuel_kind": "diesel" }))
            .await
            .expect("tool runs");
        assert_eq!(negative["status"], "invalid_input");
        assert_eq!(negative["field"], "quantity");

        let unknown_fuel = registry
            .execute(FUEL_TOOL, json!({ "quantity": 3, "fuel_kind": "kerosene" }))
            .await
            .expect("tool runs");
        assert_eq!(unknown_fuel["field"], "fuel_kind");
    }

    #[tokio::test]
    async fn list_categories_filters_by_kind() {
        let output = registry(CategoryPolicy::Strict)
            .execute(LIST_CATEGORIES_TOOL, json!({ "kind": "fuel" }))
            .await
            .expect("tool runs");

        assert_eq!(output["status"], "ok");
        let fuel = output["categories"]["fuel"].as_array().expect("fuel list");
        assert!(fuel.iter().any(|key| key == "diesel"));
        assert!(output["categories"].get("logistics").is_none());
    }

    #[tokio::test]
    async fn unregistered_tool_is_an_error() {
        assert!(registry(CategoryPolicy::Strict).execute("guess_emissions", json!({})).await.is_err());
    }
}
