use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use karbon_agent::llm::OpenAiCompatibleClient;
use karbon_agent::narrative::{NarratedResult, NarrativeGenerator};
use karbon_core::config::{AppConfig, LoadOptions};
use karbon_core::domain::activity::{ActivityKind, FuelKind};
use karbon_core::domain::result::EmissionResult;
use karbon_core::errors::{ApplicationError, CalculationError, InterfaceError};
use karbon_core::report::{format_for_display, render_report};
use serde_json::json;
use uuid::Uuid;

use crate::commands::{
    async_runtime, build_engine, load_config, CommandResult, EXIT_CLARIFICATION, EXIT_CONFIG,
    EXIT_INVALID_INPUT, EXIT_REPORT_WRITE,
};

#[derive(Clone, Debug, PartialEq)]
pub enum CalculationRequest {
    Logistics { weight_kg: f64, distance_km: f64, category_key: String },
    Electricity { kwh: f64, category_key: String },
    Fuel { quantity: f64, fuel_kind: String },
}

impl CalculationRequest {
    pub fn activity_kind(&self) -> ActivityKind {
        match self {
            Self::Logistics { .. } => ActivityKind::Logistics,
            Self::Electricity { .. } => ActivityKind::Electricity,
            Self::Fuel { .. } => ActivityKind::Fuel,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CalculationOptions {
    pub narrate: bool,
    pub report_path: Option<PathBuf>,
    pub context: Option<String>,
}

pub fn run(
    request: CalculationRequest,
    options: CalculationOptions,
    load_options: LoadOptions,
) -> CommandResult {
    let command = request.activity_kind().as_str();
    let correlation_id = Uuid::new_v4().to_string();

    let config = match load_config(command, load_options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let engine = match build_engine(command, &config) {
        Ok(engine) => engine,
        Err(result) => return result,
    };

    let computed = match &request {
        CalculationRequest::Logistics { weight_kg, distance_km, category_key } => {
            engine.logistics(*weight_kg, *distance_km, category_key)
        }
        CalculationRequest::Electricity { kwh, category_key } => {
            engine.electricity(*kwh, category_key)
        }
        CalculationRequest::Fuel { quantity, fuel_kind } => fuel_kind
            .parse::<FuelKind>()
            .map_err(|message| CalculationError::invalid_input("fuel_kind", message))
            .and_then(|kind| engine.fuel(*quantity, kind)),
    };

    let result = match computed {
        Ok(result) => result,
        Err(error) => {
            return calculation_failure(
                command,
                ApplicationError::from(error).into_interface(correlation_id),
            )
        }
    };

    let narrated = if options.narrate {
        match narrate(command, &config, result, options.context.as_deref(), &correlation_id) {
            Ok(narrated) => narrated,
            Err(failure) => return failure,
        }
    } else {
        NarratedResult::without_narrative(result)
    };

    let decimals = config.report.display_decimals;
    let display_total = format_for_display(narrated.result.total_kgco2e, decimals);
    let mut data = json!({
        "correlation_id": correlation_id,
        "display_total": display_total,
        "result": narrated.result,
        "narrative": narrated.narrative,
        "narrative_error": narrated.narrative_error,
    });

    if let Some(path) = &options.report_path {
        let written = render_report(&narrated.result, narrated.narrative.as_deref(), decimals)
            .map_err(|error| error.to_string())
            .and_then(|report| fs::write(path, report).map_err(|error| error.to_string()));
        if let Err(error) = written {
            return CommandResult::failure_with_data(
                command,
                "report_write",
                format!(
                    "result computed but report `{}` could not be written: {error}",
                    path.display()
                ),
                EXIT_REPORT_WRITE,
                Some(data),
            );
        }
        data["report_path"] = json!(path.display().to_string());
    }

    let message = summary_line(&narrated.result, &display_total);
    CommandResult::success_with_data(command, message, Some(data))
}

fn summary_line(result: &EmissionResult, display_total: &str) -> String {
    let mut line = format!(
        "{} emissions: {display_total} kgCO2e [{}] (factor table {})",
        result.activity_kind, result.category_key, result.factor_version
    );
    if let Some(requested) = &result.requested_category {
        line.push_str(&format!(
            "; `{requested}` is not registered, default `{}` substituted",
            result.category_key
        ));
    }
    line
}

fn narrate(
    command: &str,
    config: &AppConfig,
    result: EmissionResult,
    context: Option<&str>,
    correlation_id: &str,
) -> Result<NarratedResult, CommandResult> {
    if !config.llm.enabled {
        return Ok(NarratedResult {
            result,
            narrative: None,
            narrative_error: Some(
                "narrative generation is disabled (llm.enabled = false)".to_string(),
            ),
        });
    }

    let client = match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return Ok(NarratedResult {
                result,
                narrative: None,
                narrative_error: Some(format!("narrative client unavailable: {error}")),
            })
        }
    };
    let generator =
        NarrativeGenerator::new(Arc::new(client), Duration::from_secs(config.llm.timeout_secs))
            .with_temperature(config.llm.temperature)
            .with_display_decimals(config.report.display_decimals);

    let runtime = async_runtime(command)?;
    Ok(runtime.block_on(generator.narrate_result(
        result,
        context.unwrap_or_default(),
        correlation_id,
    )))
}

fn calculation_failure(command: &str, error: InterfaceError) -> CommandResult {
    let message = error.user_message();
    let error_class = error.error_class();
    match error {
        InterfaceError::BadRequest { field, correlation_id, .. } => {
            CommandResult::failure_with_data(
                command,
                error_class,
                message,
                EXIT_INVALID_INPUT,
                Some(json!({ "field": field, "correlation_id": correlation_id })),
            )
        }
        InterfaceError::ClarificationRequired { clarification, correlation_id } => {
            CommandResult::failure_with_data(
                command,
                error_class,
                message,
                EXIT_CLARIFICATION,
                Some(json!({ "clarification": clarification, "correlation_id": correlation_id })),
            )
        }
        InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
            CommandResult::failure(command, error_class, message, EXIT_CONFIG)
        }
    }
}
