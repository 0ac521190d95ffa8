//! JSON API over the calculation engine.
//!
//! - `GET  /api/v1/categories?kind=`           registered categories per kind
//! - `POST /api/v1/emissions/{kind}`           compute one estimate, optional narrative
//! - `POST /api/v1/emissions/{kind}/report`    same, returned as a plain-text attachment
//!
//! Unknown categories answer 422 with the clarification body; malformed or
//! out-of-range input answers 400 naming the field.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use karbon_agent::narrative::{NarratedResult, NarrativeGenerator};
use karbon_core::calc::policy::ClarificationRequest;
use karbon_core::calc::CalculationEngine;
use karbon_core::domain::activity::{ActivityKind, ActivityRecord};
use karbon_core::errors::{ApplicationError, CalculationError, InterfaceError};
use karbon_core::report::{format_for_display, render_report};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<CalculationEngine>,
    narrator: Option<Arc<NarrativeGenerator>>,
    display_decimals: u8,
}

impl ApiState {
    pub fn new(engine: Arc<CalculationEngine>, display_decimals: u8) -> Self {
        Self { engine, narrator: None, display_decimals }
    }

    pub fn with_narrator(mut self, narrator: Option<Arc<NarrativeGenerator>>) -> Self {
        self.narrator = narrator;
        self
    }

    pub fn engine(&self) -> &Arc<CalculationEngine> {
        &self.engine
    }

    pub fn narration_enabled(&self) -> bool {
        self.narrator.is_some()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/emissions/{kind}", post(compute_emissions))
        .route("/api/v1/emissions/{kind}/report", post(download_report))
        .with_state(state)
}

/// Body for every emissions route. Which quantities are required depends on
/// the path's activity kind.
#[derive(Clone, Debug, Deserialize)]
pub struct EmissionRequest {
    pub weight_kg: Option<f64>,
    pub distance_km: Option<f64>,
    pub kwh: Option<f64>,
    pub quantity: Option<f64>,
    pub category_key: Option<String>,
    pub fuel_kind: Option<String>,
    #[serde(default)]
    pub narrate: bool,
    pub context: Option<String>,
}

impl EmissionRequest {
    fn into_record(self, kind: ActivityKind) -> Result<ActivityRecord, CalculationError> {
        let record = match kind {
            ActivityKind::Logistics => ActivityRecord::logistics(
                required("weight_kg", self.weight_kg)?,
                required("distance_km", self.distance_km)?,
                self.category_key.unwrap_or_default(),
            ),
            ActivityKind::Electricity => ActivityRecord::electricity(
                required("kwh", self.kwh)?,
                self.category_key.unwrap_or_default(),
            ),
            // Fuel kind is parsed by the engine so aliases stay in one place.
            ActivityKind::Fuel => ActivityRecord {
                activity_kind: ActivityKind::Fuel,
                quantity_primary: required("quantity", self.quantity)?,
                quantity_secondary: None,
                category_key: required("fuel_kind", self.fuel_kind)?,
            },
        };
        Ok(record)
    }
}

fn required<T>(field: &str, value: Option<T>) -> Result<T, CalculationError> {
    value.ok_or_else(|| CalculationError::invalid_input(field, "is required"))
}

#[derive(Debug, Deserialize)]
pub struct CategoriesQuery {
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub factor_version: String,
    pub fingerprint: String,
    pub categories: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct EmissionResponse {
    pub correlation_id: String,
    pub display_total: String,
    #[serde(flatten)]
    pub narrated: NarratedResult,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error_class: &'static str,
    pub message: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ClarificationRequest>,
}

pub struct ApiError(InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status = match &error {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ClarificationRequired { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = error.user_message();
        let error_class = error.error_class();
        let correlation_id = error.correlation_id().to_string();
        let (field, clarification) = match error {
            InterfaceError::BadRequest { field, .. } => (field, None),
            InterfaceError::ClarificationRequired { clarification, .. } => {
                (None, Some(clarification))
            }
            _ => (None, None),
        };

        let body = ApiErrorBody { error_class, message, correlation_id, field, clarification };
        (status, Json(body)).into_response()
    }
}

fn bad_request(field: &str, message: String, correlation_id: &str) -> ApiError {
    ApiError(InterfaceError::BadRequest {
        message,
        field: Some(field.to_string()),
        correlation_id: correlation_id.to_string(),
    })
}

async fn list_categories(
    Query(query): Query<CategoriesQuery>,
    State(state): State<ApiState>,
) -> Result<Json<CategoriesResponse>, ApiError> {
    let kinds = match query.kind.as_deref() {
        Some(raw) => {
            let kind = raw.parse::<ActivityKind>().map_err(|message| {
                bad_request("kind", message, &Uuid::new_v4().to_string())
            })?;
            vec![kind]
        }
        None => ActivityKind::ALL.to_vec(),
    };

    let table = state.engine.table();
    let mut categories = Map::new();
    for kind in kinds {
        let keys = table
            .list_categories(Some(kind))
            .into_iter()
            .map(|key| Value::String(key.to_string()))
            .collect();
        categories.insert(kind.as_str().to_string(), Value::Array(keys));
    }

    Ok(Json(CategoriesResponse {
        factor_version: table.version().to_string(),
        fingerprint: table.fingerprint().to_string(),
        categories,
    }))
}

async fn compute_emissions(
    Path(kind): Path<String>,
    State(state): State<ApiState>,
    body: Result<Json<EmissionRequest>, JsonRejection>,
) -> Result<Json<EmissionResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let narrated = compute(&state, &kind, body, &correlation_id).await?;
    let display_total = format_for_display(narrated.result.total_kgco2e, state.display_decimals);
    Ok(Json(EmissionResponse { correlation_id, display_total, narrated }))
}

async fn download_report(
    Path(kind): Path<String>,
    State(state): State<ApiState>,
    body: Result<Json<EmissionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let narrated = compute(&state, &kind, body, &correlation_id).await?;

    let report =
        render_report(&narrated.result, narrated.narrative.as_deref(), state.display_decimals)
            .map_err(|error| {
                ApiError(
                    ApplicationError::Configuration(format!("report rendering failed: {error}"))
                        .into_interface(correlation_id.clone()),
                )
            })?;

    let filename = format!("karbon-{}-{correlation_id}.txt", narrated.result.activity_kind);
    info!(
        event_name = "api.report.rendered",
        correlation_id = %correlation_id,
        activity_kind = %narrated.result.activity_kind,
        "emission report rendered"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        report,
    )
        .into_response())
}

async fn compute(
    state: &ApiState,
    kind: &str,
    body: Result<Json<EmissionRequest>, JsonRejection>,
    correlation_id: &str,
) -> Result<NarratedResult, ApiError> {
    let kind = kind
        .parse::<ActivityKind>()
        .map_err(|message| bad_request("kind", message, correlation_id))?;
    let Json(request) =
        body.map_err(|rejection| bad_request("body", rejection.body_text(), correlation_id))?;

    let narrate = request.narrate;
    let context = request.context.clone().unwrap_or_default();
    let result = request
        .into_record(kind)
        .and_then(|record| state.engine.compute(&record))
        .map_err(|error| {
            if let Some(clarification) = error.clarification() {
                warn!(
                    event_name = "api.emissions.clarification_required",
                    correlation_id = %correlation_id,
                    activity_kind = %kind,
                    requested_category = %clarification.requested_category,
                    "category not registered"
                );
            }
            ApiError(ApplicationError::from(error).into_interface(correlation_id))
        })?;

    info!(
        event_name = "api.emissions.computed",
        correlation_id = %correlation_id,
        activity_kind = %kind,
        category_key = %result.category_key,
        substituted = result.was_substituted(),
        factor_version = %result.factor_version,
        "emission estimate computed"
    );

    if !narrate {
        return Ok(NarratedResult::without_narrative(result));
    }
    match &state.narrator {
        Some(narrator) => Ok(narrator.narrate_result(result, &context, correlation_id).await),
        None => Ok(NarratedResult {
            result,
            narrative: None,
            narrative_error: Some(
                "narrative generation is disabled (llm.enabled = false)".to_string(),
            ),
        }),
    }
}
