use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::api::ApiState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub factor_table: HealthCheck,
    pub narrative: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Readiness tracks the factor table only; a disabled narrator never degrades it.
pub async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let factor_table = factor_table_check(&state);
    let ready = factor_table.status == "ready";

    let narrative = if state.narration_enabled() {
        HealthCheck { status: "ready", detail: "narrative collaborator configured".to_string() }
    } else {
        HealthCheck { status: "disabled", detail: "llm.enabled = false".to_string() }
    };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "karbon-server runtime initialized".to_string(),
        },
        factor_table,
        narrative,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn factor_table_check(state: &ApiState) -> HealthCheck {
    let table = state.engine().table();
    HealthCheck {
        status: "ready",
        detail: format!(
            "factor table {} loaded ({} entries, fingerprint {})",
            table.version(),
            table.len(),
            table.fingerprint()
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use karbon_core::calc::policy::CategoryPolicy;
    use karbon_core::calc::CalculationEngine;
    use karbon_core::factors::FactorTable;

    use crate::api::ApiState;
    use crate::health::health;

    #[tokio::test]
    async fn health_is_ready_with_builtin_table_and_no_narrator() {
        let table = FactorTable::builtin().expect("builtin table");
        let engine =
            CalculationEngine::new(Arc::new(table), CategoryPolicy::Strict).expect("engine");

        let (status, Json(payload)) = health(State(ApiState::new(Arc::new(engine), 2))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.factor_table.status, "ready");
        assert!(payload.factor_table.detail.contains("2024.1"));
        assert_eq!(payload.narrative.status, "disabled");
    }
}
