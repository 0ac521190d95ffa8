use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use karbon_agent::guardrails::GuardrailPolicy;
use karbon_agent::llm::{ChatRequest, ChatResponse, LlmClient, ToolCall};
use karbon_agent::tools::ToolRegistry;
use karbon_agent::{AgentRuntime, Session};
use karbon_core::audit::InMemoryAuditSink;
use karbon_core::calc::policy::CategoryPolicy;
use karbon_core::calc::CalculationEngine;
use karbon_core::domain::activity::ActivityKind;
use karbon_core::factors::FactorTable;
use serde_json::json;

struct ScriptedClient {
    replies: Mutex<VecDeque<ChatResponse>>,
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse> {
        self.replies
            .lock()
            .map_err(|_| anyhow!("script lock poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("script exhausted"))
    }
}

fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall { id: id.to_string(), name: name.to_string(), arguments }
}

#[tokio::test]
async fn permissive_chat_turn_reports_substituted_grid() {
    let table = FactorTable::builtin().expect("builtin table");
    let policy =
        CategoryPolicy::permissive().with_default(ActivityKind::Electricity, "listrik_indonesia");
    let engine = CalculationEngine::new(Arc::new(table), policy).expect("engine");

    let client = Arc::new(ScriptedClient {
        replies: Mutex::new(VecDeque::from(vec![
            ChatResponse {
                content: None,
                tool_calls: vec![
                    call(
                        "call-a",
                        "calculate_electricity_emissions",
                        json!({ "kwh": 100, "category_key": "listrik_papua" }),
                    ),
                    call(
                        "call-b",
                        "calculate_logistics_emissions",
                        json!({ "weight_kg": 10, "distance_km": 50, "category_key": "truk_diesel_kecil" }),
                    ),
                ],
            },
            ChatResponse {
                content: Some(
                    "Papua is not registered, so the national grid factor was used: 79 kgCO2e. \
                     The truck shipment adds 0.14 kgCO2e."
                        .to_string(),
                ),
                tool_calls: Vec::new(),
            },
        ])),
    });

    let audit = InMemoryAuditSink::default();
    let runtime = AgentRuntime::new(
        client,
        ToolRegistry::with_emission_tools(Arc::new(engine), 2),
        GuardrailPolicy::default(),
        Arc::new(audit.clone()),
    );
    let mut session = Session::default();

    let reply = runtime.handle_turn(&mut session, "100 kWh in Papua plus a 10 kg parcel").await;

    assert!(!reply.degraded);
    assert_eq!(reply.tool_invocations.len(), 2);
    let electricity = &reply.tool_invocations[0].output;
    assert_eq!(electricity["result"]["requested_category"], "listrik_papua");
    assert!(electricity["result"]["formula_trace"]
        .as_str()
        .unwrap_or_default()
        .contains("(default substituted)"));
    assert_eq!(
        audit.event_types(),
        vec!["calculation.computed".to_string(), "calculation.computed".to_string()]
    );
    assert_eq!(session.messages().len(), 2);
}
