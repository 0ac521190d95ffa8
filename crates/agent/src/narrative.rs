//! Narrative text for an already-computed result.
//!
//! The model receives the finished numbers and is told not to recompute them.
//! Any failure leaves the `EmissionResult` untouched and only drops the prose.

use std::sync::Arc;
use std::time::Duration;

use karbon_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use karbon_core::domain::result::EmissionResult;
use karbon_core::errors::ApplicationError;
use karbon_core::report::format_for_display;
use serde::Serialize;
use tracing::{info, warn};

use crate::llm::{ChatMessage, ChatRequest, LlmClient};

const NARRATIVE_SYSTEM_PROMPT: &str = "You write short explanations of greenhouse-gas emission \
estimates for non-specialists. The numbers you are given were computed by a deterministic \
engine: quote them as given, never recompute, round differently or invent other figures. \
Mention the category, the emission factor with its source, and one practical way to reduce \
the emissions. Answer in at most two short paragraphs.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NarratedResult {
    pub result: EmissionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_error: Option<String>,
}

impl NarratedResult {
    pub fn without_narrative(result: EmissionResult) -> Self {
        Self { result, narrative: None, narrative_error: None }
    }
}

pub struct NarrativeGenerator {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
    temperature: f32,
    display_decimals: u8,
    audit: Option<Arc<dyn AuditSink>>,
}

impl NarrativeGenerator {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout, temperature: 0.0, display_decimals: 2, audit: None }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_display_decimals(mut self, display_decimals: u8) -> Self {
        self.display_decimals = display_decimals;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn request_for(&self, result: &EmissionResult, context: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![
                ChatMessage::system(NARRATIVE_SYSTEM_PROMPT),
                ChatMessage::user(narrative_prompt(result, context, self.display_decimals)),
            ],
            tools: Vec::new(),
            temperature: self.temperature,
        }
    }

    /// Bounded by the configured timeout; expiry is `CollaboratorUnavailable`.
    pub async fn narrate(
        &self,
        result: &EmissionResult,
        context: &str,
    ) -> Result<String, ApplicationError> {
        let request = self.request_for(result, context);
        let response = tokio::time::timeout(self.timeout, self.client.chat(&request))
            .await
            .map_err(|_| {
                ApplicationError::CollaboratorUnavailable(format!(
                    "narrative generation timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|error| ApplicationError::CollaboratorUnavailable(error.to_string()))?;

        response.text().map(str::to_string).ok_or_else(|| {
            ApplicationError::CollaboratorUnavailable(
                "narrative generation returned an empty completion".to_string(),
            )
        })
    }

    pub async fn narrate_result(
        &self,
        result: EmissionResult,
        context: &str,
        correlation_id: &str,
    ) -> NarratedResult {
        match self.narrate(&result, context).await {
            Ok(narrative) => {
                info!(
                    event_name = "narrative.generated",
                    correlation_id = %correlation_id,
                    activity_kind = %result.activity_kind,
                    "narrative generated"
                );
                NarratedResult { result, narrative: Some(narrative), narrative_error: None }
            }
            Err(error) => {
                let message = match &error {
                    ApplicationError::CollaboratorUnavailable(message) => message.clone(),
                    other => other.to_string(),
                };
                warn!(
                    event_name = "narrative.unavailable",
                    correlation_id = %correlation_id,
                    error = %message,
                    "narrative unavailable; returning result without narrative"
                );
                if let Some(audit) = &self.audit {
                    audit.emit(
                        AuditEvent::new(
                            None,
                            correlation_id,
                            "narrative.unavailable",
                            AuditCategory::Narrative,
                            "narrative-generator",
                            AuditOutcome::Failed,
                        )
                        .with_metadata("reason", message.clone()),
                    );
                }
                NarratedResult { result, narrative: None, narrative_error: Some(message) }
            }
        }
    }
}

/// User prompt carrying the computed numbers. Never includes raw request text
/// other than the caller-supplied `context`.
pub fn narrative_prompt(result: &EmissionResult, context: &str, display_decimals: u8) -> String {
    let mut prompt = format!(
        "Activity: {kind}\nCategory: {category}\nTotal: {total} kgCO2e\n\
         Emission factor: {factor} {unit} (table version {version})\nSource: {source}\n\
         Calculation: {trace}\n",
        kind = result.activity_kind,
        category = result.category_key,
        total = format_for_display(result.total_kgco2e, display_decimals),
        factor = result.factor_used,
        unit = result.unit.label(),
        version = result.factor_version,
        source = result.source_citation,
        trace = result.formula_trace,
    );
    if let Some(requested) = &result.requested_category {
        prompt.push_str(&format!(
            "Note: `{requested}` is not a registered category, so the default `{}` was used. \
             Say so explicitly.\n",
            result.category_key
        ));
    }
    let context = context.trim();
    if !context.is_empty() {
        prompt.push_str(&format!("Context: {context}\n"));
    }
    prompt
}
