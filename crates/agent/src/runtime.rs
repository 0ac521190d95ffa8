use std::sync::Arc;

use karbon_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use karbon_core::report::format_for_display;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
use crate::llm::{ChatMessage, ChatRequest, LlmClient, ToolCall};
use crate::session::Session;
use crate::tools::ToolRegistry;

pub const SYSTEM_PROMPT: &str = "You are an emissions calculation assistant. Use the provided \
tools for every number: never estimate totals yourself and never supply an emission factor. \
If a tool returns status clarification_required, ask the user to pick one of the \
candidate_categories. If it returns invalid_input, tell the user which field is wrong. \
After using a tool, explain the result in complete sentences, quoting the total in kgCO2e, \
the category used and the formula trace.";

const ACTOR: &str = "agent-runtime";

/// One executed (or refused) tool call within a turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Value,
    pub output: Value,
}

impl ToolInvocation {
    fn status(&self) -> &str {
        self.output.get("status").and_then(Value::as_str).unwrap_or("error")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnReply {
    pub correlation_id: String,
    pub text: String,
    /// True when the text is a deterministic rendering of tool results
    /// because the model could not finish the turn.
    pub degraded: bool,
    /// True when the model failed before any tool ran; nothing was computed.
    pub failed: bool,
    pub tool_invocations: Vec<ToolInvocation>,
}

pub struct AgentRuntime {
    client: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    guardrails: GuardrailPolicy,
    audit: Arc<dyn AuditSink>,
    max_tool_rounds: u32,
    temperature: f32,
    display_decimals: u8,
}

impl AgentRuntime {
    pub fn new(
        client: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        guardrails: GuardrailPolicy,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            client,
            tools,
            guardrails,
            audit,
            max_tool_rounds: 3,
            temperature: 0.0,
            display_decimals: 2,
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: u32) -> Self {
        self.max_tool_rounds = max_tool_rounds.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_display_decimals(mut self, display_decimals: u8) -> Self {
        self.display_decimals = display_decimals;
        self
    }

    /// Runs one user turn. The session stays usable whatever the model does.
    pub async fn handle_turn(&self, session: &mut Session, text: &str) -> TurnReply {
        let correlation_id = Uuid::new_v4().to_string();
        session.push_user(text.trim());

        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        messages.extend(session.model_history());
        let mut invocations = Vec::new();

        for round in 0..=self.max_tool_rounds {
            let request = ChatRequest {
                messages: messages.clone(),
                tools: self.tools.specs(),
                temperature: self.temperature,
            };

            let response = match self.client.chat(&request).await {
                Ok(response) => response,
                Err(error) => {
                    warn!(
                        event_name = "agent.model_call_failed",
                        correlation_id = %correlation_id,
                        session_id = %session.id(),
                        round,
                        error = %error,
                        "model call failed"
                    );
                    return self.finish_without_model(
                        session,
                        correlation_id,
                        invocations,
                        &format!("the language model request failed ({error})"),
                    );
                }
            };

            if response.tool_calls.is_empty() {
                let Some(text) = response.text().map(str::to_string) else {
                    return self.finish_without_model(
                        session,
                        correlation_id,
                        invocations,
                        "the language model returned an empty reply",
                    );
                };
                session.push_assistant(text.clone());
                info!(
                    event_name = "agent.turn_completed",
                    correlation_id = %correlation_id,
                    session_id = %session.id(),
                    tool_calls = invocations.len(),
                    "turn completed"
                );
                return TurnReply {
                    correlation_id,
                    text,
                    degraded: false,
                    failed: false,
                    tool_invocations: invocations,
                };
            }

            if round == self.max_tool_rounds {
                return self.finish_without_model(
                    session,
                    correlation_id,
                    invocations,
                    &format!(
                        "the language model kept requesting tools after {} rounds",
                        self.max_tool_rounds
                    ),
                );
            }

            messages.push(ChatMessage::assistant_tool_calls(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));
            for call in &response.tool_calls {
                let output = self.run_tool_call(session, &correlation_id, call).await;
                messages.push(ChatMessage::tool_output(call.id.clone(), output.to_string()));
                invocations.push(ToolInvocation {
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    output,
                });
            }
        }

        self.finish_without_model(
            session,
            correlation_id,
            invocations,
            "the language model did not produce a final answer",
        )
    }

    async fn run_tool_call(
        &self,
        session: &Session,
        correlation_id: &str,
        call: &ToolCall,
    ) -> Value {
        let intent = GuardrailIntent::from_tool_call(call);
        let decision = self.guardrails.evaluate(&intent);

        let (reason_code, user_message, fallback_path) = match decision {
            GuardrailDecision::Allow => {
                return self.execute_allowed(session, correlation_id, call).await;
            }
            GuardrailDecision::Deny { reason_code, user_message, fallback_path }
            | GuardrailDecision::Degrade { reason_code, user_message, fallback_path } => {
                (reason_code, user_message, fallback_path)
            }
        };

        warn!(
            event_name = "agent.tool_call_denied",
            correlation_id = %correlation_id,
            session_id = %session.id(),
            tool_name = %call.name,
            action_key = %intent.action_key(),
            reason_code,
            "tool call refused by guardrail"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(session.id().to_string()),
                correlation_id,
                "agent.tool_call_denied",
                AuditCategory::Guardrail,
                ACTOR,
                AuditOutcome::Rejected,
            )
            .with_metadata("tool_name", call.name.clone())
            .with_metadata("reason_code", reason_code),
        );

        json!({
            "status": "denied",
            "reason_code": reason_code,
            "message": user_message,
            "fallback_path": fallback_path,
        })
    }

    async fn execute_allowed(
        &self,
        session: &Session,
        correlation_id: &str,
        call: &ToolCall,
    ) -> Value {
        let output = match self.tools.execute(&call.name, call.arguments.clone()).await {
            Ok(output) => output,
            Err(error) => {
                warn!(
                    event_name = "agent.tool_failed",
                    correlation_id = %correlation_id,
                    tool_name = %call.name,
                    error = %error,
                    "tool execution failed"
                );
                return json!({ "status": "error", "message": error.to_string() });
            }
        };

        let event = match output.get("status").and_then(Value::as_str) {
            Some("ok") if output.get("result").is_some() => Some((
                "calculation.computed",
                AuditCategory::Calculation,
                AuditOutcome::Success,
            )),
            Some("clarification_required") => Some((
                "calculation.clarification_requested",
                AuditCategory::Clarification,
                AuditOutcome::Rejected,
            )),
            Some("invalid_input") => Some((
                "calculation.rejected",
                AuditCategory::Calculation,
                AuditOutcome::Rejected,
            )),
            _ => None,
        };

        if let Some((event_type, category, outcome)) = event {
            let mut audit_event = AuditEvent::new(
                Some(session.id().to_string()),
                correlation_id,
                event_type,
                category,
                ACTOR,
                outcome,
            )
            .with_metadata("tool_name", call.name.clone());
            for field in ["category_key", "factor_version", "total_kgco2e"] {
                if let Some(value) = output.get("result").and_then(|result| result.get(field)) {
                    audit_event = audit_event.with_metadata(field, plain(value));
                }
            }
            if let Some(value) = output.get("requested_category").or_else(|| output.get("field")) {
                audit_event = audit_event.with_metadata("subject", plain(value));
            }
            self.audit.emit(audit_event);

            let status = output.get("status").and_then(Value::as_str).unwrap_or("unknown");
            info!(
                event_name = "calc.result_computed",
                correlation_id = %correlation_id,
                tool_name = %call.name,
                status = %status,
                "tool call completed"
            );
        }

        output
    }

    fn finish_without_model(
        &self,
        session: &mut Session,
        correlation_id: String,
        invocations: Vec<ToolInvocation>,
        reason: &str,
    ) -> TurnReply {
        if invocations.is_empty() {
            session.discard_pending_user();
            return TurnReply {
                correlation_id,
                text: format!(
                    "Sorry, I could not answer that: {reason}. Nothing was calculated; please try again."
                ),
                degraded: false,
                failed: true,
                tool_invocations: invocations,
            };
        }

        let text = render_invocations(&invocations, reason, self.display_decimals);
        session.push_assistant(text.clone());
        TurnReply {
            correlation_id,
            text,
            degraded: true,
            failed: false,
            tool_invocations: invocations,
        }
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Deterministic text for tool results when the model cannot write the answer.
pub fn render_invocations(
    invocations: &[ToolInvocation],
    reason: &str,
    display_decimals: u8,
) -> String {
    let mut lines = vec![format!("Narrative unavailable ({reason}). Computed results:")];

    for invocation in invocations {
        let output = &invocation.output;
        let line = match invocation.status() {
            "ok" => match output.get("result") {
                Some(result) => {
                    let total = result
                        .get("total_kgco2e")
                        .and_then(Value::as_f64)
                        .map(|total| format_for_display(total, display_decimals))
                        .unwrap_or_else(|| "?".to_string());
                    format!(
                        "- {} ({}): {total} kgCO2e. {}",
                        result.get("activity_kind").map(plain).unwrap_or_default(),
                        result.get("category_key").map(plain).unwrap_or_default(),
                        result.get("formula_trace").map(plain).unwrap_or_default(),
                    )
                }
                None => continue,
            },
            "invalid_input" => format!(
                "- Invalid `{}`: {}",
                output.get("field").map(plain).unwrap_or_default(),
                output.get("message").map(plain).unwrap_or_default(),
            ),
            _ => format!("- {}", output.get("message").map(plain).unwrap_or_default()),
        };
        lines.push(line);
    }

    lines.join("\n")
}
