use serde_json::Value;

use crate::llm::ToolCall;
use crate::tools::{ELECTRICITY_TOOL, FUEL_TOOL, LIST_CATEGORIES_TOOL, LOGISTICS_TOOL};

/// Argument names through which a model could try to pass its own factor.
const FACTOR_ARGUMENTS: [&str; 5] =
    ["factor", "factor_value", "factor_used", "emission_factor", "total_kgco2e"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    Calculation { tool_name: String },
    FactorOverride { tool_name: String, argument: String },
    ListCategories,
    UnknownTool { tool_name: String },
}

impl GuardrailIntent {
    pub fn from_tool_call(call: &ToolCall) -> Self {
        match call.name.as_str() {
            LOGISTICS_TOOL | ELECTRICITY_TOOL | FUEL_TOOL => {
                match supplied_factor_argument(&call.arguments) {
                    Some(argument) => {
                        Self::FactorOverride { tool_name: call.name.clone(), argument }
                    }
                    None => Self::Calculation { tool_name: call.name.clone() },
                }
            }
            LIST_CATEGORIES_TOOL => Self::ListCategories,
            other => Self::UnknownTool { tool_name: other.to_string() },
        }
    }

    pub fn action_key(&self) -> String {
        match self {
            Self::Calculation { tool_name } => format!("tool.{tool_name}"),
            Self::FactorOverride { .. } => "policy.factor_override".to_string(),
            Self::ListCategories => format!("tool.{LIST_CATEGORIES_TOOL}"),
            Self::UnknownTool { .. } => "tool.unknown".to_string(),
        }
    }
}

fn supplied_factor_argument(arguments: &Value) -> Option<String> {
    let object = arguments.as_object()?;
    FACTOR_ARGUMENTS
        .iter()
        .find(|name| object.get(**name).is_some_and(|value| !value.is_null()))
        .map(|name| name.to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub calculation_tools_enabled: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { calculation_tools_enabled: true }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        match intent {
            GuardrailIntent::Calculation { .. } if self.calculation_tools_enabled => {
                GuardrailDecision::Allow
            }
            GuardrailIntent::Calculation { .. } => GuardrailDecision::Degrade {
                reason_code: "calculation_tools_disabled",
                user_message: "Emission calculations are temporarily unavailable in chat. \
                               Please use the `karbon` command line instead."
                    .to_string(),
                fallback_path: "cli_calculation",
            },
            GuardrailIntent::FactorOverride { argument, .. } => GuardrailDecision::Deny {
                reason_code: "factor_override_disallowed",
                user_message: format!(
                    "Emission factors come only from the factor table; `{argument}` cannot be \
                     supplied. Call the tool again with a registered category_key."
                ),
                fallback_path: "registered_category_lookup",
            },
            GuardrailIntent::ListCategories => GuardrailDecision::Allow,
            GuardrailIntent::UnknownTool { tool_name } => GuardrailDecision::Deny {
                reason_code: "unknown_tool",
                user_message: format!(
                    "Tool `{tool_name}` does not exist. Available tools: {LOGISTICS_TOOL}, \
                     {ELECTRICITY_TOOL}, {FUEL_TOOL}, {LIST_CATEGORIES_TOOL}."
                ),
                fallback_path: "registered_tools",
            },
        }
    }
}
