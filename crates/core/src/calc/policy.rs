use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::activity::ActivityKind;
use crate::errors::CalculationError;
use crate::factors::{normalize_key, EmissionFactorEntry, FactorTable};

/// Configured handling of a category key the table does not know.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategoryPolicy {
    #[default]
    Reject,
    Default,
}

impl std::str::FromStr for UnknownCategoryPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" | "strict" => Ok(Self::Reject),
            "default" | "permissive" => Ok(Self::Default),
            other => Err(format!(
                "unsupported unknown-category policy `{other}` (expected reject|default)"
            )),
        }
    }
}

/// Returned instead of a number when a category cannot be resolved exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub activity_kind: ActivityKind,
    pub requested_category: String,
    pub message: String,
    pub candidate_categories: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution<'t> {
    Exact(&'t EmissionFactorEntry),
    Substituted { requested: String, entry: &'t EmissionFactorEntry },
    Unresolved(ClarificationRequest),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CategoryPolicy {
    /// Never guesses; every number traces to an exact, enumerated factor.
    #[default]
    Strict,
    /// Substitutes the per-kind default. Kinds without a default behave as strict.
    Permissive { defaults: BTreeMap<ActivityKind, String> },
}

impl CategoryPolicy {
    pub fn permissive() -> Self {
        Self::Permissive { defaults: BTreeMap::new() }
    }

    pub fn with_default(self, kind: ActivityKind, category_key: impl Into<String>) -> Self {
        let mut defaults = match self {
            Self::Strict => BTreeMap::new(),
            Self::Permissive { defaults } => defaults,
        };
        defaults.insert(kind, normalize_key(&category_key.into()));
        Self::Permissive { defaults }
    }

    pub fn from_settings(
        on_unknown: UnknownCategoryPolicy,
        default_logistics: Option<&str>,
        default_electricity: Option<&str>,
    ) -> Self {
        match on_unknown {
            UnknownCategoryPolicy::Reject => Self::Strict,
            UnknownCategoryPolicy::Default => {
                let mut policy = Self::permissive();
                if let Some(key) = default_logistics {
                    policy = policy.with_default(ActivityKind::Logistics, key);
                }
                if let Some(key) = default_electricity {
                    policy = policy.with_default(ActivityKind::Electricity, key);
                }
                policy
            }
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Strict)
    }

    pub fn default_for(&self, kind: ActivityKind) -> Option<&str> {
        match self {
            Self::Strict => None,
            Self::Permissive { defaults } => defaults.get(&kind).map(String::as_str),
        }
    }

    /// Every configured default must exist in `table` under its own kind.
    pub fn validate_against(&self, table: &FactorTable) -> Result<(), CalculationError> {
        let Self::Permissive { defaults } = self else {
            return Ok(());
        };

        for (kind, key) in defaults {
            if table.lookup_for(*kind, key).is_none() {
                return Err(CalculationError::Configuration(format!(
                    "default {kind} category `{key}` is not a {kind} entry of factor table {}",
                    table.version()
                )));
            }
        }
        Ok(())
    }

    pub fn resolve<'t>(
        &self,
        table: &'t FactorTable,
        kind: ActivityKind,
        requested: &str,
    ) -> Resolution<'t> {
        if let Some(entry) = table.lookup_for(kind, requested) {
            return Resolution::Exact(entry);
        }

        if let Some(entry) = self.default_for(kind).and_then(|key| table.lookup_for(kind, key)) {
            return Resolution::Substituted { requested: requested.trim().to_string(), entry };
        }

        Resolution::Unresolved(clarification_for(table, kind, requested))
    }
}

pub fn clarification_for(
    table: &FactorTable,
    kind: ActivityKind,
    requested: &str,
) -> ClarificationRequest {
    let candidate_categories = table
        .list_categories(Some(kind))
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let requested = requested.trim();

    let message = if requested.is_empty() {
        format!(
            "No {kind} category was given. Available {kind} categories: {}.",
            candidate_categories.join(", ")
        )
    } else {
        format!(
            "Category `{requested}` is not a registered {kind} category. Available {kind} categories: {}.",
            candidate_categories.join(", ")
        )
    };

    ClarificationRequest {
        activity_kind: kind,
        requested_category: requested.to_string(),
        message,
        candidate_categories,
    }
}
