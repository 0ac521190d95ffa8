//! Plain-text report composed from an `EmissionResult`.
//!
//! Rounding happens here and nowhere upstream.

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::result::EmissionResult;

pub const MIN_DISPLAY_DECIMALS: u8 = 2;
pub const MAX_DISPLAY_DECIMALS: u8 = 4;

const REPORT_TEMPLATE: &str = "\
EMISSION ESTIMATE REPORT
========================

Activity        : {{ activity_kind }}
Category        : {{ category_key }}
{% if requested_category %}Requested       : {{ requested_category }} (not registered; default substituted)
{% endif %}Total           : {{ total }} kgCO2e
Emission factor : {{ factor }} {{ unit }}
Factor version  : {{ factor_version }}
Source          : {{ source_citation }}

Calculation
-----------
{{ formula_trace }}
{% if narrative %}
Narrative
---------
{{ narrative }}
{% endif %}";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report template failed to render: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Debug, Serialize)]
struct ReportView<'a> {
    activity_kind: &'a str,
    category_key: &'a str,
    requested_category: Option<&'a str>,
    total: String,
    factor: String,
    unit: &'static str,
    factor_version: &'a str,
    source_citation: &'a str,
    formula_trace: &'a str,
    narrative: Option<&'a str>,
}

/// Rounds `value` for display. `decimals` is clamped to 2..=4.
pub fn format_for_display(value: f64, decimals: u8) -> String {
    let decimals = usize::from(decimals.clamp(MIN_DISPLAY_DECIMALS, MAX_DISPLAY_DECIMALS));
    format!("{value:.decimals$}")
}

pub fn render_report(
    result: &EmissionResult,
    narrative: Option<&str>,
    display_decimals: u8,
) -> Result<String, ReportError> {
    let view = ReportView {
        activity_kind: result.activity_kind.as_str(),
        category_key: &result.category_key,
        requested_category: result.requested_category.as_deref(),
        total: format_for_display(result.total_kgco2e, display_decimals),
        factor: result.factor_used.to_string(),
        unit: result.unit.label(),
        factor_version: &result.factor_version,
        source_citation: &result.source_citation,
        formula_trace: &result.formula_trace,
        narrative: narrative.map(str::trim).filter(|text| !text.is_empty()),
    };

    let context = Context::from_serialize(&view)?;
    Ok(Tera::one_off(REPORT_TEMPLATE, &context, false)?)
}
