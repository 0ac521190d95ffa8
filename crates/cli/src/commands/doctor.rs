use std::sync::Arc;

use karbon_core::calc::policy::CategoryPolicy;
use karbon_core::calc::CalculationEngine;
use karbon_core::config::{AppConfig, LoadOptions};
use karbon_core::factors::FactorTable;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool, load_options: LoadOptions) -> String {
    let report = build_report(load_options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(load_options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(load_options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            match check_factor_table(&config) {
                Ok((check, table)) => {
                    checks.push(check);
                    checks.push(check_category_policy(&config, table));
                }
                Err(check) => {
                    checks.push(check);
                    checks.push(skipped("category_policy", "factor table did not load"));
                }
            }
            checks.push(check_llm_readiness(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["factor_table", "category_policy", "llm_readiness"] {
                checks.push(skipped(name, "configuration did not load"));
            }
        }
    }

    // Skipped checks do not fail the run.
    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, because: &str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: format!("skipped because {because}"),
    }
}

fn check_factor_table(config: &AppConfig) -> Result<(DoctorCheck, FactorTable), DoctorCheck> {
    match FactorTable::load_or_builtin(config.factors.table_path.as_deref()) {
        Ok(table) => {
            let source = config
                .factors
                .table_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "built-in".to_string());
            let check = DoctorCheck {
                name: "factor_table",
                status: CheckStatus::Pass,
                details: format!(
                    "version {} from {source}: {} entries, fingerprint {}",
                    table.version(),
                    table.len(),
                    table.fingerprint()
                ),
            };
            Ok((check, table))
        }
        Err(error) => Err(DoctorCheck {
            name: "factor_table",
            status: CheckStatus::Fail,
            details: error.to_string(),
        }),
    }
}

fn check_category_policy(config: &AppConfig, table: FactorTable) -> DoctorCheck {
    let policy = CategoryPolicy::from_settings(
        config.policy.on_unknown_category,
        config.policy.default_logistics_category.as_deref(),
        config.policy.default_electricity_category.as_deref(),
    );
    let mode = if policy.is_strict() { "strict" } else { "permissive" };

    match CalculationEngine::new(Arc::new(table), policy) {
        Ok(_) => DoctorCheck {
            name: "category_policy",
            status: CheckStatus::Pass,
            details: format!("{mode} policy consistent with factor table"),
        },
        Err(error) => DoctorCheck {
            name: "category_policy",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    if !llm.enabled {
        return skipped("llm_readiness", "llm.enabled = false");
    }

    let key_state = if llm.api_key.is_some() {
        "api key present"
    } else if llm.provider.requires_api_key() {
        return DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Fail,
            details: format!("provider `{}` requires llm.api_key", llm.provider.as_str()),
        };
    } else {
        "no api key required"
    };

    DoctorCheck {
        name: "llm_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "provider `{}` model `{}` at {} ({key_state})",
            llm.provider.as_str(),
            llm.model,
            llm.effective_base_url()
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
