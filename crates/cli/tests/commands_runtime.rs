use std::env;
use std::fs;
use std::io::Cursor;
use std::sync::{Mutex, OnceLock};

use karbon_cli::commands::calculate::{CalculationOptions, CalculationRequest};
use karbon_cli::commands::{calculate, categories, chat, config, doctor};
use karbon_core::config::LoadOptions;
use serde_json::Value;

const OFFLINE: (&str, &str) = ("KARBON_LLM_ENABLED", "false");

fn logistics(weight_kg: f64, distance_km: f64, category_key: &str) -> CalculationRequest {
    CalculationRequest::Logistics { weight_kg, distance_km, category_key: category_key.to_string() }
}

#[test]
fn logistics_returns_rounded_total() {
    with_env(&[OFFLINE], || {
        let result = calculate::run(
            logistics(10.0, 50.0, "truk_diesel_kecil"),
            CalculationOptions::default(),
            LoadOptions::default(),
        );
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "logistics");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["display_total"], "0.14");
        assert_eq!(payload["data"]["result"]["category_key"], "truk_diesel_kecil");
        assert_eq!(payload["data"]["result"]["factor_version"], "2024.1");
        assert!(payload["data"]["narrative"].is_null());
    });
}

#[test]
fn strict_policy_asks_for_clarification() {
    with_env(&[OFFLINE], || {
        let result = calculate::run(
            logistics(10.0, 50.0, "pesawat"),
            CalculationOptions::default(),
            LoadOptions::default(),
        );
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "clarification_required");
        let candidates = payload["data"]["clarification"]["candidate_categories"]
            .as_array()
            .expect("candidate list");
        assert!(candidates.iter().any(|key| key == "pesawat_kargo_domestik"));
        assert!(payload["data"]["result"].is_null());
    });
}

#[test]
fn permissive_policy_substitutes_default_electricity() {
    with_env(&[OFFLINE, ("KARBON_POLICY_ON_UNKNOWN_CATEGORY", "default")], || {
        let result = calculate::run(
            CalculationRequest::Electricity { kwh: 100.0, category_key: "listrik_papua".into() },
            CalculationOptions::default(),
            LoadOptions::default(),
        );
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["display_total"], "79.00");
        assert_eq!(payload["data"]["result"]["category_key"], "listrik_indonesia");
        assert_eq!(payload["data"]["result"]["requested_category"], "listrik_papua");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("`listrik_papua` is not registered"));
    });
}

#[test]
fn negative_quantity_is_invalid_input() {
    with_env(&[OFFLINE], || {
        let result = calculate::run(
            logistics(-5.0, 50.0, "truk_diesel_kecil"),
            CalculationOptions::default(),
            LoadOptions::default(),
        );
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_input");
        assert_eq!(payload["data"]["field"], "weight_kg");
    });
}

#[test]
fn unknown_fuel_kind_is_invalid_input() {
    with_env(&[OFFLINE], || {
        let result = calculate::run(
            CalculationRequest::Fuel { quantity: 20.0, fuel_kind: "kerosene".into() },
            CalculationOptions::default(),
            LoadOptions::default(),
        );
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["data"]["field"], "fuel_kind");
    });
}

#[test]
fn diesel_liters_use_liter_factor() {
    with_env(&[OFFLINE], || {
        let result = calculate::run(
            CalculationRequest::Fuel { quantity: 20.0, fuel_kind: "solar".into() },
            CalculationOptions::default(),
            LoadOptions::default(),
        );
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["display_total"], "53.60");
        assert_eq!(payload["data"]["result"]["category_key"], "diesel");
    });
}

#[test]
fn missing_api_key_fails_config_validation() {
    with_env(&[], || {
        let result = calculate::run(
            logistics(10.0, 50.0, "truk_diesel_kecil"),
            CalculationOptions::default(),
            LoadOptions::default(),
        );
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("KARBON_LLM_API_KEY"));
    });
}

#[test]
fn narrate_without_llm_keeps_the_number() {
    with_env(&[OFFLINE], || {
        let options = CalculationOptions { narrate: true, ..CalculationOptions::default() };
        let request =
            CalculationRequest::Electricity { kwh: 100.0, category_key: "listrik_jawa_bali".into() };
        let result = calculate::run(request, options, LoadOptions::default());
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["display_total"], "79.00");
        assert!(payload["data"]["narrative"].is_null());
        let narrative_error = payload["data"]["narrative_error"].as_str().unwrap_or_default();
        assert!(narrative_error.contains("disabled"));
    });
}

#[test]
fn report_is_written_to_requested_path() {
    with_env(&[OFFLINE], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        let options = CalculationOptions { report_path: Some(path.clone()), ..Default::default() };

        let result = calculate::run(
            logistics(10.0, 50.0, "truk_diesel_kecil"),
            options,
            LoadOptions::default(),
        );
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let report = fs::read_to_string(&path).expect("report written");
        assert!(report.contains("truk_diesel_kecil"));
        assert!(report.contains("0.14"));
        assert!(report.contains("2024.1"));
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["report_path"], path.display().to_string());
    });
}

#[test]
fn unwritable_report_path_keeps_result_in_payload() {
    with_env(&[OFFLINE], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing-dir").join("report.txt");
        let options = CalculationOptions { report_path: Some(path), ..Default::default() };

        let result = calculate::run(
            logistics(10.0, 50.0, "truk_diesel_kecil"),
            options,
            LoadOptions::default(),
        );
        assert_eq!(result.exit_code, 5);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "report_write");
        assert_eq!(payload["data"]["display_total"], "0.14");
    });
}

#[test]
fn categories_lists_registered_keys_per_kind() {
    with_env(&[OFFLINE], || {
        let result = categories::run(None, LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["factor_version"], "2024.1");
        let logistics = payload["data"]["categories"]["logistics"].as_array().expect("list");
        assert!(logistics.iter().any(|key| key == "truk_diesel_kecil"));
        let fuel = payload["data"]["categories"]["fuel"].as_array().expect("list");
        assert!(fuel.iter().any(|key| key == "diesel"));
    });
}

#[test]
fn categories_rejects_unknown_kind() {
    with_env(&[OFFLINE], || {
        let result = categories::run(Some("water"), LoadOptions::default());
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn chat_requires_enabled_llm() {
    with_env(&[OFFLINE], || {
        let mut output = Vec::new();
        let result = chat::run_with_io(Cursor::new("halo\n"), &mut output, LoadOptions::default());
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "llm_disabled");
        assert!(output.is_empty());
    });
}

#[test]
fn config_redacts_api_key_and_names_env_source() {
    with_env(&[("KARBON_LLM_API_KEY", "gsk-secret-value")], || {
        let output = config::run(LoadOptions::default());
        assert!(output.contains("- llm.api_key = <redacted> (source: env (KARBON_LLM_API_KEY))"));
        assert!(!output.contains("gsk-secret-value"));
        assert!(output.contains("- policy.on_unknown_category = reject (source: default)"));
    });
}

#[test]
fn doctor_passes_offline_and_skips_llm() {
    with_env(&[OFFLINE], || {
        let report: Value =
            serde_json::from_str(&doctor::run(true, LoadOptions::default())).expect("json");
        assert_eq!(report["overall_status"], "pass");

        let checks = report["checks"].as_array().expect("checks");
        let status_of = |name: &str| {
            checks.iter().find(|check| check["name"] == name).map(|check| check["status"].clone())
        };
        assert_eq!(status_of("factor_table"), Some(Value::from("pass")));
        assert_eq!(status_of("category_policy"), Some(Value::from("pass")));
        assert_eq!(status_of("llm_readiness"), Some(Value::from("skipped")));
    });
}

#[test]
fn doctor_flags_unknown_default_category() {
    with_env(
        &[
            OFFLINE,
            ("KARBON_POLICY_ON_UNKNOWN_CATEGORY", "default"),
            ("KARBON_POLICY_DEFAULT_ELECTRICITY_CATEGORY", "listrik_mars"),
        ],
        || {
            let output = doctor::run(false, LoadOptions::default());
            assert!(output.starts_with("doctor: one or more readiness checks failed"));
            assert!(output.contains("- [fail] category_policy:"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "KARBON_LLM_ENABLED",
        "KARBON_LLM_PROVIDER",
        "KARBON_LLM_API_KEY",
        "KARBON_LLM_BASE_URL",
        "KARBON_LLM_MODEL",
        "KARBON_LLM_TEMPERATURE",
        "KARBON_LLM_TIMEOUT_SECS",
        "KARBON_LLM_MAX_TOOL_ROUNDS",
        "KARBON_FACTORS_TABLE_PATH",
        "KARBON_POLICY_ON_UNKNOWN_CATEGORY",
        "KARBON_POLICY_DEFAULT_LOGISTICS_CATEGORY",
        "KARBON_POLICY_DEFAULT_ELECTRICITY_CATEGORY",
        "KARBON_POLICY_FUEL_QUANTITY_BASIS",
        "KARBON_REPORT_DISPLAY_DECIMALS",
        "KARBON_SERVER_BIND_ADDRESS",
        "KARBON_SERVER_PORT",
        "KARBON_LOGGING_LEVEL",
        "KARBON_LOGGING_FORMAT",
        "KARBON_LOG_LEVEL",
        "KARBON_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
