use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use karbon_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run(load_options: LoadOptions) -> String {
    let explicit_path = load_options.config_path.clone();
    let config = match AppConfig::load(load_options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(explicit_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let table_path = config
        .factors
        .table_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<built-in>".to_string());

    let fields: Vec<(&str, String, &str)> = vec![
        ("llm.enabled", config.llm.enabled.to_string(), "KARBON_LLM_ENABLED"),
        ("llm.provider", config.llm.provider.as_str().to_string(), "KARBON_LLM_PROVIDER"),
        ("llm.model", config.llm.model.clone(), "KARBON_LLM_MODEL"),
        ("llm.base_url", config.llm.effective_base_url().to_string(), "KARBON_LLM_BASE_URL"),
        ("llm.api_key", llm_api_key.to_string(), "KARBON_LLM_API_KEY"),
        ("llm.temperature", config.llm.temperature.to_string(), "KARBON_LLM_TEMPERATURE"),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), "KARBON_LLM_TIMEOUT_SECS"),
        (
            "llm.max_tool_rounds",
            config.llm.max_tool_rounds.to_string(),
            "KARBON_LLM_MAX_TOOL_ROUNDS",
        ),
        ("factors.table_path", table_path, "KARBON_FACTORS_TABLE_PATH"),
        (
            "policy.on_unknown_category",
            format!("{:?}", config.policy.on_unknown_category).to_ascii_lowercase(),
            "KARBON_POLICY_ON_UNKNOWN_CATEGORY",
        ),
        (
            "policy.default_logistics_category",
            config.policy.default_logistics_category.clone().unwrap_or_else(|| "<unset>".into()),
            "KARBON_POLICY_DEFAULT_LOGISTICS_CATEGORY",
        ),
        (
            "policy.default_electricity_category",
            config.policy.default_electricity_category.clone().unwrap_or_else(|| "<unset>".into()),
            "KARBON_POLICY_DEFAULT_ELECTRICITY_CATEGORY",
        ),
        (
            "policy.fuel_quantity_basis",
            format!("{:?}", config.policy.fuel_quantity_basis).to_ascii_lowercase(),
            "KARBON_POLICY_FUEL_QUANTITY_BASIS",
        ),
        (
            "report.display_decimals",
            config.report.display_decimals.to_string(),
            "KARBON_REPORT_DISPLAY_DECIMALS",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "KARBON_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "KARBON_SERVER_PORT"),
        ("logging.level", config.logging.level.clone(), "KARBON_LOGGING_LEVEL"),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            "KARBON_LOGGING_FORMAT",
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in fields {
        let source = field_source(
            key,
            Some(env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn detect_config_path(explicit_path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path);
    }

    let root = PathBuf::from("karbon.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/karbon.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
