use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calc::policy::UnknownCategoryPolicy;
use crate::domain::activity::FuelQuantityBasis;
use crate::report::{MAX_DISPLAY_DECIMALS, MIN_DISPLAY_DECIMALS};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub factors: FactorsConfig,
    pub policy: PolicyConfig,
    pub report: ReportConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_tool_rounds: u32,
}

#[derive(Clone, Debug, Default)]
pub struct FactorsConfig {
    /// Unset means the table compiled into the binary.
    pub table_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct PolicyConfig {
    pub on_unknown_category: UnknownCategoryPolicy,
    pub default_logistics_category: Option<String>,
    pub default_electricity_category: Option<String>,
    pub fuel_quantity_basis: FuelQuantityBasis,
}

#[derive(Clone, Debug)]
pub struct ReportConfig {
    pub display_decimals: u8,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Groq,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_enabled: Option<bool>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub factors_table_path: Option<PathBuf>,
    pub on_unknown_category: Option<UnknownCategoryPolicy>,
    pub fuel_quantity_basis: Option<FuelQuantityBasis>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                enabled: true,
                provider: LlmProvider::Groq,
                api_key: None,
                base_url: None,
                model: "llama-3.3-70b-versatile".to_string(),
                temperature: 0.0,
                timeout_secs: 30,
                max_tool_rounds: 3,
            },
            factors: FactorsConfig::default(),
            policy: PolicyConfig {
                on_unknown_category: UnknownCategoryPolicy::Reject,
                default_logistics_category: None,
                default_electricity_category: Some("listrik_indonesia".to_string()),
                fuel_quantity_basis: FuelQuantityBasis::Liters,
            },
            report: ReportConfig { display_decimals: MIN_DISPLAY_DECIMALS },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected groq|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("karbon.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(enabled) = llm.enabled {
                self.llm.enabled = enabled;
            }
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tool_rounds) = llm.max_tool_rounds {
                self.llm.max_tool_rounds = max_tool_rounds;
            }
        }

        if let Some(factors) = patch.factors {
            if let Some(table_path) = factors.table_path {
                self.factors.table_path = Some(table_path);
            }
        }

        if let Some(policy) = patch.policy {
            if let Some(on_unknown_category) = policy.on_unknown_category {
                self.policy.on_unknown_category = on_unknown_category;
            }
            if let Some(key) = policy.default_logistics_category {
                self.policy.default_logistics_category = Some(key);
            }
            if let Some(key) = policy.default_electricity_category {
                self.policy.default_electricity_category = Some(key);
            }
            if let Some(basis) = policy.fuel_quantity_basis {
                self.policy.fuel_quantity_basis = basis;
            }
        }

        if let Some(report) = patch.report {
            if let Some(display_decimals) = report.display_decimals {
                self.report.display_decimals = display_decimals;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("KARBON_LLM_ENABLED") {
            self.llm.enabled = parse_bool("KARBON_LLM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("KARBON_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("KARBON_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("KARBON_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("KARBON_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("KARBON_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("KARBON_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("KARBON_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("KARBON_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("KARBON_LLM_MAX_TOOL_ROUNDS") {
            self.llm.max_tool_rounds = parse_u32("KARBON_LLM_MAX_TOOL_ROUNDS", &value)?;
        }

        if let Some(value) = read_env("KARBON_FACTORS_TABLE_PATH") {
            self.factors.table_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("KARBON_POLICY_ON_UNKNOWN_CATEGORY") {
            self.policy.on_unknown_category = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "KARBON_POLICY_ON_UNKNOWN_CATEGORY".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("KARBON_POLICY_DEFAULT_LOGISTICS_CATEGORY") {
            self.policy.default_logistics_category = Some(value);
        }
        if let Some(value) = read_env("KARBON_POLICY_DEFAULT_ELECTRICITY_CATEGORY") {
            self.policy.default_electricity_category = Some(value);
        }
        if let Some(value) = read_env("KARBON_POLICY_FUEL_QUANTITY_BASIS") {
            self.policy.fuel_quantity_basis =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "KARBON_POLICY_FUEL_QUANTITY_BASIS".to_string(),
                    value: value.clone(),
                })?;
        }

        if let Some(value) = read_env("KARBON_REPORT_DISPLAY_DECIMALS") {
            self.report.display_decimals = parse_u8("KARBON_REPORT_DISPLAY_DECIMALS", &value)?;
        }

        if let Some(value) = read_env("KARBON_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("KARBON_SERVER_PORT") {
            self.server.port = parse_u16("KARBON_SERVER_PORT", &value)?;
        }

        let log_level = read_env("KARBON_LOGGING_LEVEL").or_else(|| read_env("KARBON_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("KARBON_LOGGING_FORMAT").or_else(|| read_env("KARBON_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(table_path) = overrides.factors_table_path {
            self.factors.table_path = Some(table_path);
        }
        if let Some(on_unknown_category) = overrides.on_unknown_category {
            self.policy.on_unknown_category = on_unknown_category;
        }
        if let Some(basis) = overrides.fuel_quantity_basis {
            self.policy.fuel_quantity_basis = basis;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_policy(&self.policy)?;
        validate_report(&self.report)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("karbon.toml"), PathBuf::from("config/karbon.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_tool_rounds == 0 || llm.max_tool_rounds > 8 {
        return Err(ConfigError::Validation(
            "llm.max_tool_rounds must be in range 1..=8".to_string(),
        ));
    }

    if !llm.temperature.is_finite() || !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = &llm.base_url {
        let base_url = base_url.trim();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if llm.enabled && llm.provider.requires_api_key() {
        let missing =
            llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for the {} provider. Set KARBON_LLM_API_KEY, or set \
                 KARBON_LLM_ENABLED=false to run without narrative text",
                llm.provider.as_str()
            )));
        }
    }

    Ok(())
}

fn validate_policy(policy: &PolicyConfig) -> Result<(), ConfigError> {
    for (field, value) in [
        ("policy.default_logistics_category", &policy.default_logistics_category),
        ("policy.default_electricity_category", &policy.default_electricity_category),
    ] {
        if value.as_deref().is_some_and(|key| key.trim().is_empty()) {
            return Err(ConfigError::Validation(format!("{field} must not be empty when set")));
        }
    }

    let has_default = policy.default_logistics_category.is_some()
        || policy.default_electricity_category.is_some();
    if policy.on_unknown_category == UnknownCategoryPolicy::Default && !has_default {
        return Err(ConfigError::Validation(
            "policy.on_unknown_category = \"default\" needs policy.default_logistics_category or \
             policy.default_electricity_category"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_report(report: &ReportConfig) -> Result<(), ConfigError> {
    if !(MIN_DISPLAY_DECIMALS..=MAX_DISPLAY_DECIMALS).contains(&report.display_decimals) {
        return Err(ConfigError::Validation(format!(
            "report.display_decimals must be in range {MIN_DISPLAY_DECIMALS}..={MAX_DISPLAY_DECIMALS}"
        )));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.trim().parse::<u8>().map_err(|_| invalid_override(key, value))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid_override(key, value)),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    factors: Option<FactorsPatch>,
    policy: Option<PolicyPatch>,
    report: Option<ReportPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    enabled: Option<bool>,
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
    max_tool_rounds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FactorsPatch {
    table_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyPatch {
    on_unknown_category: Option<UnknownCategoryPolicy>,
    default_logistics_category: Option<String>,
    default_electricity_category: Option<String>,
    fuel_quantity_basis: Option<FuelQuantityBasis>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportPatch {
    display_decimals: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
