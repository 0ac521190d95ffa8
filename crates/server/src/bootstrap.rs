use std::sync::Arc;
use std::time::Duration;

use karbon_agent::audit::TracingAuditSink;
use karbon_agent::llm::OpenAiCompatibleClient;
use karbon_agent::narrative::NarrativeGenerator;
use karbon_core::calc::CalculationEngine;
use karbon_core::config::{AppConfig, ConfigError};
use karbon_core::errors::ApplicationError;
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub state: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("calculation engine unavailable: {0}")]
    Engine(#[source] ApplicationError),
    #[error("llm client could not be built: {0}")]
    LlmClient(String),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let engine = CalculationEngine::from_config(&config).map_err(BootstrapError::Engine)?;
    info!(
        event_name = "system.bootstrap.factor_table_loaded",
        correlation_id = "bootstrap",
        factor_version = %engine.table().version(),
        fingerprint = %engine.table().fingerprint(),
        entries = engine.table().len(),
        strict = engine.policy().is_strict(),
        "factor table loaded"
    );

    let narrator = if config.llm.enabled {
        let client = OpenAiCompatibleClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::LlmClient(error.to_string()))?;
        info!(
            event_name = "system.bootstrap.narrator_ready",
            correlation_id = "bootstrap",
            provider = config.llm.provider.as_str(),
            model = %config.llm.model,
            "narrative collaborator configured"
        );
        let generator =
            NarrativeGenerator::new(Arc::new(client), Duration::from_secs(config.llm.timeout_secs))
                .with_temperature(config.llm.temperature)
                .with_display_decimals(config.report.display_decimals)
                .with_audit_sink(Arc::new(TracingAuditSink));
        Some(Arc::new(generator))
    } else {
        None
    };

    let state = ApiState::new(Arc::new(engine), config.report.display_decimals)
        .with_narrator(narrator);
    Ok(Application { config, state })
}

#[cfg(test)]
mod tests {
    use karbon_core::calc::policy::UnknownCategoryPolicy;
    use karbon_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    fn bootstrap(overrides: ConfigOverrides) -> Result<Application, BootstrapError> {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { llm_enabled: Some(false), ..overrides },
            ..LoadOptions::default()
        })?;
        bootstrap_with_config(config)
    }

    #[test]
    fn bootstrap_without_llm_has_no_narrator() {
        let app = bootstrap(ConfigOverrides::default()).expect("bootstrap");
        assert!(!app.state.narration_enabled());
        assert_eq!(app.state.engine().table().version(), "2024.1");
    }

    #[test]
    fn bootstrap_applies_policy_override() {
        let app = bootstrap(ConfigOverrides {
            on_unknown_category: Some(UnknownCategoryPolicy::Default),
            ..ConfigOverrides::default()
        })
        .expect("bootstrap");
        assert!(!app.state.engine().policy().is_strict());
    }

    #[test]
    fn bootstrap_fails_fast_on_missing_table_file() {
        let result = bootstrap(ConfigOverrides {
            factors_table_path: Some("does/not/exist.toml".into()),
            ..ConfigOverrides::default()
        });
        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("calculation engine unavailable"), "got: {message}");
    }
}
