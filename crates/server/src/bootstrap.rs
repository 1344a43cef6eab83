use std::sync::Arc;

use deckgen_agent::{ChatClient, ClientBuildError, OpenAiChatClient, OutlineGenerator, RetryPolicy};
use deckgen_core::config::{AppConfig, ConfigError, LoadOptions};
use deckgen_pptx::DeckBuilder;
use deckgen_storage::{ConnectionStringError, Publisher};
use thiserror::Error;
use tracing::info;

use crate::health::HealthState;

/// Shared, immutable per-process state handed to the request handlers.
/// Everything request-scoped (outline, deck buffer, filename) is created
/// inside the handler; concurrent requests share only these clients.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<dyn ChatClient>,
    pub generator: Arc<OutlineGenerator>,
    pub builder: Arc<DeckBuilder>,
    pub publisher: Arc<dyn Publisher>,
    pub timezone_offset_hours: i8,
    pub unique_suffix: bool,
}

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
    pub health_state: HealthState,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application").finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("chat client construction failed: {0}")]
    LlmClient(#[from] ClientBuildError),
    #[error("storage configuration is invalid: {0}")]
    Storage(#[from] ConnectionStringError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let chat: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::from_config(&config.llm)?);
    let generator = Arc::new(
        OutlineGenerator::new(Arc::clone(&chat), RetryPolicy::from_config(&config.llm.retry))
            .with_max_completion_tokens(config.llm.max_completion_tokens),
    );
    let builder = Arc::new(DeckBuilder::from_config(&config.deck));
    let publisher = deckgen_storage::from_config(&config.storage)?;

    info!(
        event_name = "system.bootstrap.clients_ready",
        provider = ?config.llm.provider,
        retry_enabled = config.llm.retry.enabled,
        storage_configured = config.storage.connection_string.is_some(),
        "external clients constructed"
    );

    let state = AppState {
        chat,
        generator,
        builder,
        publisher,
        timezone_offset_hours: config.deck.timezone_offset_hours,
        unique_suffix: config.storage.unique_suffix,
    };
    let health_state = HealthState {
        template_path: config.deck.template_path.clone(),
        storage_configured: config.storage.connection_string.is_some(),
    };

    Ok(Application { config, state, health_state })
}

#[cfg(test)]
mod tests {
    use deckgen_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("test-key".to_string()),
                llm_endpoint: Some("https://example.openai.azure.com".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[test]
    fn bootstrap_succeeds_with_minimal_llm_settings() {
        let app = bootstrap(valid_overrides()).expect("bootstrap should succeed");
        assert!(!app.health_state.storage_configured, "no connection string was provided");
        assert!(app.state.unique_suffix, "unique filename suffix defaults on");
    }

    #[test]
    fn bootstrap_wires_storage_when_connection_string_is_present() {
        let mut options = valid_overrides();
        options.overrides.storage_connection_string =
            Some("AccountName=pptacct;AccountKey=a2V5".to_string());

        let app = bootstrap(options).expect("bootstrap should succeed");
        assert!(app.health_state.storage_configured);
    }

    #[test]
    fn bootstrap_rejects_malformed_connection_string() {
        let mut options = valid_overrides();
        options.overrides.storage_connection_string = Some("AccountKey=only".to_string());

        let error = bootstrap(options).expect_err("missing account name should fail fast");
        assert!(error.to_string().contains("AccountName"));
    }
}
