use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub deck: DeckConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub endpoint: Option<String>,
    pub deployment: String,
    pub api_version: String,
    pub max_completion_tokens: u32,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

/// Backoff schedule for transient generation faults. One configurable
/// policy rather than separate retrying and non-retrying code paths.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub enabled: bool,
    pub base_delay_secs: u64,
    pub budget_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DeckConfig {
    pub template_path: PathBuf,
    pub timezone_offset_hours: i8,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub connection_string: Option<SecretString>,
    pub container: String,
    pub prefix: String,
    pub unique_suffix: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    AzureOpenAi,
    OpenAi,
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_endpoint: Option<String>,
    pub llm_deployment: Option<String>,
    pub retry_enabled: Option<bool>,
    pub template_path: Option<PathBuf>,
    pub storage_connection_string: Option<String>,
    pub storage_container: Option<String>,
    pub storage_unique_suffix: Option<bool>,
    pub log_level: Option<String>,
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
                provider: LlmProvider::AzureOpenAi,
                api_key: None,
                endpoint: None,
                deployment: "gpt-4o".to_string(),
                api_version: "2024-12-01-preview".to_string(),
                max_completion_tokens: 400,
                request_timeout_secs: 180,
                retry: RetryConfig { enabled: true, base_delay_secs: 1, budget_secs: 300 },
            },
            deck: DeckConfig {
                template_path: PathBuf::from("template.pptx"),
                timezone_offset_hours: 9,
            },
            storage: StorageConfig {
                connection_string: None,
                container: "pptstorage".to_string(),
                prefix: "generated".to_string(),
                unique_suffix: true,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected azure_openai|openai)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("deckgen.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(endpoint) = llm.endpoint {
                self.llm.endpoint = Some(endpoint);
            }
            if let Some(deployment) = llm.deployment {
                self.llm.deployment = deployment;
            }
            if let Some(api_version) = llm.api_version {
                self.llm.api_version = api_version;
            }
            if let Some(max_completion_tokens) = llm.max_completion_tokens {
                self.llm.max_completion_tokens = max_completion_tokens;
            }
            if let Some(request_timeout_secs) = llm.request_timeout_secs {
                self.llm.request_timeout_secs = request_timeout_secs;
            }
            if let Some(retry) = llm.retry {
                if let Some(enabled) = retry.enabled {
                    self.llm.retry.enabled = enabled;
                }
                if let Some(base_delay_secs) = retry.base_delay_secs {
                    self.llm.retry.base_delay_secs = base_delay_secs;
                }
                if let Some(budget_secs) = retry.budget_secs {
                    self.llm.retry.budget_secs = budget_secs;
                }
            }
        }

        if let Some(deck) = patch.deck {
            if let Some(template_path) = deck.template_path {
                self.deck.template_path = PathBuf::from(template_path);
            }
            if let Some(timezone_offset_hours) = deck.timezone_offset_hours {
                self.deck.timezone_offset_hours = timezone_offset_hours;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(connection_string_value) = storage.connection_string {
                self.storage.connection_string = Some(secret_value(connection_string_value));
            }
            if let Some(container) = storage.container {
                self.storage.container = container;
            }
            if let Some(prefix) = storage.prefix {
                self.storage.prefix = prefix;
            }
            if let Some(unique_suffix) = storage.unique_suffix {
                self.storage.unique_suffix = unique_suffix;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("DECKGEN_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("DECKGEN_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DECKGEN_LLM_ENDPOINT") {
            self.llm.endpoint = Some(value);
        }
        if let Some(value) = read_env("DECKGEN_LLM_DEPLOYMENT") {
            self.llm.deployment = value;
        }
        if let Some(value) = read_env("DECKGEN_LLM_API_VERSION") {
            self.llm.api_version = value;
        }
        if let Some(value) = read_env("DECKGEN_LLM_MAX_COMPLETION_TOKENS") {
            self.llm.max_completion_tokens =
                parse_u32("DECKGEN_LLM_MAX_COMPLETION_TOKENS", &value)?;
        }
        if let Some(value) = read_env("DECKGEN_LLM_REQUEST_TIMEOUT_SECS") {
            self.llm.request_timeout_secs = parse_u64("DECKGEN_LLM_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DECKGEN_LLM_RETRY_ENABLED") {
            self.llm.retry.enabled = parse_bool("DECKGEN_LLM_RETRY_ENABLED", &value)?;
        }
        if let Some(value) = read_env("DECKGEN_LLM_RETRY_BASE_DELAY_SECS") {
            self.llm.retry.base_delay_secs =
                parse_u64("DECKGEN_LLM_RETRY_BASE_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("DECKGEN_LLM_RETRY_BUDGET_SECS") {
            self.llm.retry.budget_secs = parse_u64("DECKGEN_LLM_RETRY_BUDGET_SECS", &value)?;
        }

        if let Some(value) = read_env("DECKGEN_DECK_TEMPLATE_PATH") {
            self.deck.template_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("DECKGEN_DECK_TIMEZONE_OFFSET_HOURS") {
            self.deck.timezone_offset_hours =
                parse_i8("DECKGEN_DECK_TIMEZONE_OFFSET_HOURS", &value)?;
        }

        if let Some(value) = read_env("DECKGEN_STORAGE_CONNECTION_STRING") {
            self.storage.connection_string = Some(secret_value(value));
        }
        if let Some(value) = read_env("DECKGEN_STORAGE_CONTAINER") {
            self.storage.container = value;
        }
        if let Some(value) = read_env("DECKGEN_STORAGE_PREFIX") {
            self.storage.prefix = value;
        }
        if let Some(value) = read_env("DECKGEN_STORAGE_UNIQUE_SUFFIX") {
            self.storage.unique_suffix = parse_bool("DECKGEN_STORAGE_UNIQUE_SUFFIX", &value)?;
        }

        if let Some(value) = read_env("DECKGEN_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DECKGEN_SERVER_PORT") {
            self.server.port = parse_u16("DECKGEN_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DECKGEN_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DECKGEN_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("DECKGEN_LOGGING_LEVEL").or_else(|| read_env("DECKGEN_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DECKGEN_LOGGING_FORMAT").or_else(|| read_env("DECKGEN_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_endpoint) = overrides.llm_endpoint {
            self.llm.endpoint = Some(llm_endpoint);
        }
        if let Some(llm_deployment) = overrides.llm_deployment {
            self.llm.deployment = llm_deployment;
        }
        if let Some(retry_enabled) = overrides.retry_enabled {
            self.llm.retry.enabled = retry_enabled;
        }
        if let Some(template_path) = overrides.template_path {
            self.deck.template_path = template_path;
        }
        if let Some(connection_string) = overrides.storage_connection_string {
            self.storage.connection_string = Some(secret_value(connection_string));
        }
        if let Some(container) = overrides.storage_container {
            self.storage.container = container;
        }
        if let Some(unique_suffix) = overrides.storage_unique_suffix {
            self.storage.unique_suffix = unique_suffix;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_deck(&self.deck)?;
        validate_storage(&self.storage)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("deckgen.toml"), PathBuf::from("config/deckgen.toml")]
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
    let api_key_missing = llm
        .api_key
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if api_key_missing {
        return Err(ConfigError::Validation(
            "llm.api_key is required (set DECKGEN_LLM_API_KEY or [llm] api_key)".to_string(),
        ));
    }

    let endpoint_missing =
        llm.endpoint.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
    if endpoint_missing {
        return Err(ConfigError::Validation(
            "llm.endpoint is required (set DECKGEN_LLM_ENDPOINT or [llm] endpoint)".to_string(),
        ));
    }
    if let Some(endpoint) = &llm.endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.endpoint must start with http:// or https://".to_string(),
            ));
        }
    }

    if llm.deployment.trim().is_empty() {
        return Err(ConfigError::Validation("llm.deployment must not be empty".to_string()));
    }

    if llm.max_completion_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_completion_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.request_timeout_secs == 0 || llm.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.retry.enabled {
        if llm.retry.base_delay_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.retry.base_delay_secs must be greater than zero".to_string(),
            ));
        }
        if llm.retry.budget_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.retry.budget_secs must be greater than zero".to_string(),
            ));
        }
        if llm.request_timeout_secs > llm.retry.budget_secs {
            return Err(ConfigError::Validation(
                "llm.request_timeout_secs must not exceed llm.retry.budget_secs".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_deck(deck: &DeckConfig) -> Result<(), ConfigError> {
    if deck.template_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("deck.template_path must not be empty".to_string()));
    }

    if !(-12..=14).contains(&deck.timezone_offset_hours) {
        return Err(ConfigError::Validation(
            "deck.timezone_offset_hours must be in range -12..=14".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.container.trim().is_empty() {
        return Err(ConfigError::Validation("storage.container must not be empty".to_string()));
    }

    let prefix = storage.prefix.trim();
    if prefix.is_empty() || prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(ConfigError::Validation(
            "storage.prefix must be a non-empty path segment without leading or trailing slashes"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i8(key: &str, value: &str) -> Result<i8, ConfigError> {
    value.parse::<i8>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    deck: Option<DeckPatch>,
    storage: Option<StoragePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    endpoint: Option<String>,
    deployment: Option<String>,
    api_version: Option<String>,
    max_completion_tokens: Option<u32>,
    request_timeout_secs: Option<u64>,
    retry: Option<RetryPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    enabled: Option<bool>,
    base_delay_secs: Option<u64>,
    budget_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DeckPatch {
    template_path: Option<String>,
    timezone_offset_hours: Option<i8>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    connection_string: Option<String>,
    container: Option<String>,
    prefix: Option<String>,
    unique_suffix: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
