use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use deckgen_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let doc = config_file_doc.as_ref();
    let path = config_file_path.as_deref();

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|value| redact(value.expose_secret()))
        .unwrap_or_else(|| "[unset]".to_string());
    let connection_string = config
        .storage
        .connection_string
        .as_ref()
        .map(|value| redact(value.expose_secret()))
        .unwrap_or_else(|| "[unset]".to_string());

    let rows: Vec<(&str, String, Option<&str>)> = vec![
        ("llm.provider", format!("{:?}", config.llm.provider), Some("DECKGEN_LLM_PROVIDER")),
        (
            "llm.endpoint",
            config.llm.endpoint.clone().unwrap_or_else(|| "[unset]".to_string()),
            Some("DECKGEN_LLM_ENDPOINT"),
        ),
        ("llm.api_key", api_key, Some("DECKGEN_LLM_API_KEY")),
        ("llm.deployment", config.llm.deployment.clone(), Some("DECKGEN_LLM_DEPLOYMENT")),
        ("llm.api_version", config.llm.api_version.clone(), Some("DECKGEN_LLM_API_VERSION")),
        (
            "llm.max_completion_tokens",
            config.llm.max_completion_tokens.to_string(),
            Some("DECKGEN_LLM_MAX_COMPLETION_TOKENS"),
        ),
        (
            "llm.request_timeout_secs",
            config.llm.request_timeout_secs.to_string(),
            Some("DECKGEN_LLM_REQUEST_TIMEOUT_SECS"),
        ),
        (
            "llm.retry.enabled",
            config.llm.retry.enabled.to_string(),
            Some("DECKGEN_LLM_RETRY_ENABLED"),
        ),
        (
            "llm.retry.base_delay_secs",
            config.llm.retry.base_delay_secs.to_string(),
            Some("DECKGEN_LLM_RETRY_BASE_DELAY_SECS"),
        ),
        (
            "llm.retry.budget_secs",
            config.llm.retry.budget_secs.to_string(),
            Some("DECKGEN_LLM_RETRY_BUDGET_SECS"),
        ),
        (
            "deck.template_path",
            config.deck.template_path.display().to_string(),
            Some("DECKGEN_DECK_TEMPLATE_PATH"),
        ),
        (
            "deck.timezone_offset_hours",
            config.deck.timezone_offset_hours.to_string(),
            Some("DECKGEN_DECK_TIMEZONE_OFFSET_HOURS"),
        ),
        (
            "storage.connection_string",
            connection_string,
            Some("DECKGEN_STORAGE_CONNECTION_STRING"),
        ),
        ("storage.container", config.storage.container.clone(), Some("DECKGEN_STORAGE_CONTAINER")),
        ("storage.prefix", config.storage.prefix.clone(), Some("DECKGEN_STORAGE_PREFIX")),
        (
            "storage.unique_suffix",
            config.storage.unique_suffix.to_string(),
            Some("DECKGEN_STORAGE_UNIQUE_SUFFIX"),
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            Some("DECKGEN_SERVER_BIND_ADDRESS"),
        ),
        ("server.port", config.server.port.to_string(), Some("DECKGEN_SERVER_PORT")),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            Some("DECKGEN_SERVER_GRACEFUL_SHUTDOWN_SECS"),
        ),
        ("logging.level", config.logging.level.clone(), Some("DECKGEN_LOGGING_LEVEL")),
        ("logging.format", format!("{:?}", config.logging.format), Some("DECKGEN_LOGGING_FORMAT")),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_var) in rows {
        lines.push(render_line(key, &value, field_source(key, env_var, doc, path)));
    }
    lines.join("\n")
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("  {key} = {value} ({source})")
}

fn detect_config_path() -> Option<PathBuf> {
    ["deckgen.toml", "config/deckgen.toml"].iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    dotted_key: &str,
    env_var: Option<&str>,
    doc: Option<&Value>,
    path: Option<&Path>,
) -> String {
    if let Some(var) = env_var {
        if env::var(var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env:{var}");
        }
    }

    if let (Some(doc), Some(path)) = (doc, path) {
        if lookup_dotted(doc, dotted_key) {
            return format!("file:{}", path.display());
        }
    }

    "default".to_string()
}

fn lookup_dotted(doc: &Value, dotted_key: &str) -> bool {
    let mut current = doc;
    for part in dotted_key.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn redact(value: &str) -> String {
    if value.chars().count() <= 4 {
        "****".to_string()
    } else {
        let prefix: String = value.chars().take(4).collect();
        format!("{prefix}****")
    }
}
