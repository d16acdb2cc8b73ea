use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parley_core::config::{default_config_paths, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|secret| redact_token(secret.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field::new("database.url", &config.database.url, &["PARLEY_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["PARLEY_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["PARLEY_DATABASE_TIMEOUT_SECS"],
        ),
        Field::new("llm.provider", format!("{:?}", config.llm.provider), &["PARLEY_LLM_PROVIDER"]),
        Field::new("llm.model", &config.llm.model, &["PARLEY_LLM_MODEL"]),
        Field::new(
            "llm.translator_model",
            config.llm.effective_translator_model(),
            &["PARLEY_LLM_TRANSLATOR_MODEL"],
        ),
        Field::new("llm.base_url", config.llm.effective_base_url(), &["PARLEY_LLM_BASE_URL"]),
        Field::new("llm.api_key", api_key, &["PARLEY_LLM_API_KEY", "OPENROUTER_API_KEY"]),
        Field::new(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["PARLEY_LLM_TIMEOUT_SECS"],
        ),
        Field::new(
            "llm.max_retries",
            config.llm.max_retries.to_string(),
            &["PARLEY_LLM_MAX_RETRIES"],
        ),
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            &["PARLEY_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port.to_string(), &["PARLEY_SERVER_PORT"]),
        Field::new(
            "router.command_keywords",
            config.router.command_keywords.join(","),
            &["PARLEY_ROUTER_COMMAND_KEYWORDS"],
        ),
        Field::new(
            "router.history_limit",
            config.router.history_limit.to_string(),
            &["PARLEY_ROUTER_HISTORY_LIMIT"],
        ),
        Field::new(
            "router.protected_collections",
            config.router.protected_collections.join(","),
            &["PARLEY_ROUTER_PROTECTED_COLLECTIONS"],
        ),
        Field::new(
            "router.allow_unfiltered_delete",
            config.router.allow_unfiltered_delete.to_string(),
            &["PARLEY_ROUTER_ALLOW_UNFILTERED_DELETE"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["PARLEY_LOGGING_LEVEL", "PARLEY_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["PARLEY_LOGGING_FORMAT", "PARLEY_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    default_config_paths().into_iter().find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
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

/// Keeps a provider prefix such as `sk-or` and hides everything after it.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.rsplit_once('-') {
        Some((prefix, _)) if prefix.len() <= 8 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
