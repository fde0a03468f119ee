use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use frontdesk_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "FRONTDESK_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "FRONTDESK_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "FRONTDESK_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "channels.whatsapp_token",
        &redact_secret(config.channels.whatsapp_token.as_ref()),
        source("channels.whatsapp_token", "FRONTDESK_WHATSAPP_TOKEN"),
    ));
    lines.push(render_line(
        "channels.instagram_token",
        &redact_secret(config.channels.instagram_token.as_ref()),
        source("channels.instagram_token", "FRONTDESK_INSTAGRAM_TOKEN"),
    ));

    lines.push(render_line(
        "responder.provider",
        &format!("{:?}", config.responder.provider),
        source("responder.provider", "FRONTDESK_RESPONDER_PROVIDER"),
    ));
    lines.push(render_line(
        "responder.model",
        &config.responder.model,
        source("responder.model", "FRONTDESK_RESPONDER_MODEL"),
    ));
    lines.push(render_line(
        "responder.api_key",
        &redact_secret(config.responder.api_key.as_ref()),
        source("responder.api_key", "FRONTDESK_RESPONDER_API_KEY"),
    ));

    lines.push(render_line(
        "engine.confidence_threshold",
        &config.engine.confidence_threshold.to_string(),
        source("engine.confidence_threshold", "FRONTDESK_CONFIDENCE_THRESHOLD"),
    ));
    lines.push(render_line(
        "engine.escalation_wait_minutes",
        &config.engine.escalation_wait_minutes.to_string(),
        source("engine.escalation_wait_minutes", "FRONTDESK_ESCALATION_WAIT_MINUTES"),
    ));
    lines.push(render_line(
        "engine.pending_action_ttl_minutes",
        &config.engine.pending_action_ttl_minutes.to_string(),
        source("engine.pending_action_ttl_minutes", ""),
    ));
    lines.push(render_line(
        "engine.default_override_ttl_minutes",
        &config.engine.default_override_ttl_minutes.to_string(),
        source("engine.default_override_ttl_minutes", ""),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "FRONTDESK_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "FRONTDESK_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("frontdesk.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/frontdesk.toml");
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
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if !env_key.is_empty() && env::var_os(env_key).is_some() {
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

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        Some(value) if value.expose_secret().trim().is_empty() => "<empty>".to_string(),
        Some(_) => "<redacted>".to_string(),
        None => "<unset>".to_string(),
    }
}
