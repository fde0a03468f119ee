use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::phrases::{PhraseVocabulary, TopicFilter};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub channels: ChannelsConfig,
    pub responder: ResponderConfig,
    pub engine: EngineConfig,
    pub phrases: PhrasesConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ChannelsConfig {
    pub whatsapp_token: Option<SecretString>,
    pub instagram_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct ResponderConfig {
    pub provider: ResponderProvider,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Orchestration tunables. Time windows are minutes because managers set them
/// from chat ("closed for 2 hours" parses to 120).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub confidence_threshold: f32,
    pub escalation_wait_minutes: i64,
    pub pending_action_ttl_minutes: i64,
    pub default_override_ttl_minutes: i64,
}

#[derive(Clone, Debug, Default)]
pub struct PhrasesConfig {
    pub vocabulary: PhraseVocabulary,
    pub topic_filter: TopicFilter,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
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
            database: DatabaseConfig {
                url: "sqlite://frontdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            channels: ChannelsConfig { whatsapp_token: None, instagram_token: None },
            responder: ResponderConfig {
                provider: ResponderProvider::Ollama,
                api_key: None,
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            engine: EngineConfig {
                confidence_threshold: 0.6,
                escalation_wait_minutes: 15,
                pending_action_ttl_minutes: 10,
                default_override_ttl_minutes: 480,
            },
            phrases: PhrasesConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for ResponderProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported responder provider `{other}` (expected openai|anthropic|ollama)"
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    channels: Option<ChannelsPatch>,
    responder: Option<ResponderPatch>,
    engine: Option<EnginePatch>,
    phrases: Option<PhrasesPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelsPatch {
    whatsapp_token: Option<String>,
    instagram_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponderPatch {
    provider: Option<ResponderProvider>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    confidence_threshold: Option<f32>,
    escalation_wait_minutes: Option<i64>,
    pending_action_ttl_minutes: Option<i64>,
    default_override_ttl_minutes: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct PhrasesPatch {
    confirm: Option<Vec<String>>,
    cancel: Option<Vec<String>>,
    business_keywords: Option<Vec<String>>,
    off_topic_markers: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("frontdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(channels) = patch.channels {
            if let Some(token) = channels.whatsapp_token {
                self.channels.whatsapp_token = Some(token.into());
            }
            if let Some(token) = channels.instagram_token {
                self.channels.instagram_token = Some(token.into());
            }
        }

        if let Some(responder) = patch.responder {
            if let Some(provider) = responder.provider {
                self.responder.provider = provider;
            }
            if let Some(api_key) = responder.api_key {
                self.responder.api_key = Some(api_key.into());
            }
            if let Some(model) = responder.model {
                self.responder.model = model;
            }
            if let Some(timeout_secs) = responder.timeout_secs {
                self.responder.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = responder.max_retries {
                self.responder.max_retries = max_retries;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(confidence_threshold) = engine.confidence_threshold {
                self.engine.confidence_threshold = confidence_threshold;
            }
            if let Some(minutes) = engine.escalation_wait_minutes {
                self.engine.escalation_wait_minutes = minutes;
            }
            if let Some(minutes) = engine.pending_action_ttl_minutes {
                self.engine.pending_action_ttl_minutes = minutes;
            }
            if let Some(minutes) = engine.default_override_ttl_minutes {
                self.engine.default_override_ttl_minutes = minutes;
            }
        }

        if let Some(phrases) = patch.phrases {
            if let Some(confirm) = phrases.confirm {
                self.phrases.vocabulary.confirm = confirm;
            }
            if let Some(cancel) = phrases.cancel {
                self.phrases.vocabulary.cancel = cancel;
            }
            if let Some(business_keywords) = phrases.business_keywords {
                self.phrases.topic_filter.business_keywords = business_keywords;
            }
            if let Some(off_topic_markers) = phrases.off_topic_markers {
                self.phrases.topic_filter.off_topic_markers = off_topic_markers;
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
        if let Some(value) = read_env("FRONTDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FRONTDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FRONTDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FRONTDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FRONTDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FRONTDESK_WHATSAPP_TOKEN") {
            self.channels.whatsapp_token = Some(value.into());
        }
        if let Some(value) = read_env("FRONTDESK_INSTAGRAM_TOKEN") {
            self.channels.instagram_token = Some(value.into());
        }

        if let Some(value) = read_env("FRONTDESK_RESPONDER_PROVIDER") {
            self.responder.provider = value.parse()?;
        }
        if let Some(value) = read_env("FRONTDESK_RESPONDER_API_KEY") {
            self.responder.api_key = Some(value.into());
        }
        if let Some(value) = read_env("FRONTDESK_RESPONDER_MODEL") {
            self.responder.model = value;
        }

        if let Some(value) = read_env("FRONTDESK_CONFIDENCE_THRESHOLD") {
            self.engine.confidence_threshold =
                parse_f32("FRONTDESK_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("FRONTDESK_ESCALATION_WAIT_MINUTES") {
            self.engine.escalation_wait_minutes =
                parse_i64("FRONTDESK_ESCALATION_WAIT_MINUTES", &value)?;
        }

        let log_level =
            read_env("FRONTDESK_LOGGING_LEVEL").or_else(|| read_env("FRONTDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FRONTDESK_LOGGING_FORMAT").or_else(|| read_env("FRONTDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_responder(&self.responder)?;
        validate_engine(&self.engine)?;
        validate_phrases(&self.phrases)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("frontdesk.toml"), PathBuf::from("config/frontdesk.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_responder(responder: &ResponderConfig) -> Result<(), ConfigError> {
    if responder.timeout_secs == 0 || responder.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "responder.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match responder.provider {
        ResponderProvider::OpenAi | ResponderProvider::Anthropic => {
            let missing = responder
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "responder.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        ResponderProvider::Ollama => {}
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&engine.confidence_threshold) {
        return Err(ConfigError::Validation(
            "engine.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }
    if engine.escalation_wait_minutes <= 0 {
        return Err(ConfigError::Validation(
            "engine.escalation_wait_minutes must be positive".to_string(),
        ));
    }
    if engine.pending_action_ttl_minutes <= 0 {
        return Err(ConfigError::Validation(
            "engine.pending_action_ttl_minutes must be positive".to_string(),
        ));
    }
    if engine.default_override_ttl_minutes <= 0 {
        return Err(ConfigError::Validation(
            "engine.default_override_ttl_minutes must be positive".to_string(),
        ));
    }
    Ok(())
}

fn validate_phrases(phrases: &PhrasesConfig) -> Result<(), ConfigError> {
    if phrases.vocabulary.confirm.is_empty() {
        return Err(ConfigError::Validation(
            "phrases.confirm must contain at least one phrase".to_string(),
        ));
    }
    if phrases.vocabulary.cancel.is_empty() {
        return Err(ConfigError::Validation(
            "phrases.cancel must contain at least one phrase".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    let known = ["trace", "debug", "info", "warn", "error"];
    if !known.contains(&level.as_str()) {
        return Err(ConfigError::Validation(format!(
            "logging.level must be one of trace|debug|info|warn|error, got `{}`",
            logging.level
        )));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigError, LoadOptions, LogFormat, ResponderProvider};

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frontdesk.toml");
        let mut file = std::fs::File::create(&path).expect("create config");
        file.write_all(contents.as_bytes()).expect("write config");
        (dir, path)
    }

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        config.validate().expect("defaults must be valid");
        assert_eq!(config.engine.confidence_threshold, 0.6);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let (_dir, path) = write_config(
            r#"
[database]
url = "sqlite::memory:"
max_connections = 2

[engine]
confidence_threshold = 0.75
escalation_wait_minutes = 30

[phrases]
confirm = ["si", "dale"]
cancel = ["no"]

[logging]
level = "debug"
format = "json"
"#,
        );

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            require_file: true,
        })
        .expect("load config");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.engine.confidence_threshold, 0.75);
        assert_eq!(config.engine.escalation_wait_minutes, 30);
        assert_eq!(config.phrases.vocabulary.confirm, vec!["si", "dale"]);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some(std::path::PathBuf::from("/nonexistent/frontdesk.toml")),
            require_file: true,
        })
        .expect_err("must fail");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }

    #[test]
    fn confidence_threshold_outside_unit_range_is_rejected() {
        let mut config = AppConfig::default();
        config.engine.confidence_threshold = 1.5;
        let error = config.validate().expect_err("must reject");
        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn cloud_providers_require_api_key() {
        let mut config = AppConfig::default();
        config.responder.provider = ResponderProvider::OpenAi;
        let error = config.validate().expect_err("must reject missing key");
        assert!(matches!(error, ConfigError::Validation(_)));

        config.responder.api_key = Some("sk-test".to_string().into());
        config.validate().expect("key satisfies provider requirement");
    }

    #[test]
    fn non_sqlite_database_url_is_rejected() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/frontdesk".to_string();
        let error = config.validate().expect_err("must reject");
        assert!(matches!(error, ConfigError::Validation(_)));
    }
}
