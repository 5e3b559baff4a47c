//! Host configuration loading from file and environment variables.

use curate_types::ModerationConfig;
use serde::Deserialize;
use thiserror::Error;

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Notification delivery settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Entity types under moderation.
    #[serde(default)]
    pub moderation: ModerationSection,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Writer lock wait, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "curate_moderation=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Outbox delivery worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Run the delivery worker in this process.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between drain passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

/// The `[moderation]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModerationSection {
    /// One `[[moderation.entities]]` entry per registered type.
    #[serde(default)]
    pub entities: Vec<EntityModeration>,
}

/// Registration of one entity type.
///
/// ```toml
/// [[moderation.entities]]
/// entity_type = "post"
/// moderator_recipients = ["mods@example.com"]
/// rules = [{ kind = "staff" }, { kind = "deny_group", group = "probation" }]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct EntityModeration {
    pub entity_type: String,
    #[serde(flatten)]
    pub config: ModerationConfig,
}

fn default_db_path() -> String {
    "curate.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CURATE_DB_PATH` overrides `database.path`
/// - `CURATE_LOG_LEVEL` overrides `logging.level`
/// - `CURATE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `CURATE_DELIVERY_INTERVAL_SECS` overrides `delivery.interval_secs`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => parse_config(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Parses configuration from TOML text, without environment overrides.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(contents)?)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = var("CURATE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("CURATE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("CURATE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(interval) = var("CURATE_DELIVERY_INTERVAL_SECS") {
        match interval.parse() {
            Ok(parsed) => config.delivery.interval_secs = parsed,
            Err(_) => tracing::warn!(value = %interval, "ignoring invalid CURATE_DELIVERY_INTERVAL_SECS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curate_types::AutoApprovalRule;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_to_empty_file() {
        let config = parse_config("").unwrap();
        assert_eq!(config.database.path, "curate.db");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.delivery.enabled);
        assert_eq!(config.delivery.interval_secs, 5);
        assert!(config.moderation.entities.is_empty());
    }

    #[test]
    fn parses_entity_registrations() {
        let config = parse_config(
            r#"
            [database]
            path = "/var/lib/curate/curate.db"

            [[moderation.entities]]
            entity_type = "post"
            moderator_recipients = ["mods@example.com"]
            rules = [
                { kind = "staff" },
                { kind = "allow_group", group = "editors" },
                { kind = "deny_group", group = "probation" },
            ]

            [[moderation.entities]]
            entity_type = "comment"
            notify_user = false
            ignored_fields = ["updated_at"]
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, "/var/lib/curate/curate.db");
        let entities = &config.moderation.entities;
        assert_eq!(entities.len(), 2);

        assert_eq!(entities[0].entity_type, "post");
        assert_eq!(
            entities[0].config.rules,
            vec![
                AutoApprovalRule::Staff,
                AutoApprovalRule::AllowGroup {
                    group: "editors".to_string()
                },
                AutoApprovalRule::DenyGroup {
                    group: "probation".to_string()
                },
            ]
        );
        assert!(entities[0].config.notify_user);

        assert_eq!(entities[1].entity_type, "comment");
        assert_eq!(entities[1].config.rules, vec![AutoApprovalRule::Staff]);
        assert!(!entities[1].config.notify_user);
        assert_eq!(entities[1].config.ignored_fields, vec!["updated_at".to_string()]);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            parse_config("[database\npath = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CURATE_DB_PATH", "/tmp/other.db"),
            ("CURATE_LOG_JSON", "1"),
            ("CURATE_DELIVERY_INTERVAL_SECS", "30"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, "/tmp/other.db");
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.delivery.interval_secs, 30);
    }

    #[test]
    fn invalid_interval_override_is_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| {
            (key == "CURATE_DELIVERY_INTERVAL_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config.delivery.interval_secs, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(Some(path.to_str().unwrap())).unwrap();
        assert!(config.moderation.entities.is_empty());
    }
}
