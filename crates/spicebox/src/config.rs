//! Configuration file parsing and structures.
//!
//! spicebox reads a single TOML file. Only `[backend]` and `[mqtt]` are
//! required; everything else has defaults.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use crate::notify::PermissionState;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub backend: BackendConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"spicebox::api" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    pub fn filter(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

/// Backend holding the `devices` and `readings` tables
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://project.example.co`
    pub url: String,

    pub api_key: String,

    /// How often the device list is reloaded
    #[serde(default = "default_device_refresh_secs")]
    pub device_refresh_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl BackendConfig {
    pub fn device_refresh(&self) -> Duration {
        Duration::from_secs(self.device_refresh_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn default_device_refresh_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// MQTT broker carrying live reading inserts (and, optionally, alerts)
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub broker: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic filter the reading inserts are published on
    #[serde(default = "default_readings_topic")]
    pub readings_topic: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "spicebox".to_string()
}

fn default_readings_topic() -> String {
    "spicebox/readings/#".to_string()
}

/// HTTP dashboard API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8566
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Log,
    Mqtt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Platform permission to report to the dispatch gate
    #[serde(default = "default_permission")]
    pub permission: PermissionState,

    /// JSON file holding the user's notification preference
    #[serde(default = "default_preference_path")]
    pub preference_path: PathBuf,

    #[serde(default)]
    pub sink: SinkKind,

    /// Alerts go to `{alert_topic_prefix}/{device_id}` with the MQTT sink
    #[serde(default = "default_alert_topic_prefix")]
    pub alert_topic_prefix: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            permission: default_permission(),
            preference_path: default_preference_path(),
            sink: SinkKind::default(),
            alert_topic_prefix: default_alert_topic_prefix(),
        }
    }
}

fn default_permission() -> PermissionState {
    PermissionState::Granted
}

fn default_preference_path() -> PathBuf {
    PathBuf::from("spicebox-preferences.json")
}

fn default_alert_topic_prefix() -> String {
    "spicebox/alerts".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tracing::Level;

    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [backend]
            url = "https://spicebox.example.co"
            api_key = "anon"

            [mqtt]
            broker = "localhost"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.backend.device_refresh(), Duration::from_secs(30));
        assert_eq!(config.backend.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.readings_topic, "spicebox/readings/#");
        assert!(config.api.is_none());
        assert_eq!(config.notifications.permission, PermissionState::Granted);
        assert_eq!(config.notifications.sink, SinkKind::Log);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [logging]
            level = "warn"

            [logging.overrides]
            "spicebox::monitor" = "debug"

            [backend]
            url = "https://spicebox.example.co"
            api_key = "anon"
            device_refresh_secs = 5

            [mqtt]
            broker = "mqtt.local"
            port = 8883
            username = "spicebox"
            password = "secret"

            [api]
            port = 9000

            [notifications]
            permission = "denied"
            preference_path = "/var/lib/spicebox/prefs.json"
            sink = "mqtt"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.backend.device_refresh_secs, 5);
        assert_eq!(config.mqtt.username.as_deref(), Some("spicebox"));

        let api = config.api.unwrap();
        assert!(api.enabled);
        assert_eq!(api.listen, "127.0.0.1");
        assert_eq!(api.port, 9000);

        assert_eq!(config.notifications.permission, PermissionState::Denied);
        assert_eq!(config.notifications.sink, SinkKind::Mqtt);
        assert_eq!(config.notifications.alert_topic_prefix, "spicebox/alerts");

        let filter = config.logging.filter();
        assert!(filter.would_enable("spicebox::monitor::notifier", &Level::DEBUG));
        assert!(!filter.would_enable("spicebox::api", &Level::INFO));
        assert!(filter.would_enable("spicebox::api", &Level::WARN));
    }

    #[test]
    fn test_missing_backend_is_an_error() {
        let toml = r#"
            [mqtt]
            broker = "localhost"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[backend]\nurl = \"http://localhost\"\napi_key = \"k\"\n[mqtt]\nbroker = \"b\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.backend.url, "http://localhost");

        assert!(matches!(
            Config::from_file("/nonexistent/spicebox.toml"),
            Err(ConfigError::Io(_, _))
        ));
    }
}
