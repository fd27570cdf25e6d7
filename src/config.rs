use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_EDIT_PASSWORD: &str = "ACCESS_LOGGER_EDIT_PASSWORD";
pub const ENV_SECRET_KEY: &str = "ACCESS_LOGGER_SECRET_KEY";
pub const ENV_WEBHOOK_URL: &str = "ACCESS_LOGGER_WEBHOOK_URL";
pub const ENV_DATABASE: &str = "ACCESS_LOGGER_DATABASE";

/// Application configuration, loaded once at startup
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub reader: ReaderSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub web: WebSettings,

    #[serde(default)]
    pub secrets: Secrets,

    #[serde(default)]
    pub display: DisplaySettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Users provisioned when the database has none
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed_users: Vec<SeedUser>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReaderKind {
    /// Run a probe helper program per poll
    #[default]
    Command,
    /// Keyboard-wedge reader typing identifiers on stdin
    Stdin,
}

/// Card reader settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaderSettings {
    #[serde(default)]
    pub kind: ReaderKind,

    /// Probe helper for `kind = "command"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Idle time between probes (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single probe (seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Cool-down before the same card is accepted again (seconds)
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
}

/// Database settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageSettings {
    /// SQLite file; defaults to the platform data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

/// Webhook notification settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationSettings {
    /// Destination; notifications are skipped when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(default = "default_footer")]
    pub footer: String,

    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,
}

/// Periodic duties
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Local time-of-day after which open sessions are force-closed ("HH:MM")
    #[serde(default = "default_cutoff")]
    pub cutoff: String,
}

/// Listen address of the (separate) web surface
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSettings {
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Secrets required before anything starts
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Secrets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

/// Optional two-line status display
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DisplaySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeedUser {
    pub identifier: String,
    pub name: String,
}

// Default values
fn default_poll_interval_ms() -> u64 {
    500
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_debounce_secs() -> u64 {
    5
}

fn default_footer() -> String {
    "Access logger".to_string()
}

fn default_notification_timeout_secs() -> u64 {
    10
}

fn default_tick_secs() -> u64 {
    60
}

fn default_cutoff() -> String {
    "23:59".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            kind: ReaderKind::default(),
            command: None,
            args: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_secs: default_probe_timeout_secs(),
            debounce_secs: default_debounce_secs(),
        }
    }
}

impl ReaderSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            footer: default_footer(),
            timeout_secs: default_notification_timeout_secs(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            cutoff: default_cutoff(),
        }
    }
}

impl SchedulerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Parsed cutoff time-of-day
    pub fn cutoff_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.cutoff, "%H:%M").map_err(|e| {
            ConfigError::Invalid(format!(
                "[scheduler] cutoff must be HH:MM (got '{}'): {}",
                self.cutoff, e
            ))
        })
    }
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the platform default path is
    /// used if present, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::load_file(path)
            }
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load_file(&path),
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(ENV_EDIT_PASSWORD) {
            self.secrets.edit_password = Some(value);
        }
        if let Some(value) = get(ENV_SECRET_KEY) {
            self.secrets.secret_key = Some(value);
        }
        if let Some(value) = get(ENV_WEBHOOK_URL) {
            self.notifications.webhook_url = Some(value);
        }
        if let Some(value) = get(ENV_DATABASE) {
            self.storage.database = Some(PathBuf::from(value));
        }
    }

    /// Validate configuration. Missing secrets are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_blank(&self.secrets.edit_password) {
            return Err(ConfigError::MissingSecret("edit_password", ENV_EDIT_PASSWORD));
        }
        if is_blank(&self.secrets.secret_key) {
            return Err(ConfigError::MissingSecret("secret_key", ENV_SECRET_KEY));
        }

        if let Some(webhook) = &self.notifications.webhook_url {
            let url = url::Url::parse(webhook)
                .map_err(|e| ConfigError::Invalid(format!("invalid webhook_url: {}", e)))?;
            if url.scheme() != "https" && url.scheme() != "http" {
                return Err(ConfigError::Invalid(format!(
                    "webhook_url must use http or https (got: {})",
                    url.scheme()
                )));
            }
        }

        if self.reader.kind == ReaderKind::Command && self.reader.command.is_none() {
            return Err(ConfigError::Invalid(
                "[reader] kind = \"command\" requires `command`".to_string(),
            ));
        }
        if self.reader.poll_interval_ms == 0 || self.reader.probe_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reader poll interval and probe timeout must be non-zero".to_string(),
            ));
        }
        if self.reader.debounce_secs == 0 {
            return Err(ConfigError::Invalid(
                "reader debounce_secs must be non-zero".to_string(),
            ));
        }
        if self.notifications.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "notifications timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.scheduler.tick_secs == 0 {
            return Err(ConfigError::Invalid("scheduler tick_secs must be non-zero".to_string()));
        }
        self.scheduler.cutoff_time()?;

        self.web.listen.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Invalid(format!("invalid [web] listen '{}': {}", self.web.listen, e))
        })?;

        for seed in &self.seed_users {
            if crate::store::normalize_identifier(&seed.identifier).as_deref()
                != Some(seed.identifier.as_str())
            {
                return Err(ConfigError::Invalid(format!(
                    "seed user '{}' has invalid identifier '{}' (expected upper-case hex)",
                    seed.name, seed.identifier
                )));
            }
            if seed.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "seed user {} has an empty name",
                    seed.identifier
                )));
            }
        }

        Ok(())
    }

    /// Database path, falling back to the platform data directory
    pub fn database_path(&self) -> PathBuf {
        self.storage.database.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("", "", "access-logger")
                .map(|dirs| dirs.data_dir().join("access_log.db"))
                .unwrap_or_else(|| PathBuf::from("access_log.db"))
        })
    }
}

/// Platform-specific default config file location
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "access-logger")
        .map(|dirs| dirs.config_dir().join("access-logger.toml"))
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

/// Example configuration written by `init-config`
pub const EXAMPLE_CONFIG: &str = r#"# access-logger configuration

[reader]
# "command" runs a probe helper each poll; "stdin" reads one identifier per line
kind = "command"
command = "/usr/local/bin/read-idm"
args = []
poll_interval_ms = 500
probe_timeout_secs = 5
debounce_secs = 5

[storage]
database = "/var/lib/access-logger/access_log.db"

[notifications]
# webhook_url = "https://discord.com/api/webhooks/..."
footer = "Access logger"

[scheduler]
tick_secs = 60
cutoff = "23:59"

[web]
listen = "0.0.0.0:5000"

[secrets]
# Or set ACCESS_LOGGER_EDIT_PASSWORD / ACCESS_LOGGER_SECRET_KEY
# edit_password = ""
# secret_key = ""

[display]
# device = "/dev/ttyACM0"

[logging]
level = "info"

# [[seed_users]]
# identifier = "F637CF05"
# name = "First User"
"#;
