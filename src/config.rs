//! Configuration system for Orra workers
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (ORRA_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{ClientOptions, Persistence};
use crate::error::{Error, Result};
use crate::idempotency::IdempotencyConfig;
use crate::registration::{RegistrationOptions, ServiceKind, DEFAULT_IDENTITY_FILE};
use crate::session::{ReconnectPolicy, SessionConfig};

/// Main SDK configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Platform endpoint and credentials
    pub platform: PlatformSettings,

    /// What to register as
    pub service: ServiceSettings,

    /// Reconnect backoff
    pub reconnect: ReconnectSettings,

    /// Acknowledgment tracking
    pub delivery: DeliverySettings,

    /// Deduplication cache retention
    pub idempotency: IdempotencySettings,

    /// Identity storage
    pub persistence: PersistenceSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Platform connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    /// HTTP(S) base URL of the platform API
    pub api_url: String,

    /// Project API key
    pub api_key: String,
}

/// Registration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// `service` or `agent`
    pub kind: ServiceKind,

    /// Name shown by the platform
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON file holding the input/output schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<String>,

    /// Last known version
    pub version: i64,
}

/// Reconnect settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Delay before the first reconnect
    pub base_interval_ms: u64,

    /// Upper bound for any single delay
    pub max_interval_ms: u64,

    /// Reconnects allowed since the last successful open (0 = unlimited)
    pub max_attempts: u32,

    /// WebSocket handshake timeout
    pub connect_timeout_ms: u64,
}

/// Delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Time a sent message may stay unacknowledged before it is resent
    pub ack_timeout_ms: u64,
}

/// Idempotency cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencySettings {
    /// Sweep period
    pub cleanup_interval_secs: u64,

    /// How long settled results are replayed
    pub result_ttl_secs: u64,

    /// Age after which an in-progress marker is discarded
    pub in_progress_ttl_secs: u64,
}

/// Identity persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// Path of the JSON identity file
    pub identity_file: String,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8005".to_string(),
            api_key: String::new(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            kind: ServiceKind::Service,
            name: "orra-worker".to_string(),
            description: None,
            schema_file: None,
            version: 0,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_interval_ms: 1000,
            max_interval_ms: 30000,
            max_attempts: 10,
            connect_timeout_ms: 30000,
        }
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self { ack_timeout_ms: 5000 }
    }
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 3600,
            result_ttl_secs: 86400,
            in_progress_ttl_secs: 1800,
        }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            identity_file: DEFAULT_IDENTITY_FILE.to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl SdkConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    pub fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            // Current directory
            Some(PathBuf::from("orra-worker.toml")),
            // User config directory
            dirs::config_dir().map(|p| p.join("orra").join("worker.toml")),
            // Home directory
            dirs::home_dir().map(|p| p.join(".orra").join("worker.toml")),
        ];

        for path in search_paths.into_iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Platform settings
        if let Ok(val) = std::env::var("ORRA_URL") {
            self.platform.api_url = val;
        }
        if let Ok(val) = std::env::var("ORRA_API_KEY").or_else(|_| std::env::var("ORRA_KEY")) {
            self.platform.api_key = val;
        }

        // Service settings
        if let Ok(val) = std::env::var("ORRA_SERVICE_NAME") {
            self.service.name = val;
        }
        if let Ok(val) = std::env::var("ORRA_SERVICE_KIND") {
            if let Ok(kind) = val.parse() {
                self.service.kind = kind;
            }
        }

        // Reconnect settings
        if let Ok(val) = std::env::var("ORRA_RECONNECT_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.reconnect.base_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("ORRA_MAX_RECONNECT_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.reconnect.max_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("ORRA_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                self.reconnect.max_attempts = n;
            }
        }

        // Delivery settings
        if let Ok(val) = std::env::var("ORRA_ACK_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.delivery.ack_timeout_ms = n;
            }
        }

        // Persistence settings
        if let Ok(val) = std::env::var("ORRA_IDENTITY_FILE") {
            self.persistence.identity_file = val;
        }

        // Logging settings
        if let Ok(val) = std::env::var("ORRA_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("ORRA_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("ORRA_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    pub fn expand_paths(&mut self) {
        self.persistence.identity_file = expand_path(&self.persistence.identity_file);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
        if let Some(ref file) = self.service.schema_file {
            self.service.schema_file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Platform URL
        if self.platform.api_url.trim().is_empty() {
            return Err(Error::config_field_invalid("platform.api_url", "Platform URL cannot be empty"));
        }
        match url::Url::parse(&self.platform.api_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(_) => {
                return Err(Error::config_field_invalid(
                    "platform.api_url",
                    "Platform URL must start with http:// or https://",
                ))
            }
            Err(e) => {
                return Err(Error::config_field_invalid(
                    "platform.api_url",
                    format!("Invalid platform URL '{}': {}", self.platform.api_url, e),
                ))
            }
        }

        if self.service.name.trim().is_empty() {
            return Err(Error::config_field_invalid("service.name", "Service name cannot be empty"));
        }

        // Reconnect intervals
        if self.reconnect.base_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "reconnect.base_interval_ms",
                "base_interval_ms must be greater than 0",
            ));
        }
        if self.reconnect.max_interval_ms < self.reconnect.base_interval_ms {
            return Err(Error::config_field_invalid(
                "reconnect.max_interval_ms",
                "max_interval_ms must not be lower than base_interval_ms",
            ));
        }
        if self.reconnect.connect_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "reconnect.connect_timeout_ms",
                "connect_timeout_ms must be greater than 0",
            ));
        }

        if self.delivery.ack_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "delivery.ack_timeout_ms",
                "ack_timeout_ms must be greater than 0",
            ));
        }

        // Cache retention
        let idem = &self.idempotency;
        if idem.cleanup_interval_secs == 0 || idem.result_ttl_secs == 0 || idem.in_progress_ttl_secs == 0 {
            return Err(Error::config_field_invalid(
                "idempotency",
                "cleanup_interval_secs, result_ttl_secs and in_progress_ttl_secs must be greater than 0",
            ));
        }

        if self.persistence.identity_file.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "persistence.identity_file",
                "identity_file cannot be empty",
            ));
        }

        // Log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Client tunables derived from this configuration
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            persistence: Persistence::File(PathBuf::from(&self.persistence.identity_file)),
            session: SessionConfig {
                reconnect: ReconnectPolicy {
                    base_interval: Duration::from_millis(self.reconnect.base_interval_ms),
                    max_interval: Duration::from_millis(self.reconnect.max_interval_ms),
                    max_attempts: self.reconnect.max_attempts,
                },
                connect_timeout: Duration::from_millis(self.reconnect.connect_timeout_ms),
                ack_timeout: Duration::from_millis(self.delivery.ack_timeout_ms),
            },
            idempotency: IdempotencyConfig {
                result_ttl: Duration::from_secs(self.idempotency.result_ttl_secs),
                in_progress_ttl: Duration::from_secs(self.idempotency.in_progress_ttl_secs),
                cleanup_interval: Duration::from_secs(self.idempotency.cleanup_interval_secs),
            },
            request_timeout: Duration::from_millis(self.reconnect.connect_timeout_ms),
        }
    }

    /// Registration metadata, reading the schema file if one is set
    pub fn registration_options(&self) -> Result<RegistrationOptions> {
        let mut options = RegistrationOptions::new().version(self.service.version);
        if let Some(description) = &self.service.description {
            options = options.description(description.clone());
        }
        if let Some(path) = &self.service.schema_file {
            let path = PathBuf::from(path);
            let raw = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            let schema: Value = serde_json::from_str(&raw).map_err(|e| {
                Error::config_field_invalid("service.schema_file", format!("{}: {}", path.display(), e))
            })?;
            options = options.schema(schema);
        }
        Ok(options)
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location for `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".orra")
        .join("worker.toml")
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# Orra Worker Configuration

[platform]
# Platform API base URL (http or https; the session uses ws/wss)
api_url = "http://localhost:8005"

# Project API key (or set ORRA_API_KEY)
api_key = ""

[service]
# "service" or "agent"
kind = "service"

# Name shown by the platform
name = "orra-worker"

# description = "Echoes task input"
# schema_file = "schema.json"

version = 0

[reconnect]
# Delay before the first reconnect, doubled per attempt
base_interval_ms = 1000

# Upper bound for a single delay
max_interval_ms = 30000

# Reconnects allowed since the last successful open (0 = unlimited)
max_attempts = 10

# WebSocket handshake timeout
connect_timeout_ms = 30000

[delivery]
# Resend a message when the platform has not acknowledged it in time
ack_timeout_ms = 5000

[idempotency]
# How often expired entries are swept
cleanup_interval_secs = 3600

# How long completed results are replayed for duplicate deliveries
result_ttl_secs = 86400

# Age after which an unfinished execution no longer blocks duplicates
in_progress_ttl_secs = 1800

[persistence]
# Where the service id is stored between runs
identity_file = "orra-service-key.json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.orra/logs/worker.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
