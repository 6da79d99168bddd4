//! # Configuration Management
//!
//! Centralized configuration for IPC clients and servers.
//!
//! Addressing and the shared secret are carried in an explicit [`IpcConfig`]
//! passed to constructors; nothing here is process-global.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Security Considerations
//! - The secret is the only authentication mechanism; an empty secret is
//!   rejected by validation
//! - The freshness window bounds how long a captured envelope stays usable

use crate::core::envelope::DEFAULT_FRESHNESS_WINDOW_SECS;
use crate::core::secret::SharedSecret;
use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Current supported protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Magic bytes to identify protocol frames ("PVIP")
pub const MAGIC_BYTES: [u8; 4] = [0x50, 0x56, 0x49, 0x50];

/// Max allowed frame payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Default number of retries after a failed connection attempt
pub const DEFAULT_RETRIES: u32 = 10;

/// Default socket filename.
const DEFAULT_SOCKET_NAME: &str = "core.sock";

/// Default subdirectory under the runtime directory.
const DEFAULT_SUBDIR: &str = "pvhotwater";

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "PVHOTWATER_IPC_";

/// Get the default socket path based on environment.
///
/// `XDG_RUNTIME_DIR/pvhotwater/core.sock` if `XDG_RUNTIME_DIR` is set,
/// otherwise `/tmp/pvhotwater/core.sock`.
pub fn default_socket_path() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(DEFAULT_SUBDIR)
        .join(DEFAULT_SOCKET_NAME)
}

/// Main IPC configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct IpcConfig {
    /// Where to meet and how to authenticate
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl IpcConfig {
    /// Minimal configuration for a socket path and secret, everything else default.
    pub fn new(socket_path: impl Into<PathBuf>, secret: impl Into<SharedSecret>) -> Self {
        Self::default_with_overrides(|c| {
            c.endpoint.socket_path = socket_path.into();
            c.endpoint.secret = secret.into();
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `PVHOTWATER_IPC_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_var("SOCKET_PATH") {
            self.endpoint.socket_path = PathBuf::from(path);
        }

        if let Some(secret) = env_var("SECRET") {
            self.endpoint.secret = SharedSecret::from(secret.as_str());
        }

        if let Some(window) = env_var("FRESHNESS_WINDOW_SECS") {
            self.endpoint.freshness_window_secs = parse_env("FRESHNESS_WINDOW_SECS", &window)?;
        }

        if let Some(retries) = env_var("RETRIES") {
            self.client.retries = parse_env("RETRIES", &retries)?;
        }

        if let Some(timeout) = env_var("RECV_TIMEOUT_MS") {
            let millis: u64 = parse_env("RECV_TIMEOUT_MS", &timeout)?;
            self.server.recv_timeout = Duration::from_millis(millis);
        }

        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        let example = Self::default_with_overrides(|c| {
            c.endpoint.secret = SharedSecret::from("change-me");
        });
        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.endpoint.validate());
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}")).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        ProtocolError::ConfigError(format!("Invalid value for {ENV_PREFIX}{name}: '{value}'"))
    })
}

/// Socket address, shared secret and envelope freshness
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Filesystem path of the Unix socket
    pub socket_path: PathBuf,

    /// Pre-shared authentication secret
    pub secret: SharedSecret,

    /// Width of the envelope freshness bucket in seconds
    pub freshness_window_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            secret: SharedSecret::default(),
            freshness_window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
        }
    }
}

impl EndpointConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.socket_path.as_os_str().is_empty() {
            errors.push("Socket path cannot be empty".to_string());
        } else if self.socket_path.as_os_str().len() > 107 {
            // sun_path is 108 bytes on Linux, including the terminator
            errors.push(format!(
                "Socket path too long: {} bytes (maximum: 107)",
                self.socket_path.as_os_str().len()
            ));
        }

        if self.secret.is_empty() {
            errors.push("Shared secret cannot be empty".to_string());
        } else if self.secret.len() < 8 {
            errors.push(format!(
                "Shared secret too short: {} bytes (minimum: 8)",
                self.secret.len()
            ));
        }

        if self.freshness_window_secs == 0 {
            errors.push("Freshness window must be at least 1 second".to_string());
        } else if self.freshness_window_secs > 3600 {
            errors.push("Freshness window too long (maximum: 1 hour)".to_string());
        }

        errors
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// How long `serve_forever` waits for a request after a client connects
    #[serde(with = "duration_serde")]
    pub recv_timeout: Duration,

    /// Handle each accepted connection on its own task
    pub threaded: bool,

    /// Maximum number of concurrently handled connections in threaded mode
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            recv_timeout: timeout::RECV_TIMEOUT,
            threaded: false,
            max_connections: 64,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.recv_timeout.as_millis() < 10 {
            errors.push("Receive timeout too short (minimum: 10ms)".to_string());
        } else if self.recv_timeout.as_secs() > 300 {
            errors.push("Receive timeout too long (maximum: 300s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 10_000 {
            errors.push(format!(
                "Max connections very high: {} (maximum: 10,000)",
                self.max_connections
            ));
        }

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Retries after the first failed connection attempt
    pub retries: u32,

    /// Delay between attempts
    #[serde(with = "duration_serde")]
    pub retry_delay: Duration,

    /// Timeout for establishing a connection
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Timeout for waiting for the reply
    #[serde(with = "duration_serde")]
    pub response_timeout: Duration,

    /// Reject responses that fail the message's own validator
    pub validate_responses: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::ZERO,
            connect_timeout: timeout::CONNECT_TIMEOUT,
            response_timeout: timeout::RESPONSE_TIMEOUT,
            validate_responses: true,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.retries > 1000 {
            errors.push(format!("Too many retries: {} (maximum: 1000)", self.retries));
        }

        if self.retry_delay.as_secs() > 60 {
            errors.push("Retry delay too long (maximum: 60s)".to_string());
        }

        if self.connect_timeout.as_millis() < 10 {
            errors.push("Connect timeout too short (minimum: 10ms)".to_string());
        }

        if self.response_timeout.as_millis() < 10 {
            errors.push("Response timeout too short (minimum: 10ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("pvhotwater-ipc"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
