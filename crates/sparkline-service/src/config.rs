//! Service configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// UPower client settings.
    pub upower: UPowerConfig,
    /// D-Bus export settings.
    pub bus: BusConfig,
    /// HTTP API settings.
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This checks:
    /// - Storage path is not empty
    /// - UPower timeout is between 1 and 60 seconds
    /// - Bus name and object path are valid D-Bus names
    /// - HTTP bind address is an `ip:port` socket address with a non-zero port
    /// - HTTP update buffer is not zero
    ///
    /// # Example
    ///
    /// ```
    /// use sparkline_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.storage.validate());
        errors.extend(self.upower.validate());
        errors.extend(self.bus.validate());
        errors.extend(self.http.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: sparkline_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Minimum UPower call timeout in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;
/// Maximum UPower call timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 60;

/// UPower client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UPowerConfig {
    /// Timeout for property reads and enumeration, in seconds.
    pub timeout_secs: u64,
}

impl Default for UPowerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: sparkline_core::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl UPowerConfig {
    /// The call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate UPower configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            errors.push(ValidationError {
                field: "upower.timeout_secs".to_string(),
                message: format!(
                    "timeout {} is out of range ({}-{} seconds)",
                    self.timeout_secs, MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS
                ),
            });
        }

        errors
    }
}

/// Default well-known bus name.
pub const DEFAULT_BUS_NAME: &str = "party.sammyette.Sparkline";
/// Default exported object path.
pub const DEFAULT_OBJECT_PATH: &str = "/party/sammyette/Sparkline";

/// D-Bus export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Whether to export the query interface on the session bus.
    pub export: bool,
    /// Well-known name to request.
    pub name: String,
    /// Object path of the exported interface.
    pub object_path: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            export: true,
            name: DEFAULT_BUS_NAME.to_string(),
            object_path: DEFAULT_OBJECT_PATH.to_string(),
        }
    }
}

impl BusConfig {
    /// Validate bus configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(reason) = dbus::strings::BusName::new(self.name.as_str()) {
            errors.push(ValidationError {
                field: "bus.name".to_string(),
                message: format!("invalid bus name '{}': {}", self.name, reason),
            });
        }

        if let Err(reason) = dbus::Path::new(self.object_path.as_str()) {
            errors.push(ValidationError {
                field: "bus.object_path".to_string(),
                message: format!("invalid object path '{}': {}", self.object_path, reason),
            });
        }

        errors
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whether to serve the HTTP API.
    pub enabled: bool,
    /// Bind address (e.g., "127.0.0.1:8470").
    pub bind: String,
    /// Capacity of the update broadcast channel.
    ///
    /// Subscribers that fall further behind than this lose the oldest events.
    pub update_buffer: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:8470".to_string(),
            update_buffer: 64,
        }
    }
}

impl HttpConfig {
    /// Validate HTTP configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "http.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            match self.bind.parse::<SocketAddr>() {
                Err(_) => errors.push(ValidationError {
                    field: "http.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected 'ip:port' (e.g. 127.0.0.1:8470)",
                        self.bind
                    ),
                }),
                Ok(addr) if addr.port() == 0 => errors.push(ValidationError {
                    field: "http.bind".to_string(),
                    message: "port cannot be 0".to_string(),
                }),
                Ok(_) => {}
            }
        }

        if self.update_buffer == 0 {
            errors.push(ValidationError {
                field: "http.update_buffer".to_string(),
                message: "update buffer must be at least 1".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `http.bind`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sparkline")
        .join("config.toml")
}
