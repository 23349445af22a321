//! Gateway configuration
//!
//! Two sources feed the gateway:
//!
//! - `servers.json`: backend list plus optional pool tuning
//! - environment: listener address, config path, access tokens
//!
//! ```json
//! {
//!   "servers": {
//!     "hello": { "url": "http://hello-world:8000" },
//!     "latex": { "url": "http://latex-server:8000" }
//!   },
//!   "pool": { "max_sessions": 10, "allow_overflow": true }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::branding;
use crate::domain::{BackendDefinition, BackendEntry};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid backend id '{0}'")]
    InvalidBackendId(String),
    #[error("invalid URL '{url}' for backend '{id}': {reason}")]
    InvalidBackendUrl {
        id: String,
        url: String,
        reason: String,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidSetting { key: &'static str, value: String },
}

// ============================================================================
// Pool tuning
// ============================================================================

/// Session pool tuning, shared by every per-backend pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Session cap per backend (exceeded only by emergency sessions)
    pub max_sessions: usize,
    /// Available sessions idle longer than this are swept
    pub idle_timeout_secs: u64,
    /// How long `acquire` waits for a busy session to be released
    pub wait_timeout_ms: u64,
    /// Period of the background expiry sweep
    pub sweep_interval_secs: u64,
    /// Timeout for each step of the `initialize` handshake
    pub handshake_timeout_secs: u64,
    /// Hard timeout for a single backend tool call
    pub call_timeout_secs: u64,
    /// Create an emergency session beyond the cap when the wait times out
    pub allow_overflow: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            idle_timeout_secs: 300,
            wait_timeout_ms: 30_000,
            sweep_interval_secs: 30,
            handshake_timeout_secs: 10,
            call_timeout_secs: 30,
            allow_overflow: true,
        }
    }
}

impl PoolSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

// ============================================================================
// servers.json
// ============================================================================

/// Parsed `servers.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersConfig {
    #[serde(default)]
    pub servers: BTreeMap<String, BackendEntry>,
    #[serde(default)]
    pub pool: PoolSettings,
}

impl ServersConfig {
    /// Parse from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from disk, reporting every failure
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        Self::from_json_str(&raw).map_err(|e| ConfigError::InvalidJson {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from disk, falling back to an empty backend list
    ///
    /// A missing file is a warning, a broken one an error; the gateway starts
    /// either way with no backends.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(path)) => {
                warn!(path = %path.display(), "servers config not found, using empty server list");
                Self::default()
            }
            Err(e) => {
                error!("{}", e);
                Self::default()
            }
        }
    }

    /// Validated backend definitions
    ///
    /// Entries with a bad id or URL are logged and skipped.
    pub fn backends(&self) -> Vec<BackendDefinition> {
        self.servers
            .iter()
            .filter_map(|(id, entry)| match BackendDefinition::new(id.as_str(), &entry.url) {
                Ok(backend) => Some(match &entry.description {
                    Some(description) => backend.with_description(description.clone()),
                    None => backend,
                }),
                Err(e) => {
                    warn!("skipping backend: {}", e);
                    None
                }
            })
            .collect()
    }
}

// ============================================================================
// Environment settings
// ============================================================================

/// Listener and auth settings read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// `SERVER_HOST`
    pub host: String,
    /// `SERVER_PORT`
    pub port: u16,
    /// `SERVERS_CONFIG`
    pub servers_file: PathBuf,
    /// `ADAPTER_ACCESS_TOKENS` (comma separated)
    pub access_tokens: Vec<String>,
    /// `ADAPTER_ENABLE_CORS`
    pub enable_cors: bool,
    /// `ADAPTER_LOG_DIR`
    pub log_dir: Option<PathBuf>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: branding::DEFAULT_GATEWAY_PORT,
            servers_file: PathBuf::from(branding::DEFAULT_SERVERS_FILE),
            access_tokens: Vec::new(),
            enable_cors: true,
            log_dir: None,
        }
    }
}

impl GatewaySettings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(host) = lookup("SERVER_HOST").filter(|h| !h.trim().is_empty()) {
            settings.host = host.trim().to_string();
        }

        if let Some(port) = lookup("SERVER_PORT") {
            settings.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidSetting {
                    key: "SERVER_PORT",
                    value: port.clone(),
                })?;
        }

        if let Some(path) = lookup("SERVERS_CONFIG").filter(|p| !p.trim().is_empty()) {
            settings.servers_file = PathBuf::from(path.trim());
        }

        if let Some(tokens) = lookup("ADAPTER_ACCESS_TOKENS") {
            settings.access_tokens = tokens
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(cors) = lookup("ADAPTER_ENABLE_CORS") {
            settings.enable_cors = match cors.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidSetting {
                        key: "ADAPTER_ENABLE_CORS",
                        value: cors,
                    })
                }
            };
        }

        settings.log_dir = lookup("ADAPTER_LOG_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);

        Ok(settings)
    }
}
