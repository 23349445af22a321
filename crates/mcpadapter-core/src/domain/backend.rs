//! Backend definitions
//!
//! A backend is an independent MCP tool server identified by a short id
//! (used as the external tool prefix) and a base URL.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;

/// A single backend entry as written in `servers.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A validated backend: id + normalized base URL
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct BackendDefinition {
    /// Prefix for external tool names (`{id}_{tool}`)
    pub id: String,
    /// Base URL without trailing slash
    pub url: String,
    pub description: Option<String>,
}

impl BackendDefinition {
    /// Validate an id/url pair
    ///
    /// Ids must be non-empty and free of whitespace; URLs must be absolute
    /// `http`/`https` URLs. The stored URL has any trailing `/` removed so
    /// endpoint paths can be appended uniformly.
    pub fn new(id: impl Into<String>, url: &str) -> Result<Self, ConfigError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidBackendId(id));
        }

        let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidBackendUrl {
            id: id.clone(),
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBackendUrl {
                id,
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Self {
            id,
            url: url.trim_end_matches('/').to_string(),
            description: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// `GET` endpoint listing the backend's native tools
    pub fn info_url(&self) -> String {
        format!("{}/info", self.url)
    }

    /// External (prefixed) name for one of this backend's tools
    pub fn external_tool_name(&self, native_name: &str) -> String {
        format!("{}_{}", self.id, native_name)
    }
}
