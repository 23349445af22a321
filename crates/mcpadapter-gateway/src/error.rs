//! Gateway error taxonomy
//!
//! `PoolError` covers session lifecycle, `ProxyError` everything a single tool
//! call can end in, `DiscoveryError` a single backend's `/info` lookup.

use std::time::Duration;

use serde_json::Value;

/// Session pool failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("session handshake with {url} failed: {reason}")]
    Handshake { url: String, reason: String },
    #[error("no session for {url} became available within {waited:?}")]
    Exhausted { url: String, waited: Duration },
    #[error("session pool for {0} is shut down")]
    ShutDown(String),
}

/// Coarse classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown external tool name (client error)
    Resolution,
    /// Session could not be established
    SessionCreation,
    /// Connection, status or timeout failure
    Transport,
    /// The backend answered with an explicit error envelope
    Backend,
    /// The backend answered with something undecodable
    MalformedReply,
}

/// Failures of a single proxied tool call
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    #[error("Tool '{name}' not found. Available tools: {available:?}")]
    ToolNotFound { name: String, available: Vec<String> },
    #[error(transparent)]
    Session(#[from] PoolError),
    #[error("transport error calling {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("call to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("HTTP Error {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("backend error: {}", describe_backend_error(.0))]
    Backend(Value),
    #[error("malformed backend reply: {0}")]
    MalformedReply(String),
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ToolNotFound { .. } => ErrorKind::Resolution,
            Self::Session(_) => ErrorKind::SessionCreation,
            Self::Transport { .. } | Self::Timeout { .. } | Self::HttpStatus { .. } => {
                ErrorKind::Transport
            }
            Self::Backend(_) => ErrorKind::Backend,
            Self::MalformedReply(_) => ErrorKind::MalformedReply,
        }
    }
}

/// `message (code)` for JSON-RPC error objects, compact JSON otherwise
fn describe_backend_error(error: &Value) -> String {
    let message = error.get("message").and_then(Value::as_str);
    let code = error.get("code").and_then(Value::as_i64);
    match (message, code) {
        (Some(message), Some(code)) => format!("{} ({})", message, code),
        (Some(message), None) => message.to_string(),
        _ => match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

/// Failures while discovering one backend's tools
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiscoveryError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed info payload: {0}")]
    Malformed(String),
}
