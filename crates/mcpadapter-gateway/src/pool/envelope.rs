//! Backend reply decoding
//!
//! rmcp hands back either a JSON-RPC error or the `result` of the matching
//! response; `ReplyEnvelope` reduces both to what the MCP client sees.

use rmcp::ErrorData;
use serde_json::{json, Value};

use crate::error::ProxyError;

/// Decoded JSON-RPC reply, precedence `error` > `result.content[0].text` > `result`
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEnvelope {
    Error(Value),
    Content(String),
    Bare(Value),
}

impl ReplyEnvelope {
    pub fn from_error(error: &ErrorData) -> Self {
        let mut value = json!({
            "code": error.code.0,
            "message": error.message,
        });
        if let Some(data) = &error.data {
            value["data"] = data.clone();
        }
        Self::Error(value)
    }

    pub fn from_result(result: Value) -> Self {
        let first_text = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match first_text {
            Some(text) => Self::Content(text),
            None => Self::Bare(result),
        }
    }

    /// Collapse into the call outcome
    pub fn into_reply(self) -> Result<BackendReply, ProxyError> {
        match self {
            Self::Error(error) => Err(ProxyError::Backend(error)),
            Self::Content(text) => Ok(BackendReply::Text(text)),
            Self::Bare(value) => Ok(BackendReply::Value(value)),
        }
    }
}

/// Successful tool call payload
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReply {
    Text(String),
    Value(Value),
}

impl BackendReply {
    /// Text handed back to the MCP client
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Value(Value::String(text)) => text,
            Self::Value(other) => other.to_string(),
        }
    }
}
