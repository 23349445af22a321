//! Client authentication for the gateway
//!
//! The gateway does not issue tokens. It asks an `AuthGate` whether a bearer
//! token is acceptable and answers unauthorized callers with a JSON-RPC
//! auth-required envelope.

use std::collections::HashSet;

use async_trait::async_trait;
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// JSON-RPC error code for "authentication required"
pub const AUTH_REQUIRED_CODE: i64 = -32001;

const WWW_AUTHENTICATE_VALUE: &str = r#"Bearer realm="MCP Adapter", error="invalid_token""#;

/// Decides whether an inbound bearer token may reach the protocol handler
#[async_trait]
pub trait AuthGate: Send + Sync {
    async fn is_authorized(&self, token: &str) -> bool;

    /// Where a client can obtain a token, advertised in the 401 envelope
    fn auth_endpoints(&self) -> Option<Value> {
        None
    }
}

/// Fixed set of accepted bearer tokens; it issues none, so it advertises no endpoints
#[derive(Default)]
pub struct StaticTokenGate {
    tokens: HashSet<String>,
}

impl StaticTokenGate {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl AuthGate for StaticTokenGate {
    async fn is_authorized(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// JSON-RPC error body sent to unauthorized callers
///
/// `auth_endpoints` appears only when the gate actually serves them.
pub fn auth_required_body(message: &str, auth_endpoints: Option<Value>) -> Value {
    let mut data = json!({"auth_required": true});
    if let Some(endpoints) = auth_endpoints {
        data["auth_endpoints"] = endpoints;
    }
    json!({
        "jsonrpc": "2.0",
        "id": "auth-error",
        "error": {
            "code": AUTH_REQUIRED_CODE,
            "message": message,
            "data": data
        }
    })
}

/// HTTP 401 with the auth-required envelope
pub fn auth_required_response(message: &str, auth_endpoints: Option<Value>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, WWW_AUTHENTICATE_VALUE)],
        Json(auth_required_body(message, auth_endpoints)),
    )
        .into_response()
}
