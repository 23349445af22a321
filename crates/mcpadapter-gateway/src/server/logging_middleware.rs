//! HTTP request logging middleware
//!
//! Protocol POSTs have their (small) request body read to pick out the
//! JSON-RPC method. Responses are never buffered: `/mcp` replies may be
//! long-lived SSE streams.

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn, Instrument};

use crate::logging::{RequestSpan, TraceContext};

/// Upper bound on protocol request bodies read for logging
const MAX_RPC_BODY: usize = 4 * 1024 * 1024;

/// Headers worth seeing at DEBUG; credentials are never among them
const LOGGED_HEADERS: &[&str] = &[
    "content-type",
    "accept",
    "user-agent",
    "mcp-session-id",
    "mcp-protocol-version",
];

/// Routes served by the protocol handler
pub fn is_mcp_path(path: &str) -> bool {
    path == "/" || path == "/mcp" || path.starts_with("/mcp/")
}

fn compact_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter(|(name, _)| LOGGED_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| format!("{}={:?}", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// JSON-RPC `method` of a request body
pub fn extract_mcp_method(bytes: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    json.get("method")
        .and_then(|m| m.as_str())
        .map(String::from)
}

pub async fn http_logging_middleware(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let mut ctx = TraceContext::new(request.method().as_str(), &path);
    let span = RequestSpan::enter(&ctx);

    async move {
        let mut request = request;

        if is_mcp_path(&path) && request.method() == Method::POST {
            let (parts, body) = request.into_parts();
            let bytes = match to_bytes(body, MAX_RPC_BODY).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(trace_id = %ctx.trace_id, "Failed to read request body: {}", e);
                    return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
                        .into_response();
                }
            };
            ctx = ctx.with_mcp_method(extract_mcp_method(&bytes));
            request = Request::from_parts(parts, Body::from(bytes));
        }

        RequestSpan::log_entry(&ctx);
        debug!(
            trace_id = %ctx.trace_id,
            headers = %compact_headers(request.headers()),
            "request headers"
        );

        request.extensions_mut().insert(ctx.clone());
        let response = next.run(request).await;

        RequestSpan::log_exit(&ctx, response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}
