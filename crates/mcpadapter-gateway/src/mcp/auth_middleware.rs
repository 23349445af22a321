//! Bearer-token gate for the protocol routes
//!
//! Runs before rmcp sees the request, so an unauthorized caller never reaches
//! the handler, the proxy or any session pool.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::auth::{auth_required_response, bearer_token, AuthGate};
use crate::logging::TraceContext;

pub async fn mcp_auth_middleware(
    State(gate): State<Arc<dyn AuthGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // CORS preflight carries no credentials
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone())
        .unwrap_or_else(|| "-".to_string());

    let Some(token) = bearer_token(request.headers()) else {
        warn!(trace_id = %trace_id, "Missing bearer token on MCP request");
        return auth_required_response(
            "Valid bearer token required for MCP access",
            gate.auth_endpoints(),
        );
    };

    if !gate.is_authorized(token).await {
        warn!(trace_id = %trace_id, "Rejected bearer token on MCP request");
        return auth_required_response("Invalid or expired bearer token", gate.auth_endpoints());
    }

    debug!(trace_id = %trace_id, "MCP request authorized");
    next.run(request).await
}
