//! Trace Context - request correlation ids and consolidated entry/exit lines

use std::time::Instant;

use tracing::{info, info_span, Span};
use uuid::Uuid;

/// 8 hex characters taken from a random v4 UUID
pub fn generate_trace_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Correlation data for one inbound request
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub method: String,
    pub path: String,
    /// JSON-RPC method for protocol requests (e.g. `tools/call`)
    pub mcp_method: Option<String>,
    pub started_at: Instant,
}

impl TraceContext {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            trace_id: generate_trace_id(),
            method: method.to_string(),
            path: path.to_string(),
            mcp_method: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_mcp_method(mut self, method: Option<String>) -> Self {
        self.mcp_method = method;
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

pub struct RequestSpan;

impl RequestSpan {
    /// Span carrying the trace id into every nested log line
    pub fn enter(ctx: &TraceContext) -> Span {
        info_span!(
            "request",
            trace_id = %ctx.trace_id,
            method = %ctx.method,
            path = %ctx.path,
        )
    }

    pub fn log_entry(ctx: &TraceContext) {
        match ctx.mcp_method.as_deref() {
            Some(mcp_method) => info!(
                trace_id = %ctx.trace_id,
                "→ {} {} {}",
                ctx.method,
                ctx.path,
                mcp_method
            ),
            None => info!(trace_id = %ctx.trace_id, "→ {} {}", ctx.method, ctx.path),
        }
    }

    pub fn log_exit(ctx: &TraceContext, status: u16) {
        info!(
            trace_id = %ctx.trace_id,
            "← {} ({}ms)",
            status,
            ctx.elapsed_ms()
        );
    }
}
