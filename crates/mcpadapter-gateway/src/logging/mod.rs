//! Request correlation for gateway logs
//!
//! Every inbound HTTP request gets a short trace id; entry and exit are each
//! logged once.

mod trace_context;

pub use trace_context::{generate_trace_id, RequestSpan, TraceContext};
