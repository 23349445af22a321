use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// A backend speaking the gateway's slice of MCP over HTTP
pub struct MockMcpBackend {
    pub server: MockServer,
    initializations: Arc<AtomicUsize>,
}

/// JSON-RPC id of a request, echoed in its reply
pub fn request_id(request: &Request) -> Value {
    serde_json::from_slice::<Value>(&request.body)
        .ok()
        .and_then(|body| body.get("id").cloned())
        .unwrap_or(Value::Null)
}

/// JSON-RPC method of a recorded request
fn rpc_method(request: &Request) -> Option<String> {
    serde_json::from_slice::<Value>(&request.body)
        .ok()?
        .get("method")?
        .as_str()
        .map(str::to_string)
}

/// `event: message` SSE frame carrying `reply`
pub fn sse(reply: Value) -> ResponseTemplate {
    sse_stream(&[reply])
}

/// One `event: message` frame per message, in order
pub fn sse_stream(messages: &[Value]) -> ResponseTemplate {
    let body: String = messages
        .iter()
        .map(|m| format!("event: message\ndata: {}\n\n", m))
        .collect();
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream")
}

/// `notifications/message` log line a backend may interleave with replies
pub fn log_notification(text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "notifications/message",
        "params": {"level": "info", "data": text}
    })
}

/// `{"result":{"content":[{"type":"text","text":...}]}}`
pub fn text_result(id: Value, text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"content": [{"type": "text", "text": text}]}
    })
}

impl MockMcpBackend {
    /// Backend issuing a fresh `mcp-session-id` per `initialize`
    pub async fn start() -> Self {
        Self::start_with(true).await
    }

    /// Backend that never issues a session id
    pub async fn start_stateless() -> Self {
        Self::start_with(false).await
    }

    async fn start_with(issue_session_ids: bool) -> Self {
        let server = MockServer::start().await;
        let initializations = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&initializations);
        Mock::given(method("POST"))
            .and(path("/mcp/"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(move |request: &Request| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let template = ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": request_id(request),
                    "result": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "mock-backend", "version": "1.0.0"}
                    }
                }));
                if issue_session_ids {
                    template.insert_header("mcp-session-id", format!("backend-session-{}", n))
                } else {
                    template
                }
            })
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/mcp/"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        // No standalone server-to-client stream
        Mock::given(method("GET"))
            .and(path("/mcp/"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/mcp/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Self {
            server,
            initializations,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Successful `initialize` handshakes served so far
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    /// `GET /info` advertising `tools`
    pub async fn with_info(&self, tools: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "mock-backend",
                "available_tools": tools,
            })))
            .mount(&self.server)
            .await;
    }

    /// `greet` answering `Hello, {name}!` over SSE after `delay`
    pub async fn with_greet(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/mcp/"))
            .and(body_partial_json(
                json!({"method": "tools/call", "params": {"name": "greet"}}),
            ))
            .respond_with(move |request: &Request| {
                let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
                let name = body["params"]["arguments"]["name"]
                    .as_str()
                    .unwrap_or("World")
                    .to_string();
                sse(text_result(request_id(request), &format!("Hello, {}!", name)))
                    .set_delay(delay)
            })
            .mount(&self.server)
            .await;
    }

    /// Response for `tools/call` of `tool`, built from the request's JSON-RPC id
    pub async fn with_tool_response<F>(&self, tool: &str, respond: F)
    where
        F: Fn(Value) -> ResponseTemplate + Send + Sync + 'static,
    {
        Mock::given(method("POST"))
            .and(path("/mcp/"))
            .and(body_partial_json(
                json!({"method": "tools/call", "params": {"name": tool}}),
            ))
            .respond_with(move |request: &Request| respond(request_id(request)))
            .mount(&self.server)
            .await;
    }

    /// Recorded requests with the given JSON-RPC method
    pub async fn rpc_requests(&self, rpc: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| rpc_method(r).as_deref() == Some(rpc))
            .collect()
    }

    /// Recorded `DELETE /mcp/` session terminations
    pub async fn terminations(&self) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == "DELETE")
            .collect()
    }
}
