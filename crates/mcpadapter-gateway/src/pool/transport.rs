//! MCP client sessions over Streamable HTTP
//!
//! Every pooled session is an rmcp client running over its own
//! `reqwest::Client`, so the backend sees one keep-alive connection per
//! session. rmcp drives the handshake, SSE framing and response matching.
//! `SessionHttpClient` records the backend-issued session id and turns
//! non-2xx replies into typed status errors.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use rmcp::model::{
    CallToolRequest, CallToolRequestParams, ClientCapabilities, ClientInfo, ClientJsonRpcMessage,
    ClientRequest, Implementation, LoggingMessageNotificationParam, ProgressNotificationParam,
    ProtocolVersion, ServerJsonRpcMessage,
};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::transport::common::http_header::{
    EVENT_STREAM_MIME_TYPE, HEADER_LAST_EVENT_ID, HEADER_SESSION_ID, JSON_MIME_TYPE,
};
use rmcp::transport::streamable_http_client::{
    SseError, StreamableHttpClient, StreamableHttpClientTransportConfig, StreamableHttpError,
    StreamableHttpPostResponse,
};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{ClientHandler, RoleClient, ServiceError, ServiceExt};
use serde_json::Value;
use sse_stream::{Sse, SseStream};
use thiserror::Error;
use tracing::{debug, info};

use mcpadapter_core::branding;

use super::envelope::{BackendReply, ReplyEnvelope};
use super::session_pool::SessionLease;
use crate::error::ProxyError;

/// Running rmcp client for one pooled session
pub type BackendClient = RunningService<RoleClient, BackendClientHandler>;

const ACCEPT_JSON_OR_SSE: &str = "application/json, text/event-stream";

/// `{backend}/mcp/`
pub fn mcp_endpoint(backend_url: &str) -> String {
    format!("{}/mcp/", backend_url.trim_end_matches('/'))
}

/// Client side of every backend session
#[derive(Clone)]
pub struct BackendClientHandler {
    backend_url: Arc<str>,
}

impl BackendClientHandler {
    pub fn new(backend_url: &str) -> Self {
        Self {
            backend_url: backend_url.into(),
        }
    }
}

impl ClientHandler for BackendClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: branding::CLIENT_NAME.to_string(),
                version: branding::VERSION.to_string(),
                ..Default::default()
            },
            meta: None,
        }
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        debug!(
            "[Transport] {} log ({:?}): {}",
            self.backend_url, params.level, params.data
        );
    }

    async fn on_progress(
        &self,
        params: ProgressNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        debug!(
            "[Transport] {} progress {}/{:?}",
            self.backend_url, params.progress, params.total
        );
    }
}

/// HTTP-level failure of a session request
#[derive(Debug, Error)]
pub enum SessionHttpError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP Error {status}: {body}")]
    Status { status: u16, body: String },
}

type HttpResult<T> = Result<T, StreamableHttpError<SessionHttpError>>;

fn request_failed(error: reqwest::Error) -> StreamableHttpError<SessionHttpError> {
    StreamableHttpError::Client(SessionHttpError::Request(error))
}

async fn status_error(response: reqwest::Response) -> StreamableHttpError<SessionHttpError> {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StreamableHttpError::Client(SessionHttpError::Status { status, body })
}

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .map(|ct| String::from_utf8_lossy(ct.as_bytes()).into_owned())
}

/// Dedicated HTTP client for one session
///
/// `issued` captures the session id the backend hands out on `initialize`.
#[derive(Clone)]
pub struct SessionHttpClient {
    http: reqwest::Client,
    issued: Arc<OnceLock<String>>,
}

impl SessionHttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(1)
            .build()?;
        Ok(Self {
            http,
            issued: Arc::new(OnceLock::new()),
        })
    }

    /// Session id issued by the backend, if any
    pub fn issued_session_id(&self) -> Option<String> {
        self.issued.get().cloned()
    }
}

impl StreamableHttpClient for SessionHttpClient {
    type Error = SessionHttpError;

    async fn post_message(
        &self,
        uri: Arc<str>,
        message: ClientJsonRpcMessage,
        session_id: Option<Arc<str>>,
        auth_header: Option<String>,
    ) -> HttpResult<StreamableHttpPostResponse> {
        let mut request = self
            .http
            .post(uri.as_ref())
            .header(ACCEPT, ACCEPT_JSON_OR_SSE)
            .json(&message);
        if let Some(token) = auth_header {
            request = request.bearer_auth(token);
        }
        if let Some(id) = &session_id {
            request = request.header(HEADER_SESSION_ID, id.as_ref());
        }

        let response = request.send().await.map_err(request_failed)?;
        let status = response.status();
        if matches!(status, StatusCode::ACCEPTED | StatusCode::NO_CONTENT) {
            return Ok(StreamableHttpPostResponse::Accepted);
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let issued = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        if session_id.is_none() {
            if let Some(id) = &issued {
                let _ = self.issued.set(id.clone());
            }
        }

        match content_type(&response) {
            Some(ct) if ct.starts_with(EVENT_STREAM_MIME_TYPE) => {
                let events = SseStream::from_byte_stream(response.bytes_stream()).boxed();
                Ok(StreamableHttpPostResponse::Sse(events, issued))
            }
            Some(ct) if ct.starts_with(JSON_MIME_TYPE) => {
                let body = response.bytes().await.map_err(request_failed)?;
                let message: ServerJsonRpcMessage = serde_json::from_slice(&body)?;
                Ok(StreamableHttpPostResponse::Json(message, issued))
            }
            other => Err(StreamableHttpError::UnexpectedContentType(other)),
        }
    }

    async fn delete_session(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        auth_header: Option<String>,
    ) -> HttpResult<()> {
        let mut request = self
            .http
            .delete(uri.as_ref())
            .header(HEADER_SESSION_ID, session_id.as_ref());
        if let Some(token) = auth_header {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(request_failed)?;
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            debug!("[Transport] Backend does not support session deletion");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn get_stream(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        last_event_id: Option<String>,
        auth_header: Option<String>,
    ) -> HttpResult<BoxStream<'static, Result<Sse, SseError>>> {
        let mut request = self
            .http
            .get(uri.as_ref())
            .header(ACCEPT, EVENT_STREAM_MIME_TYPE)
            .header(HEADER_SESSION_ID, session_id.as_ref());
        if let Some(event_id) = last_event_id {
            request = request.header(HEADER_LAST_EVENT_ID, event_id);
        }
        if let Some(token) = auth_header {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(request_failed)?;
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Err(StreamableHttpError::ServerDoesNotSupportSse);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        match content_type(&response) {
            Some(ct) if ct.starts_with(EVENT_STREAM_MIME_TYPE) => {
                Ok(SseStream::from_byte_stream(response.bytes_stream()).boxed())
            }
            other => Err(StreamableHttpError::UnexpectedContentType(other)),
        }
    }
}

/// An initialized session
pub struct Connection {
    pub client: BackendClient,
    /// Session id issued by the backend; `None` for stateless backends
    pub server_session_id: Option<String>,
}

/// Run the MCP handshake against `{backend}/mcp/`, bounded by `timeout`
pub async fn connect(backend_url: &str, timeout: Duration) -> Result<Connection, String> {
    let http = SessionHttpClient::new().map_err(|e| error_chain(&e))?;
    let config = StreamableHttpClientTransportConfig {
        allow_stateless: true,
        ..StreamableHttpClientTransportConfig::with_uri(mcp_endpoint(backend_url))
    };
    let transport = StreamableHttpClientTransport::with_client(http.clone(), config);

    let handshake = BackendClientHandler::new(backend_url).serve(transport);
    let client = match tokio::time::timeout(timeout, handshake).await {
        Ok(Ok(client)) => client,
        Ok(Err(e)) => return Err(e.to_string()),
        Err(_) => return Err(format!("handshake timed out after {:?}", timeout)),
    };

    if let Some(server) = client.peer_info() {
        debug!(
            "[Transport] {} speaks {} ({} {})",
            backend_url,
            server.protocol_version,
            server.server_info.name,
            server.server_info.version
        );
    }

    Ok(Connection {
        client,
        server_session_id: http.issued_session_id(),
    })
}

/// `tools/call` over the leased session, bounded by `timeout`
pub async fn call_tool(
    lease: &SessionLease,
    tool: &str,
    arguments: Value,
    timeout: Duration,
) -> Result<BackendReply, ProxyError> {
    let endpoint = mcp_endpoint(lease.backend_url());
    let arguments = match arguments {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            return Err(ProxyError::Transport {
                url: endpoint,
                reason: format!("tool arguments must be an object, got {}", other),
            });
        }
    };
    let request = ClientRequest::CallToolRequest(CallToolRequest::new(CallToolRequestParams {
        meta: None,
        name: tool.to_string().into(),
        arguments,
        task: None,
    }));

    let envelope = match tokio::time::timeout(timeout, lease.peer().send_request(request)).await {
        Ok(Ok(result)) => ReplyEnvelope::from_result(
            serde_json::to_value(result).map_err(|e| ProxyError::MalformedReply(e.to_string()))?,
        ),
        Ok(Err(ServiceError::McpError(error))) => ReplyEnvelope::from_error(&error),
        Ok(Err(e)) => return Err(classify(&endpoint, e)),
        Err(_) => {
            return Err(ProxyError::Timeout {
                url: endpoint,
                timeout,
            })
        }
    };
    envelope.into_reply()
}

/// Transport and decode failures; JSON-RPC errors never reach here
fn classify(endpoint: &str, error: ServiceError) -> ProxyError {
    let transport = |reason: String| ProxyError::Transport {
        url: endpoint.to_string(),
        reason,
    };

    match error {
        ServiceError::UnexpectedResponse => {
            ProxyError::MalformedReply("reply does not answer tools/call".to_string())
        }
        ServiceError::TransportSend(e) => {
            match e.error.downcast_ref::<StreamableHttpError<SessionHttpError>>() {
                Some(StreamableHttpError::Client(SessionHttpError::Status { status, body })) => {
                    ProxyError::HttpStatus {
                        status: *status,
                        body: body.clone(),
                    }
                }
                Some(
                    decode @ (StreamableHttpError::Deserialize(_)
                    | StreamableHttpError::Sse(_)
                    | StreamableHttpError::UnexpectedContentType(_)
                    | StreamableHttpError::UnexpectedServerResponse(_)),
                ) => ProxyError::MalformedReply(decode.to_string()),
                Some(StreamableHttpError::Client(SessionHttpError::Request(e))) => {
                    transport(error_chain(e))
                }
                _ => transport(e.to_string()),
            }
        }
        other => transport(other.to_string()),
    }
}

/// Cancel the client; rmcp sends the session `DELETE` on the way out
pub async fn terminate(client: BackendClient, session_id: &str) {
    match client.cancel().await {
        Ok(reason) => info!("[Transport] Closed session {} ({:?})", session_id, reason),
        Err(e) => debug!("[Transport] Session {} close failed: {}", session_id, e),
    }
}

/// `outer: inner: root` for nested error sources
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
