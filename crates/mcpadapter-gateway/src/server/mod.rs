//! Gateway Server
//!
//! HTTP front door: the protocol routes (`/mcp`, `/`) behind the bearer-token
//! gate, plus public `/health`, `/info` and `/sessions`.

mod handlers;
pub mod logging_middleware;
mod service_container;

pub use handlers::{
    AppState, HealthResponse, InfoResponse, PoolConfig, PoolCounters, PoolDetail, PoolStats,
    SessionsResponse,
};
pub use service_container::GatewayServices;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use mcpadapter_core::{branding, GatewaySettings};

use crate::mcp::{mcp_auth_middleware, AdapterGatewayHandler};

type McpService = StreamableHttpService<AdapterGatewayHandler, LocalSessionManager>;

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Enable CORS for browser access
    pub enable_cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: branding::DEFAULT_GATEWAY_PORT,
            enable_cors: true,
        }
    }
}

impl GatewayConfig {
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            enable_cors: settings.enable_cors,
        }
    }
}

pub struct GatewayServer {
    config: GatewayConfig,
    services: Arc<GatewayServices>,
    cancellation: CancellationToken,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, services: GatewayServices) -> Self {
        Self {
            config,
            services: Arc::new(services),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn services(&self) -> &Arc<GatewayServices> {
        &self.services
    }

    /// Cancelling this token stops a running server
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    fn mcp_service(
        &self,
        handler: AdapterGatewayHandler,
        sessions: Arc<LocalSessionManager>,
    ) -> McpService {
        StreamableHttpService::new(
            move || {
                debug!("[Gateway] Creating handler instance for MCP session");
                Ok(handler.clone())
            },
            sessions,
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: Some(Duration::from_secs(30)),
                sse_retry: Some(Duration::from_secs(3)),
                cancellation_token: self.cancellation.child_token(),
            },
        )
    }

    pub fn router(&self) -> Router {
        let handler = AdapterGatewayHandler::new(Arc::clone(&self.services));
        let sessions = Arc::new(LocalSessionManager::default());

        // `/` is an alias of `/mcp`; both share one session manager. The gate
        // is a route layer so unmatched paths still fall through to 404.
        let mcp_routes = Router::new()
            .nest_service("/mcp", self.mcp_service(handler.clone(), Arc::clone(&sessions)))
            .route_service("/", self.mcp_service(handler, sessions))
            .route_layer(middleware::from_fn_with_state(
                Arc::clone(&self.services.auth_gate),
                mcp_auth_middleware,
            ));

        let public_routes = Router::new()
            .route("/health", get(handlers::health))
            .route("/info", get(handlers::info))
            .route("/sessions", get(handlers::sessions))
            .with_state(AppState {
                services: Arc::clone(&self.services),
            });

        let mut router = Router::new()
            .merge(public_routes)
            .merge(mcp_routes)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(
                logging_middleware::http_logging_middleware,
            ));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Bind the configured address and serve until Ctrl-C or cancellation
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let token = self.cancellation.clone();

        self.serve(listener, async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("[Gateway] Failed to listen for Ctrl-C: {}", e);
                        token.cancelled().await;
                    } else {
                        info!("[Gateway] Ctrl-C received, shutting down");
                    }
                }
                _ = token.cancelled() => {}
            }
        })
        .await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        info!(
            "[Gateway] {} v{} listening on {} ({} backends, CORS {})",
            branding::DISPLAY_NAME,
            branding::VERSION,
            listener.local_addr()?,
            self.services.backends.len(),
            if self.config.enable_cors { "on" } else { "off" }
        );

        let services = Arc::clone(&self.services);
        tokio::spawn(async move {
            let report = services.discover_tools().await;
            for failed in report.failed_backends() {
                warn!(
                    "[Gateway] Backend {} unavailable at startup: {}",
                    failed.backend_id,
                    failed.error.as_deref().unwrap_or("unknown error")
                );
            }
        });

        let token = self.cancellation.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                // Ends open SSE streams so in-flight connections can drain
                token.cancel();
            })
            .await?;

        self.cancellation.cancel();
        self.services.shutdown().await;
        info!("[Gateway] Stopped");
        Ok(())
    }
}
