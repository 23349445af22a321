//! MCP Adapter gateway binary
//!
//! Reads `.env`, the environment and `servers.json`, then serves the gateway
//! until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use mcpadapter_core::{branding, GatewaySettings, ServersConfig};
use mcpadapter_gateway::{GatewayConfig, GatewayServer, GatewayServices, StaticTokenGate};

/// Console plus an optional daily-rotated file under `log_dir`
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // RUST_LOG wins, then LOG_LEVEL, then our defaults
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match std::env::var("LOG_LEVEL") {
            Ok(level) if !level.trim().is_empty() => EnvFilter::new(level.trim().to_lowercase()),
            _ => EnvFilter::new("info,mcpadapter_core=debug,mcpadapter_gateway=debug"),
        }
    });

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let (file_layer, guard) = match log_dir.map(|dir| {
        std::fs::create_dir_all(dir)?;
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(branding::LOG_PREFIX)
            .filename_suffix("log")
            .build(dir)
            .map_err(std::io::Error::other)
    }) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("Warning: file logging disabled: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = GatewaySettings::from_env().context("invalid gateway settings")?;
    let _log_guard = init_tracing(settings.log_dir.as_deref());

    info!("{} v{} starting", branding::DISPLAY_NAME, branding::VERSION);

    let servers = ServersConfig::load_or_empty(&settings.servers_file);
    let backends = servers.backends();
    for backend in &backends {
        info!("Backend {} → {}", backend.id, backend.url);
    }

    let gate = StaticTokenGate::new(settings.access_tokens.iter().cloned());
    if gate.is_empty() {
        warn!("ADAPTER_ACCESS_TOKENS is empty; every MCP request will be rejected");
    }

    let services = GatewayServices::initialize(backends, servers.pool.clone(), Arc::new(gate));
    let server = GatewayServer::new(GatewayConfig::from_settings(&settings), services);

    server.run().await
}
