//! Shared fixtures for MCP Adapter integration tests.

use std::sync::Once;

/// Mock MCP backends built on wiremock
pub mod backend;
pub use backend::MockMcpBackend;

pub use gateway::{RunningGateway, TEST_TOKEN};

static TRACING: Once = Once::new();

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
