//! MemoriGraph server entry point

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tracing::info;

use memorigraph::{
    config::{self, ServerConfig},
    errors, metrics, tracing_setup,
    handlers::{build_router, MemoryGateway},
};

/// Upper bound on the whole cleanup phase after the listener stops
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().any(|a| a == "--help" || a == "-h") {
        config::print_env_help();
        return Ok(());
    }

    // Logging starts before the rest of the configuration so config errors get logged
    let _log_guard = tracing_setup::init_tracing(&tracing_setup::LogSettings::from_env());

    metrics::register_metrics().context("Failed to register metrics")?;
    info!("📊 Metrics registered at /metrics");

    info!("🧠 Starting MemoriGraph server...");

    let server_config = ServerConfig::from_env().context("Invalid configuration")?;
    server_config.log();
    errors::set_debug_mode(server_config.debug);

    let gateway = Arc::new(MemoryGateway::from_config(&server_config));
    gateway
        .initialize()
        .context("Failed to initialize backend clients")?;
    info!("🔌 Graph database and knowledge engine clients ready");

    let app = build_router(gateway.clone())
        .layer(ConcurrencyLimitLayer::new(server_config.max_concurrent_requests))
        .layer(server_config.cors.to_layer());

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                server_config.host, server_config.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🔒 Listener stopped, closing backend clients...");

    match tokio::time::timeout(
        std::time::Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        gateway.shutdown(),
    )
    .await
    {
        Ok(()) => info!("👋 Server shutdown complete"),
        Err(_) => tracing::error!(
            "⏱️  Graceful shutdown timed out after {}s",
            GRACEFUL_SHUTDOWN_TIMEOUT_SECS
        ),
    }

    Ok(())
}

/// Handle graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received, starting graceful shutdown");
}
