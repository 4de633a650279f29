//! BTC Signals - on-chain signal streaming server
//!
//! Main entry point for the WebSocket server

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use signals_data_feed::{DataAggregator, HttpMarketData};
use signals_stream_server::{settings, SessionRegistry, StreamServer, WsTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before logging so RUST_LOG can come from .env
    let env_file = settings::load_env();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting BTC Signals server v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = env_file {
        info!("Loaded environment from {}", path.display());
    }

    // Load configuration (signals.toml, SIGNALS__* variables)
    let config = settings::load()?;
    info!(
        interval_ms = config.refresh.interval_ms,
        timeout_ms = config.upstream.request_timeout_ms,
        "Refresh configuration loaded"
    );

    // Upstream sources feeding one shared aggregator
    let source = HttpMarketData::new(config.upstream.clone())?;
    let aggregator = Arc::new(DataAggregator::new(source, config.refresh.clone()));

    let transport = Arc::new(WsTransport::new());
    let registry = Arc::new(SessionRegistry::new(
        transport.clone(),
        aggregator.clone(),
        config.refresh.interval(),
    ));

    // Periodic health log
    {
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let sessions = registry.stats();
                let upstream = aggregator.stats();
                info!(
                    known = sessions.known_sessions,
                    active = sessions.active_sessions,
                    cycles = upstream.cycles,
                    failures = upstream.failures,
                    last_failure = ?upstream.last_failure,
                    "Server stats"
                );
            }
        });
    }

    let server = StreamServer::new(config.server.clone(), registry, transport);

    // Setup shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C");
            }
            _ = terminate => {
                info!("Received termination signal");
            }
        }

        let _ = shutdown_tx.send(());
    });

    info!("Press Ctrl+C to shutdown");

    if let Err(e) = server.start_with_shutdown(shutdown_rx).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Server shutdown complete");
    Ok(())
}
