//! Telemetry Hub HTTP Server
//!
//! Serves topic metadata, realtime reads, filtered reports and trend
//! predictions over a fail-open cache.
//!
//! # Endpoints
//!
//! ## Topics
//! - `GET /all-topics-labels`, `POST /get-single-topic-label`
//! - `PUT /topic-label-update/:id`, `POST /create-tagname`
//! - `GET /get-all-tagname`, `GET /get-recent-5-tagname`
//! - `DELETE /delete-topic/:topic`
//!
//! ## Subscriptions
//! - `POST /subscribe`, `POST /subscribe-to-all`, `POST /unsubscribe-from-all`
//! - `GET /get-all-subscribedtopics`
//!
//! ## Readings
//! - `POST /messages`, `POST /realtime-data/last-2-hours`, `POST /realtime-data/range`
//! - `POST /report-filter`, `GET /prediction/:topic`
//!
//! ## Admin
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//!
//! # Configuration
//!
//! The server reads configuration from:
//! 1. `TELEMETRY_CONFIG` environment variable (path to TOML file)
//! 2. `./telemetry.toml` in current directory
//! 3. Default configuration
//!
//! # Example
//!
//! ```bash
//! REDIS_URL=redis://localhost:6379 PORT=5000 ./server
//!
//! curl -X POST http://localhost:5000/report-filter \
//!   -H "Content-Type: application/json" \
//!   -d '{"topics": ["T1"], "from": "2024-01-01", "to": "2024-01-01", "filterType": "none"}'
//! ```

use std::{net::SocketAddr, sync::Arc};

use telemetry_hub::{
    build_router,
    cache::{
        CacheBackend, CacheGateway, ConnectionMonitor, ConnectionStatus, DisabledBackend,
        KeyBuilder, LifecycleEvent, MemoryBackend, RedisBackend,
    },
    config::{load_config, CacheBackendKind, ServerConfig},
    store::{LocalBroker, MemoryStore},
    AppState, TelemetryService,
};
use tokio::{signal, sync::broadcast};
use tracing::{error, info, warn};

// =============================================================================
// Cache Initialization
// =============================================================================

/// Build the cache gateway for the configured backend.
///
/// An unreachable Redis at startup leaves the gateway in the errored state;
/// requests go straight to the store until the monitor's probe succeeds.
async fn init_cache(config: &ServerConfig) -> Result<CacheGateway, Box<dyn std::error::Error>> {
    let keys = KeyBuilder::new(config.cache.key_prefix.clone());

    match config.cache.backend {
        CacheBackendKind::Redis => {
            let backend = RedisBackend::new(&config.cache.redis_url)?;
            let status = ConnectionStatus::new();
            let gateway = CacheGateway::new(Arc::new(backend), status, keys);

            match gateway.probe().await {
                state if state.is_available() => {
                    info!(url = %config.cache.redis_url, "Connected to Redis");
                }
                _ => {
                    warn!(
                        url = %config.cache.redis_url,
                        "Redis unreachable at startup, serving from store until it recovers"
                    );
                }
            }
            Ok(gateway)
        }
        CacheBackendKind::Memory => {
            info!("Using in-process cache");
            let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new());
            Ok(CacheGateway::ready(backend, keys))
        }
        CacheBackendKind::Disabled => {
            info!("Cache disabled");
            let gateway =
                CacheGateway::new(Arc::new(DisabledBackend), ConnectionStatus::new(), keys);
            gateway.record(LifecycleEvent::Error);
            Ok(gateway)
        }
    }
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
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

    info!("Shutdown signal received");
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("telemetry_hub=info".parse()?)
                .add_directive("server=info".parse()?),
        )
        .init();

    info!("Telemetry Hub starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config();
    config.validate()?;
    info!("Listen address: {}", config.listen_addr);
    info!(
        offset_minutes = config.reporting.reference_utc_offset_minutes,
        "Reference zone"
    );

    // Cache and collaborators
    let cache = init_cache(&config).await?;
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(LocalBroker::new(store.clone()));

    let service = TelemetryService::new(store, broker, cache.clone(), config.service_options()?);

    // Connection monitor
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let monitor = ConnectionMonitor::new(config.monitor_config(), cache.clone());
    let monitor_handle = match config.cache.backend {
        CacheBackendKind::Disabled => None,
        _ => Some(tokio::spawn(monitor.run(shutdown_tx.subscribe()))),
    };

    // Build router
    let app = build_router(Arc::new(AppState::new(service)));

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Starting HTTP server on {}", addr);

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    let shutdown_tx_server = shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx_server.send(());
        })
        .await?;

    let _ = shutdown_tx.send(());
    if let Some(handle) = monitor_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Connection monitor task failed");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
