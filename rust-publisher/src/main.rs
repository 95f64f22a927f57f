//! Rabbit Publisher - HTTP to RabbitMQ publishing server.
//!
//! This binary:
//! - Connects to RabbitMQ and declares the topic exchange (fatal on failure)
//! - Starts the delivery observer that logs confirms and returns
//! - Serves `POST /publish/color` and `POST /publish/shape`

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rabbit_publisher::broker::spawn_observer;
use rabbit_publisher::web::{router, AppState};
use rabbit_publisher::{AmqpTransport, Config, LoggingObserver, Publisher, Topology};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("publisher_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        custom_credentials = config.has_custom_credentials(),
        "config_loaded"
    );

    let topology = Arc::new(Topology::default());

    // Connect and declare the exchange up front; the server does not start
    // without a broker.
    let transport = Arc::new(AmqpTransport::new(config.amqp_url.clone(), topology.clone()));
    transport
        .connect()
        .await
        .context("Failed to connect to RabbitMQ and declare topology")?;

    let (outcomes, observer) = spawn_observer(LoggingObserver);
    let publisher = Publisher::new(transport.clone(), outcomes);
    info!("rabbitmq_publisher_created");

    let app = router(AppState::new(topology, publisher));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // The router owns the last publisher handle, so the observer task winds
    // down once the server has stopped.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    transport.close().await;

    // Confirmations still in flight resolve as rejected once the channel is
    // closed, and the observer logs them before exiting.
    if let Err(e) = observer.await {
        warn!(error = %e, "delivery_observer_join_failed");
    }

    info!("publisher_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
