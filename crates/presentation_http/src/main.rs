//! Dice service HTTP server
//!
//! Main entry point for the instrumented dice-rolling API.

use std::{future::IntoFuture, time::Duration};

use infrastructure::{AppConfig, StdoutExporters, init_logging, init_telemetry};
use presentation_http::{routes, state::AppState};
use tokio::{net::TcpListener, signal, sync::oneshot};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, load_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    init_logging(&config.telemetry)?;

    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    info!("🎲 Dice service v{} starting...", env!("CARGO_PKG_VERSION"));

    let (telemetry, telemetry_shutdown) =
        match init_telemetry(&config.telemetry, &StdoutExporters) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                let (source, shutdown) = e.into_parts();
                error!(error = %source, "Failed to set up OpenTelemetry");
                if let Err(shutdown_error) = shutdown.shutdown().await {
                    error!(error = %shutdown_error, "Failed to release partial telemetry pipeline");
                }
                return Err(source.into());
            },
        };

    let app = routes::create_router(AppState::new(telemetry));

    let addr = config.server.bind_address();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %addr, error = %e, "Failed to bind listener");
            if let Err(shutdown_error) = telemetry_shutdown.shutdown().await {
                error!(error = %shutdown_error, "Telemetry shutdown failed");
            }
            return Err(e.into());
        },
    };

    info!("🚀 Serving on http://{}", addr);

    let drain_timeout = config.server.shutdown_timeout();
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal(drain_timeout).await;
            let _ = signalled_tx.send(());
        })
        .into_future();

    // In-flight requests get `drain_timeout` to finish once a signal arrives
    let drain_deadline = async move {
        if signalled_rx.await.is_ok() {
            tokio::time::sleep(drain_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    let served = tokio::select! {
        result = server => result,
        () = drain_deadline => {
            warn!(timeout = ?drain_timeout, "Connections still open after drain timeout, closing");
            Ok(())
        }
    };

    // Flush spans and metrics whether or not the server exited cleanly
    let flushed = telemetry_shutdown.shutdown().await;

    served?;
    flushed?;

    info!("👋 Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM) and handle graceful shutdown
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        // Log error but continue waiting - this is a best-effort signal handler
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("📥 Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("📥 Received SIGTERM, initiating graceful shutdown...");
        }
    }

    info!("⏳ Waiting up to {:?} for connections to close...", timeout);
}
