use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use tenant_relay::bus::BusSubscriber;
use tenant_relay::config::{BusBackend, Settings};
use tenant_relay::server::{create_app, AppState};
use tenant_relay::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new().context("failed to load configuration")?;

    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(
        auth_mode = ?settings.auth.mode,
        bus = ?settings.bus.backend,
        "Configuration loaded"
    );

    let state = AppState::from_settings(settings.clone()).await?;
    tracing::info!("Application state initialized");

    // With the Redis backend every instance delivers what the channel carries
    let subscriber = (settings.bus.backend == BusBackend::Redis).then(|| {
        BusSubscriber::new(
            &settings.redis.url,
            &settings.bus.channel,
            state.dispatcher.clone(),
        )
    });
    let subscriber_shutdown = subscriber.as_ref().map(|s| s.shutdown_signal());
    let subscriber_handle = subscriber.map(|s| tokio::spawn(async move { s.start().await }));

    let app = create_app(state);

    // Failing to bind is the one fatal startup error
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(subscriber_shutdown))
        .await?;

    if let Some(handle) = subscriber_handle {
        tracing::info!("Waiting for bus subscriber to finish...");
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: Option<broadcast::Sender<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    if let Some(tx) = shutdown_tx {
        let _ = tx.send(());
    }
}
