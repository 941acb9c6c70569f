//! Udemy Coupon Relay: binary entrypoint.
//! Boots the health server and the dispatch scheduler, then waits for a
//! shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use udemy_coupon_relay::{
    api::{self, AppState},
    config::Settings,
    cursor::JsonCursorStore,
    notify::TelegramNotifier,
    scheduler::{spawn_scheduler, Liveness},
    telemetry, Relay,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let settings = Settings::load().context("loading settings")?;
    let prometheus = telemetry::install_prometheus().context("installing metrics recorder")?;

    let store = Arc::new(JsonCursorStore::open(&settings.cursor_path).await);
    let notifier = Arc::new(
        TelegramNotifier::new(settings.bot_token.clone(), settings.channel_id.clone())
            .with_api_base(settings.telegram_api_base.clone())
            .with_timeout(settings.request_timeout_secs)
            .with_retries(settings.telegram_retries),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = Relay::from_settings(&settings, notifier, store)
        .context("building source adapters")?
        .with_shutdown(shutdown_rx.clone());
    let relay = Arc::new(relay);

    let liveness = Liveness::new();
    let app = api::router(AppState::new(liveness.clone()).with_metrics(prometheus));
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding health server on {addr}"))?;
    tracing::info!(%addr, "health server listening");

    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        let res = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = res {
            tracing::error!(error = %e, "health server failed");
        }
    });

    let scheduler = spawn_scheduler(relay, settings.monitor_interval, liveness, shutdown_rx);

    wait_for_signal().await;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "scheduler task ended abnormally");
    }
    let _ = server.await;
    tracing::info!("bye");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
