use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

use pktracker_api::{AppConfig, build_app};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    pktracker_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.server.bind_addr.clone();

    let (app, services) = build_app(config).context("failed to start services")?;

    let sweeper = {
        let services = services.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tick.tick().await;
                if let Err(err) = services.sweep_expired(chrono::Utc::now()) {
                    tracing::warn!(error = %err, "sweep failed");
                }
            }
        })
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    sweeper.abort();
    services.shutdown();
    Ok(())
}
