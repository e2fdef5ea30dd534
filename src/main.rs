use iems_telemetry_api::api::{self, AppState};
use iems_telemetry_api::config::Config;
use iems_telemetry_api::keepalive::KeepAlivePinger;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Local development keeps credentials in .env; the host injects them.
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Starting ThingsBoard telemetry service");

    let cfg_path = std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!("Configuration loaded");

    let http = reqwest::Client::builder()
        .user_agent(concat!("iems-telemetry-api/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let keepalive = if cfg.keepalive.enabled {
        Some(KeepAlivePinger::from_config(http.clone(), &cfg.keepalive).spawn())
    } else {
        info!("Keep-alive disabled");
        None
    };

    let state = Arc::new(AppState::new(&cfg, http));
    let router = api::create_router(state);
    let addr = format!("{}:{}", cfg.api.host, cfg.api.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!("API server listening on {}", addr);

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "API server error");
    }

    if let Some(handle) = keepalive {
        handle.abort();
        info!("Keep-alive stopped");
    }

    info!("Application shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
