mod wiring;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use api_http::{AppState, build_router};
use observability::init_tracing;
use platform_core::AppConfig;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.app.service_name, &config.observability.log_filter);
    info!(env = config.app.env.as_str(), "api server starting");

    let storage = wiring::open_storage(&config.database).await?;
    let backend = storage.backend;
    let integrations = wiring::integrations(&config)?;
    let services = wiring::build_services(&config, storage, integrations)?;
    let state = AppState::new(Arc::new(services), wiring::http_settings(&config));
    let router = build_router(state);

    let listener = TcpListener::bind(&config.app.http_bind_addr)
        .await
        .with_context(|| format!("binding {}", config.app.http_bind_addr))?;
    info!(addr = %config.app.http_bind_addr, storage = backend, "api server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving http")?;

    info!("api server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "ctrl+c handler unavailable");
            std::future::pending::<()>().await;
        }
        info!("received ctrl+c, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(err) => {
                error!(error = %err, "terminate handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
