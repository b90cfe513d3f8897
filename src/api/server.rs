use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{
    services::{
        download_artifact, get_info, get_progress, health, prepare_job, proxy_image, stream_media,
    },
    state::AppState,
    ws::ws_handler,
};
use crate::config::Config;
use crate::resolver::YtDlp;
use crate::tools;
use crate::transcode::Ffmpeg;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All routes, bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/info", get(get_info))
        .route("/api/prepare", post(prepare_job))
        .route("/api/progress/{job_id}", get(get_progress))
        .route("/api/download/{job_id}", get(download_artifact))
        .route("/api/stream", get(stream_media))
        .route("/api/proxy_image", get(proxy_image))
        .route("/ws/{client_id}", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let download_dir = &config.server.download_dir;
    info!(path = %download_dir.display(), "Preparing download directory");
    tokio::fs::create_dir_all(download_dir)
        .await
        .map_err(|e| format!("Failed to create {}: {}", download_dir.display(), e))?;

    match tools::resolver_version(&config.resolver.binary) {
        Ok(version) => info!(binary = %config.resolver.binary, %version, "Resolver available"),
        Err(e) => warn!(error = %e, "Resolver binary unavailable, every job will fail"),
    }
    match tools::transcoder_version(&config.transcoder.binary) {
        Ok(version) => info!(binary = %config.transcoder.binary, %version, "Transcoder available"),
        Err(e) => warn!(error = %e, "Transcoder binary unavailable, merging, audio extraction and GIF output will fail"),
    }

    let resolver = Arc::new(YtDlp::new(&config.resolver, &config.transcoder));
    let transcoder = Arc::new(Ffmpeg::new(&config.transcoder));
    let address = config.server.bind_addr;

    let state = AppState::new(config, resolver, transcoder)?;
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "mediafetch listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
