use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use std::collections::HashMap;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::{
    models::{HealthResponse, InfoParams, JobAcceptedResponse, SubmitParams},
    state::AppState,
    utils::{content_disposition, content_type_for},
    validation::{is_http_url, validate_submit},
};
use crate::api::error::ApiError;
use crate::service::JobRequest;

/// Metadata lookup (GET /api/info?url=)
///
/// Runs the resolver on the blocking pool and returns either video or
/// playlist metadata with the deduplicated format options.
pub async fn get_info(
    State(state): State<AppState>,
    Query(params): Query<InfoParams>,
) -> Result<impl IntoResponse, ApiError> {
    if params.url.trim().is_empty() {
        return Err(ApiError::InvalidRequest("url is required".to_string()));
    }

    let metadata = state.service.info(params.url.trim()).await?;
    Ok(Json(metadata))
}

/// Job submission (POST /api/prepare)
///
/// ## Flow:
/// 1. Validate query parameters (URL scheme, selector, trim window, title)
/// 2. Sweep expired jobs and register the new one as `pending`
/// 3. Broadcast the `pending` event and start the worker thread
/// 4. Return 202 Accepted with the job id while the download runs
pub async fn prepare_job(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
) -> Result<impl IntoResponse, ApiError> {
    validate_submit(&params, state.config.jobs.max_title_chars)
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    let request = JobRequest::builder()
        .url(params.url.trim())
        .selector(params.format_id)
        .maybe_title(params.title)
        .start(params.start)
        .end(params.end)
        .gif(params.gif)
        .build();

    let job_id = state.service.submit(request)?;

    Ok((StatusCode::ACCEPTED, Json(JobAcceptedResponse { job_id })))
}

/// Job status (GET /api/progress/{job_id})
pub async fn get_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.service.status(&job_id)?;
    Ok(Json(job))
}

/// Artifact download (GET /api/download/{job_id})
///
/// Streams the finished file. The job stays registered and the file stays
/// on disk, so the same artifact can be fetched again. A transfer lease
/// travels with the body and keeps the job from being swept mid-response.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let artifact = state.service.fetch_artifact(&job_id)?;

    let file = tokio::fs::File::open(&artifact.path).await.map_err(|e| {
        warn!(job_id = %job_id, path = %artifact.path.display(), error = %e, "Artifact missing on disk");
        ApiError::NotFound(format!("artifact for job {job_id}"))
    })?;
    let length = file.metadata().await.ok().map(|m| m.len());

    debug!(job_id = %job_id, file = %artifact.name, "Serving artifact");

    let lease = artifact.lease;
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _held = &lease;
        chunk
    });

    let mut response = (
        [
            (
                header::CONTENT_TYPE,
                content_type_for(&artifact.path).to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&artifact.name),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response();

    if let Some(length) = length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, length.into());
    }

    Ok(response)
}

/// Direct stream relay (GET /api/stream?url=)
///
/// Resolves one progressive variant of the page URL and pipes the media
/// bytes through without writing anything to disk.
pub async fn stream_media(
    State(state): State<AppState>,
    Query(params): Query<InfoParams>,
) -> Result<impl IntoResponse, ApiError> {
    let url = params.url.trim();
    if !is_http_url(url) {
        return Err(ApiError::InvalidRequest("url must be an http/https URL".to_string()));
    }

    let media_url = state.service.stream_url(url).await?;
    let upstream = state.relay.media(&media_url).await.map_err(|e| {
        warn!(url, error = %e, "Stream relay failed");
        ApiError::from(e)
    })?;

    Ok(relayed(upstream, "video/mp4"))
}

/// Thumbnail relay (GET /api/proxy_image?url=)
pub async fn proxy_image(
    State(state): State<AppState>,
    Query(params): Query<InfoParams>,
) -> Result<impl IntoResponse, ApiError> {
    let url = params.url.trim();
    if !is_http_url(url) {
        return Err(ApiError::InvalidRequest("url must be an http/https URL".to_string()));
    }

    let upstream = state.relay.image(url).await.map_err(|e| {
        warn!(url, error = %e, "Image relay failed");
        ApiError::from(e)
    })?;

    Ok(relayed(upstream, "image/jpeg"))
}

/// Stream an upstream body back, keeping its content type.
fn relayed(upstream: reqwest::Response, fallback_type: &str) -> Response {
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fallback_type)
        .to_string();

    (
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response()
}

/// Health check endpoint (GET /health)
///
/// Reports component status and the in-process counters. Returns 503 when
/// the download directory is unusable.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    components.insert("api".to_string(), "healthy".to_string());
    components.insert(
        "registry".to_string(),
        format!("healthy ({} jobs)", state.service.jobs().len()),
    );
    components.insert(
        "hub".to_string(),
        format!("healthy ({} subscribers)", state.hub.subscriber_count()),
    );

    let download_dir_ok = tokio::fs::metadata(&state.config.server.download_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    components.insert(
        "download_dir".to_string(),
        if download_dir_ok { "healthy" } else { "unavailable" }.to_string(),
    );

    let (status_code, overall_status) = if download_dir_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}
