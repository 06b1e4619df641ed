// HTTP handlers

use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use time::OffsetDateTime;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use super::models::{ApiError, CreateDownloadRequest, CreateDownloadResponse};
use super::AppState;
use crate::downloader::AcquireError;

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Track Downloader REST API",
        "version": "1",
        "endpoints": ["GET /health", "POST /v1/download-url", "GET /v1/download/{token}"],
    }))
}

pub async fn health() -> Json<serde_json::Value> {
    let now = OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    Json(json!({ "ok": true, "now": now }))
}

pub async fn route_not_found() -> ApiError {
    ApiError::not_found("route not found")
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

pub async fn missing_token() -> ApiError {
    ApiError::bad_request("missing token")
}

pub async fn create_download_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<CreateDownloadResponse>, ApiError> {
    // Decoded regardless of Content-Type
    let req: CreateDownloadRequest = body
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| ApiError::bad_request("invalid JSON body"))?;

    if req.spotify_url.trim().is_empty() {
        return Err(ApiError::bad_request("spotify_url is required"));
    }

    let service = &state.service;
    // Reject an unusable service list before doing any work
    service
        .service_order(&req.services)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let requested_ttl = req.ttl_seconds.and_then(|secs| u64::try_from(secs).ok());
    let ttl = service.effective_ttl(requested_ttl);

    let acquired = service
        .acquire(&req.spotify_url, &req.services, ttl)
        .await
        .map_err(acquire_error)?;

    let base = state
        .base_url
        .clone()
        .unwrap_or_else(|| base_url_from_headers(&headers));

    Ok(Json(CreateDownloadResponse {
        ok: true,
        spotify_id: acquired.entry.spotify_id.clone(),
        service: acquired.entry.service.clone(),
        filename: acquired.entry.filename(),
        download_url: format!("{}/v1/download/{}", base, acquired.entry.token),
        expires_at: acquired.entry.expires_at,
        attempts: acquired.attempts,
    }))
}

pub async fn download_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::bad_request("missing token"));
    }

    let store = state.service.store();
    let entry = store
        .get(token)
        .await
        .ok_or_else(|| ApiError::not_found("invalid or expired token"))?;

    if entry.is_expired() {
        store.delete(token).await;
        return Err(ApiError::new(StatusCode::GONE, "download token expired"));
    }

    if tokio::fs::metadata(&entry.path).await.is_err() {
        store.delete(token).await;
        return Err(ApiError::not_found("file no longer available"));
    }

    let served = match ServeFile::new(&entry.path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    // Removed between the check and the open
    if served.status() == StatusCode::NOT_FOUND {
        store.delete(token).await;
        return Err(ApiError::not_found("file no longer available"));
    }

    info!(token = %token, service = %entry.service, status = %served.status(), "serving download");

    let filename = entry.filename();
    let mut response = served.map(Body::new);
    let headers = response.headers_mut();
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
    }
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&filename));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok(response.into_response())
}

fn acquire_error(err: AcquireError) -> ApiError {
    let message = err.to_string();
    match err {
        AcquireError::Invalid(_) => ApiError::bad_request(message),
        AcquireError::Metadata(_) => ApiError::new(StatusCode::BAD_GATEWAY, message),
        AcquireError::AllFailed(failed) => {
            ApiError::new(StatusCode::BAD_GATEWAY, message).with_attempts(failed.attempts)
        }
        AcquireError::Workspace(_) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message),
        AcquireError::Token(e) => {
            warn!(error = %e, "download token could not be issued");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "failed to generate download token")
        }
    }
}

/// `<proto>://<host>` from `X-Forwarded-Proto` (default http) and `Host`
fn base_url_from_headers(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}", scheme, host)
}

fn content_disposition(filename: &str) -> HeaderValue {
    let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_bytes(format!("attachment; filename=\"{}\"", escaped).as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
