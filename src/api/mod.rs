// REST API: routes, shared state and middleware

pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::downloader::TrackService;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1 << 20;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TrackService>,
    /// Overrides the base URL derived from request headers
    pub base_url: Option<String>,
}

/// Routes:
/// - `GET  /` - service description
/// - `GET  /health` - liveness
/// - `POST /v1/download-url` - acquire a track and mint a download link
/// - `GET  /v1/download/{token}` - redeem a download link
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/v1/download-url", post(handlers::create_download_url))
        .route("/v1/download/", get(handlers::missing_token))
        .route("/v1/download/{token}", get(handlers::download_by_token))
        .fallback(handlers::route_not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
