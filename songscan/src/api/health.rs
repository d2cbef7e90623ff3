//! Health check and banner endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("songscan")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Jobs currently held by the registry
    pub jobs: usize,
}

/// GET / response
#[derive(Debug, Serialize, Deserialize)]
pub struct BannerResponse {
    pub ok: bool,
    pub msg: String,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "songscan".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        jobs: state.registry.len().await,
    })
}

/// GET /
pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        ok: true,
        msg: "SongScanner backend up".to_string(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_check))
}
