//! songscan library interface
//!
//! Exposes the router, state and services for the binary and for
//! integration testing.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use songscan_common::events::EventBus;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::services::{
    AcquisitionError, JobRegistry, MediaAcquirer, RecognitionInvoker, ScanTask,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Every job the service knows about
    pub registry: JobRegistry,
    /// Spawns the background work for a submitted job
    pub scan_task: ScanTask,
    pub config: Arc<ServiceConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Result<Self, AcquisitionError> {
        let event_bus = EventBus::new(config.event_capacity);
        let registry = JobRegistry::new(event_bus);
        let acquirer = Arc::new(MediaAcquirer::new(config.acquirer.clone())?);
        let invoker = Arc::new(RecognitionInvoker::new(config.recognizer.clone()));

        Ok(Self {
            scan_task: ScanTask::new(registry.clone(), acquirer, invoker),
            registry,
            config: Arc::new(config),
            startup_time: Utc::now(),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .merge(api::health_routes())
        .merge(api::scan_routes())
        .merge(api::event_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
