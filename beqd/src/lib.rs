//! beqd library interface
//!
//! BEQ profile loader daemon: resolves "now playing" media identity,
//! loads the matching bass EQ profile into a DSP device through an ezbeq
//! server, and publishes load status, device snapshots and sensor updates
//! over REST + SSE.

pub mod api;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use crate::error::{Error, Result};

use axum::Router;
use beqd_common::config::BeqdConfig;
use chrono::{DateTime, Utc};
use services::{DeviceMonitor, Orchestrator};
use state::SharedState;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BeqdConfig>,
    pub shared: Arc<SharedState>,
    pub orchestrator: Arc<Orchestrator>,
    pub monitor: Arc<DeviceMonitor>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<BeqdConfig>,
        shared: Arc<SharedState>,
        orchestrator: Arc<Orchestrator>,
        monitor: Arc<DeviceMonitor>,
    ) -> Self {
        Self {
            config,
            shared,
            orchestrator,
            monitor,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .merge(api::health_routes())
        .merge(api::status_routes())
        .merge(api::profile_routes())
        .merge(api::sensor_routes())
        .merge(api::device_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
