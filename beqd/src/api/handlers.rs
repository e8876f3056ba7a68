//! HTTP API handlers
//!
//! Load/unload operations, the sensor store surface and the device
//! snapshot endpoints. Every identity field of a load request can be
//! given either as a literal value or as a sensor reference resolved
//! against the store at invocation time.

use crate::error::{Error, Result};
use crate::models::{LoadOutcome, ProfileRequest};
use crate::services::LoadOptions;
use crate::state::{SensorState, DEVICES_SENSOR_ID};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use beqd_common::events::{LoadStage, LoadStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "beqd".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

fn default_slots() -> Vec<u32> {
    vec![1]
}

/// Body of POST /api/v1/profile/load
///
/// `*_sensor` fields name a sensor whose current state supplies the value;
/// a literal field wins over its sensor counterpart when both are given.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadProfileParams {
    pub tmdb_id: Option<String>,
    pub tmdb_sensor: Option<String>,
    pub year: Option<i32>,
    pub year_sensor: Option<String>,
    pub codec: Option<String>,
    pub codec_sensor: Option<String>,
    pub edition: Option<String>,
    pub edition_sensor: Option<String>,
    pub title: Option<String>,
    pub title_sensor: Option<String>,
    #[serde(default)]
    pub preferred_author: String,
    #[serde(default = "default_slots")]
    pub slots: Vec<u32>,
    #[serde(default)]
    pub enable_audio_codec_substitutions: bool,
    #[serde(default)]
    pub manual_load: bool,
    pub image_sensor: Option<String>,
}

async fn resolve_field(
    state: &AppState,
    literal: &Option<String>,
    sensor: &Option<String>,
) -> Result<Option<String>> {
    if let Some(value) = literal {
        return Ok(Some(value.clone()));
    }
    match sensor {
        Some(sensor_id) => Ok(Some(state.shared.resolve_sensor(sensor_id).await?)),
        None => Ok(None),
    }
}

async fn build_request(state: &AppState, params: &LoadProfileParams) -> Result<ProfileRequest> {
    let tmdb_id = resolve_field(state, &params.tmdb_id, &params.tmdb_sensor)
        .await?
        .ok_or_else(|| Error::InvalidInput("tmdb_id or tmdb_sensor is required".to_string()))?;

    let year = match params.year {
        Some(year) => year,
        None => {
            let sensor_id = params.year_sensor.as_ref().ok_or_else(|| {
                Error::InvalidInput("year or year_sensor is required".to_string())
            })?;
            let raw = state.shared.resolve_sensor(sensor_id).await?;
            raw.trim().parse::<i32>().map_err(|_| {
                Error::InvalidInput(format!(
                    "year value {:?} from {} is not a number",
                    raw, sensor_id
                ))
            })?
        }
    };

    let codec = resolve_field(state, &params.codec, &params.codec_sensor)
        .await?
        .ok_or_else(|| Error::InvalidInput("codec or codec_sensor is required".to_string()))?;

    let edition = resolve_field(state, &params.edition, &params.edition_sensor)
        .await?
        .unwrap_or_default();
    let title = resolve_field(state, &params.title, &params.title_sensor)
        .await?
        .unwrap_or_default();

    if params.slots.is_empty() {
        return Err(Error::InvalidInput("slots must not be empty".to_string()));
    }

    Ok(ProfileRequest {
        tmdb_id,
        year,
        codec,
        edition,
        title,
        preferred_author: params.preferred_author.clone(),
        slots: params.slots.clone(),
        manual_load: params.manual_load,
    })
}

/// POST /api/v1/profile/load
///
/// Resolution failures are published to the status sensor as `load_fail`
/// before the error response goes out, so automations watching only the
/// sensor still see the attempt.
pub async fn load_profile(
    State(state): State<AppState>,
    Json(params): Json<LoadProfileParams>,
) -> Result<Json<LoadOutcome>> {
    let request = match build_request(&state, &params).await {
        Ok(request) => request,
        Err(e) => {
            let mut status = LoadStatus::idle();
            status.stage = LoadStage::LoadFail;
            status.reason = e.to_string();
            status.slots = params.slots.clone();
            state.shared.publish_load_status(status).await;
            return Err(e);
        }
    };

    info!(
        tmdb_id = %request.tmdb_id,
        codec = %request.codec,
        substitutions = params.enable_audio_codec_substitutions,
        "Profile load requested"
    );

    let options = LoadOptions {
        enable_substitutions: params.enable_audio_codec_substitutions,
        image_sensor: params.image_sensor.clone(),
    };
    let outcome = state.orchestrator.load_profile(&request, &options).await?;
    Ok(Json(outcome))
}

/// Body of POST /api/v1/profile/unload
#[derive(Debug, Deserialize)]
pub struct UnloadProfileParams {
    #[serde(default = "default_slots")]
    pub slots: Vec<u32>,
    pub image_sensor: Option<String>,
}

/// POST /api/v1/profile/unload
pub async fn unload_profile(
    State(state): State<AppState>,
    Json(params): Json<UnloadProfileParams>,
) -> Result<Json<Value>> {
    let result = state.orchestrator.unload_profile(&params.slots).await;

    // The image sensor is cleared whether or not the device call succeeded
    if let Some(sensor_id) = &params.image_sensor {
        let mut attrs = Map::new();
        attrs.insert(
            "source".to_string(),
            Value::String("beq_catalogue".to_string()),
        );
        attrs.insert("tmdb".to_string(), Value::String(String::new()));
        state.shared.publish_sensor(sensor_id, "", attrs).await;
    }

    result?;
    Ok(Json(json!({ "unloaded": params.slots })))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/profile/load", post(load_profile))
        .route("/api/v1/profile/unload", post(unload_profile))
}

/// GET /api/v1/status
pub async fn load_status(State(state): State<AppState>) -> Json<LoadStatus> {
    Json(state.shared.load_status().await)
}

pub fn status_routes() -> Router<AppState> {
    Router::new().route("/api/v1/status", get(load_status))
}

/// GET /api/v1/sensors
pub async fn list_sensors(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "sensors": state.shared.sensor_ids().await }))
}

/// GET /api/v1/sensors/:id
pub async fn get_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<SensorState>> {
    state
        .shared
        .get_sensor(&sensor_id)
        .await
        .map(Json)
        .ok_or(Error::SensorNotFound(sensor_id))
}

/// Body of POST /api/v1/sensors/:id
#[derive(Debug, Deserialize)]
pub struct SensorUpdate {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// POST /api/v1/sensors/:id
///
/// Feed endpoint for upstream automations publishing "now playing" values.
pub async fn update_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
    Json(update): Json<SensorUpdate>,
) -> Json<Value> {
    state
        .shared
        .publish_sensor(&sensor_id, update.state, update.attributes)
        .await;
    Json(json!({ "sensor": sensor_id }))
}

pub fn sensor_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/sensors", get(list_sensors))
        .route("/api/v1/sensors/:id", get(get_sensor).post(update_sensor))
}

/// GET /api/v1/devices
///
/// Returns the most recent device snapshot sensor, or 404 before the
/// first refresh has completed.
pub async fn get_devices(State(state): State<AppState>) -> Result<Json<SensorState>> {
    state
        .shared
        .get_sensor(DEVICES_SENSOR_ID)
        .await
        .map(Json)
        .ok_or(Error::SensorNotFound(DEVICES_SENSOR_ID.to_string()))
}

/// POST /api/v1/devices/refresh
///
/// Synchronous refresh: responds after the snapshot has been fetched and
/// published.
pub async fn refresh_devices(State(state): State<AppState>) -> Json<Value> {
    state.monitor.refresh().await;
    Json(json!({ "refreshed": true }))
}

pub fn device_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/devices", get(get_devices))
        .route("/api/v1/devices/refresh", post(refresh_devices))
}
