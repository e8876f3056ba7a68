//! Shared daemon state
//!
//! Holds the sensor store (the status/state publication sink) and the
//! current load status snapshot. Sensors are generic (identifier, state,
//! attribute map) records: upstream automations feed "now playing" values
//! in, the orchestrator and device monitor publish their snapshots out,
//! and every update is broadcast on the event bus.

use crate::error::{Error, Result};
use beqd_common::events::{BeqdEvent, EventBus, LoadStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Entity id of the load status sensor
pub const LOAD_STATUS_SENSOR_ID: &str = "sensor.beqd_load_status";
/// Entity id of the device snapshot sensor
pub const DEVICES_SENSOR_ID: &str = "sensor.beqd_devices";

const LOAD_STATUS_FRIENDLY_NAME: &str = "beqd Load Status";

/// One sensor record: primary value plus free-form attributes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorState {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

/// Shared state accessible by all components
///
/// Uses RwLock for concurrent read access with rare writes.
pub struct SharedState {
    sensors: RwLock<HashMap<String, SensorState>>,
    load_status: RwLock<LoadStatus>,
    pub event_bus: EventBus,
}

impl SharedState {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            sensors: RwLock::new(HashMap::new()),
            load_status: RwLock::new(LoadStatus::idle()),
            event_bus,
        }
    }

    /// Get a sensor record, if present
    pub async fn get_sensor(&self, sensor_id: &str) -> Option<SensorState> {
        self.sensors.read().await.get(sensor_id).cloned()
    }

    /// All sensor ids currently in the store, sorted
    pub async fn sensor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sensors.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve a sensor reference to its current state value
    ///
    /// An unresolvable reference is a terminal error for the invocation
    /// that used it.
    pub async fn resolve_sensor(&self, sensor_id: &str) -> Result<String> {
        self.get_sensor(sensor_id)
            .await
            .map(|s| s.state)
            .ok_or_else(|| Error::SensorNotFound(sensor_id.to_string()))
    }

    /// Create or update a sensor and broadcast the change
    pub async fn publish_sensor(
        &self,
        sensor_id: &str,
        state: impl Into<String>,
        attributes: Map<String, Value>,
    ) {
        let state = state.into();
        let record = SensorState {
            state: state.clone(),
            attributes,
            updated_at: Utc::now(),
        };
        self.sensors
            .write()
            .await
            .insert(sensor_id.to_string(), record);

        self.event_bus.emit(BeqdEvent::SensorUpdated {
            sensor_id: sensor_id.to_string(),
            state,
            timestamp: Utc::now(),
        });
    }

    /// Current load status snapshot
    pub async fn load_status(&self) -> LoadStatus {
        self.load_status.read().await.clone()
    }

    /// Publish a load status transition
    ///
    /// Updates the snapshot, mirrors it into the status sensor (stage as
    /// the primary value, everything else flattened into attributes) and
    /// broadcasts a LoadStatusChanged event.
    pub async fn publish_load_status(&self, mut status: LoadStatus) {
        status.last_changed = Utc::now();
        *self.load_status.write().await = status.clone();

        let mut attrs = Map::new();
        attrs.insert(
            "friendly_name".to_string(),
            Value::String(LOAD_STATUS_FRIENDLY_NAME.to_string()),
        );
        attrs.insert(
            "stage".to_string(),
            Value::String(status.stage.to_string()),
        );
        attrs.insert(
            "last_changed".to_string(),
            Value::String(status.last_changed.to_rfc3339()),
        );
        if !status.profile.is_empty() {
            attrs.insert("profile".to_string(), Value::String(status.profile.clone()));
        }
        if !status.codec.is_empty() {
            attrs.insert("codec".to_string(), Value::String(status.codec.clone()));
        }
        if !status.edition.is_empty() {
            attrs.insert("edition".to_string(), Value::String(status.edition.clone()));
        }
        if !status.slots.is_empty() {
            attrs.insert(
                "slots".to_string(),
                serde_json::to_value(&status.slots).unwrap_or(Value::Null),
            );
        }
        if !status.author.is_empty() {
            attrs.insert("author".to_string(), Value::String(status.author.clone()));
        }
        if !status.reason.is_empty() {
            attrs.insert("reason".to_string(), Value::String(status.reason.clone()));
        }
        if let Some(extras) = &status.extras {
            if let Ok(Value::Object(extra_attrs)) = serde_json::to_value(extras) {
                for (key, value) in extra_attrs {
                    if !value.is_null() {
                        attrs.insert(key, value);
                    }
                }
            }
        }

        self.publish_sensor(LOAD_STATUS_SENSOR_ID, status.stage.to_string(), attrs)
            .await;

        self.event_bus.emit(BeqdEvent::LoadStatusChanged {
            status,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beqd_common::events::{LoadStage, ProfileExtras};

    fn shared() -> SharedState {
        SharedState::new(EventBus::new(16))
    }

    #[tokio::test]
    async fn resolve_missing_sensor_is_terminal() {
        let state = shared();
        let err = state.resolve_sensor("sensor.nowhere").await.unwrap_err();
        assert!(matches!(err, Error::SensorNotFound(_)));
        assert!(err.to_string().contains("sensor.nowhere"));
    }

    #[tokio::test]
    async fn publish_and_resolve_sensor() {
        let state = shared();
        state
            .publish_sensor("sensor.nowplaying_codec", "DTS 5.1", Map::new())
            .await;
        assert_eq!(
            state.resolve_sensor("sensor.nowplaying_codec").await.unwrap(),
            "DTS 5.1"
        );
    }

    #[tokio::test]
    async fn load_status_mirrors_into_sensor() {
        let state = shared();
        let mut status = LoadStatus::idle();
        status.stage = LoadStage::LoadSuccess;
        status.profile = "The Matrix".to_string();
        status.codec = "DTS-HD MA 5.1".to_string();
        status.slots = vec![1, 2];
        status.author = "aron7awol".to_string();
        status.extras = Some(ProfileExtras {
            tmdb_id: "603".to_string(),
            mv_offset: Some(-1.5),
            ..Default::default()
        });

        state.publish_load_status(status).await;

        let sensor = state.get_sensor(LOAD_STATUS_SENSOR_ID).await.unwrap();
        assert_eq!(sensor.state, "load_success");
        assert_eq!(sensor.attributes["profile"], "The Matrix");
        assert_eq!(sensor.attributes["codec"], "DTS-HD MA 5.1");
        assert_eq!(sensor.attributes["author"], "aron7awol");
        assert_eq!(sensor.attributes["tmdb_id"], "603");
        assert_eq!(sensor.attributes["mv_offset"], -1.5);
        assert_eq!(state.load_status().await.stage, LoadStage::LoadSuccess);
    }

    #[tokio::test]
    async fn status_events_reach_subscribers() {
        let state = shared();
        let mut rx = state.event_bus.subscribe();

        let mut status = LoadStatus::idle();
        status.stage = LoadStage::LoadingPrimary;
        state.publish_load_status(status).await;

        // First a SensorUpdated for the mirrored sensor, then the status event
        let mut saw_status_event = false;
        while let Ok(event) = rx.try_recv() {
            if let BeqdEvent::LoadStatusChanged { status, .. } = event {
                assert_eq!(status.stage, LoadStage::LoadingPrimary);
                saw_status_event = true;
            }
        }
        assert!(saw_status_event);
    }
}
