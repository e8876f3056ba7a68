//! Device snapshot sensor
//!
//! Fetches the DSP device state and publishes it as the devices sensor:
//! primary value is the device name (or "unreachable"), attributes carry
//! the flattened per-slot fields plus active-slot conveniences. Refreshes
//! are idempotent snapshot replacements, so overlapping fire-and-forget
//! refreshes are harmless (last fetch wins).

use crate::services::dsp_client::{DeviceStatus, DspClient, LoaderError, SlotStatus};
use crate::state::{SharedState, DEVICES_SENSOR_ID};
use async_trait::async_trait;
use beqd_common::events::BeqdEvent;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

const DEVICES_FRIENDLY_NAME: &str = "beqd Devices";

/// Source of device snapshots (the DSP client in production)
#[async_trait]
pub trait DeviceStateSource: Send + Sync {
    async fn fetch(&self) -> Result<DeviceStatus, LoaderError>;
}

#[async_trait]
impl DeviceStateSource for DspClient {
    async fn fetch(&self) -> Result<DeviceStatus, LoaderError> {
        self.fetch_device_status().await
    }
}

/// Flatten slots into `slot{id}_{field}` attribute keys
pub fn flatten_slots(slots: &[SlotStatus]) -> Map<String, Value> {
    let mut flat = Map::new();
    for slot in slots {
        let prefix = format!("slot{}_", slot.id);
        flat.insert(format!("{}active", prefix), Value::Bool(slot.active));
        flat.insert(
            format!("{}title", prefix),
            Value::String(slot.last.clone().unwrap_or_default()),
        );
        flat.insert(
            format!("{}author", prefix),
            Value::String(slot.author.clone().unwrap_or_default()),
        );
        flat.insert(
            format!("{}can_activate", prefix),
            slot.can_activate.map(Value::Bool).unwrap_or(Value::Null),
        );
        flat.insert(
            format!("{}inputs", prefix),
            slot.inputs.clone().unwrap_or(Value::Null),
        );
        flat.insert(
            format!("{}outputs", prefix),
            slot.outputs.clone().unwrap_or(Value::Null),
        );

        for gain in &slot.gains {
            flat.insert(
                format!("{}input{}_gain", prefix, gain.id),
                gain.value.clone().unwrap_or(Value::Null),
            );
        }
        for mute in &slot.mutes {
            flat.insert(
                format!("{}input{}_mute", prefix, mute.id),
                mute.value.clone().unwrap_or(Value::Null),
            );
        }
    }
    flat
}

fn active_slot(slots: &[SlotStatus]) -> Option<&SlotStatus> {
    slots.iter().find(|slot| slot.active)
}

/// Publishes device snapshots into the sensor store
pub struct DeviceMonitor {
    source: Arc<dyn DeviceStateSource>,
    shared: Arc<SharedState>,
}

impl DeviceMonitor {
    pub fn new(source: Arc<dyn DeviceStateSource>, shared: Arc<SharedState>) -> Self {
        Self { source, shared }
    }

    /// Fetch the device state and update the devices sensor
    pub async fn refresh(&self) {
        let status = match self.source.fetch().await {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to fetch DSP device state: {}", e);
                let mut attrs = Map::new();
                attrs.insert(
                    "friendly_name".to_string(),
                    Value::String(DEVICES_FRIENDLY_NAME.to_string()),
                );
                attrs.insert("reason".to_string(), Value::String(e.to_string()));
                self.shared
                    .publish_sensor(DEVICES_SENSOR_ID, "unreachable", attrs)
                    .await;
                return;
            }
        };

        let mut attrs = Map::new();
        attrs.insert(
            "friendly_name".to_string(),
            Value::String(DEVICES_FRIENDLY_NAME.to_string()),
        );
        attrs.insert(
            "last_refreshed".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        attrs.insert(
            "device_type".to_string(),
            status
                .device_type
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        attrs.insert(
            "device_name".to_string(),
            status.name.clone().map(Value::String).unwrap_or(Value::Null),
        );
        attrs.insert(
            "master_volume".to_string(),
            serde_json::to_value(status.master_volume).unwrap_or(Value::Null),
        );
        attrs.insert(
            "mute".to_string(),
            status.mute.map(Value::Bool).unwrap_or(Value::Null),
        );
        attrs.insert(
            "serials".to_string(),
            status.serials.clone().unwrap_or_else(|| Value::Array(Vec::new())),
        );
        attrs.insert(
            "slots_count".to_string(),
            Value::Number(status.slots.len().into()),
        );

        if let Some(active) = active_slot(&status.slots) {
            attrs.insert("active_slot_id".to_string(), Value::String(active.id.clone()));
            attrs.insert(
                "active_slot_title".to_string(),
                Value::String(active.last.clone().unwrap_or_default()),
            );
            attrs.insert(
                "active_slot_author".to_string(),
                Value::String(active.author.clone().unwrap_or_default()),
            );
            attrs.insert(
                "active_slot_can_activate".to_string(),
                active.can_activate.map(Value::Bool).unwrap_or(Value::Null),
            );
            attrs.insert(
                "active_slot_inputs".to_string(),
                active.inputs.clone().unwrap_or(Value::Null),
            );
            attrs.insert(
                "active_slot_outputs".to_string(),
                active.outputs.clone().unwrap_or(Value::Null),
            );
            for gain in &active.gains {
                attrs.insert(
                    format!("active_slot_input{}_gain", gain.id),
                    gain.value.clone().unwrap_or(Value::Null),
                );
            }
            for mute in &active.mutes {
                attrs.insert(
                    format!("active_slot_input{}_mute", mute.id),
                    mute.value.clone().unwrap_or(Value::Null),
                );
            }
        }

        attrs.extend(flatten_slots(&status.slots));

        let state = status
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "online".to_string());

        self.shared
            .publish_sensor(DEVICES_SENSOR_ID, state.clone(), attrs)
            .await;

        self.shared.event_bus.emit(BeqdEvent::DeviceSnapshotUpdated {
            state,
            slots_count: status.slots.len(),
            timestamp: Utc::now(),
        });
    }

    /// Fire-and-forget refresh: the caller is never blocked on, or
    /// cancelled by, the snapshot fetch
    pub fn spawn_refresh(self: &Arc<Self>) {
        let monitor = self.clone();
        tokio::spawn(async move {
            monitor.refresh().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dsp_client::ChannelValue;
    use beqd_common::events::EventBus;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        status: Option<DeviceStatus>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl DeviceStateSource for FakeSource {
        async fn fetch(&self) -> Result<DeviceStatus, LoaderError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.status
                .clone()
                .ok_or_else(|| LoaderError::Network("connection refused".to_string()))
        }
    }

    fn sample_status() -> DeviceStatus {
        DeviceStatus {
            device_type: Some("minidsp".to_string()),
            name: Some("master".to_string()),
            master_volume: Some(-12.5),
            mute: Some(false),
            serials: Some(json!([123])),
            slots: vec![
                SlotStatus {
                    id: "1".to_string(),
                    active: true,
                    last: Some("The Matrix".to_string()),
                    author: Some("aron7awol".to_string()),
                    can_activate: Some(true),
                    inputs: Some(json!(2)),
                    outputs: Some(json!(4)),
                    gains: vec![
                        ChannelValue {
                            id: "1".to_string(),
                            value: Some(json!(0.0)),
                        },
                        ChannelValue {
                            id: "2".to_string(),
                            value: Some(json!(-1.5)),
                        },
                    ],
                    mutes: vec![ChannelValue {
                        id: "1".to_string(),
                        value: Some(json!(false)),
                    }],
                },
                SlotStatus {
                    id: "2".to_string(),
                    active: false,
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn flatten_slots_produces_expected_keys() {
        let status = sample_status();
        let flat = flatten_slots(&status.slots);
        assert_eq!(flat["slot1_active"], json!(true));
        assert_eq!(flat["slot1_title"], json!("The Matrix"));
        assert_eq!(flat["slot1_input2_gain"], json!(-1.5));
        assert_eq!(flat["slot1_input1_mute"], json!(false));
        assert_eq!(flat["slot2_active"], json!(false));
        assert_eq!(flat["slot2_title"], json!(""));
    }

    #[tokio::test]
    async fn refresh_publishes_device_sensor() {
        let shared = Arc::new(SharedState::new(EventBus::new(16)));
        let source = Arc::new(FakeSource {
            status: Some(sample_status()),
            fetches: AtomicUsize::new(0),
        });
        let monitor = DeviceMonitor::new(source.clone(), shared.clone());

        monitor.refresh().await;

        let sensor = shared.get_sensor(DEVICES_SENSOR_ID).await.unwrap();
        assert_eq!(sensor.state, "master");
        assert_eq!(sensor.attributes["slots_count"], json!(2));
        assert_eq!(sensor.attributes["active_slot_id"], json!("1"));
        assert_eq!(sensor.attributes["active_slot_author"], json!("aron7awol"));
        assert_eq!(sensor.attributes["active_slot_inputs"], json!(2));
        assert_eq!(sensor.attributes["active_slot_outputs"], json!(4));
        assert_eq!(sensor.attributes["slot1_input2_gain"], json!(-1.5));
        assert!(sensor.attributes["last_refreshed"]
            .as_str()
            .unwrap()
            .contains('T'));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_failure_publishes_unreachable() {
        let shared = Arc::new(SharedState::new(EventBus::new(16)));
        let source = Arc::new(FakeSource {
            status: None,
            fetches: AtomicUsize::new(0),
        });
        let monitor = DeviceMonitor::new(source, shared.clone());

        monitor.refresh().await;

        let sensor = shared.get_sensor(DEVICES_SENSOR_ID).await.unwrap();
        assert_eq!(sensor.state, "unreachable");
        assert!(sensor.attributes["reason"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }
}
