//! Event types for the beqd event system
//!
//! Every status transition of the load state machine, every sensor update
//! and every device snapshot refresh is broadcast as a [`BeqdEvent`] so SSE
//! clients always see the same snapshots the sensor store holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Stage of the profile load / unload state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Idle,
    LoadingPrimary,
    LoadingSecondary,
    LoadSuccess,
    LoadFail,
    Unloading,
    UnloadSuccess,
    UnloadFail,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadStage::Idle => "idle",
            LoadStage::LoadingPrimary => "loading_primary",
            LoadStage::LoadingSecondary => "loading_secondary",
            LoadStage::LoadSuccess => "load_success",
            LoadStage::LoadFail => "load_fail",
            LoadStage::Unloading => "unloading",
            LoadStage::UnloadSuccess => "unload_success",
            LoadStage::UnloadFail => "unload_fail",
        };
        write!(f, "{}", s)
    }
}

/// Catalogue-derived metadata attached to a successful load
///
/// All fields are best-effort: the catalogue is loosely structured and any
/// of these may be missing for a given entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileExtras {
    pub tmdb_id: String,
    pub title: String,
    pub alt_title: String,
    pub source: String,
    pub content_type: String,
    pub language: String,
    pub mv_offset: Option<f64>,
    pub audio_types: Vec<String>,
    pub warning: String,
    pub note: String,
    pub image1: String,
    pub image2: String,
    pub runtime_minutes: Option<i64>,
    pub genres: Vec<String>,
    pub created_at: Option<String>,
}

/// Snapshot of the load state machine, published on every transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadStatus {
    /// Current stage of the state machine
    pub stage: LoadStage,
    /// Profile title being loaded (if known)
    #[serde(default)]
    pub profile: String,
    /// Codec actually sent in the most recent loader call
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub edition: String,
    /// Target device slots
    #[serde(default)]
    pub slots: Vec<u32>,
    /// Resolved mixing author (on success)
    #[serde(default)]
    pub author: String,
    /// Failure reason (on load_fail / unload_fail)
    #[serde(default)]
    pub reason: String,
    /// Catalogue metadata (on load_success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<ProfileExtras>,
    /// When this snapshot was produced
    pub last_changed: DateTime<Utc>,
}

impl LoadStatus {
    /// Initial idle snapshot
    pub fn idle() -> Self {
        Self {
            stage: LoadStage::Idle,
            profile: String::new(),
            codec: String::new(),
            edition: String::new(),
            slots: Vec::new(),
            author: String::new(),
            reason: String::new(),
            extras: None,
            last_changed: Utc::now(),
        }
    }
}

impl Default for LoadStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// beqd event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BeqdEvent {
    /// Load state machine transitioned
    LoadStatusChanged {
        status: LoadStatus,
        timestamp: DateTime<Utc>,
    },

    /// Device snapshot sensor refreshed
    DeviceSnapshotUpdated {
        state: String,
        slots_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A sensor in the store changed value
    SensorUpdated {
        sensor_id: String,
        state: String,
        timestamp: DateTime<Utc>,
    },
}

impl BeqdEvent {
    /// Get event type as string for SSE event naming / filtering
    pub fn event_type(&self) -> &str {
        match self {
            BeqdEvent::LoadStatusChanged { .. } => "LoadStatusChanged",
            BeqdEvent::DeviceSnapshotUpdated { .. } => "DeviceSnapshotUpdated",
            BeqdEvent::SensorUpdated { .. } => "SensorUpdated",
        }
    }
}

/// Broadcast event bus shared by all components
///
/// Thin wrapper over `tokio::broadcast`: non-blocking publish, multiple
/// concurrent subscribers, slow subscribers observe lag instead of blocking
/// producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BeqdEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BeqdEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// A send error only means no subscriber is currently listening, which
    /// is fine; callers may ignore the result.
    pub fn emit(&self, event: BeqdEvent) {
        let _ = self.tx.send(event);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
