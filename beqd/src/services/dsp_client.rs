//! HTTP client for the DSP control server
//!
//! Implements the opaque profile loader interface ([`ProfileLoader`]) plus
//! the device snapshot fetch. Every outbound request funnels through
//! [`DspClient::send`], which applies the gain normalizer/override to the
//! JSON body, logs the payload before and after when it changed, and logs
//! the response status with a truncated body preview.

use crate::models::{dejson, ProfileRequest};
use crate::services::gain_filter::normalize_gains;
use async_trait::async_trait;
use beqd_common::config::{DeviceConfig, GainOverrideConfig};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Response body preview limit for logs
const MAX_BODY_PREVIEW: usize = 800;

/// DSP loader errors
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Device API returned an error response
    #[error("Device API error {status}: {body}")]
    Api { status: u16, body: String },
}

impl LoaderError {
    /// HTTP status code, when the device answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            LoaderError::Network(_) => None,
            LoaderError::Api { status, .. } => Some(*status),
        }
    }
}

/// Truncate a response body for logging
pub fn body_preview(body: &str) -> &str {
    if body.len() <= MAX_BODY_PREVIEW {
        return body;
    }
    let mut end = MAX_BODY_PREVIEW;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Opaque profile loader: the only operations the orchestrator needs
#[async_trait]
pub trait ProfileLoader: Send + Sync {
    /// Load a profile for `request`, sending `codec` as the codec to
    /// search for (may be a substitution candidate, not the request's own)
    async fn load(&self, request: &ProfileRequest, codec: &str) -> Result<(), LoaderError>;

    /// Unload whatever is loaded in the given slots
    async fn unload(&self, slots: &[u32]) -> Result<(), LoaderError>;
}

/// Device snapshot as reported by the DSP server
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceStatus {
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "masterVolume")]
    pub master_volume: Option<f64>,
    pub mute: Option<bool>,
    pub serials: Option<Value>,
    pub slots: Vec<SlotStatus>,
}

/// One device slot
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SlotStatus {
    #[serde(deserialize_with = "dejson::string_or_number")]
    pub id: String,
    pub active: bool,
    /// Title of the last loaded profile
    pub last: Option<String>,
    pub author: Option<String>,
    #[serde(rename = "canActivate")]
    pub can_activate: Option<bool>,
    pub inputs: Option<Value>,
    pub outputs: Option<Value>,
    pub gains: Vec<ChannelValue>,
    pub mutes: Vec<ChannelValue>,
}

/// Per-input gain or mute value
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelValue {
    #[serde(deserialize_with = "dejson::string_or_number")]
    pub id: String,
    pub value: Option<Value>,
}

/// Concrete HTTP client for the DSP control server
pub struct DspClient {
    http: reqwest::Client,
    base_url: String,
    device_name: String,
    override_pair: Option<(f64, f64)>,
}

impl DspClient {
    pub fn new(device: &DeviceConfig, gains: &GainOverrideConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(device.fetch_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: device.base_url(),
            device_name: device.name.clone(),
            override_pair: gains.override_pair(),
        })
    }

    /// Fetch the current device snapshot
    pub async fn fetch_device_status(&self) -> Result<DeviceStatus, LoaderError> {
        let body = self.send(Method::GET, "/api/1/devices", None).await?;
        serde_json::from_str(&body)
            .map_err(|e| LoaderError::Network(format!("device payload parse error: {}", e)))
    }

    /// Send one request through the gain filter and audit logging
    ///
    /// Returns the response body text on 2xx, LoaderError otherwise.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<String, LoaderError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(mut payload) = body {
            let original = payload.to_string();
            let changed = normalize_gains(&mut payload, self.override_pair);
            if changed {
                debug!("DSP HTTP {} {} json (modified): {}", method, url, payload);
                debug!("DSP HTTP {} {} json (original): {}", method, url, original);
            } else {
                debug!("DSP HTTP {} {} json: {}", method, url, original);
            }
            request = request.json(&payload);
        } else {
            debug!("DSP HTTP {} {}", method, url);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LoaderError::Network(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!(
            "DSP RESP {} {} -> {}: {}",
            method,
            url,
            status.as_u16(),
            body_preview(&text)
        );

        if status.is_success() {
            Ok(text)
        } else {
            Err(LoaderError::Api {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

#[async_trait]
impl ProfileLoader for DspClient {
    async fn load(&self, request: &ProfileRequest, codec: &str) -> Result<(), LoaderError> {
        let slots: Vec<Value> = request
            .slots
            .iter()
            .map(|slot| {
                json!({
                    "id": slot.to_string(),
                    "active": true,
                    "gains": [0.0, 0.0],
                    "mutes": [false, false],
                })
            })
            .collect();

        let payload = json!({
            "entry": {
                "tmdb": request.tmdb_id,
                "year": request.year,
                "audioType": codec,
                "edition": request.edition,
                "title": request.title,
                "preferredAuthor": request.preferred_author,
                "manual": request.manual_load,
            },
            "slots": slots,
        });

        let path = format!("/api/2/devices/{}", self.device_name);
        self.send(Method::PATCH, &path, Some(payload)).await?;
        Ok(())
    }

    async fn unload(&self, slots: &[u32]) -> Result<(), LoaderError> {
        for slot in slots {
            let path = format!("/api/2/devices/{}/filter/{}", self.device_name, slot);
            self.send(Method::DELETE, &path, None).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_preview_truncates_long_bodies() {
        let long = "x".repeat(2000);
        assert_eq!(body_preview(&long).len(), 800);
        assert_eq!(body_preview("short"), "short");
    }

    #[test]
    fn loader_error_carries_status() {
        let err = LoaderError::Api {
            status: 404,
            body: "no such entry".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("404"));

        assert_eq!(LoaderError::Network("timeout".to_string()).status(), None);
    }

    #[test]
    fn device_status_parses_loose_payload() {
        let json = r#"{
            "type": "minidsp",
            "name": "master",
            "masterVolume": -12.5,
            "mute": false,
            "serials": [123],
            "slots": [
                {
                    "id": 1,
                    "active": true,
                    "last": "The Matrix",
                    "author": "aron7awol",
                    "canActivate": true,
                    "inputs": 2,
                    "outputs": 4,
                    "gains": [{"id": 1, "value": 0.0}, {"id": "2", "value": null}],
                    "mutes": [{"id": 1, "value": false}]
                }
            ]
        }"#;

        let status: DeviceStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.name.as_deref(), Some("master"));
        assert_eq!(status.slots.len(), 1);
        let slot = &status.slots[0];
        assert_eq!(slot.id, "1");
        assert!(slot.active);
        assert_eq!(slot.gains[1].id, "2");
    }
}
