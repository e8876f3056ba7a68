//! Profile load orchestration
//!
//! Drives the load/unload state machine: publishes every stage transition
//! to the status sensor, runs the primary load attempt, walks the codec
//! substitution candidates when the primary fails, and schedules a device
//! snapshot refresh after every terminal stage.
//!
//! The request stays immutable throughout. Each attempt threads its codec
//! explicitly, so the published status always names the codec that was
//! actually sent to the device.

use crate::error::{Error, Result};
use crate::models::{LoadOutcome, ProfileRequest};
use crate::services::catalog_cache::{CatalogCache, CatalogEntry};
use crate::services::catalog_matcher::{find_match, MatchQuery};
use crate::services::device_monitor::DeviceMonitor;
use crate::services::dsp_client::ProfileLoader;
use crate::services::substitution::{candidate_codecs, catalog_has_codec};
use crate::state::SharedState;
use beqd_common::config::SubstitutionRule;
use beqd_common::events::{LoadStage, LoadStatus, ProfileExtras};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-invocation knobs, separate from the media identity itself
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Walk the codec substitution table when the primary load fails
    pub enable_substitutions: bool,
    /// Sensor to publish the matched profile's poster image to
    pub image_sensor: Option<String>,
}

fn extras_from_entry(entry: &CatalogEntry) -> ProfileExtras {
    ProfileExtras {
        tmdb_id: entry.tmdb_id.clone(),
        title: entry.title.clone(),
        alt_title: entry.alt_title.clone(),
        source: entry.source.clone(),
        content_type: entry.content_type.clone(),
        language: entry.language.clone(),
        mv_offset: entry.mv_offset,
        audio_types: entry.audio_types.clone(),
        warning: entry.warning.clone(),
        note: entry.note.clone(),
        image1: entry.images.first().cloned().unwrap_or_default(),
        image2: entry.images.get(1).cloned().unwrap_or_default(),
        runtime_minutes: entry.runtime_minutes,
        genres: entry.genres.clone(),
        created_at: entry.created_at.clone(),
    }
}

pub struct Orchestrator {
    catalog: Arc<CatalogCache>,
    loader: Arc<dyn ProfileLoader>,
    monitor: Arc<DeviceMonitor>,
    shared: Arc<SharedState>,
    rules: Vec<SubstitutionRule>,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<CatalogCache>,
        loader: Arc<dyn ProfileLoader>,
        monitor: Arc<DeviceMonitor>,
        shared: Arc<SharedState>,
        rules: Vec<SubstitutionRule>,
    ) -> Self {
        Self {
            catalog,
            loader,
            monitor,
            shared,
            rules,
        }
    }

    fn status_for(&self, request: &ProfileRequest, stage: LoadStage, codec: &str) -> LoadStatus {
        let mut status = LoadStatus::idle();
        status.stage = stage;
        status.profile = request.title.clone();
        status.codec = codec.to_string();
        status.edition = request.edition.clone();
        status.slots = request.slots.clone();
        status.author = request.preferred_author.clone();
        status
    }

    fn match_entry<'a>(
        &self,
        entries: &'a [CatalogEntry],
        request: &ProfileRequest,
        codec: &str,
        author: &str,
    ) -> Option<&'a CatalogEntry> {
        find_match(
            entries,
            &MatchQuery {
                tmdb_id: &request.tmdb_id,
                codec,
                edition: &request.edition,
                year: request.year,
                title: &request.title,
                preferred_author: author,
            },
        )
    }

    async fn publish_image(
        &self,
        sensor_id: &str,
        request: &ProfileRequest,
        entry: Option<&CatalogEntry>,
    ) {
        let state = entry
            .and_then(|e| e.images.first().cloned())
            .unwrap_or_else(|| "Not Found".to_string());
        if state == "Not Found" {
            info!(tmdb_id = %request.tmdb_id, "No image found in BEQ catalogue");
        }
        let mut attrs = Map::new();
        attrs.insert(
            "source".to_string(),
            Value::String("beq_catalogue".to_string()),
        );
        attrs.insert(
            "tmdb".to_string(),
            Value::String(request.tmdb_id.clone()),
        );
        self.shared.publish_sensor(sensor_id, state, attrs).await;
    }

    async fn finish_success(
        &self,
        request: &ProfileRequest,
        codec: &str,
        resolved_author: &str,
        entry: Option<&CatalogEntry>,
        options: &LoadOptions,
    ) -> LoadOutcome {
        let mut status = self.status_for(request, LoadStage::LoadSuccess, codec);
        status.author = resolved_author.to_string();
        if let Some(entry) = entry {
            if !entry.title.is_empty() {
                status.profile = entry.title.clone();
            }
            status.author = entry.author_display();
            status.extras = Some(extras_from_entry(entry));
        }
        let author = status.author.clone();
        let extras = status.extras.clone();
        self.shared.publish_load_status(status).await;

        if let Some(sensor_id) = &options.image_sensor {
            self.publish_image(sensor_id, request, entry).await;
        }

        self.monitor.spawn_refresh();
        info!(
            codec = codec,
            tmdb_id = %request.tmdb_id,
            "BEQ profile loaded"
        );
        LoadOutcome::Success {
            resolved_codec: codec.to_string(),
            author,
            extras,
        }
    }

    async fn finish_failure(&self, request: &ProfileRequest, codec: &str, reason: &str) {
        let mut status = self.status_for(request, LoadStage::LoadFail, codec);
        status.reason = reason.to_string();
        self.shared.publish_load_status(status).await;
        self.monitor.spawn_refresh();
    }

    /// Load a profile for the request, with optional codec substitution
    ///
    /// Publishes `loading_primary`, then either `load_success` or walks the
    /// substitution candidates under `loading_secondary`. The returned
    /// outcome names the codec actually loaded; errors carry the primary
    /// failure even when substitution candidates also failed.
    pub async fn load_profile(
        &self,
        request: &ProfileRequest,
        options: &LoadOptions,
    ) -> Result<LoadOutcome> {
        // Pre-match to seed the author when the caller gave none, so retries
        // with substituted codecs keep resolving against the same author
        let entries = self.catalog.get_entries().await;
        let author = if request.preferred_author.is_empty() {
            entries
                .as_deref()
                .and_then(|e| self.match_entry(e, request, &request.codec, ""))
                .map(|e| e.author_display())
                .unwrap_or_default()
        } else {
            request.preferred_author.clone()
        };

        let mut status = self.status_for(request, LoadStage::LoadingPrimary, &request.codec);
        status.author = author.clone();
        self.shared.publish_load_status(status).await;

        let primary_err = match self.loader.load(request, &request.codec).await {
            Ok(()) => {
                let entry = entries
                    .as_deref()
                    .and_then(|e| self.match_entry(e, request, &request.codec, &author));
                return Ok(self
                    .finish_success(request, &request.codec, &author, entry, options)
                    .await);
            }
            Err(e) => e,
        };
        let primary_reason = primary_err.to_string();

        if !options.enable_substitutions {
            self.finish_failure(request, &request.codec, &primary_reason)
                .await;
            return Err(Error::LoadFailed(primary_reason));
        }

        warn!(
            codec = %request.codec,
            error = %primary_reason,
            "Primary load failed, trying codec substitutions"
        );

        // Substitution needs the catalogue to avoid sending candidates the
        // catalogue has no profile for
        let entries = match entries {
            Some(entries) => entries,
            None => {
                self.finish_failure(request, &request.codec, &primary_reason)
                    .await;
                return Err(Error::NoCatalog(primary_reason));
            }
        };

        // Track the codec of the last attempt actually sent to the device,
        // so a terminal failure names what the device last saw
        let mut last_codec = request.codec.clone();
        for candidate in candidate_codecs(&self.rules, &request.codec) {
            if !catalog_has_codec(&entries, &request.tmdb_id, &request.edition, &candidate) {
                continue;
            }

            let mut status = self.status_for(request, LoadStage::LoadingSecondary, &candidate);
            status.author = author.clone();
            self.shared.publish_load_status(status).await;

            last_codec = candidate.clone();
            match self.loader.load(request, &candidate).await {
                Ok(()) => {
                    let entry = self.match_entry(&entries, request, &candidate, &author);
                    return Ok(self
                        .finish_success(request, &candidate, &author, entry, options)
                        .await);
                }
                Err(e) => {
                    warn!(codec = %candidate, error = %e, "Substitution candidate failed");
                }
            }
        }

        self.finish_failure(request, &last_codec, &primary_reason).await;
        Err(Error::LoadFailed(primary_reason))
    }

    /// Unload the given slots
    ///
    /// The device snapshot refresh is scheduled exactly once, whether or
    /// not the unload call succeeded, so the devices sensor reflects
    /// whatever state the device is actually in.
    pub async fn unload_profile(&self, slots: &[u32]) -> Result<()> {
        let mut status = LoadStatus::idle();
        status.stage = LoadStage::Unloading;
        status.slots = slots.to_vec();
        self.shared.publish_load_status(status).await;

        let result = self.loader.unload(slots).await;
        self.monitor.spawn_refresh();

        match result {
            Ok(()) => {
                let mut status = LoadStatus::idle();
                status.stage = LoadStage::UnloadSuccess;
                status.slots = slots.to_vec();
                self.shared.publish_load_status(status).await;
                info!(slots = ?slots, "BEQ profile unloaded");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                let mut status = LoadStatus::idle();
                status.stage = LoadStage::UnloadFail;
                status.slots = slots.to_vec();
                status.reason = reason.clone();
                self.shared.publish_load_status(status).await;
                Err(Error::UnloadFailed(reason))
            }
        }
    }
}
