//! Remote BEQ catalogue fetching and TTL caching
//!
//! The catalogue is a large, loosely-structured JSON document maintained
//! by profile authors. One snapshot is cached in memory for a week and
//! replaced wholesale on refetch; a failed fetch degrades to "no data"
//! (callers treat an absent catalogue as a soft condition, never an error)
//! while any previous snapshot stays in place for the next attempt.

use crate::models::dejson;
use beqd_common::config::CatalogConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One catalogue entry, as published by profile authors
///
/// Every field is optional in the wild; the tolerant deserializers accept
/// the string-or-list and string-or-number variants that appear across
/// entries, and unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CatalogEntry {
    #[serde(rename = "theMovieDB", deserialize_with = "dejson::string_or_number")]
    pub tmdb_id: String,
    pub title: String,
    #[serde(rename = "altTitle")]
    pub alt_title: String,
    #[serde(deserialize_with = "dejson::opt_i64")]
    pub year: Option<i64>,
    pub edition: String,
    /// Audio codecs this profile applies to; a single string in the source
    /// is treated as a one-element set
    #[serde(rename = "audioTypes", deserialize_with = "dejson::string_or_list")]
    pub audio_types: Vec<String>,
    /// Mixing author(s); either a string or a list in the source
    #[serde(alias = "authors", deserialize_with = "dejson::string_or_list")]
    pub author: Vec<String>,
    #[serde(deserialize_with = "dejson::string_or_list")]
    pub images: Vec<String>,
    pub warning: String,
    pub note: String,
    pub source: String,
    pub language: String,
    pub content_type: String,
    /// Master volume offset recommended by the author
    #[serde(rename = "mv", deserialize_with = "dejson::opt_f64")]
    pub mv_offset: Option<f64>,
    #[serde(rename = "runtime", deserialize_with = "dejson::opt_i64")]
    pub runtime_minutes: Option<i64>,
    #[serde(deserialize_with = "dejson::string_or_list")]
    pub genres: Vec<String>,
    #[serde(deserialize_with = "dejson::opt_string")]
    pub created_at: Option<String>,
}

impl CatalogEntry {
    /// Author(s) as a single display string
    pub fn author_display(&self) -> String {
        self.author.join(", ")
    }
}

/// Extract catalogue entries from the remote payload
///
/// The payload is either a list of entries directly, or a mapping whose
/// `"titles"` key (or, lacking that, all of its values) yields the list.
/// Any other shape yields None. Entries that are not objects are skipped.
pub fn entries_from_json(data: Value) -> Option<Vec<CatalogEntry>> {
    let items: Vec<Value> = match data {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("titles") {
            Some(Value::Array(items)) => items,
            _ => map.into_iter().map(|(_, v)| v).collect(),
        },
        _ => return None,
    };

    let total = items.len();
    let entries: Vec<CatalogEntry> = items
        .into_iter()
        .filter(|item| item.is_object())
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();

    if entries.len() < total {
        debug!(
            "Skipped {} malformed catalogue entries",
            total - entries.len()
        );
    }
    Some(entries)
}

struct Snapshot {
    entries: Arc<Vec<CatalogEntry>>,
    fetched_at: Instant,
}

/// TTL cache over the remote catalogue
///
/// Owned by the daemon and injected into the orchestrator; one instance
/// per process. The snapshot is replaced atomically, never partially
/// updated.
pub struct CatalogCache {
    http: reqwest::Client,
    url: String,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl CatalogCache {
    pub fn new(config: &CatalogConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            snapshot: RwLock::new(None),
        })
    }

    /// Return the cached entries, refetching when the snapshot is older
    /// than the TTL
    ///
    /// Yields None when no fresh snapshot exists and the fetch fails; the
    /// stale snapshot (if any) is kept for later attempts.
    pub async fn get_entries(&self) -> Option<Arc<Vec<CatalogEntry>>> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            if snapshot.fetched_at.elapsed() < self.ttl {
                return Some(snapshot.entries.clone());
            }
        }

        match self.fetch().await {
            Ok(entries) => {
                debug!("Fetched BEQ catalogue: {} entries", entries.len());
                Some(self.store(entries).await)
            }
            Err(e) => {
                warn!("Could not fetch BEQ catalogue: {}", e);
                None
            }
        }
    }

    /// Replace the cached snapshot wholesale, resetting the age clock
    pub async fn store(&self, entries: Vec<CatalogEntry>) -> Arc<Vec<CatalogEntry>> {
        let entries = Arc::new(entries);
        *self.snapshot.write().await = Some(Snapshot {
            entries: entries.clone(),
            fetched_at: Instant::now(),
        });
        entries
    }

    async fn fetch(&self) -> anyhow::Result<Vec<CatalogEntry>> {
        let response = self.http.get(&self.url).send().await?.error_for_status()?;
        let data: Value = response.json().await?;
        entries_from_json(data)
            .ok_or_else(|| anyhow::anyhow!("unrecognized catalogue payload shape"))
    }
}
