//! Core request/outcome types
//!
//! A [`ProfileRequest`] is immutable for its whole lifetime: codec
//! substitution never rewrites the request, the orchestrator threads the
//! attempted codec through the retry loop instead, so the published status
//! and the loader can never disagree about which codec was last sent.

use beqd_common::events::ProfileExtras;
use serde::{Deserialize, Serialize};

/// A resolved "now playing" identity to load a profile for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRequest {
    /// TMDB identifier (kept as a string, the catalogue stores it loosely)
    pub tmdb_id: String,
    pub year: i32,
    /// Audio codec of the playing title; substitution candidates are
    /// threaded separately and never written back here
    pub codec: String,
    /// Empty edition matches any catalogue edition
    #[serde(default)]
    pub edition: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub preferred_author: String,
    /// Target DSP slots, in order
    pub slots: Vec<u32>,
    /// Mark the device slot as manually loaded
    #[serde(default)]
    pub manual_load: bool,
}

/// Authoritative outcome of one load invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Success {
        /// Codec actually loaded (may differ from the request after
        /// substitution)
        resolved_codec: String,
        author: String,
        extras: Option<ProfileExtras>,
    },
    Failure {
        reason: String,
    },
}

pub(crate) mod dejson {
    //! Tolerant deserializers for loosely-structured external JSON
    //!
    //! The catalogue and the device API both emit fields whose type varies
    //! between entries (string vs number, string vs list, null). These
    //! helpers accept every shape seen in the wild and fall back to empty
    //! defaults instead of failing the whole payload.

    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// String, number or null → String ("" for null/other)
    pub fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(de)?;
        Ok(value_to_string(&value).unwrap_or_default())
    }

    /// String, list of strings/numbers, or null → Vec<String>
    pub fn string_or_list<'de, D>(de: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(de)?;
        Ok(match value {
            Value::String(s) => vec![s],
            Value::Array(items) => items
                .iter()
                .filter_map(value_to_string)
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Number or numeric string → Some(f64), anything else → None
    pub fn opt_f64<'de, D>(de: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(de)?;
        Ok(match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    /// Number or numeric string → Some(i64), anything else → None
    pub fn opt_i64<'de, D>(de: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(de)?;
        Ok(match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
    }

    /// String or number → Some(String), null/other → None
    pub fn opt_string<'de, D>(de: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(de)?;
        Ok(value_to_string(&value).filter(|s| !s.is_empty()))
    }

    fn value_to_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "dejson::string_or_number")]
        id: String,
        #[serde(default, deserialize_with = "dejson::string_or_list")]
        tags: Vec<String>,
        #[serde(default, deserialize_with = "dejson::opt_f64")]
        gain: Option<f64>,
    }

    #[test]
    fn tolerant_deserializers_accept_mixed_shapes() {
        let p: Probe =
            serde_json::from_str(r#"{"id": 603, "tags": "solo", "gain": "-1.5"}"#).unwrap();
        assert_eq!(p.id, "603");
        assert_eq!(p.tags, vec!["solo"]);
        assert_eq!(p.gain, Some(-1.5));

        let p: Probe =
            serde_json::from_str(r#"{"id": "603", "tags": [1, "two"], "gain": null}"#).unwrap();
        assert_eq!(p.id, "603");
        assert_eq!(p.tags, vec!["1", "two"]);
        assert_eq!(p.gain, None);
    }

    #[test]
    fn profile_request_defaults_optional_fields() {
        let request: ProfileRequest = serde_json::from_str(
            r#"{"tmdb_id": "603", "year": 1999, "codec": "DTS 5.1", "slots": [1]}"#,
        )
        .unwrap();
        assert_eq!(request.edition, "");
        assert_eq!(request.preferred_author, "");
        assert!(!request.manual_load);
    }
}
