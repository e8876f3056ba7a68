//! Configuration loading for beqd
//!
//! Two sources, in priority order:
//! 1. Explicit config file path (command-line argument)
//! 2. `BEQD_CONFIG` environment variable
//! 3. `~/.config/beqd/config.toml`, then `/etc/beqd/config.toml`
//! 4. Built-in defaults (code constants)
//!
//! All fields have defaults, so an empty file (or no file at all) yields a
//! fully working configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default remote catalogue URL
pub const DEFAULT_CATALOG_URL: &str =
    "https://beqcatalogue.readthedocs.io/en/latest/database.json";

/// Catalogue cache time-to-live: one week
pub const DEFAULT_CATALOG_TTL_SECS: u64 = 7 * 24 * 3600;

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BeqdConfig {
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub catalog: CatalogConfig,
    pub gains: GainOverrideConfig,
    pub logging: LoggingConfig,
    /// Ordered codec substitution rule table (first match wins, outputs
    /// tried in listed order). Users can edit these lists directly.
    pub substitution_rules: Vec<SubstitutionRule>,
}

impl Default for BeqdConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            device: DeviceConfig::default(),
            catalog: CatalogConfig::default(),
            gains: GainOverrideConfig::default(),
            logging: LoggingConfig::default(),
            substitution_rules: default_substitution_rules(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 5760 }
    }
}

/// External DSP device (ezbeq server) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    /// Device name as known to the DSP server
    pub name: String,
    /// Device snapshot fetch timeout (seconds)
    pub fetch_timeout_secs: u64,
    /// Periodic device snapshot refresh interval (seconds, 0 = disabled)
    pub refresh_interval_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            name: "master".to_string(),
            fetch_timeout_secs: 10,
            refresh_interval_secs: 120,
        }
    }
}

impl DeviceConfig {
    /// Base URL of the DSP server, no trailing slash
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Remote catalogue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub url: String,
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CATALOG_URL.to_string(),
            cache_ttl_secs: DEFAULT_CATALOG_TTL_SECS,
            fetch_timeout_secs: 15,
        }
    }
}

/// Outbound gain override configuration
///
/// When enabled, every outgoing gain pair is forced to `values` regardless
/// of what the caller requested. Null/non-numeric gains are sanitized to
/// 0.0 whether or not the override is enabled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GainOverrideConfig {
    pub override_enabled: bool,
    pub values: (f64, f64),
}

impl Default for GainOverrideConfig {
    fn default() -> Self {
        Self {
            override_enabled: true,
            values: (0.0, 0.0),
        }
    }
}

impl GainOverrideConfig {
    /// The override pair to apply, or None when override mode is off
    pub fn override_pair(&self) -> Option<(f64, f64)> {
        if self.override_enabled {
            Some(self.values)
        } else {
            None
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter (tracing env-filter syntax)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "beqd=info,beqd_common=info".to_string(),
        }
    }
}

/// One codec substitution rule
///
/// A rule applies when the (normalized) failed codec matches any entry in
/// `inputs`; its `outputs` are then tried in listed order.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SubstitutionRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Built-in substitution rule table
///
/// Matching is case-insensitive, so mixed-case spellings here are cosmetic.
pub fn default_substitution_rules() -> Vec<SubstitutionRule> {
    fn rule(inputs: &[&str], outputs: &[&str]) -> SubstitutionRule {
        SubstitutionRule {
            enabled: true,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    vec![
        rule(
            &["Atmos"],
            &["TrueHD 7.1", "TrueHD Atmos", "TrueHD 5.1", "DD+ Atmos"],
        ),
        rule(
            &["DTS-HD MA 7.1"],
            &["DTS-X", "DTS:X", "DTS-X HR", "DTS-HD MA 5.1", "DTS.HD MA 5.1"],
        ),
        rule(
            &["DD+ 5.1", "DD+ 7.1", "DD+ 2.0", "DD+ 2.1"],
            &["DD+", "DD+ Atmos", "DD+ 5.1 Atmos"],
        ),
        rule(
            &["DTS 5.1", "DTS 6.1"],
            &[
                "DTS-HD MA 5.1",
                "DTS-HD MA 7.1",
                "DTS-ES 5.1",
                "DTS-ES 6.1",
                "DTS-EX 5.1",
            ],
        ),
        rule(
            &["DTS-HD MA 5.1", "DTS-HD MA 7.1"],
            &["DTS-HD MA 5.1", "DTS-HD MA 7.1"],
        ),
        rule(&["PCM"], &["LPCM 5.1", "LPCM 7.1", "LPCM 2.0", "LPCM 1.0"]),
    ]
}

impl BeqdConfig {
    /// Load configuration following the priority order in the module docs
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var("BEQD_CONFIG") {
            return Self::from_file(Path::new(&path));
        }

        for candidate in default_config_paths() {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Parse configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config: BeqdConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        // An explicit empty rule table would disable substitutions entirely,
        // which is never what users mean; fall back to the built-in table.
        if config.substitution_rules.is_empty() {
            config.substitution_rules = default_substitution_rules();
        }
        Ok(config)
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("beqd").join("config.toml"));
    }
    paths.push(PathBuf::from("/etc/beqd/config.toml"));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_complete() {
        let config = BeqdConfig::default();
        assert_eq!(config.server.port, 5760);
        assert_eq!(config.catalog.url, DEFAULT_CATALOG_URL);
        assert_eq!(config.catalog.cache_ttl_secs, 7 * 24 * 3600);
        assert_eq!(config.device.fetch_timeout_secs, 10);
        assert!(!config.substitution_rules.is_empty());
    }

    #[test]
    fn default_rules_cover_dts_51() {
        let rules = default_substitution_rules();
        let rule = rules
            .iter()
            .find(|r| r.inputs.iter().any(|i| i.eq_ignore_ascii_case("dts 5.1")))
            .expect("DTS 5.1 rule present");
        assert!(rule.enabled);
        assert_eq!(rule.outputs[0], "DTS-HD MA 5.1");
    }

    #[test]
    fn parses_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
port = 9999

[device]
host = "10.0.0.5"

[gains]
override_enabled = false

[[substitution_rules]]
inputs = ["Atmos"]
outputs = ["TrueHD 7.1"]
"#
        )
        .unwrap();

        let config = BeqdConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.device.host, "10.0.0.5");
        assert_eq!(config.device.port, 8080); // default retained
        assert!(config.gains.override_pair().is_none());
        assert_eq!(config.substitution_rules.len(), 1);
        assert!(config.substitution_rules[0].enabled); // default = true
    }

    #[test]
    fn empty_rule_table_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server]\nport = 1234\n").unwrap();

        let config = BeqdConfig::from_file(file.path()).unwrap();
        assert_eq!(config.substitution_rules, default_substitution_rules());
    }

    #[test]
    fn device_base_url_has_no_trailing_slash() {
        let device = DeviceConfig::default();
        assert_eq!(device.base_url(), "http://127.0.0.1:8080");
    }
}
