/// Service configuration loader - parses wxmon.toml
///
/// Separates the server/station registry, unit preferences and polling
/// settings from code, making it easy to add stations or change display
/// units without recompiling the service.

use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "wxmon.toml";

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Deserialize)]
pub struct WxConfig {
    #[serde(default)]
    pub settings: Settings,

    /// Raw unit → preferred display unit, e.g. `"k" = "C"`.
    #[serde(default)]
    pub units: HashMap<String, String>,

    /// Display unit → number of fractional digits, e.g. `"C" = 1`.
    #[serde(default = "default_precision")]
    pub precision: HashMap<String, u32>,

    #[serde(rename = "server")]
    pub servers: Vec<ServerConfig>,
}

/// Daemon and transport settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Delay between the end of one pass and the start of the next.
    pub poll_interval_secs: u64,
    /// Per-request timeout for telemetry servers.
    pub request_timeout_ms: u64,
    /// Upper bound on pages fetched per server during term discovery.
    pub max_term_pages: usize,
    /// Worker threads used to fan requests out across stations.
    pub workers: usize,
    /// Rediscover terms at the start of every pass instead of on request only.
    pub refresh_terms_each_pass: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            request_timeout_ms: 1000,
            max_term_pages: 10_000,
            workers: 4,
            refresh_terms_each_pass: false,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// A telemetry server and the stations it reports for.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub url: String,
    #[serde(rename = "station", default)]
    pub stations: Vec<StationConfig>,
}

/// A station entry under `[[server.station]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// Station identifier. Accepts `"34519"` or `34519`.
    #[serde(deserialize_with = "string_or_int")]
    pub index: String,
    pub name: String,
}

fn default_precision() -> HashMap<String, u32> {
    HashMap::from([("C".to_string(), 1)])
}

fn string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Index {
        Text(String),
        Int(i64),
    }

    Ok(match Index::deserialize(deserializer)? {
        Index::Text(s) => s,
        Index::Int(n) => n.to_string(),
    })
}

/// Loads and validates the configuration file at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<WxConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let config: WxConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    config.validate()?;
    Ok(config)
}

/// Parses configuration from a TOML string (no file access).
pub fn parse_config(contents: &str) -> Result<WxConfig, ConfigError> {
    let config: WxConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: "<inline>".to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

impl WxConfig {
    /// Checks the invariants the registry relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.servers.is_empty() {
            return invalid("at least one [[server]] is required".to_string());
        }

        let mut server_names = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return invalid("server name must not be empty".to_string());
            }
            if !server_names.insert(server.name.as_str()) {
                return invalid(format!("duplicate server name '{}'", server.name));
            }
            if server.url.trim().is_empty() {
                return invalid(format!("server '{}' has an empty url", server.name));
            }
            if server.stations.is_empty() {
                return invalid(format!("server '{}' has no stations", server.name));
            }

            let mut indices = HashSet::new();
            for station in &server.stations {
                if station.index.trim().is_empty() {
                    return invalid(format!("server '{}' has a station with an empty index", server.name));
                }
                if !indices.insert(station.index.as_str()) {
                    return invalid(format!(
                        "duplicate station '{}' on server '{}'",
                        station.index, server.name
                    ));
                }
            }
        }

        let s = &self.settings;
        if s.request_timeout_ms == 0 || s.request_timeout_ms > 5000 {
            return invalid(format!(
                "request_timeout_ms must be between 1 and 5000, got {}",
                s.request_timeout_ms
            ));
        }
        if s.poll_interval_secs == 0 {
            return invalid("poll_interval_secs must be at least 1".to_string());
        }
        if s.workers == 0 {
            return invalid("workers must be at least 1".to_string());
        }
        if s.max_term_pages == 0 {
            return invalid("max_term_pages must be at least 1".to_string());
        }

        Ok(())
    }
}
