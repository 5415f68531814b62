//! Recorder configuration.
//!
//! Everything environment-specific or heuristic lives here rather than in
//! code: the storage location, the collector endpoint and its pacing, and
//! the attribution tables (neutral-killer membership, proximity threshold)
//! that vary between host mod sets. All fields have defaults so a missing
//! or partial config file is never an error.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Directory created under the platform data dir when no explicit storage
/// path is configured.
const DEFAULT_DIR_NAME: &str = "crewlog";

const DEFAULT_COLLECTOR_URL: &str = "https://crewlog-collector.vercel.app/api/sessions";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 3_000;
const DEFAULT_UPLOAD_DELAY_MS: u64 = 1_000; // politeness gap between consecutive sends
const DEFAULT_BACKLOG_DELAY_MS: u64 = 15_000; // settle time after startup before scanning
const DEFAULT_BACKLOG_LIMIT: usize = 50; // per run; the remainder waits for the next run

/// Distance units within which the proximity heuristic will attribute a kill.
const DEFAULT_PROXIMITY_THRESHOLD: f32 = 5.0;

/// Roles outside the impostor team that are still kill-eligible. Matched
/// case-insensitively as substrings of the role name.
const DEFAULT_NEUTRAL_KILLER_ROLES: &[&str] = &[
    "juggernaut",
    "glitch",
    "werewolf",
    "pestilence",
    "arsonist",
    "soulcollector",
    "vampire",
    "inquisitor",
];

/// Default config file location under the platform config dir. `None` on
/// platforms without one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(DEFAULT_DIR_NAME).join("config.toml"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub attribution: AttributionConfig,
}

impl RecorderConfig {
    /// Loads a TOML config file. Missing file yields the defaults; a file
    /// that exists but does not parse is an error the caller should surface.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.data_dir = Some(dir.into());
        self
    }

    pub fn with_collector_url(mut self, url: impl Into<String>) -> Self {
        self.upload.collector_url = url.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Explicit storage directory. When unset, a `crewlog` directory under
    /// the platform data dir is used.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(DEFAULT_DIR_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub collector_url: String,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub upload_delay_ms: u64,
    pub backlog_delay_ms: u64,
    pub backlog_limit: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            upload_delay_ms: DEFAULT_UPLOAD_DELAY_MS,
            backlog_delay_ms: DEFAULT_BACKLOG_DELAY_MS,
            backlog_limit: DEFAULT_BACKLOG_LIMIT,
        }
    }
}

impl UploadConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn upload_delay(&self) -> Duration {
        Duration::from_millis(self.upload_delay_ms)
    }

    pub fn backlog_delay(&self) -> Duration {
        Duration::from_millis(self.backlog_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    pub proximity_threshold: f32,
    pub neutral_killer_roles: Vec<String>,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: DEFAULT_PROXIMITY_THRESHOLD,
            neutral_killer_roles: DEFAULT_NEUTRAL_KILLER_ROLES
                .iter()
                .map(|role| (*role).to_string())
                .collect(),
        }
    }
}

impl AttributionConfig {
    /// Whether a role name belongs to a configured neutral-killer role.
    pub fn is_neutral_killer(&self, role: &str) -> bool {
        let role = role.to_lowercase();
        self.neutral_killer_roles
            .iter()
            .any(|needle| role.contains(needle.to_lowercase().as_str()))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
