//! Application-level configuration loading: cohort limits, timeouts, sweeper cadence and the
//! analysis pipeline settings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::quorum::QuorumPolicy;

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SITUATION_ROOM_CONFIG_PATH";

/// Room code generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomCodeConfig {
    pub length: usize,
    /// Attempts before giving up with a code-space-exhausted error.
    pub max_attempts: usize,
}

impl Default for RoomCodeConfig {
    fn default() -> Self {
        Self {
            length: 6,
            max_attempts: 5,
        }
    }
}

/// Delivery settings for the analysis worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Remote pipeline URL; the built-in heuristic analyzer is used when unset.
    pub endpoint: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            endpoint: None,
        }
    }
}

/// Backoff used while waiting for the storage backend at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConnectConfig {
    /// Pings attempted before a connection attempt is reported as failed.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Cap applied to the doubled delay.
    pub max_delay: Duration,
}

impl Default for StorageConnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Room chat limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub max_message_chars: usize,
    /// Messages returned by a poll that carries no cursor.
    pub poll_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 500,
            poll_window: 50,
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub quorum: QuorumPolicy,
    pub max_narrative_chars: usize,
    pub room_code: RoomCodeConfig,
    /// Reruns of a transition after losing a compare-and-swap.
    pub conflict_retries: usize,
    pub storage_timeout: Duration,
    pub storage_connect: StorageConnectConfig,
    pub waiting_room_ttl: Duration,
    pub sweep_interval: Duration,
    /// Age after which a completed room without report is handed to the pipeline again.
    pub report_redelivery: Duration,
    pub analysis: AnalysisConfig,
    pub chat: ChatConfig,
    /// Users allowed to review scenarios.
    pub reviewers: Vec<String>,
    pub event_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            quorum: QuorumPolicy::default(),
            max_narrative_chars: 1000,
            room_code: RoomCodeConfig::default(),
            conflict_retries: 5,
            storage_timeout: Duration::from_millis(5000),
            storage_connect: StorageConnectConfig::default(),
            waiting_room_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            report_redelivery: Duration::from_secs(120),
            analysis: AnalysisConfig::default(),
            chat: ChatConfig::default(),
            reviewers: Vec::new(),
            event_capacity: 64,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        min_members = app_config.quorum.min_members,
                        max_members = app_config.quorum.max_members,
                        reviewers = app_config.reviewers.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        let raw = serde_json::from_str::<RawConfig>(contents)?;
        Ok(raw.into())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    quorum: Option<RawQuorum>,
    max_narrative_chars: Option<usize>,
    room_code: Option<RawRoomCode>,
    conflict_retries: Option<usize>,
    storage_timeout_ms: Option<u64>,
    storage_connect: Option<RawStorageConnect>,
    waiting_room_ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    report_redelivery_secs: Option<u64>,
    analysis: Option<RawAnalysis>,
    chat: Option<RawChat>,
    reviewers: Option<Vec<String>>,
    event_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawQuorum {
    min_members: Option<usize>,
    max_members: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRoomCode {
    length: Option<usize>,
    max_attempts: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStorageConnect {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawChat {
    max_message_chars: Option<usize>,
    poll_window: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();

        let quorum = value.quorum.unwrap_or_default();
        let quorum = QuorumPolicy::new(
            quorum.min_members.unwrap_or(defaults.quorum.min_members),
            quorum.max_members.unwrap_or(defaults.quorum.max_members),
        );
        let quorum = if quorum.min_members == 0 || quorum.min_members > quorum.max_members {
            warn!(
                min_members = quorum.min_members,
                max_members = quorum.max_members,
                "inconsistent quorum limits; using defaults"
            );
            defaults.quorum
        } else {
            quorum
        };

        let room_code = value.room_code.unwrap_or_default();
        let analysis = value.analysis.unwrap_or_default();
        let storage_connect = value.storage_connect.unwrap_or_default();
        let chat = value.chat.unwrap_or_default();

        Self {
            quorum,
            max_narrative_chars: value
                .max_narrative_chars
                .unwrap_or(defaults.max_narrative_chars),
            room_code: RoomCodeConfig {
                length: room_code
                    .length
                    .filter(|length| *length > 0)
                    .unwrap_or(defaults.room_code.length),
                max_attempts: room_code
                    .max_attempts
                    .filter(|attempts| *attempts > 0)
                    .unwrap_or(defaults.room_code.max_attempts),
            },
            conflict_retries: value.conflict_retries.unwrap_or(defaults.conflict_retries),
            storage_timeout: value
                .storage_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.storage_timeout),
            storage_connect: StorageConnectConfig {
                max_attempts: storage_connect
                    .max_attempts
                    .filter(|attempts| *attempts > 0)
                    .unwrap_or(defaults.storage_connect.max_attempts),
                initial_delay: storage_connect
                    .initial_delay_ms
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.storage_connect.initial_delay),
                max_delay: storage_connect
                    .max_delay_ms
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.storage_connect.max_delay),
            },
            waiting_room_ttl: value
                .waiting_room_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.waiting_room_ttl),
            sweep_interval: value
                .sweep_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            report_redelivery: value
                .report_redelivery_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.report_redelivery),
            analysis: AnalysisConfig {
                max_attempts: analysis
                    .max_attempts
                    .filter(|attempts| *attempts > 0)
                    .unwrap_or(defaults.analysis.max_attempts),
                initial_backoff: analysis
                    .initial_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.analysis.initial_backoff),
                endpoint: analysis.endpoint.filter(|url| !url.trim().is_empty()),
            },
            chat: ChatConfig {
                max_message_chars: chat
                    .max_message_chars
                    .filter(|chars| *chars > 0)
                    .unwrap_or(defaults.chat.max_message_chars),
                poll_window: chat
                    .poll_window
                    .filter(|window| *window > 0)
                    .unwrap_or(defaults.chat.poll_window),
            },
            reviewers: value.reviewers.unwrap_or(defaults.reviewers),
            event_capacity: value
                .event_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.event_capacity),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.quorum, QuorumPolicy::new(2, 8));
        assert_eq!(config.max_narrative_chars, 1000);
        assert_eq!(config.room_code, RoomCodeConfig::default());
        assert_eq!(config.conflict_retries, 5);
        assert_eq!(config.storage_timeout, Duration::from_secs(5));
        assert!(config.analysis.endpoint.is_none());
        assert!(config.reviewers.is_empty());
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config = AppConfig::from_json(
            r#"{
                "quorum": { "max_members": 4 },
                "reviewers": ["moderator"],
                "analysis": { "endpoint": "http://analysis.local/report" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.quorum.min_members, 2);
        assert_eq!(config.quorum.max_members, 4);
        assert_eq!(config.reviewers, vec!["moderator".to_string()]);
        assert_eq!(
            config.analysis.endpoint.as_deref(),
            Some("http://analysis.local/report")
        );
        assert_eq!(config.analysis.max_attempts, 3);
    }

    #[test]
    fn inverted_quorum_falls_back_to_defaults() {
        let config =
            AppConfig::from_json(r#"{ "quorum": { "min_members": 5, "max_members": 3 } }"#)
                .unwrap();
        assert_eq!(config.quorum, QuorumPolicy::default());
    }

    #[test]
    fn storage_connect_backoff_is_configurable() {
        let config = AppConfig::from_json(
            r#"{ "storage_connect": { "max_attempts": 3, "initial_delay_ms": 100, "max_delay_ms": 0 } }"#,
        )
        .unwrap();
        assert_eq!(config.storage_connect.max_attempts, 3);
        assert_eq!(config.storage_connect.initial_delay, Duration::from_millis(100));
        assert_eq!(config.storage_connect.max_delay, Duration::from_secs(5));
        assert_eq!(config.chat, ChatConfig::default());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(AppConfig::from_json("{ not json").is_err());
    }
}
