//! Configuration loading (SPEC_FULL.md §1 ambient stack), in the shape of
//! `services/forwarder/src/config.rs`: a `Raw*` `#[derive(Deserialize)]`
//! tree with every field `Option`, validated and defaulted into a plain
//! public struct.

use std::path::{Path, PathBuf};

use meter_proto::ActorId;
use meter_session::{DEFAULT_BATTLE_TIMEOUT_SECS, DEFAULT_HISTORY_CAPACITY, Mode};
use serde::Deserialize;
use thiserror::Error;

/// Which `PacketSource` the engine should build at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureConfig {
    /// Read a previously recorded pcap/pcapng file.
    Replay { path: PathBuf },
    /// Open a live capture device with the given BPF filter.
    Live { filter: String },
}

/// Validated, fully-defaulted engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub self_name: Option<String>,
    pub self_id: Option<ActorId>,
    pub session_mode: Mode,
    pub battle_timeout_secs: u64,
    pub history_capacity: usize,
    pub rolling_window_secs: u64,
    pub unknown_payload_dir: Option<PathBuf>,
    pub item_category_table_path: Option<PathBuf>,
    pub capture: CaptureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            self_name: None,
            self_id: None,
            session_mode: Mode::Battle,
            battle_timeout_secs: DEFAULT_BATTLE_TIMEOUT_SECS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            rolling_window_secs: meter_aggregate::DEFAULT_WINDOW_SECS,
            unknown_payload_dir: None,
            item_category_table_path: None,
            capture: CaptureConfig::Live {
                filter: meter_capture::live_filter_default(),
            },
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("reading config file '{path}': {message}")]
    Io { path: String, message: String },
    #[error("parsing config '{path}': {message}")]
    Parse { path: String, message: String },
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    self_name: Option<String>,
    self_id: Option<u32>,
    session_mode: Option<String>,
    battle_timeout_secs: Option<u64>,
    history_capacity: Option<usize>,
    rolling_window_secs: Option<u64>,
    unknown_payload_dir: Option<String>,
    item_category_table_path: Option<String>,
    capture: Option<RawCaptureConfig>,
}

#[derive(Debug, Deserialize)]
struct RawCaptureConfig {
    mode: Option<String>,
    path: Option<String>,
    filter: Option<String>,
}

/// Loads config from a TOML file at `path`.
pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    load_config_from_str(&text, &path.display().to_string())
}

/// Loads config from a TOML string; `source_label` is only used in error
/// messages (typically the path the string came from).
pub fn load_config_from_str(text: &str, source_label: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(text).map_err(|e| ConfigError::Parse {
        path: source_label.to_owned(),
        message: e.to_string(),
    })?;

    let session_mode = match raw.session_mode.as_deref() {
        None => Mode::Battle,
        Some("battle") => Mode::Battle,
        Some("zone") => Mode::Zone,
        Some("manual") => Mode::Manual,
        Some(other) => {
            return Err(ConfigError::InvalidValue(format!(
                "session_mode must be one of battle|zone|manual, got '{other}'"
            )));
        }
    };

    let capture = match raw.capture {
        None => CaptureConfig::Live {
            filter: meter_capture::live_filter_default(),
        },
        Some(raw_capture) => match raw_capture.mode.as_deref() {
            Some("replay") | None => {
                let path = raw_capture
                    .path
                    .ok_or_else(|| ConfigError::MissingField("capture.path".to_owned()))?;
                CaptureConfig::Replay { path: PathBuf::from(path) }
            }
            Some("live") => CaptureConfig::Live {
                filter: raw_capture
                    .filter
                    .unwrap_or_else(meter_capture::live_filter_default),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "capture.mode must be replay|live, got '{other}'"
                )));
            }
        },
    };

    Ok(Config {
        self_name: raw.self_name,
        self_id: raw.self_id,
        session_mode,
        battle_timeout_secs: raw.battle_timeout_secs.unwrap_or(DEFAULT_BATTLE_TIMEOUT_SECS),
        history_capacity: raw.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY),
        rolling_window_secs: raw
            .rolling_window_secs
            .unwrap_or(meter_aggregate::DEFAULT_WINDOW_SECS),
        unknown_payload_dir: raw.unknown_payload_dir.map(PathBuf::from),
        item_category_table_path: raw.item_category_table_path.map(PathBuf::from),
        capture,
    })
}
