//! Engine configuration.
//!
//! Loaded from a YAML file with per-section defaults, validated
//! before the engine starts.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::MarketSession;
use crate::risk::RiskLimits;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse the YAML.
    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// A value failed validation.
    #[error("config validation failed: {0}")]
    Validation(String),
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Instrument under trade.
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Session schedule.
    #[serde(default)]
    pub session: SessionConfig,
    /// Heartbeat cadence.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Event history retention.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Pre-trade risk limits.
    #[serde(default)]
    pub risk: RiskLimits,
    /// Replay input/output paths.
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Instrument configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Instrument symbol, for logging and the audit trail.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Contract multiplier applied to realized P&L.
    #[serde(default = "default_multiplier")]
    pub multiplier: Decimal,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            multiplier: default_multiplier(),
        }
    }
}

/// Session schedule configuration, times in UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session open (HH:MM:SS).
    #[serde(default = "default_open")]
    pub open: NaiveTime,
    /// Session close (HH:MM:SS).
    #[serde(default = "default_close")]
    pub close: NaiveTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open: default_open(),
            close: default_close(),
        }
    }
}

impl SessionConfig {
    /// Build the session schedule object.
    #[must_use]
    pub const fn to_session(&self) -> MarketSession {
        MarketSession {
            open: self.open,
            close: self.close,
        }
    }
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Tick period in milliseconds.
    #[serde(default = "default_heartbeat_period_ms")]
    pub period_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            period_ms: default_heartbeat_period_ms(),
        }
    }
}

/// History retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Entries retained per event kind.
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

/// Replay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Path of the event log to replay.
    #[serde(default)]
    pub log_path: Option<String>,
    /// Path of the JSONL audit trail to write, if any.
    #[serde(default)]
    pub audit_path: Option<String>,
}

fn default_symbol() -> String {
    "UNKNOWN".to_string()
}

const fn default_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_open() -> NaiveTime {
    NaiveTime::from_hms_opt(13, 30, 0).unwrap_or(NaiveTime::MIN)
}

fn default_close() -> NaiveTime {
    NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN)
}

const fn default_heartbeat_period_ms() -> u64 {
    1_000
}

const fn default_history_capacity() -> usize {
    4_096
}

impl Config {
    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Validation`] naming the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.open >= self.session.close {
            return Err(ConfigError::Validation(format!(
                "session open {} must precede close {}",
                self.session.open, self.session.close
            )));
        }
        if self.heartbeat.period_ms == 0 {
            return Err(ConfigError::Validation(
                "heartbeat period_ms must be positive".to_string(),
            ));
        }
        if self.instrument.multiplier <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "instrument multiplier {} must be positive",
                self.instrument.multiplier
            )));
        }
        if self.risk.max_position <= 0 {
            return Err(ConfigError::Validation(format!(
                "risk max_position {} must be positive",
                self.risk.max_position
            )));
        }
        if self.history.capacity == 0 {
            return Err(ConfigError::Validation(
                "history capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and validate configuration. `None` falls back to
/// `config.yaml` in the working directory; a missing default file
/// yields the built-in defaults.
///
/// # Errors
///
/// [`ConfigError`] on read, parse, or validation failure.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let effective = path.unwrap_or("config.yaml");
    let contents = match std::fs::read_to_string(effective) {
        Ok(contents) => contents,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound && path.is_none() => {
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: effective.to_string(),
                source,
            });
        }
    };
    let config: Config = serde_yaml_bw::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
