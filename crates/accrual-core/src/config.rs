//! Configuration loading and typed config structures for the Accrual
//! simulation.
//!
//! The canonical configuration lives in `accrual-config.yaml` at the project
//! root. Every field has a default, so an empty file (or no file) yields a
//! runnable configuration. Environment variables override selected fields
//! after parsing; see [`SimulationConfig::apply_env_overrides`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use accrual_types::ErrorKind;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::scheduler::{MAX_TICK_RATE_HZ, MIN_TICK_RATE_HZ};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is outside its valid range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl ConfigError {
    /// Category of the error.
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `accrual-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Tick rate, time scale and stale-delta handling.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Effect pipeline settings.
    #[serde(default)]
    pub effects: EffectsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where the resource and task catalog is read from.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Where the final snapshot is written.
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Bounds on an engine run.
    #[serde(default)]
    pub run: RunConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override fields with environment variables when set.
    ///
    /// - `ACCRUAL_TICK_RATE_HZ` overrides `scheduler.tick_rate_hz`
    /// - `ACCRUAL_TIME_SCALE` overrides `scheduler.time_scale`
    /// - `ACCRUAL_CATALOG` overrides `catalog.path`
    /// - `ACCRUAL_LOG_LEVEL` overrides `logging.level`
    ///
    /// Values that do not parse are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(hz) = env_decimal("ACCRUAL_TICK_RATE_HZ") {
            self.scheduler.tick_rate_hz = hz;
        }
        if let Some(scale) = env_decimal("ACCRUAL_TIME_SCALE") {
            self.scheduler.time_scale = scale;
        }
        if let Ok(val) = std::env::var("ACCRUAL_CATALOG") {
            self.catalog.path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("ACCRUAL_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Check every value against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()
    }
}

fn env_decimal(key: &str) -> Option<Decimal> {
    let raw = std::env::var(key).ok()?;
    match Decimal::from_str(raw.trim()) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, value = %raw, %err, "Ignoring unparseable env override");
            None
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Ticks per second, in `(0.1, 60]`.
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: Decimal,

    /// Multiplier from real to simulated seconds; must be positive.
    #[serde(default = "default_time_scale")]
    pub time_scale: Decimal,

    /// Largest real delta a single tick may apply.
    #[serde(default = "default_stale_delta_ceiling_seconds")]
    pub stale_delta_ceiling_seconds: u64,

    /// Start ticking as soon as the simulation is built.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl SchedulerConfig {
    /// Check the scheduler values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an out-of-range tick rate, a
    /// non-positive time scale, or a zero ceiling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz <= MIN_TICK_RATE_HZ || self.tick_rate_hz > MAX_TICK_RATE_HZ {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "scheduler.tick_rate_hz must be in ({MIN_TICK_RATE_HZ}, {MAX_TICK_RATE_HZ}], got {}",
                    self.tick_rate_hz
                ),
            });
        }
        if self.time_scale <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "scheduler.time_scale must be positive, got {}",
                    self.time_scale
                ),
            });
        }
        if self.stale_delta_ceiling_seconds == 0 {
            return Err(ConfigError::Invalid {
                reason: "scheduler.stale_delta_ceiling_seconds must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            time_scale: default_time_scale(),
            stale_delta_ceiling_seconds: default_stale_delta_ceiling_seconds(),
            autostart: default_true(),
        }
    }
}

/// Effect pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EffectsConfig {
    /// Number of applied effects retained in the journal.
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            journal_capacity: default_journal_capacity(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG`
    /// is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Catalog location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogConfig {
    /// Path to the catalog YAML.
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

/// Snapshot output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SnapshotConfig {
    /// File the final snapshot is written to; stdout when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Bounds on an engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Stop after this many dispatched ticks (0 = run until stopped).
    #[serde(default)]
    pub max_ticks: u64,
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_tick_rate_hz() -> Decimal {
    Decimal::ONE
}

const fn default_time_scale() -> Decimal {
    Decimal::ONE
}

const fn default_stale_delta_ceiling_seconds() -> u64 {
    300
}

const fn default_journal_capacity() -> usize {
    accrual_tasks::effects::DEFAULT_JOURNAL_CAPACITY
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog.yaml")
}

const fn default_true() -> bool {
    true
}
