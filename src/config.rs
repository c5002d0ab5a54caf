use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineOptions;
use crate::limits::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::model::OverlapPolicy;

/// Runtime configuration, read from `EQUIPTRACK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Log appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub op_timeout: Duration,
    /// Permit back-to-back bookings (`end == next.start`).
    pub allow_adjacent: bool,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            op_timeout: Duration::from_millis(5000),
            allow_adjacent: false,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
    OutOfRange(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "{key}: cannot parse {value:?}"),
            ConfigError::OutOfRange(msg) => write!(f, "config out of range: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &'static str,
        ) -> Result<Option<T>, ConfigError> {
            match lookup(key) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::Invalid { key, value }),
            }
        }

        let defaults = Self::default();
        let config = Self {
            data_dir: lookup("EQUIPTRACK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, "EQUIPTRACK_METRICS_PORT")?,
            compact_threshold: parsed(&lookup, "EQUIPTRACK_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            op_timeout: parsed(&lookup, "EQUIPTRACK_OP_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.op_timeout),
            allow_adjacent: parsed(&lookup, "EQUIPTRACK_ALLOW_ADJACENT")?
                .unwrap_or(defaults.allow_adjacent),
            default_page_size: parsed(&lookup, "EQUIPTRACK_DEFAULT_PAGE_SIZE")?
                .unwrap_or(defaults.default_page_size),
            max_page_size: parsed(&lookup, "EQUIPTRACK_MAX_PAGE_SIZE")?
                .unwrap_or(defaults.max_page_size),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::OutOfRange("max page size"));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::OutOfRange("default page size"));
        }
        if self.op_timeout.is_zero() {
            return Err(ConfigError::OutOfRange("operation timeout"));
        }
        Ok(())
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("equiptrack.wal")
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            overlap: if self.allow_adjacent {
                OverlapPolicy::HalfOpen
            } else {
                OverlapPolicy::Inclusive
            },
            op_timeout: self.op_timeout,
        }
    }
}
