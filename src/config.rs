//! Tuning knobs for the adaptive scheduler.
//!
//! Options are plain data with sensible defaults. They can also be read from a
//! TOML document whose `[engine]` table mirrors the field names:
//!
//! ```toml
//! [engine]
//! find_locals = 64
//! probe_matches = 4
//! best_dist = 512
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming a TOML file consulted by [`EngineOptions::from_env`].
pub const CONFIG_ENV: &str = "SONDA_CONFIG";

/// Scheduler configuration shared by every node of a session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Matches collected in the cheapest condition before re-ranking siblings.
    pub find_locals: usize,
    /// Matches a non-driving sibling must produce before its statistics are trusted.
    pub probe_matches: usize,
    /// Rows a sibling is probed over when it is not the driver.
    pub best_dist: usize,
    /// Cost of one linear step; the numerator of the selectivity term.
    pub time_unit: f64,
    /// Rows handed to a linear-scan driver before the scheduler re-ranks.
    pub segment_rows: usize,
    /// Weight of the selectivity term relative to the per-row cost.
    pub selectivity_weight: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            find_locals: 64,
            probe_matches: 4,
            best_dist: 512,
            time_unit: 64.0,
            segment_rows: 1000,
            selectivity_weight: 8.0,
        }
    }
}

impl EngineOptions {
    /// Parses options from a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: None,
            source,
        })?;
        raw.engine.checked()
    }

    /// Reads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        debug!(path = %path.display(), "config.load");
        raw.engine.checked()
    }

    /// Loads the file named by `SONDA_CONFIG`, falling back to defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    /// Rejects values that would stall or destabilise the scheduler.
    pub fn checked(self) -> Result<Self, ConfigError> {
        if self.find_locals == 0 {
            return Err(ConfigError::Invalid {
                field: "find_locals",
                reason: "must be at least 1",
            });
        }
        if self.probe_matches == 0 {
            return Err(ConfigError::Invalid {
                field: "probe_matches",
                reason: "must be at least 1",
            });
        }
        if self.segment_rows == 0 {
            return Err(ConfigError::Invalid {
                field: "segment_rows",
                reason: "must be at least 1",
            });
        }
        if self.best_dist == 0 {
            return Err(ConfigError::Invalid {
                field: "best_dist",
                reason: "must be at least 1",
            });
        }
        if !(self.time_unit > 0.0 && self.time_unit.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "time_unit",
                reason: "must be a positive finite number",
            });
        }
        if !(self.selectivity_weight >= 0.0 && self.selectivity_weight.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "selectivity_weight",
                reason: "must be a non-negative finite number",
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    engine: EngineOptions,
}

/// Failures while loading [`EngineOptions`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read engine config {}: {source}", .path.display())]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The document is not valid TOML or has mistyped fields.
    #[error("failed to parse engine config{}: {source}", display_path(.path))]
    Parse {
        /// File the document came from, if any.
        path: Option<PathBuf>,
        /// Underlying parse failure.
        source: toml::de::Error,
    },
    /// A field holds a value the scheduler cannot use.
    #[error("engine option '{field}' {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Constraint that was violated.
        reason: &'static str,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" {}", path.display()),
        None => String::new(),
    }
}
