//! Analysis configuration
//!
//! Defaults live in `AnalysisConfig::default()`. A `codewaste.toml` file at
//! the repository root may overlay individual fields; CLI flags are applied on
//! top of that by the caller. Validation runs once, before any scanning, and
//! surfaces malformed inputs as typed configuration errors.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the optional per-repository config file.
pub const CONFIG_FILE_NAME: &str = "codewaste.toml";

/// Caller-input errors, surfaced before scanning begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("repository root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("{name} must be within [0.0, 1.0], got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("minimum duplicate body statements must be at least 1, got {0}")]
    InvalidStatementMinimum(usize),
}

/// Tunable knobs for one analysis invocation.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Include directories literally named "tests" in the scan
    pub include_tests: bool,
    /// Minimum probability for a provenance signal to be reported
    pub ai_threshold: f64,
    /// High-confidence duplication similarity threshold
    pub dup_high_threshold: f64,
    /// Medium-tier threshold, only consulted when the medium tier is enabled
    pub dup_medium_threshold: f64,
    pub include_medium_duplication: bool,
    /// Bodies with fewer top-level statements are excluded from comparison
    pub min_dup_body_statements: usize,
    /// Signatures shorter than this many chars are excluded from comparison
    pub min_dup_signature_chars: usize,
    /// Collect git blame/history evidence and apply score adjustments
    pub git_enabled: bool,
    /// Runtime-evidence observation window, for cost annualization
    pub time_window_days: u32,
    /// Optional per-invocation cost for annualized estimates
    pub cost_per_invocation: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            include_tests: false,
            ai_threshold: 0.65,
            dup_high_threshold: 0.9,
            dup_medium_threshold: 0.75,
            include_medium_duplication: false,
            min_dup_body_statements: 3,
            min_dup_signature_chars: 160,
            git_enabled: true,
            time_window_days: 90,
            cost_per_invocation: 0.0,
        }
    }
}

impl AnalysisConfig {
    /// Validate threshold ranges. Called by the engine before scanning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("ai-threshold", self.ai_threshold),
            ("dup-threshold", self.dup_high_threshold),
            ("dup-medium-threshold", self.dup_medium_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if self.min_dup_body_statements == 0 {
            return Err(ConfigError::InvalidStatementMinimum(
                self.min_dup_body_statements,
            ));
        }
        Ok(())
    }

    /// Overlay values from `codewaste.toml` in `root`, if present.
    ///
    /// A malformed config file is reported and ignored rather than aborting
    /// the run; explicit CLI flags are applied after this by the caller.
    pub fn apply_file_overrides(&mut self, root: &Path) {
        let path = root.join(CONFIG_FILE_NAME);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return;
        };
        let overrides: FileOverrides = match toml::from_str(&raw) {
            Ok(overrides) => overrides,
            Err(err) => {
                warn!("ignoring malformed {}: {}", path.display(), err);
                return;
            }
        };
        debug!("loaded config overrides from {}", path.display());

        macro_rules! overlay {
            ($($field:ident),+ $(,)?) => {
                $(if let Some(value) = overrides.$field {
                    self.$field = value;
                })+
            };
        }
        overlay!(
            include_tests,
            ai_threshold,
            dup_high_threshold,
            dup_medium_threshold,
            include_medium_duplication,
            min_dup_body_statements,
            min_dup_signature_chars,
            git_enabled,
            time_window_days,
            cost_per_invocation,
        );
    }
}

/// Serde view of `codewaste.toml`; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOverrides {
    include_tests: Option<bool>,
    ai_threshold: Option<f64>,
    dup_high_threshold: Option<f64>,
    dup_medium_threshold: Option<f64>,
    include_medium_duplication: Option<bool>,
    min_dup_body_statements: Option<usize>,
    min_dup_signature_chars: Option<usize>,
    git_enabled: Option<bool>,
    time_window_days: Option<u32>,
    cost_per_invocation: Option<f64>,
}
