//! Escalation configuration — thresholds, identifiers and cooldown periods
//!
//! Loaded from YAML, JSON or TOML. Every loaded value goes through
//! `validate()`; a bad value is a configuration error, never a silent default.

use crate::error::{CoordinationError, CoordinationResult};
use crate::escalation::decision::InterventionKind;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Cooldown applied to an intervention kind with no configured period
pub const DEFAULT_COOLDOWN_SECS: f64 = 30.0;

/// Longest cooldown a config may set (one year)
pub const MAX_COOLDOWN_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Default number of history entries retained by the engine
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Failure-count thresholds, one per level (inclusive lower bounds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureCountThresholds {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

impl Default for FailureCountThresholds {
    fn default() -> Self {
        Self {
            low: 1,
            medium: 3,
            high: 5,
            critical: 10,
        }
    }
}

/// Elapsed-time thresholds in seconds (inclusive lower bounds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeElapsedThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for TimeElapsedThresholds {
    fn default() -> Self {
        Self {
            medium: 300.0,
            high: 900.0,
            critical: 1800.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationThresholds {
    pub failure_count: FailureCountThresholds,
    pub time_elapsed: TimeElapsedThresholds,
}

/// Configuration for the escalation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Retries an orchestrator may attempt before treating a failure as exhausted
    pub max_retries: u32,
    /// Substrings of an error kind that force an emergency stop
    pub critical_errors: Vec<String>,
    /// Lowercase substrings of an error message that raise the level to high
    pub high_priority_patterns: Vec<String>,
    pub escalation_thresholds: EscalationThresholds,
    /// Cooldown per intervention kind; configured entries overlay the defaults
    #[serde(deserialize_with = "overlay_cooldowns")]
    pub cooldown_periods: BTreeMap<InterventionKind, f64>,
    /// Maximum retained history entries (ring buffer)
    pub history_limit: usize,
}

fn default_cooldowns() -> BTreeMap<InterventionKind, f64> {
    BTreeMap::from([
        (InterventionKind::AutoRetry, 5.0),
        (InterventionKind::ContextAdjustment, 30.0),
        (InterventionKind::ResourceIncrease, 60.0),
        (InterventionKind::StrategyChange, 120.0),
        (InterventionKind::HumanReview, 300.0),
    ])
}

fn overlay_cooldowns<'de, D>(deserializer: D) -> Result<BTreeMap<InterventionKind, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = BTreeMap::<InterventionKind, f64>::deserialize(deserializer)?;
    let mut merged = default_cooldowns();
    merged.extend(configured);
    Ok(merged)
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            critical_errors: [
                "SecurityViolation",
                "DataLoss",
                "PermissionDenied",
                "OutOfMemory",
                "DiskFull",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            high_priority_patterns: ["security", "data loss", "corrupt", "production", "credential"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            escalation_thresholds: EscalationThresholds::default(),
            cooldown_periods: default_cooldowns(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl EscalationConfig {
    /// Cooldown for an intervention kind, falling back to 30 seconds
    pub fn cooldown_for(&self, kind: InterventionKind) -> f64 {
        self.cooldown_periods
            .get(&kind)
            .copied()
            .unwrap_or(DEFAULT_COOLDOWN_SECS)
    }

    /// Check every invariant the engine relies on
    pub fn validate(&self) -> CoordinationResult<()> {
        let fc = &self.escalation_thresholds.failure_count;
        if !(fc.low <= fc.medium && fc.medium <= fc.high && fc.high <= fc.critical) {
            return Err(CoordinationError::config(format!(
                "failure_count thresholds must be non-decreasing from low to critical \
                 (low={}, medium={}, high={}, critical={})",
                fc.low, fc.medium, fc.high, fc.critical
            )));
        }

        let te = &self.escalation_thresholds.time_elapsed;
        for (name, value) in [("medium", te.medium), ("high", te.high), ("critical", te.critical)] {
            check_duration(&format!("time_elapsed.{name}"), value)?;
        }
        if !(te.medium <= te.high && te.high <= te.critical) {
            return Err(CoordinationError::config(format!(
                "time_elapsed thresholds must be non-decreasing from medium to critical \
                 (medium={}, high={}, critical={})",
                te.medium, te.high, te.critical
            )));
        }

        for (kind, secs) in &self.cooldown_periods {
            check_duration(&format!("cooldown_periods.{kind}"), *secs)?;
            if *secs > MAX_COOLDOWN_SECS {
                return Err(CoordinationError::config(format!(
                    "cooldown_periods.{kind} exceeds the {MAX_COOLDOWN_SECS}s limit (got {secs})"
                )));
            }
        }

        if let Some(blank) = self.critical_errors.iter().find(|s| s.trim().is_empty()) {
            return Err(CoordinationError::config(format!(
                "critical_errors contains a blank identifier ({blank:?})"
            )));
        }
        if let Some(blank) = self
            .high_priority_patterns
            .iter()
            .find(|s| s.trim().is_empty())
        {
            return Err(CoordinationError::config(format!(
                "high_priority_patterns contains a blank pattern ({blank:?})"
            )));
        }

        if self.history_limit == 0 {
            return Err(CoordinationError::config("history_limit must be at least 1"));
        }

        Ok(())
    }

    /// Parse a config document; the format is picked from the file extension.
    pub fn from_str_with_format(content: &str, format: ConfigFormat) -> CoordinationResult<Self> {
        let config: Self = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file (`.yaml`, `.yml`, `.json` or `.toml`)
    pub fn from_path(path: impl AsRef<Path>) -> CoordinationResult<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_str_with_format(&content, format)?;
        tracing::info!(path = %path.display(), "Loaded escalation config");
        Ok(config)
    }
}

fn check_duration(name: &str, secs: f64) -> CoordinationResult<()> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(CoordinationError::config(format!(
            "{name} must be a finite, non-negative number of seconds (got {secs})"
        )));
    }
    Ok(())
}

/// Document formats accepted for config and corpus files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> CoordinationResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(CoordinationError::config(format!(
                "unsupported file format for {} (expected .yaml, .yml, .json or .toml)",
                path.display()
            ))),
        }
    }
}
