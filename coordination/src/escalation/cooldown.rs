//! Cooldown table — suppresses repeat escalation per (stage, error kind)

use crate::stages::Stage;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Signature a cooldown applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CooldownKey {
    pub stage: Stage,
    pub error_kind: String,
}

impl CooldownKey {
    pub fn new(stage: Stage, error_kind: impl Into<String>) -> Self {
        Self {
            stage,
            error_kind: error_kind.into(),
        }
    }
}

impl std::fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.stage, self.error_kind)
    }
}

/// Expiry timestamps keyed by failure signature.
///
/// An entry is live while `now < expiry`. Expired entries are dropped by
/// `sweep`, which the engine runs on every decision.
#[derive(Debug, Clone, Default)]
pub struct CooldownTable {
    entries: HashMap<CooldownKey, DateTime<Utc>>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds left on a live cooldown, `None` if absent or expired
    pub fn remaining(&self, key: &CooldownKey, now: DateTime<Utc>) -> Option<f64> {
        let expiry = self.entries.get(key)?;
        if now < *expiry {
            Some((*expiry - now).num_milliseconds() as f64 / 1000.0)
        } else {
            None
        }
    }

    /// Set or overwrite the cooldown for `key` to expire `secs` after `now`.
    ///
    /// Expiry saturates at the latest representable timestamp.
    pub fn start(&mut self, key: CooldownKey, now: DateTime<Utc>, secs: f64) {
        // `as` saturates out-of-range floats
        let expiry = Duration::try_milliseconds((secs * 1000.0).round() as i64)
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(key, expiry);
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expiry| now < *expiry);
        before - self.entries.len()
    }

    /// Number of live entries at `now`
    pub fn active(&self, now: DateTime<Utc>) -> usize {
        self.entries.values().filter(|expiry| now < **expiry).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_until_expiry() {
        let mut table = CooldownTable::new();
        let now = Utc::now();
        let key = CooldownKey::new(Stage::Execute, "Timeout");

        table.start(key.clone(), now, 5.0);
        assert_eq!(table.remaining(&key, now), Some(5.0));
        assert_eq!(table.remaining(&key, now + Duration::seconds(2)), Some(3.0));
        assert_eq!(table.remaining(&key, now + Duration::seconds(5)), None);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut table = CooldownTable::new();
        let now = Utc::now();
        table.start(CooldownKey::new(Stage::Execute, "Timeout"), now, 60.0);

        assert!(table
            .remaining(&CooldownKey::new(Stage::Validate, "Timeout"), now)
            .is_none());
        assert!(table
            .remaining(&CooldownKey::new(Stage::Execute, "ImportError"), now)
            .is_none());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let mut table = CooldownTable::new();
        let now = Utc::now();
        table.start(CooldownKey::new(Stage::Think, "A"), now, 1.0);
        table.start(CooldownKey::new(Stage::Think, "B"), now, 100.0);

        let later = now + Duration::seconds(10);
        assert_eq!(table.active(later), 1);
        assert_eq!(table.sweep(later), 1);
        assert_eq!(table.active(later), 1);
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let mut table = CooldownTable::new();
        let now = Utc::now();
        let key = CooldownKey::new(Stage::Execute, "ImportError");

        table.start(key.clone(), now, 1.0e13);
        assert!(table.remaining(&key, now).is_some());
        table.start(key.clone(), now, f64::MAX);
        assert!(table.remaining(&key, now).is_some());
        assert_eq!(table.active(now), 1);
    }

    #[test]
    fn test_start_overwrites() {
        let mut table = CooldownTable::new();
        let now = Utc::now();
        let key = CooldownKey::new(Stage::Decide, "ValueError");
        table.start(key.clone(), now, 300.0);
        table.start(key.clone(), now, 5.0);
        assert_eq!(table.remaining(&key, now), Some(5.0));
    }
}
