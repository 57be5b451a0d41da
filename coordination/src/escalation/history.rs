//! Escalation history — bounded append-only log plus lifetime counters

use crate::escalation::decision::{
    EscalationDecision, EscalationLevel, HistoryEntry, InterventionKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Number of recent entries included in stats
pub const RECENT_ENTRIES: usize = 5;

/// Ring buffer of decisions. Counters cover every decision ever appended,
/// including ones evicted from the buffer.
#[derive(Debug, Clone)]
pub struct EscalationHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
    by_level: BTreeMap<EscalationLevel, u64>,
    by_intervention: BTreeMap<InterventionKind, u64>,
    total: u64,
    suppressed: u64,
}

impl EscalationHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
            by_level: BTreeMap::new(),
            by_intervention: BTreeMap::new(),
            total: 0,
            suppressed: 0,
        }
    }

    pub fn append(&mut self, timestamp: DateTime<Utc>, decision: EscalationDecision) {
        *self.by_level.entry(decision.level).or_insert(0) += 1;
        *self.by_intervention.entry(decision.intervention).or_insert(0) += 1;
        self.total += 1;

        self.entries.push_back(HistoryEntry {
            timestamp,
            decision,
        });
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    /// Count a cooldown-suppressed decision without logging it
    pub fn note_suppressed(&mut self) {
        self.suppressed += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Most recent `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self, active_cooldowns: usize) -> EscalationStats {
        EscalationStats {
            total_decisions: self.total,
            suppressed_decisions: self.suppressed,
            by_level: self.by_level.clone(),
            by_intervention: self.by_intervention.clone(),
            recent: self.recent(RECENT_ENTRIES),
            active_cooldowns,
        }
    }
}

/// Snapshot of engine activity for observability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationStats {
    /// Decisions appended to history
    pub total_decisions: u64,
    /// Decisions answered from a live cooldown (not in history)
    pub suppressed_decisions: u64,
    pub by_level: BTreeMap<EscalationLevel, u64>,
    pub by_intervention: BTreeMap<InterventionKind, u64>,
    /// Up to five most recent history entries, oldest first
    pub recent: Vec<HistoryEntry>,
    pub active_cooldowns: usize,
}
