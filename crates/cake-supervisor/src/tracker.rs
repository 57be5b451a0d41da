//! Per-task failure bookkeeping
//!
//! Counts failures per (stage, error kind) signature and remembers which
//! interventions were applied, so each failure becomes a complete
//! `FailureContext` for the escalation engine.

use chrono::{DateTime, Utc};
use coordination::{Clock, FailureContext, InterventionKind, Stage};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct FailureTracker {
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    counts: HashMap<(Stage, String), u32>,
    interventions: Vec<String>,
}

impl FailureTracker {
    /// Start tracking a task now
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            started_at,
            counts: HashMap::new(),
            interventions: Vec::new(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds since the task started
    pub fn elapsed_secs(&self) -> f64 {
        let elapsed = self.clock.now() - self.started_at;
        (elapsed.num_milliseconds().max(0) as f64) / 1000.0
    }

    /// Count a failure and build its context
    pub fn record_failure(
        &mut self,
        stage: Stage,
        error_kind: &str,
        error_message: &str,
    ) -> FailureContext {
        let count = {
            let count = self
                .counts
                .entry((stage, error_kind.to_string()))
                .or_insert(0);
            *count += 1;
            *count
        };

        FailureContext::builder(stage, error_kind)
            .message(error_message)
            .failure_count(count)
            .elapsed_secs(self.elapsed_secs())
            .previous_interventions(self.interventions.iter().cloned())
            .build()
    }

    pub fn record_intervention(&mut self, kind: InterventionKind) {
        self.interventions.push(kind.as_str().to_string());
    }

    pub fn failure_count(&self, stage: Stage, error_kind: &str) -> u32 {
        self.counts
            .get(&(stage, error_kind.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn interventions(&self) -> &[String] {
        &self.interventions
    }

    pub fn total_failures(&self) -> u32 {
        self.counts.values().sum()
    }
}
