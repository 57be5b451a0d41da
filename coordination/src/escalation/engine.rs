//! Escalation Engine — Deterministic decision-making for failure interventions
//!
//! Consumes a `FailureContext` and produces an `EscalationDecision`.
//! All decisions are deterministic given the config, the clock and the
//! cooldown table.
//!
//! Two paths reach the critical level and they intentionally pick different
//! interventions: a critical error identifier stops everything
//! (`EmergencyStop`), while a critical failure count or elapsed time asks for
//! a human (`HumanReview`).

use crate::clock::{Clock, SystemClock};
use crate::error::CoordinationResult;
use crate::escalation::config::EscalationConfig;
use crate::escalation::context::FailureContext;
use crate::escalation::cooldown::{CooldownKey, CooldownTable};
use crate::escalation::decision::{
    EscalationDecision, EscalationLevel, HistoryEntry, InterventionKind, LevelTrigger,
};
use crate::escalation::history::{EscalationHistory, EscalationStats};
use crate::stages::Stage;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};

/// Confidence before adjustments
pub const BASE_CONFIDENCE: f64 = 0.7;

/// Upper bound for computed confidence
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Confidence reported for cooldown-suppressed decisions
pub const SUPPRESSED_CONFIDENCE: f64 = 0.9;

/// Confidence reported for critical error identifiers
pub const CRITICAL_ERROR_CONFIDENCE: f64 = 1.0;

/// Engine shared between concurrently supervised tasks
pub type SharedEscalationEngine = Arc<EscalationEngine>;

#[derive(Debug)]
struct EngineState {
    cooldowns: CooldownTable,
    history: EscalationHistory,
}

/// The Escalation Engine — classifies failures and rate-limits escalation.
///
/// Every mutation happens under one mutex, so a shared engine never loses a
/// history append or a cooldown update.
#[derive(Debug)]
pub struct EscalationEngine {
    config: EscalationConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
}

impl EscalationEngine {
    /// Create an engine with a validated config
    pub fn new(config: EscalationConfig) -> CoordinationResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine reading time from `clock`
    pub fn with_clock(config: EscalationConfig, clock: Arc<dyn Clock>) -> CoordinationResult<Self> {
        config.validate()?;
        let history = EscalationHistory::new(config.history_limit);
        Ok(Self {
            config,
            clock,
            state: Mutex::new(EngineState {
                cooldowns: CooldownTable::new(),
                history,
            }),
        })
    }

    /// Create an engine with the default config
    pub fn with_defaults() -> Self {
        let config = EscalationConfig::default();
        Self {
            state: Mutex::new(EngineState {
                cooldowns: CooldownTable::new(),
                history: EscalationHistory::new(config.history_limit),
            }),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Wrap in an `Arc` for sharing between tasks
    pub fn shared(self) -> SharedEscalationEngine {
        Arc::new(self)
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// Decide how to respond to a failure.
    ///
    /// Pipeline: critical identifier → live cooldown → level → intervention →
    /// confidence → cooldown period → record. Never fails; falls back to
    /// LOW / AUTO_RETRY when no rule fires.
    pub fn decide(&self, context: &FailureContext) -> EscalationDecision {
        let now = self.clock.now();
        let mut state = self.lock();
        state.cooldowns.sweep(now);

        // Step 1: critical error identifiers bypass everything else
        if let Some(identifier) = self
            .config
            .critical_errors
            .iter()
            .find(|id| context.error_kind.contains(id.as_str()))
        {
            let trigger = LevelTrigger::CriticalError {
                identifier: identifier.clone(),
            };
            let decision = EscalationDecision {
                level: EscalationLevel::Critical,
                intervention: InterventionKind::EmergencyStop,
                reason: format!("Critical error in {}: {}", context.stage, trigger),
                confidence: CRITICAL_ERROR_CONFIDENCE,
                recommended_actions: InterventionKind::EmergencyStop.recommended_actions(),
                cooldown_seconds: 0.0,
                metadata: self.metadata(context, &trigger),
            };
            tracing::error!(
                stage = %context.stage,
                error_kind = %context.error_kind,
                identifier = %identifier,
                "Critical error, emergency stop"
            );
            state.history.append(now, decision.clone());
            return decision;
        }

        // Step 2: live cooldown for this signature suppresses escalation
        let key = CooldownKey::new(context.stage, context.error_kind.clone());
        if let Some(remaining) = state.cooldowns.remaining(&key, now) {
            let trigger = LevelTrigger::Cooldown {
                remaining_secs: remaining,
            };
            tracing::debug!(key = %key, remaining_secs = remaining, "Escalation suppressed by cooldown");
            state.history.note_suppressed();
            return EscalationDecision {
                level: EscalationLevel::None,
                intervention: InterventionKind::AutoRetry,
                reason: format!("Escalation for {} suppressed: {}", key, trigger),
                confidence: SUPPRESSED_CONFIDENCE,
                recommended_actions: InterventionKind::AutoRetry.recommended_actions(),
                cooldown_seconds: remaining,
                metadata: self.metadata(context, &trigger),
            };
        }

        // Steps 3-6
        let (level, trigger) = self.determine_level(context);
        let intervention = Self::select_intervention(level, context);
        let confidence = Self::confidence(context);
        let cooldown_seconds = self.config.cooldown_for(intervention);

        let decision = EscalationDecision {
            level,
            intervention,
            reason: format!("{} escalation in {}: {}", level, context.stage, trigger),
            confidence,
            recommended_actions: intervention.recommended_actions(),
            cooldown_seconds,
            metadata: self.metadata(context, &trigger),
        };

        tracing::info!(
            stage = %context.stage,
            error_kind = %context.error_kind,
            level = %level,
            intervention = %intervention,
            confidence,
            cooldown_secs = cooldown_seconds,
            "Escalation decision"
        );

        // Step 7: record, then arm the cooldown
        state.history.append(now, decision.clone());
        if cooldown_seconds > 0.0 {
            state.cooldowns.start(key, now, cooldown_seconds);
        }

        decision
    }

    /// Failure count first, then elapsed time, then message patterns.
    fn determine_level(&self, context: &FailureContext) -> (EscalationLevel, LevelTrigger) {
        let fc = &self.config.escalation_thresholds.failure_count;
        let count = context.failure_count;
        for (level, threshold) in [
            (EscalationLevel::Critical, fc.critical),
            (EscalationLevel::High, fc.high),
            (EscalationLevel::Medium, fc.medium),
            (EscalationLevel::Low, fc.low),
        ] {
            if count >= threshold {
                return (level, LevelTrigger::FailureCount { count, threshold });
            }
        }

        let te = &self.config.escalation_thresholds.time_elapsed;
        let elapsed = context.time_since_start;
        for (level, threshold) in [
            (EscalationLevel::Critical, te.critical),
            (EscalationLevel::High, te.high),
            (EscalationLevel::Medium, te.medium),
        ] {
            if elapsed >= threshold {
                return (
                    level,
                    LevelTrigger::TimeElapsed {
                        elapsed_secs: elapsed,
                        threshold_secs: threshold,
                    },
                );
            }
        }

        let message = context.error_message.to_lowercase();
        if let Some(pattern) = self
            .config
            .high_priority_patterns
            .iter()
            .find(|p| message.contains(&p.to_lowercase()))
        {
            return (
                EscalationLevel::High,
                LevelTrigger::HighPriorityPattern {
                    pattern: pattern.clone(),
                },
            );
        }

        (EscalationLevel::Low, LevelTrigger::Default)
    }

    fn select_intervention(level: EscalationLevel, context: &FailureContext) -> InterventionKind {
        match level {
            EscalationLevel::Critical => InterventionKind::HumanReview,
            EscalationLevel::High if context.failure_count > 5 => InterventionKind::StrategyChange,
            EscalationLevel::High => InterventionKind::ResourceIncrease,
            EscalationLevel::Medium if context.has_previous_intervention("context") => {
                InterventionKind::StrategyChange
            }
            EscalationLevel::Medium => InterventionKind::ContextAdjustment,
            EscalationLevel::Low | EscalationLevel::None => InterventionKind::AutoRetry,
        }
    }

    fn confidence(context: &FailureContext) -> f64 {
        let mut confidence = BASE_CONFIDENCE;
        if context.failure_count > 5 {
            confidence += 0.2;
        } else if context.failure_count > 2 {
            confidence += 0.1;
        }
        if context.previous_interventions.len() > 2 {
            confidence += 0.1;
        }
        confidence.min(MAX_CONFIDENCE)
    }

    fn metadata(
        &self,
        context: &FailureContext,
        trigger: &LevelTrigger,
    ) -> serde_json::Map<String, Value> {
        let mut metadata = serde_json::Map::new();
        metadata.insert("stage".into(), json!(context.stage));
        metadata.insert("error_kind".into(), json!(context.error_kind));
        metadata.insert("failure_count".into(), json!(context.failure_count));
        metadata.insert("max_retries".into(), json!(self.config.max_retries));
        metadata.insert(
            "retries_exhausted".into(),
            json!(context.failure_count >= self.config.max_retries),
        );
        metadata.insert(
            "trigger".into(),
            serde_json::to_value(trigger).unwrap_or(Value::Null),
        );
        metadata
    }

    /// Counts by level and intervention plus the five most recent entries.
    /// Read-only: takes the lock for a consistent snapshot but mutates nothing.
    pub fn stats(&self) -> EscalationStats {
        let now = self.clock.now();
        let state = self.lock();
        state.history.stats(state.cooldowns.active(now))
    }

    /// Full retained history, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().history.entries()
    }

    /// Seconds left on the cooldown for a signature, if one is live
    pub fn cooldown_remaining(&self, stage: Stage, error_kind: &str) -> Option<f64> {
        let now = self.clock.now();
        self.lock()
            .cooldowns
            .remaining(&CooldownKey::new(stage, error_kind), now)
    }

    pub fn clear_cooldowns(&self) {
        self.lock().cooldowns.clear();
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EscalationEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
