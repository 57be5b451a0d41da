//! Escalation Policy Engine — Deterministic failure classification and rate limiting
//!
//! Turns a failure description into a severity level, an intervention and a
//! cooldown. This is a pure policy layer with no I/O and no model calls.
//!
//! # Decision Pipeline
//!
//! ```text
//! FailureContext
//!     │
//!     ├─ error kind contains a critical identifier → CRITICAL / EMERGENCY_STOP
//!     ├─ live cooldown for (stage, error kind)     → NONE / AUTO_RETRY (not logged)
//!     │
//!     ▼
//! Level: failure count ≥ critical/high/medium/low threshold
//!        else elapsed time ≥ critical/high/medium threshold
//!        else message contains a high-priority pattern → HIGH
//!        else LOW
//!     │
//!     ▼
//! Intervention: CRITICAL → HUMAN_REVIEW
//!               HIGH     → STRATEGY_CHANGE (count > 5) | RESOURCE_INCREASE
//!               MEDIUM   → STRATEGY_CHANGE (context already adjusted) | CONTEXT_ADJUSTMENT
//!               LOW      → AUTO_RETRY
//!     │
//!     ▼
//! Record in history, arm cooldown for (stage, error kind)
//! ```

pub mod config;
pub mod context;
pub mod cooldown;
pub mod decision;
pub mod engine;
pub mod history;

pub use config::{
    ConfigFormat, EscalationConfig, EscalationThresholds, FailureCountThresholds,
    TimeElapsedThresholds,
};
pub use context::{FailureContext, FailureContextBuilder};
pub use cooldown::{CooldownKey, CooldownTable};
pub use decision::{
    EscalationDecision, EscalationLevel, HistoryEntry, InterventionKind, LevelTrigger,
};
pub use engine::{EscalationEngine, SharedEscalationEngine};
pub use history::{EscalationHistory, EscalationStats};
