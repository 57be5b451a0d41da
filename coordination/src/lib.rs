//! CAKE Coordination Library
//!
//! Supervisor core for a seven-stage agent workflow:
//! - Stage sequencing: THINK → RESEARCH → REFLECT → DECIDE → EXECUTE → VALIDATE → SOLIDIFY, fail-fast
//! - Escalation policy: failure context → severity level, intervention and cooldown
//! - Message compliance: operator-facing text validated against a reference corpus
//!
//! # Usage
//!
//! ```no_run
//! use coordination::{EscalationEngine, FailureContext, Stage};
//!
//! let engine = EscalationEngine::with_defaults();
//! let ctx = FailureContext::builder(Stage::Execute, "Timeout")
//!     .failure_count(6)
//!     .build();
//! let decision = engine.decide(&ctx);
//! println!("{} → {}", decision.level, decision.intervention);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod clock;
pub mod compliance;
pub mod error;
pub mod escalation;
pub mod stages;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoordinationError, CoordinationResult};

// Re-export stage sequencing types
pub use stages::{
    FnStageHandler, Stage, StageContext, StageFailure, StageHandler, StageResult, StageSequencer,
    StageSummary, WorkflowRun,
};

// Re-export escalation types
pub use escalation::{
    ConfigFormat, EscalationConfig, EscalationDecision, EscalationEngine, EscalationLevel,
    EscalationStats, FailureContext, InterventionKind, LevelTrigger, SharedEscalationEngine,
};

// Re-export compliance types
pub use compliance::{
    ComplianceVerdict, MessageComplianceGate, NgramCosineScorer, ReferenceCorpus,
    SimilarityScorer,
};
