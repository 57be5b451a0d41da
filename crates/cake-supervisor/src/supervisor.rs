//! Supervisor — composes the sequencer, escalation engine and compliance gate
//!
//! ```text
//! attempt ─→ run_workflow ─ success ──────────────────────────→ Completed
//!               │
//!               └ failure ─→ classify ─→ decide ─→ render ─→ gate
//!                                          │                   │
//!                          manual intervention → Escalated     └→ operator_guidance
//!                          attempts left      → next attempt ←──┘
//!                          otherwise          → Exhausted
//! ```
//!
//! Guidance that fails the compliance gate is never delivered; the attempt
//! record keeps the rejecting verdict instead.

use crate::classifier::ErrorClassifier;
use crate::command::CommandStageHandler;
use crate::config::SupervisorConfig;
use crate::renderer::InterventionRenderer;
use crate::tracker::FailureTracker;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use coordination::stages::CANCELLED_KIND;
use coordination::{
    Clock, ComplianceVerdict, CoordinationResult, EscalationDecision, EscalationEngine,
    EscalationStats, InterventionKind, MessageComplianceGate, NgramCosineScorer,
    SharedEscalationEngine, Stage, StageContext, StageSequencer, SystemClock,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Context key carrying gated operator guidance into the next attempt
pub const OPERATOR_GUIDANCE_KEY: &str = "operator_guidance";

/// Context key carrying the 1-based attempt number
pub const ATTEMPT_KEY: &str = "attempt";

/// Context key carrying the previous attempt's failure
pub const PREVIOUS_FAILURE_KEY: &str = "previous_failure";

/// How a supervised task ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SupervisionOutcome {
    /// Every stage succeeded
    Completed,
    /// A manual intervention was chosen; a human has to act
    Escalated { intervention: InterventionKind },
    /// Automatic interventions used up every attempt
    Exhausted,
    /// The run was cancelled
    Cancelled,
}

impl SupervisionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for SupervisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Escalated { intervention } => write!(f, "escalated ({intervention})"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One workflow attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub run_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Kind assigned by the classifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<EscalationDecision>,
    /// Guidance delivered to the next attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    /// Verdict for rendered guidance the gate rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_guidance: Option<ComplianceVerdict>,
    pub duration_ms: u64,
}

/// Serializable result of `Supervisor::supervise`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionReport {
    pub task: String,
    pub outcome: SupervisionOutcome,
    pub attempts: Vec<AttemptRecord>,
    /// Context of the last attempt
    pub context: StageContext,
    pub escalation: EscalationStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Supervisor {
    sequencer: StageSequencer,
    engine: SharedEscalationEngine,
    gate: Arc<MessageComplianceGate>,
    classifier: ErrorClassifier,
    renderer: InterventionRenderer,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl Supervisor {
    pub fn new(
        sequencer: StageSequencer,
        engine: SharedEscalationEngine,
        gate: Arc<MessageComplianceGate>,
    ) -> Self {
        let max_attempts = engine.config().max_retries.saturating_add(1);
        Self {
            sequencer,
            engine,
            gate,
            classifier: ErrorClassifier::new(),
            renderer: InterventionRenderer::new(),
            clock: Arc::new(SystemClock),
            max_attempts,
        }
    }

    /// Build a command-backed supervisor from config.
    ///
    /// Every stage must have a command.
    pub fn from_config(config: &SupervisorConfig) -> Result<Self> {
        let missing = config.missing_stages();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(Stage::as_str).collect();
            anyhow::bail!("No command configured for stage(s): {}", names.join(", "));
        }

        let mut sequencer = StageSequencer::new();
        for (stage, command) in &config.stages {
            sequencer.register(*stage, CommandStageHandler::new(command.clone()));
        }

        let engine = EscalationEngine::new(config.escalation.clone())
            .context("Invalid escalation config")?
            .shared();

        let gate = MessageComplianceGate::new(NgramCosineScorer::default());
        if let Some(path) = &config.corpus {
            gate.load_reference_corpus_from_path(path)
                .with_context(|| format!("Failed to load corpus {}", path.display()))?;
        }

        Ok(Self::new(sequencer, engine, Arc::new(gate)).with_max_attempts(config.attempts()))
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn engine(&self) -> &SharedEscalationEngine {
        &self.engine
    }

    pub fn gate(&self) -> &Arc<MessageComplianceGate> {
        &self.gate
    }

    /// Token that cancels the workflow in flight
    pub fn cancellation_token(&self) -> CancellationToken {
        self.sequencer.cancellation_token()
    }

    /// Drive a task through the workflow until it succeeds, needs a human,
    /// runs out of attempts or is cancelled.
    ///
    /// Only configuration errors (e.g. a missing stage handler) are `Err`.
    pub async fn supervise(&mut self, task: &str) -> CoordinationResult<SupervisionReport> {
        let started_at = self.clock.now();
        let mut tracker = FailureTracker::new(self.clock.clone());
        let mut attempts = Vec::new();
        let mut context = StageContext::new();
        let mut outcome = SupervisionOutcome::Exhausted;

        tracing::info!(task, max_attempts = self.max_attempts, "Supervising task");

        for attempt in 1..=self.max_attempts {
            context.insert(ATTEMPT_KEY.into(), json!(attempt));
            let run = self.sequencer.run_workflow(task, Some(context.clone())).await?;

            let mut record = AttemptRecord {
                attempt,
                run_id: run.id,
                success: run.success,
                failed_stage: run.failed_stage(),
                error: run.error().map(str::to_string),
                error_kind: None,
                decision: None,
                guidance: None,
                rejected_guidance: None,
                duration_ms: run.duration_ms(),
            };

            let Some(failure) = run.failure() else {
                attempts.push(record);
                context = run.context;
                outcome = SupervisionOutcome::Completed;
                break;
            };

            if failure.error_kind.as_deref() == Some(CANCELLED_KIND) {
                record.error_kind = Some(CANCELLED_KIND.to_string());
                attempts.push(record);
                context = run.context;
                outcome = SupervisionOutcome::Cancelled;
                break;
            }

            let error_text = failure.error.clone().unwrap_or_default();
            let kind = self
                .classifier
                .classify(&error_text, failure.error_kind.as_deref());
            let failure_ctx = tracker.record_failure(failure.stage, &kind, &error_text);
            let decision = self.engine.decide(&failure_ctx);
            if !decision.is_suppressed() {
                tracker.record_intervention(decision.intervention);
            }

            let message = self.renderer.render(&decision);
            let verdict = self.gate.validate(&message);
            if verdict.passed {
                record.guidance = Some(message);
            } else {
                tracing::warn!(
                    reason = %verdict.reason,
                    "Rendered guidance failed compliance, not delivered"
                );
                record.rejected_guidance = Some(verdict);
            }

            tracing::info!(
                attempt,
                stage = %failure.stage,
                error_kind = %kind,
                level = %decision.level,
                intervention = %decision.intervention,
                "Attempt failed"
            );

            let automatic = decision.intervention.is_automatic();
            let intervention = decision.intervention;
            context = next_context(&record, failure.stage, &kind, &error_text);
            record.error_kind = Some(kind);
            record.decision = Some(decision);
            attempts.push(record);

            if !automatic {
                outcome = SupervisionOutcome::Escalated { intervention };
                break;
            }
        }

        let report = SupervisionReport {
            task: task.to_string(),
            outcome,
            attempts,
            context,
            escalation: self.engine.stats(),
            started_at,
            finished_at: self.clock.now(),
        };
        tracing::info!(
            outcome = %report.outcome,
            attempts = report.attempts.len(),
            "Supervision finished"
        );
        Ok(report)
    }
}

/// Starting context for the attempt after a failure
fn next_context(record: &AttemptRecord, stage: Stage, kind: &str, error: &str) -> StageContext {
    let mut context = StageContext::new();
    if let Some(guidance) = &record.guidance {
        context.insert(OPERATOR_GUIDANCE_KEY.into(), Value::String(guidance.clone()));
    }
    context.insert(
        PREVIOUS_FAILURE_KEY.into(),
        json!({ "stage": stage, "error_kind": kind, "error": error }),
    );
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::{FnStageHandler, StageFailure};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn supervisor_with(fail_times: u32, kind: &'static str, message: &'static str) -> Supervisor {
        let failures = Arc::new(AtomicU32::new(0));
        let mut sequencer = StageSequencer::new();
        for stage in Stage::ALL {
            let failures = failures.clone();
            sequencer.register(
                stage,
                FnStageHandler::new(move |stage, ctx: StageContext| {
                    let failures = failures.clone();
                    async move {
                        if stage == Stage::Execute
                            && failures.fetch_add(1, Ordering::SeqCst) < fail_times
                        {
                            return Err(StageFailure::error(kind, message));
                        }
                        Ok(ctx.get(OPERATOR_GUIDANCE_KEY).cloned().unwrap_or(Value::Null))
                    }
                }),
            );
        }
        Supervisor::new(
            sequencer,
            EscalationEngine::with_defaults().shared(),
            Arc::new(MessageComplianceGate::new(NgramCosineScorer::default())),
        )
    }

    #[tokio::test]
    async fn test_clean_run_completes_first_attempt() {
        let mut sup = supervisor_with(0, "", "");
        let report = sup.supervise("task").await.unwrap();
        assert_eq!(report.outcome, SupervisionOutcome::Completed);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.escalation.total_decisions, 0);
    }

    #[tokio::test]
    async fn test_retry_delivers_guidance() {
        let mut sup = supervisor_with(1, "CommandFailed", "No module named 'numpy'");
        let report = sup.supervise("task").await.unwrap();

        assert_eq!(report.outcome, SupervisionOutcome::Completed);
        assert_eq!(report.attempts.len(), 2);

        let first = &report.attempts[0];
        assert_eq!(first.error_kind.as_deref(), Some("ImportError"));
        let decision = first.decision.as_ref().unwrap();
        assert_eq!(decision.intervention, InterventionKind::AutoRetry);
        let guidance = first.guidance.as_deref().unwrap();
        assert_eq!(
            guidance,
            "Operator (CAKE): Retry the failed step. Check the error output."
        );

        // The second attempt saw the guidance
        assert_eq!(report.context["execute_output"], json!(guidance));
        assert_eq!(report.context[ATTEMPT_KEY], json!(2));
    }

    #[tokio::test]
    async fn test_critical_error_escalates_immediately() {
        let mut sup = supervisor_with(10, "IoError", "write failed: No space left on device");
        let report = sup.supervise("task").await.unwrap();

        assert_eq!(
            report.outcome,
            SupervisionOutcome::Escalated {
                intervention: InterventionKind::EmergencyStop
            }
        );
        assert_eq!(report.attempts.len(), 1);
        assert!(report.attempts[0]
            .guidance
            .as_deref()
            .unwrap()
            .starts_with("Operator (CAKE): Halt"));
    }

    #[tokio::test]
    async fn test_persistent_failure_exhausts_attempts() {
        let mut sup = supervisor_with(10, "ValueError", "bad value").with_max_attempts(2);
        let report = sup.supervise("task").await.unwrap();
        assert_eq!(report.outcome, SupervisionOutcome::Exhausted);
        assert_eq!(report.attempts.len(), 2);
        // Second identical failure lands inside the first AUTO_RETRY cooldown
        let second = report.attempts[1].decision.as_ref().unwrap();
        assert!(second.is_suppressed());
        assert_eq!(report.escalation.suppressed_decisions, 1);
    }
}
