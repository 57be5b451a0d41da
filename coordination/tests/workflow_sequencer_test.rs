//! Workflow sequencer integration tests — full seven-stage runs through the
//! public API.
//!
//! Tests verify:
//! - Stages run strictly in workflow order
//! - Each stage sees every earlier stage's output
//! - The first failure halts the run and is exposed verbatim
//! - Cancellation from another task interrupts the stage in flight

use coordination::stages::TASK_DESCRIPTION_KEY;
use coordination::{
    CoordinationError, FnStageHandler, Stage, StageContext, StageFailure, StageHandler,
    StageSequencer,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Handler that records which earlier outputs it could see
struct Probe {
    seen: Arc<Mutex<Vec<(Stage, Vec<String>)>>>,
}

#[async_trait::async_trait]
impl StageHandler for Probe {
    async fn handle(
        &self,
        stage: Stage,
        context: &StageContext,
        _cancel: &CancellationToken,
    ) -> Result<Value, StageFailure> {
        let mut keys: Vec<String> = context
            .keys()
            .filter(|k| k.ends_with("_output"))
            .cloned()
            .collect();
        keys.sort();
        self.seen.lock().unwrap().push((stage, keys));
        Ok(json!({ "stage": stage.as_str() }))
    }
}

fn probe_sequencer() -> (StageSequencer, Arc<Mutex<Vec<(Stage, Vec<String>)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut sequencer = StageSequencer::new();
    let shared: Arc<dyn StageHandler> = Arc::new(Probe { seen: seen.clone() });
    for stage in Stage::ALL {
        sequencer.register_shared(stage, shared.clone());
    }
    (sequencer, seen)
}

// ── Ordering and context accumulation ──────────────────────────────

#[tokio::test]
async fn test_full_run_accumulates_context_in_order() {
    let (mut sequencer, seen) = probe_sequencer();
    let run = sequencer
        .run_workflow("Fix the failing import in utils.py", None)
        .await
        .unwrap();

    assert!(run.success);
    assert_eq!(run.completed_stages(), Stage::ALL.to_vec());
    assert!(run.skipped_stages().is_empty());

    let seen = seen.lock().unwrap();
    let order: Vec<Stage> = seen.iter().map(|(s, _)| *s).collect();
    assert_eq!(order, Stage::ALL.to_vec());
    for (i, (_, keys)) in seen.iter().enumerate() {
        assert_eq!(keys.len(), i, "stage {} saw {:?}", order[i], keys);
    }

    assert_eq!(
        run.context[TASK_DESCRIPTION_KEY],
        json!("Fix the failing import in utils.py")
    );
    assert_eq!(run.context["solidify_output"], json!({ "stage": "solidify" }));
}

#[tokio::test]
async fn test_initial_context_is_visible_to_think() {
    let mut sequencer = StageSequencer::new();
    for stage in Stage::ALL {
        sequencer.register(
            stage,
            FnStageHandler::new(|stage, ctx: StageContext| async move {
                if stage == Stage::Think {
                    return Ok(ctx.get("repo").cloned().unwrap_or(Value::Null));
                }
                Ok(Value::Null)
            }),
        );
    }

    let mut initial = StageContext::new();
    initial.insert("repo".into(), json!("beefcake"));
    let run = sequencer.run_workflow("task", Some(initial)).await.unwrap();

    assert!(run.success);
    assert_eq!(run.context["think_output"], json!("beefcake"));
}

// ── Halting ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failure_in_validate_skips_solidify() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut sequencer = StageSequencer::new();
    for stage in Stage::ALL {
        let calls = calls.clone();
        sequencer.register(
            stage,
            FnStageHandler::new(move |stage, _ctx| {
                let calls = calls.clone();
                async move {
                    calls.lock().unwrap().push(stage);
                    if stage == Stage::Validate {
                        Err(StageFailure::error("AssertionError", "3 tests failed in test_utils.py"))
                    } else {
                        Ok(json!(true))
                    }
                }
            }),
        );
    }

    let run = sequencer.run_workflow("task", None).await.unwrap();

    assert!(!run.success);
    assert_eq!(run.failed_stage(), Some(Stage::Validate));
    assert_eq!(run.error(), Some("3 tests failed in test_utils.py"));
    assert_eq!(run.skipped_stages(), vec![Stage::Solidify]);
    assert!(!calls.lock().unwrap().contains(&Stage::Solidify));
    assert!(!run.context.contains_key("validate_output"));

    let history = sequencer.history();
    assert_eq!(history.len(), 6);
    assert!(!history.last().unwrap().success);
}

#[tokio::test]
async fn test_missing_handler_fails_before_any_stage_runs() {
    let (mut sequencer, seen) = probe_sequencer();
    let mut partial = StageSequencer::new();
    for stage in Stage::ALL.into_iter().filter(|s| *s != Stage::Reflect) {
        partial.register(stage, FnStageHandler::new(|_, _| async { Ok(Value::Null) }));
    }

    let err = partial.run_workflow("task", None).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinationError::MissingHandler {
            stage: Stage::Reflect
        }
    ));
    assert!(err.is_configuration());
    assert!(partial.history().is_empty());

    // A complete sequencer is unaffected
    assert!(sequencer.run_workflow("task", None).await.unwrap().success);
    assert_eq!(seen.lock().unwrap().len(), Stage::ALL.len());
}

// ── Cancellation ───────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_from_another_task_interrupts_execute() {
    let mut sequencer = StageSequencer::new();
    for stage in Stage::ALL {
        sequencer.register(
            stage,
            FnStageHandler::new(|stage, _ctx| async move {
                if stage == Stage::Execute {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok(Value::Null)
            }),
        );
    }

    let token = sequencer.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let run = tokio::time::timeout(
        Duration::from_secs(5),
        sequencer.run_workflow("task", None),
    )
    .await
    .expect("cancellation should interrupt the sleeping stage")
    .unwrap();

    assert!(!run.success);
    assert_eq!(run.failed_stage(), Some(Stage::Execute));
    assert_eq!(
        run.failure().and_then(|r| r.error_kind.as_deref()),
        Some("Cancelled")
    );

    sequencer.reset();
    assert!(sequencer.current_stage().is_none());
    assert!(!sequencer.cancellation_token().is_cancelled());
}
