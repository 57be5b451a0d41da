//! Stage Sequencer — executes the workflow stage by stage
//!
//! Stages run strictly one after another. A handler `Err` becomes a failed
//! `StageResult` and stops the run; the sequencer itself only returns an
//! error for configuration problems (a stage with no handler).

use crate::error::{CoordinationError, CoordinationResult};
use crate::stages::handler::{StageFailure, StageHandler};
use crate::stages::types::{Stage, StageContext, StageResult, StageSummary, WorkflowRun};
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Stage results retained for `history()` by default (a little over nine full runs)
pub const DEFAULT_HISTORY_LIMIT: usize = 64;

/// Context key holding the task description for every stage
pub const TASK_DESCRIPTION_KEY: &str = "task_description";

pub struct StageSequencer {
    handlers: HashMap<Stage, Arc<dyn StageHandler>>,
    history: VecDeque<StageResult>,
    history_limit: usize,
    current_stage: Option<Stage>,
    cancel: CancellationToken,
}

impl StageSequencer {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            current_stage: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Keep at most `limit` stage results in history (minimum 1)
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Bind a handler to a stage, returning the handler it replaced
    pub fn register(
        &mut self,
        stage: Stage,
        handler: impl StageHandler + 'static,
    ) -> Option<Arc<dyn StageHandler>> {
        self.register_shared(stage, Arc::new(handler))
    }

    /// Bind an already shared handler to a stage
    pub fn register_shared(
        &mut self,
        stage: Stage,
        handler: Arc<dyn StageHandler>,
    ) -> Option<Arc<dyn StageHandler>> {
        let previous = self.handlers.insert(stage, handler);
        if previous.is_some() {
            tracing::debug!(stage = %stage, "Replaced stage handler");
        }
        previous
    }

    pub fn is_registered(&self, stage: Stage) -> bool {
        self.handlers.contains_key(&stage)
    }

    /// Stages that still have no handler, in workflow order
    pub fn missing_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| !self.handlers.contains_key(s))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_stages().is_empty()
    }

    /// Token that interrupts the stage in flight and prevents further stages
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stage currently running, or the last one attempted
    pub fn current_stage(&self) -> Option<Stage> {
        self.current_stage
    }

    /// Invoke the handler for one stage.
    ///
    /// Handler failures and cancellation are returned as a failed
    /// `StageResult`; only a missing registration is an `Err`.
    pub async fn run_stage(
        &mut self,
        stage: Stage,
        context: &StageContext,
    ) -> CoordinationResult<StageResult> {
        let handler = self
            .handlers
            .get(&stage)
            .cloned()
            .ok_or(CoordinationError::MissingHandler { stage })?;

        self.current_stage = Some(stage);
        let start = Instant::now();

        let outcome = if self.cancel.is_cancelled() {
            Err(StageFailure::Cancelled)
        } else {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(StageFailure::Cancelled),
                res = handler.handle(stage, context, &self.cancel) => res,
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(output) => {
                tracing::info!(stage = %stage, duration_ms, "Stage succeeded");
                StageResult::succeeded(stage, output, duration_ms)
            }
            Err(failure) => {
                tracing::warn!(
                    stage = %stage,
                    duration_ms,
                    kind = failure.kind(),
                    error = %failure.message(),
                    "Stage failed"
                );
                let output = match &failure {
                    StageFailure::Unsuccessful { output, .. } => output.clone(),
                    _ => Value::Null,
                };
                StageResult::failed(
                    stage,
                    failure.kind(),
                    failure.message(),
                    output,
                    duration_ms,
                )
            }
        };

        self.record(result.clone());
        Ok(result)
    }

    /// Run all seven stages in order for a task.
    ///
    /// Every stage must have a handler before anything runs. The run halts
    /// at the first failed stage; later stages are never invoked.
    pub async fn run_workflow(
        &mut self,
        task_description: &str,
        initial_context: Option<StageContext>,
    ) -> CoordinationResult<WorkflowRun> {
        if let Some(stage) = self.missing_stages().into_iter().next() {
            return Err(CoordinationError::MissingHandler { stage });
        }
        if task_description.trim().is_empty() {
            return Err(CoordinationError::invalid_input(
                "task description must not be empty",
            ));
        }

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut context = initial_context.unwrap_or_default();
        context.insert(
            TASK_DESCRIPTION_KEY.to_string(),
            Value::String(task_description.to_string()),
        );

        tracing::info!(run_id = %id, task = task_description, "Starting workflow");

        let mut results = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let result = self.run_stage(stage, &context).await?;
            let succeeded = result.success;
            if succeeded {
                context.insert(stage.context_key(), result.output.clone());
            }
            results.push(result);
            if !succeeded {
                break;
            }
        }

        let success = results.len() == Stage::ALL.len() && results.iter().all(|r| r.success);
        let run = WorkflowRun {
            id,
            task_description: task_description.to_string(),
            results,
            context,
            success,
            started_at,
            finished_at: Utc::now(),
        };

        match run.failed_stage() {
            None => tracing::info!(run_id = %id, duration_ms = run.duration_ms(), "Workflow completed"),
            Some(stage) => tracing::warn!(
                run_id = %id,
                stage = %stage,
                error = run.error().unwrap_or_default(),
                "Workflow halted"
            ),
        }

        Ok(run)
    }

    /// Summaries of the most recent stage outcomes, oldest first
    pub fn history(&self) -> Vec<StageSummary> {
        self.history.iter().map(StageResult::summary).collect()
    }

    /// Clear history and the current-stage pointer.
    ///
    /// A token that has already fired is replaced so the sequencer can run again.
    pub fn reset(&mut self) {
        self.history.clear();
        self.current_stage = None;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }

    fn record(&mut self, result: StageResult) {
        self.history.push_back(result);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}

impl Default for StageSequencer {
    fn default() -> Self {
        Self::new()
    }
}
