//! Stage Sequencer — Fixed seven-stage problem-solving workflow
//!
//! Drives an agent through the workflow one stage at a time, awaiting each
//! handler before moving on and halting at the first failure.
//!
//! # Workflow
//!
//! ```text
//! think → research → reflect → decide → execute → validate → solidify
//! ```
//!
//! Each successful stage publishes its output into the shared context under
//! `<stage>_output` so later stages can read it. A failed stage stops the run;
//! the caller decides whether to retry by consulting the escalation engine.
//!
//! # Usage
//!
//! ```rust,ignore
//! use coordination::stages::{FnStageHandler, Stage, StageSequencer};
//!
//! let mut sequencer = StageSequencer::new();
//! for stage in Stage::ALL {
//!     sequencer.register(stage, FnStageHandler::new(|_stage, _ctx| async {
//!         Ok(serde_json::json!({"done": true}))
//!     }));
//! }
//! let run = sequencer.run_workflow("fix the failing import", None).await?;
//! assert!(run.success);
//! ```

pub mod handler;
pub mod sequencer;
pub mod types;

pub use handler::{FnStageHandler, StageFailure, StageHandler, CANCELLED_KIND, UNSUCCESSFUL_KIND};
pub use sequencer::{StageSequencer, DEFAULT_HISTORY_LIMIT, TASK_DESCRIPTION_KEY};
pub use types::{Stage, StageContext, StageResult, StageSummary, WorkflowRun};
