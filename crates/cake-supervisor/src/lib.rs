//! CAKE supervisor — reference orchestrator for the coordination core
//!
//! Wires the stage sequencer, the escalation engine and the compliance gate
//! into a retry loop:
//! - `classifier`: raw error text → error kind
//! - `tracker`: per-task failure counts and applied interventions
//! - `renderer`: escalation decision → operator message
//! - `command`: stage handler backed by a shell command
//! - `supervisor`: the loop itself

pub mod classifier;
pub mod command;
pub mod config;
pub mod renderer;
pub mod supervisor;
pub mod tracker;

pub use classifier::ErrorClassifier;
pub use command::CommandStageHandler;
pub use config::{StageCommand, SupervisorConfig};
pub use renderer::InterventionRenderer;
pub use supervisor::{
    AttemptRecord, SupervisionOutcome, SupervisionReport, Supervisor, OPERATOR_GUIDANCE_KEY,
};
pub use tracker::FailureTracker;
