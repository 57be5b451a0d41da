//! Stage types — workflow stages, per-stage results and whole-run records

use crate::error::CoordinationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Shared context threaded through a workflow run
pub type StageContext = serde_json::Map<String, Value>;

/// One step of the fixed workflow, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Think,
    Research,
    Reflect,
    Decide,
    Execute,
    Validate,
    Solidify,
}

impl Stage {
    /// All stages in the only order they are ever executed
    pub const ALL: [Stage; 7] = [
        Stage::Think,
        Stage::Research,
        Stage::Reflect,
        Stage::Decide,
        Stage::Execute,
        Stage::Validate,
        Stage::Solidify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Think => "think",
            Self::Research => "research",
            Self::Reflect => "reflect",
            Self::Decide => "decide",
            Self::Execute => "execute",
            Self::Validate => "validate",
            Self::Solidify => "solidify",
        }
    }

    /// Key under which this stage's output is merged into the shared context
    pub fn context_key(&self) -> String {
        format!("{}_output", self.as_str())
    }

    /// Zero-based position in the workflow
    pub fn position(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or(Self::ALL.len())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == needle)
            .ok_or_else(|| CoordinationError::invalid_input(format!("unknown stage '{s}'")))
    }
}

/// Outcome of a single stage invocation. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    /// Handler output (null when the handler failed without one)
    pub output: Value,
    /// Error text exactly as the handler reported it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error classification reported by the handler (e.g. "Cancelled")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl StageResult {
    pub fn succeeded(stage: Stage, output: Value, duration_ms: u64) -> Self {
        Self {
            stage,
            success: true,
            output,
            error: None,
            error_kind: None,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        stage: Stage,
        error_kind: impl Into<String>,
        error: impl Into<String>,
        output: Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            stage,
            success: false,
            output,
            error: Some(error.into()),
            error_kind: Some(error_kind.into()),
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn summary(&self) -> StageSummary {
        StageSummary {
            stage: self.stage,
            success: self.success,
            duration_ms: self.duration_ms,
            error: self.error.clone(),
        }
    }
}

/// Read-only digest of a stage outcome, exported for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record of one task driven through the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub task_description: String,
    /// Results of every attempted stage, in execution order
    pub results: Vec<StageResult>,
    /// Context after the last successful stage
    pub context: StageContext,
    /// True only when all seven stages ran and succeeded
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// The stage that halted the run, if any
    pub fn failed_stage(&self) -> Option<Stage> {
        self.results.iter().find(|r| !r.success).map(|r| r.stage)
    }

    /// Error text of the halting stage, verbatim
    pub fn error(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|r| !r.success)
            .and_then(|r| r.error.as_deref())
    }

    /// Result of the halting stage, if any
    pub fn failure(&self) -> Option<&StageResult> {
        self.results.iter().find(|r| !r.success)
    }

    pub fn completed_stages(&self) -> Vec<Stage> {
        self.results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.stage)
            .collect()
    }

    /// Stages never invoked because the run halted early
    pub fn skipped_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .skip(self.results.len())
            .collect()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
