//! Escalation decision types — severity levels, interventions and the rule that fired

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered severity classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl EscalationLevel {
    pub const ALL: [EscalationLevel; 5] = [
        EscalationLevel::None,
        EscalationLevel::Low,
        EscalationLevel::Medium,
        EscalationLevel::High,
        EscalationLevel::Critical,
    ];
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Category of corrective action chosen for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// Let the agent try the same step again
    AutoRetry,
    /// Feed the agent corrected or additional context
    ContextAdjustment,
    /// Raise time or resource limits for the step
    ResourceIncrease,
    /// Abandon the current approach for another one
    StrategyChange,
    /// Pause and hand the failure to a human
    HumanReview,
    /// Halt everything immediately
    EmergencyStop,
}

impl InterventionKind {
    pub const ALL: [InterventionKind; 6] = [
        InterventionKind::AutoRetry,
        InterventionKind::ContextAdjustment,
        InterventionKind::ResourceIncrease,
        InterventionKind::StrategyChange,
        InterventionKind::HumanReview,
        InterventionKind::EmergencyStop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoRetry => "auto_retry",
            Self::ContextAdjustment => "context_adjustment",
            Self::ResourceIncrease => "resource_increase",
            Self::StrategyChange => "strategy_change",
            Self::HumanReview => "human_review",
            Self::EmergencyStop => "emergency_stop",
        }
    }

    /// Default recommended actions, phrased as imperative sentences
    pub fn recommended_actions(&self) -> Vec<String> {
        let actions: &[&str] = match self {
            Self::AutoRetry => &["Retry the failed step", "Check the error output"],
            Self::ContextAdjustment => &[
                "Review the task context",
                "Retry with the adjusted context",
                "Add missing details to the context",
            ],
            Self::ResourceIncrease => &[
                "Increase the timeout or resource limits",
                "Retry the failed step",
            ],
            Self::StrategyChange => &[
                "Try an alternative strategy",
                "Review earlier failures",
                "Stop repeating the failing approach",
            ],
            Self::HumanReview => &[
                "Request human review",
                "Preserve the failure context",
                "Pause the workflow",
            ],
            Self::EmergencyStop => &[
                "Halt all agent operations",
                "Preserve current state",
                "Notify the operator",
                "Report the incident",
            ],
        };
        actions.iter().map(|a| a.to_string()).collect()
    }

    /// Whether an orchestrator may act on this intervention without a human
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Self::HumanReview | Self::EmergencyStop)
    }
}

impl std::fmt::Display for InterventionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InterventionKind {
    type Err = crate::error::CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == needle)
            .ok_or_else(|| {
                crate::error::CoordinationError::invalid_input(format!(
                    "unknown intervention kind '{s}'"
                ))
            })
    }
}

/// Rule in the decision pipeline that produced the level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum LevelTrigger {
    /// Error kind contained a configured critical identifier
    CriticalError { identifier: String },
    /// A live cooldown suppressed escalation for this signature
    Cooldown { remaining_secs: f64 },
    /// Failure count reached a level threshold
    FailureCount { count: u32, threshold: u32 },
    /// Time since task start reached a level threshold
    TimeElapsed { elapsed_secs: f64, threshold_secs: f64 },
    /// Error message contained a high-priority substring
    HighPriorityPattern { pattern: String },
    /// No rule fired
    Default,
}

impl std::fmt::Display for LevelTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CriticalError { identifier } => {
                write!(f, "error kind matches critical identifier '{}'", identifier)
            }
            Self::Cooldown { remaining_secs } => {
                write!(f, "cooldown active ({:.1}s remaining)", remaining_secs)
            }
            Self::FailureCount { count, threshold } => {
                write!(f, "{} failures (threshold: {})", count, threshold)
            }
            Self::TimeElapsed {
                elapsed_secs,
                threshold_secs,
            } => write!(
                f,
                "{:.0}s since task start (threshold: {:.0}s)",
                elapsed_secs, threshold_secs
            ),
            Self::HighPriorityPattern { pattern } => {
                write!(f, "error message matches high-priority pattern '{}'", pattern)
            }
            Self::Default => write!(f, "no escalation rule fired"),
        }
    }
}

/// Decision produced by the escalation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub level: EscalationLevel,
    pub intervention: InterventionKind,
    /// Human-readable explanation, always present
    pub reason: String,
    /// Confidence in the decision
    pub confidence: f64,
    pub recommended_actions: Vec<String>,
    /// Seconds during which the same (stage, error kind) will not escalate again
    pub cooldown_seconds: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EscalationDecision {
    /// Whether this decision was a cooldown suppression rather than a fresh escalation
    pub fn is_suppressed(&self) -> bool {
        self.level == EscalationLevel::None
    }
}

/// One appended history record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub decision: EscalationDecision,
}
