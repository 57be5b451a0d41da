//! Failure context — the input to an escalation decision

use crate::stages::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Description of one failure event, built by the error classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureContext {
    /// Classified error kind (e.g. "ImportError", "Timeout")
    pub error_kind: String,
    /// Raw error message
    #[serde(default)]
    pub error_message: String,
    /// Stage the failure originated in
    pub stage: Stage,
    /// Failures seen so far for this (stage, error kind) signature
    #[serde(default)]
    pub failure_count: u32,
    /// Seconds since the task started
    #[serde(default, alias = "elapsed_secs")]
    pub time_since_start: f64,
    /// Names of interventions already applied to this task
    #[serde(default)]
    pub previous_interventions: Vec<String>,
    #[serde(default)]
    pub severity_indicators: BTreeMap<String, Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl FailureContext {
    pub fn new(stage: Stage, error_kind: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_kind: error_kind.into(),
            error_message: error_message.into(),
            stage,
            failure_count: 0,
            time_since_start: 0.0,
            previous_interventions: Vec::new(),
            severity_indicators: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn builder(stage: Stage, error_kind: impl Into<String>) -> FailureContextBuilder {
        FailureContextBuilder {
            context: Self::new(stage, error_kind, String::new()),
        }
    }

    /// Whether any applied intervention mentions `needle` (case-insensitive)
    pub fn has_previous_intervention(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.previous_interventions
            .iter()
            .any(|name| name.to_ascii_lowercase().contains(&needle))
    }
}

/// Fluent construction of a `FailureContext`
#[derive(Debug, Clone)]
pub struct FailureContextBuilder {
    context: FailureContext,
}

impl FailureContextBuilder {
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.context.error_message = message.into();
        self
    }

    pub fn failure_count(mut self, count: u32) -> Self {
        self.context.failure_count = count;
        self
    }

    pub fn elapsed_secs(mut self, secs: f64) -> Self {
        self.context.time_since_start = secs;
        self
    }

    pub fn previous_intervention(mut self, name: impl Into<String>) -> Self {
        self.context.previous_interventions.push(name.into());
        self
    }

    pub fn previous_interventions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context
            .previous_interventions
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn severity_indicator(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context
            .severity_indicators
            .insert(key.into(), value.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> FailureContext {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let ctx = FailureContext::builder(Stage::Execute, "Timeout")
            .message("command timed out")
            .failure_count(2)
            .elapsed_secs(45.0)
            .previous_intervention("auto_retry")
            .severity_indicator("tests_failing", 3)
            .build();

        assert_eq!(ctx.stage, Stage::Execute);
        assert_eq!(ctx.error_kind, "Timeout");
        assert_eq!(ctx.failure_count, 2);
        assert_eq!(ctx.previous_interventions, vec!["auto_retry"]);
        assert_eq!(ctx.severity_indicators["tests_failing"], 3);
    }

    #[test]
    fn test_previous_intervention_match_is_substring() {
        let ctx = FailureContext::builder(Stage::Think, "ValueError")
            .previous_interventions(["auto_retry", "Context_Adjustment"])
            .build();
        assert!(ctx.has_previous_intervention("context"));
        assert!(!ctx.has_previous_intervention("strategy"));
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let ctx: FailureContext = serde_json::from_str(
            r#"{"error_kind": "ImportError", "stage": "execute", "failure_count": 1, "elapsed_secs": 30}"#,
        )
        .unwrap();
        assert_eq!(ctx.time_since_start, 30.0);
        assert!(ctx.previous_interventions.is_empty());
        assert!(ctx.error_message.is_empty());
    }
}
