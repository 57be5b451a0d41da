//! Stage handler capability
//!
//! Handlers report failure through `Result` rather than by panicking. The
//! sequencer records an `Err` as a failed stage; a panic is a programming
//! error and is left to unwind.

use crate::stages::types::{Stage, StageContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Error kind recorded when a stage is interrupted by cancellation
pub const CANCELLED_KIND: &str = "Cancelled";

/// Error kind recorded for explicit failure markers without a kind of their own
pub const UNSUCCESSFUL_KIND: &str = "StageUnsuccessful";

/// Why a stage handler did not produce a usable output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageFailure {
    /// The handler hit an error (tool crash, command failure, exception)
    Error { kind: String, message: String },
    /// The handler finished but explicitly reported that the stage failed
    Unsuccessful { message: String, output: Value },
    /// The handler observed cancellation and stopped
    Cancelled,
}

impl StageFailure {
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn unsuccessful(message: impl Into<String>) -> Self {
        Self::Unsuccessful {
            message: message.into(),
            output: Value::Null,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Error { kind, .. } => kind,
            Self::Unsuccessful { .. } => UNSUCCESSFUL_KIND,
            Self::Cancelled => CANCELLED_KIND,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Error { message, .. } | Self::Unsuccessful { message, .. } => message.clone(),
            Self::Cancelled => "stage cancelled before completion".to_string(),
        }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

/// Work performed for one stage of the workflow
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Run the stage against the accumulated context.
    ///
    /// Long-running handlers should watch `cancel` and return
    /// `StageFailure::Cancelled` promptly once it fires.
    async fn handle(
        &self,
        stage: Stage,
        context: &StageContext,
        cancel: &CancellationToken,
    ) -> Result<Value, StageFailure>;
}

/// Adapts an async closure into a `StageHandler`.
///
/// The closure receives its own copy of the context.
pub struct FnStageHandler<F> {
    func: F,
}

impl<F, Fut> FnStageHandler<F>
where
    F: Fn(Stage, StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StageFailure>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> StageHandler for FnStageHandler<F>
where
    F: Fn(Stage, StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StageFailure>> + Send,
{
    async fn handle(
        &self,
        stage: Stage,
        context: &StageContext,
        _cancel: &CancellationToken,
    ) -> Result<Value, StageFailure> {
        (self.func)(stage, context.clone()).await
    }
}
