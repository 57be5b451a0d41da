//! Command-backed stage handler
//!
//! Runs a shell command for a stage. The accumulated context is written to
//! the child's stdin as JSON; stdout is parsed back as the stage output.
//!
//! ```text
//! context ──stdin(JSON)──→ sh -c <command> ──stdout──→ JSON value | {"stdout": text}
//!                          env: CAKE_STAGE, CAKE_TASK       exit ≠ 0 → StageFailure::Error
//! ```
//!
//! A stdout object with `"success": false` is an explicit failure marker.

use crate::config::StageCommand;
use async_trait::async_trait;
use coordination::stages::TASK_DESCRIPTION_KEY;
use coordination::{Stage, StageContext, StageFailure, StageHandler};
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Error kind for a command that could not be started
pub const SPAWN_FAILED_KIND: &str = "SpawnFailed";

/// Error kind for a command that exited non-zero
pub const COMMAND_FAILED_KIND: &str = "CommandFailed";

pub const TIMEOUT_KIND: &str = "Timeout";

#[derive(Debug, Clone)]
pub struct CommandStageHandler {
    command: StageCommand,
}

impl CommandStageHandler {
    pub fn new(command: StageCommand) -> Self {
        Self { command }
    }

    fn build(&self, stage: Stage, context: &StageContext) -> tokio::process::Command {
        let task = context
            .get(TASK_DESCRIPTION_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command.command)
            .envs(&self.command.env)
            .env("CAKE_STAGE", stage.as_str())
            .env("CAKE_TASK", task)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.command.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group: a terminal Ctrl-C reaches only the supervisor,
        // which then cancels and kills the command itself
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

#[async_trait]
impl StageHandler for CommandStageHandler {
    async fn handle(
        &self,
        stage: Stage,
        context: &StageContext,
        cancel: &CancellationToken,
    ) -> Result<Value, StageFailure> {
        let payload = serde_json::to_vec(context)
            .map_err(|e| StageFailure::error("SerializationError", e.to_string()))?;

        let mut child = self.build(stage, context).spawn().map_err(|e| {
            StageFailure::error(
                SPAWN_FAILED_KIND,
                format!("Failed to execute '{}': {e}", self.command.command),
            )
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // Written from a task so a command that never reads stdin cannot stall us
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::debug!(stage = %stage, error = %e, "Stage command did not read context");
                }
            });
        }

        tracing::debug!(stage = %stage, command = %self.command.command, "Stage command started");

        let wait = child.wait_with_output();
        let output = match self.command.timeout_secs {
            Some(secs) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(StageFailure::Cancelled),
                    res = tokio::time::timeout(Duration::from_secs(secs), wait) => match res {
                        Ok(res) => res,
                        Err(_) => {
                            return Err(StageFailure::error(
                                TIMEOUT_KIND,
                                format!("Stage command timed out after {secs}s"),
                            ))
                        }
                    },
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(StageFailure::Cancelled),
                    res = wait => res,
                }
            }
        }
        .map_err(|e| StageFailure::error(COMMAND_FAILED_KIND, format!("Failed to wait: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = stderr.trim();
            let message = if detail.is_empty() {
                format!("'{}' exited with {}", self.command.command, output.status)
            } else {
                detail.to_string()
            };
            return Err(StageFailure::error(COMMAND_FAILED_KIND, message));
        }

        parse_output(&stdout)
    }
}

/// Stage output from command stdout
fn parse_output(stdout: &str) -> Result<Value, StageFailure> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => return Ok(json!({ "stdout": trimmed })),
    };

    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("stage reported failure")
            .to_string();
        return Err(StageFailure::Unsuccessful {
            message,
            output: value,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_shapes() {
        assert_eq!(parse_output("  \n").unwrap(), Value::Null);
        assert_eq!(parse_output("{\"plan\": [1, 2]}").unwrap(), json!({"plan": [1, 2]}));
        assert_eq!(
            parse_output("all good\n").unwrap(),
            json!({"stdout": "all good"})
        );
    }

    #[test]
    fn test_parse_output_failure_marker() {
        let err = parse_output(r#"{"success": false, "error": "3 tests failed"}"#).unwrap_err();
        assert_eq!(err.message(), "3 tests failed");
        assert!(matches!(err, StageFailure::Unsuccessful { .. }));

        assert!(parse_output(r#"{"success": true}"#).is_ok());
    }

    #[cfg(unix)]
    fn context(task: &str) -> StageContext {
        let mut ctx = StageContext::new();
        ctx.insert(TASK_DESCRIPTION_KEY.into(), json!(task));
        ctx
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_context_on_stdin_and_env() {
        let handler = CommandStageHandler::new(StageCommand::new(
            r#"read -r line; printf '{"stage":"%s","task":"%s","input":%s}' "$CAKE_STAGE" "$CAKE_TASK" "$line""#,
        ));
        let out = handler
            .handle(Stage::Think, &context("fix it"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out["stage"], "think");
        assert_eq!(out["task"], "fix it");
        assert_eq!(out["input"]["task_description"], "fix it");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let handler = CommandStageHandler::new(StageCommand::new(
            "echo 'ModuleNotFoundError: No module named numpy' >&2; exit 3",
        ));
        let err = handler
            .handle(Stage::Execute, &context("t"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), COMMAND_FAILED_KIND);
        assert_eq!(err.message(), "ModuleNotFoundError: No module named numpy");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let mut cmd = StageCommand::new("sleep 5");
        cmd.timeout_secs = Some(1);
        let err = CommandStageHandler::new(cmd)
            .handle(Stage::Execute, &context("t"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TIMEOUT_KIND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_command() {
        let handler = CommandStageHandler::new(StageCommand::new("sleep 30"));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            handler.handle(Stage::Execute, &context("t"), &cancel),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert_eq!(err, StageFailure::Cancelled);
    }
}
