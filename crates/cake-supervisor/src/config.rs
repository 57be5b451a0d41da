//! Supervisor configuration (`cake.toml`)
//!
//! ```toml
//! corpus = "corpus.yaml"
//! max_attempts = 3
//!
//! [escalation]
//! max_retries = 2
//!
//! [stages.execute]
//! command = "python -m agent.execute"
//! env = { AGENT_MODE = "fast" }
//! timeout_secs = 600
//! ```

use anyhow::{bail, Context, Result};
use coordination::{EscalationConfig, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Shell command backing one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCommand {
    pub command: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory; relative paths resolve against the config file
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Kill the command after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl StageCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: BTreeMap::new(),
            working_dir: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub escalation: EscalationConfig,
    /// Reference corpus file; the built-in corpus is used when unset
    pub corpus: Option<PathBuf>,
    /// Workflow attempts per task (default: `escalation.max_retries + 1`)
    pub max_attempts: Option<u32>,
    pub stages: BTreeMap<Stage, StageCommand>,
}

impl SupervisorConfig {
    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Attempts per task after applying the default
    pub fn attempts(&self) -> u32 {
        self.max_attempts
            .unwrap_or(self.escalation.max_retries.saturating_add(1))
    }

    pub fn validate(&self) -> Result<()> {
        self.escalation
            .validate()
            .context("Invalid [escalation] table")?;

        if self.attempts() == 0 {
            bail!("max_attempts must be at least 1");
        }

        for (stage, cmd) in &self.stages {
            if cmd.command.trim().is_empty() {
                bail!("[stages.{stage}] command must not be empty");
            }
            if cmd.timeout_secs == Some(0) {
                bail!("[stages.{stage}] timeout_secs must be at least 1");
            }
        }
        Ok(())
    }

    /// Stages without a `[stages.<stage>]` table, in workflow order
    pub fn missing_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| !self.stages.contains_key(s))
            .collect()
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let Some(corpus) = self.corpus.as_mut() {
            if corpus.is_relative() {
                *corpus = base.join(&*corpus);
            }
        }
        for cmd in self.stages.values_mut() {
            if let Some(dir) = cmd.working_dir.as_mut() {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
    }
}
