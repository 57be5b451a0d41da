//! Reference corpus — approved exemplar messages
//!
//! Documents (YAML, JSON or TOML) hold a top-level `messages` list. Each item
//! is either a bare string or a table with a required `text` field:
//!
//! ```yaml
//! messages:
//!   - "Operator (CAKE): Stop. Run pytest. See test results."
//!   - text: "Operator (CAKE): Stop. Check the import path. Run the failing command again."
//!     note: import failures
//! ```

use crate::error::{CoordinationError, CoordinationResult};
use crate::escalation::config::ConfigFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Top-level key holding the message list
pub const MESSAGES_KEY: &str = "messages";

/// Built-in exemplars used when no corpus file is configured
pub const DEFAULT_REFERENCE_MESSAGES: &[&str] = &[
    "Operator (CAKE): Stop. Run pytest. See test results.",
    "Operator (CAKE): Stop. Check the import path. Run the failing command again.",
    "Operator (CAKE): Retry the failed step. Check the error output.",
    "Operator (CAKE): Stop. Review the task context. Retry with the adjusted context.",
    "Operator (CAKE): Stop. Increase the timeout or resource limits. Retry the failed step.",
    "Operator (CAKE): Stop. Try an alternative strategy. Review earlier failures.",
    "Operator (CAKE): Stop. Request human review. Preserve the failure context.",
    "Operator (CAKE): Halt all agent operations. Preserve current state. Notify the operator.",
    "Operator (CAKE): Stop. Read the error message. Fix the root cause.",
    "Operator (CAKE): Stop. Install the missing package. Run the tests again.",
    "Operator (CAKE): Stop. Check file permissions. Verify the target path.",
    "Operator (CAKE): Stop. Use the documented API. See the module docs.",
];

/// Ordered list of approved messages
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferenceCorpus {
    messages: Vec<String>,
}

impl ReferenceCorpus {
    pub fn new<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            messages: messages.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in exemplar corpus
    pub fn builtin() -> Self {
        Self::new(DEFAULT_REFERENCE_MESSAGES.iter().copied())
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.messages.iter().any(|m| m == message)
    }

    /// First `n` messages in corpus order
    pub fn examples(&self, n: usize) -> Vec<String> {
        self.messages.iter().take(n).cloned().collect()
    }

    pub(crate) fn push(&mut self, message: String) {
        self.messages.push(message);
    }

    /// Parse a corpus document.
    ///
    /// Fails when the `messages` list is missing, when an item is neither a
    /// string nor a table with a string `text`, or when no non-blank entry remains.
    pub fn from_document(content: &str, format: ConfigFormat) -> CoordinationResult<Self> {
        let document: Value = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };

        let items = document
            .get(MESSAGES_KEY)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CoordinationError::corpus_format(format!(
                    "missing top-level '{MESSAGES_KEY}' list"
                ))
            })?;

        let mut messages = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let text = match item {
                Value::String(text) => text.as_str(),
                Value::Object(record) => record
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        CoordinationError::corpus_format(format!(
                            "entry {i} has no string 'text' field"
                        ))
                    })?,
                other => {
                    return Err(CoordinationError::corpus_format(format!(
                        "entry {i} must be a string or a table with 'text', got {other}"
                    )))
                }
            };
            let text = text.trim();
            if !text.is_empty() {
                messages.push(text.to_string());
            }
        }

        if messages.is_empty() {
            return Err(CoordinationError::corpus_format("no usable entries"));
        }
        Ok(Self { messages })
    }

    pub fn from_path(path: impl AsRef<Path>) -> CoordinationResult<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::from_document(&content, format)
    }

    /// Serialize as a `messages` document that `from_document` reads back unchanged
    pub fn to_document(&self, format: ConfigFormat) -> CoordinationResult<String> {
        Ok(match format {
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string(self)?,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CoordinationResult<()> {
        let path = path.as_ref();
        let content = self.to_document(ConfigFormat::from_path(path)?)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
