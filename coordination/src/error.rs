//! Coordination error types
//!
//! One taxonomy for the three core components. Stage handler failures are
//! not errors at this level: they become failed `StageResult`s. Compliance
//! rejections are only errors when a caller asked for a mutation (adding a
//! reference message) that the verdict forbids.

use crate::stages::Stage;
use thiserror::Error;

/// Result type alias for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Errors raised by the sequencer, the escalation engine and the compliance gate
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Invalid configuration value (thresholds, durations, limits)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A workflow was started without a handler bound to every stage
    #[error("No handler registered for stage '{stage}'")]
    MissingHandler { stage: Stage },

    /// Caller supplied input that cannot be processed
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A reference message was refused because it fails compliance itself
    #[error("Message rejected by compliance gate: {reason}")]
    ComplianceRejected {
        reason: String,
        suggestions: Vec<String>,
    },

    /// Reference corpus document is malformed or has no usable entries
    #[error("Invalid reference corpus: {message}")]
    CorpusFormat { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML write error
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl CoordinationError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a corpus format error
    pub fn corpus_format(message: impl Into<String>) -> Self {
        Self::CorpusFormat {
            message: message.into(),
        }
    }

    /// Whether this error belongs to the configuration class: fatal at
    /// construction or load time and never silently defaulted.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::MissingHandler { .. } | Self::CorpusFormat { .. }
        )
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::MissingHandler { .. } => "MISSING_HANDLER",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::ComplianceRejected { .. } => "COMPLIANCE_REJECTED",
            Self::CorpusFormat { .. } => "CORPUS_FORMAT",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::TomlDe(_) | Self::TomlSer(_) => "TOML_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_class() {
        assert!(CoordinationError::config("bad").is_configuration());
        assert!(CoordinationError::MissingHandler {
            stage: Stage::Think
        }
        .is_configuration());
        assert!(CoordinationError::corpus_format("empty").is_configuration());
        assert!(!CoordinationError::invalid_input("blank").is_configuration());
    }

    #[test]
    fn test_display_names_stage() {
        let err = CoordinationError::MissingHandler {
            stage: Stage::Reflect,
        };
        assert_eq!(err.to_string(), "No handler registered for stage 'reflect'");
        assert_eq!(err.code(), "MISSING_HANDLER");
    }
}
