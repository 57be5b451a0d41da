//! Error classification
//!
//! Maps raw stage error text to the error kind the escalation engine keys
//! its cooldowns and critical identifiers on.

use regex::Regex;
use std::sync::LazyLock;

/// Kind used when nothing more specific is known
pub const UNKNOWN_KIND: &str = "Unknown";

/// Ordered (kind, pattern) rules; the first match wins.
///
/// Resource exhaustion and permission failures come first so that a message
/// mentioning both a timeout and a full disk is treated as the disk problem.
static RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "PermissionDenied",
            r"(?i)(permission denied|PermissionError|EACCES|operation not permitted)",
        ),
        (
            "OutOfMemory",
            r"(?i)(out of memory|MemoryError|cannot allocate memory|\bOOM\b)",
        ),
        ("DiskFull", r"(?i)(no space left on device|disk full|ENOSPC)"),
        (
            "FileNotFound",
            r"(?i)(no such file or directory|FileNotFoundError|ENOENT|file not found)",
        ),
        (
            "ImportError",
            r"(?i)(ImportError|ModuleNotFoundError|no module named|cannot find module|unresolved import)",
        ),
        (
            "SyntaxError",
            r"(?i)(SyntaxError|syntax error|unexpected token|parse error)",
        ),
        (
            "ConnectionError",
            r"(?i)(connection (refused|reset|aborted)|ConnectionError|ECONNREFUSED|network is unreachable)",
        ),
        (
            "Timeout",
            r"(?i)(timed out|timeout|deadline exceeded)",
        ),
        (
            "TestFailure",
            r"(?i)(\d+ (tests? )?failed|AssertionError|assertion failed|test result: FAILED)",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).unwrap()))
    .collect()
});

/// Explicit exception or error type name, e.g. `KeyError` or `IllegalStateException`
static EXCEPTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Za-z0-9]*(?:Error|Exception))\b").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify error text.
    ///
    /// Known patterns first, then an exception name in the text, then the
    /// kind the stage handler reported, then `Unknown`.
    pub fn classify(&self, message: &str, handler_kind: Option<&str>) -> String {
        if let Some((kind, _)) = RULES.iter().find(|(_, re)| re.is_match(message)) {
            return kind.to_string();
        }
        if let Some(caps) = EXCEPTION_NAME.captures(message) {
            return caps[1].to_string();
        }
        handler_kind
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(UNKNOWN_KIND)
            .to_string()
    }
}
