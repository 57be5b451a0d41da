//! Structural and lexical rules for operator messages
//!
//! A compliant message starts with the operator prefix, has at most three
//! sentences, uses at least one approved imperative verb and contains no
//! hedging or apologetic phrasing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Literal every operator message must start with
pub const REQUIRED_PREFIX: &str = "Operator (CAKE):";

pub const MAX_SENTENCES: usize = 3;

/// Imperative verbs an operator message may be built from
pub const APPROVED_VERBS: &[&str] = &[
    "add", "check", "compare", "create", "fix", "halt", "increase", "inspect", "install",
    "notify", "open", "pause", "preserve", "read", "remove", "report", "request", "restart",
    "retry", "revert", "review", "run", "search", "see", "stop", "test", "try", "update", "use",
    "verify", "wait",
];

/// Hedging and apologetic phrases that are never allowed
pub const FORBIDDEN_PHRASES: &[&str] = &[
    "i think",
    "i believe",
    "i'm not sure",
    "maybe",
    "perhaps",
    "possibly",
    "might want to",
    "you should consider",
    "it seems",
    "sorry",
    "apologize",
    "apologies",
    "unfortunately",
    "please",
    "hopefully",
];

static SENTENCE_TERMINATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").unwrap());

static APPROVED_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", APPROVED_VERBS.join("|"))).unwrap()
});

static FORBIDDEN_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = FORBIDDEN_PHRASES.iter().map(|p| regex::escape(p)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).unwrap()
});

static FIRST_PERSON: LazyLock<Regex> = LazyLock::new(|| {
    // Standalone "I" only, so "I/O" is not a pronoun
    Regex::new(r"\bI(?:[\s'’.,;:!?]|$)|\b(?i:me|my|mine|myself|we|us|our|ours|ourselves)\b")
        .unwrap()
});

/// First rule a message breaks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleViolation {
    MissingPrefix,
    TooManySentences { count: usize },
    NoApprovedVerb,
    ForbiddenPhrase { phrase: String },
}

impl RuleViolation {
    /// Whether the violation is structural (as opposed to lexical)
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::ForbiddenPhrase { .. })
    }

    /// Concrete fix for this violation
    pub fn hint(&self) -> String {
        match self {
            Self::MissingPrefix => format!("Start the message with '{}'", REQUIRED_PREFIX),
            Self::TooManySentences { .. } => {
                format!("Cut the message to at most {} sentences", MAX_SENTENCES)
            }
            Self::NoApprovedVerb => format!(
                "Use an approved imperative verb such as {}",
                APPROVED_VERBS[..5].join(", ")
            ),
            Self::ForbiddenPhrase { phrase } => format!("Remove the phrase '{}'", phrase),
        }
    }
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPrefix => write!(f, "message must start with '{}'", REQUIRED_PREFIX),
            Self::TooManySentences { count } => write!(
                f,
                "message has {} sentences (maximum {})",
                count, MAX_SENTENCES
            ),
            Self::NoApprovedVerb => write!(f, "message contains no approved verb"),
            Self::ForbiddenPhrase { phrase } => {
                write!(f, "message contains forbidden phrase '{}'", phrase)
            }
        }
    }
}

/// Non-empty sentences, trimmed, split on `.`, `!` and `?`
pub fn sentences(message: &str) -> Vec<&str> {
    SENTENCE_TERMINATOR
        .split(message)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Prefix, sentence count and approved-verb checks
pub fn check_structure(message: &str) -> Result<(), RuleViolation> {
    let Some(body) = message.strip_prefix(REQUIRED_PREFIX) else {
        return Err(RuleViolation::MissingPrefix);
    };

    let count = sentences(message).len();
    if count > MAX_SENTENCES {
        return Err(RuleViolation::TooManySentences { count });
    }

    if !APPROVED_VERB.is_match(body) {
        return Err(RuleViolation::NoApprovedVerb);
    }

    Ok(())
}

/// First forbidden phrase found, lowercased
pub fn find_forbidden_phrase(message: &str) -> Option<String> {
    FORBIDDEN_PHRASE
        .find(message)
        .map(|m| m.as_str().to_lowercase())
}

/// Structural checks, then the forbidden-phrase scan
pub fn check(message: &str) -> Result<(), RuleViolation> {
    check_structure(message)?;
    if let Some(phrase) = find_forbidden_phrase(message) {
        return Err(RuleViolation::ForbiddenPhrase { phrase });
    }
    Ok(())
}

/// Whether a segment opens with an approved verb
pub fn starts_with_approved_verb(segment: &str) -> bool {
    segment
        .split(|c: char| !c.is_alphabetic())
        .find(|w| !w.is_empty())
        .map(|w| {
            let w = w.to_ascii_lowercase();
            APPROVED_VERBS.contains(&w.as_str())
        })
        .unwrap_or(false)
}

pub fn has_first_person(message: &str) -> bool {
    FIRST_PERSON.is_match(message)
}
