//! Message Compliance Gate — accepts or rejects outbound operator text
//!
//! Checks run in order and stop at the first failure:
//! structure → forbidden phrases → similarity to the reference corpus.
//!
//! The corpus and its index live in one immutable snapshot behind an
//! `RwLock<Arc<_>>`. Readers clone the `Arc` and score without holding the
//! lock; writers build a complete new snapshot and swap the pointer.

use crate::compliance::corpus::ReferenceCorpus;
use crate::compliance::rules::{self, RuleViolation, REQUIRED_PREFIX};
use crate::compliance::scorer::{CorpusIndex, SimilarityScorer};
use crate::error::{CoordinationError, CoordinationResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

/// Minimum similarity for a message to pass
pub const SIMILARITY_THRESHOLD: f64 = 0.90;

/// Outcome of validating one message. A failing verdict is a normal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub passed: bool,
    /// Best similarity against the corpus, 0.0 when a rule check failed
    pub score: f64,
    pub reason: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug)]
struct CorpusSnapshot {
    corpus: ReferenceCorpus,
    index: Box<dyn CorpusIndex>,
}

impl CorpusSnapshot {
    fn build(scorer: &dyn SimilarityScorer, corpus: ReferenceCorpus) -> Self {
        let index = scorer.build_index(corpus.messages());
        Self { corpus, index }
    }

    /// (entry, score) of the closest corpus message
    fn nearest(&self, message: &str) -> Option<(&str, f64)> {
        if let Some(exact) = self.corpus.messages().iter().find(|m| *m == message) {
            return Some((exact.as_str(), 1.0));
        }
        self.index
            .similarities(message)
            .into_iter()
            .map(|s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 })
            .zip(self.corpus.messages())
            .fold(None, |best: Option<(&str, f64)>, (score, entry)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((entry.as_str(), score)),
            })
    }
}

#[derive(Debug)]
pub struct MessageComplianceGate {
    scorer: Arc<dyn SimilarityScorer>,
    snapshot: RwLock<Arc<CorpusSnapshot>>,
    /// Serializes validate-then-swap sequences on add/load
    writer: Mutex<()>,
}

impl MessageComplianceGate {
    /// Gate over the built-in reference corpus
    pub fn new(scorer: impl SimilarityScorer + 'static) -> Self {
        let scorer: Arc<dyn SimilarityScorer> = Arc::new(scorer);
        let snapshot = CorpusSnapshot::build(scorer.as_ref(), ReferenceCorpus::builtin());
        Self {
            scorer,
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    /// Gate over a caller-supplied corpus; entries breaking the rules are dropped
    pub fn with_corpus(
        scorer: impl SimilarityScorer + 'static,
        corpus: ReferenceCorpus,
    ) -> CoordinationResult<Self> {
        let gate = Self::new(scorer);
        gate.load_reference_corpus(corpus)?;
        Ok(gate)
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// Structural and forbidden-phrase checks only
    pub fn check_rules(&self, message: &str) -> Result<(), RuleViolation> {
        rules::check(message)
    }

    /// Validate a candidate message. Never fails; rejection is a verdict.
    pub fn validate(&self, message: &str) -> ComplianceVerdict {
        let snapshot = self.current();

        if let Err(violation) = rules::check(message) {
            tracing::debug!(%violation, "Message failed rule check");
            let mut suggestions = vec![violation.hint()];
            if let Some(example) = snapshot.corpus.messages().first() {
                suggestions.push(format!("Follow the approved format, e.g. \"{example}\""));
            }
            suggestions.extend(style_notes(message));
            return ComplianceVerdict {
                passed: false,
                score: 0.0,
                reason: violation.to_string(),
                suggestions,
            };
        }

        let Some((nearest, score)) = snapshot.nearest(message) else {
            return ComplianceVerdict {
                passed: false,
                score: 0.0,
                reason: "reference corpus is empty".to_string(),
                suggestions: style_notes(message),
            };
        };

        if score >= SIMILARITY_THRESHOLD {
            return ComplianceVerdict {
                passed: true,
                score,
                reason: format!("matches approved reference style (similarity {score:.2})"),
                suggestions: Vec::new(),
            };
        }

        tracing::debug!(score, "Message below similarity threshold");
        let mut suggestions = vec![format!("Closest approved message: \"{nearest}\"")];
        suggestions.extend(style_notes(message));
        ComplianceVerdict {
            passed: false,
            score,
            reason: format!(
                "similarity {score:.2} is below the {SIMILARITY_THRESHOLD:.2} threshold"
            ),
            suggestions,
        }
    }

    /// Append a message to the corpus if it passes validation, then re-index.
    ///
    /// A rejected message leaves the corpus untouched.
    pub fn add_reference_message(&self, message: &str) -> CoordinationResult<ComplianceVerdict> {
        let message = message.trim();
        if message.is_empty() {
            return Err(CoordinationError::invalid_input(
                "reference message must not be empty",
            ));
        }

        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let verdict = self.validate(message);
        if !verdict.passed {
            return Err(CoordinationError::ComplianceRejected {
                reason: verdict.reason,
                suggestions: verdict.suggestions,
            });
        }

        let mut corpus = self.current().corpus.clone();
        corpus.push(message.to_string());
        self.swap(corpus);
        Ok(verdict)
    }

    /// Replace the whole corpus.
    ///
    /// Entries that break the message rules are skipped so the corpus never
    /// holds a non-compliant exemplar. Fails if nothing usable remains.
    pub fn load_reference_corpus(&self, corpus: ReferenceCorpus) -> CoordinationResult<usize> {
        let mut usable = Vec::with_capacity(corpus.len());
        for message in corpus.messages() {
            match rules::check(message) {
                Ok(()) => usable.push(message.clone()),
                Err(violation) => {
                    tracing::warn!(%violation, message = %message, "Skipping corpus entry");
                }
            }
        }
        if usable.is_empty() {
            return Err(CoordinationError::corpus_format(format!(
                "no usable entries (every entry must start with '{REQUIRED_PREFIX}' and follow the message rules)"
            )));
        }

        let count = usable.len();
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.swap(ReferenceCorpus::new(usable));
        Ok(count)
    }

    /// Load a corpus document from disk and replace the corpus with it
    pub fn load_reference_corpus_from_path(&self, path: impl AsRef<Path>) -> CoordinationResult<usize> {
        let path = path.as_ref();
        let corpus = ReferenceCorpus::from_path(path)?;
        let count = self.load_reference_corpus(corpus)?;
        tracing::info!(path = %path.display(), entries = count, "Loaded reference corpus");
        Ok(count)
    }

    /// Write the current corpus to disk
    pub fn save_reference_corpus(&self, path: impl AsRef<Path>) -> CoordinationResult<()> {
        self.current().corpus.save(path)
    }

    /// First `n` corpus messages
    pub fn get_reference_examples(&self, n: usize) -> Vec<String> {
        self.current().corpus.examples(n)
    }

    pub fn corpus(&self) -> ReferenceCorpus {
        self.current().corpus.clone()
    }

    pub fn corpus_len(&self) -> usize {
        self.current().corpus.len()
    }

    fn current(&self) -> Arc<CorpusSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Full re-index into a fresh snapshot, then pointer swap
    fn swap(&self, corpus: ReferenceCorpus) {
        let entries = corpus.len();
        let snapshot = Arc::new(CorpusSnapshot::build(self.scorer.as_ref(), corpus));
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
        tracing::info!(entries, scorer = self.scorer.name(), "Reference corpus re-indexed");
    }
}

/// Notes about phrasing that hold regardless of which check failed
fn style_notes(message: &str) -> Vec<String> {
    let mut notes = Vec::new();
    let sentences = rules::sentences(message);
    if let Some(second) = sentences.get(1) {
        if !rules::starts_with_approved_verb(second) {
            notes.push(format!(
                "Start the instruction after the first sentence with an approved verb (found \"{second}\")"
            ));
        }
    }
    if rules::has_first_person(message) {
        notes.push("Remove first-person pronouns (I, me, my, we, our)".to_string());
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::scorer::{ExactMatchScorer, NgramCosineScorer};

    #[test]
    fn test_exact_corpus_member_scores_one() {
        let gate = MessageComplianceGate::new(NgramCosineScorer::default());
        let verdict = gate.validate("Operator (CAKE): Stop. Run pytest. See test results.");
        assert!(verdict.passed);
        assert_eq!(verdict.score, 1.0);
        assert!(verdict.suggestions.is_empty());
    }

    #[test]
    fn test_prefix_failure_short_circuits() {
        let gate = MessageComplianceGate::new(NgramCosineScorer::default());
        let verdict = gate.validate("I think you should maybe try running tests");
        assert!(!verdict.passed);
        assert_eq!(verdict.score, 0.0);
        assert!(verdict.reason.contains("must start with"));
        assert!(verdict
            .suggestions
            .iter()
            .any(|s| s.contains("first-person")));
    }

    #[test]
    fn test_four_sentences_fail_regardless_of_similarity() {
        // Every sentence here is an exact corpus sentence
        let gate = MessageComplianceGate::new(ExactMatchScorer);
        let verdict =
            gate.validate("Operator (CAKE): Stop. Run pytest. See test results. Run pytest.");
        assert!(!verdict.passed);
        assert_eq!(verdict.score, 0.0);
        assert!(verdict.reason.contains("4 sentences"));
    }

    #[test]
    fn test_forbidden_phrase_scores_zero() {
        let gate = MessageComplianceGate::new(NgramCosineScorer::default());
        let verdict = gate.validate("Operator (CAKE): Stop. Please run pytest. See test results.");
        assert!(!verdict.passed);
        assert_eq!(verdict.score, 0.0);
        assert!(verdict.reason.contains("please"));
    }

    #[test]
    fn test_low_similarity_suggests_nearest() {
        let gate = MessageComplianceGate::new(NgramCosineScorer::default());
        let verdict = gate.validate("Operator (CAKE): Run the linter on every module in the repository.");
        assert!(!verdict.passed);
        assert!(verdict.score > 0.0 && verdict.score < SIMILARITY_THRESHOLD);
        assert!(verdict.suggestions[0].starts_with("Closest approved message"));
    }

    #[derive(Debug)]
    struct NanScorer;

    #[derive(Debug)]
    struct NanIndex(usize);

    impl SimilarityScorer for NanScorer {
        fn name(&self) -> &'static str {
            "nan"
        }

        fn build_index(&self, corpus: &[String]) -> Box<dyn CorpusIndex> {
            Box::new(NanIndex(corpus.len()))
        }
    }

    impl CorpusIndex for NanIndex {
        fn similarities(&self, _message: &str) -> Vec<f64> {
            vec![f64::NAN; self.0]
        }
    }

    #[test]
    fn test_non_finite_scores_count_as_zero() {
        let gate = MessageComplianceGate::new(NanScorer);
        let verdict = gate.validate("Operator (CAKE): Stop. Run the linter.");
        assert!(!verdict.passed);
        assert_eq!(verdict.score, 0.0);
        assert!(verdict.suggestions[0].starts_with("Closest approved message"));
    }

    #[test]
    fn test_io_is_not_flagged_as_first_person() {
        let gate = MessageComplianceGate::new(NgramCosineScorer::default());
        let verdict = gate.validate("Operator (CAKE): Stop. Check the I/O path. Run the tests again.");
        assert!(!verdict
            .suggestions
            .iter()
            .any(|s| s.contains("first-person")));
    }

    #[test]
    fn test_second_sentence_verb_note() {
        let gate = MessageComplianceGate::new(ExactMatchScorer);
        let verdict = gate.validate("Operator (CAKE): Stop. The tests are red.");
        assert!(!verdict.passed);
        assert!(verdict
            .suggestions
            .iter()
            .any(|s| s.contains("approved verb")));
    }

    #[test]
    fn test_add_rejects_noncompliant_and_keeps_corpus() {
        let gate = MessageComplianceGate::new(NgramCosineScorer::default());
        let before = gate.corpus_len();

        let err = gate
            .add_reference_message("Sorry, maybe try again?")
            .unwrap_err();
        assert!(matches!(err, CoordinationError::ComplianceRejected { .. }));
        assert_eq!(gate.corpus_len(), before);

        assert!(matches!(
            gate.add_reference_message("  "),
            Err(CoordinationError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_add_compliant_message_reindexes() {
        let gate = MessageComplianceGate::new(ExactMatchScorer);
        gate.load_reference_corpus(ReferenceCorpus::new(["Operator (CAKE): Stop. Run pytest."]))
            .unwrap();
        // With the exact-match stub only duplicates reach the threshold
        gate.add_reference_message("Operator (CAKE): Stop. Run pytest.")
            .unwrap();
        assert_eq!(gate.corpus_len(), 2);
    }

    #[test]
    fn test_load_skips_noncompliant_entries() {
        let gate = MessageComplianceGate::new(NgramCosineScorer::default());
        let count = gate
            .load_reference_corpus(ReferenceCorpus::new([
                "Operator (CAKE): Stop. Run cargo test.",
                "maybe run the tests",
            ]))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            gate.get_reference_examples(5),
            vec!["Operator (CAKE): Stop. Run cargo test."]
        );

        let err = gate
            .load_reference_corpus(ReferenceCorpus::new(["not compliant"]))
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(gate.corpus_len(), 1, "failed load keeps previous corpus");
    }
}
