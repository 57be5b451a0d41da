//! Compliance gate integration tests — verdicts and corpus lifecycle.
//!
//! Tests verify:
//! - Reference-style messages pass, hedged or unprefixed ones fail
//! - Every rejection over a non-empty corpus carries a suggestion
//! - Rejected additions leave the corpus unchanged
//! - A corpus saved to disk reloads identically in every format

use coordination::compliance::{ExactMatchScorer, SIMILARITY_THRESHOLD};
use coordination::{CoordinationError, MessageComplianceGate, NgramCosineScorer, ReferenceCorpus};

fn gate() -> MessageComplianceGate {
    MessageComplianceGate::new(NgramCosineScorer::default())
}

// ── Verdicts ───────────────────────────────────────────────────────

#[test]
fn test_reference_example_passes() {
    let verdict = gate().validate("Operator (CAKE): Stop. Run pytest. See test results.");
    assert!(verdict.passed);
    assert!(verdict.score >= SIMILARITY_THRESHOLD);
}

#[test]
fn test_hedged_unprefixed_message_fails_on_prefix() {
    let verdict = gate().validate("I think you should maybe try running tests");
    assert!(!verdict.passed);
    assert_eq!(verdict.score, 0.0);
    assert!(verdict.reason.contains("Operator (CAKE):"));
}

#[test]
fn test_every_rejection_has_a_suggestion() {
    let gate = gate();
    for message in [
        "",
        "run the tests",
        "Operator (CAKE): Stop. Run pytest. See results. Fix imports.",
        "Operator (CAKE): The build is red.",
        "Operator (CAKE): Stop. Unfortunately run pytest.",
        "Operator (CAKE): Check the weather forecast for tomorrow afternoon.",
    ] {
        let verdict = gate.validate(message);
        assert!(!verdict.passed, "{message:?} should be rejected");
        assert!(
            !verdict.suggestions.is_empty(),
            "{message:?} rejected without suggestions"
        );
    }
}

#[test]
fn test_rendered_style_near_miss_points_at_exemplar() {
    let verdict = gate().validate("Operator (CAKE): Stop. Install numpy. Run the tests.");
    assert!(verdict.score > 0.0);
    if !verdict.passed {
        assert!(verdict.suggestions[0].starts_with("Closest approved message"));
        assert!(verdict.suggestions[0].contains("Operator (CAKE):"));
    }
}

// ── Corpus lifecycle ───────────────────────────────────────────────

#[test]
fn test_rejected_addition_keeps_corpus_size() {
    let gate = gate();
    let before = gate.corpus_len();
    let examples = gate.get_reference_examples(before);

    for bad in [
        "Please stop now.",
        "Operator (CAKE): Sorry, retry the step.",
        "Operator (CAKE): Stop. Run pytest. See results. Check logs.",
    ] {
        let err = gate.add_reference_message(bad).unwrap_err();
        assert!(matches!(err, CoordinationError::ComplianceRejected { .. }), "{bad}");
    }

    assert_eq!(gate.corpus_len(), before);
    assert_eq!(gate.get_reference_examples(before), examples);
}

#[test]
fn test_save_and_reload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let gate = MessageComplianceGate::new(ExactMatchScorer);
    gate.load_reference_corpus(ReferenceCorpus::new([
        "Operator (CAKE): Stop. Run pytest. See test results.",
        "Operator (CAKE): Stop. Check file permissions.",
    ]))
    .unwrap();

    for name in ["corpus.yaml", "corpus.json", "corpus.toml"] {
        let path = dir.path().join(name);
        gate.save_reference_corpus(&path).unwrap();

        let reloaded = MessageComplianceGate::new(NgramCosineScorer::default());
        assert_eq!(reloaded.load_reference_corpus_from_path(&path).unwrap(), 2);
        assert_eq!(reloaded.corpus(), gate.corpus(), "{name}");
    }
}

#[test]
fn test_load_rejects_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.json");
    std::fs::write(&path, r#"{"messages": "not a list"}"#).unwrap();

    let gate = gate();
    let before = gate.corpus_len();
    let err = gate.load_reference_corpus_from_path(&path).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(gate.corpus_len(), before);

    let unknown = dir.path().join("corpus.ini");
    std::fs::write(&unknown, "messages=").unwrap();
    assert!(gate.load_reference_corpus_from_path(&unknown).is_err());
}

#[test]
fn test_concurrent_validate_during_add() {
    let gate = std::sync::Arc::new(gate());
    let reader = {
        let gate = gate.clone();
        std::thread::spawn(move || {
            for _ in 0..200 {
                let verdict =
                    gate.validate("Operator (CAKE): Stop. Run pytest. See test results.");
                assert!(verdict.passed);
            }
        })
    };
    for _ in 0..20 {
        gate.add_reference_message("Operator (CAKE): Stop. Run pytest. See test results.")
            .unwrap();
    }
    reader.join().unwrap();
    assert_eq!(gate.corpus_len(), ReferenceCorpus::builtin().len() + 20);
}
