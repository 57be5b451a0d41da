//! Intervention rendering
//!
//! Turns an escalation decision into operator text:
//! `Operator (CAKE): <lead>. <action>. <action>.`
//!
//! Manual interventions lead with "Stop"; automatic retries and emergency
//! stops lead with their first action. Output never exceeds the sentence
//! limit and every sentence starts with the action's own verb, so rendered
//! default actions reproduce reference corpus entries exactly.

use coordination::compliance::{MAX_SENTENCES, REQUIRED_PREFIX};
use coordination::{EscalationDecision, InterventionKind};

const STOP_LEAD: &str = "Stop";

/// Used when a decision carries no actions at all
const FALLBACK_ACTION: &str = "Request human review";

#[derive(Debug, Clone, Copy, Default)]
pub struct InterventionRenderer;

impl InterventionRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, decision: &EscalationDecision) -> String {
        let lead = match decision.intervention {
            InterventionKind::AutoRetry | InterventionKind::EmergencyStop => None,
            _ => Some(STOP_LEAD),
        };

        let mut sentences: Vec<String> = lead
            .into_iter()
            .map(str::to_string)
            .chain(
                decision
                    .recommended_actions
                    .iter()
                    .map(|a| a.trim().trim_end_matches(['.', '!', '?']).trim().to_string())
                    .filter(|a| !a.is_empty()),
            )
            .take(MAX_SENTENCES)
            .collect();

        if sentences.iter().all(|s| s == STOP_LEAD) {
            sentences.push(FALLBACK_ACTION.to_string());
        }

        format!("{} {}.", REQUIRED_PREFIX, sentences.join(". "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::compliance::rules;
    use coordination::{EscalationLevel, ReferenceCorpus};

    fn decision(intervention: InterventionKind) -> EscalationDecision {
        EscalationDecision {
            level: EscalationLevel::Medium,
            intervention,
            reason: "test".into(),
            confidence: 0.7,
            recommended_actions: intervention.recommended_actions(),
            cooldown_seconds: 0.0,
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_default_actions_render_corpus_entries() {
        let renderer = InterventionRenderer::new();
        let corpus = ReferenceCorpus::builtin();
        for kind in InterventionKind::ALL {
            let text = renderer.render(&decision(kind));
            assert!(corpus.contains(&text), "{kind}: {text}");
        }
    }

    #[test]
    fn test_examples() {
        let renderer = InterventionRenderer::new();
        assert_eq!(
            renderer.render(&decision(InterventionKind::StrategyChange)),
            "Operator (CAKE): Stop. Try an alternative strategy. Review earlier failures."
        );
        assert_eq!(
            renderer.render(&decision(InterventionKind::EmergencyStop)),
            "Operator (CAKE): Halt all agent operations. Preserve current state. Notify the operator."
        );
    }

    #[test]
    fn test_custom_actions_are_trimmed_and_capped() {
        let mut d = decision(InterventionKind::ResourceIncrease);
        d.recommended_actions = vec![
            "Increase the memory limit.".into(),
            "  ".into(),
            "Retry the build!".into(),
            "Check the logs".into(),
        ];
        let text = InterventionRenderer::new().render(&d);
        assert_eq!(
            text,
            "Operator (CAKE): Stop. Increase the memory limit. Retry the build."
        );
        assert_eq!(rules::check(&text), Ok(()));
    }

    #[test]
    fn test_empty_actions_fall_back() {
        let mut d = decision(InterventionKind::HumanReview);
        d.recommended_actions.clear();
        assert_eq!(
            InterventionRenderer::new().render(&d),
            "Operator (CAKE): Stop. Request human review."
        );

        let mut d = decision(InterventionKind::AutoRetry);
        d.recommended_actions.clear();
        assert_eq!(
            InterventionRenderer::new().render(&d),
            "Operator (CAKE): Request human review."
        );
    }
}
