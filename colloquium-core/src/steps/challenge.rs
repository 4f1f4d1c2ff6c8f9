//! Draft challenge step.
//!
//! A critic reviews the draft against the question and the evidence and
//! returns a list of criticisms. An empty list is a meaningful outcome: the
//! draft was accepted as-is.

use tracing::debug;

use super::render_documents;
use crate::collab::GenerationBackend;
use crate::decision::ClassificationPolicy;
use crate::state::{Criticism, ResearchState};

const CRITIC_PROMPT: &str =
    "You are a critical reviewer. Identify weaknesses in the draft answer: \
     look for logical gaps, lack of evidence, or unanswered parts of the \
     question. Respond with a bulleted list, one criticism per line starting \
     with '- ', prefixed with [evidence] when more or better sources would \
     fix it or [reasoning] when the argument or presentation is the problem. \
     If the draft is acceptable as-is, respond with exactly NONE.";

/// Challenges the current draft, returning tagged criticisms.
pub async fn run(
    state: &ResearchState,
    generation: &dyn GenerationBackend,
    policy: &dyn ClassificationPolicy,
) -> crate::error::Result<Vec<Criticism>> {
    let context = format!(
        "Question: {}\n\nDraft Answer:\n{}\n\nDocuments:\n{}",
        state.question(),
        state.draft_answer.as_deref().unwrap_or_default(),
        render_documents(&state.documents)
    );

    let response = generation.generate(CRITIC_PROMPT, &context).await?;
    let criticisms = parse_criticisms(&response, policy);
    debug!(criticism_count = criticisms.len(), "Challenge pass complete");
    Ok(criticisms)
}

/// Parses the critic's bulleted response. Lines that are not bullets are
/// ignored; a bare `NONE` means acceptance.
fn parse_criticisms(text: &str, policy: &dyn ClassificationPolicy) -> Vec<Criticism> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    let mut criticisms = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) else {
            continue;
        };
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        // Classify on the marker-bearing text, store it without the marker.
        let tag = policy.classify(item);
        criticisms.push(Criticism {
            text: strip_marker(item).to_string(),
            tag,
        });
    }
    criticisms
}

fn strip_marker(text: &str) -> &str {
    let lower = text.to_lowercase();
    for marker in ["[evidence]", "[reasoning]"] {
        if lower.starts_with(marker) {
            return text[marker.len()..].trim_start();
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::MockGenerationBackend;
    use crate::decision::PrefixPolicy;
    use crate::state::{CriticismTag, Document};
    use pretty_assertions::assert_eq;

    fn state_with_draft() -> ResearchState {
        let mut state = ResearchState::new("what limits battery density");
        state.validated_question = Some("What limits battery energy density?".into());
        state.documents = vec![Document::new("openalex", "Cathode chemistry dominates.", 0.9)];
        state.draft_answer = Some("Cathodes limit density.".into());
        state
    }

    #[tokio::test]
    async fn test_parses_tagged_bullets() {
        let backend = MockGenerationBackend::new();
        backend.queue_response(
            "- [evidence] No source covers anode-side losses.\n\
             - [reasoning] The conclusion overreaches the cited data.",
        );
        let criticisms = run(&state_with_draft(), &backend, &PrefixPolicy::default())
            .await
            .unwrap();
        assert_eq!(criticisms.len(), 2);
        assert_eq!(criticisms[0].tag, CriticismTag::EvidenceGap);
        assert_eq!(criticisms[0].text, "No source covers anode-side losses.");
        assert_eq!(criticisms[1].tag, CriticismTag::ReasoningGap);
        assert_eq!(criticisms[1].text, "The conclusion overreaches the cited data.");
    }

    #[tokio::test]
    async fn test_none_means_acceptance() {
        let backend = MockGenerationBackend::new();
        backend.queue_response("NONE");
        let criticisms = run(&state_with_draft(), &backend, &PrefixPolicy::default())
            .await
            .unwrap();
        assert!(criticisms.is_empty());
    }

    #[test]
    fn test_parse_none_is_case_insensitive() {
        let policy = PrefixPolicy::default();
        assert!(parse_criticisms("none", &policy).is_empty());
        assert!(parse_criticisms("  None  ", &policy).is_empty());
    }

    #[test]
    fn test_parse_accepts_asterisk_bullets() {
        let policy = PrefixPolicy::default();
        let criticisms = parse_criticisms("* [reasoning] repetitive phrasing", &policy);
        assert_eq!(criticisms.len(), 1);
        assert_eq!(criticisms[0].text, "repetitive phrasing");
    }

    #[test]
    fn test_parse_ignores_prose_lines() {
        let policy = PrefixPolicy::default();
        let criticisms = parse_criticisms(
            "Here are my concerns:\n\
             - [evidence] claim two is unsupported\n\
             Overall the draft is close.",
            &policy,
        );
        assert_eq!(criticisms.len(), 1);
        assert_eq!(criticisms[0].text, "claim two is unsupported");
    }

    #[test]
    fn test_parse_unmarked_bullet_uses_keyword_fallback() {
        let policy = PrefixPolicy::default();
        let criticisms = parse_criticisms("- the second claim has no citation", &policy);
        assert_eq!(criticisms[0].tag, CriticismTag::EvidenceGap);
        // No marker, so nothing is stripped.
        assert_eq!(criticisms[0].text, "the second claim has no citation");
    }

    #[test]
    fn test_parse_empty_response() {
        let policy = PrefixPolicy::default();
        assert!(parse_criticisms("", &policy).is_empty());
        assert!(parse_criticisms("   \n  ", &policy).is_empty());
    }

    #[test]
    fn test_strip_marker_is_case_insensitive() {
        assert_eq!(strip_marker("[Evidence] needs a source"), "needs a source");
        assert_eq!(strip_marker("[REASONING] circular"), "circular");
        assert_eq!(strip_marker("plain text"), "plain text");
    }
}
