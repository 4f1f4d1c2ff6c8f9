//! Orchestrator decision rules.
//!
//! After every challenge pass the executor asks one question: is the draft
//! done, does it need a rewrite, or does it need more evidence? The answer
//! is computed here as a pure function of the criticisms and the loop
//! counters, so the routing logic can be tested without running a session.

use serde::{Deserialize, Serialize};

use crate::state::{Criticism, CriticismTag};

/// Routing verdict issued after each challenge pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// The draft is accepted; proceed to publication.
    Finalize,
    /// Evidence is adequate but the draft needs a rewrite.
    Revise,
    /// The draft lacks evidence; run another retrieval cycle.
    ResearchAgain,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Finalize => write!(f, "FINALIZE"),
            Decision::Revise => write!(f, "REVISE"),
            Decision::ResearchAgain => write!(f, "RESEARCH_AGAIN"),
        }
    }
}

/// Ceilings on the two debate loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_revisions: u32,
    pub max_research_cycles: u32,
}

/// A decision plus whether a loop ceiling forced it.
///
/// A forced finalize is a normal termination path, not an error, but it
/// must stay distinguishable from a criticism-driven finalize in the
/// transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub loop_guard: bool,
}

/// Decides the next transition after a challenge pass.
///
/// Precedence:
/// 1. Either counter at its ceiling forces `Finalize` regardless of
///    criticism content. This is the termination guarantee.
/// 2. No criticisms means the draft was accepted: `Finalize`.
/// 3. Any evidence-gap criticism wins over reasoning-gap ones, since
///    missing evidence cannot be fixed by rewriting: `ResearchAgain`.
/// 4. Otherwise the criticisms are about reasoning or presentation:
///    `Revise`.
///
/// The caller increments `revision_count` or `research_cycle_count` when
/// it applies a `Revise` or `ResearchAgain` outcome.
pub fn decide(
    criticisms: &[Criticism],
    revision_count: u32,
    research_cycle_count: u32,
    limits: LoopLimits,
) -> DecisionOutcome {
    if research_cycle_count >= limits.max_research_cycles
        || revision_count >= limits.max_revisions
    {
        return DecisionOutcome {
            decision: Decision::Finalize,
            loop_guard: true,
        };
    }

    if criticisms.is_empty() {
        return DecisionOutcome {
            decision: Decision::Finalize,
            loop_guard: false,
        };
    }

    let has_evidence_gap = criticisms
        .iter()
        .any(|c| c.tag == CriticismTag::EvidenceGap);

    DecisionOutcome {
        decision: if has_evidence_gap {
            Decision::ResearchAgain
        } else {
            Decision::Revise
        },
        loop_guard: false,
    }
}

/// Classifies one raw criticism into a gap category.
///
/// The revise-vs-research tie-break hinges on this classification, and no
/// single heuristic fits every challenger, so the policy is injected at
/// session host construction rather than hard-coded.
pub trait ClassificationPolicy: Send + Sync {
    fn classify(&self, criticism: &str) -> CriticismTag;
}

/// Evidence-gap vocabulary used by [`KeywordPolicy`].
const EVIDENCE_KEYWORDS: &[&str] = &[
    "evidence",
    "source",
    "citation",
    "reference",
    "data",
    "unsupported",
    "cite",
];

/// Classifies by scanning for evidence-gap vocabulary, case-insensitively.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordPolicy;

impl ClassificationPolicy for KeywordPolicy {
    fn classify(&self, criticism: &str) -> CriticismTag {
        let lower = criticism.to_lowercase();
        if EVIDENCE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            CriticismTag::EvidenceGap
        } else {
            CriticismTag::ReasoningGap
        }
    }
}

/// Default policy: honor the `[evidence]` / `[reasoning]` marker the
/// challenge prompt asks for, falling back to keyword scanning when the
/// challenger did not comply.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixPolicy {
    fallback: KeywordPolicy,
}

impl ClassificationPolicy for PrefixPolicy {
    fn classify(&self, criticism: &str) -> CriticismTag {
        let lower = criticism.trim_start().to_lowercase();
        if lower.starts_with("[evidence]") {
            CriticismTag::EvidenceGap
        } else if lower.starts_with("[reasoning]") {
            CriticismTag::ReasoningGap
        } else {
            self.fallback.classify(criticism)
        }
    }
}
