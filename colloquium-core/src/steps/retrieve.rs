//! Evidence retrieval step.
//!
//! Queries every configured evidence source and merges their results in
//! source order, dropping exact duplicates by content. On a re-research pass
//! the query is first sharpened against the criticisms that sent the debate
//! back here; the refined query is retrieval-local and never replaces the
//! validated question.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::render_criticisms;
use crate::collab::{EvidenceSource, GenerationBackend};
use crate::error::SessionError;
use crate::state::{Criticism, Document, ResearchState};

const QUERY_REVISER_PROMPT: &str =
    "You are a search query reviser. Rewrite the research question into a \
     more effective keyword search query for an academic paper database, \
     guided by the criticisms of the failed retrieval attempt. Respond with \
     ONLY the search query text, without conversational phrases and without \
     surrounding quotes.";

/// Retrieves evidence documents for the session's current question.
///
/// Sources that fail are logged and skipped; zero documents across all
/// sources is a terminal failure.
pub async fn run(
    state: &ResearchState,
    sources: &[Arc<dyn EvidenceSource>],
    generation: &dyn GenerationBackend,
) -> crate::error::Result<Vec<Document>> {
    let mut query = state.question().to_string();

    // Criticisms are only present here on a research-again pass.
    if !state.criticisms.is_empty()
        && let Some(refined) = refine_query(state.question(), &state.criticisms, generation).await
    {
        debug!(query = refined.as_str(), "Search query refined");
        query = refined;
    }

    let mut documents = Vec::new();
    let mut seen = HashSet::new();
    for source in sources {
        match source.search(&query).await {
            Ok(results) => {
                for doc in results {
                    if seen.insert(doc.content.clone()) {
                        documents.push(doc);
                    }
                }
            }
            Err(e) => {
                warn!(
                    source = source.name(),
                    error = %e,
                    "Evidence source failed, skipping"
                );
            }
        }
    }

    if documents.is_empty() {
        return Err(SessionError::NoSourcesFound {
            sources_queried: sources.len(),
        }
        .into());
    }

    debug!(document_count = documents.len(), "Evidence retrieved");
    Ok(documents)
}

/// Asks the backend for a sharper search query. Any failure or blank
/// response falls back to the unrefined question.
async fn refine_query(
    question: &str,
    criticisms: &[Criticism],
    generation: &dyn GenerationBackend,
) -> Option<String> {
    let context = format!(
        "Original Question: {question}\n\nCriticisms of the last retrieval attempt:\n{}",
        render_criticisms(criticisms)
    );

    match generation.generate(QUERY_REVISER_PROMPT, &context).await {
        Ok(response) => {
            let refined = response.trim().trim_matches('"').trim();
            if refined.is_empty() {
                None
            } else {
                Some(refined.to_string())
            }
        }
        Err(e) => {
            warn!(error = %e, "Query refinement failed, keeping validated question");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MockGenerationBackend, StaticEvidenceSource};
    use crate::error::{ColloquiumError, EvidenceError, GenerationError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct FailingSource;

    #[async_trait]
    impl EvidenceSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn search(&self, _query: &str) -> Result<Vec<Document>, EvidenceError> {
            Err(EvidenceError::Connection {
                source: "failing".into(),
                message: "connection refused".into(),
            })
        }
    }

    struct RecordingSource {
        queries: std::sync::Mutex<Vec<String>>,
        documents: Vec<Document>,
    }

    impl RecordingSource {
        fn new(documents: Vec<Document>) -> Self {
            Self {
                queries: std::sync::Mutex::new(Vec::new()),
                documents,
            }
        }
    }

    #[async_trait]
    impl EvidenceSource for RecordingSource {
        fn name(&self) -> &str {
            "recording"
        }

        async fn search(&self, query: &str) -> Result<Vec<Document>, EvidenceError> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.documents.clone())
        }
    }

    struct BrokenBackend;

    #[async_trait]
    impl GenerationBackend for BrokenBackend {
        fn name(&self) -> &str {
            "broken"
        }

        async fn generate(&self, _p: &str, _c: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Connection {
                message: "down".into(),
            })
        }
    }

    fn state_with(question: &str, criticisms: Vec<Criticism>) -> ResearchState {
        let mut state = ResearchState::new(question);
        state.validated_question = Some(question.to_string());
        state.criticisms = criticisms;
        state
    }

    #[tokio::test]
    async fn test_merges_sources_in_order_and_dedupes() {
        let first = StaticEvidenceSource::new(
            "alpha",
            vec![
                Document::new("alpha", "shared finding", 0.9),
                Document::new("alpha", "alpha-only finding", 0.8),
            ],
        );
        let second = StaticEvidenceSource::new(
            "beta",
            vec![
                Document::new("beta", "shared finding", 0.7),
                Document::new("beta", "beta-only finding", 0.6),
            ],
        );
        let sources: Vec<Arc<dyn EvidenceSource>> = vec![Arc::new(first), Arc::new(second)];
        let backend = MockGenerationBackend::new();

        let docs = run(&state_with("q", vec![]), &sources, &backend)
            .await
            .unwrap();
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["shared finding", "alpha-only finding", "beta-only finding"]
        );
        // The duplicate kept the first source's copy.
        assert_eq!(docs[0].source, "alpha");
    }

    #[tokio::test]
    async fn test_failing_source_is_skipped() {
        let sources: Vec<Arc<dyn EvidenceSource>> = vec![
            Arc::new(FailingSource),
            Arc::new(StaticEvidenceSource::new(
                "beta",
                vec![Document::new("beta", "still here", 0.5)],
            )),
        ];
        let backend = MockGenerationBackend::new();
        let docs = run(&state_with("q", vec![]), &sources, &backend)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "still here");
    }

    #[tokio::test]
    async fn test_zero_documents_is_terminal() {
        let sources: Vec<Arc<dyn EvidenceSource>> = vec![
            Arc::new(FailingSource),
            Arc::new(StaticEvidenceSource::new("empty", vec![])),
        ];
        let backend = MockGenerationBackend::new();
        let err = run(&state_with("q", vec![]), &sources, &backend)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ColloquiumError::Session(SessionError::NoSourcesFound { sources_queried: 2 })
        ));
    }

    #[tokio::test]
    async fn test_criticisms_trigger_query_refinement() {
        let source = Arc::new(RecordingSource::new(vec![Document::new(
            "recording",
            "doc",
            1.0,
        )]));
        let sources: Vec<Arc<dyn EvidenceSource>> = vec![Arc::clone(&source) as _];
        let backend = MockGenerationBackend::new();
        backend.queue_response("\"dendrite suppression solid electrolyte\"");

        let state = state_with(
            "what limits battery density",
            vec![Criticism::evidence("no source covers dendrites")],
        );
        run(&state, &sources, &backend).await.unwrap();

        let queries = source.queries.lock().unwrap();
        // Surrounding quotes from the backend are stripped.
        assert_eq!(
            queries.as_slice(),
            ["dendrite suppression solid electrolyte"]
        );
    }

    #[tokio::test]
    async fn test_no_refinement_without_criticisms() {
        let source = Arc::new(RecordingSource::new(vec![Document::new(
            "recording",
            "doc",
            1.0,
        )]));
        let sources: Vec<Arc<dyn EvidenceSource>> = vec![Arc::clone(&source) as _];
        // Would return the fallback text if it were consulted.
        let backend = MockGenerationBackend::new();

        let state = state_with("the validated question", vec![]);
        run(&state, &sources, &backend).await.unwrap();

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries.as_slice(), ["the validated question"]);
    }

    #[tokio::test]
    async fn test_refinement_failure_falls_back_to_question() {
        let source = Arc::new(RecordingSource::new(vec![Document::new(
            "recording",
            "doc",
            1.0,
        )]));
        let sources: Vec<Arc<dyn EvidenceSource>> = vec![Arc::clone(&source) as _];

        let state = state_with(
            "the validated question",
            vec![Criticism::evidence("unsupported claim")],
        );
        run(&state, &sources, &BrokenBackend).await.unwrap();

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries.as_slice(), ["the validated question"]);
    }

    #[tokio::test]
    async fn test_blank_refinement_falls_back_to_question() {
        let source = Arc::new(RecordingSource::new(vec![Document::new(
            "recording",
            "doc",
            1.0,
        )]));
        let sources: Vec<Arc<dyn EvidenceSource>> = vec![Arc::clone(&source) as _];
        let backend = MockGenerationBackend::new();
        backend.queue_response("  \"\"  ");

        let state = state_with(
            "the validated question",
            vec![Criticism::evidence("unsupported claim")],
        );
        run(&state, &sources, &backend).await.unwrap();

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries.as_slice(), ["the validated question"]);
    }
}
