//! Single-question run loop: streams debate events to the terminal.

use std::io::{self, Write};

use colloquium_core::collab::Collaborators;
use colloquium_core::config::Config;
use colloquium_core::events::{EventRecord, ResearchEvent};
use colloquium_core::session::SessionHost;
use colloquium_core::state::SessionStatus;

/// Runs one debate to completion, streaming events as they arrive.
///
/// Ctrl-C requests cancellation and keeps draining so the terminal event
/// still reaches the user. Exits non-zero when the session did not publish.
pub async fn run_question(question: &str, config: Config, json: bool) -> anyhow::Result<()> {
    let collab = Collaborators::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Collaborator setup failed: {}", e))?;
    let host = SessionHost::new(collab, config);
    let mut handle = host.start_session(question).await;

    if !json {
        println!("\x1b[90m  session {}\x1b[0m", handle.session_id());
    }

    let mut interrupted = false;
    loop {
        tokio::select! {
            maybe = handle.next_event() => match maybe {
                Some(record) => print_record(&record, json)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("\n  cancelling session...");
                handle.cancel();
            }
        }
    }

    let state = handle.join().await?;
    tracing::debug!(session_id = %state.session_id, status = %state.status, "Session finished");
    if state.status != SessionStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_record(record: &EventRecord, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(record)?);
        return Ok(());
    }
    match &record.event {
        ResearchEvent::DraftAnswerToken { token } => {
            print!("{}", token);
            let _ = io::stdout().flush();
        }
        event => {
            if let Some(line) = format_event(event) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

/// Formats one non-token event as a terminal line.
fn format_event(event: &ResearchEvent) -> Option<String> {
    match event {
        ResearchEvent::ResearchStarted { question, .. } => Some(format!(
            "\x1b[36m  [host]\x1b[0m researching: {}",
            question
        )),
        ResearchEvent::QuestionValidated { validated_question } => Some(format!(
            "\x1b[36m  [gatekeeper]\x1b[0m approved: {}",
            validated_question
        )),
        ResearchEvent::ValidationError { error, suggestion } => Some(format!(
            "\x1b[31m  [gatekeeper]\x1b[0m rejected: {}\n  try: {}",
            error, suggestion
        )),
        ResearchEvent::DocumentsRetrieved { document_count } => Some(format!(
            "\x1b[36m  [retriever]\x1b[0m {} documents",
            document_count
        )),
        ResearchEvent::DraftGenerated { draft_length } => Some(format!(
            "\n\x1b[90m  draft complete ({} characters)\x1b[0m",
            draft_length
        )),
        ResearchEvent::CriticismsReceived { criticism_count } => Some(format!(
            "\x1b[33m  [challenger]\x1b[0m {} criticisms",
            criticism_count
        )),
        ResearchEvent::OrchestratorDecision { decision } => Some(format!(
            "\x1b[35m  [orchestrator]\x1b[0m {}",
            decision
        )),
        // The published paper follows immediately; no separate line needed.
        ResearchEvent::ResearchCompleted { .. } => None,
        ResearchEvent::PaperGenerated {
            paper_id,
            paper_content,
        } => Some(format!(
            "\n\x1b[32mAnswer\x1b[0m (paper {}):\n{}",
            paper_id, paper_content
        )),
        ResearchEvent::ResearchFailed { error } => {
            Some(format!("\x1b[31m  research failed:\x1b[0m {}", error))
        }
        ResearchEvent::Error { error } => Some(format!("\x1b[31m  error:\x1b[0m {}", error)),
        ResearchEvent::DraftAnswerToken { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokens_have_no_line_format() {
        assert_eq!(
            format_event(&ResearchEvent::DraftAnswerToken { token: "x".into() }),
            None
        );
    }

    #[test]
    fn test_completion_is_silent_until_the_paper() {
        assert_eq!(
            format_event(&ResearchEvent::ResearchCompleted {
                final_answer: "a".into()
            }),
            None
        );
        let line = format_event(&ResearchEvent::PaperGenerated {
            paper_id: "11111111-2222-3333-4444-555555555555".into(),
            paper_content: "The answer.".into(),
        })
        .unwrap();
        assert!(line.contains("11111111-2222-3333-4444-555555555555"));
        assert!(line.contains("The answer."));
    }

    #[test]
    fn test_rejection_line_carries_the_suggestion() {
        let line = format_event(&ResearchEvent::ValidationError {
            error: "too vague".into(),
            suggestion: "name a chemistry".into(),
        })
        .unwrap();
        assert!(line.contains("too vague"));
        assert!(line.contains("name a chemistry"));
    }
}
