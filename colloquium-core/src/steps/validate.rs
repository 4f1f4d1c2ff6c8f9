//! Question validation step.
//!
//! The gatekeeper decides whether a question is clear, research-worthy, and
//! in scope before any retrieval spend happens. A rejected question is a
//! terminal outcome carrying a rephrasing suggestion for the caller.

use tracing::debug;

use crate::collab::GenerationBackend;
use crate::error::{GenerationError, SessionError};

const GATEKEEPER_PROMPT: &str =
    "You are a gatekeeper that decides whether a user question is clear, \
     research-worthy, and in scope for academic research. Respond in exactly \
     this format, one item per line:\n\
     APPROVED: yes or no\n\
     QUESTION: <a cleaned-up version of the question, or the original>\n\
     SUGGESTION: <when rejecting, how the user should rephrase>";

/// The gatekeeper's parsed verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Verdict {
    approved: bool,
    question: String,
    suggestion: String,
}

/// Validates the question, returning the text to research from.
///
/// Blank input is rejected locally without consulting the backend.
pub async fn run(
    question: &str,
    generation: &dyn GenerationBackend,
) -> crate::error::Result<String> {
    if question.trim().is_empty() {
        return Err(SessionError::ValidationRejected {
            reason: "the question is empty".to_string(),
            suggestion: "Provide a non-empty research question.".to_string(),
        }
        .into());
    }

    let context = format!("Validate this question: {question}");
    let response = generation.generate(GATEKEEPER_PROMPT, &context).await?;
    let verdict = parse_verdict(&response)?;

    debug!(approved = verdict.approved, "Gatekeeper verdict parsed");

    if !verdict.approved {
        return Err(SessionError::ValidationRejected {
            reason: "the gatekeeper judged the question unclear or not research-worthy"
                .to_string(),
            suggestion: if verdict.suggestion.is_empty() {
                "Rephrase the question as a single, specific research question.".to_string()
            } else {
                verdict.suggestion
            },
        }
        .into());
    }

    if verdict.question.is_empty() {
        Ok(question.to_string())
    } else {
        Ok(verdict.question)
    }
}

fn parse_verdict(text: &str) -> Result<Verdict, GenerationError> {
    let mut approved = None;
    let mut question = String::new();
    let mut suggestion = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(value) = trimmed.strip_prefix("APPROVED:") {
            approved = Some(value.trim().eq_ignore_ascii_case("yes"));
        } else if let Some(value) = trimmed.strip_prefix("QUESTION:") {
            question = value.trim().to_string();
        } else if let Some(value) = trimmed.strip_prefix("SUGGESTION:") {
            suggestion = value.trim().to_string();
        }
    }

    match approved {
        Some(approved) => Ok(Verdict {
            approved,
            question,
            suggestion,
        }),
        None => Err(GenerationError::ResponseParse {
            message: "gatekeeper response is missing the APPROVED line".to_string(),
        }),
    }
}
