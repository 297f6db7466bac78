use anyhow::Result;
use chrono::{DateTime, Utc};

use leadflow_core::domain::transcript::{Role, Transcript};

use crate::llm::LlmClient;
use crate::prompts::{render, SUMMARIZATION_PROMPT};

pub const EMPTY_HISTORY_SUMMARY: &str = "No conversation history available.";

/// Renders the paired history as `User:`/`Assistant:` lines. A trailing
/// unanswered user turn is dropped so the summary only covers complete
/// exchanges.
pub fn conversation_text(transcript: &Transcript) -> String {
    transcript
        .paired_turns()
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{role}: {}", turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn summarize(
    llm: &dyn LlmClient,
    transcript: &Transcript,
    now: DateTime<Utc>,
) -> Result<String> {
    let text = conversation_text(transcript);
    if text.is_empty() {
        return Ok(EMPTY_HISTORY_SUMMARY.to_string());
    }

    let prompt = render(
        SUMMARIZATION_PROMPT,
        &[
            ("conversation_text", text.as_str()),
            ("current_datetime", &now.format("%Y-%m-%d %H:%M:%S").to_string()),
            ("session_id", &transcript.session_id.0),
        ],
    );

    let summary = llm.complete(None, &prompt).await?;
    Ok(summary.trim().to_string())
}
