use anyhow::Result;
use tracing::debug;

use leadflow_core::domain::snapshot::FieldSnapshot;
use leadflow_core::extract::snapshot_from_model_text;

use crate::llm::LlmClient;
use crate::prompts::{render, EXTRACTION_PROMPT};

/// Asks the model for `Key: value` pairs over all raw user inputs of one
/// session and parses whatever it returns into a validated snapshot.
pub async fn extract_snapshot(
    llm: &dyn LlmClient,
    user_inputs: &[String],
) -> Result<FieldSnapshot> {
    let joined = user_inputs.join(".\n ");
    let prompt = render(EXTRACTION_PROMPT, &[("input_query", &joined)]);

    let raw = llm.complete(None, &prompt).await?;
    debug!(event_name = "extraction.model_response", response = %raw);

    Ok(snapshot_from_model_text(&raw))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;

    use leadflow_core::domain::transcript::Turn;

    use super::extract_snapshot;
    use crate::llm::LlmClient;

    struct ScriptedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system: Option<&str>, _prompt: &str) -> Result<String> {
            Ok(self.reply.clone())
        }

        async fn converse(&self, _system: &str, _turns: &[Turn]) -> Result<String> {
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn model_pairs_become_a_validated_snapshot() {
        let llm = ScriptedLlm {
            reply: "Name: Jane Doe, Age: 30, Email: jane@example.com, Phone: 555 0100, \
                    Country Code: +1, Nationality: None"
                .to_string(),
        };

        let snapshot = extract_snapshot(&llm, &["hi, I am Jane Doe".to_string()])
            .await
            .expect("extraction should succeed");

        assert_eq!(snapshot.first_name.as_deref(), Some("Jane"));
        assert_eq!(snapshot.last_name.as_deref(), Some("Doe"));
        assert_eq!(snapshot.email.as_deref(), Some("jane@example.com"));
        assert_eq!(snapshot.age, Some(30));
        assert_eq!(snapshot.nationality, None);
    }
}
