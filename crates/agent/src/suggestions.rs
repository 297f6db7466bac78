use tracing::debug;

use crate::llm::LlmClient;
use crate::prompts::{render, SUGGESTIONS_PROMPT, SUGGESTIONS_SYSTEM};

/// Served with error responses, before any model output exists.
pub const OPENING_PROMPTS: [&str; 3] = [
    "What services do you offer?",
    "How can you help me move overseas?",
    "Why should I choose your consultancy?",
];

/// Served when suggestion generation itself fails.
pub const FALLBACK_PROMPTS: [&str; 3] = [
    "Can you explain that further?",
    "What are some examples?",
    "Why is that important?",
];

fn prompts_of(values: [&str; 3]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn opening_prompts() -> Vec<String> {
    prompts_of(OPENING_PROMPTS)
}

/// Generates three pretype prompts from the assistant's last response. Any
/// model failure degrades to the static fallback trio, never to an error.
pub async fn pretype_prompts(llm: &dyn LlmClient, model_response: &str) -> Vec<String> {
    let prompt = render(SUGGESTIONS_PROMPT, &[("model_response", model_response)]);

    match llm.complete(Some(SUGGESTIONS_SYSTEM), &prompt).await {
        Ok(raw) => {
            let prompts: Vec<String> = raw
                .split("\n\n")
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect();
            if prompts.is_empty() {
                prompts_of(FALLBACK_PROMPTS)
            } else {
                prompts
            }
        }
        Err(error) => {
            debug!(event_name = "suggestions.fallback", error = %error);
            prompts_of(FALLBACK_PROMPTS)
        }
    }
}
