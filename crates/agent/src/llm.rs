use anyhow::Result;
use async_trait::async_trait;

use leadflow_core::domain::transcript::Turn;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-shot completion of a rendered prompt.
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String>;

    /// Multi-turn completion over a conversation history. The last turn is
    /// expected to be a user turn.
    async fn converse(&self, system: &str, turns: &[Turn]) -> Result<String>;
}
