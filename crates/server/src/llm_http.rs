//! HTTP implementation of the `LlmClient` boundary.
//!
//! One client covers the three supported providers; the request and response
//! shapes differ per provider but all of them reduce to "send role-tagged
//! messages, read back one text completion".

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use leadflow_agent::llm::LlmClient;
use leadflow_core::config::{LlmConfig, LlmProvider};
use leadflow_core::domain::transcript::Turn;

const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        let client =
            Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            client,
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| anyhow!("llm api key is not configured"))
    }

    async fn dispatch(&self, system: Option<&str>, messages: Vec<serde_json::Value>) -> Result<String> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let result = match self.provider {
                LlmProvider::Anthropic => self.anthropic(system, messages.clone()).await,
                LlmProvider::OpenAi => self.openai(system, messages.clone()).await,
                LlmProvider::Ollama => self.ollama(system, messages.clone()).await,
            };
            match result {
                Ok(text) => {
                    debug!(event_name = "llm.completion.received", provider = ?self.provider);
                    return Ok(text);
                }
                Err(error) => {
                    debug!(
                        event_name = "llm.completion.retrying",
                        provider = ?self.provider,
                        attempt,
                        error = %error,
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("llm request produced no result")))
    }

    async fn anthropic(
        &self,
        system: Option<&str>,
        messages: Vec<serde_json::Value>,
    ) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?
            .error_for_status()
            .context("anthropic request rejected")?;

        let parsed: AnthropicResponse =
            response.json().await.context("anthropic response decode failed")?;
        parsed
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| anyhow!("anthropic response carried no content"))
    }

    async fn openai(
        &self,
        system: Option<&str>,
        messages: Vec<serde_json::Value>,
    ) -> Result<String> {
        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            all_messages.push(json!({"role": "system", "content": system}));
        }
        all_messages.extend(messages);

        let body = json!({
            "model": self.model,
            "messages": all_messages,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?
            .error_for_status()
            .context("openai request rejected")?;

        let parsed: OpenAiResponse =
            response.json().await.context("openai response decode failed")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("openai response carried no choices"))
    }

    async fn ollama(
        &self,
        system: Option<&str>,
        messages: Vec<serde_json::Value>,
    ) -> Result<String> {
        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            all_messages.push(json!({"role": "system", "content": system}));
        }
        all_messages.extend(messages);

        let body = json!({
            "model": self.model,
            "messages": all_messages,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .context("ollama request failed")?
            .error_for_status()
            .context("ollama request rejected")?;

        let parsed: OllamaResponse =
            response.json().await.context("ollama response decode failed")?;
        Ok(parsed.message.content)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String> {
        let messages = vec![json!({"role": "user", "content": prompt})];
        self.dispatch(system, messages).await
    }

    async fn converse(&self, system: &str, turns: &[Turn]) -> Result<String> {
        let messages = turns
            .iter()
            .map(|turn| json!({"role": turn.role.as_str(), "content": turn.text}))
            .collect();
        self.dispatch(Some(system), messages).await
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}
