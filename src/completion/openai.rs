use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::Result;
use async_trait::async_trait;
use log::{info, error, debug};

use super::{ChatMessage, CompletionService};
use crate::config::CompletionSettings;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Client for any endpoint speaking the OpenAI chat-completions dialect
/// (xAI Grok by default).
#[derive(Clone)]
pub struct OpenAICompatibleClient {
    client: Client,
    settings: CompletionSettings,
}

impl OpenAICompatibleClient {
    pub fn new(settings: CompletionSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionService for OpenAICompatibleClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        info!(
            "Sending {} messages to {} with model: {}",
            messages.len(),
            self.settings.base_url,
            self.settings.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Completion API error {}: {}", status, error_text);
            return Err(anyhow::anyhow!("Completion API error {}: {}", status, error_text));
        }

        let body: ChatResponse = response.json().await?;

        if let Some(usage) = &body.usage {
            debug!(
                "Token usage - Prompt: {}, Completion: {}, Total: {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response choices from completion API"))
    }
}
