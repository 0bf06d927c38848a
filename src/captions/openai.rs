use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::CaptionBackend;
use crate::config::{CaptionConfig, OpenAiConfig};
use crate::utils::classify_api_error;
use crate::BackendError;

/// OpenAI-compatible `/chat/completions` client
pub struct ChatCompletionClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    persona: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionClient {
    pub fn new(openai: &OpenAiConfig, captions: &CaptionConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(openai.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: openai.api_key.clone(),
            base_url: openai.base_url.trim_end_matches('/').to_string(),
            model: openai.chat_model.clone(),
            persona: captions.persona.clone(),
            temperature: openai.temperature,
            max_tokens: openai.max_tokens,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.persona,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Text of the first choice, if the model produced any
fn first_choice(body: &str) -> Result<String, BackendError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Failed(format!("Unexpected chat completion response: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| BackendError::Failed("Model returned an empty response".to_string()))
}

#[async_trait]
impl CaptionBackend for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Failed(
                "OPENAI_API_KEY is not configured".to_string(),
            ));
        }

        tracing::debug!(model = %self.model, "Calling chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| BackendError::Failed(format!("Chat completion request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Failed(format!("Failed to read chat completion: {}", e)))?;

        if !status.is_success() {
            return Err(classify_api_error(status, &body));
        }

        first_choice(&body)
    }
}
