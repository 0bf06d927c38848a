use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

use super::TranscriptionBackend;
use crate::config::OpenAiConfig;
use crate::utils::classify_api_error;
use crate::BackendError;

/// OpenAI Whisper transcription over `/audio/transcriptions`
pub struct WhisperClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    language: Option<String>,
}

impl WhisperClient {
    pub fn new(config: &OpenAiConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.transcription_model.clone(),
            language: config.language.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }

    fn form(&self, file_name: String, bytes: Vec<u8>) -> Result<Form, BackendError> {
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| BackendError::Failed(format!("Invalid audio mime type: {}", e)))?;

        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", part);

        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        Ok(form)
    }
}

#[async_trait]
impl TranscriptionBackend for WhisperClient {
    async fn transcribe(&self, audio: &Path) -> Result<String, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Failed(
                "OPENAI_API_KEY is not configured".to_string(),
            ));
        }

        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| BackendError::Failed(format!("Failed to read extracted audio: {}", e)))?;

        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        tracing::info!(model = %self.model, bytes = bytes.len(), "Sending audio to Whisper");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(self.form(file_name, bytes)?)
            .send()
            .await
            .map_err(|e| BackendError::Failed(format!("Whisper request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Failed(format!("Failed to read Whisper response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_api_error(status, &body));
        }

        Ok(body.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let config = OpenAiConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            ..OpenAiConfig::default()
        };
        let client = WhisperClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/audio/transcriptions");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_request() {
        let client = WhisperClient::new(&OpenAiConfig::default()).unwrap();
        let err = client
            .transcribe(Path::new("/tmp/never-read.mp3"))
            .await
            .unwrap_err();
        assert!(!err.is_rate_limited());
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
