use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::{read_video, request_failed, response_error, PlatformAdapter, UploadReceipt};
use crate::config::InstagramConfig;
use crate::models::Platform;
use crate::UploadError;

const GRAPH_URL: &str = "https://graph.facebook.com/v19.0";
const RUPLOAD_URL: &str = "https://rupload.facebook.com/ig-api-upload/v19.0";

/// Container processing state reported by the Graph API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Finished,
    InProgress,
    Failed(String),
}

impl ContainerStatus {
    fn from_response(response: &StatusResponse) -> Self {
        match response.status_code.as_deref() {
            Some("FINISHED") | Some("PUBLISHED") => ContainerStatus::Finished,
            Some("ERROR") | Some("EXPIRED") => ContainerStatus::Failed(
                response
                    .status
                    .clone()
                    .unwrap_or_else(|| "container processing failed".to_string()),
            ),
            _ => ContainerStatus::InProgress,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    id: String,
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink: Option<String>,
    shortcode: Option<String>,
}

/// Instagram Reels publishing through the Graph API
pub struct InstagramAdapter {
    client: Client,
    config: InstagramConfig,
    poll_interval: Duration,
    max_polls: u32,
}

impl InstagramAdapter {
    pub fn new(client: Client, config: InstagramConfig) -> Self {
        Self {
            client,
            config,
            poll_interval: Duration::from_secs(5),
            max_polls: 60,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn credentials(&self) -> Result<(&str, &str), UploadError> {
        match (self.config.user_id.as_deref(), self.config.access_token.as_deref()) {
            (Some(user), Some(token)) if !user.is_empty() && !token.is_empty() => Ok((user, token)),
            _ => Err(UploadError::Authentication(
                "INSTAGRAM_USER_ID and INSTAGRAM_ACCESS_TOKEN must be set".to_string(),
            )),
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, UploadError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_failed("Failed to read Instagram response", e))?;
        if !status.is_success() {
            return Err(response_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| UploadError::Platform(format!("Unexpected Instagram response: {}", e)))
    }

    async fn create_container(
        &self,
        user: &str,
        token: &str,
        caption: &str,
    ) -> Result<ContainerResponse, UploadError> {
        let share_to_feed = self.config.share_to_feed.to_string();
        let params = [
            ("media_type", "REELS"),
            ("upload_type", "resumable"),
            ("caption", caption),
            ("share_to_feed", share_to_feed.as_str()),
            ("access_token", token),
        ];
        let response = self
            .client
            .post(format!("{}/{}/media", GRAPH_URL, user))
            .form(&params)
            .send()
            .await
            .map_err(|e| request_failed("Failed to create Instagram container", e))?;
        Self::read_json(response).await
    }

    async fn push_bytes(&self, upload_uri: &str, token: &str, bytes: Vec<u8>) -> Result<(), UploadError> {
        let size = bytes.len();
        let response = self
            .client
            .post(upload_uri)
            .header("Authorization", format!("OAuth {}", token))
            .header("offset", "0")
            .header("file_size", size.to_string())
            .body(bytes)
            .send()
            .await
            .map_err(|e| request_failed("Instagram upload failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(response_error(status, &body));
        }
        Ok(())
    }

    async fn wait_until_finished(&self, container: &str, token: &str) -> Result<(), UploadError> {
        for attempt in 1..=self.max_polls {
            let response = self
                .client
                .get(format!("{}/{}", GRAPH_URL, container))
                .query(&[("fields", "status_code,status"), ("access_token", token)])
                .send()
                .await
                .map_err(|e| request_failed("Failed to check Instagram container", e))?;
            let status: StatusResponse = Self::read_json(response).await?;

            match ContainerStatus::from_response(&status) {
                ContainerStatus::Finished => return Ok(()),
                ContainerStatus::Failed(reason) => return Err(UploadError::Platform(reason)),
                ContainerStatus::InProgress => {
                    tracing::debug!(platform = %Platform::Instagram, attempt, "Container still processing");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(UploadError::Platform(format!(
            "Container not ready after {} status checks",
            self.max_polls
        )))
    }

    async fn publish(&self, user: &str, token: &str, container: &str) -> Result<String, UploadError> {
        let response = self
            .client
            .post(format!("{}/{}/media_publish", GRAPH_URL, user))
            .form(&[("creation_id", container), ("access_token", token)])
            .send()
            .await
            .map_err(|e| request_failed("Failed to publish Instagram reel", e))?;
        let published: IdResponse = Self::read_json(response).await?;
        Ok(published.id)
    }

    /// Permalink lookup is best effort; the reel is already live
    async fn permalink(&self, media_id: &str, token: &str) -> String {
        let lookup = async {
            let response = self
                .client
                .get(format!("{}/{}", GRAPH_URL, media_id))
                .query(&[("fields", "permalink,shortcode"), ("access_token", token)])
                .send()
                .await
                .map_err(|e| request_failed("Failed to fetch permalink", e))?;
            Self::read_json::<PermalinkResponse>(response).await
        };

        match lookup.await {
            Ok(found) => reel_url(media_id, &found),
            Err(e) => {
                tracing::warn!(platform = %Platform::Instagram, error = %e, "Could not fetch permalink");
                format!("https://instagram.com/reel/{}", media_id)
            }
        }
    }
}

fn reel_url(media_id: &str, found: &PermalinkResponse) -> String {
    if let Some(permalink) = found.permalink.as_deref().filter(|p| !p.is_empty()) {
        return permalink.to_string();
    }
    let code = found.shortcode.as_deref().unwrap_or(media_id);
    format!("https://instagram.com/reel/{}", code)
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn is_configured(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn upload(
        &self,
        video: &Path,
        caption: &str,
        _title: Option<&str>,
    ) -> Result<UploadReceipt, UploadError> {
        let (user, token) = self.credentials()?;
        let bytes = read_video(video).await?;

        let container = self.create_container(user, token, caption).await?;
        let upload_uri = container
            .uri
            .clone()
            .unwrap_or_else(|| format!("{}/{}", RUPLOAD_URL, container.id));

        tracing::debug!(platform = %Platform::Instagram, container = %container.id, size = bytes.len(), "Uploading reel bytes");
        self.push_bytes(&upload_uri, token, bytes).await?;
        self.wait_until_finished(&container.id, token).await?;

        let media_id = self.publish(user, token, &container.id).await?;
        let url = self.permalink(&media_id, token).await;
        Ok(UploadReceipt::new(media_id, url))
    }
}
