use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

pub mod instagram;
pub mod oauth;
pub mod tiktok;
pub mod youtube;

use crate::config::Config;
use crate::models::{Platform, PlatformCaptions, UploadOutcome};
use crate::utils::api_error_message;
use crate::UploadError;

pub use instagram::InstagramAdapter;
pub use tiktok::TikTokAdapter;
pub use youtube::YouTubeAdapter;

/// Identifier and public URL of a finished upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub video_id: String,
    pub url: String,
}

impl UploadReceipt {
    pub fn new(video_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            url: url.into(),
        }
    }
}

/// Uploads a video to one platform
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether credentials are present locally; never touches the network
    fn is_configured(&self) -> bool;

    /// `title` is only meaningful for platforms with a separate title field
    async fn upload(
        &self,
        video: &Path,
        caption: &str,
        title: Option<&str>,
    ) -> Result<UploadReceipt, UploadError>;
}

/// Fans a video out to every enabled adapter, one outcome per adapter
pub struct UploadDispatcher {
    adapters: Vec<Box<dyn PlatformAdapter>>,
}

impl UploadDispatcher {
    pub fn new(mut adapters: Vec<Box<dyn PlatformAdapter>>) -> Self {
        adapters.sort_by_key(|adapter| adapter.platform());
        Self { adapters }
    }

    /// Build the real adapters for `enabled`, sharing one HTTP client
    pub fn from_config(config: &Config, enabled: &[Platform]) -> crate::Result<Self> {
        let client = http_client()?;
        let adapters = enabled
            .iter()
            .map(|platform| -> Box<dyn PlatformAdapter> {
                match platform {
                    Platform::YouTube => {
                        Box::new(YouTubeAdapter::new(client.clone(), config.youtube.clone()))
                    }
                    Platform::Instagram => {
                        Box::new(InstagramAdapter::new(client.clone(), config.instagram.clone()))
                    }
                    Platform::TikTok => {
                        Box::new(TikTokAdapter::new(client.clone(), config.tiktok.clone()))
                    }
                }
            })
            .collect();
        Ok(Self::new(adapters))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.iter().map(|adapter| adapter.platform()).collect()
    }

    pub fn configuration_status(&self) -> Vec<(Platform, bool)> {
        self.adapters
            .iter()
            .map(|adapter| (adapter.platform(), adapter.is_configured()))
            .collect()
    }

    /// Attempt every platform; failures become data and never stop the others
    pub async fn dispatch(
        &self,
        video: &Path,
        captions: &PlatformCaptions,
        title: &str,
    ) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            let platform = adapter.platform();
            let caption = captions.caption_for(platform);
            let title = (platform == Platform::YouTube).then_some(title);

            tracing::info!(platform = %platform, "Uploading");

            let outcome = match adapter.upload(video, caption, title).await {
                Ok(receipt) => {
                    tracing::info!(platform = %platform, video_id = %receipt.video_id, url = %receipt.url, "Upload succeeded");
                    UploadOutcome::succeeded(platform, receipt.video_id, receipt.url)
                }
                Err(e) => {
                    tracing::error!(platform = %platform, error = %e, "Upload failed");
                    UploadOutcome::failed(platform, e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }
}

/// Client shared by the adapters; uploads can take a while on slow links
pub fn http_client() -> crate::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(900))
        .build()
        .context("Failed to build HTTP client")
}

/// Map a failed platform response, treating 401/403 as authentication problems
pub(crate) fn response_error(status: StatusCode, body: &str) -> UploadError {
    let message = api_error_message(body).unwrap_or_else(|| body.trim().to_string());
    let detail = format!("HTTP {}: {}", status.as_u16(), message);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UploadError::Authentication(detail),
        _ => UploadError::Platform(detail),
    }
}

pub(crate) fn request_failed(context: &str, err: reqwest::Error) -> UploadError {
    UploadError::Platform(format!("{}: {}", context, err))
}

/// Read the whole video; files are capped by validation
pub(crate) async fn read_video(video: &Path) -> Result<Vec<u8>, UploadError> {
    tokio::fs::read(video)
        .await
        .map_err(|e| UploadError::Platform(format!("Failed to read {}: {}", video.display(), e)))
}

pub(crate) fn video_mime_type(video: &Path) -> &'static str {
    let extension = video
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        _ => "video/mp4",
    }
}
