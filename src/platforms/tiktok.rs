use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::oauth::{ChallengeEncoding, OAuthProvider, StoredToken};
use super::{read_video, request_failed, response_error, video_mime_type, PlatformAdapter, UploadReceipt};
use crate::config::TikTokConfig;
use crate::models::Platform;
use crate::UploadError;

const INIT_URL: &str = "https://open.tiktokapis.com/v2/post/publish/video/init/";
const AUTHORIZE_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";
const TOKEN_URL: &str = "https://open.tiktokapis.com/v2/oauth/token/";
const SCOPES: &str = "user.info.basic,video.upload,video.publish";
const MAX_TITLE_CHARS: usize = 150;
const PENDING_ID: &str = "pending";
const PROFILE_URL: &str = "https://www.tiktok.com";

/// TikTok `privacy_level` for a configured privacy name
pub fn privacy_level(privacy: &str) -> &'static str {
    match privacy.trim().to_lowercase().as_str() {
        "friends" => "MUTUAL_FOLLOW_FRIENDS",
        "private" => "SELF_ONLY",
        _ => "PUBLIC_TO_EVERYONE",
    }
}

/// First 150 characters of the caption
pub fn post_title(caption: &str) -> String {
    caption.trim().chars().take(MAX_TITLE_CHARS).collect()
}

#[derive(Debug, Serialize)]
struct InitRequest {
    post_info: PostInfo,
    source_info: SourceInfo,
}

#[derive(Debug, Serialize)]
struct PostInfo {
    title: String,
    privacy_level: &'static str,
    disable_duet: bool,
    disable_comment: bool,
    disable_stitch: bool,
}

#[derive(Debug, Serialize)]
struct SourceInfo {
    source: &'static str,
    video_size: u64,
    chunk_size: u64,
    total_chunk_count: u32,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    #[serde(default)]
    data: Option<InitData>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: Option<String>,
    upload_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

/// TikTok uploads through the Content Posting API
///
/// Publishing finishes asynchronously on TikTok's side, so a successful
/// upload returns a provisional receipt.
pub struct TikTokAdapter {
    client: Client,
    config: TikTokConfig,
}

impl TikTokAdapter {
    pub fn new(client: Client, config: TikTokConfig) -> Self {
        Self { client, config }
    }

    /// Explicit token first, then the one saved by `shortcast auth tiktok`
    fn access_token(&self) -> Result<String, UploadError> {
        if let Some(token) = self.config.access_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }
        StoredToken::load(&self.config.token_file)
            .map(|token| token.access_token)
            .map_err(|_| {
                UploadError::Authentication(
                    "TikTok access token missing, set TIKTOK_ACCESS_TOKEN or run `shortcast auth tiktok`"
                        .to_string(),
                )
            })
    }

    fn init_request(&self, caption: &str, size: u64) -> InitRequest {
        InitRequest {
            post_info: PostInfo {
                title: post_title(caption),
                privacy_level: privacy_level(&self.config.privacy),
                disable_duet: self.config.disable_duet,
                disable_comment: self.config.disable_comment,
                disable_stitch: self.config.disable_stitch,
            },
            source_info: SourceInfo {
                source: "FILE_UPLOAD",
                video_size: size,
                chunk_size: size,
                total_chunk_count: 1,
            },
        }
    }

    async fn init(&self, token: &str, request: &InitRequest) -> Result<InitData, UploadError> {
        let response = self
            .client
            .post(INIT_URL)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| request_failed("Failed to initialize TikTok upload", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| request_failed("Failed to read TikTok response", e))?;
        if !status.is_success() {
            return Err(tiktok_error(&body).unwrap_or_else(|| response_error(status, &body)));
        }

        let parsed: InitResponse = serde_json::from_str(&body)
            .map_err(|e| UploadError::Platform(format!("Unexpected TikTok response: {}", e)))?;
        if let Some(error) = parsed.error.filter(|e| e.code != "ok") {
            return Err(api_error(error));
        }
        parsed
            .data
            .ok_or_else(|| UploadError::Platform("TikTok returned no upload data".to_string()))
    }

    /// OAuth settings for `shortcast auth tiktok`
    pub fn provider(&self) -> Result<OAuthProvider, UploadError> {
        let client_key = self
            .config
            .client_key
            .clone()
            .ok_or_else(|| UploadError::Authentication("TIKTOK_CLIENT_KEY is not set".to_string()))?;
        let client_secret = self
            .config
            .client_secret
            .clone()
            .ok_or_else(|| UploadError::Authentication("TIKTOK_CLIENT_SECRET is not set".to_string()))?;

        Ok(OAuthProvider {
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            client_id_param: "client_key",
            client_id: client_key,
            client_secret,
            redirect_uri: self.config.redirect_uri.clone(),
            scope: SCOPES.to_string(),
            encoding: ChallengeEncoding::Hex,
            extra_params: Vec::new(),
        })
    }
}

fn api_error(error: ApiError) -> UploadError {
    let detail = if error.message.is_empty() {
        error.code.clone()
    } else {
        format!("{}: {}", error.code, error.message)
    };
    match error.code.as_str() {
        "access_token_invalid" | "scope_not_authorized" | "token_not_authorized_for_specified_deployment" => {
            UploadError::Authentication(detail)
        }
        _ => UploadError::Platform(detail),
    }
}

/// TikTok wraps failures in `{"error": {"code", "message"}}`
fn tiktok_error(body: &str) -> Option<UploadError> {
    let parsed: InitResponse = serde_json::from_str(body).ok()?;
    parsed.error.filter(|e| e.code != "ok").map(api_error)
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn is_configured(&self) -> bool {
        let has_key = self.config.client_key.as_deref().is_some_and(|k| !k.is_empty());
        let has_token = self.config.access_token.as_deref().is_some_and(|t| !t.is_empty())
            || self.config.token_file.exists();
        has_key && has_token
    }

    async fn upload(
        &self,
        video: &Path,
        caption: &str,
        _title: Option<&str>,
    ) -> Result<UploadReceipt, UploadError> {
        let token = self.access_token()?;
        let bytes = read_video(video).await?;
        let size = bytes.len() as u64;

        let data = self.init(&token, &self.init_request(caption, size)).await?;
        let upload_url = data
            .upload_url
            .ok_or_else(|| UploadError::Platform("TikTok returned no upload URL".to_string()))?;

        tracing::debug!(platform = %Platform::TikTok, size, "Uploading video in one chunk");
        let response = self
            .client
            .put(&upload_url)
            .header(header::CONTENT_TYPE, video_mime_type(video))
            .header(header::CONTENT_RANGE, content_range(size))
            .body(bytes)
            .send()
            .await
            .map_err(|e| request_failed("TikTok upload failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(response_error(status, &body));
        }

        let publish_id = data.publish_id.unwrap_or_else(|| PENDING_ID.to_string());
        tracing::info!(platform = %Platform::TikTok, publish_id = %publish_id, "Upload accepted, publishing continues on TikTok");
        Ok(UploadReceipt::new(publish_id, PROFILE_URL))
    }
}

fn content_range(size: u64) -> String {
    format!("bytes 0-{}/{}", size.saturating_sub(1), size)
}
