use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

use super::oauth::{self, ChallengeEncoding, OAuthProvider, StoredToken};
use super::{read_video, request_failed, response_error, video_mime_type, PlatformAdapter, UploadReceipt};
use crate::captions::truncate_to_limit;
use crate::config::YouTubeConfig;
use crate::models::Platform;
use crate::UploadError;

const UPLOAD_URL: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";
const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const MAX_TITLE_CHARS: usize = 100;
const MAX_TAGS: usize = 30;
const DEFAULT_CATEGORY_ID: &str = "22";

/// Named YouTube video categories
pub const CATEGORIES: &[(&str, &str)] = &[
    ("film_animation", "1"),
    ("autos_vehicles", "2"),
    ("music", "10"),
    ("pets_animals", "15"),
    ("sports", "17"),
    ("travel_events", "19"),
    ("gaming", "20"),
    ("people_blogs", "22"),
    ("comedy", "23"),
    ("entertainment", "24"),
    ("news_politics", "25"),
    ("howto_style", "26"),
    ("education", "27"),
    ("science_technology", "28"),
    ("nonprofits_activism", "29"),
];

/// OAuth client downloaded from Google Cloud Console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientCredentials>,
    web: Option<ClientCredentials>,
}

impl ClientCredentials {
    pub fn load(path: &Path) -> Result<Self, UploadError> {
        let content = fs_err::read_to_string(path).map_err(|e| {
            UploadError::Authentication(format!("YouTube client secret not found: {}", e))
        })?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self, UploadError> {
        let file: ClientSecretFile = serde_json::from_str(content).map_err(|e| {
            UploadError::Authentication(format!("Invalid YouTube client secret file: {}", e))
        })?;
        file.installed.or(file.web).ok_or_else(|| {
            UploadError::Authentication(
                "Client secret file has neither an `installed` nor a `web` section".to_string(),
            )
        })
    }

    pub fn provider(&self) -> OAuthProvider {
        let redirect_uri = self
            .redirect_uris
            .first()
            .cloned()
            .unwrap_or_else(|| "http://localhost:8080".to_string());

        OAuthProvider {
            authorize_url: self.auth_uri.clone(),
            token_url: self.token_uri.clone(),
            client_id_param: "client_id",
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri,
            scope: UPLOAD_SCOPE.to_string(),
            encoding: ChallengeEncoding::Base64Url,
            extra_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        }
    }
}

/// YouTube Shorts uploads through the Data API v3
pub struct YouTubeAdapter {
    client: Client,
    config: YouTubeConfig,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

impl YouTubeAdapter {
    pub fn new(client: Client, config: YouTubeConfig) -> Self {
        Self { client, config }
    }

    /// Current access token, refreshed and re-saved when expired
    async fn access_token(&self) -> Result<String, UploadError> {
        let token = StoredToken::load(&self.config.token_file).map_err(|_| {
            UploadError::Authentication(
                "YouTube is not authorized yet, run `shortcast auth youtube`".to_string(),
            )
        })?;

        if !token.is_expired(Utc::now()) {
            return Ok(token.access_token);
        }

        tracing::info!(platform = %Platform::YouTube, "Access token expired, refreshing");
        let credentials = ClientCredentials::load(&self.config.client_secret_file)?;
        let refreshed = oauth::refresh_token(&self.client, &credentials.provider(), &token).await?;
        refreshed.save(&self.config.token_file)?;
        Ok(refreshed.access_token)
    }

    fn metadata(&self, caption: &str, title: &str) -> serde_json::Value {
        json!({
            "snippet": {
                "title": prepare_title(title),
                "description": caption,
                "tags": prepare_tags(caption, &self.config.tags),
                "categoryId": category_id(&self.config.category),
            },
            "status": {
                "privacyStatus": self.config.privacy,
                "selfDeclaredMadeForKids": false,
            }
        })
    }

    async fn start_session(
        &self,
        token: &str,
        metadata: &serde_json::Value,
        mime: &str,
        size: usize,
    ) -> Result<String, UploadError> {
        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(token)
            .header("X-Upload-Content-Type", mime)
            .header("X-Upload-Content-Length", size.to_string())
            .json(metadata)
            .send()
            .await
            .map_err(|e| request_failed("Failed to start YouTube upload", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(response_error(status, &body));
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::Platform("YouTube did not return an upload session".to_string()))
    }
}

#[async_trait]
impl PlatformAdapter for YouTubeAdapter {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn is_configured(&self) -> bool {
        self.config.client_secret_file.exists()
    }

    async fn upload(
        &self,
        video: &Path,
        caption: &str,
        title: Option<&str>,
    ) -> Result<UploadReceipt, UploadError> {
        if !self.is_configured() {
            return Err(UploadError::Authentication(format!(
                "client secret file not found at {}",
                self.config.client_secret_file.display()
            )));
        }

        let token = self.access_token().await?;
        let title = title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| caption.lines().next())
            .unwrap_or("Short");
        let metadata = self.metadata(caption, title);
        let bytes = read_video(video).await?;
        let mime = video_mime_type(video);

        tracing::debug!(platform = %Platform::YouTube, size = bytes.len(), "Starting resumable upload");
        let session = self.start_session(&token, &metadata, mime, bytes.len()).await?;

        let response = self
            .client
            .put(&session)
            .bearer_auth(&token)
            .header(header::CONTENT_TYPE, mime)
            .body(bytes)
            .send()
            .await
            .map_err(|e| request_failed("YouTube upload failed", e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(response_error(status, &body));
        }

        let uploaded: UploadedVideo = serde_json::from_str(&body)
            .map_err(|e| UploadError::Platform(format!("Unexpected YouTube response: {}", e)))?;

        Ok(UploadReceipt::new(
            uploaded.id.clone(),
            format!("https://youtube.com/shorts/{}", uploaded.id),
        ))
    }
}

/// Title as YouTube accepts it: trimmed, no angle brackets, at most 100 characters
pub fn prepare_title(title: &str) -> String {
    let cleaned: String = title.trim().chars().filter(|c| *c != '<' && *c != '>').collect();
    truncate_to_limit(&cleaned, MAX_TITLE_CHARS)
}

/// `Shorts` first, then configured tags and caption hashtags, deduplicated
pub fn prepare_tags(caption: &str, extra: &[String]) -> Vec<String> {
    let hashtags = caption
        .split_whitespace()
        .filter(|word| word.starts_with('#'))
        .map(|word| word.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_'));

    let mut tags: Vec<String> = Vec::new();
    let candidates = std::iter::once("Shorts")
        .chain(extra.iter().map(String::as_str))
        .chain(hashtags);

    for candidate in candidates {
        let tag = candidate.trim().trim_start_matches('#').trim();
        if tag.is_empty() || tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        tags.push(tag.to_string());
        if tags.len() == MAX_TAGS {
            break;
        }
    }

    tags
}

/// Category id for a configured name; numeric ids pass through
pub fn category_id(name: &str) -> &str {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
        return name;
    }
    let key = name.trim().to_lowercase();
    CATEGORIES
        .iter()
        .find(|(category, _)| *category == key)
        .map(|(_, id)| *id)
        .unwrap_or(DEFAULT_CATEGORY_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_title() {
        assert_eq!(prepare_title("  Hello <world>  "), "Hello world");
        let long = prepare_title(&"x".repeat(150));
        assert_eq!(long.chars().count(), 100);
        assert!(long.ends_with("..."));
    }

    #[test]
    fn test_prepare_tags() {
        let tags = prepare_tags(
            "Learn fast! #Spanish #grammar, #spanish #shorts",
            &["learnspanish".to_string(), "#grammar".to_string()],
        );
        assert_eq!(tags, vec!["Shorts", "learnspanish", "grammar", "Spanish"]);
    }

    #[test]
    fn test_prepare_tags_caps_at_thirty() {
        let caption = (0..50).map(|i| format!("#tag{}", i)).collect::<Vec<_>>().join(" ");
        let tags = prepare_tags(&caption, &[]);
        assert_eq!(tags.len(), 30);
        assert_eq!(tags[0], "Shorts");
    }

    #[test]
    fn test_category_id() {
        assert_eq!(category_id("people_blogs"), "22");
        assert_eq!(category_id("Education"), "27");
        assert_eq!(category_id("27"), "27");
        assert_eq!(category_id("unknown"), "22");
    }

    #[test]
    fn test_metadata() {
        let adapter = YouTubeAdapter::new(Client::new(), YouTubeConfig::default());
        let metadata = adapter.metadata("Caption #fun", "My title");
        assert_eq!(metadata["snippet"]["title"], "My title");
        assert_eq!(metadata["snippet"]["categoryId"], "22");
        assert_eq!(metadata["snippet"]["tags"][1], "fun");
        assert_eq!(metadata["status"]["privacyStatus"], "public");
    }

    #[test]
    fn test_client_secret_parsing() {
        let installed = r#"{"installed": {"client_id": "id", "client_secret": "s", "redirect_uris": ["http://localhost"]}}"#;
        let credentials = ClientCredentials::parse(installed).unwrap();
        assert_eq!(credentials.token_uri, DEFAULT_TOKEN_URI);

        let provider = credentials.provider();
        assert_eq!(provider.redirect_uri, "http://localhost");
        assert_eq!(provider.encoding, ChallengeEncoding::Base64Url);

        assert!(ClientCredentials::parse(r#"{"other": {}}"#).is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_upload_is_authentication_error() {
        let config = YouTubeConfig {
            client_secret_file: "/nonexistent/client_secret.json".into(),
            ..YouTubeConfig::default()
        };
        let adapter = YouTubeAdapter::new(Client::new(), config);
        assert!(!adapter.is_configured());

        let err = adapter
            .upload(Path::new("clip.mp4"), "caption", Some("title"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Authentication(_)));
    }
}
