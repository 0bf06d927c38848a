use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use crate::models::{Platform, PlatformCaptions};
use crate::retry::{with_retry, RetryPolicy};
use crate::{BackendError, PublishError};

pub mod openai;
pub mod prompts;

pub use openai::ChatCompletionClient;
pub use prompts::PromptBuilder;

const ELLIPSIS: &str = "...";

/// Text generation service used for captions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Character ceilings per caption field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionLimits {
    pub youtube_title: usize,
    pub youtube: usize,
    pub instagram: usize,
    pub tiktok: usize,
}

impl Default for CaptionLimits {
    fn default() -> Self {
        Self {
            youtube_title: 100,
            youtube: 5000,
            instagram: 2200,
            tiktok: 2200,
        }
    }
}

impl CaptionLimits {
    pub fn caption_limit(&self, platform: Platform) -> usize {
        match platform {
            Platform::YouTube => self.youtube,
            Platform::Instagram => self.instagram,
            Platform::TikTok => self.tiktok,
        }
    }
}

/// Generates a title and one caption per platform from a transcript
pub struct CaptionGenerator {
    backend: Box<dyn CaptionBackend>,
    prompts: PromptBuilder,
    limits: CaptionLimits,
    retry: RetryPolicy<BackendError>,
}

impl CaptionGenerator {
    pub fn new(backend: Box<dyn CaptionBackend>, prompts: PromptBuilder) -> Self {
        Self {
            backend,
            prompts,
            limits: CaptionLimits::default(),
            retry: RetryPolicy::backend_default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy<BackendError>) -> Self {
        self.retry = retry;
        self
    }

    pub fn limits(&self) -> CaptionLimits {
        self.limits
    }

    /// Generate every caption; any failure fails the whole set
    pub async fn generate(&self, transcript: &str) -> Result<PlatformCaptions, PublishError> {
        tracing::info!("Generating captions for all platforms");

        let (youtube_title, youtube) = self.generate_youtube(transcript).await?;
        let instagram = self.generate_caption(Platform::Instagram, transcript).await?;
        let tiktok = self.generate_caption(Platform::TikTok, transcript).await?;

        let captions = PlatformCaptions {
            youtube_title,
            youtube,
            instagram,
            tiktok,
        };

        tracing::info!(
            youtube_title_len = captions.youtube_title.chars().count(),
            youtube_len = captions.youtube.chars().count(),
            instagram_len = captions.instagram.chars().count(),
            tiktok_len = captions.tiktok.chars().count(),
            "Captions generated"
        );

        Ok(captions)
    }

    /// Replace one platform's caption (and the title, for YouTube) in place
    pub async fn regenerate(
        &self,
        platform: Platform,
        transcript: &str,
        captions: &mut PlatformCaptions,
    ) -> Result<(), PublishError> {
        match platform {
            Platform::YouTube => {
                let (title, description) = self.generate_youtube(transcript).await?;
                captions.youtube_title = title;
                captions.youtube = description;
            }
            other => {
                *captions.caption_for_mut(other) = self.generate_caption(other, transcript).await?;
            }
        }
        Ok(())
    }

    async fn generate_youtube(&self, transcript: &str) -> Result<(String, String), PublishError> {
        let prompt = self.prompts.for_platform(Platform::YouTube, transcript);
        let response = self.complete(Platform::YouTube, &prompt).await?;
        let (title, description) = split_title_description(&response);

        Ok((
            enforce_limit("youtube_title", &title, self.limits.youtube_title),
            enforce_limit("youtube", &description, self.limits.youtube),
        ))
    }

    async fn generate_caption(&self, platform: Platform, transcript: &str) -> Result<String, PublishError> {
        let prompt = self.prompts.for_platform(platform, transcript);
        let response = self.complete(platform, &prompt).await?;
        let field = platform.as_str().to_lowercase();
        Ok(enforce_limit(&field, response.trim(), self.limits.caption_limit(platform)))
    }

    async fn complete(&self, platform: Platform, prompt: &str) -> Result<String, PublishError> {
        tracing::debug!(platform = %platform, "Requesting caption");
        with_retry(&self.retry, || self.backend.complete(prompt))
            .await
            .map_err(|source| {
                tracing::error!(platform = %platform, error = %source, "Caption generation failed");
                PublishError::Generation { platform, source }
            })
    }
}

/// Cut `text` to `limit - 3` characters plus an ellipsis when it is too long
pub fn truncate_to_limit(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

fn enforce_limit(field: &str, text: &str, limit: usize) -> String {
    let length = text.chars().count();
    if length > limit {
        tracing::warn!(field, original_len = length, max_chars = limit, "Caption truncated");
    }
    truncate_to_limit(text, limit)
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?ims)^[\s*]*title\s*:(.*?)^[\s*]*description\s*:(.*)").expect("marker pattern is valid")
    })
}

fn clean_field(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c.is_whitespace())
        .to_string()
}

/// Split a YouTube response into (title, description)
///
/// Expects `TITLE:` / `DESCRIPTION:` markers at line starts; without them the
/// first line is the title and the rest is the description.
pub fn split_title_description(response: &str) -> (String, String) {
    if let Some(captures) = marker_pattern().captures(response) {
        let title = captures
            .get(1)
            .map(|m| m.as_str())
            .and_then(|t| t.lines().map(clean_field).find(|l| !l.is_empty()))
            .unwrap_or_default();
        let description = captures.get(2).map(|m| clean_field(m.as_str())).unwrap_or_default();

        if !title.is_empty() && !description.is_empty() {
            return (title, description);
        }
    }

    let trimmed = response.trim();
    let mut lines = trimmed.lines();
    let first = lines.next().unwrap_or_default();
    let title = clean_field(strip_title_marker(first));
    let rest = lines.collect::<Vec<_>>().join("\n").trim().to_string();

    let description = if rest.is_empty() {
        trimmed.to_string()
    } else {
        rest
    };

    (title, description)
}

fn strip_title_marker(line: &str) -> &str {
    let trimmed = line.trim_start_matches(|c: char| c == '*' || c.is_whitespace());
    match trimmed.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("title:") => &trimmed[6..],
        _ => line,
    }
}
