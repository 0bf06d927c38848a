use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Social platforms a video can be published to, in dispatch order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// YouTube Shorts
    #[value(name = "youtube")]
    YouTube,
    /// Instagram Reels
    #[value(name = "instagram")]
    Instagram,
    /// TikTok
    #[value(name = "tiktok")]
    TikTok,
}

impl Platform {
    /// Every platform in the fixed dispatch order
    pub const ALL: [Platform; 3] = [Platform::YouTube, Platform::Instagram, Platform::TikTok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Instagram => "Instagram",
            Platform::TikTok => "TikTok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approximate aspect ratio of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "9:16")]
    Vertical,
    #[serde(rename = "16:9")]
    Horizontal,
    #[serde(rename = "1:1")]
    Square,
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectRatio::Vertical => write!(f, "9:16"),
            AspectRatio::Horizontal => write!(f, "16:9"),
            AspectRatio::Square => write!(f, "1:1"),
        }
    }
}

/// Metadata about a validated video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Absolute path to the video
    path: PathBuf,

    /// Duration in seconds
    duration: f64,

    /// Frame size as (width, height)
    resolution: (u32, u32),

    /// File size in whole megabytes
    file_size_mb: u64,

    /// Container format (lowercase extension)
    format: String,
}

impl VideoMetadata {
    pub fn new(
        path: PathBuf,
        duration: f64,
        resolution: (u32, u32),
        file_size_mb: u64,
        format: impl Into<String>,
    ) -> Self {
        Self {
            path,
            duration,
            resolution,
            file_size_mb,
            format: format.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn file_size_mb(&self) -> u64 {
        self.file_size_mb
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Vertical videos suit Shorts, Reels and TikTok best
    pub fn is_vertical(&self) -> bool {
        let (width, height) = self.resolution;
        height > width
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        let (width, height) = self.resolution;
        if height > width {
            AspectRatio::Vertical
        } else if width > height {
            AspectRatio::Horizontal
        } else {
            AspectRatio::Square
        }
    }
}

/// Captions generated for each platform
///
/// Fields are public so an operator can edit them between generation and dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCaptions {
    pub youtube_title: String,
    pub youtube: String,
    pub instagram: String,
    pub tiktok: String,
}

impl PlatformCaptions {
    /// Caption body used when uploading to `platform`
    pub fn caption_for(&self, platform: Platform) -> &str {
        match platform {
            Platform::YouTube => &self.youtube,
            Platform::Instagram => &self.instagram,
            Platform::TikTok => &self.tiktok,
        }
    }

    pub fn caption_for_mut(&mut self, platform: Platform) -> &mut String {
        match platform {
            Platform::YouTube => &mut self.youtube,
            Platform::Instagram => &mut self.instagram,
            Platform::TikTok => &mut self.tiktok,
        }
    }
}

/// Result of a single platform upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success { video_id: String, url: String },
    Failure { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub platform: Platform,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl UploadOutcome {
    pub fn succeeded(platform: Platform, video_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            platform,
            status: OutcomeStatus::Success {
                video_id: video_id.into(),
                url: url.into(),
            },
        }
    }

    pub fn failed(platform: Platform, error: impl Into<String>) -> Self {
        Self {
            platform,
            status: OutcomeStatus::Failure {
                error: error.into(),
            },
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    pub fn video_id(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Success { video_id, .. } => Some(video_id),
            OutcomeStatus::Failure { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Success { url, .. } => Some(url),
            OutcomeStatus::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Success { .. } => None,
            OutcomeStatus::Failure { error } => Some(error),
        }
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            OutcomeStatus::Success { url, .. } => write!(f, "[{}] OK - {}", self.platform, url),
            OutcomeStatus::Failure { error } => write!(f, "[{}] FAILED - {}", self.platform, error),
        }
    }
}

/// Everything produced by one publishing run
///
/// Only the pipeline fills it in, strictly in stage order.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    video_path: PathBuf,
    metadata: Option<VideoMetadata>,
    transcript: Option<String>,
    captions: Option<PlatformCaptions>,
    outcomes: Vec<UploadOutcome>,
}

impl RunResult {
    pub(crate) fn new(video_path: PathBuf) -> Self {
        Self {
            video_path,
            metadata: None,
            transcript: None,
            captions: None,
            outcomes: Vec::new(),
        }
    }

    pub(crate) fn set_metadata(&mut self, metadata: VideoMetadata) {
        self.metadata = Some(metadata);
    }

    pub(crate) fn set_transcript(&mut self, transcript: String) {
        self.transcript = Some(transcript);
    }

    pub(crate) fn set_captions(&mut self, captions: PlatformCaptions) {
        self.captions = Some(captions);
    }

    pub(crate) fn captions_mut(&mut self) -> Option<&mut PlatformCaptions> {
        self.captions.as_mut()
    }

    pub(crate) fn set_outcomes(&mut self, outcomes: Vec<UploadOutcome>) {
        self.outcomes = outcomes;
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }

    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref()
    }

    pub fn captions(&self) -> Option<&PlatformCaptions> {
        self.captions.as_ref()
    }

    pub fn outcomes(&self) -> &[UploadOutcome] {
        &self.outcomes
    }

    pub fn successful_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success()).count()
    }

    pub fn total_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.successful_count() == self.total_count()
    }
}
