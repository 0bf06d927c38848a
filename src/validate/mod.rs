use async_trait::async_trait;
use std::path::Path;
use tokio::fs;

use crate::config::AppConfig;
use crate::models::VideoMetadata;
use crate::utils::media_command;
use crate::PublishError;

/// Container formats accepted by every target platform
pub const SUPPORTED_FORMATS: &[&str] = &["mp4", "mov", "avi", "webm"];

/// Shorter clips tend to perform poorly
const MIN_RECOMMENDED_DURATION: f64 = 3.0;

/// Checks a video is publishable and reports its metadata
#[async_trait]
pub trait VideoValidator: Send + Sync {
    async fn validate(&self, path: &Path) -> Result<VideoMetadata, PublishError>;
}

/// Duration, width and height of the first video stream
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// Validator backed by ffprobe
pub struct FfprobeValidator {
    max_duration_secs: f64,
    max_file_size_mb: u64,
}

impl FfprobeValidator {
    pub fn new(app: &AppConfig) -> Self {
        Self {
            max_duration_secs: app.max_video_duration_secs,
            max_file_size_mb: app.max_file_size_mb,
        }
    }

    /// Check existence, extension and size before spawning ffprobe
    async fn check_file(&self, path: &Path) -> Result<(String, f64), PublishError> {
        if !path.exists() {
            return Err(PublishError::Validation(format!(
                "File does not exist: {}",
                path.display()
            )));
        }

        if !path.is_file() {
            return Err(PublishError::Validation(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        let format = check_format(path)?;

        let metadata = fs::metadata(path).await.map_err(|e| {
            PublishError::Validation(format!("Cannot access file {}: {}", path.display(), e))
        })?;

        if metadata.len() == 0 {
            return Err(PublishError::Validation(format!(
                "File is empty: {}",
                path.display()
            )));
        }

        let size_mb = metadata.len() as f64 / (1024.0 * 1024.0);
        if size_mb > self.max_file_size_mb as f64 {
            return Err(PublishError::Validation(format!(
                "File size ({:.1} MB) exceeds the maximum allowed ({} MB)",
                size_mb, self.max_file_size_mb
            )));
        }

        Ok((format, size_mb))
    }

    /// Get stream information using ffprobe
    async fn probe(&self, path: &Path) -> Result<ProbeInfo, PublishError> {
        let output = media_command("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                &path.to_string_lossy(),
            ])
            .output()
            .await
            .map_err(|e| PublishError::Validation(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PublishError::Validation(format!(
                "Failed to analyze video with ffprobe: {}",
                error.trim()
            )));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| PublishError::Validation(format!("Unreadable ffprobe output: {}", e)))?;

        parse_probe(&info)
    }

    fn check_duration(&self, duration: f64) -> Result<(), PublishError> {
        if duration > self.max_duration_secs {
            return Err(PublishError::Validation(format!(
                "Duration ({:.1}s) exceeds the maximum allowed ({}s) for short videos",
                duration, self.max_duration_secs
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoValidator for FfprobeValidator {
    async fn validate(&self, path: &Path) -> Result<VideoMetadata, PublishError> {
        let (format, size_mb) = self.check_file(path).await?;
        let probe = self.probe(path).await?;
        self.check_duration(probe.duration)?;

        let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let metadata = VideoMetadata::new(
            absolute,
            probe.duration,
            (probe.width, probe.height),
            size_mb as u64,
            format,
        );

        log_warnings(&metadata);
        Ok(metadata)
    }
}

/// Lowercase extension if it is one of the supported formats
pub fn check_format(path: &Path) -> Result<String, PublishError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    if SUPPORTED_FORMATS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(PublishError::Validation(format!(
            "Unsupported format: .{}. Supported formats: {}",
            extension,
            SUPPORTED_FORMATS.join(", ")
        )))
    }
}

/// Extract duration and frame size from `ffprobe -print_format json` output
pub fn parse_probe(info: &serde_json::Value) -> Result<ProbeInfo, PublishError> {
    let empty_vec = vec![];
    let streams = info["streams"].as_array().unwrap_or(&empty_vec);

    let video = streams
        .iter()
        .find(|stream| stream["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| PublishError::Validation("File does not contain a video stream".into()))?;

    let width = video["width"].as_u64().unwrap_or(0) as u32;
    let height = video["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(PublishError::Validation(
            "Could not determine video resolution".into(),
        ));
    }

    // Container duration first, stream duration as fallback
    let duration = info["format"]["duration"]
        .as_str()
        .or_else(|| video["duration"].as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| PublishError::Validation("Could not determine video duration".into()))?;

    Ok(ProbeInfo {
        duration,
        width,
        height,
    })
}

fn log_warnings(metadata: &VideoMetadata) {
    if !metadata.is_vertical() {
        let (width, height) = metadata.resolution();
        tracing::warn!(
            width,
            height,
            "Video is not vertical; 9:16 performs better on Shorts and Reels"
        );
    }

    if metadata.duration() < MIN_RECOMMENDED_DURATION {
        tracing::warn!(
            duration = metadata.duration(),
            "Video is very short; clips of at least 3 seconds get better engagement"
        );
    }
}
