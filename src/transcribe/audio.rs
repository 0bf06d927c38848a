use async_trait::async_trait;
use std::path::Path;

use crate::utils::media_command;
use crate::BackendError;

/// Pulls the audio track out of a video for transcription
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), BackendError>;
}

/// Audio extraction with ffprobe + ffmpeg
pub struct FfmpegAudioExtractor;

impl FfmpegAudioExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Make sure the video carries at least one audio stream
    async fn check_audio_stream(&self, video: &Path) -> Result<(), BackendError> {
        let output = media_command("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                &video.to_string_lossy(),
            ])
            .output()
            .await
            .map_err(|e| BackendError::Failed(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Failed(format!(
                "Failed to analyze video with ffprobe: {}",
                error.trim()
            )));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| BackendError::Failed(format!("Unreadable ffprobe output: {}", e)))?;

        if has_audio_stream(&info) {
            Ok(())
        } else {
            Err(BackendError::Failed(format!(
                "Video does not contain any audio streams: {}",
                video.display()
            )))
        }
    }
}

impl Default for FfmpegAudioExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), BackendError> {
        self.check_audio_stream(video).await?;

        tracing::debug!("Extracting audio {} -> {}", video.display(), output.display());

        let result = media_command("ffmpeg")
            .args([
                "-i",
                &video.to_string_lossy(),
                "-vn", // No video
                "-acodec",
                "libmp3lame",
                "-ab",
                "128k", // Good quality for transcription
                "-ar",
                "44100",
                "-y", // Overwrite output file
                &output.to_string_lossy(),
            ])
            .output()
            .await
            .map_err(|e| BackendError::Failed(format!("Failed to run ffmpeg: {}", e)))?;

        if !result.status.success() {
            let error = String::from_utf8_lossy(&result.stderr);
            return Err(BackendError::Failed(format!(
                "Failed to extract audio with ffmpeg: {}",
                error.trim()
            )));
        }

        Ok(())
    }
}

fn has_audio_stream(info: &serde_json::Value) -> bool {
    info["streams"]
        .as_array()
        .map(|streams| {
            streams
                .iter()
                .any(|stream| stream["codec_type"].as_str() == Some("audio"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_audio_stream() {
        let with_audio = json!({"streams": [{"codec_type": "video"}, {"codec_type": "audio"}]});
        let silent = json!({"streams": [{"codec_type": "video"}]});
        assert!(has_audio_stream(&with_audio));
        assert!(!has_audio_stream(&silent));
        assert!(!has_audio_stream(&json!({})));
    }
}
