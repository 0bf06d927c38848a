use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

use crate::retry::{with_retry, RetryPolicy};
use crate::{BackendError, PublishError};

pub mod audio;
pub mod srt;
pub mod whisper;

pub use audio::{AudioExtractor, FfmpegAudioExtractor};
pub use whisper::WhisperClient;

/// Returned when the backend hears nothing; silence is not an error
pub const NO_SPEECH_FALLBACK: &str = "No speech detected in this video.";

/// Speech-to-text service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String, BackendError>;
}

/// Where a transcript came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum TranscriptSource {
    TextSidecar(PathBuf),
    SubtitleSidecar(PathBuf),
    Backend,
}

impl fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file_name = |p: &PathBuf| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        match self {
            TranscriptSource::TextSidecar(p) => write!(f, ".txt file: {}", file_name(p)),
            TranscriptSource::SubtitleSidecar(p) => write!(f, ".srt file: {}", file_name(p)),
            TranscriptSource::Backend => write!(f, "Whisper API"),
        }
    }
}

/// Transcript text together with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTranscript {
    pub text: String,
    pub source: TranscriptSource,
}

/// Resolves a transcript: `.txt` sidecar, then `.srt` sidecar, then the backend
pub struct TranscriptResolver {
    extractor: Box<dyn AudioExtractor>,
    backend: Box<dyn TranscriptionBackend>,
    retry: RetryPolicy<BackendError>,
    temp_root: Option<PathBuf>,
}

impl TranscriptResolver {
    pub fn new(extractor: Box<dyn AudioExtractor>, backend: Box<dyn TranscriptionBackend>) -> Self {
        Self {
            extractor,
            backend,
            retry: RetryPolicy::backend_default(),
            temp_root: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy<BackendError>) -> Self {
        self.retry = retry;
        self
    }

    /// Put temporary audio under `root` instead of the system temp dir
    pub fn with_temp_root(mut self, root: Option<PathBuf>) -> Self {
        self.temp_root = root;
        self
    }

    pub async fn resolve(&self, video: &Path) -> Result<String, PublishError> {
        self.resolve_with_source(video).await.map(|r| r.text)
    }

    pub async fn resolve_with_source(&self, video: &Path) -> Result<ResolvedTranscript, PublishError> {
        let txt_path = video.with_extension("txt");
        if let Some(text) = read_sidecar(&txt_path).await {
            let text = text.trim();
            if !text.is_empty() {
                tracing::info!(path = %txt_path.display(), "Using .txt sidecar as transcript");
                return Ok(ResolvedTranscript {
                    text: text.to_string(),
                    source: TranscriptSource::TextSidecar(txt_path),
                });
            }
            tracing::warn!(path = %txt_path.display(), "Empty .txt sidecar, trying next source");
        }

        let srt_path = video.with_extension("srt");
        if let Some(content) = read_sidecar(&srt_path).await {
            let text = srt::extract_text(&content);
            if !text.is_empty() {
                tracing::info!(path = %srt_path.display(), "Using .srt sidecar as transcript");
                return Ok(ResolvedTranscript {
                    text,
                    source: TranscriptSource::SubtitleSidecar(srt_path),
                });
            }
            tracing::warn!(path = %srt_path.display(), "Empty .srt sidecar, trying next source");
        }

        let text = self.transcribe_audio(video).await?;
        Ok(ResolvedTranscript {
            text,
            source: TranscriptSource::Backend,
        })
    }

    /// Source `resolve` will use, judged by the same emptiness rules
    pub fn detect_source(video: &Path) -> TranscriptSource {
        let txt_path = video.with_extension("txt");
        if fs_err::read_to_string(&txt_path).is_ok_and(|text| !text.trim().is_empty()) {
            return TranscriptSource::TextSidecar(txt_path);
        }

        let srt_path = video.with_extension("srt");
        if fs_err::read_to_string(&srt_path).is_ok_and(|content| !srt::extract_text(&content).is_empty()) {
            return TranscriptSource::SubtitleSidecar(srt_path);
        }

        TranscriptSource::Backend
    }

    /// Extract audio into a scoped temp dir and send it to the backend
    ///
    /// The temp dir is removed when it drops, on every return path.
    async fn transcribe_audio(&self, video: &Path) -> Result<String, PublishError> {
        let temp_dir = self.create_temp_dir()?;
        let audio_path = temp_dir
            .path()
            .join(format!("audio_{}.mp3", &Uuid::new_v4().to_string()[..8]));

        tracing::info!(video = %video.display(), "Extracting audio for transcription");
        self.extractor
            .extract_audio(video, &audio_path)
            .await
            .map_err(PublishError::Transcription)?;

        let transcript = with_retry(&self.retry, || self.backend.transcribe(&audio_path))
            .await
            .map_err(PublishError::Transcription)?;

        if let Err(e) = temp_dir.close() {
            tracing::warn!(error = %e, "Failed to remove temporary audio");
        }

        let transcript = transcript.trim();
        if transcript.is_empty() {
            tracing::warn!("Empty transcription, using fallback sentence");
            return Ok(NO_SPEECH_FALLBACK.to_string());
        }

        tracing::info!(length = transcript.len(), "Transcription completed");
        Ok(transcript.to_string())
    }

    fn create_temp_dir(&self) -> Result<TempDir, PublishError> {
        let result = match &self.temp_root {
            Some(root) => fs_err::create_dir_all(root).and_then(|_| TempDir::new_in(root)),
            None => TempDir::new(),
        };

        result.map_err(|e| {
            PublishError::Transcription(BackendError::Failed(format!(
                "Failed to create temporary directory: {}",
                e
            )))
        })
    }
}

/// Sidecar contents, or `None` when missing or unreadable
async fn read_sidecar(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }

    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read sidecar file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Writes a dummy file where the audio would go and remembers the path
    struct RecordingExtractor {
        written: Arc<Mutex<Option<PathBuf>>>,
    }

    #[async_trait]
    impl AudioExtractor for RecordingExtractor {
        async fn extract_audio(&self, _video: &Path, output: &Path) -> Result<(), BackendError> {
            fs_err::write(output, b"ID3").map_err(|e| BackendError::Failed(e.to_string()))?;
            *self.written.lock().unwrap() = Some(output.to_path_buf());
            Ok(())
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl AudioExtractor for FailingExtractor {
        async fn extract_audio(&self, _video: &Path, _output: &Path) -> Result<(), BackendError> {
            Err(BackendError::Failed("no audio stream".into()))
        }
    }

    fn resolver(backend: MockTranscriptionBackend) -> (TranscriptResolver, Arc<Mutex<Option<PathBuf>>>) {
        let written = Arc::new(Mutex::new(None));
        let extractor = RecordingExtractor {
            written: Arc::clone(&written),
        };
        let resolver = TranscriptResolver::new(Box::new(extractor), Box::new(backend))
            .with_retry_policy(RetryPolicy::immediate(3, BackendError::is_rate_limited));
        (resolver, written)
    }

    fn video_in(dir: &TempDir) -> PathBuf {
        let video = dir.path().join("lesson.mp4");
        fs_err::write(&video, b"not really a video").unwrap();
        video
    }

    #[tokio::test]
    async fn test_txt_sidecar_wins_without_backend_call() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);
        fs_err::write(video.with_extension("txt"), "  Hola clase.\n\n").unwrap();
        fs_err::write(video.with_extension("srt"), "1\n00:00:00,000 --> 00:00:01,000\nSRT\n").unwrap();

        let mut backend = MockTranscriptionBackend::new();
        backend.expect_transcribe().never();
        let (resolver, _) = resolver(backend);

        let resolved = resolver.resolve_with_source(&video).await.unwrap();
        assert_eq!(resolved.text, "Hola clase.");
        assert!(matches!(resolved.source, TranscriptSource::TextSidecar(_)));
    }

    #[tokio::test]
    async fn test_empty_txt_falls_back_to_srt() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);
        fs_err::write(video.with_extension("txt"), "   \n").unwrap();
        fs_err::write(
            video.with_extension("srt"),
            "1\n00:00:00,000 --> 00:00:01,000\nPrimera\n\n2\n00:00:01,000 --> 00:00:02,000\nSegunda\n",
        )
        .unwrap();

        let mut backend = MockTranscriptionBackend::new();
        backend.expect_transcribe().never();
        let (resolver, _) = resolver(backend);

        let resolved = resolver.resolve_with_source(&video).await.unwrap();
        assert_eq!(resolved.text, "Primera Segunda");
        assert!(matches!(resolved.source, TranscriptSource::SubtitleSidecar(_)));
    }

    #[tokio::test]
    async fn test_backend_used_without_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);

        let mut backend = MockTranscriptionBackend::new();
        backend
            .expect_transcribe()
            .times(1)
            .returning(|_| Ok("  transcribed words \n".to_string()));
        let (resolver, written) = resolver(backend);

        let resolved = resolver.resolve_with_source(&video).await.unwrap();
        assert_eq!(resolved.text, "transcribed words");
        assert_eq!(resolved.source, TranscriptSource::Backend);

        let audio = written.lock().unwrap().clone().unwrap();
        assert!(!audio.exists());
    }

    #[tokio::test]
    async fn test_empty_transcription_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);

        let mut backend = MockTranscriptionBackend::new();
        backend
            .expect_transcribe()
            .returning(|_| Ok(" \n ".to_string()));
        let (resolver, _) = resolver(backend);

        assert_eq!(resolver.resolve(&video).await.unwrap(), NO_SPEECH_FALLBACK);
    }

    #[tokio::test]
    async fn test_backend_failure_is_fatal_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);

        let mut backend = MockTranscriptionBackend::new();
        backend
            .expect_transcribe()
            .times(1)
            .returning(|_| Err(BackendError::Failed("invalid file format".into())));
        let (resolver, written) = resolver(backend);

        let err = resolver.resolve(&video).await.unwrap_err();
        assert!(matches!(err, PublishError::Transcription(BackendError::Failed(_))));

        let audio = written.lock().unwrap().clone().unwrap();
        assert!(!audio.exists());
        assert!(!audio.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_rate_limited_transcription_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);

        let mut backend = MockTranscriptionBackend::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_transcribe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(BackendError::RateLimited("429".into())));
        backend
            .expect_transcribe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("second time lucky".to_string()));
        let (resolver, _) = resolver(backend);

        assert_eq!(resolver.resolve(&video).await.unwrap(), "second time lucky");
    }

    #[tokio::test]
    async fn test_extraction_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);

        let mut backend = MockTranscriptionBackend::new();
        backend.expect_transcribe().never();
        let resolver = TranscriptResolver::new(Box::new(FailingExtractor), Box::new(backend));

        let err = resolver.resolve(&video).await.unwrap_err();
        assert!(err.to_string().contains("no audio stream"));
    }

    #[tokio::test]
    async fn test_temp_root_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);
        let temp_root = dir.path().join("scratch");

        let mut backend = MockTranscriptionBackend::new();
        backend.expect_transcribe().returning(|_| Ok("ok".to_string()));
        let (resolver, written) = resolver(backend);
        let resolver = resolver.with_temp_root(Some(temp_root.clone()));

        resolver.resolve(&video).await.unwrap();
        let audio = written.lock().unwrap().clone().unwrap();
        assert!(audio.starts_with(&temp_root));
        assert!(temp_root.exists());
        assert!(!audio.exists());
    }

    #[test]
    fn test_detect_source() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);
        assert_eq!(TranscriptResolver::detect_source(&video), TranscriptSource::Backend);

        fs_err::write(video.with_extension("srt"), "1\n00:00:00,000 --> 00:00:01,000\n").unwrap();
        assert_eq!(TranscriptResolver::detect_source(&video), TranscriptSource::Backend);

        fs_err::write(video.with_extension("srt"), "1\n00:00:00,000 --> 00:00:01,000\nHola\n").unwrap();
        assert!(matches!(
            TranscriptResolver::detect_source(&video),
            TranscriptSource::SubtitleSidecar(_)
        ));
    }

    #[tokio::test]
    async fn test_detect_source_skips_blank_txt_like_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_in(&dir);
        fs_err::write(video.with_extension("txt"), "  \n\t\n").unwrap();
        fs_err::write(video.with_extension("srt"), "1\n00:00:00,000 --> 00:00:01,000\nHola\n").unwrap();

        let detected = TranscriptResolver::detect_source(&video);
        assert!(matches!(detected, TranscriptSource::SubtitleSidecar(_)));

        let mut backend = MockTranscriptionBackend::new();
        backend.expect_transcribe().never();
        let (resolver, _) = resolver(backend);
        let resolved = resolver.resolve_with_source(&video).await.unwrap();
        assert_eq!(resolved.source, detected);
    }
}
