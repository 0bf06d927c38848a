use std::fmt;
use std::path::Path;

use crate::captions::CaptionGenerator;
use crate::models::{Platform, PlatformCaptions, RunResult, UploadOutcome, VideoMetadata};
use crate::platforms::UploadDispatcher;
use crate::transcribe::{TranscriptResolver, TranscriptSource};
use crate::validate::VideoValidator;
use crate::PublishError;

/// Lifecycle of a single publishing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Created,
    Validated,
    Transcribed,
    Captioned,
    Dispatched,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Created => "created",
            RunState::Validated => "validated",
            RunState::Transcribed => "transcribed",
            RunState::Captioned => "captioned",
            RunState::Dispatched => "dispatched",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Owns the stage components; each video gets its own [`PipelineRun`]
pub struct Pipeline {
    validator: Box<dyn VideoValidator>,
    resolver: TranscriptResolver,
    generator: CaptionGenerator,
    dispatcher: UploadDispatcher,
}

impl Pipeline {
    pub fn new(
        validator: Box<dyn VideoValidator>,
        resolver: TranscriptResolver,
        generator: CaptionGenerator,
        dispatcher: UploadDispatcher,
    ) -> Self {
        Self {
            validator,
            resolver,
            generator,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &UploadDispatcher {
        &self.dispatcher
    }

    pub fn start(&self, video: impl AsRef<Path>) -> PipelineRun<'_> {
        PipelineRun {
            pipeline: self,
            state: RunState::Created,
            result: RunResult::new(video.as_ref().to_path_buf()),
            transcript_source: None,
        }
    }

    /// Drive every stage without operator interaction
    pub async fn run(&self, video: &Path, title: Option<&str>) -> Result<RunResult, PublishError> {
        let mut run = self.start(video);
        run.validate().await?;
        run.resolve_transcript().await?;
        run.generate_captions().await?;
        run.dispatch(title).await?;
        Ok(run.finish())
    }
}

/// One video moving through the stages, strictly in order
pub struct PipelineRun<'a> {
    pipeline: &'a Pipeline,
    state: RunState,
    result: RunResult,
    transcript_source: Option<TranscriptSource>,
}

impl<'a> PipelineRun<'a> {
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn result(&self) -> &RunResult {
        &self.result
    }

    pub fn transcript_source(&self) -> Option<&TranscriptSource> {
        self.transcript_source.as_ref()
    }

    fn require(&self, expected: RunState, to: RunState) -> Result<(), PublishError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PublishError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    fn fail(&mut self, stage: &str, err: PublishError) -> PublishError {
        tracing::error!(stage, error = %err, "Pipeline stage failed");
        self.state = RunState::Failed;
        err
    }

    pub async fn validate(&mut self) -> Result<&VideoMetadata, PublishError> {
        self.require(RunState::Created, RunState::Validated)?;
        let video = self.result.video_path().to_path_buf();
        tracing::info!(video = %video.display(), "Validating video");

        match self.pipeline.validator.validate(&video).await {
            Ok(metadata) => {
                self.result.set_metadata(metadata);
                self.state = RunState::Validated;
            }
            Err(e) => return Err(self.fail("validate", e)),
        }

        self.result
            .metadata()
            .ok_or_else(|| PublishError::Validation("metadata missing after validation".to_string()))
    }

    pub async fn resolve_transcript(&mut self) -> Result<&str, PublishError> {
        self.require(RunState::Validated, RunState::Transcribed)?;
        tracing::info!("Resolving transcript");

        let video = self.result.video_path().to_path_buf();
        match self.pipeline.resolver.resolve_with_source(&video).await {
            Ok(resolved) => {
                tracing::info!(source = %resolved.source, chars = resolved.text.chars().count(), "Transcript ready");
                self.result.set_transcript(resolved.text);
                self.transcript_source = Some(resolved.source);
                self.state = RunState::Transcribed;
            }
            Err(e) => return Err(self.fail("transcribe", e)),
        }

        Ok(self.result.transcript().unwrap_or_default())
    }

    pub async fn generate_captions(&mut self) -> Result<&PlatformCaptions, PublishError> {
        self.require(RunState::Transcribed, RunState::Captioned)?;
        tracing::info!("Generating captions");

        let transcript = self.result.transcript().unwrap_or_default().to_string();
        match self.pipeline.generator.generate(&transcript).await {
            Ok(captions) => {
                self.result.set_captions(captions);
                self.state = RunState::Captioned;
            }
            Err(e) => return Err(self.fail("captions", e)),
        }

        self.result
            .captions()
            .ok_or_else(|| PublishError::Config("captions missing after generation".to_string()))
    }

    /// Captions open for operator edits between generation and dispatch
    pub fn captions_mut(&mut self) -> Option<&mut PlatformCaptions> {
        if self.state == RunState::Captioned {
            self.result.captions_mut()
        } else {
            None
        }
    }

    /// Ask the generator for a fresh caption for one platform
    ///
    /// A failure here leaves the existing captions and the run state untouched.
    pub async fn regenerate_caption(&mut self, platform: Platform) -> Result<(), PublishError> {
        self.require(RunState::Captioned, RunState::Captioned)?;

        let transcript = self.result.transcript().unwrap_or_default().to_string();
        let mut captions = self.result.captions().cloned().unwrap_or_default();
        self.pipeline
            .generator
            .regenerate(platform, &transcript, &mut captions)
            .await?;
        self.result.set_captions(captions);
        Ok(())
    }

    /// Title for the YouTube upload: override, then generated title, then file stem
    pub fn youtube_title(&self, title_override: Option<&str>) -> String {
        if let Some(title) = title_override.map(str::trim).filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        if let Some(title) = self
            .result
            .captions()
            .map(|c| c.youtube_title.trim())
            .filter(|t| !t.is_empty())
        {
            return title.to_string();
        }
        self.result
            .video_path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Short".to_string())
    }

    /// Upload to every enabled platform; per-platform failures are recorded, not raised
    pub async fn dispatch(&mut self, title_override: Option<&str>) -> Result<&[UploadOutcome], PublishError> {
        self.require(RunState::Captioned, RunState::Dispatched)?;

        let title = self.youtube_title(title_override);
        let captions = self.result.captions().cloned().unwrap_or_default();
        let video = self.result.video_path().to_path_buf();

        tracing::info!(platforms = self.pipeline.dispatcher.platforms().len(), "Dispatching uploads");
        let outcomes = self.pipeline.dispatcher.dispatch(&video, &captions, &title).await;
        self.result.set_outcomes(outcomes);
        self.state = RunState::Dispatched;

        tracing::info!(
            successful = self.result.successful_count(),
            total = self.result.total_count(),
            "Publishing finished"
        );
        self.state = RunState::Done;

        Ok(self.result.outcomes())
    }

    pub fn finish(self) -> RunResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::{CaptionLimits, MockCaptionBackend, PromptBuilder};
    use crate::config::CaptionConfig;
    use crate::platforms::{PlatformAdapter, UploadReceipt};
    use crate::retry::RetryPolicy;
    use crate::transcribe::{AudioExtractor, MockTranscriptionBackend};
    use crate::{BackendError, UploadError};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    struct FakeValidator {
        fail: bool,
    }

    #[async_trait]
    impl VideoValidator for FakeValidator {
        async fn validate(&self, path: &Path) -> Result<VideoMetadata, PublishError> {
            if self.fail {
                Err(PublishError::Validation("Unsupported format: .mkv".into()))
            } else {
                Ok(VideoMetadata::new(path.to_path_buf(), 30.0, (1080, 1920), 12, "mp4"))
            }
        }
    }

    struct NoopExtractor;

    #[async_trait]
    impl AudioExtractor for NoopExtractor {
        async fn extract_audio(&self, _video: &Path, output: &Path) -> Result<(), BackendError> {
            tokio::fs::write(output, b"audio")
                .await
                .map_err(|e| BackendError::Failed(e.to_string()))
        }
    }

    struct RecordingAdapter {
        platform: Platform,
        fail: bool,
        seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
    }

    #[async_trait]
    impl PlatformAdapter for RecordingAdapter {
        fn platform(&self) -> Platform {
            self.platform
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn upload(
            &self,
            _video: &Path,
            caption: &str,
            title: Option<&str>,
        ) -> Result<UploadReceipt, UploadError> {
            self.seen
                .lock()
                .unwrap()
                .push((caption.to_string(), title.map(str::to_string)));
            if self.fail {
                Err(UploadError::Platform("quota exceeded".into()))
            } else {
                Ok(UploadReceipt::new("id1", "https://example.com/id1"))
            }
        }
    }

    type Seen = Arc<Mutex<Vec<(String, Option<String>)>>>;

    fn captions_backend() -> MockCaptionBackend {
        let mut backend = MockCaptionBackend::new();
        backend.expect_complete().returning(|prompt| {
            if prompt.contains("YouTube Shorts") {
                Ok("TITLE: Generated title\nDESCRIPTION: yt description".into())
            } else if prompt.contains("Instagram") {
                Ok("ig caption".into())
            } else {
                Ok("tt caption".into())
            }
        });
        backend
    }

    fn pipeline(validator_fails: bool, failing: &[Platform]) -> (Pipeline, Seen) {
        let mut transcriber = MockTranscriptionBackend::new();
        transcriber
            .expect_transcribe()
            .returning(|_| Ok("Hola, hoy aprendemos adjetivos.".into()));
        let policy = RetryPolicy::immediate(3, BackendError::is_rate_limited);

        let resolver = TranscriptResolver::new(Box::new(NoopExtractor), Box::new(transcriber))
            .with_retry_policy(policy.clone());
        let generator = CaptionGenerator::new(
            Box::new(captions_backend()),
            PromptBuilder::new(&CaptionConfig::default(), CaptionLimits::default()),
        )
        .with_retry_policy(policy);

        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let adapters: Vec<Box<dyn PlatformAdapter>> = Platform::ALL
            .into_iter()
            .map(|platform| -> Box<dyn PlatformAdapter> {
                Box::new(RecordingAdapter {
                    platform,
                    fail: failing.contains(&platform),
                    seen: seen.clone(),
                })
            })
            .collect();

        let pipeline = Pipeline::new(
            Box::new(FakeValidator {
                fail: validator_fails,
            }),
            resolver,
            generator,
            UploadDispatcher::new(adapters),
        );
        (pipeline, seen)
    }

    fn video() -> PathBuf {
        PathBuf::from("/tmp/shortcast-pipeline-test/lesson.mp4")
    }

    #[tokio::test]
    async fn test_run_happy_path() {
        let (pipeline, seen) = pipeline(false, &[]);
        let result = pipeline.run(&video(), None).await.unwrap();

        assert_eq!(result.transcript(), Some("Hola, hoy aprendemos adjetivos."));
        assert_eq!(result.captions().unwrap().youtube_title, "Generated title");
        assert_eq!(result.successful_count(), 3);
        assert_eq!(result.total_count(), 3);
        assert_eq!(
            seen.lock().unwrap()[0],
            ("yt description".to_string(), Some("Generated title".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stage_states() {
        let (pipeline, _) = pipeline(false, &[]);
        let mut run = pipeline.start(video());
        assert_eq!(run.state(), RunState::Created);

        run.validate().await.unwrap();
        assert_eq!(run.state(), RunState::Validated);
        run.resolve_transcript().await.unwrap();
        assert_eq!(run.state(), RunState::Transcribed);
        assert_eq!(run.transcript_source(), Some(&TranscriptSource::Backend));
        run.generate_captions().await.unwrap();
        assert_eq!(run.state(), RunState::Captioned);
        run.dispatch(None).await.unwrap();
        assert_eq!(run.state(), RunState::Done);
    }

    #[tokio::test]
    async fn test_validation_failure_moves_to_failed() {
        let (pipeline, seen) = pipeline(true, &[]);
        let mut run = pipeline.start(video());

        let err = run.validate().await.unwrap_err();
        assert!(matches!(err, PublishError::Validation(_)));
        assert_eq!(run.state(), RunState::Failed);

        let err = run.resolve_transcript().await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::InvalidTransition {
                from: RunState::Failed,
                to: RunState::Transcribed
            }
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_stage_is_rejected() {
        let (pipeline, _) = pipeline(false, &[]);
        let mut run = pipeline.start(video());

        let err = run.dispatch(None).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::InvalidTransition {
                from: RunState::Created,
                to: RunState::Dispatched
            }
        ));
        assert_eq!(run.state(), RunState::Created);
        assert!(run.captions_mut().is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_still_reaches_done() {
        let (pipeline, _) = pipeline(false, &[Platform::Instagram]);
        let mut run = pipeline.start(video());
        run.validate().await.unwrap();
        run.resolve_transcript().await.unwrap();
        run.generate_captions().await.unwrap();

        let outcomes = run.dispatch(Some("Manual title")).await.unwrap();
        assert_eq!(outcomes.iter().filter(|o| o.success()).count(), 2);
        assert_eq!(outcomes[1].error(), Some("quota exceeded"));
        assert_eq!(run.state(), RunState::Done);

        let result = run.finish();
        assert!(!result.all_succeeded());
    }

    #[tokio::test]
    async fn test_youtube_failure_keeps_other_uploads() {
        let (pipeline, seen) = pipeline(false, &[Platform::YouTube]);
        let mut run = pipeline.start(video());
        run.validate().await.unwrap();
        run.resolve_transcript().await.unwrap();
        run.generate_captions().await.unwrap();
        run.dispatch(None).await.unwrap();

        let result = run.finish();
        assert_eq!(result.successful_count(), 2);
        assert_eq!(result.total_count(), 3);
        assert_eq!(result.outcomes()[0].platform, Platform::YouTube);
        assert!(result.outcomes()[0].error().is_some_and(|e| !e.is_empty()));
        assert!(result.outcomes()[1..].iter().all(|o| o.success()));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_edited_captions_are_uploaded() {
        let (pipeline, seen) = pipeline(false, &[]);
        let mut run = pipeline.start(video());
        run.validate().await.unwrap();
        run.resolve_transcript().await.unwrap();
        run.generate_captions().await.unwrap();

        if let Some(captions) = run.captions_mut() {
            captions.instagram = "edited by hand".into();
            captions.youtube_title = String::new();
        }
        run.dispatch(None).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1.as_deref(), Some("lesson"));
        assert_eq!(seen[1].0, "edited by hand");
    }

    #[tokio::test]
    async fn test_title_override_wins() {
        let (pipeline, seen) = pipeline(false, &[]);
        pipeline.run(&video(), Some("  Override  ")).await.unwrap();
        assert_eq!(seen.lock().unwrap()[0].1.as_deref(), Some("Override"));
    }
}
