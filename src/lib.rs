//! Shortcast - A Rust CLI tool for publishing short-form videos to social platforms
//!
//! This library validates a video, resolves its transcript from a sidecar file or the
//! Whisper API, generates per-platform captions with a chat model and uploads the video
//! to YouTube Shorts, Instagram Reels and TikTok, isolating each platform's failures.

pub mod captions;
pub mod cli;
pub mod config;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod platforms;
pub mod retry;
pub mod transcribe;
pub mod utils;
pub mod validate;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use models::{
    AspectRatio, OutcomeStatus, Platform, PlatformCaptions, RunResult, UploadOutcome,
    VideoMetadata,
};
pub use pipeline::{Pipeline, PipelineRun, RunState};
pub use platforms::{PlatformAdapter, UploadDispatcher, UploadReceipt};
pub use retry::{with_retry, RetryPolicy};

/// Result type used at the binary and configuration edge
pub type Result<T> = anyhow::Result<T>;

/// Failure reported by a remote backend (transcription, caption generation, audio extraction)
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("{0}")]
    Failed(String),
}

impl BackendError {
    /// Only rate-limit failures are worth another attempt
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackendError::RateLimited(_))
    }
}

/// Failure scoped to a single platform upload
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("{0}")]
    Platform(String),

    #[error("authentication failed: {0}")]
    Authentication(String),
}

/// Errors that end a publishing run
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("Video validation failed: {0}")]
    Validation(String),

    #[error("Transcription failed: {0}")]
    Transcription(#[source] BackendError),

    #[error("Caption generation failed for {platform}: {source}")]
    Generation {
        platform: Platform,
        #[source]
        source: BackendError,
    },

    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("Configuration error: {0}")]
    Config(String),
}
