use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::models::Platform;

#[derive(Parser)]
#[command(
    name = "shortcast",
    about = "Publish a short video to YouTube Shorts, Instagram Reels and TikTok with AI captions",
    version,
    long_about = "Validates a short-form video, resolves its transcript from a .txt/.srt sidecar or the Whisper API, generates a caption per platform with a chat model and uploads the video to every enabled platform. One platform failing never stops the others."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a video to the enabled platforms
    Upload {
        /// Video file to publish (mp4, mov, avi, webm)
        #[arg(value_name = "VIDEO")]
        video: PathBuf,

        /// YouTube title (defaults to the generated title)
        #[arg(short, long)]
        title: Option<String>,

        /// Only upload to these platforms, ignoring the configured toggles
        #[arg(long, value_enum, value_name = "PLATFORM")]
        only: Vec<Platform>,

        /// Skip these platforms
        #[arg(long, value_enum, value_name = "PLATFORM")]
        skip: Vec<Platform>,

        /// Generate and show captions without uploading
        #[arg(long)]
        preview: bool,

        /// Upload without reviewing the captions
        #[arg(long)]
        no_confirm: bool,

        /// Print the run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a video and show where its transcript would come from
    Check {
        #[arg(value_name = "VIDEO")]
        video: PathBuf,
    },

    /// Authorize an account and store its token
    Auth {
        #[arg(value_enum)]
        platform: AuthPlatform,
    },

    /// Show or explain the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List platforms and whether their credentials are present
    Platforms,
}

/// Platforms with an authorization-code flow
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthPlatform {
    Youtube,
    Tiktok,
}

impl From<AuthPlatform> for Platform {
    fn from(platform: AuthPlatform) -> Self {
        match platform {
            AuthPlatform::Youtube => Platform::YouTube,
            AuthPlatform::Tiktok => Platform::TikTok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_arguments() {
        let cli = Cli::try_parse_from([
            "shortcast",
            "upload",
            "clip.mp4",
            "--only",
            "youtube",
            "--only",
            "tiktok",
            "--skip",
            "instagram",
            "--no-confirm",
        ])
        .unwrap();

        match cli.command {
            Commands::Upload {
                video,
                only,
                skip,
                no_confirm,
                preview,
                ..
            } => {
                assert_eq!(video, PathBuf::from("clip.mp4"));
                assert_eq!(only, vec![Platform::YouTube, Platform::TikTok]);
                assert_eq!(skip, vec![Platform::Instagram]);
                assert!(no_confirm);
                assert!(!preview);
            }
            _ => panic!("expected upload"),
        }
    }

    #[test]
    fn test_unknown_platform_is_rejected() {
        assert!(Cli::try_parse_from(["shortcast", "upload", "clip.mp4", "--only", "vimeo"]).is_err());
    }

    #[test]
    fn test_auth_platform() {
        let cli = Cli::try_parse_from(["shortcast", "auth", "tiktok"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Auth {
                platform: AuthPlatform::Tiktok
            }
        ));
        assert!(Cli::try_parse_from(["shortcast", "auth", "instagram"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["shortcast", "platforms", "--verbose", "--quiet"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.quiet);
    }
}
