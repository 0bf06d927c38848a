use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::Platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenAI API settings (transcription and captions)
    pub openai: OpenAiConfig,

    /// Caption prompt settings
    pub captions: CaptionConfig,

    /// YouTube Shorts credentials and upload defaults
    pub youtube: YouTubeConfig,

    /// Instagram Graph API credentials
    pub instagram: InstagramConfig,

    /// TikTok Content Posting API credentials
    pub tiktok: TikTokConfig,

    /// Which platforms are enabled by default
    pub platforms: PlatformToggles,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key (overridden by OPENAI_API_KEY)
    pub api_key: String,

    /// Base URL for the OpenAI-compatible API
    pub base_url: String,

    /// Chat model used for captions
    pub chat_model: String,

    /// Whisper model used for transcription
    pub transcription_model: String,

    /// Spoken language of the videos (ISO-639-1)
    pub language: Option<String>,

    /// Sampling temperature for captions
    pub temperature: f32,

    /// Maximum completion tokens per caption call
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4".to_string(),
            transcription_model: "whisper-1".to_string(),
            language: Some("es".to_string()),
            temperature: 0.7,
            max_tokens: 1500,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// System prompt describing the account voice
    pub persona: String,

    /// Language the captions are written in
    pub language: String,

    /// Hashtags the model is asked to include
    pub hashtags: Vec<String>,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            persona: "You are a social media expert for an educational short-video account. \
                      You write engaging, friendly and authentic captions, use emojis \
                      strategically and format content for maximum engagement."
                .to_string(),
            language: "English".to_string(),
            hashtags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    /// OAuth client secret downloaded from Google Cloud Console
    pub client_secret_file: PathBuf,

    /// Where the authorized user token is stored
    pub token_file: PathBuf,

    /// public, unlisted or private
    pub privacy: String,

    /// Named category (see platforms::youtube::CATEGORIES)
    pub category: String,

    /// Extra tags added to every upload
    pub tags: Vec<String>,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            client_secret_file: PathBuf::from("credentials/youtube_client_secret.json"),
            token_file: PathBuf::from("credentials/tokens/youtube_token.json"),
            privacy: "public".to_string(),
            category: "people_blogs".to_string(),
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    /// Instagram professional account id (overridden by INSTAGRAM_USER_ID)
    pub user_id: Option<String>,

    /// Long-lived Graph API token (overridden by INSTAGRAM_ACCESS_TOKEN)
    pub access_token: Option<String>,

    /// Share the reel to the main feed as well
    pub share_to_feed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TikTokConfig {
    pub client_key: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,

    /// Where `shortcast auth tiktok` stores the token response
    pub token_file: PathBuf,

    /// Redirect URI registered with the TikTok developer app
    pub redirect_uri: String,

    /// public, friends or private
    pub privacy: String,

    pub disable_duet: bool,
    pub disable_stitch: bool,
    pub disable_comment: bool,
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            client_key: None,
            client_secret: None,
            access_token: None,
            token_file: PathBuf::from("credentials/tokens/tiktok_token.json"),
            redirect_uri: "http://localhost:8080/callback".to_string(),
            privacy: "public".to_string(),
            disable_duet: false,
            disable_stitch: false,
            disable_comment: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformToggles {
    pub youtube: bool,
    pub instagram: bool,
    pub tiktok: bool,
}

impl Default for PlatformToggles {
    fn default() -> Self {
        Self {
            youtube: true,
            instagram: true,
            tiktok: false,
        }
    }
}

impl PlatformToggles {
    pub fn is_enabled(&self, platform: Platform) -> bool {
        match platform {
            Platform::YouTube => self.youtube,
            Platform::Instagram => self.instagram,
            Platform::TikTok => self.tiktok,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default log filter level
    pub log_level: String,

    /// Optional log file written alongside stderr
    pub log_file: Option<PathBuf>,

    /// Longest accepted video in seconds
    pub max_video_duration_secs: f64,

    /// Largest accepted video in MB
    pub max_file_size_mb: u64,

    /// Temporary directory for audio extraction
    pub temp_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            max_video_duration_secs: 120.0,
            max_file_size_mb: 500,
            temp_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from file or create default, then apply environment overrides
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str::<Config>(&content).context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.save().await?;
            config
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("shortcast").join("config.yaml"))
    }

    /// Secrets and feature flags may come from the environment
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Some(id) = non_empty("INSTAGRAM_USER_ID") {
            self.instagram.user_id = Some(id);
        }
        if let Some(token) = non_empty("INSTAGRAM_ACCESS_TOKEN") {
            self.instagram.access_token = Some(token);
        }
        if let Some(key) = non_empty("TIKTOK_CLIENT_KEY") {
            self.tiktok.client_key = Some(key);
        }
        if let Some(secret) = non_empty("TIKTOK_CLIENT_SECRET") {
            self.tiktok.client_secret = Some(secret);
        }
        if let Some(token) = non_empty("TIKTOK_ACCESS_TOKEN") {
            self.tiktok.access_token = Some(token);
        }

        let flag = |key: &str| non_empty(key).and_then(|v| parse_flag(&v));
        if let Some(enabled) = flag("ENABLE_YOUTUBE") {
            self.platforms.youtube = enabled;
        }
        if let Some(enabled) = flag("ENABLE_INSTAGRAM") {
            self.platforms.instagram = enabled;
        }
        if let Some(enabled) = flag("ENABLE_TIKTOK") {
            self.platforms.tiktok = enabled;
        }
    }

    /// Resolve the platforms for this run from `--only` / `--skip`
    ///
    /// `--only` ignores the configured toggles entirely.
    pub fn enabled_platforms(&self, only: &[Platform], skip: &[Platform]) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| {
                if only.is_empty() {
                    self.platforms.is_enabled(*p)
                } else {
                    only.contains(p)
                }
            })
            .filter(|p| !skip.contains(p))
            .collect()
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  OpenAI API Key: {}", mask(Some(&self.openai.api_key)));
        println!("  Chat Model: {}", self.openai.chat_model);
        println!("  Transcription Model: {}", self.openai.transcription_model);
        println!(
            "  Transcription Language: {}",
            self.openai.language.as_deref().unwrap_or("auto")
        );
        println!("  Caption Language: {}", self.captions.language);
        println!("  YouTube Client Secret: {}", self.youtube.client_secret_file.display());
        println!("  YouTube Privacy: {}", self.youtube.privacy);
        println!("  Instagram User Id: {}", self.instagram.user_id.as_deref().unwrap_or("-"));
        println!("  Instagram Token: {}", mask(self.instagram.access_token.as_ref()));
        println!("  TikTok Client Key: {}", mask(self.tiktok.client_key.as_ref()));
        println!("  TikTok Token: {}", mask(self.tiktok.access_token.as_ref()));
        println!(
            "  Enabled: YouTube={} Instagram={} TikTok={}",
            self.platforms.youtube, self.platforms.instagram, self.platforms.tiktok
        );
        println!("  Max Duration: {}s", self.app.max_video_duration_secs);
        println!("  Max File Size: {} MB", self.app.max_file_size_mb);
    }

    /// Point the user at the config file
    pub async fn interactive_setup(&self) -> Result<()> {
        println!("Edit the config file to set credentials and defaults:");
        println!("  {}", Self::config_path()?.display());
        println!("Secrets can also be provided through OPENAI_API_KEY, INSTAGRAM_ACCESS_TOKEN,");
        println!("TIKTOK_ACCESS_TOKEN and friends.");
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn mask(secret: Option<&String>) -> String {
    match secret {
        Some(s) if !s.is_empty() => {
            let visible: String = s.chars().take(4).collect();
            format!("{}****", visible)
        }
        _ => "(not set)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_enable_youtube_and_instagram() {
        let config = Config::default();
        assert_eq!(
            config.enabled_platforms(&[], &[]),
            vec![Platform::YouTube, Platform::Instagram]
        );
    }

    #[test]
    fn test_only_and_skip() {
        let config = Config::default();
        assert_eq!(
            config.enabled_platforms(&[Platform::TikTok], &[]),
            vec![Platform::TikTok]
        );
        assert_eq!(
            config.enabled_platforms(&[], &[Platform::YouTube]),
            vec![Platform::Instagram]
        );
        assert_eq!(
            config.enabled_platforms(&[Platform::TikTok, Platform::YouTube], &[Platform::TikTok]),
            vec![Platform::YouTube]
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("TIKTOK_ACCESS_TOKEN", "act.123"),
            ("ENABLE_TIKTOK", "true"),
            ("ENABLE_INSTAGRAM", "0"),
            ("INSTAGRAM_USER_ID", "  "),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.openai.api_key, "sk-test");
        assert_eq!(config.tiktok.access_token.as_deref(), Some("act.123"));
        assert!(config.platforms.tiktok);
        assert!(!config.platforms.instagram);
        assert!(config.instagram.user_id.is_none());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "openai:\n  api_key: sk-file\nplatforms:\n  tiktok: true\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.openai.api_key, "sk-file");
        assert_eq!(config.openai.chat_model, "gpt-4");
        assert!(config.platforms.tiktok);
        assert!(config.platforms.youtube);
        assert_eq!(config.app.max_file_size_mb, 500);
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask(Some(&"sk-abcdef".to_string())), "sk-a****");
        assert_eq!(mask(None), "(not set)");
    }
}
