use crate::captions::CaptionLimits;
use crate::config::CaptionConfig;
use crate::models::Platform;

/// Builds the user prompt sent for each platform
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    language: String,
    hashtags: Vec<String>,
    limits: CaptionLimits,
}

impl PromptBuilder {
    pub fn new(config: &CaptionConfig, limits: CaptionLimits) -> Self {
        Self {
            language: config.language.clone(),
            hashtags: config.hashtags.clone(),
            limits,
        }
    }

    pub fn for_platform(&self, platform: Platform, transcript: &str) -> String {
        match platform {
            Platform::YouTube => self.youtube(transcript),
            Platform::Instagram => self.instagram(transcript),
            Platform::TikTok => self.tiktok(transcript),
        }
    }

    fn hashtag_line(&self) -> String {
        if self.hashtags.is_empty() {
            "- End with 3-8 relevant hashtags on their own line".to_string()
        } else {
            format!(
                "- End with these hashtags on their own line, plus any relevant extras: {}",
                self.hashtags
                    .iter()
                    .map(|tag| format!("#{}", tag.trim_start_matches('#')))
                    .collect::<Vec<_>>()
                    .join(" ")
            )
        }
    }

    fn youtube(&self, transcript: &str) -> String {
        format!(
            r#"Based on this video transcription, create a YouTube Shorts TITLE and DESCRIPTION.

TRANSCRIPTION:
"{transcript}"

TITLE:
- Start with a relevant emoji
- Short, catchy hook, max {title_max} characters

DESCRIPTION:
- Open with a clear explanation of the topic
- Use short bullet points with emojis for examples and tips
- Finish with a call to action to save and share the Short
{hashtags}
- Max {description_max} characters

Write in {language}.

RESPOND IN THIS EXACT FORMAT:
TITLE: [your title here]
DESCRIPTION: [your description here]"#,
            transcript = transcript,
            title_max = self.limits.youtube_title,
            description_max = self.limits.youtube,
            hashtags = self.hashtag_line(),
            language = self.language,
        )
    }

    fn instagram(&self, transcript: &str) -> String {
        format!(
            r#"Based on this video transcription, create an Instagram Reels caption.

TRANSCRIPTION:
"{transcript}"

- Start with an emoji and a catchy hook
- Give a brief explanation, then 2-4 examples as emoji bullet points
- Add a fun fact or an important note if it fits
- Finish with a call to action to save and share the reel
{hashtags}
- Max {max} characters

Write in {language}. Respond ONLY with the caption, no explanations."#,
            transcript = transcript,
            hashtags = self.hashtag_line(),
            max = self.limits.instagram,
            language = self.language,
        )
    }

    fn tiktok(&self, transcript: &str) -> String {
        format!(
            r#"Based on this video transcription, create a TikTok caption.

TRANSCRIPTION:
"{transcript}"

- Start with an emoji and a personal, relatable hook
- Keep it brief, punchy and conversational
- Include 2-3 practical tips as emoji bullet points
- Finish with a call to action to save the TikTok
{hashtags}
- Max {max} characters

Write in {language}. Respond ONLY with the caption, no explanations."#,
            transcript = transcript,
            hashtags = self.hashtag_line(),
            max = self.limits.tiktok,
            language = self.language,
        )
    }
}
