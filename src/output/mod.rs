use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::captions::CaptionLimits;
use crate::models::{Platform, PlatformCaptions, RunResult, VideoMetadata};
use crate::pipeline::PipelineRun;
use crate::transcribe::TranscriptSource;
use crate::utils::{format_duration, preview};

const TRANSCRIPT_PREVIEW_CHARS: usize = 200;
const RULE: &str = "============================================================";

/// Spinner for a long-running stage; hidden in quiet mode
pub fn spinner(message: impl Into<String>, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.enable_steady_tick(Duration::from_millis(120));
    progress.set_message(message.into());
    progress
}

pub fn print_banner(video: &std::path::Path) {
    println!("{}", style(RULE).cyan().bold());
    println!("   {}", style("shortcast").magenta().bold());
    println!("   Video: {}", style(video.display()).yellow());
    println!("{}", style(RULE).cyan().bold());
    println!();
}

pub fn print_metadata(metadata: &VideoMetadata) {
    let (width, height) = metadata.resolution();
    println!("{}", style("Video").bold());
    println!("  Duration:   {}", format_duration(metadata.duration()));
    println!(
        "  Resolution: {}x{} ({})",
        width,
        height,
        metadata.aspect_ratio()
    );
    println!("  Size:       {} MB", metadata.file_size_mb());
    println!("  Format:     {}", metadata.format());
    if !metadata.is_vertical() {
        println!(
            "  {}",
            style("Not vertical: Shorts, Reels and TikTok expect 9:16").yellow()
        );
    }
    println!();
}

pub fn print_transcript(transcript: &str, source: Option<&TranscriptSource>) {
    let origin = source.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string());
    println!("{} ({})", style("Transcript").bold(), style(origin).dim());
    println!("  {}", preview(transcript, TRANSCRIPT_PREVIEW_CHARS));
    println!();
}

fn print_panel(label: &str, text: &str, limit: usize) {
    let length = text.chars().count();
    let counter = format!("{}/{}", length, limit);
    let counter = if length > limit {
        style(counter).red()
    } else {
        style(counter).dim()
    };
    println!("{} {}", style(label).cyan().bold(), counter);
    for line in text.lines() {
        println!("  {}", line);
    }
    println!();
}

pub fn print_captions(captions: &PlatformCaptions, limits: &CaptionLimits) {
    println!("{}", style("Generated captions").bold());
    println!();
    print_panel("YouTube title", &captions.youtube_title, limits.youtube_title);
    print_panel("YouTube description", &captions.youtube, limits.youtube);
    print_panel("Instagram", &captions.instagram, limits.instagram);
    print_panel("TikTok", &captions.tiktok, limits.tiktok);
}

pub fn print_results(result: &RunResult) {
    println!("{}", style("Upload results").bold());
    for outcome in result.outcomes() {
        let line = outcome.to_string();
        if outcome.success() {
            println!("  {} {}", style("✔").green(), style(line).green());
        } else {
            println!("  {} {}", style("✘").red(), style(line).red());
        }
    }

    let summary = format!(
        "{}/{} platforms published",
        result.successful_count(),
        result.total_count()
    );
    println!();
    if result.all_succeeded() {
        println!("{}", style(summary).green().bold());
    } else {
        println!("{}", style(summary).yellow().bold());
    }
}

pub fn print_json(result: &RunResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize run result")?;
    println!("{}", json);
    Ok(())
}

pub fn print_platform_status(status: &[(Platform, bool)]) {
    for (platform, configured) in status {
        let marker = if *configured {
            style("configured").green()
        } else {
            style("missing credentials").red()
        };
        println!("  {:<10} {}", platform.as_str(), marker);
    }
}

/// Choices offered while reviewing captions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    Upload,
    EditYouTubeTitle,
    EditYouTubeDescription,
    EditInstagram,
    EditTikTok,
    Regenerate(Platform),
    Cancel,
}

pub fn parse_action(input: &str) -> Option<EditAction> {
    match input.trim().to_lowercase().as_str() {
        "u" | "upload" | "" => Some(EditAction::Upload),
        "1" => Some(EditAction::EditYouTubeTitle),
        "2" => Some(EditAction::EditYouTubeDescription),
        "3" => Some(EditAction::EditInstagram),
        "4" => Some(EditAction::EditTikTok),
        "ry" => Some(EditAction::Regenerate(Platform::YouTube)),
        "ri" => Some(EditAction::Regenerate(Platform::Instagram)),
        "rt" => Some(EditAction::Regenerate(Platform::TikTok)),
        "c" | "cancel" | "q" => Some(EditAction::Cancel),
        _ => None,
    }
}

fn print_menu() {
    println!("{}", style("What next?").bold());
    println!("  [u] upload       [c] cancel");
    println!("  [1] edit YouTube title   [2] edit YouTube description");
    println!("  [3] edit Instagram       [4] edit TikTok");
    println!("  [ry/ri/rt] regenerate YouTube / Instagram / TikTok");
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Read lines until a lone `END` or end of input
pub async fn read_multiline<R: AsyncBufRead + Unpin>(input: &mut R) -> Result<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line).await.context("Failed to read input")? == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "END" {
            break;
        }
        lines.push(trimmed.to_string());
    }
    Ok(lines.join("\n").trim().to_string())
}

/// `None` at end of input
async fn read_single_line<R: AsyncBufRead + Unpin>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line).await.context("Failed to read input")? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Apply a manual edit; empty input keeps the current text
pub fn apply_edit(captions: &mut PlatformCaptions, action: EditAction, text: String) {
    if text.is_empty() {
        return;
    }
    match action {
        EditAction::EditYouTubeTitle => captions.youtube_title = text,
        EditAction::EditYouTubeDescription => captions.youtube = text,
        EditAction::EditInstagram => captions.instagram = text,
        EditAction::EditTikTok => captions.tiktok = text,
        _ => {}
    }
}

/// Let the operator edit or regenerate captions before dispatch
///
/// Returns `false` when the operator cancels or input ends.
pub async fn review_captions<R: AsyncBufRead + Unpin>(
    run: &mut PipelineRun<'_>,
    input: &mut R,
) -> Result<bool> {
    let limits = CaptionLimits::default();

    loop {
        print_menu();
        let Some(choice) = read_single_line(input).await? else {
            return Ok(false);
        };
        let Some(action) = parse_action(&choice) else {
            println!("{}", style("Unknown option").yellow());
            continue;
        };

        match action {
            EditAction::Upload => return Ok(true),
            EditAction::Cancel => return Ok(false),
            EditAction::Regenerate(platform) => {
                let progress = spinner(format!("Regenerating {} caption...", platform), false);
                match run.regenerate_caption(platform).await {
                    Ok(()) => progress.finish_with_message(format!("{} caption regenerated", platform)),
                    Err(e) => progress.finish_with_message(format!("Regeneration failed: {}", e)),
                }
            }
            edit => {
                if edit == EditAction::EditYouTubeTitle {
                    println!("New title (single line, empty keeps current):");
                } else {
                    println!("New text, finish with a line containing END (empty keeps current):");
                }
                let text = if edit == EditAction::EditYouTubeTitle {
                    read_single_line(input).await?.unwrap_or_default()
                } else {
                    read_multiline(input).await?
                };
                if let Some(captions) = run.captions_mut() {
                    apply_edit(captions, edit, text);
                }
            }
        }

        if let Some(captions) = run.result().captions() {
            println!();
            print_captions(captions, &limits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("u"), Some(EditAction::Upload));
        assert_eq!(parse_action(""), Some(EditAction::Upload));
        assert_eq!(parse_action(" 3 "), Some(EditAction::EditInstagram));
        assert_eq!(parse_action("RT"), Some(EditAction::Regenerate(Platform::TikTok)));
        assert_eq!(parse_action("cancel"), Some(EditAction::Cancel));
        assert_eq!(parse_action("x"), None);
    }

    #[tokio::test]
    async fn test_read_multiline_stops_at_end_marker() {
        let mut input: &[u8] = b"first line\nsecond line\nEND\nignored\n";
        assert_eq!(read_multiline(&mut input).await.unwrap(), "first line\nsecond line");

        let mut eof: &[u8] = b"only line";
        assert_eq!(read_multiline(&mut eof).await.unwrap(), "only line");
    }

    #[tokio::test]
    async fn test_read_single_line_reports_end_of_input() {
        let mut input: &[u8] = b"  u  \n";
        assert_eq!(read_single_line(&mut input).await.unwrap().as_deref(), Some("u"));
        assert_eq!(read_single_line(&mut input).await.unwrap(), None);
    }

    #[test]
    fn test_apply_edit() {
        let mut captions = PlatformCaptions::default();
        apply_edit(&mut captions, EditAction::EditTikTok, "new tiktok".into());
        apply_edit(&mut captions, EditAction::EditInstagram, String::new());
        assert_eq!(captions.tiktok, "new tiktok");
        assert_eq!(captions.instagram, "");
    }
}
