use reqwest::StatusCode;

use crate::BackendError;

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{:.1}s", seconds)
    }
}

/// First `max_chars` characters followed by `...` when longer
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

/// Pull `error.message` out of an OpenAI/Graph-style JSON error body
pub fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// Map a failed API response to a backend error, flagging rate limits as retryable
///
/// A 429 caused by an exhausted quota will not clear up on retry.
pub fn classify_api_error(status: StatusCode, body: &str) -> BackendError {
    let message = api_error_message(body).unwrap_or_else(|| body.trim().to_string());
    let lowered = body.to_lowercase();
    let detail = format!("HTTP {}: {}", status.as_u16(), message);

    if lowered.contains("insufficient_quota") {
        BackendError::Failed(detail)
    } else if status == StatusCode::TOO_MANY_REQUESTS || lowered.contains("rate_limit") {
        BackendError::RateLimited(detail)
    } else {
        BackendError::Failed(detail)
    }
}

/// Check if the current environment has required tools
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("ffprobe", "-version").await {
        missing.push("ffprobe - required for video validation".to_string());
    }

    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required to extract audio for transcription".to_string());
    }

    missing
}

/// External tool invocation that is killed if its future is dropped
pub fn media_command(program: &str) -> tokio::process::Command {
    let mut command = tokio::process::Command::new(program);
    command.kill_on_drop(true);
    command
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
