use regex::Regex;
use std::sync::OnceLock;

/// `00:00:01,000 --> 00:00:04,500` (comma or dot before milliseconds)
fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\d{2}:\d{2}:\d{2}[,.]\d{3}\s*-->\s*\d{2}:\d{2}:\d{2}[,.]\d{3}")
            .expect("timestamp pattern is valid")
    })
}

pub fn is_timestamp_line(line: &str) -> bool {
    timestamp_pattern()
        .find(line)
        .is_some_and(|m| m.start() == 0)
}

/// Remove timestamp ranges anywhere in the line and collapse the gaps
fn strip_timestamps(line: &str) -> String {
    timestamp_pattern()
        .replace_all(line, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_sequence_number(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_digit())
}

/// Keep only the subtitle text of a SubRip file, joined by single spaces
pub fn extract_text(content: &str) -> String {
    content
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_sequence_number(line))
        .filter(|line| !is_timestamp_line(line))
        .map(strip_timestamps)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
