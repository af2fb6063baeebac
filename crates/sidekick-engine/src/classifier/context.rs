//! Type-specific context extraction.
//!
//! All functions take the scanned tail split into lines and return the
//! lines a consumer should see alongside an event.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static COMMAND_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[\w.-]+@[\w.-]+[^\s$#%>]*\s*)?[$#%>]\s+\S").unwrap()
});

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[?(?:\d{4}-\d{2}-\d{2}[T ])?(\d{2}):(\d{2}):(\d{2})").unwrap()
});

const SECONDS_PER_DAY: i64 = 86_400;

/// A line that starts with a shell-prompt marker followed by a command.
pub fn is_command_line(line: &str) -> bool {
    COMMAND_LINE.is_match(line)
}

/// Seconds since midnight of a leading `HH:MM:SS` timestamp, optionally
/// preceded by an ISO date and/or an opening bracket.
pub fn line_timestamp(line: &str) -> Option<i64> {
    let caps = TIMESTAMP.captures(line)?;
    let field = |i: usize| caps.get(i)?.as_str().parse::<i64>().ok();
    let (h, m, s) = (field(1)?, field(2)?, field(3)?);
    if h > 23 || m > 59 || s > 60 {
        return None;
    }
    Some(h * 3600 + m * 60 + s)
}

fn owned(lines: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = lines
        .iter()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();
    while out.last().is_some_and(|line| line.trim().is_empty()) {
        out.pop();
    }
    out
}

/// Prompt family: the last `max_lines` lines, or everything after the
/// previous prompt-looking line, whichever is shorter.
pub fn prompt_context(
    lines: &[&str],
    match_line: usize,
    max_lines: usize,
    is_prompt_line: impl Fn(&str) -> bool,
) -> Vec<String> {
    let mut start = lines.len().saturating_sub(max_lines);
    for idx in (start..match_line.min(lines.len())).rev() {
        if is_prompt_line(lines[idx]) || is_command_line(lines[idx]) {
            start = idx + 1;
            break;
        }
    }
    owned(&lines[start..])
}

/// Error family: from the command line that produced the error, through the
/// match, and onward until a blank line or the next command line.
pub fn error_context(lines: &[&str], match_line: usize) -> Vec<String> {
    if lines.is_empty() {
        return Vec::new();
    }
    let match_line = match_line.min(lines.len() - 1);

    let start = (0..match_line)
        .rev()
        .find(|&idx| is_command_line(lines[idx]))
        .unwrap_or(match_line);

    let mut end = match_line;
    for (idx, line) in lines.iter().enumerate().skip(match_line + 1) {
        if line.trim().is_empty() || is_command_line(line) {
            break;
        }
        end = idx;
    }

    owned(&lines[start..=end])
}

/// Status family: the trailing `window` of timestamped output when the lines
/// carry timestamps, otherwise the last `max_lines` lines.
pub fn status_context(lines: &[&str], max_lines: usize, window: Duration) -> Vec<String> {
    let Some(reference) = lines.iter().rev().find_map(|line| line_timestamp(line)) else {
        return owned(&lines[lines.len().saturating_sub(max_lines)..]);
    };

    let window = window.as_secs() as i64;
    let mut start = lines.len();
    for idx in (0..lines.len()).rev() {
        if let Some(mut ts) = line_timestamp(lines[idx]) {
            // crossed midnight going backwards
            if ts > reference {
                ts -= SECONDS_PER_DAY;
            }
            if reference - ts > window {
                break;
            }
        }
        start = idx;
    }
    owned(&lines[start..])
}
