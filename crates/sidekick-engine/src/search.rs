//! Regex search over the log files of watched sessions.

use regex::Regex;
use sidekick_common::SessionInfo;
use sidekick_common::protocol::{SearchMatch, SearchResponse};
use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

pub const CONTEXT_LINES_RANGE: RangeInclusive<usize> = 0..=10;
pub const MAX_RESULTS_RANGE: RangeInclusive<usize> = 1..=100;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid regex pattern: {0}")]
    InvalidQuery(#[from] regex::Error),
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Lines of context on each side of a match.
    pub context_lines: usize,
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            max_results: 10,
        }
    }
}

impl SearchOptions {
    pub fn validate(&self) -> Result<(), SearchError> {
        check_range("context_lines", self.context_lines, &CONTEXT_LINES_RANGE)?;
        check_range("max_results", self.max_results, &MAX_RESULTS_RANGE)
    }
}

fn check_range(
    name: &'static str,
    value: usize,
    range: &RangeInclusive<usize>,
) -> Result<(), SearchError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(SearchError::OutOfRange {
            name,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Search each session's log in order, stopping once `max_results` matches
/// are collected. A log that cannot be read is skipped with a warning.
pub fn search_sessions(
    sessions: &[SessionInfo],
    query: &str,
    options: SearchOptions,
) -> Result<SearchResponse, SearchError> {
    options.validate()?;
    let regex = Regex::new(query)?;

    let mut matches = Vec::new();
    let mut searched_sessions = Vec::new();
    for session in sessions {
        let remaining = options.max_results - matches.len();
        match search_file(&session.log_file, &regex, options.context_lines, remaining) {
            Ok(found) => {
                matches.extend(found.into_iter().map(|(line_number, matched_text, context)| {
                    SearchMatch {
                        session_id: session.session_id.clone(),
                        matched_text,
                        line_number,
                        context,
                    }
                }));
                searched_sessions.push(session.session_id.clone());
            }
            Err(e) => warn!(
                session_id = %session.session_id,
                error = %e,
                "failed to search session log"
            ),
        }
        if matches.len() >= options.max_results {
            break;
        }
    }

    info!(
        query,
        sessions = searched_sessions.len(),
        matches = matches.len(),
        "searched session history"
    );
    Ok(SearchResponse {
        total_matches: matches.len(),
        matches,
        searched_sessions,
    })
}

/// Matching lines of one file as `(1-based line number, line, context)`.
pub fn search_file(
    path: &Path,
    regex: &Regex,
    context_lines: usize,
    max_results: usize,
) -> io::Result<Vec<(usize, String, Vec<String>)>> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();

    Ok(lines
        .iter()
        .enumerate()
        .filter(|(_, line)| regex.is_match(line))
        .take(max_results)
        .map(|(idx, line)| {
            let start = idx.saturating_sub(context_lines);
            let end = (idx + context_lines + 1).min(lines.len());
            let context = lines[start..end].iter().map(|l| l.to_string()).collect();
            (idx + 1, line.to_string(), context)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_validation() {
        assert!(SearchOptions::default().validate().is_ok());
        let bad = SearchOptions {
            context_lines: 11,
            max_results: 10,
        };
        assert!(matches!(
            bad.validate(),
            Err(SearchError::OutOfRange {
                name: "context_lines",
                ..
            })
        ));
        let bad = SearchOptions {
            context_lines: 0,
            max_results: 0,
        };
        assert!(bad.validate().is_err());
    }
}
