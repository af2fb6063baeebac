//! Turns a window of raw terminal text into a typed, confidence-scored event.
//!
//! Classification is a pure function of the window text, the rule table and
//! the options: identical inputs always produce identical results.

pub mod context;
pub mod danger;
pub mod rules;

use crate::config::schema::DetectionConfig;
use rules::{Rule, RuleTable};
use sidekick_common::{Band, Event, PromptType};
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierOptions {
    /// Only this many trailing lines of the window are scanned.
    pub scan_lines: usize,
    /// Upper bound for prompt and status context.
    pub context_lines: usize,
    /// Trailing time span used for timestamped status context.
    pub status_window: Duration,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            scan_lines: 50,
            context_lines: 10,
            status_window: Duration::from_secs(60),
        }
    }
}

impl From<&DetectionConfig> for ClassifierOptions {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            scan_lines: config.scan_lines.max(1),
            context_lines: config.context_lines.max(1),
            status_window: Duration::from_secs(config.status_window_secs),
        }
    }
}

/// Result of classifying a window; positions are relative to the window.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub rule_id: String,
    pub prompt_type: PromptType,
    pub band: Band,
    pub confidence: f64,
    pub matched_text: String,
    pub prompt_text: String,
    /// Byte offset of the match start within the window.
    pub match_start: usize,
    /// Byte offset just past the end of the last matched line.
    pub line_end: usize,
    pub is_dangerous: bool,
    pub context: Vec<String>,
}

impl Classification {
    /// Attach the absolute position and detection time.
    pub fn into_event(self, base_offset: u64, timestamp: SystemTime) -> Event {
        Event {
            matched_text: self.matched_text,
            prompt_text: self.prompt_text,
            prompt_type: self.prompt_type,
            band: self.band,
            confidence: self.confidence,
            rule_id: self.rule_id,
            offset: base_offset + self.match_start as u64,
            timestamp,
            is_dangerous: self.is_dangerous,
            context: self.context,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventClassifier {
    rules: RuleTable,
    options: ClassifierOptions,
}

impl EventClassifier {
    pub fn new(options: ClassifierOptions) -> Self {
        Self {
            rules: RuleTable::builtin(),
            options,
        }
    }

    pub fn with_rules(rules: RuleTable, options: ClassifierOptions) -> Self {
        Self { rules, options }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn options(&self) -> &ClassifierOptions {
        &self.options
    }

    /// Classify the tail of `window`.
    ///
    /// The first rule, in band then declaration order, whose base confidence
    /// is at least `min_confidence` and whose pattern matches wins. Returns
    /// `None` when nothing clears the threshold.
    pub fn classify(&self, window: &str, min_confidence: f64) -> Option<Classification> {
        if window.is_empty() {
            return None;
        }

        let (tail_start, tail) = tail_lines(window, self.options.scan_lines);
        let (rule, found) = self
            .rules
            .rules()
            .iter()
            .filter(|rule| rule.confidence >= min_confidence)
            .find_map(|rule| rule.regex.find(tail).map(|m| (rule, m)))?;

        let lines: Vec<&str> = tail.split('\n').collect();
        let first_line = line_index(tail, found.start());
        let last_line = line_index(tail, found.end().max(found.start() + 1) - 1).max(first_line);
        let line_end = tail[found.end()..]
            .find('\n')
            .map(|pos| found.end() + pos + 1)
            .unwrap_or(tail.len());

        let prompt_text = lines[first_line..=last_line.min(lines.len() - 1)]
            .iter()
            .map(|line| line.trim_end_matches('\r'))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        let is_dangerous = rule.band == Band::Critical || danger::is_dangerous(tail);
        let context = self.extract_context(rule, &lines, first_line);

        debug!(
            rule = %rule.id,
            prompt_type = %rule.prompt_type,
            confidence = rule.confidence,
            is_dangerous,
            "classified window"
        );

        Some(Classification {
            rule_id: rule.id.clone(),
            prompt_type: rule.prompt_type,
            band: rule.band,
            confidence: rule.confidence,
            matched_text: found.as_str().trim().to_string(),
            prompt_text,
            match_start: tail_start + found.start(),
            line_end: tail_start + line_end,
            is_dangerous,
            context,
        })
    }

    /// Classify and stamp the result as an [`Event`] at `base_offset`, the
    /// absolute file offset of the window's first byte.
    pub fn classify_event(
        &self,
        window: &str,
        base_offset: u64,
        min_confidence: f64,
    ) -> Option<Event> {
        self.classify(window, min_confidence)
            .map(|c| c.into_event(base_offset, SystemTime::now()))
    }

    fn extract_context(&self, rule: &Rule, lines: &[&str], match_line: usize) -> Vec<String> {
        if rule.band == Band::Critical {
            context::error_context(lines, match_line)
        } else if rule.prompt_type.is_prompt_family() {
            context::prompt_context(lines, match_line, self.options.context_lines, |line| {
                self.rules.is_prompt_line(line)
            })
        } else {
            context::status_context(lines, self.options.context_lines, self.options.status_window)
        }
    }
}

/// The last `n` newline-separated segments of `text`, with the byte offset
/// where they start.
fn tail_lines(text: &str, n: usize) -> (usize, &str) {
    if n == 0 {
        return (text.len(), "");
    }
    text.rmatch_indices('\n')
        .nth(n - 1)
        .map(|(idx, _)| (idx + 1, &text[idx + 1..]))
        .unwrap_or((0, text))
}

fn line_index(text: &str, byte: usize) -> usize {
    text[..byte.min(text.len())].matches('\n').count()
}
