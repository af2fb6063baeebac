//! Response payloads of the operations exposed to the command surface.
//!
//! All timestamps are Unix seconds so the payloads serialize to plain JSON.

use crate::pattern::LearnedPattern;
use crate::prompt::{Band, Event, PromptType};
use crate::session::{SessionInfo, SessionKind, SessionState};
use crate::suggestion::Candidate;
use crate::unix_secs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStarted {
    pub session_id: String,
    pub kind: SessionKind,
    pub state: SessionState,
    pub offset: u64,
    pub start_time: u64,
    pub log_file: String,
    pub metadata: HashMap<String, String>,
}

impl From<&SessionInfo> for SessionStarted {
    fn from(info: &SessionInfo) -> Self {
        Self {
            session_id: info.session_id.clone(),
            kind: info.kind,
            state: info.state,
            offset: info.offset,
            start_time: unix_secs(info.start_time),
            log_file: info.log_file.display().to_string(),
            metadata: info.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub session_id: String,
    pub new_text: String,
    pub offset: u64,
    pub has_more: bool,
}

/// Wire form of an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEvent {
    pub matched_text: String,
    pub prompt_text: String,
    pub prompt_type: PromptType,
    pub band: Band,
    pub confidence: f64,
    pub rule_id: String,
    pub offset: u64,
    pub timestamp: u64,
    pub is_dangerous: bool,
    pub context: Vec<String>,
}

impl From<Event> for DetectedEvent {
    fn from(event: Event) -> Self {
        Self {
            matched_text: event.matched_text,
            prompt_text: event.prompt_text,
            prompt_type: event.prompt_type,
            band: event.band,
            confidence: event.confidence,
            rule_id: event.rule_id,
            offset: event.offset,
            timestamp: unix_secs(event.timestamp),
            is_dangerous: event.is_dangerous,
            context: event.context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    pub detected: bool,
    pub event: Option<DetectedEvent>,
}

impl From<Option<Event>> for DetectResponse {
    fn from(event: Option<Event>) -> Self {
        Self {
            detected: event.is_some(),
            event: event.map(DetectedEvent::from),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResponse {
    pub accepted: bool,
    pub redacted: bool,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopResponse {
    pub session_id: String,
    pub state: SessionState,
    pub total_bytes_processed: u64,
    pub duration_seconds: f64,
    pub log_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSummary {
    pub response: String,
    pub count: u64,
    pub success_count: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub fingerprint: String,
    pub prompt_text: String,
    pub total_occurrences: u64,
    pub most_common_response: Option<ResponseSummary>,
    pub all_responses: Vec<ResponseSummary>,
    pub first_seen: u64,
    pub last_seen: u64,
}

impl From<&LearnedPattern> for PatternSummary {
    fn from(pattern: &LearnedPattern) -> Self {
        let summarize = |text: &str, stats: &crate::pattern::ResponseStats| ResponseSummary {
            response: text.to_string(),
            count: stats.count,
            success_count: stats.success_count,
            success_rate: stats.success_rate(),
        };

        let mut all_responses: Vec<ResponseSummary> = pattern
            .responses
            .iter()
            .map(|(text, stats)| summarize(text, stats))
            .collect();
        all_responses.sort_by(|a, b| b.count.cmp(&a.count).then(a.response.cmp(&b.response)));

        Self {
            fingerprint: pattern.fingerprint.clone(),
            prompt_text: pattern.prompt_text.clone(),
            total_occurrences: pattern.total_occurrences(),
            most_common_response: pattern
                .most_common_response()
                .map(|(text, stats)| summarize(text, stats)),
            all_responses,
            first_seen: unix_secs(pattern.first_seen),
            last_seen: unix_secs(pattern.last_seen),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternsResponse {
    pub patterns: Vec<PatternSummary>,
    pub total_patterns: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub session_id: String,
    pub matched_text: String,
    /// 1-based line number in the log file.
    pub line_number: usize,
    pub context: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matches: Vec<SearchMatch>,
    pub total_matches: usize,
    pub searched_sessions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_detect_response_timestamp_is_unix_seconds() {
        let event = Event {
            matched_text: "Password:".to_string(),
            prompt_text: "Password:".to_string(),
            prompt_type: PromptType::Password,
            band: Band::Interactive,
            confidence: 0.95,
            rule_id: "password.colon".to_string(),
            offset: 0,
            timestamp: UNIX_EPOCH + Duration::from_millis(1_700_000_000_500),
            is_dangerous: false,
            context: vec!["Password: ".to_string()],
        };

        let json = serde_json::to_value(DetectResponse::from(Some(event))).unwrap();
        assert_eq!(json["detected"], true);
        assert_eq!(json["event"]["timestamp"], 1_700_000_000u64);
        assert_eq!(json["event"]["prompt_type"], "password");

        let none = serde_json::to_value(DetectResponse::from(None)).unwrap();
        assert_eq!(none["detected"], false);
        assert!(none["event"].is_null());
    }
}
