use crate::error::ParseError;
use crate::fingerprint::fingerprint;
use crate::prompt::PromptType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Stored in place of any response given to a password prompt.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Who produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    TypedByHuman,
    SuggestedByEngine,
    AutoApplied,
}

impl FromStr for ResponseSource {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "typed_by_human" | "user_typed" | "human" => Ok(Self::TypedByHuman),
            "suggested_by_engine" | "ai_suggested" | "suggested" => Ok(Self::SuggestedByEngine),
            "auto_applied" | "auto_injected" | "auto" => Ok(Self::AutoApplied),
            _ => Err(ParseError::new(
                "response source",
                s,
                "typed_by_human, suggested_by_engine, auto_applied",
            )),
        }
    }
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TypedByHuman => "typed_by_human",
            Self::SuggestedByEngine => "suggested_by_engine",
            Self::AutoApplied => "auto_applied",
        };
        f.write_str(s)
    }
}

/// An observed (prompt, response) outcome.
///
/// Records are immutable once built. The constructor replaces the response of
/// a password prompt with [`REDACTION_MARKER`], so no record can carry a
/// literal password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    session_id: String,
    fingerprint: String,
    prompt_text: String,
    prompt_type: PromptType,
    response: String,
    success: bool,
    source: ResponseSource,
    elapsed_ms: u64,
    recorded_at: SystemTime,
}

impl ResponseRecord {
    pub fn new(
        session_id: impl Into<String>,
        prompt_text: impl Into<String>,
        prompt_type: PromptType,
        response: impl Into<String>,
        success: bool,
        source: ResponseSource,
        elapsed: Duration,
    ) -> Self {
        let prompt_text = prompt_text.into();
        let response = if prompt_type == PromptType::Password {
            REDACTION_MARKER.to_string()
        } else {
            response.into()
        };
        Self {
            session_id: session_id.into(),
            fingerprint: fingerprint(&prompt_text),
            prompt_text,
            prompt_type,
            response,
            success,
            source,
            elapsed_ms: elapsed.as_millis() as u64,
            recorded_at: SystemTime::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn prompt_type(&self) -> PromptType {
        self.prompt_type
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn source(&self) -> ResponseSource {
        self.source
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn recorded_at(&self) -> SystemTime {
        self.recorded_at
    }

    pub fn is_redacted(&self) -> bool {
        self.response == REDACTION_MARKER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_response_is_redacted() {
        let record = ResponseRecord::new(
            "s1",
            "Password:",
            PromptType::Password,
            "hunter2",
            true,
            ResponseSource::TypedByHuman,
            Duration::from_millis(1200),
        );
        assert_eq!(record.response(), REDACTION_MARKER);
        assert!(record.is_redacted());

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_other_responses_are_kept() {
        let record = ResponseRecord::new(
            "s1",
            "Continue? (y/n)",
            PromptType::Confirmation,
            "y",
            false,
            ResponseSource::SuggestedByEngine,
            Duration::ZERO,
        );
        assert_eq!(record.response(), "y");
        assert_eq!(record.fingerprint(), fingerprint("continue? (Y/N)"));
        assert!(!record.success());
    }

    #[test]
    fn test_source_aliases() {
        assert_eq!(
            "user_typed".parse::<ResponseSource>().unwrap(),
            ResponseSource::TypedByHuman
        );
        assert!("keyboard".parse::<ResponseSource>().is_err());
    }
}
