use serde::{Deserialize, Serialize};

/// Where a suggested input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Learned from recorded outcomes of the same prompt.
    Pattern,
    /// Derived from session context (e.g. working directory).
    Context,
    /// Static per-type default.
    Default,
    /// Non-actionable marker: no safe default exists.
    Placeholder,
    /// Produced by an external suggestion hook.
    External,
}

/// A ranked candidate input for a detected prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub confidence: f64,
    pub rationale: String,
    pub source: CandidateSource,
    /// False for placeholders that must not be typed into the terminal.
    pub actionable: bool,
}

impl Candidate {
    pub fn new(
        text: impl Into<String>,
        confidence: f64,
        source: CandidateSource,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
            source,
            actionable: source != CandidateSource::Placeholder,
        }
    }
}
