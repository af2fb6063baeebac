use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// The kind of input a detected prompt is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    Password,
    Confirmation,
    Choice,
    Path,
    Text,
    Command,
    ShellPrompt,
    Unclassified,
}

const PROMPT_TYPES: &str =
    "password, confirmation, choice, path, text, command, shell_prompt, unclassified";

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Confirmation => "confirmation",
            Self::Choice => "choice",
            Self::Path => "path",
            Self::Text => "text",
            Self::Command => "command",
            Self::ShellPrompt => "shell_prompt",
            Self::Unclassified => "unclassified",
        }
    }

    /// Prompt family: types that expect a reply to a question.
    pub fn is_prompt_family(&self) -> bool {
        matches!(
            self,
            Self::Password | Self::Confirmation | Self::Choice | Self::Path | Self::Text | Self::Command
        )
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "password" => Ok(Self::Password),
            "confirmation" | "yes_no" => Ok(Self::Confirmation),
            "choice" | "multi_choice" => Ok(Self::Choice),
            "path" => Ok(Self::Path),
            "text" | "free_text" => Ok(Self::Text),
            "command" => Ok(Self::Command),
            "shell_prompt" | "shell" => Ok(Self::ShellPrompt),
            "unclassified" | "unknown" => Ok(Self::Unclassified),
            _ => Err(ParseError::new("prompt type", s, PROMPT_TYPES)),
        }
    }
}

/// Priority band of the rule that produced an event. Bands are evaluated
/// in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Critical,
    Interactive,
    Shell,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::Interactive => "interactive",
            Self::Shell => "shell",
        };
        f.write_str(s)
    }
}

/// One detected occurrence of interest in a session's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Raw text matched by the rule.
    pub matched_text: String,
    /// The full trimmed line(s) containing the match.
    pub prompt_text: String,
    pub prompt_type: PromptType,
    pub band: Band,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
    pub rule_id: String,
    /// Absolute byte offset of the match in the watched file.
    pub offset: u64,
    pub timestamp: SystemTime,
    pub is_dangerous: bool,
    pub context: Vec<String>,
}
