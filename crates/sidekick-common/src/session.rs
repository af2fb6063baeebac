use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

/// What produced the log being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// `script(1)`-style terminal recording (also used for ssh transcripts).
    ShellRecording,
    /// Output piped from a tmux/screen pane.
    MultiplexerPane,
    /// Any other growing text file.
    PlainFile,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShellRecording => "shell_recording",
            Self::MultiplexerPane => "multiplexer_pane",
            Self::PlainFile => "plain_file",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shell_recording" | "script" | "ssh" => Ok(Self::ShellRecording),
            "multiplexer_pane" | "tmux" | "screen" => Ok(Self::MultiplexerPane),
            "plain_file" | "file" => Ok(Self::PlainFile),
            _ => Err(ParseError::new(
                "session kind",
                s,
                "shell_recording, multiplexer_pane, plain_file",
            )),
        }
    }
}

/// Lifecycle of a watch session. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Creating,
    Active,
    Stopped,
}

impl SessionState {
    /// Only `Creating -> Active`, `Creating -> Stopped` and `Active -> Stopped`
    /// are legal.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Creating, SessionState::Active)
                | (SessionState::Creating, SessionState::Stopped)
                | (SessionState::Active, SessionState::Stopped)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Snapshot of a session as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub kind: SessionKind,
    pub log_file: PathBuf,
    pub offset: u64,
    pub start_time: SystemTime,
    pub state: SessionState,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}
