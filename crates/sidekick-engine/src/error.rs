use crate::config::ConfigError;
use crate::ledger::StoreError;
use crate::reader::ReadError;
use crate::registry::RegistryError;
use crate::search::SearchError;
use sidekick_common::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SidekickError {
    #[error("Session already active: {0}")]
    AlreadyActive(String),

    #[error("Log file not found: {0}")]
    SourceNotFound(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Session not found: {0}")]
    UnknownSession(String),

    #[error("Confidence must be between 0.0 and 1.0, got {0}")]
    InvalidConfidence(f64),

    #[error("{0}")]
    InvalidPromptType(ParseError),

    #[error("{0}")]
    InvalidSortKey(ParseError),

    #[error("min_occurrences must be at least 1, got {0}")]
    InvalidMinOccurrences(u64),

    #[error("{0}")]
    InvalidQuery(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl SidekickError {
    /// Stable machine-readable code for the command surface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyActive(_) => "SESSION_ALREADY_EXISTS",
            Self::SourceNotFound(_) => "FILE_NOT_FOUND",
            Self::SourceUnavailable(_) => "FILE_READ_ERROR",
            Self::UnknownSession(_) => "SESSION_NOT_FOUND",
            Self::InvalidConfidence(_) => "INVALID_CONFIDENCE",
            Self::InvalidPromptType(_) => "INVALID_PROMPT_TYPE",
            Self::InvalidSortKey(_) => "INVALID_SORT_FIELD",
            Self::InvalidMinOccurrences(_) => "INVALID_MIN_OCCURRENCES",
            Self::InvalidQuery(_) => "INVALID_REGEX",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AlreadyActive(_) => Some("Stop the existing session or choose another id"),
            Self::SourceNotFound(_) => Some("Check that the log file exists and is readable"),
            Self::SourceUnavailable(_) => Some("The session is still active; poll again later"),
            Self::UnknownSession(_) => Some("Start a session first, or list active sessions"),
            Self::InvalidConfidence(_) => Some("Use a value between 0.0 and 1.0"),
            Self::InvalidPromptType(_) => Some(
                "Use password, confirmation, choice, path, text, command, shell_prompt or unclassified",
            ),
            _ => None,
        }
    }
}

impl From<RegistryError> for SidekickError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyActive(id) => Self::AlreadyActive(id),
            RegistryError::SourceNotFound { path, source } => {
                Self::SourceNotFound(format!("{}: {}", path.display(), source))
            }
            RegistryError::UnknownSession(id) => Self::UnknownSession(id),
            RegistryError::SourceUnavailable(e) => e.into(),
        }
    }
}

impl From<ReadError> for SidekickError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::SourceUnavailable { path, source } => {
                Self::SourceUnavailable(format!("{}: {}", path.display(), source))
            }
        }
    }
}

impl From<SearchError> for SidekickError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidQuery(e) => Self::InvalidQuery(format!("Invalid regex pattern: {e}")),
            e @ SearchError::OutOfRange { .. } => Self::InvalidArgument(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SidekickError>;
