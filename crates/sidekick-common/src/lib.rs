pub mod error;
pub mod fingerprint;
pub mod pattern;
pub mod prompt;
pub mod protocol;
pub mod record;
pub mod session;
pub mod suggestion;

pub use error::ParseError;
pub use fingerprint::{fingerprint, normalize_prompt};
pub use pattern::{LearnedPattern, ResponseStats};
pub use prompt::{Band, Event, PromptType};
pub use record::{REDACTION_MARKER, ResponseRecord, ResponseSource};
pub use session::{SessionInfo, SessionKind, SessionState};
pub use suggestion::{Candidate, CandidateSource};

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, saturating to zero for pre-epoch clocks.
pub fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
