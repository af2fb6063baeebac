//! Table of actively watched sessions.
//!
//! Each session sits behind its own mutex, so every operation on one
//! identifier runs exclusively while different identifiers proceed in
//! parallel. The outer map lock is only held to look up, insert or remove.

use crate::classifier::EventClassifier;
use crate::reader::{IncrementalReader, ReadError, Utf8Stream};
use sidekick_common::protocol::{PollResponse, StopResponse};
use sidekick_common::{Event, PromptType, SessionInfo, SessionKind, SessionState};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Session already active: {0}")]
    AlreadyActive(String),
    #[error("Log file not found: {path}: {source}")]
    SourceNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Session not found: {0}")]
    UnknownSession(String),
    #[error(transparent)]
    SourceUnavailable(#[from] ReadError),
}

/// The prompt most recently reported for a session.
#[derive(Debug, Clone)]
pub struct LastDetection {
    pub prompt_text: String,
    pub prompt_type: PromptType,
    pub at: Instant,
}

struct Session {
    info: SessionInfo,
    reader: IncrementalReader,
    decoder: Utf8Stream,
    /// Text observed since the last detection.
    window: String,
    /// Absolute file offset of `window`'s first byte.
    window_offset: u64,
    max_window_bytes: usize,
    bytes_processed: u64,
    started: Instant,
    last_detection: Option<LastDetection>,
}

impl Session {
    fn ensure_active(&self) -> Result<(), RegistryError> {
        if self.info.state == SessionState::Active {
            Ok(())
        } else {
            Err(RegistryError::UnknownSession(self.info.session_id.clone()))
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.info.state.can_transition_to(next) {
            self.info.state = next;
        } else {
            warn!(
                session_id = %self.info.session_id,
                from = %self.info.state,
                to = %next,
                "ignoring invalid state transition"
            );
        }
    }

    /// Read new bytes and append them to the classification window.
    fn pull(&mut self) -> Result<PollResponse, ReadError> {
        let chunk = self.reader.poll()?;
        if chunk.truncated {
            self.decoder.reset();
            self.window.clear();
        }

        let text = self.decoder.decode(&chunk.bytes);
        self.bytes_processed += chunk.bytes.len() as u64;
        self.info.offset = chunk.offset;

        self.window.push_str(&text);
        if self.window.len() > self.max_window_bytes {
            let mut cut = self.window.len() - self.max_window_bytes;
            while !self.window.is_char_boundary(cut) {
                cut += 1;
            }
            self.window.drain(..cut);
        }
        // the window always ends where decoded text ends
        self.window_offset = chunk
            .offset
            .saturating_sub((self.decoder.pending() + self.window.len()) as u64);

        Ok(PollResponse {
            session_id: self.info.session_id.clone(),
            new_text: text,
            offset: chunk.offset,
            has_more: chunk.has_more,
        })
    }

    /// Drop the window up to `end`, the end of a reported prompt line.
    fn consume(&mut self, end: usize) {
        let end = end.min(self.window.len());
        self.window.drain(..end);
        self.window_offset += end as u64;
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    max_window_bytes: usize,
    max_poll_bytes: Option<u64>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(64 * 1024, None)
    }
}

impl SessionRegistry {
    pub fn new(max_window_bytes: usize, max_poll_bytes: Option<u64>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_window_bytes: max_window_bytes.max(1),
            max_poll_bytes,
        }
    }

    /// Start watching `path` under `session_id` from offset 0.
    pub fn start(
        &self,
        session_id: &str,
        path: &Path,
        kind: SessionKind,
        metadata: HashMap<String, String>,
    ) -> Result<SessionInfo, RegistryError> {
        if self.read_map().contains_key(session_id) {
            return Err(RegistryError::AlreadyActive(session_id.to_string()));
        }

        let not_found = |source| RegistryError::SourceNotFound {
            path: path.to_path_buf(),
            source,
        };
        let log_file = fs::canonicalize(path).map_err(not_found)?;
        let file = File::open(&log_file).map_err(not_found)?;
        if !file.metadata().map_err(not_found)?.is_file() {
            return Err(not_found(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let mut reader = IncrementalReader::open(&log_file);
        if let Some(limit) = self.max_poll_bytes {
            reader = reader.with_max_chunk(limit);
        }

        let mut session = Session {
            info: SessionInfo {
                session_id: session_id.to_string(),
                kind,
                log_file,
                offset: 0,
                start_time: SystemTime::now(),
                state: SessionState::Creating,
                metadata,
            },
            reader,
            decoder: Utf8Stream::new(),
            window: String::new(),
            window_offset: 0,
            max_window_bytes: self.max_window_bytes,
            bytes_processed: 0,
            started: Instant::now(),
            last_detection: None,
        };
        session.transition(SessionState::Active);
        let info = session.info.clone();

        let mut sessions = self.write_map();
        if sessions.contains_key(session_id) {
            return Err(RegistryError::AlreadyActive(session_id.to_string()));
        }
        sessions.insert(session_id.to_string(), Arc::new(Mutex::new(session)));
        drop(sessions);

        info!(
            session_id,
            kind = %kind,
            log_file = %info.log_file.display(),
            "session started"
        );
        Ok(info)
    }

    /// Return the text appended since the previous poll.
    ///
    /// A read failure is returned to the caller and leaves the session active
    /// with its offset untouched.
    pub fn poll(&self, session_id: &str) -> Result<PollResponse, RegistryError> {
        let handle = self.get(session_id)?;
        let mut session = lock(&handle);
        session.ensure_active()?;
        Ok(session.pull()?)
    }

    /// Poll, then classify everything seen since the last detection.
    ///
    /// A failed read is logged and the text already buffered is still
    /// classified. A detection consumes the window through the end of the
    /// matched line so the same prompt is reported once.
    pub fn classify_latest(
        &self,
        session_id: &str,
        classifier: &EventClassifier,
        min_confidence: f64,
    ) -> Result<Option<Event>, RegistryError> {
        let handle = self.get(session_id)?;
        let mut session = lock(&handle);
        session.ensure_active()?;

        if let Err(e) = session.pull() {
            warn!(session_id, error = %e, "poll before classification failed");
        }

        let Some(found) = classifier.classify(&session.window, min_confidence) else {
            debug!(session_id, window = session.window.len(), "no detection");
            return Ok(None);
        };
        let line_end = found.line_end;
        let event = found.into_event(session.window_offset, SystemTime::now());
        session.consume(line_end);
        session.last_detection = Some(LastDetection {
            prompt_text: event.prompt_text.clone(),
            prompt_type: event.prompt_type,
            at: Instant::now(),
        });

        info!(
            session_id,
            prompt_type = %event.prompt_type,
            confidence = event.confidence,
            is_dangerous = event.is_dangerous,
            prompt = %truncate(&event.prompt_text, 50),
            "prompt detected"
        );
        Ok(Some(event))
    }

    /// Stop watching, optionally deleting the log file.
    pub fn stop(&self, session_id: &str, keep_log: bool) -> Result<StopResponse, RegistryError> {
        let handle = self
            .write_map()
            .remove(session_id)
            .ok_or_else(|| RegistryError::UnknownSession(session_id.to_string()))?;

        // waits for any in-flight operation on this session
        let mut session = lock(&handle);
        session.ensure_active()?;
        session.transition(SessionState::Stopped);

        let log_deleted = if keep_log {
            false
        } else {
            match fs::remove_file(&session.info.log_file) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        session_id,
                        log_file = %session.info.log_file.display(),
                        error = %e,
                        "failed to delete log file"
                    );
                    false
                }
            }
        };

        let duration = session.started.elapsed();
        info!(
            session_id,
            bytes = session.bytes_processed,
            duration_secs = duration.as_secs_f64(),
            log_deleted,
            "session stopped"
        );
        Ok(StopResponse {
            session_id: session_id.to_string(),
            state: session.info.state,
            total_bytes_processed: session.bytes_processed,
            duration_seconds: duration.as_secs_f64(),
            log_deleted,
        })
    }

    pub fn info(&self, session_id: &str) -> Result<SessionInfo, RegistryError> {
        let handle = self.get(session_id)?;
        let session = lock(&handle);
        session.ensure_active()?;
        Ok(session.info.clone())
    }

    pub fn last_detection(&self, session_id: &str) -> Result<Option<LastDetection>, RegistryError> {
        let handle = self.get(session_id)?;
        let session = lock(&handle);
        session.ensure_active()?;
        Ok(session.last_detection.clone())
    }

    /// Snapshot of every active session, ordered by identifier.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let handles: Vec<_> = self.read_map().values().cloned().collect();
        let mut infos: Vec<SessionInfo> = handles
            .iter()
            .map(|handle| lock(handle).info.clone())
            .filter(|info| info.state == SessionState::Active)
            .collect();
        infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        infos
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, session_id: &str) -> Result<Arc<Mutex<Session>>, RegistryError> {
        self.read_map()
            .get(session_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSession(session_id.to_string()))
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Mutex<Session>>>> {
        self.sessions.read().unwrap_or_else(|poisoned| {
            warn!("session table lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Mutex<Session>>>> {
        self.sessions.write().unwrap_or_else(|poisoned| {
            warn!("session table lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn lock(handle: &Mutex<Session>) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(|poisoned| {
        warn!("session lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// At most `max` characters of `text`, with an ellipsis when cut.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
