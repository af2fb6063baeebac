//! Persistence adapters for the response ledger.
//!
//! The ledger only needs "read everything at start" and "replace the
//! aggregate / append history" from its store, so the trait stays narrow and
//! a different backend can be dropped in without touching ledger logic.

use crate::config::schema::StorageConfig;
use serde::{Deserialize, Serialize};
use sidekick_common::{LearnedPattern, ResponseRecord};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid history pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

pub trait LedgerStore: Send + Sync {
    fn load_patterns(&self) -> Result<Vec<LearnedPattern>, StoreError>;

    /// Replace the stored aggregate with `patterns`.
    fn save_patterns(&self, patterns: &[LearnedPattern]) -> Result<(), StoreError>;

    /// Append records to a session's history.
    fn append_history(&self, session_id: &str, records: &[ResponseRecord])
    -> Result<(), StoreError>;

    fn load_history(&self, session_id: &str) -> Result<Vec<ResponseRecord>, StoreError>;

    /// Identifiers of every session with stored history.
    fn history_sessions(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Serialize, Deserialize)]
struct PatternsFile {
    patterns: Vec<LearnedPattern>,
}

/// JSON files on local disk: one aggregate file plus one JSON-lines history
/// file per session.
pub struct JsonFileStore {
    patterns_file: PathBuf,
    history_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(patterns_file: PathBuf, history_dir: PathBuf) -> Self {
        Self {
            patterns_file,
            history_dir,
        }
    }

    /// The aggregate and history locations laid out by `config`.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.patterns_file(), config.history_dir())
    }

    /// Default layout rooted at `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::from_config(&StorageConfig {
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn patterns_file(&self) -> &Path {
        &self.patterns_file
    }

    pub fn history_path(&self, session_id: &str) -> PathBuf {
        self.history_dir
            .join(format!("{}.jsonl", sanitize_file_stem(session_id)))
    }
}

impl LedgerStore for JsonFileStore {
    fn load_patterns(&self) -> Result<Vec<LearnedPattern>, StoreError> {
        if !self.patterns_file.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.patterns_file)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: PatternsFile = serde_json::from_str(&content)?;
        Ok(file.patterns)
    }

    fn save_patterns(&self, patterns: &[LearnedPattern]) -> Result<(), StoreError> {
        if let Some(parent) = self.patterns_file.parent() {
            create_private_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(&PatternsFile {
            patterns: patterns.to_vec(),
        })?;

        // write-then-rename so a failed write never clobbers the last good file
        let tmp = self.patterns_file.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.patterns_file)?;
        Ok(())
    }

    fn append_history(
        &self,
        session_id: &str,
        records: &[ResponseRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        create_private_dir(&self.history_dir)?;
        let path = self.history_path(session_id);

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(buf.as_bytes())?;
        restrict_permissions(&path)?;
        Ok(())
    }

    fn load_history(&self, session_id: &str) -> Result<Vec<ResponseRecord>, StoreError> {
        let path = self.history_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ResponseRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %e,
                    "skipping malformed history line"
                ),
            }
        }
        Ok(records)
    }

    fn history_sessions(&self) -> Result<Vec<String>, StoreError> {
        let pattern = self.history_dir.join("*.jsonl");
        let mut sessions: Vec<String> = glob::glob(&pattern.to_string_lossy())?
            .filter_map(Result::ok)
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect();
        sessions.sort();
        Ok(sessions)
    }
}

/// Keeps session identifiers from escaping the history directory.
fn sanitize_file_stem(session_id: &str) -> String {
    let stem: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "_".to_string()
    } else {
        stem
    }
}

/// Create `dir` owner-only. Existing directories are left as they are.
fn create_private_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn restrict_permissions(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Process-local store, used when persistence is disabled and in tests.
#[derive(Default)]
pub struct MemoryStore {
    patterns: Mutex<Vec<LearnedPattern>>,
    histories: Mutex<HashMap<String, Vec<ResponseRecord>>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save_patterns` calls.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerStore for MemoryStore {
    fn load_patterns(&self) -> Result<Vec<LearnedPattern>, StoreError> {
        Ok(self
            .patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_patterns(&self, patterns: &[LearnedPattern]) -> Result<(), StoreError> {
        *self.patterns.lock().unwrap_or_else(PoisonError::into_inner) = patterns.to_vec();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }

    fn append_history(
        &self,
        session_id: &str,
        records: &[ResponseRecord],
    ) -> Result<(), StoreError> {
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(records);
        Ok(())
    }

    fn load_history(&self, session_id: &str) -> Result<Vec<ResponseRecord>, StoreError> {
        Ok(self
            .histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn history_sessions(&self) -> Result<Vec<String>, StoreError> {
        let mut sessions: Vec<String> = self
            .histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        sessions.sort();
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("abc-123_x"), "abc-123_x");
        assert_eq!(sanitize_file_stem("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_file_stem(""), "_");
    }
}
