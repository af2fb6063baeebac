//! Incremental reading of a growing log file.
//!
//! The reader remembers a byte offset and returns only what was appended
//! since the previous poll. A file that shrinks below the stored offset is
//! treated as rotated: the offset resets to zero and the whole file is
//! returned again.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Bytes returned by a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadChunk {
    pub bytes: Vec<u8>,
    /// Offset after this read.
    pub offset: u64,
    /// The file had already grown past `offset` when the read finished.
    pub has_more: bool,
    /// The file was found shorter than the stored offset and re-read from 0.
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct IncrementalReader {
    path: PathBuf,
    offset: u64,
    max_chunk: Option<u64>,
}

impl IncrementalReader {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            max_chunk: None,
        }
    }

    /// Bound the number of bytes a single poll may return. Remaining bytes
    /// are reported through `has_more`.
    pub fn with_max_chunk(mut self, max_chunk: u64) -> Self {
        self.max_chunk = Some(max_chunk.max(1));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read everything appended since the last successful poll.
    ///
    /// The stored offset only moves after the read completed, so a failed
    /// poll can be retried without losing or skipping bytes.
    pub fn poll(&mut self) -> Result<ReadChunk, ReadError> {
        let unavailable = |source| ReadError::SourceUnavailable {
            path: self.path.clone(),
            source,
        };

        let mut file = File::open(&self.path).map_err(unavailable)?;
        let size = file.metadata().map_err(unavailable)?.len();

        let truncated = size < self.offset;
        let start = if truncated {
            warn!(
                path = %self.path.display(),
                offset = self.offset,
                size,
                "log file shrank below read offset; re-reading from start"
            );
            0
        } else {
            self.offset
        };

        file.seek(SeekFrom::Start(start)).map_err(unavailable)?;
        let mut bytes = Vec::new();
        match self.max_chunk {
            Some(limit) => file.take(limit).read_to_end(&mut bytes),
            None => file.read_to_end(&mut bytes),
        }
        .map_err(unavailable)?;

        let offset = start + bytes.len() as u64;
        let has_more = fs::metadata(&self.path)
            .map(|meta| meta.len() > offset)
            .unwrap_or(false);

        debug!(
            path = %self.path.display(),
            read = bytes.len(),
            offset,
            has_more,
            "polled log file"
        );

        self.offset = offset;
        Ok(ReadChunk {
            bytes,
            offset,
            has_more,
            truncated,
        })
    }
}

/// Decodes a byte stream to text across poll boundaries.
///
/// A multi-byte character split between two polls is held back until its
/// remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Clone, Default)]
pub struct Utf8Stream {
    carry: Vec<u8>,
}

impl Utf8Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(bytes);

        let mut out = String::with_capacity(buf.len());
        let mut rest = buf.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.carry = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Bytes held back waiting for the rest of a character.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    pub fn reset(&mut self) {
        self.carry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_stream_joins_split_characters() {
        let text = "héllo ✓";
        let bytes = text.as_bytes();
        // split inside the 3-byte check mark
        let cut = bytes.len() - 1;

        let mut stream = Utf8Stream::new();
        let first = stream.decode(&bytes[..cut]);
        assert_eq!(first, "héllo ");
        assert_eq!(stream.pending(), 2);

        let second = stream.decode(&bytes[cut..]);
        assert_eq!(format!("{first}{second}"), text);
        assert_eq!(stream.pending(), 0);
    }

    #[test]
    fn test_utf8_stream_replaces_invalid_bytes() {
        let mut stream = Utf8Stream::new();
        let out = stream.decode(b"ok\xffok");
        assert_eq!(out, "ok\u{FFFD}ok");
        assert_eq!(stream.pending(), 0);
    }
}
