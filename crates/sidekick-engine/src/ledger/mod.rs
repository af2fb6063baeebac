//! Process-wide aggregate of prompt/response outcomes.

pub mod flusher;
pub mod store;

pub use flusher::spawn_periodic_flush;
pub use store::{JsonFileStore, LedgerStore, MemoryStore, StoreError};

use sidekick_common::{LearnedPattern, ParseError, ResponseRecord, fingerprint};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Ordering applied by [`ResponseLedger::query`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Total occurrences descending, ties by last seen descending.
    #[default]
    Occurrences,
    LastSeen,
    /// Success rate of the most common response.
    SuccessRate,
}

impl FromStr for SortKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "occurrences" => Ok(Self::Occurrences),
            "last_seen" => Ok(Self::LastSeen),
            "success_rate" => Ok(Self::SuccessRate),
            _ => Err(ParseError::new(
                "sort key",
                s,
                "occurrences, last_seen, success_rate",
            )),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Occurrences => "occurrences",
            Self::LastSeen => "last_seen",
            Self::SuccessRate => "success_rate",
        })
    }
}

#[derive(Default)]
struct LedgerState {
    patterns: HashMap<String, LearnedPattern>,
    /// Records not yet appended to their session history.
    unflushed: Vec<ResponseRecord>,
    /// Aggregate updates since the last successful pattern save.
    dirty: usize,
}

/// In-memory pattern aggregate with write-behind persistence.
///
/// Updates land in memory immediately. Every `flush_every` updates (and on
/// [`shutdown`](Self::shutdown)) a point-in-time snapshot is written through
/// the [`LedgerStore`] without holding the data lock, so recording from other
/// sessions continues while a flush is on disk. Only one flush runs at a time.
///
/// After a failed flush, recording stops flushing inline; the next explicit
/// [`flush`](Self::flush) (periodic flusher, session stop, shutdown) retries.
pub struct ResponseLedger {
    state: RwLock<LedgerState>,
    flush_lock: Mutex<()>,
    /// Set while the last flush attempt failed.
    flush_failed: AtomicBool,
    store: Arc<dyn LedgerStore>,
    flush_every: usize,
}

impl ResponseLedger {
    /// Load every stored pattern and start recording on top of them.
    ///
    /// A store that cannot be read is logged and the ledger starts empty.
    pub fn open(store: Arc<dyn LedgerStore>, flush_every: usize) -> Self {
        let patterns = match store.load_patterns() {
            Ok(patterns) => patterns,
            Err(e) => {
                error!(error = %e, "failed to load learned patterns, starting empty");
                Vec::new()
            }
        };
        info!(count = patterns.len(), "loaded learned patterns");

        let patterns = patterns
            .into_iter()
            .map(|p| (p.fingerprint.clone(), p))
            .collect();

        Self {
            state: RwLock::new(LedgerState {
                patterns,
                ..LedgerState::default()
            }),
            flush_lock: Mutex::new(()),
            flush_failed: AtomicBool::new(false),
            store,
            flush_every: flush_every.max(1),
        }
    }

    /// Ledger backed by a [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStore::new()), usize::MAX)
    }

    /// Fold a record into its pattern. Always increments; duplicates are the
    /// caller's concern. Persistence failures are logged, never returned.
    pub fn record_outcome(&self, record: ResponseRecord) {
        let should_flush = {
            let mut state = self.write_state();
            match state.patterns.get_mut(record.fingerprint()) {
                Some(pattern) => pattern.apply(&record),
                None => {
                    state.patterns.insert(
                        record.fingerprint().to_string(),
                        LearnedPattern::from_record(&record),
                    );
                }
            }
            debug!(
                session_id = record.session_id(),
                fingerprint = record.fingerprint(),
                "recorded outcome"
            );
            state.unflushed.push(record);
            state.dirty += 1;
            state.dirty >= self.flush_every
        };

        if should_flush {
            if self.flush_failed.load(AtomicOrdering::Acquire) {
                debug!("previous flush failed, deferring to the next scheduled flush");
            } else {
                self.try_flush();
            }
        }
    }

    pub fn lookup(&self, fingerprint: &str) -> Option<LearnedPattern> {
        self.read_state().patterns.get(fingerprint).cloned()
    }

    /// Fingerprint `prompt_text` and look it up.
    pub fn lookup_prompt(&self, prompt_text: &str) -> Option<LearnedPattern> {
        self.lookup(&fingerprint(prompt_text))
    }

    /// Patterns whose prompt contains `filter` (case-insensitive) and that
    /// occurred at least `min_occurrences` times, ordered by `sort`.
    pub fn query(
        &self,
        filter: Option<&str>,
        min_occurrences: u64,
        sort: SortKey,
    ) -> Vec<LearnedPattern> {
        let needle = filter
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty());

        let mut matches: Vec<LearnedPattern> = self
            .read_state()
            .patterns
            .values()
            .filter(|p| p.total_occurrences() >= min_occurrences)
            .filter(|p| match &needle {
                Some(needle) => p.prompt_text.to_lowercase().contains(needle),
                None => true,
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| compare_patterns(a, b, sort));
        matches
    }

    pub fn len(&self) -> usize {
        self.read_state().patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Updates not yet written to the store.
    pub fn pending_updates(&self) -> usize {
        self.read_state().dirty
    }

    /// Every record of a session: flushed history plus what is still queued.
    pub fn session_events(&self, session_id: &str) -> Result<Vec<ResponseRecord>, StoreError> {
        // serialise with flushes so no record is in flight between memory and store
        let _flush = self.lock_flush();
        let mut records = self.store.load_history(session_id)?;
        records.extend(
            self.read_state()
                .unflushed
                .iter()
                .filter(|r| r.session_id() == session_id)
                .cloned(),
        );
        Ok(records)
    }

    /// Flush unless another flush is already running.
    fn try_flush(&self) {
        let guard = match self.flush_lock.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::Poisoned(p)) => p.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => {
                debug!("flush already in progress, skipping");
                return;
            }
        };
        let _ = self.flush_locked(guard);
    }

    /// Write pending updates to the store. Returns how many updates were
    /// persisted. On failure the pending work is kept for the next attempt.
    pub fn flush(&self) -> Result<usize, StoreError> {
        let guard = self.lock_flush();
        self.flush_locked(guard)
    }

    fn flush_locked(&self, _guard: MutexGuard<'_, ()>) -> Result<usize, StoreError> {
        let (mut snapshot, pending, dirty) = {
            let mut state = self.write_state();
            if state.dirty == 0 && state.unflushed.is_empty() {
                self.flush_failed.store(false, AtomicOrdering::Release);
                return Ok(0);
            }
            let snapshot: Vec<LearnedPattern> = state.patterns.values().cloned().collect();
            let pending = std::mem::take(&mut state.unflushed);
            let dirty = std::mem::replace(&mut state.dirty, 0);
            (snapshot, pending, dirty)
        };
        snapshot.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

        let mut batches = group_by_session(pending);
        while let Some((session_id, records)) = batches.first() {
            if let Err(e) = self.store.append_history(session_id, records) {
                error!(session_id = %session_id, error = %e, "failed to append session history");
                self.restore(batches.into_iter().flat_map(|(_, r)| r).collect(), dirty);
                self.flush_failed.store(true, AtomicOrdering::Release);
                return Err(e);
            }
            batches.remove(0);
        }

        if let Err(e) = self.store.save_patterns(&snapshot) {
            error!(error = %e, "failed to save learned patterns");
            self.restore(Vec::new(), dirty);
            self.flush_failed.store(true, AtomicOrdering::Release);
            return Err(e);
        }

        self.flush_failed.store(false, AtomicOrdering::Release);
        info!(updates = dirty, patterns = snapshot.len(), "flushed response ledger");
        Ok(dirty)
    }

    /// Put unwritten work back in front of anything recorded meanwhile.
    fn restore(&self, mut records: Vec<ResponseRecord>, dirty: usize) {
        let mut state = self.write_state();
        records.append(&mut state.unflushed);
        state.unflushed = records;
        state.dirty += dirty;
    }

    /// Final flush before the process exits.
    pub fn shutdown(&self) {
        match self.flush() {
            Ok(0) => debug!("response ledger already up to date"),
            Ok(n) => info!(updates = n, "response ledger flushed on shutdown"),
            Err(e) => warn!(error = %e, "response ledger not fully persisted on shutdown"),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(|poisoned| {
            warn!("ledger lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(|poisoned| {
            warn!("ledger lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_flush(&self) -> MutexGuard<'_, ()> {
        self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn group_by_session(records: Vec<ResponseRecord>) -> Vec<(String, Vec<ResponseRecord>)> {
    let mut batches: Vec<(String, Vec<ResponseRecord>)> = Vec::new();
    for record in records {
        match batches.iter_mut().find(|(id, _)| id == record.session_id()) {
            Some((_, batch)) => batch.push(record),
            None => batches.push((record.session_id().to_string(), vec![record])),
        }
    }
    batches
}

fn compare_patterns(a: &LearnedPattern, b: &LearnedPattern, sort: SortKey) -> Ordering {
    let by_occurrences = b.total_occurrences().cmp(&a.total_occurrences());
    let by_last_seen = b.last_seen.cmp(&a.last_seen);
    let primary = match sort {
        SortKey::Occurrences => by_occurrences.then(by_last_seen),
        SortKey::LastSeen => by_last_seen.then(by_occurrences),
        SortKey::SuccessRate => {
            let rate = |p: &LearnedPattern| {
                p.most_common_response()
                    .map(|(_, stats)| stats.success_rate())
                    .unwrap_or(0.0)
            };
            rate(b)
                .partial_cmp(&rate(a))
                .unwrap_or(Ordering::Equal)
                .then(by_occurrences)
        }
    };
    primary.then_with(|| a.fingerprint.cmp(&b.fingerprint))
}
