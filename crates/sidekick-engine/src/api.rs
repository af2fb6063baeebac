//! The operations exposed to the command surface.
//!
//! [`Sidekick`] wires the registry, classifier, ledger and suggestion engine
//! together and validates caller input before it reaches them.

use crate::classifier::{ClassifierOptions, EventClassifier, danger};
use crate::config::SidekickConfig;
use crate::error::{Result, SidekickError};
use crate::ledger::{JsonFileStore, LedgerStore, ResponseLedger, SortKey, spawn_periodic_flush};
use crate::registry::{SessionRegistry, truncate};
use crate::search::{self, SearchOptions};
use crate::suggest::{SuggestionEngine, SuggestionHook};
use sidekick_common::protocol::{
    DetectResponse, PatternSummary, PatternsResponse, PollResponse, RecordResponse,
    SearchResponse, SessionStarted, StopResponse, SuggestResponse,
};
use sidekick_common::{
    PromptType, ResponseRecord, ResponseSource, SessionInfo, SessionKind, fingerprint,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Sidekick {
    config: SidekickConfig,
    registry: SessionRegistry,
    classifier: EventClassifier,
    ledger: Arc<ResponseLedger>,
    suggestions: SuggestionEngine,
}

impl Sidekick {
    /// Persist learned patterns under the configured data directory.
    pub fn new(config: SidekickConfig) -> Self {
        let store = Arc::new(JsonFileStore::from_config(&config.storage));
        Self::with_store(config, store)
    }

    pub fn with_store(config: SidekickConfig, store: Arc<dyn LedgerStore>) -> Self {
        let ledger = Arc::new(ResponseLedger::open(store, config.learning.flush_every));
        let max_poll = (config.detection.max_poll_bytes > 0).then_some(config.detection.max_poll_bytes);
        Self {
            registry: SessionRegistry::new(config.detection.max_window_bytes, max_poll),
            classifier: EventClassifier::new(ClassifierOptions::from(&config.detection)),
            suggestions: SuggestionEngine::new(Arc::clone(&ledger), config.suggestions.clone()),
            ledger,
            config,
        }
    }

    pub fn with_hook(mut self, hook: Box<dyn SuggestionHook>) -> Self {
        self.suggestions = self.suggestions.with_hook(hook);
        self
    }

    pub fn config(&self) -> &SidekickConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ResponseLedger> {
        &self.ledger
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    pub fn start_session(
        &self,
        session_id: &str,
        kind: SessionKind,
        path: &Path,
        metadata: HashMap<String, String>,
    ) -> Result<SessionStarted> {
        if session_id.trim().is_empty() {
            return Err(SidekickError::InvalidArgument(
                "session id must not be empty".to_string(),
            ));
        }
        let info = self.registry.start(session_id, path, kind, metadata)?;
        Ok(SessionStarted::from(&info))
    }

    pub fn poll_session(&self, session_id: &str) -> Result<PollResponse> {
        Ok(self.registry.poll(session_id)?)
    }

    /// Detect a prompt in the text observed since the previous detection.
    /// `None` uses the configured threshold.
    pub fn classify_latest(
        &self,
        session_id: &str,
        min_confidence: Option<f64>,
    ) -> Result<DetectResponse> {
        let min_confidence = min_confidence.unwrap_or(self.config.detection.min_confidence);
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(SidekickError::InvalidConfidence(min_confidence));
        }
        let event = self
            .registry
            .classify_latest(session_id, &self.classifier, min_confidence)?;
        Ok(DetectResponse::from(event))
    }

    pub fn suggest(
        &self,
        prompt_text: &str,
        prompt_type: &str,
        context: Option<&HashMap<String, String>>,
    ) -> Result<SuggestResponse> {
        let prompt_type: PromptType = prompt_type
            .parse()
            .map_err(SidekickError::InvalidPromptType)?;
        let empty = HashMap::new();
        Ok(self
            .suggestions
            .suggest_text(prompt_text, prompt_type, context.unwrap_or(&empty)))
    }

    /// Record what was typed at a prompt. Responses to password prompts are
    /// replaced with the redaction marker before the record exists.
    pub fn record_outcome(
        &self,
        session_id: &str,
        prompt_text: &str,
        response: &str,
        success: bool,
        source: ResponseSource,
    ) -> Result<RecordResponse> {
        let last = self.registry.last_detection(session_id)?;
        let fp = fingerprint(prompt_text);

        let detected = last.filter(|d| fingerprint(&d.prompt_text) == fp);
        let prompt_type = if danger::is_password_prompt(prompt_text) {
            PromptType::Password
        } else if let Some(d) = &detected {
            d.prompt_type
        } else {
            self.classifier
                .classify(prompt_text, 0.0)
                .map(|c| c.prompt_type)
                .unwrap_or(PromptType::Unclassified)
        };
        let elapsed = detected
            .map(|d| d.at.elapsed())
            .unwrap_or(Duration::ZERO);

        let record = ResponseRecord::new(
            session_id,
            prompt_text,
            prompt_type,
            response,
            success,
            source,
            elapsed,
        );
        let redacted = record.is_redacted();

        if !self.config.learning.enabled {
            debug!(session_id, "learning disabled, outcome not recorded");
            return Ok(RecordResponse {
                accepted: false,
                redacted,
                fingerprint: fp,
            });
        }

        if redacted {
            info!(session_id, prompt = %truncate(prompt_text, 50), "recorded redacted outcome");
        } else {
            info!(
                session_id,
                prompt = %truncate(prompt_text, 50),
                response = %truncate(response, 50),
                success,
                "recorded outcome"
            );
        }
        self.ledger.record_outcome(record);

        Ok(RecordResponse {
            accepted: true,
            redacted,
            fingerprint: fp,
        })
    }

    /// Stop a session and flush any pending ledger updates.
    pub fn stop_session(&self, session_id: &str, keep_log: bool) -> Result<StopResponse> {
        let stopped = self.registry.stop(session_id, keep_log)?;
        if self.ledger.pending_updates() > 0 {
            if let Err(e) = self.ledger.flush() {
                warn!(session_id, error = %e, "ledger flush after stop failed");
            }
        }
        Ok(stopped)
    }

    pub fn query_patterns(
        &self,
        filter: Option<&str>,
        min_occurrences: u64,
        sort_by: &str,
    ) -> Result<PatternsResponse> {
        let sort: SortKey = sort_by.parse().map_err(SidekickError::InvalidSortKey)?;
        if min_occurrences < 1 {
            return Err(SidekickError::InvalidMinOccurrences(min_occurrences));
        }
        let patterns: Vec<PatternSummary> = self
            .ledger
            .query(filter, min_occurrences, sort)
            .iter()
            .map(PatternSummary::from)
            .collect();
        info!(
            total = patterns.len(),
            filter = filter.unwrap_or(""),
            min_occurrences,
            sort = %sort,
            "retrieved learned patterns"
        );
        Ok(PatternsResponse {
            total_patterns: patterns.len(),
            patterns,
        })
    }

    /// Search the log of one session, or of every active session.
    pub fn search_history(
        &self,
        query: &str,
        session_id: Option<&str>,
        options: SearchOptions,
    ) -> Result<SearchResponse> {
        let sessions: Vec<SessionInfo> = match session_id {
            Some(id) => vec![self.registry.info(id)?],
            None => self.registry.sessions(),
        };
        Ok(search::search_sessions(&sessions, query, options)?)
    }

    pub fn session_events(&self, session_id: &str) -> Result<Vec<ResponseRecord>> {
        Ok(self.ledger.session_events(session_id)?)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.sessions()
    }

    /// Start the background flusher on the configured interval.
    pub fn spawn_flusher(&self) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.learning.flush_interval_secs.max(1));
        spawn_periodic_flush(Arc::clone(&self.ledger), interval)
    }

    /// Flush the ledger before exit.
    pub fn shutdown(&self) {
        self.ledger.shutdown();
    }
}
