use crate::record::ResponseRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// Tally for a single response to a prompt. `success_count <= count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStats {
    pub count: u64,
    pub success_count: u64,
}

impl ResponseStats {
    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.count as f64
        }
    }
}

/// Aggregate over every [`ResponseRecord`] sharing a fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub fingerprint: String,
    /// Prompt text as first seen.
    pub prompt_text: String,
    pub responses: HashMap<String, ResponseStats>,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
}

impl LearnedPattern {
    /// Start a new aggregate from its first record.
    pub fn from_record(record: &ResponseRecord) -> Self {
        let mut pattern = Self {
            fingerprint: record.fingerprint().to_string(),
            prompt_text: record.prompt_text().to_string(),
            responses: HashMap::new(),
            first_seen: record.recorded_at(),
            last_seen: record.recorded_at(),
        };
        pattern.apply(record);
        pattern
    }

    /// Fold one more record into the aggregate.
    pub fn apply(&mut self, record: &ResponseRecord) {
        let stats = self
            .responses
            .entry(record.response().to_string())
            .or_default();
        stats.count += 1;
        if record.success() {
            stats.success_count += 1;
        }
        if record.recorded_at() > self.last_seen {
            self.last_seen = record.recorded_at();
        }
    }

    /// Sum of every response's count.
    pub fn total_occurrences(&self) -> u64 {
        self.responses.values().map(|s| s.count).sum()
    }

    /// Most frequently used response; ties go to the lexically smaller text
    /// so the answer does not depend on map iteration order.
    pub fn most_common_response(&self) -> Option<(&str, &ResponseStats)> {
        self.responses
            .iter()
            .max_by(|(a_text, a), (b_text, b)| a.count.cmp(&b.count).then(b_text.cmp(a_text)))
            .map(|(text, stats)| (text.as_str(), stats))
    }
}
