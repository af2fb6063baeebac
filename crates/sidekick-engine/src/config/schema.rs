use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidekickConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_scan_lines")]
    pub scan_lines: usize,
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    #[serde(default = "default_status_window_secs")]
    pub status_window_secs: u64,
    #[serde(default = "default_max_window_bytes")]
    pub max_window_bytes: usize,
    #[serde(default = "default_max_poll_bytes")]
    pub max_poll_bytes: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            scan_lines: default_scan_lines(),
            context_lines: default_context_lines(),
            status_window_secs: default_status_window_secs(),
            max_window_bytes: default_max_window_bytes(),
            max_poll_bytes: default_max_poll_bytes(),
        }
    }
}

fn default_min_confidence() -> f64 {
    0.70
}

fn default_scan_lines() -> usize {
    50
}

fn default_context_lines() -> usize {
    10
}

fn default_status_window_secs() -> u64 {
    60
}

fn default_max_window_bytes() -> usize {
    64 * 1024
}

fn default_max_poll_bytes() -> u64 {
    1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    #[serde(default = "default_learning_enabled")]
    pub enabled: bool,
    /// Flush after this many unflushed updates.
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: default_learning_enabled(),
            flush_every: default_flush_every(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

fn default_learning_enabled() -> bool {
    true
}

fn default_flush_every() -> usize {
    10
}

fn default_flush_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn patterns_file(&self) -> PathBuf {
        self.data_dir.join("patterns.json")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("history")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sidekick")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default = "default_path_prefixes")]
    pub path_prefixes: Vec<String>,
    #[serde(default = "default_confirmation_confidence")]
    pub confirmation_confidence: f64,
    #[serde(default = "default_path_confidence")]
    pub path_confidence: f64,
    #[serde(default = "default_choice_confidence")]
    pub choice_confidence: f64,
    #[serde(default = "default_command_confidence")]
    pub command_confidence: f64,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            path_prefixes: default_path_prefixes(),
            confirmation_confidence: default_confirmation_confidence(),
            path_confidence: default_path_confidence(),
            choice_confidence: default_choice_confidence(),
            command_confidence: default_command_confidence(),
        }
    }
}

fn default_path_prefixes() -> Vec<String> {
    vec!["./".to_string(), "/tmp/".to_string(), "/home/".to_string()]
}

fn default_confirmation_confidence() -> f64 {
    0.75
}

fn default_path_confidence() -> f64 {
    0.70
}

fn default_choice_confidence() -> f64 {
    0.80
}

fn default_command_confidence() -> f64 {
    0.60
}
