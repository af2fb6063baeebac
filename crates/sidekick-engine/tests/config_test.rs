use sidekick_engine::config::{ConfigError, ConfigLoader, SidekickConfig};
use sidekick_engine::classifier::ClassifierOptions;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

#[test]
fn test_defaults() {
    let config = SidekickConfig::default();
    assert_eq!(config.detection.min_confidence, 0.70);
    assert_eq!(config.detection.scan_lines, 50);
    assert_eq!(config.detection.context_lines, 10);
    assert_eq!(config.learning.flush_every, 10);
    assert!(config.learning.enabled);
    assert_eq!(config.suggestions.path_prefixes, vec!["./", "/tmp/", "/home/"]);
    assert!(config.storage.patterns_file().ends_with("patterns.json"));
    assert!(config.storage.history_dir().ends_with("history"));
}

#[tokio::test]
async fn test_partial_file_merges_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sidekick.yaml");
    let yaml = r#"
detection:
  min_confidence: 0.8
  scan_lines: 20
learning:
  flush_every: 3
storage:
  data_dir: /var/lib/sidekick
"#;
    fs::write(&path, yaml).await.unwrap();

    let config = ConfigLoader::load_from(&path).await.unwrap();
    assert_eq!(config.detection.min_confidence, 0.8);
    assert_eq!(config.detection.scan_lines, 20);
    assert_eq!(config.detection.context_lines, 10);
    assert_eq!(config.learning.flush_every, 3);
    assert_eq!(config.learning.flush_interval_secs, 30);
    assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/sidekick"));
    assert_eq!(config.suggestions.confirmation_confidence, 0.75);

    let options = ClassifierOptions::from(&config.detection);
    assert_eq!(options.scan_lines, 20);
    assert_eq!(options.status_window, Duration::from_secs(60));
}

#[tokio::test]
async fn test_empty_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.yaml");
    fs::write(&path, "  \n").await.unwrap();

    let config = ConfigLoader::load_from(&path).await.unwrap();
    assert_eq!(config.detection.max_window_bytes, 64 * 1024);
}

#[tokio::test]
async fn test_type_mismatch_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "detection:\n  scan_lines: many\n").await.unwrap();

    let result = ConfigLoader::load_from(&path).await;
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[tokio::test]
async fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ConfigLoader::load_from(&dir.path().join("absent.yaml")).await;
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
