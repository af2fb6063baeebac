use sidekick_common::{PromptType, SessionKind, SessionState};
use sidekick_engine::classifier::EventClassifier;
use sidekick_engine::registry::{RegistryError, SessionRegistry};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

fn start(registry: &SessionRegistry, id: &str, path: &Path) {
    registry
        .start(id, path, SessionKind::ShellRecording, HashMap::new())
        .unwrap();
}

#[test]
fn test_polls_concatenate_to_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.log");
    append(&log, "$ ls\n");

    let registry = SessionRegistry::default();
    start(&registry, "s1", &log);

    let mut seen = String::new();
    for chunk in ["a.txt b.txt\n", "$ cat a.txt\n", "hello ✓ world\n"] {
        seen.push_str(&registry.poll("s1").unwrap().new_text);
        append(&log, chunk);
    }
    seen.push_str(&registry.poll("s1").unwrap().new_text);

    assert_eq!(seen, fs::read_to_string(&log).unwrap());
}

#[test]
fn test_second_poll_without_writes_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.log");
    append(&log, "building...\n");

    let registry = SessionRegistry::default();
    start(&registry, "s1", &log);

    let first = registry.poll("s1").unwrap();
    assert_eq!(first.new_text, "building...\n");
    assert_eq!(first.offset, 12);

    let second = registry.poll("s1").unwrap();
    assert_eq!(second.new_text, "");
    assert_eq!(second.offset, 12);
    assert!(!second.has_more);
}

#[test]
fn test_truncated_file_is_reread_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.log");
    append(&log, "a long first generation of output\n");

    let registry = SessionRegistry::default();
    start(&registry, "s1", &log);
    registry.poll("s1").unwrap();

    fs::write(&log, "rotated\n").unwrap();
    let after = registry.poll("s1").unwrap();
    assert_eq!(after.new_text, "rotated\n");
    assert_eq!(after.offset, 8);
    assert_eq!(registry.poll("s1").unwrap().new_text, "");
}

#[test]
fn test_duplicate_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.log");
    append(&log, "abc\n");

    let registry = SessionRegistry::default();
    start(&registry, "s1", &log);
    registry.poll("s1").unwrap();
    let offset = registry.info("s1").unwrap().offset;

    let err = registry
        .start("s1", &log, SessionKind::PlainFile, HashMap::new())
        .unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyActive(ref id) if id == "s1"));
    assert_eq!(registry.info("s1").unwrap().offset, offset);
    assert_eq!(registry.info("s1").unwrap().kind, SessionKind::ShellRecording);
}

#[test]
fn test_missing_source_and_unknown_session() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SessionRegistry::default();

    let err = registry
        .start("s1", &dir.path().join("absent.log"), SessionKind::PlainFile, HashMap::new())
        .unwrap_err();
    assert!(matches!(err, RegistryError::SourceNotFound { .. }));
    assert!(registry.is_empty());

    assert!(matches!(
        registry.poll("nope"),
        Err(RegistryError::UnknownSession(_))
    ));
    assert!(matches!(
        registry.stop("nope", true),
        Err(RegistryError::UnknownSession(_))
    ));
}

#[test]
fn test_read_failure_leaves_session_active() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.log");
    append(&log, "one\n");

    let registry = SessionRegistry::default();
    start(&registry, "s1", &log);
    registry.poll("s1").unwrap();

    fs::remove_file(&log).unwrap();
    assert!(matches!(
        registry.poll("s1"),
        Err(RegistryError::SourceUnavailable(_))
    ));
    let info = registry.info("s1").unwrap();
    assert_eq!(info.state, SessionState::Active);
    assert_eq!(info.offset, 4);

    append(&log, "one\ntwo\n");
    assert_eq!(registry.poll("s1").unwrap().new_text, "two\n");
}

#[test]
fn test_stop_reports_totals_and_deletes_log() {
    let dir = tempfile::tempdir().unwrap();
    let kept = dir.path().join("kept.log");
    let dropped = dir.path().join("dropped.log");
    append(&kept, "12345");
    append(&dropped, "678");

    let registry = SessionRegistry::default();
    start(&registry, "kept", &kept);
    start(&registry, "dropped", &dropped);
    registry.poll("kept").unwrap();
    registry.poll("dropped").unwrap();

    let stopped = registry.stop("kept", true).unwrap();
    assert_eq!(stopped.state, SessionState::Stopped);
    assert_eq!(stopped.total_bytes_processed, 5);
    assert!(!stopped.log_deleted);
    assert!(kept.exists());

    let stopped = registry.stop("dropped", false).unwrap();
    assert!(stopped.log_deleted);
    assert!(!dropped.exists());

    assert!(matches!(
        registry.poll("kept"),
        Err(RegistryError::UnknownSession(_))
    ));
    assert!(registry.sessions().is_empty());

    // the identifier is free again
    start(&registry, "kept", &kept);
}

#[test]
fn test_classify_latest_reports_each_prompt_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.log");
    append(&log, "line one\nContinue? (y/n) ");

    let registry = SessionRegistry::default();
    let classifier = EventClassifier::default();
    start(&registry, "s1", &log);

    let event = registry
        .classify_latest("s1", &classifier, 0.7)
        .unwrap()
        .unwrap();
    assert_eq!(event.prompt_type, PromptType::Confirmation);
    assert_eq!(event.offset, 19);
    assert!(registry.classify_latest("s1", &classifier, 0.7).unwrap().is_none());

    append(&log, "y\nDone\nContinue? (y/n) ");
    let event = registry
        .classify_latest("s1", &classifier, 0.7)
        .unwrap()
        .unwrap();
    assert_eq!(event.offset, 42);

    let last = registry.last_detection("s1").unwrap().unwrap();
    assert_eq!(last.prompt_text, "Continue? (y/n)");
}

#[test]
fn test_concurrent_polls_never_duplicate_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("session.log");
    append(&log, "");

    let registry = SessionRegistry::default();
    start(&registry, "s1", &log);

    let total: usize = std::thread::scope(|scope| {
        let writer = scope.spawn(|| {
            for i in 0..200 {
                append(&log, &format!("line {i}\n"));
            }
        });
        let readers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    (0..100)
                        .map(|_| registry.poll("s1").unwrap().new_text.len())
                        .sum::<usize>()
                })
            })
            .collect();
        writer.join().unwrap();
        readers.into_iter().map(|r| r.join().unwrap()).sum()
    });

    let rest = registry.poll("s1").unwrap().new_text.len();
    assert_eq!(total + rest, fs::metadata(&log).unwrap().len() as usize);
}

#[test]
fn test_independent_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.log");
    let b = dir.path().join("b.log");
    append(&a, "aaa");
    append(&b, "bbbbbb");

    let registry = SessionRegistry::default();
    start(&registry, "a", &a);
    start(&registry, "b", &b);

    assert_eq!(registry.poll("a").unwrap().offset, 3);
    assert_eq!(registry.poll("b").unwrap().offset, 6);
    let ids: Vec<String> = registry.sessions().into_iter().map(|s| s.session_id).collect();
    assert_eq!(ids, vec!["a", "b"]);
}
