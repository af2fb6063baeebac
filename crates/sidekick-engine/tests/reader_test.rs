use sidekick_engine::reader::{IncrementalReader, ReadError, Utf8Stream};
use std::fs::{self, OpenOptions};
use std::io::Write;

#[test]
fn test_reads_only_new_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, "first\n").unwrap();

    let mut reader = IncrementalReader::open(&path);
    let chunk = reader.poll().unwrap();
    assert_eq!(chunk.bytes, b"first\n");
    assert_eq!(chunk.offset, 6);
    assert!(!chunk.truncated);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"second\n").unwrap();

    let chunk = reader.poll().unwrap();
    assert_eq!(chunk.bytes, b"second\n");
    assert_eq!(reader.offset(), 13);
}

#[test]
fn test_bounded_chunks_report_more() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, "0123456789").unwrap();

    let mut reader = IncrementalReader::open(&path).with_max_chunk(4);
    let first = reader.poll().unwrap();
    assert_eq!(first.bytes, b"0123");
    assert!(first.has_more);

    let mut collected = first.bytes;
    loop {
        let chunk = reader.poll().unwrap();
        collected.extend_from_slice(&chunk.bytes);
        if !chunk.has_more {
            break;
        }
    }
    assert_eq!(collected, b"0123456789");
}

#[test]
fn test_truncation_resets_offset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, "a much longer first file\n").unwrap();

    let mut reader = IncrementalReader::open(&path);
    reader.poll().unwrap();

    fs::write(&path, "short\n").unwrap();
    let chunk = reader.poll().unwrap();
    assert!(chunk.truncated);
    assert_eq!(chunk.bytes, b"short\n");
    assert_eq!(chunk.offset, 6);
}

#[test]
fn test_missing_file_keeps_offset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, "abc").unwrap();

    let mut reader = IncrementalReader::open(&path);
    reader.poll().unwrap();
    fs::remove_file(&path).unwrap();

    assert!(matches!(
        reader.poll(),
        Err(ReadError::SourceUnavailable { .. })
    ));
    assert_eq!(reader.offset(), 3);
}

#[test]
fn test_split_utf8_across_polls() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    let text = "naïve → done";
    let bytes = text.as_bytes();
    // cut inside the arrow
    let cut = text.find('→').unwrap() + 1;
    fs::write(&path, &bytes[..cut]).unwrap();

    let mut reader = IncrementalReader::open(&path);
    let mut decoder = Utf8Stream::new();
    let mut out = decoder.decode(&reader.poll().unwrap().bytes);
    assert_eq!(decoder.pending(), 1);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&bytes[cut..]).unwrap();
    out.push_str(&decoder.decode(&reader.poll().unwrap().bytes));
    assert_eq!(out, text);
}
