mod common;

use common::ArchiveBuilder;
use s_unzip::{extract_chain, extract_nested, ErrorKind, ExtractError, ExtractOptions, Extractor};
use tempfile::tempdir;

fn bundle() -> Vec<u8> {
    let inner = ArchiveBuilder::new()
        .deflated("schema.sql", b"CREATE TABLE t (id INTEGER);")
        .deflated("db/app.db", b"inner database bytes")
        .finish();

    ArchiveBuilder::new()
        .deflated("manifest.json", b"{\"version\": 3}")
        .stored("contents", &inner)
        .deflated("signature", b"not checked")
        .finish()
}

#[test]
fn test_nested_extract_saves_target() {
    let dir = tempdir().unwrap();
    let destination = dir.path().join("out/deeper/app.db");

    extract_nested(&bundle()[..], "contents", "app.db", &destination).unwrap();
    assert_eq!(std::fs::read(&destination).unwrap(), b"inner database bytes");
}

#[test]
fn test_nested_extract_overwrites_existing_file() {
    let dir = tempdir().unwrap();
    let destination = dir.path().join("app.db");
    std::fs::write(&destination, b"an older and much longer file on disk").unwrap();

    extract_nested(&bundle()[..], "contents", "*.db", &destination).unwrap();
    assert_eq!(std::fs::read(&destination).unwrap(), b"inner database bytes");
}

#[test]
fn test_nested_inner_archive_compressed() {
    let inner = ArchiveBuilder::new()
        .streamed("app.db", b"from a deflated inner archive", true)
        .finish();
    let outer = ArchiveBuilder::new()
        .streamed("contents", &inner, false)
        .finish();

    let dir = tempdir().unwrap();
    let destination = dir.path().join("app.db");
    extract_nested(&outer[..], "contents", "app.db", &destination).unwrap();
    assert_eq!(
        std::fs::read(&destination).unwrap(),
        b"from a deflated inner archive"
    );
}

#[test]
fn test_nested_missing_inner_archive() {
    let dir = tempdir().unwrap();
    let destination = dir.path().join("app.db");

    let err = extract_nested(&bundle()[..], "payload", "app.db", &destination).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("payload"));
    assert!(!destination.exists());
}

#[test]
fn test_nested_missing_target() {
    let dir = tempdir().unwrap();
    let destination = dir.path().join("app.db");

    let err = extract_nested(&bundle()[..], "contents", "*.csv", &destination).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("*.csv"));
    assert!(!destination.exists());
}

#[test]
fn test_nested_inner_is_not_an_archive() {
    let dir = tempdir().unwrap();
    let err = extract_nested(&bundle()[..], "manifest.json", "app.db", dir.path().join("x"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Stream);
}

#[test]
fn test_nested_save_failure_is_io() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"file in the way").unwrap();

    let err = extract_nested(&bundle()[..], "contents", "app.db", blocker.join("app.db"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(matches!(err, ExtractError::Persist { .. }));
}

#[test]
fn test_chain_three_levels_deep() {
    let innermost = ArchiveBuilder::new()
        .deflated("leaf.txt", b"three levels down")
        .finish();
    let middle = ArchiveBuilder::new()
        .deflated("level2.zip", &innermost)
        .finish();
    let outer = ArchiveBuilder::new()
        .deflated("noise.txt", b"ignored")
        .stored("level1.zip", &middle)
        .finish();

    let data = extract_chain(&outer[..], &["level1.zip", "*.zip", "leaf.txt"]).unwrap();
    assert_eq!(data, b"three levels down");
}

#[test]
fn test_chain_respects_entry_limit_at_every_level() {
    let inner = ArchiveBuilder::new()
        .deflated("app.db", &vec![7u8; 4_000])
        .finish();
    let outer = ArchiveBuilder::new().stored("contents", &inner).finish();

    let extractor = Extractor::new(ExtractOptions::default().with_max_entry_size(3_000));
    let err = extractor
        .extract_chain(&outer[..], &["contents", "app.db"])
        .unwrap_err();
    assert!(matches!(err, ExtractError::LimitExceeded { ref path, .. } if path == "app.db"));
}
