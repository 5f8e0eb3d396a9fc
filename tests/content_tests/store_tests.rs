//! Tests for the content store
//!
//! These tests verify:
//! - Appending payload bytes per bucket
//! - Reading back by offset/size
//! - Blanking in place
//! - Read-only stores and missing or short files

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use timeranger::content::{ContentStore, FilenameMask};
use timeranger::index::IndexRecord;
use timeranger::TrangerError;

const DAY1: u64 = 1_699_920_000; // 2023-11-14
const DAY2: u64 = DAY1 + 86_400;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store(writable: bool) -> (TempDir, PathBuf, ContentStore) {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    fs::create_dir_all(&data_dir).unwrap();
    let store = open_store(&data_dir, writable);
    (temp_dir, data_dir, store)
}

fn open_store(data_dir: &std::path::Path, writable: bool) -> ContentStore {
    let mask = FilenameMask::new("%Y-%m-%d").unwrap();
    ContentStore::new("events", data_dir, mask, writable, 0o775, 0o664)
}

fn located(rowid: u64, t: u64, offset: u64, size: u64) -> IndexRecord {
    IndexRecord {
        rowid,
        t,
        offset,
        size,
        ..Default::default()
    }
}

// =============================================================================
// Write/Read Tests
// =============================================================================

#[test]
fn test_write_offsets_accumulate() {
    let (_temp, _dir, mut store) = setup_store(true);

    let (o1, s1) = store.write(DAY1, false, b"first\n").unwrap();
    let (o2, s2) = store.write(DAY1 + 10, false, b"second\n").unwrap();

    assert_eq!((o1, s1), (0, 6));
    assert_eq!((o2, s2), (6, 7));

    let bytes = store.read(&located(2, DAY1 + 10, o2, s2), false).unwrap();
    assert_eq!(bytes, b"second\n");
}

#[test]
fn test_bucket_file_naming() {
    let (_temp, data_dir, mut store) = setup_store(true);

    store.write(DAY1, false, b"x\n").unwrap();

    let path = store.bucket_path(DAY1, false).unwrap();
    assert_eq!(path, data_dir.join("events-2023-11-14.json"));
    assert!(path.exists());
}

#[test]
fn test_buckets_split_by_day() {
    let (_temp, _dir, mut store) = setup_store(true);

    let (o1, _) = store.write(DAY1, false, b"day one\n").unwrap();
    let (o2, _) = store.write(DAY2, false, b"day two\n").unwrap();

    assert_eq!(o1, 0);
    assert_eq!(o2, 0);
    assert_eq!(store.open_files(), 2);
    assert_ne!(
        store.bucket_path(DAY1, false).unwrap(),
        store.bucket_path(DAY2, false).unwrap()
    );
}

#[test]
fn test_nested_bucket_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let mask = FilenameMask::new("CCYY/MM/DD").unwrap();
    let mut store = ContentStore::new("events", &data_dir, mask, true, 0o775, 0o664);

    store.write(DAY1, false, b"nested\n").unwrap();

    assert!(data_dir.join("events-2023/11/14.json").exists());
}

#[test]
fn test_reopen_appends_at_end() {
    let (_temp, data_dir, mut store) = setup_store(true);
    store.write(DAY1, false, b"abc\n").unwrap();
    store.close_all();
    assert_eq!(store.open_files(), 0);

    let mut store = open_store(&data_dir, true);
    let (offset, _) = store.write(DAY1, false, b"def\n").unwrap();
    assert_eq!(offset, 4);
}

// =============================================================================
// Blank Tests
// =============================================================================

#[test]
fn test_blank_zeroes_in_place() {
    let (_temp, _dir, mut store) = setup_store(true);
    let (o1, s1) = store.write(DAY1, false, b"keep\n").unwrap();
    let (o2, s2) = store.write(DAY1, false, b"erase\n").unwrap();

    store.blank(&located(2, DAY1, o2, s2), false).unwrap();

    let erased = store.read(&located(2, DAY1, o2, s2), false).unwrap();
    assert_eq!(erased, vec![0u8; s2 as usize]);
    let kept = store.read(&located(1, DAY1, o1, s1), false).unwrap();
    assert_eq!(kept, b"keep\n");

    let len = fs::metadata(store.bucket_path(DAY1, false).unwrap()).unwrap().len();
    assert_eq!(len, s1 + s2);
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_read_only_store() {
    let (_temp, data_dir, mut writer) = setup_store(true);
    let (offset, size) = writer.write(DAY1, false, b"data\n").unwrap();

    let mut reader = open_store(&data_dir, false);
    assert!(matches!(
        reader.write(DAY1, false, b"nope\n"),
        Err(TrangerError::NotMaster(_))
    ));
    assert!(matches!(
        reader.blank(&located(1, DAY1, offset, size), false),
        Err(TrangerError::NotMaster(_))
    ));
    assert_eq!(reader.read(&located(1, DAY1, offset, size), false).unwrap(), b"data\n");
}

#[test]
fn test_missing_bucket() {
    let (_temp, _dir, mut store) = setup_store(false);

    let result = store.read(&located(1, DAY1, 0, 4), false);
    assert!(matches!(result, Err(TrangerError::NotFound(_))));
}

#[test]
fn test_short_read_is_corruption() {
    let (_temp, _dir, mut store) = setup_store(true);
    store.write(DAY1, false, b"tiny\n").unwrap();

    let result = store.read(&located(1, DAY1, 0, 100), false);
    assert!(matches!(result, Err(TrangerError::Corruption(_))));
}
