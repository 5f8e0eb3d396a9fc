//! Tests for database and topic lifecycle
//!
//! These tests verify:
//! - Database descriptor creation and master/reader rules
//! - Topic creation, idempotent re-creation and reopening
//! - Topic deletion and backup
//! - Topic introspection and metadata rewrites

use std::fs;

use serde_json::json;
use tempfile::TempDir;
use timeranger::database::{DatabaseDesc, DESCRIPTOR_FILENAME};
use timeranger::flags::SystemFlag;
use timeranger::{Config, Database, TopicDesc, TopicOptions, TrangerError};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_master() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open_path(temp_dir.path(), "testdb", true).unwrap();
    (temp_dir, db)
}

fn open_reader(temp_dir: &TempDir) -> Database {
    Database::open_path(temp_dir.path(), "testdb", false).unwrap()
}

fn events() -> TopicOptions {
    TopicOptions::new(TopicDesc::new("events"))
}

// =============================================================================
// Database Tests
// =============================================================================

#[test]
fn test_master_writes_descriptor() {
    let (temp, db) = setup_master();

    let path = temp.path().join("testdb").join(DESCRIPTOR_FILENAME);
    assert!(path.exists());

    let stored: DatabaseDesc = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(stored.database, "testdb");
    assert_eq!(stored.filename_mask, "%Y-%m-%d");
    assert_eq!(&stored, db.descriptor());
    assert!(db.is_master());
}

#[test]
fn test_reader_requires_descriptor() {
    let temp = TempDir::new().unwrap();

    let result = Database::open_path(temp.path(), "testdb", false);
    assert!(matches!(result, Err(TrangerError::NotMaster(_))));
    assert!(!temp.path().join("testdb").exists());
}

#[test]
fn test_stored_mask_wins() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .path(temp.path())
        .database("testdb")
        .filename_mask("%Y-%m")
        .master(true)
        .build();
    Database::open(config).unwrap().close().unwrap();

    let config = Config::builder()
        .path(temp.path())
        .database("testdb")
        .filename_mask("%Y-%m-%d-%H")
        .master(true)
        .build();
    let mut db = Database::open(config).unwrap();
    assert_eq!(db.descriptor().filename_mask, "%Y-%m");

    db.create_topic(events()).unwrap();
    db.append("events", 1_700_000_000, 0, &mut json!({})).unwrap();
    let bucket = db.topic("events").unwrap().bucket_path(1_700_000_000).unwrap();
    assert!(bucket.ends_with("events-2023-11.json"));
    assert!(bucket.exists());
}

#[test]
fn test_directory_creation_failure_is_critical() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not-a-dir");
    fs::write(&blocker, b"file").unwrap();

    let result = Database::open_path(&blocker, "testdb", true);
    match result {
        Err(e) => {
            assert!(matches!(e, TrangerError::Storage { .. }));
            assert!(e.is_critical());
        }
        Ok(_) => panic!("database created under a regular file"),
    }
}

#[test]
fn test_invalid_config() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .path(temp.path())
        .database("")
        .master(true)
        .build();

    assert!(matches!(Database::open(config), Err(TrangerError::Config(_))));
}

// =============================================================================
// Topic Creation Tests
// =============================================================================

#[test]
fn test_create_topic_layout() {
    let (temp, mut db) = setup_master();

    let topic = db.create_topic(events()).unwrap();
    assert_eq!(topic.name(), "events");
    assert_eq!(topic.pkey(), "id");
    assert_eq!(topic.size(), 0);

    let dir = temp.path().join("testdb").join("events");
    for file in ["topic_desc", "topic_var", "topic_cols", "topic_idx"] {
        assert!(dir.join(file).exists(), "missing {}", file);
    }
    assert!(dir.join("data").is_dir());
    assert_eq!(fs::metadata(dir.join("topic_idx")).unwrap().len(), 0);
}

#[test]
fn test_create_topic_is_idempotent() {
    let (_temp, mut db) = setup_master();
    db.create_topic(events().var(json!({"a": 1}))).unwrap();
    db.append("events", 0, 0, &mut json!({"x": 1})).unwrap();

    let topic = db.create_topic(events().var(json!({"b": 2}))).unwrap();

    assert_eq!(topic.size(), 1);
    assert_eq!(topic.var(), &json!({"a": 1, "b": 2}));
}

#[test]
fn test_create_keeps_first_descriptor() {
    let (_temp, mut db) = setup_master();
    db.create_topic(events()).unwrap();

    let other = TopicOptions::new(
        TopicDesc::new("events")
            .pkey("name")
            .system_flag(SystemFlag::STRING_KEY),
    );
    let topic = db.create_topic(other).unwrap();

    assert_eq!(topic.pkey(), "id");
    assert_eq!(topic.system_flag(), SystemFlag::ROWID_KEY);
}

#[test]
fn test_reader_cannot_create_topic() {
    let (temp, _db) = setup_master();
    let mut reader = open_reader(&temp);

    let result = reader.create_topic(events());
    assert!(matches!(result, Err(TrangerError::NotMaster(_))));
}

#[test]
fn test_reader_opens_existing_topic() {
    let (temp, mut db) = setup_master();
    db.create_topic(events().var(json!({"a": 1}))).unwrap();

    let mut reader = open_reader(&temp);
    let topic = reader.create_topic(events().var(json!({"b": 2}))).unwrap();

    // readers never write variables
    assert_eq!(topic.var(), &json!({"a": 1}));
}

#[test]
fn test_open_unknown_topic() {
    let (temp, mut db) = setup_master();

    let result = db.open_topic("missing");
    assert!(matches!(result, Err(TrangerError::NotFound(_))));

    // a reader finding a topic absent cannot create it
    let mut reader = open_reader(&temp);
    let result = reader.open_topic("missing");
    assert!(matches!(result, Err(TrangerError::NotMaster(_))));
    let result = reader.topic_size("missing");
    assert!(matches!(result, Err(TrangerError::NotMaster(_))));
}

#[test]
fn test_invalid_topic_names() {
    let (_temp, mut db) = setup_master();

    for name in ["", ".hidden", "__private", "a/b"] {
        let result = db.create_topic(TopicOptions::new(TopicDesc::new(name)));
        assert!(
            matches!(result, Err(TrangerError::Parameter(_))),
            "name {:?} accepted",
            name
        );
    }
}

#[test]
fn test_unsupported_system_flags() {
    let (_temp, mut db) = setup_master();

    let zipped = TopicDesc::new("zipped").system_flag(SystemFlag::ROWID_KEY | SystemFlag::ZIP_RECORD);
    assert!(matches!(
        db.create_topic(TopicOptions::new(zipped)),
        Err(TrangerError::Parameter(_))
    ));

    let two_keys = TopicDesc::new("keys").system_flag(SystemFlag::STRING_KEY | SystemFlag::INT_KEY);
    assert!(matches!(
        db.create_topic(TopicOptions::new(two_keys)),
        Err(TrangerError::Parameter(_))
    ));

    assert!(!db.topic_exists("zipped"));
    assert!(!db.topic_exists("keys"));
}

// =============================================================================
// Close/Reopen Tests
// =============================================================================

#[test]
fn test_close_and_reopen() {
    let (temp, mut db) = setup_master();
    db.create_topic(events()).unwrap();
    for _ in 0..3 {
        db.append("events", 0, 0, &mut json!({})).unwrap();
    }

    db.close_topic("events").unwrap();
    assert!(db.topic("events").is_none());
    assert!(db.open_topics().is_empty());

    assert_eq!(db.open_topic("events").unwrap().size(), 3);
    db.close().unwrap();

    let mut db = Database::open_path(temp.path(), "testdb", true).unwrap();
    assert_eq!(db.topic_size("events").unwrap(), 3);
    let record = db.append("events", 0, 0, &mut json!({})).unwrap();
    assert_eq!(record.rowid, 4);
}

#[test]
fn test_close_unopened_topic_is_noop() {
    let (_temp, mut db) = setup_master();
    assert!(db.close_topic("never-opened").is_ok());
}

// =============================================================================
// Delete/Backup Tests
// =============================================================================

#[test]
fn test_delete_topic() {
    let (temp, mut db) = setup_master();
    db.create_topic(events()).unwrap();
    db.append("events", 0, 0, &mut json!({})).unwrap();

    db.delete_topic("events").unwrap();

    assert!(!temp.path().join("testdb").join("events").exists());
    assert!(!db.topic_exists("events"));
    assert!(matches!(db.delete_topic("events"), Err(TrangerError::NotFound(_))));
}

#[test]
fn test_reader_cannot_delete_topic() {
    let (temp, mut db) = setup_master();
    db.create_topic(events()).unwrap();

    let mut reader = open_reader(&temp);
    assert!(matches!(
        reader.delete_topic("events"),
        Err(TrangerError::NotMaster(_))
    ));
    assert!(db.topic_exists("events"));
}

#[test]
fn test_backup_topic() {
    let (temp, mut db) = setup_master();
    db.create_topic(events().var(json!({"v": 1}))).unwrap();
    db.append("events", 0, 0, &mut json!({})).unwrap();
    db.append("events", 0, 0, &mut json!({})).unwrap();

    let backup = db.backup_topic("events", None, false, None).unwrap();

    assert_eq!(backup, temp.path().join("testdb").join("events.bak"));
    assert_eq!(fs::metadata(backup.join("topic_idx")).unwrap().len(), 2 * 96);

    let topic = db.open_topic("events").unwrap();
    assert_eq!(topic.size(), 0);
    assert_eq!(topic.var(), &json!({"v": 1}));
}

#[test]
fn test_backup_without_overwrite_picks_free_name() {
    let (temp, mut db) = setup_master();
    db.create_topic(events()).unwrap();

    db.backup_topic("events", None, false, None).unwrap();
    let second = db.backup_topic("events", None, false, None).unwrap();
    let third = db.backup_topic("events", None, false, None).unwrap();

    let dir = temp.path().join("testdb");
    assert_eq!(second, dir.join("events.bak.1"));
    assert_eq!(third, dir.join("events.bak.2"));
}

#[test]
fn test_backup_overwrite_and_veto() {
    let (temp, mut db) = setup_master();
    db.create_topic(events()).unwrap();
    let dir = temp.path().join("testdb");

    db.backup_topic("events", Some("old"), false, None).unwrap();

    let mut asked = 0;
    let mut refuse = |_: &std::path::Path| {
        asked += 1;
        false
    };
    let vetoed = db.backup_topic("events", Some("old"), true, Some(&mut refuse)).unwrap();
    assert_eq!(asked, 1);
    assert_eq!(vetoed, dir.join("old.1"));

    let mut allow = |_: &std::path::Path| true;
    let replaced = db.backup_topic("events", Some("old"), true, Some(&mut allow)).unwrap();
    assert_eq!(replaced, dir.join("old"));
}

#[test]
fn test_backup_invalid_name() {
    let (_temp, mut db) = setup_master();
    db.create_topic(events()).unwrap();

    for name in ["events", "", "a/b", "__descriptor__"] {
        assert!(
            matches!(
                db.backup_topic("events", Some(name), false, None),
                Err(TrangerError::Parameter(_))
            ),
            "backup name {:?} accepted",
            name
        );
    }
}

#[test]
fn test_backup_never_targets_database_or_parent() {
    let (temp, mut db) = setup_master();
    db.create_topic(events()).unwrap();
    db.create_topic(TopicOptions::new(TopicDesc::new("other"))).unwrap();
    db.append("events", 0, 0, &mut json!({})).unwrap();

    for name in [".", ".."] {
        let result = db.backup_topic("events", Some(name), true, None);
        assert!(matches!(result, Err(TrangerError::Parameter(_))), "{:?}", name);
    }

    let dir = temp.path().join("testdb");
    assert!(dir.join(DESCRIPTOR_FILENAME).exists());
    assert!(dir.join("other").join("topic_desc").exists());
    assert!(temp.path().exists());
    assert_eq!(db.topic_size("events").unwrap(), 1);
}

// =============================================================================
// Introspection Tests
// =============================================================================

#[test]
fn test_list_topics_excludes_backups() {
    let (_temp, mut db) = setup_master();
    db.create_topic(TopicOptions::new(TopicDesc::new("zeta"))).unwrap();
    db.create_topic(events()).unwrap();
    db.backup_topic("events", None, false, None).unwrap();

    assert_eq!(db.list_topics().unwrap(), vec!["events", "zeta"]);
}

#[test]
fn test_topic_desc_and_exists() {
    let (_temp, mut db) = setup_master();
    let desc = TopicDesc::new("users")
        .pkey("name")
        .tkey("when")
        .system_flag(SystemFlag::STRING_KEY | SystemFlag::T_MS);
    db.create_topic(TopicOptions::new(desc.clone())).unwrap();

    assert!(db.topic_exists("users"));
    assert!(!db.topic_exists("nobody"));
    assert!(!db.topic_exists("../users"));
    assert_eq!(db.topic_desc("users").unwrap(), desc);
}

#[test]
fn test_write_topic_var_and_cols() {
    let (temp, mut db) = setup_master();
    db.create_topic(events().var(json!({"a": 1}))).unwrap();

    db.write_topic_var("events", &json!({"b": 2})).unwrap();
    db.write_topic_cols("events", json!({"name": {"type": "string"}})).unwrap();

    let dir = temp.path().join("testdb").join("events");
    let var: serde_json::Value = serde_json::from_slice(&fs::read(dir.join("topic_var")).unwrap()).unwrap();
    let cols: serde_json::Value = serde_json::from_slice(&fs::read(dir.join("topic_cols")).unwrap()).unwrap();
    assert_eq!(var, json!({"a": 1, "b": 2}));
    assert_eq!(cols, json!({"name": {"type": "string"}}));

    let mut reader = open_reader(&temp);
    assert_eq!(reader.open_topic("events").unwrap().var(), &json!({"a": 1, "b": 2}));
    assert!(matches!(
        reader.write_topic_var("events", &json!({"c": 3})),
        Err(TrangerError::NotMaster(_))
    ));
}
