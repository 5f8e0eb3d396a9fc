//! Database Module
//!
//! The top-level session object that coordinates topics and lists.
//!
//! ## Responsibilities
//! - Create/open the database directory and its descriptor
//! - Topic lifecycle: create, open, close, delete, backup
//! - Enforce the single-writer discipline on every mutating call
//! - Route record operations to the owning topic
//! - Escalate corruption through the configured critical-error policy

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Config, CriticalErrorPolicy};
use crate::content::FilenameMask;
use crate::disk;
use crate::error::{Result, TrangerError};
use crate::index::IndexRecord;
use crate::list::{List, ListCallback, ListHandle, ListId};
use crate::matcher::{Filter, Matcher};
use crate::topic::{validate_topic_name, Topic, TopicDesc, TopicOptions, DESC_FILENAME};

/// Name of the database descriptor file
pub const DESCRIPTOR_FILENAME: &str = "__descriptor__";

/// Immutable database metadata, written once by the master
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDesc {
    pub database: String,
    pub filename_mask: String,
    pub xpermission: u32,
    pub rpermission: u32,
    pub version: String,
}

/// Veto hook asked before an existing backup is deleted; `false` keeps it
pub type BackupVeto<'a> = &'a mut dyn FnMut(&Path) -> bool;

/// An open database
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (per process)
///
/// - One process opens the database as master and may mutate it
/// - Any number of processes open it read-only; every mutating call on
///   their handles fails with `NotMaster`
/// - All I/O is synchronous; list callbacks run inline with the append
///   that triggered them
pub struct Database {
    /// Handle configuration
    config: Config,

    /// `{path}/{database}`
    directory: PathBuf,

    /// Descriptor as stored on disk
    descriptor: DatabaseDesc,

    /// Compiled filename mask from the descriptor
    mask: FilenameMask,

    /// Open topics by name
    topics: HashMap<String, Topic>,

    /// Next list identifier
    next_list_id: u64,
}

impl Database {
    /// Open or create a database.
    ///
    /// The master creates the directory and descriptor on first use; a
    /// reader requires both to exist. An existing descriptor always wins
    /// over the configured filename mask.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let directory = config.database_dir();
        let descriptor_path = directory.join(DESCRIPTOR_FILENAME);

        let descriptor = if descriptor_path.exists() {
            let stored: DatabaseDesc = disk::read_json(&descriptor_path)?;
            if stored.filename_mask != config.filename_mask {
                tracing::warn!(
                    database = %config.database,
                    stored = %stored.filename_mask,
                    configured = %config.filename_mask,
                    "filename mask differs from descriptor, using stored mask"
                );
            }
            stored
        } else {
            if !config.is_master() {
                return Err(TrangerError::NotMaster(format!(
                    "database {} has no descriptor at {}",
                    config.database,
                    descriptor_path.display()
                )));
            }

            escalate(
                config.on_critical_error,
                disk::create_dir(&directory, config.xpermission),
            )?;
            let desc = DatabaseDesc {
                database: config.database.clone(),
                filename_mask: config.filename_mask.clone(),
                xpermission: config.xpermission,
                rpermission: config.rpermission,
                version: crate::VERSION.to_string(),
            };
            disk::write_json(&descriptor_path, &desc, config.rpermission)?;
            tracing::info!(
                database = %config.database,
                path = %directory.display(),
                "database created"
            );
            desc
        };

        let mask = FilenameMask::new(&descriptor.filename_mask)?;

        tracing::debug!(
            database = %config.database,
            master = config.is_master(),
            "database opened"
        );

        Ok(Self {
            config,
            directory,
            descriptor,
            mask,
            topics: HashMap::new(),
            next_list_id: 1,
        })
    }

    /// Open with a root path (convenience method)
    ///
    /// Uses default config with the given root, database name and mode
    pub fn open_path(path: &Path, database: &str, master: bool) -> Result<Self> {
        let config = Config::builder()
            .path(path)
            .database(database)
            .master(master)
            .build();
        Self::open(config)
    }

    // =========================================================================
    // Topic Lifecycle
    // =========================================================================

    /// Create a topic, or open it when it already exists.
    ///
    /// On an existing topic the master merges `options.var` into the stored
    /// variables; the descriptor of the first creation is kept.
    pub fn create_topic(&mut self, options: TopicOptions) -> Result<&Topic> {
        let name = options.desc.topic_name.clone();
        validate_topic_name(&name)?;
        options.desc.validate()?;

        let policy = self.config.on_critical_error;
        let topic_dir = self.directory.join(&name);

        if topic_dir.join(DESC_FILENAME).exists() {
            let is_master = self.config.is_master();
            let result = self.topic_mut(&name).and_then(|topic| {
                if topic.desc() != &options.desc {
                    tracing::warn!(topic = %name, "topic exists with a different descriptor, keeping it");
                }
                if is_master && has_entries(&options.var) {
                    topic.write_var(&options.var)?;
                }
                Ok(&*topic)
            });
            return escalate(policy, result);
        }

        self.check_master(&format!("create topic {}", name))?;
        escalate(
            policy,
            Topic::create(
                &topic_dir,
                &options,
                self.config.xpermission,
                self.config.rpermission,
            ),
        )?;
        tracing::info!(topic = %name, flag = %options.desc.system_flag, "topic created");

        escalate(policy, self.topic_mut(&name)).map(|t| &*t)
    }

    /// Open a topic; repeated calls return the same handle
    pub fn open_topic(&mut self, name: &str) -> Result<&Topic> {
        let policy = self.config.on_critical_error;
        escalate(policy, self.topic_mut(name)).map(|t| &*t)
    }

    /// Already open topic
    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.get(name)
    }

    /// Close a topic, detaching its lists and dropping its file handles
    pub fn close_topic(&mut self, name: &str) -> Result<()> {
        match self.topics.remove(name) {
            Some(mut topic) => topic.close(),
            None => Ok(()),
        }
    }

    /// Close and remove a topic directory (irreversible)
    pub fn delete_topic(&mut self, name: &str) -> Result<()> {
        self.check_master(&format!("delete topic {}", name))?;
        validate_topic_name(name)?;

        self.close_topic(name)?;

        let topic_dir = self.directory.join(name);
        if !topic_dir.exists() {
            return Err(TrangerError::NotFound(format!("topic {}", name)));
        }
        fs::remove_dir_all(&topic_dir)?;

        tracing::info!(topic = %name, "topic deleted");
        Ok(())
    }

    /// Move a topic directory aside and recreate it empty with the same
    /// descriptor, columns and variables.
    ///
    /// The backup goes to `backup_name` (default `{topic}.bak`). An existing
    /// backup is replaced only when `overwrite` is set and the veto hook (if
    /// any) agrees; otherwise the first free `{name}.N` is used. Returns the
    /// backup path.
    pub fn backup_topic(
        &mut self,
        name: &str,
        backup_name: Option<&str>,
        overwrite: bool,
        veto: Option<BackupVeto<'_>>,
    ) -> Result<PathBuf> {
        self.check_master(&format!("backup topic {}", name))?;

        let base = backup_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.bak", name));
        // same rules as topic names: never `.`, `..` or a path
        if validate_topic_name(&base).is_err() || base == name {
            return Err(TrangerError::Parameter(format!(
                "invalid backup name: {:?}",
                base
            )));
        }

        let options = {
            let topic = self.open_topic(name)?;
            TopicOptions::new(topic.desc().clone())
                .cols(topic.cols().clone())
                .var(topic.var().clone())
        };
        self.close_topic(name)?;

        let mut target = self.directory.join(&base);
        if target.exists() {
            let replace = overwrite && veto.map_or(true, |v| v(&target));
            if replace {
                fs::remove_dir_all(&target)?;
                tracing::info!(path = %target.display(), "previous backup deleted");
            } else {
                let mut n = 1u32;
                while target.exists() {
                    target = self.directory.join(format!("{}.{}", base, n));
                    n += 1;
                }
            }
        }

        let topic_dir = self.directory.join(name);
        fs::rename(&topic_dir, &target)?;
        tracing::info!(topic = %name, backup = %target.display(), "topic backed up");

        escalate(
            self.config.on_critical_error,
            Topic::create(
                &topic_dir,
                &options,
                self.config.xpermission,
                self.config.rpermission,
            ),
        )?;
        self.open_topic(name)?;

        Ok(target)
    }

    // =========================================================================
    // Topic Introspection
    // =========================================================================

    /// Names of the topics on disk, sorted
    pub fn list_topics(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let path = entry.path();
            let desc_path = path.join(DESC_FILENAME);
            if !path.is_dir() || !desc_path.exists() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            match disk::read_json::<TopicDesc>(&desc_path) {
                // backups keep the descriptor of the topic they came from
                Ok(desc) if desc.topic_name == dir_name => names.push(dir_name),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %desc_path.display(), error = %e, "unreadable topic descriptor")
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn topic_exists(&self, name: &str) -> bool {
        validate_topic_name(name).is_ok() && self.directory.join(name).join(DESC_FILENAME).exists()
    }

    /// Number of records of a topic
    pub fn topic_size(&mut self, name: &str) -> Result<u64> {
        self.with_topic(name, |topic| {
            topic.refresh_size()?;
            Ok(topic.size())
        })
    }

    pub fn topic_desc(&mut self, name: &str) -> Result<TopicDesc> {
        Ok(self.open_topic(name)?.desc().clone())
    }

    /// Merge variables into the topic's `topic_var`
    pub fn write_topic_var(&mut self, name: &str, var: &Value) -> Result<()> {
        self.check_master(&format!("write var of {}", name))?;
        self.with_topic(name, |topic| topic.write_var(var))
    }

    /// Replace the topic's `topic_cols`
    pub fn write_topic_cols(&mut self, name: &str, cols: Value) -> Result<()> {
        self.check_master(&format!("write cols of {}", name))?;
        self.with_topic(name, |topic| topic.write_cols(cols))
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Append a record; `t == 0` uses the wall clock
    pub fn append(
        &mut self,
        topic: &str,
        t: u64,
        user_flag: u32,
        payload: &mut Value,
    ) -> Result<IndexRecord> {
        self.check_master(&format!("append to {}", topic))?;
        self.with_topic(topic, |tp| tp.append(t, user_flag, payload))
    }

    pub fn get_record(&mut self, topic: &str, rowid: u64) -> Result<IndexRecord> {
        self.with_topic(topic, |tp| tp.get_record(rowid))
    }

    /// Payload of a record, `None` when deleted or metadata-only
    pub fn read_record_content(
        &mut self,
        topic: &str,
        record: &IndexRecord,
    ) -> Result<Option<Value>> {
        self.with_topic(topic, |tp| tp.read_content(record))
    }

    pub fn first_record(&mut self, topic: &str) -> Result<Option<IndexRecord>> {
        self.with_topic(topic, Topic::first_record)
    }

    pub fn last_record(&mut self, topic: &str) -> Result<Option<IndexRecord>> {
        self.with_topic(topic, Topic::last_record)
    }

    pub fn next_record(&mut self, topic: &str, rowid: u64) -> Result<Option<IndexRecord>> {
        self.with_topic(topic, |tp| tp.next_record(rowid))
    }

    pub fn prev_record(&mut self, topic: &str, rowid: u64) -> Result<Option<IndexRecord>> {
        self.with_topic(topic, |tp| tp.prev_record(rowid))
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Soft-delete a record
    pub fn delete_record(&mut self, topic: &str, rowid: u64) -> Result<IndexRecord> {
        self.check_master(&format!("delete record of {}", topic))?;
        self.with_topic(topic, |tp| tp.delete_record(rowid))
    }

    pub fn write_user_flag(&mut self, topic: &str, rowid: u64, flag: u32) -> Result<IndexRecord> {
        self.check_master(&format!("write user flag of {}", topic))?;
        self.with_topic(topic, |tp| tp.write_user_flag(rowid, flag))
    }

    /// Set or clear the `mask` bits of a record's user flag
    pub fn set_user_flag(
        &mut self,
        topic: &str,
        rowid: u64,
        mask: u32,
        set: bool,
    ) -> Result<IndexRecord> {
        self.check_master(&format!("set user flag of {}", topic))?;
        self.with_topic(topic, |tp| tp.set_user_flag(rowid, mask, set))
    }

    pub fn read_user_flag(&mut self, topic: &str, rowid: u64) -> Result<u32> {
        self.with_topic(topic, |tp| tp.read_user_flag(rowid))
    }

    pub fn write_mark1(&mut self, topic: &str, rowid: u64, mark: bool) -> Result<IndexRecord> {
        self.check_master(&format!("write mark1 of {}", topic))?;
        self.with_topic(topic, |tp| tp.write_mark1(rowid, mark))
    }

    // =========================================================================
    // Lists
    // =========================================================================

    /// Load the filter's range from disk and keep receiving matching appends.
    ///
    /// Without a callback every matching record is collected. A callback
    /// aborting the initial scan leaves the list detached.
    pub fn open_list(
        &mut self,
        topic: &str,
        filter: Filter,
        callback: Option<Box<dyn ListCallback>>,
    ) -> Result<ListHandle> {
        self.open_list_inner(topic, None, filter, callback)
    }

    /// Same as [`Database::open_list`], retrievable later by name
    pub fn open_named_list(
        &mut self,
        topic: &str,
        name: &str,
        filter: Filter,
        callback: Option<Box<dyn ListCallback>>,
    ) -> Result<ListHandle> {
        self.open_list_inner(topic, Some(name.to_string()), filter, callback)
    }

    /// Detach a list from its topic; its collection stays readable
    pub fn close_list(&mut self, list: &ListHandle) -> Result<()> {
        if let Some(topic) = self.topics.get_mut(list.topic()) {
            if topic.detach_list(list.id()).is_some() {
                tracing::debug!(topic = %list.topic(), name = ?list.name(), "list closed");
            }
        }
        Ok(())
    }

    /// Find an open named list
    pub fn get_list(&self, topic: &str, name: &str) -> Option<ListHandle> {
        self.topics.get(topic)?.list_by_name(name)
    }

    fn open_list_inner(
        &mut self,
        topic: &str,
        name: Option<String>,
        filter: Filter,
        callback: Option<Box<dyn ListCallback>>,
    ) -> Result<ListHandle> {
        let id = ListId(self.next_list_id);
        self.next_list_id += 1;

        self.with_topic(topic, |tp| {
            let matcher = Matcher::compile(&filter, tp.system_flag())?;
            let mut list = List::new(id, name, tp.name(), matcher, filter.only_md, callback);

            let completed = tp.scan_list(&mut list)?;
            let handle = list.handle();
            if completed {
                tp.attach_list(list);
            }

            tracing::debug!(
                topic = %tp.name(),
                name = ?handle.name(),
                loaded = handle.len(),
                active = completed,
                "list opened"
            );
            Ok(handle)
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close every topic
    pub fn close(mut self) -> Result<()> {
        let names: Vec<String> = self.topics.keys().cloned().collect();
        for name in names {
            self.close_topic(&name)?;
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn descriptor(&self) -> &DatabaseDesc {
        &self.descriptor
    }

    pub fn is_master(&self) -> bool {
        self.config.is_master()
    }

    /// Names of the topics currently open in this handle
    pub fn open_topics(&self) -> Vec<&str> {
        self.topics.keys().map(String::as_str).collect()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn topic_mut(&mut self, name: &str) -> Result<&mut Topic> {
        if !self.topics.contains_key(name) {
            validate_topic_name(name)?;
            let topic_dir = self.directory.join(name);
            if !topic_dir.join(DESC_FILENAME).exists() {
                if !self.config.is_master() {
                    return Err(TrangerError::NotMaster(format!(
                        "topic {} does not exist and database {} is read-only",
                        name, self.config.database
                    )));
                }
                return Err(TrangerError::NotFound(format!("topic {}", name)));
            }
            let topic = Topic::open(
                &topic_dir,
                self.mask.clone(),
                self.config.is_master(),
                self.config.xpermission,
                self.config.rpermission,
            )?;
            self.topics.insert(name.to_string(), topic);
        }

        self.topics
            .get_mut(name)
            .ok_or_else(|| TrangerError::NotFound(format!("topic {}", name)))
    }

    /// Run an operation on a (lazily opened) topic under the error policy
    fn with_topic<T>(
        &mut self,
        name: &str,
        op: impl FnOnce(&mut Topic) -> Result<T>,
    ) -> Result<T> {
        let policy = self.config.on_critical_error;
        let result = self.topic_mut(name).and_then(op);
        escalate(policy, result)
    }

    fn check_master(&self, what: &str) -> Result<()> {
        if !self.config.is_master() {
            return Err(TrangerError::NotMaster(format!(
                "{}: database {} opened read-only",
                what, self.config.database
            )));
        }
        Ok(())
    }
}

/// Apply the critical-error policy to a result.
///
/// Critical errors were already logged where they were detected.
fn escalate<T>(policy: CriticalErrorPolicy, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_critical() && policy == CriticalErrorPolicy::Abort {
            tracing::error!(error = %e, "critical error, aborting");
            std::process::abort();
        }
    }
    result
}

fn has_entries(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
        _ => true,
    }
}
