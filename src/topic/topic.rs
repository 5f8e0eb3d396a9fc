//! Topic
//!
//! In-memory state of one open topic: descriptor, index log, content
//! store, rowid counter and attached lists. All record-level operations
//! of the engine run here.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::content::{ContentStore, FilenameMask};
use crate::disk;
use crate::error::{Result, TrangerError};
use crate::flags::{KeyType, SystemFlag};
use crate::index::{IndexLog, IndexRecord, Key};
use crate::list::{List, ListHandle, ListId, LoadAction};
use crate::time;

use super::desc::{
    merge_var, TopicDesc, TopicOptions, COLS_FILENAME, DATA_DIRNAME, DESC_FILENAME,
    INDEX_FILENAME, VAR_FILENAME,
};

/// An open topic
pub struct Topic {
    desc: TopicDesc,
    cols: Value,
    var: Value,
    /// `{database}/{topic}`
    directory: PathBuf,
    /// `None` when the topic keeps no index on disk
    index: Option<IndexLog>,
    content: ContentStore,
    /// Highest rowid assigned so far
    last_rowid: u64,
    writable: bool,
    rpermission: u32,
    /// Lists receiving appends
    lists: Vec<List>,
}

impl Topic {
    /// Lay out a new topic directory: descriptors, empty index, data dir
    pub fn create(
        directory: &Path,
        options: &TopicOptions,
        xpermission: u32,
        rpermission: u32,
    ) -> Result<()> {
        options.desc.validate()?;

        disk::create_dir(directory, xpermission)?;
        disk::create_dir(&directory.join(DATA_DIRNAME), xpermission)?;

        disk::write_json(&directory.join(DESC_FILENAME), &options.desc, rpermission)?;
        disk::write_json(&directory.join(VAR_FILENAME), &options.var, rpermission)?;
        disk::write_json(&directory.join(COLS_FILENAME), &options.cols, rpermission)?;

        IndexLog::create(&directory.join(INDEX_FILENAME), rpermission)?;
        Ok(())
    }

    /// Open an existing topic directory
    pub fn open(
        directory: &Path,
        mask: FilenameMask,
        writable: bool,
        xpermission: u32,
        rpermission: u32,
    ) -> Result<Self> {
        let desc: TopicDesc = disk::read_json(&directory.join(DESC_FILENAME))?;
        let var = read_optional_json(&directory.join(VAR_FILENAME))?;
        let cols = read_optional_json(&directory.join(COLS_FILENAME))?;

        let (index, last_rowid) = if desc.system_flag.has_index() {
            let index = IndexLog::open(&directory.join(INDEX_FILENAME), writable)?;
            let count = index.record_count()?;
            (Some(index), count)
        } else {
            (None, 0)
        };

        let content = ContentStore::new(
            &desc.topic_name,
            &directory.join(DATA_DIRNAME),
            mask,
            writable,
            xpermission,
            rpermission,
        );

        tracing::debug!(topic = %desc.topic_name, last_rowid, writable, "topic opened");

        Ok(Self {
            desc,
            cols,
            var,
            directory: directory.to_path_buf(),
            index,
            content,
            last_rowid,
            writable,
            rpermission,
            lists: Vec::new(),
        })
    }

    // =========================================================================
    // Append Path
    // =========================================================================

    /// Append a record.
    ///
    /// `t == 0` uses the wall clock. The payload must be a JSON object; the
    /// resolved key is written back into it for rowid and defaulted
    /// integer keys.
    pub fn append(&mut self, t: u64, user_flag: u32, payload: &mut Value) -> Result<IndexRecord> {
        self.check_writable()?;

        let system_flag = self.desc.system_flag.inherited();
        let rowid = self.last_rowid + 1;
        let t = if t == 0 {
            time::now(self.t_ms())
        } else {
            t
        };

        let (tm, key) = {
            let map = payload.as_object_mut().ok_or_else(|| {
                TrangerError::Parameter(format!(
                    "topic {}: payload must be a JSON object",
                    self.desc.topic_name
                ))
            })?;
            (self.extract_tm(map), self.resolve_key(map, rowid)?)
        };

        let mut record = IndexRecord {
            rowid,
            t,
            offset: 0,
            size: 0,
            tm,
            system_flag,
            user_flag,
            key,
        };

        if system_flag.has_content() {
            let mut bytes = serde_json::to_vec(payload)?;
            bytes.push(b'\n');
            let t_ms = self.t_ms();
            let (offset, size) = self.content.write(t, t_ms, &bytes)?;
            record.offset = offset;
            record.size = size;
        }

        if let Some(index) = self.index.as_mut() {
            index.append(&record)?;
        }
        self.last_rowid = rowid;

        self.notify(&record, payload);
        Ok(record)
    }

    fn extract_tm(&self, map: &Map<String, Value>) -> u64 {
        let Some(tkey) = self.desc.tkey.as_deref() else {
            return 0;
        };
        match map.get(tkey) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(0),
            Some(Value::String(s)) => match time::parse_date(s) {
                Some(secs) if self.desc.system_flag.contains(SystemFlag::TM_MS) => {
                    secs.checked_mul(1000).unwrap_or(0)
                }
                Some(secs) => secs,
                None => 0,
            },
            _ => 0,
        }
    }

    fn resolve_key(&self, map: &mut Map<String, Value>, rowid: u64) -> Result<Key> {
        let pkey = self.desc.pkey.as_str();

        match self.key_type() {
            KeyType::Str => match map.get(pkey) {
                Some(Value::String(s)) if s.contains('\0') => Err(TrangerError::Parameter(format!(
                    "topic {}: key '{}' contains a NUL byte",
                    self.desc.topic_name, pkey
                ))),
                Some(Value::String(s)) if !s.is_empty() => {
                    let (key, truncated) = Key::truncated(s);
                    if truncated {
                        tracing::warn!(
                            topic = %self.desc.topic_name,
                            key = %s,
                            "key longer than the key field, truncated"
                        );
                    }
                    Ok(key)
                }
                _ => Err(TrangerError::Parameter(format!(
                    "topic {}: payload lacks string key '{}'",
                    self.desc.topic_name, pkey
                ))),
            },
            KeyType::Rowid => {
                map.insert(pkey.to_string(), Value::from(rowid));
                Ok(Key::Int(rowid))
            }
            KeyType::Int => {
                // missing, null, empty or zero keys default to the rowid
                let explicit = match map.get(pkey) {
                    None | Some(Value::Null) => None,
                    Some(Value::Number(n)) => Some(n.as_u64()),
                    Some(Value::String(s)) if s.trim().is_empty() => None,
                    Some(Value::String(s)) => Some(s.trim().parse().ok()),
                    Some(_) => Some(None),
                };
                match explicit {
                    Some(Some(v)) if v != 0 => Ok(Key::Int(v)),
                    Some(None) => Err(TrangerError::Parameter(format!(
                        "topic {}: key '{}' is not an unsigned integer",
                        self.desc.topic_name, pkey
                    ))),
                    _ => {
                        map.insert(pkey.to_string(), Value::from(rowid));
                        Ok(Key::Int(rowid))
                    }
                }
            }
        }
    }

    fn notify(&mut self, record: &IndexRecord, payload: &Value) {
        if self.lists.is_empty() {
            return;
        }

        let total = self.last_rowid;
        let mut aborted = Vec::new();
        for list in self.lists.iter_mut() {
            if !list.matcher().matches(record, total).matched {
                continue;
            }
            let payload = (!list.only_md()).then(|| payload.clone());
            if list.deliver(record, payload, false) == LoadAction::Abort {
                aborted.push(list.id());
            }
        }

        for id in aborted {
            if self.detach_list(id).is_some() {
                tracing::debug!(topic = %self.desc.topic_name, "list aborted on append, detached");
            }
        }
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Index record of `rowid`
    pub fn get_record(&mut self, rowid: u64) -> Result<IndexRecord> {
        if rowid == 0 {
            return Err(TrangerError::Parameter("rowid 0 does not exist".to_string()));
        }
        if rowid > self.last_rowid {
            self.refresh_size()?;
        }
        if rowid > self.last_rowid {
            return Err(TrangerError::NotFound(format!(
                "topic {}: rowid {} beyond last rowid {}",
                self.desc.topic_name, rowid, self.last_rowid
            )));
        }

        let topic = &self.desc.topic_name;
        let index = self.index.as_mut().ok_or_else(|| {
            TrangerError::NotFound(format!("topic {}: no index on disk", topic))
        })?;
        index.read(rowid)
    }

    /// Payload of a record; `None` when deleted or metadata-only
    pub fn read_content(&mut self, record: &IndexRecord) -> Result<Option<Value>> {
        if record.is_deleted() || !record.system_flag.has_content() {
            return Ok(None);
        }
        let t_ms = self.t_ms();
        let bytes = self.content.read(record, t_ms)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub fn first_record(&mut self) -> Result<Option<IndexRecord>> {
        self.refresh_size()?;
        self.live_from(1, false)
    }

    pub fn last_record(&mut self) -> Result<Option<IndexRecord>> {
        self.refresh_size()?;
        self.live_from(self.last_rowid, true)
    }

    pub fn next_record(&mut self, rowid: u64) -> Result<Option<IndexRecord>> {
        match rowid.checked_add(1) {
            Some(next) => self.live_from(next, false),
            None => Ok(None),
        }
    }

    pub fn prev_record(&mut self, rowid: u64) -> Result<Option<IndexRecord>> {
        if rowid <= 1 {
            return Ok(None);
        }
        self.live_from(rowid - 1, true)
    }

    /// First record at or after (before, when `backward`) `rowid` that is
    /// not soft-deleted
    fn live_from(&mut self, mut rowid: u64, backward: bool) -> Result<Option<IndexRecord>> {
        if self.index.is_none() {
            return Ok(None);
        }
        while rowid >= 1 && rowid <= self.last_rowid {
            let record = self.get_record(rowid)?;
            if !record.is_deleted() {
                return Ok(Some(record));
            }
            rowid = if backward { rowid - 1 } else { rowid + 1 };
        }
        Ok(None)
    }

    /// Readers pick up records appended by the master since the last look
    pub(crate) fn refresh_size(&mut self) -> Result<()> {
        if self.writable {
            return Ok(());
        }
        if let Some(index) = self.index.as_ref() {
            self.last_rowid = index.record_count()?;
        }
        Ok(())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Soft-delete: flag the index record, then zero its content.
    ///
    /// Deleting an already deleted record is a no-op.
    pub fn delete_record(&mut self, rowid: u64) -> Result<IndexRecord> {
        self.check_writable()?;

        let mut record = self.get_record(rowid)?;
        if record.is_deleted() {
            return Ok(record);
        }

        record.system_flag.insert(SystemFlag::DELETED);
        self.rewrite(&record)?;

        if record.system_flag.has_content() && record.size > 0 {
            let t_ms = self.t_ms();
            self.content.blank(&record, t_ms)?;
        }

        tracing::debug!(topic = %self.desc.topic_name, rowid, "record deleted");
        Ok(record)
    }

    /// Replace a record's user flag
    pub fn write_user_flag(&mut self, rowid: u64, user_flag: u32) -> Result<IndexRecord> {
        self.update_record(rowid, |r| r.user_flag = user_flag)
    }

    /// Set (`set == true`) or clear the bits of `mask` in a record's user flag
    pub fn set_user_flag(&mut self, rowid: u64, mask: u32, set: bool) -> Result<IndexRecord> {
        self.update_record(rowid, |r| {
            if set {
                r.user_flag |= mask;
            } else {
                r.user_flag &= !mask;
            }
        })
    }

    pub fn read_user_flag(&mut self, rowid: u64) -> Result<u32> {
        Ok(self.get_record(rowid)?.user_flag)
    }

    /// Set or clear the auxiliary mark1 bit
    pub fn write_mark1(&mut self, rowid: u64, mark: bool) -> Result<IndexRecord> {
        self.update_record(rowid, |r| {
            if mark {
                r.system_flag.insert(SystemFlag::MARK1);
            } else {
                r.system_flag.remove(SystemFlag::MARK1);
            }
        })
    }

    fn update_record(
        &mut self,
        rowid: u64,
        update: impl FnOnce(&mut IndexRecord),
    ) -> Result<IndexRecord> {
        self.check_writable()?;
        let mut record = self.get_record(rowid)?;
        update(&mut record);
        self.rewrite(&record)?;
        Ok(record)
    }

    fn rewrite(&mut self, record: &IndexRecord) -> Result<()> {
        let topic = &self.desc.topic_name;
        let index = self.index.as_mut().ok_or_else(|| {
            TrangerError::NotFound(format!("topic {}: no index on disk", topic))
        })?;
        index.rewrite(record)
    }

    // =========================================================================
    // Topic Metadata
    // =========================================================================

    /// Merge variables into `topic_var`
    pub fn write_var(&mut self, update: &Value) -> Result<()> {
        self.check_writable()?;
        merge_var(&mut self.var, update);
        disk::write_json(&self.directory.join(VAR_FILENAME), &self.var, self.rpermission)
    }

    /// Replace `topic_cols`
    pub fn write_cols(&mut self, cols: Value) -> Result<()> {
        self.check_writable()?;
        self.cols = cols;
        disk::write_json(&self.directory.join(COLS_FILENAME), &self.cols, self.rpermission)
    }

    // =========================================================================
    // Lists
    // =========================================================================

    /// Replay the list's range from disk.
    ///
    /// Returns `false` when the callback aborted the scan.
    pub(crate) fn scan_list(&mut self, list: &mut List) -> Result<bool> {
        self.refresh_size()?;
        let total = self.last_rowid;
        let backward = list.matcher().is_backward();

        let mut cursor = match list.matcher().start_rowid(total) {
            Some(start) => self.live_from(start, backward)?,
            None => None,
        };

        while let Some(mut record) = cursor {
            let m = list.matcher().matches(&record, total);
            if m.end {
                break;
            }
            if m.matched {
                record.system_flag.insert(SystemFlag::LOADING_FROM_DISK);
                let payload = if list.only_md() {
                    None
                } else {
                    self.read_content(&record)?
                };
                if list.deliver(&record, payload, true) == LoadAction::Abort {
                    return Ok(false);
                }
            }
            cursor = if backward {
                self.prev_record(record.rowid)?
            } else {
                self.next_record(record.rowid)?
            };
        }

        Ok(true)
    }

    pub(crate) fn attach_list(&mut self, list: List) {
        list.set_active(true);
        self.lists.push(list);
    }

    pub(crate) fn detach_list(&mut self, id: ListId) -> Option<List> {
        let pos = self.lists.iter().position(|l| l.id() == id)?;
        let list = self.lists.remove(pos);
        list.set_active(false);
        Some(list)
    }

    pub(crate) fn list_by_name(&self, name: &str) -> Option<ListHandle> {
        self.lists
            .iter()
            .find(|l| l.name() == Some(name))
            .map(List::handle)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Detach every list, flush and drop cached file handles
    pub(crate) fn close(&mut self) -> Result<()> {
        for list in self.lists.drain(..) {
            list.set_active(false);
        }
        self.content.sync()?;
        self.content.close_all();
        if let Some(index) = self.index.as_mut() {
            index.sync()?;
        }
        tracing::debug!(topic = %self.desc.topic_name, "topic closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.desc.topic_name
    }

    pub fn desc(&self) -> &TopicDesc {
        &self.desc
    }

    pub fn pkey(&self) -> &str {
        &self.desc.pkey
    }

    pub fn tkey(&self) -> Option<&str> {
        self.desc.tkey.as_deref()
    }

    pub fn system_flag(&self) -> SystemFlag {
        self.desc.system_flag
    }

    pub fn key_type(&self) -> KeyType {
        self.desc.system_flag.key_type()
    }

    pub fn cols(&self) -> &Value {
        &self.cols
    }

    pub fn var(&self) -> &Value {
        &self.var
    }

    /// Number of records, equal to the last rowid
    pub fn size(&self) -> u64 {
        self.last_rowid
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    /// Path of the content bucket holding records written at `t`
    pub fn bucket_path(&self, t: u64) -> Result<PathBuf> {
        self.content.bucket_path(t, self.t_ms())
    }

    pub fn open_files(&self) -> usize {
        self.content.open_files()
    }

    fn t_ms(&self) -> bool {
        self.desc.system_flag.contains(SystemFlag::T_MS)
    }

    fn check_writable(&self) -> Result<()> {
        if !self.writable {
            return Err(TrangerError::NotMaster(format!(
                "topic {}: database opened read-only",
                self.desc.topic_name
            )));
        }
        Ok(())
    }
}

fn read_optional_json(path: &Path) -> Result<Value> {
    if path.exists() {
        disk::read_json(path)
    } else {
        Ok(Value::Object(Map::new()))
    }
}
