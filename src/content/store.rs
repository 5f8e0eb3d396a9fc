//! Content Store
//!
//! Bucket files of one topic and their cached handles.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::disk;
use crate::error::{Result, TrangerError};
use crate::index::IndexRecord;

use super::FilenameMask;

/// Payload storage of one topic
pub struct ContentStore {
    /// Topic name, prefix of every bucket file
    topic: String,
    /// `{topic}/data`
    data_dir: PathBuf,
    /// Bucket naming pattern
    mask: FilenameMask,
    /// Open handles keyed by bucket name
    files: HashMap<String, File>,
    /// Whether buckets may be created and written
    writable: bool,
    xpermission: u32,
    rpermission: u32,
}

impl ContentStore {
    pub fn new(
        topic: &str,
        data_dir: &Path,
        mask: FilenameMask,
        writable: bool,
        xpermission: u32,
        rpermission: u32,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            data_dir: data_dir.to_path_buf(),
            mask,
            files: HashMap::new(),
            writable,
            xpermission,
            rpermission,
        }
    }

    /// Append bytes to the bucket of `t`, returning `(offset, size)`
    pub fn write(&mut self, t: u64, in_ms: bool, bytes: &[u8]) -> Result<(u64, u64)> {
        self.check_writable()?;
        let bucket = self.mask.bucket(t, in_ms)?;
        let file = self.bucket_file(&bucket, true)?;

        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;

        Ok((offset, bytes.len() as u64))
    }

    /// Read the content bytes of a record
    pub fn read(&mut self, record: &IndexRecord, in_ms: bool) -> Result<Vec<u8>> {
        let bucket = self.mask.bucket(record.t, in_ms)?;
        let file = self.bucket_file(&bucket, false)?;

        let mut buf = vec![0u8; record.size as usize];
        file.seek(SeekFrom::Start(record.offset))?;
        match file.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::error!(
                    topic = %self.topic,
                    bucket = %bucket,
                    rowid = record.rowid,
                    offset = record.offset,
                    size = record.size,
                    "content read short"
                );
                Err(TrangerError::Corruption(format!(
                    "topic {}: rowid {} content read short in bucket {}",
                    self.topic, record.rowid, bucket
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite a record's content with zeros, keeping offset and size
    pub fn blank(&mut self, record: &IndexRecord, in_ms: bool) -> Result<()> {
        self.check_writable()?;
        let bucket = self.mask.bucket(record.t, in_ms)?;
        let file = self.bucket_file(&bucket, false)?;

        file.seek(SeekFrom::Start(record.offset))?;
        file.write_all(&vec![0u8; record.size as usize])?;
        Ok(())
    }

    /// Path of the bucket file holding content written at `t`
    pub fn bucket_path(&self, t: u64, in_ms: bool) -> Result<PathBuf> {
        let bucket = self.mask.bucket(t, in_ms)?;
        Ok(self.path_of(&bucket))
    }

    /// Drop every cached handle
    pub fn close_all(&mut self) {
        self.files.clear();
    }

    /// Flush cached handles to disk
    pub fn sync(&mut self) -> Result<()> {
        if self.writable {
            for file in self.files.values_mut() {
                file.sync_data()?;
            }
        }
        Ok(())
    }

    pub fn open_files(&self) -> usize {
        self.files.len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn path_of(&self, bucket: &str) -> PathBuf {
        self.data_dir.join(format!("{}-{}.json", self.topic, bucket))
    }

    fn bucket_file(&mut self, bucket: &str, create: bool) -> Result<&mut File> {
        if !self.files.contains_key(bucket) {
            let file = match self.open_bucket(bucket, create) {
                Err(TrangerError::Io(e)) if disk::is_too_many_open_files(&e) => {
                    tracing::warn!(
                        topic = %self.topic,
                        cached = self.files.len(),
                        "too many open files, closing cached buckets and retrying"
                    );
                    self.files.clear();
                    self.open_bucket(bucket, create)?
                }
                other => other?,
            };
            self.files.insert(bucket.to_string(), file);
        }

        self.files.get_mut(bucket).ok_or_else(|| {
            TrangerError::NotFound(format!("topic {}: bucket {} not cached", self.topic, bucket))
        })
    }

    fn open_bucket(&self, bucket: &str, create: bool) -> Result<File> {
        let path = self.path_of(bucket);

        let opened = if self.writable && create {
            if let Some(parent) = path.parent() {
                disk::create_dir(parent, self.xpermission)?;
            }
            disk::writable_options(self.rpermission).open(&path)
        } else {
            OpenOptions::new().read(true).write(self.writable).open(&path)
        };

        match opened {
            Ok(file) => {
                tracing::debug!(topic = %self.topic, path = %path.display(), "bucket opened");
                Ok(file)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TrangerError::NotFound(format!(
                "content file {}",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if !self.writable {
            return Err(TrangerError::NotMaster(format!(
                "topic {}: content opened read-only",
                self.topic
            )));
        }
        Ok(())
    }
}
