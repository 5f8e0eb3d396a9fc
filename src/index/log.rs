//! Index Log
//!
//! Reads, appends and rewrites fixed-size records in a topic's index file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::disk;
use crate::error::{Result, TrangerError};
use crate::flags::SystemFlag;

use super::{IndexRecord, RECORD_SIZE};

/// Handle on a topic's binary index file
pub struct IndexLog {
    /// Path of the index file
    path: PathBuf,
    /// Open file handle (read-write for the master)
    file: File,
    /// Whether this handle may write
    writable: bool,
}

impl IndexLog {
    /// Create an empty index file (fails if it already exists)
    pub fn create(path: &Path, rpermission: u32) -> Result<()> {
        disk::writable_options(rpermission)
            .create_new(true)
            .open(path)?;
        Ok(())
    }

    /// Open an existing index file
    pub fn open(path: &Path, writable: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            writable,
        })
    }

    /// Number of records in the file.
    ///
    /// A length that is not a multiple of the record size means a torn
    /// index write and is reported as corruption.
    pub fn record_count(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        if len % RECORD_SIZE as u64 != 0 {
            tracing::error!(
                path = %self.path.display(),
                len,
                "index length is not a multiple of {}",
                RECORD_SIZE
            );
            return Err(TrangerError::Corruption(format!(
                "{}: length {} is not a multiple of {}",
                self.path.display(),
                len,
                RECORD_SIZE
            )));
        }
        Ok(len / RECORD_SIZE as u64)
    }

    /// Append a record at `(rowid - 1) * 96`.
    ///
    /// The file must end exactly at that offset; anything else means the
    /// index and the rowid counter disagree and nothing is written.
    pub fn append(&mut self, record: &IndexRecord) -> Result<()> {
        self.check_writable()?;

        let offset = IndexRecord::file_offset(record.rowid);
        let len = self.file.metadata()?.len();
        if record.rowid == 0 || len != offset {
            tracing::error!(
                path = %self.path.display(),
                rowid = record.rowid,
                expected = offset,
                found = len,
                "index length does not match append offset"
            );
            return Err(TrangerError::Corruption(format!(
                "{}: appending rowid {} expects length {}, found {}",
                self.path.display(),
                record.rowid,
                offset,
                len
            )));
        }

        self.write_at(offset, record)
    }

    /// Read the record of `rowid`, verifying the stored rowid
    pub fn read(&mut self, rowid: u64) -> Result<IndexRecord> {
        if rowid == 0 {
            return Err(TrangerError::Parameter("rowid 0 does not exist".to_string()));
        }

        let offset = IndexRecord::file_offset(rowid);
        let len = self.file.metadata()?.len();
        if offset + RECORD_SIZE as u64 > len {
            return Err(TrangerError::NotFound(format!(
                "{}: rowid {} beyond end of index",
                self.path.display(),
                rowid
            )));
        }

        let mut buf = [0u8; RECORD_SIZE];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;

        let record = IndexRecord::decode(&buf)?;
        if record.rowid != rowid {
            tracing::error!(
                path = %self.path.display(),
                requested = rowid,
                stored = record.rowid,
                "index record rowid mismatch"
            );
            return Err(TrangerError::Corruption(format!(
                "{}: rowid {} stored at the offset of rowid {}",
                self.path.display(),
                record.rowid,
                rowid
            )));
        }

        Ok(record)
    }

    /// Rewrite an existing record in place.
    ///
    /// The record currently at the target offset is read back first and
    /// must carry the same rowid.
    pub fn rewrite(&mut self, record: &IndexRecord) -> Result<()> {
        self.check_writable()?;
        self.read(record.rowid)?;
        self.write_at(IndexRecord::file_offset(record.rowid), record)
    }

    /// Flush file contents to disk
    pub fn sync(&mut self) -> Result<()> {
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write_at(&mut self, offset: u64, record: &IndexRecord) -> Result<()> {
        let mut stored = record.clone();
        stored.system_flag.remove(SystemFlag::LOADING_FROM_DISK);

        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(&stored.encode()))
            .map_err(|e| {
                tracing::error!(
                    path = %self.path.display(),
                    rowid = record.rowid,
                    error = %e,
                    "index write failed"
                );
                TrangerError::storage(&self.path, e)
            })
    }

    fn check_writable(&self) -> Result<()> {
        if !self.writable {
            return Err(TrangerError::NotMaster(format!(
                "{}: index opened read-only",
                self.path.display()
            )));
        }
        Ok(())
    }
}
