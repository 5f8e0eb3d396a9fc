//! Index record definitions
//!
//! The 96-byte index record and its explicit binary codec.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TrangerError};
use crate::flags::SystemFlag;

/// Size of one index record on disk
pub const RECORD_SIZE: usize = 96;

/// Size of the key field
pub const KEY_SIZE: usize = 48;

/// Offset of the key field inside a record
const KEY_OFFSET: usize = RECORD_SIZE - KEY_SIZE;

/// Primary key of a record; the kind is fixed by the topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(u64),
    Str(String),
}

impl Key {
    /// Build a string key, truncating at a char boundary to fit the key field.
    ///
    /// Returns the key and whether truncation happened.
    pub fn truncated(s: &str) -> (Key, bool) {
        if s.len() <= KEY_SIZE {
            return (Key::Str(s.to_string()), false);
        }
        let mut end = KEY_SIZE;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        (Key::Str(s[..end].to_string()), true)
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            Key::Int(v) => Some(*v),
            Key::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            Key::Int(_) => None,
        }
    }
}

impl Default for Key {
    fn default() -> Self {
        Key::Int(0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{}", v),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Self {
        Key::Int(v)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

/// Metadata of one logical record as stored in the index log
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexRecord {
    /// 1-based, dense, never reused
    #[serde(rename = "__rowid__")]
    pub rowid: u64,

    /// Wall-clock append time (seconds or ms per topic flag)
    #[serde(rename = "__t__")]
    pub t: u64,

    /// Byte offset of the content inside its bucket file
    #[serde(rename = "__offset__")]
    pub offset: u64,

    /// Content size in bytes
    #[serde(rename = "__size__")]
    pub size: u64,

    /// Time extracted from the payload's time-key field
    #[serde(rename = "__tm__")]
    pub tm: u64,

    #[serde(rename = "__system_flag__")]
    pub system_flag: SystemFlag,

    #[serde(rename = "__user_flag__")]
    pub user_flag: u32,

    #[serde(rename = "__key__")]
    pub key: Key,
}

impl IndexRecord {
    /// Byte offset of a rowid's record in the index file
    pub fn file_offset(rowid: u64) -> u64 {
        rowid.saturating_sub(1) * RECORD_SIZE as u64
    }

    /// Encode to the on-disk layout
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = BytesMut::with_capacity(RECORD_SIZE);
        buf.put_u64_le(self.rowid);
        buf.put_u64_le(self.t);
        buf.put_u64_le(self.offset);
        buf.put_u64_le(self.size);
        buf.put_u64_le(self.tm);
        buf.put_u32_le(self.system_flag.bits());
        buf.put_u32_le(self.user_flag);

        match &self.key {
            Key::Int(v) => {
                buf.put_u64_le(*v);
                buf.put_bytes(0, KEY_SIZE - 8);
            }
            Key::Str(s) => {
                let bytes = s.as_bytes();
                let n = bytes.len().min(KEY_SIZE);
                buf.put_slice(&bytes[..n]);
                buf.put_bytes(0, KEY_SIZE - n);
            }
        }

        let mut out = [0u8; RECORD_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Decode from the on-disk layout.
    ///
    /// The key kind is taken from the stored system flag.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RECORD_SIZE {
            return Err(TrangerError::Corruption(format!(
                "index record must be {} bytes, got {}",
                RECORD_SIZE,
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let rowid = buf.get_u64_le();
        let t = buf.get_u64_le();
        let offset = buf.get_u64_le();
        let size = buf.get_u64_le();
        let tm = buf.get_u64_le();
        let system_flag = SystemFlag(buf.get_u32_le());
        let user_flag = buf.get_u32_le();

        let raw_key = &bytes[KEY_OFFSET..];
        let key = if system_flag.key_type().is_integer() {
            let mut k = &raw_key[..8];
            Key::Int(k.get_u64_le())
        } else {
            let end = raw_key.iter().position(|&b| b == 0).unwrap_or(KEY_SIZE);
            let s = std::str::from_utf8(&raw_key[..end]).map_err(|e| {
                TrangerError::Corruption(format!("rowid {}: key is not UTF-8: {}", rowid, e))
            })?;
            Key::Str(s.to_string())
        };

        Ok(Self {
            rowid,
            t,
            offset,
            size,
            tm,
            system_flag,
            user_flag,
            key,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.system_flag.is_deleted()
    }

    pub fn loaded_from_disk(&self) -> bool {
        self.system_flag.contains(SystemFlag::LOADING_FROM_DISK)
    }

    /// Engine metadata as a JSON object, attached to collected payloads
    pub fn to_metadata(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
