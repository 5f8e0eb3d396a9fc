//! System flags
//!
//! Per-topic bitmask fixed at creation, inherited by every index record.
//! The high byte is reserved for per-record overlays that are never
//! inherited from the topic.
//!
//! ```text
//! 0x0000_000F  key type      STRING_KEY | ROWID_KEY | INT_KEY
//! 0x0000_00F0  storage       ZIP_RECORD | CIPHER_RECORD
//! 0x0000_0F00  time units    T_MS | TM_MS
//! 0x0000_F000  persistence   NO_RECORD_DISK | NO_MD_DISK
//! 0xFF00_0000  overlays      LOADING_FROM_DISK | MARK1 | DELETED
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bitmask describing a topic (and, with overlays, a record)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemFlag(pub u32);

impl SystemFlag {
    pub const NONE: SystemFlag = SystemFlag(0);

    pub const STRING_KEY: SystemFlag = SystemFlag(0x0000_0001);
    pub const ROWID_KEY: SystemFlag = SystemFlag(0x0000_0002);
    pub const INT_KEY: SystemFlag = SystemFlag(0x0000_0004);
    pub const KEY_TYPE_MASK: SystemFlag = SystemFlag(0x0000_000F);

    pub const ZIP_RECORD: SystemFlag = SystemFlag(0x0000_0010);
    pub const CIPHER_RECORD: SystemFlag = SystemFlag(0x0000_0020);

    /// `t` is stored in milliseconds
    pub const T_MS: SystemFlag = SystemFlag(0x0000_0100);
    /// `tm` is stored in milliseconds
    pub const TM_MS: SystemFlag = SystemFlag(0x0000_0200);

    /// Metadata only, no content file
    pub const NO_RECORD_DISK: SystemFlag = SystemFlag(0x0000_1000);
    /// No index record on disk
    pub const NO_MD_DISK: SystemFlag = SystemFlag(0x0000_2000);

    /// Set on records delivered by a disk scan, never persisted
    pub const LOADING_FROM_DISK: SystemFlag = SystemFlag(0x0100_0000);
    pub const MARK1: SystemFlag = SystemFlag(0x0200_0000);
    pub const DELETED: SystemFlag = SystemFlag(0x8000_0000);
    pub const NOT_INHERITED_MASK: SystemFlag = SystemFlag(0xFF00_0000);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: SystemFlag) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: SystemFlag) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: SystemFlag) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: SystemFlag) {
        self.0 &= !other.0;
    }

    /// The part a record inherits from its topic
    pub fn inherited(self) -> SystemFlag {
        SystemFlag(self.0 & !Self::NOT_INHERITED_MASK.0)
    }

    /// Key type declared by this flag; no key bits means rowid keys
    pub fn key_type(self) -> KeyType {
        if self.contains(Self::STRING_KEY) {
            KeyType::Str
        } else if self.contains(Self::INT_KEY) {
            KeyType::Int
        } else {
            KeyType::Rowid
        }
    }

    pub fn is_deleted(self) -> bool {
        self.contains(Self::DELETED)
    }

    /// Records of this topic have content bytes in a bucket file
    pub fn has_content(self) -> bool {
        !self.contains(Self::NO_RECORD_DISK)
    }

    /// Records of this topic have an index record on disk
    pub fn has_index(self) -> bool {
        !(self.contains(Self::NO_RECORD_DISK) && self.contains(Self::NO_MD_DISK))
    }
}

impl BitOr for SystemFlag {
    type Output = SystemFlag;

    fn bitor(self, rhs: SystemFlag) -> SystemFlag {
        SystemFlag(self.0 | rhs.0)
    }
}

impl BitOrAssign for SystemFlag {
    fn bitor_assign(&mut self, rhs: SystemFlag) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for SystemFlag {
    type Output = SystemFlag;

    fn bitand(self, rhs: SystemFlag) -> SystemFlag {
        SystemFlag(self.0 & rhs.0)
    }
}

impl fmt::Display for SystemFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Kind of primary key a topic uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// String key read from the payload, at most 48 bytes on disk
    Str,
    /// Integer key read from the payload, defaulting to the rowid
    Int,
    /// The rowid itself, written back into the payload
    Rowid,
}

impl KeyType {
    pub fn is_integer(self) -> bool {
        !matches!(self, KeyType::Str)
    }
}
