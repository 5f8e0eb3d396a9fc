//! Binary Index Log Module
//!
//! One append-only file per topic mapping rowid → record location and
//! metadata.
//!
//! ## Responsibilities
//! - Encode/decode the fixed 96-byte index record
//! - Append records at exactly `(rowid - 1) * 96`
//! - Read back by rowid, verifying the stored rowid
//! - Rewrite flags in place without resizing the file
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Record 1 (96 bytes, little-endian)                            │
//! │ ┌───────┬─────┬────────┬──────┬──────┬────────┬────────┬────┐ │
//! │ │rowid 8│ t 8 │offset 8│size 8│ tm 8 │sflag 4 │uflag 4 │key │ │
//! │ └───────┴─────┴────────┴──────┴──────┴────────┴────────┴─48─┘ │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Record 2 ...                                                  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Integer keys occupy the first 8 bytes of the key field; string keys
//! are raw UTF-8, zero padded.

mod log;
mod record;

pub use log::IndexLog;
pub use record::{IndexRecord, Key, KEY_SIZE, RECORD_SIZE};
