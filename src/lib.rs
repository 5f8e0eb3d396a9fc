//! # timeranger
//!
//! An embedded time-series key/value storage engine with:
//! - Append-only topics of timestamped, keyed JSON records
//! - A fixed-size (96-byte) binary index log per topic
//! - Content files bucketed by a time-based filename mask
//! - Range/key filtering and live list subscriptions
//! - Single-writer/multi-reader access per database
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Database                               │
//! │              (master / read-only handle)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ owns
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Topic                                 │
//! │            (descriptor, last rowid, lists)                   │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │ notify
//!        ▼                      ▼                      ▼
//!  ┌─────────────┐      ┌──────────────┐       ┌─────────────┐
//!  │  Index Log  │      │ Content Store│       │    Lists    │
//!  │ (96 B/rec)  │      │  (buckets)   │       │  (Matcher)  │
//!  └─────────────┘      └──────────────┘       └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod flags;
pub mod time;

mod disk;

pub mod index;
pub mod content;
pub mod topic;
pub mod matcher;
pub mod list;
pub mod database;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{TrangerError, Result};
pub use config::{AccessMode, Config, CriticalErrorPolicy};
pub use database::Database;
pub use flags::{KeyType, SystemFlag};
pub use index::{IndexRecord, Key};
pub use list::{ListCallback, ListHandle, ListItem, LoadAction};
pub use matcher::{Filter, MatchResult};
pub use topic::{Topic, TopicDesc, TopicOptions};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of timeranger
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
