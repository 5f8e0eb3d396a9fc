//! Topic Module
//!
//! A topic is a named, independently indexed series of records.
//!
//! ## Responsibilities
//! - Create and open topic directories and their descriptor files
//! - Own the topic's index log, content store and rowid counter
//! - Run the append, read, navigation and flag-mutation paths
//! - Notify attached lists of every append
//!
//! ## Layout
//! ```text
//! {database}/{topic}/
//!   ├── topic_desc    name, pkey, tkey, system_flag (immutable)
//!   ├── topic_var     free-form variables (mutable)
//!   ├── topic_cols    column description (opaque)
//!   ├── topic_idx     binary index log
//!   └── data/         content buckets
//! ```

mod desc;
#[allow(clippy::module_inception)]
mod topic;

pub use desc::{validate_topic_name, TopicDesc, TopicOptions};
pub use topic::Topic;

pub(crate) use desc::DESC_FILENAME;
