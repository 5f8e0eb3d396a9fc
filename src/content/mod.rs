//! Content Store Module
//!
//! Variable-size record payloads, partitioned into bucket files by time.
//!
//! ## Responsibilities
//! - Map a record time to a bucket name through the filename mask
//! - Append serialized payloads at the end of their bucket
//! - Read payload bytes back by (offset, size)
//! - Blank deleted payloads in place
//! - Cache one open handle per bucket
//!
//! ## Layout
//! ```text
//! {topic}/data/
//!   ├── {topic}-2024-01-01.json   one compact JSON document per line
//!   ├── {topic}-2024-01-02.json
//!   └── ...
//! ```
//!
//! Records never span buckets; `offset`/`size` in the index record are
//! relative to the bucket chosen by the record's `t`.

mod mask;
mod store;

pub use mask::FilenameMask;
pub use store::ContentStore;
