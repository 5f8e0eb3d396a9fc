//! List Module
//!
//! Filtered, ordered, optionally live views over a topic.
//!
//! ## Responsibilities
//! - Hold a compiled filter and the records it collected
//! - Route every candidate record through one callback contract, whether
//!   it came from the initial disk scan or from a later append
//! - Share the collection with the caller while the topic keeps notifying
//!
//! ## Callback Contract
//! ```text
//! on_record(md, payload, loaded_from_disk) -> LoadAction
//!   Skip    the callback owns the record, the list does nothing
//!   Collect attach metadata to the payload and keep it
//!   Abort   stop the scan, or detach the list from live notifications
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::index::IndexRecord;
use crate::matcher::Matcher;

/// Field under which engine metadata is attached to collected payloads
pub const METADATA_FIELD: &str = "__md_tranger__";

/// What the list should do with a delivered record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAction {
    Skip,
    Collect,
    Abort,
}

/// Receiver of a list's records
///
/// Runs inline with the scan or append that produced the record, so it
/// must not call back into the database.
pub trait ListCallback {
    fn on_record(
        &mut self,
        md: &IndexRecord,
        payload: Option<&Value>,
        loaded_from_disk: bool,
    ) -> LoadAction;
}

impl<F> ListCallback for F
where
    F: FnMut(&IndexRecord, Option<&Value>, bool) -> LoadAction,
{
    fn on_record(
        &mut self,
        md: &IndexRecord,
        payload: Option<&Value>,
        loaded_from_disk: bool,
    ) -> LoadAction {
        self(md, payload, loaded_from_disk)
    }
}

/// A collected record
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub md: IndexRecord,
    /// Payload with metadata under [`METADATA_FIELD`]; `None` for
    /// metadata-only lists and deleted records
    pub payload: Option<Value>,
}

/// Identifier of a list within a database handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListId(pub(crate) u64);

#[derive(Debug, Default)]
struct Shared {
    items: RwLock<Vec<ListItem>>,
    active: AtomicBool,
}

/// Caller-side view of an open list
#[derive(Debug, Clone)]
pub struct ListHandle {
    id: ListId,
    topic: String,
    name: Option<String>,
    shared: Arc<Shared>,
}

impl ListHandle {
    pub fn id(&self) -> ListId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the list still receives appends
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.shared.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.items.read().is_empty()
    }

    /// Snapshot of the collected records
    pub fn items(&self) -> Vec<ListItem> {
        self.shared.items.read().clone()
    }

    /// Rowids of the collected records, in collection order
    pub fn rowids(&self) -> Vec<u64> {
        self.shared.items.read().iter().map(|i| i.md.rowid).collect()
    }

    /// Run a closure over the collection without cloning it
    pub fn with_items<R>(&self, f: impl FnOnce(&[ListItem]) -> R) -> R {
        f(&self.shared.items.read())
    }
}

/// Engine-side list, owned by its topic while active
pub struct List {
    id: ListId,
    name: Option<String>,
    topic: String,
    matcher: Matcher,
    only_md: bool,
    callback: Option<Box<dyn ListCallback>>,
    shared: Arc<Shared>,
}

impl List {
    pub(crate) fn new(
        id: ListId,
        name: Option<String>,
        topic: &str,
        matcher: Matcher,
        only_md: bool,
        callback: Option<Box<dyn ListCallback>>,
    ) -> Self {
        Self {
            id,
            name,
            topic: topic.to_string(),
            matcher,
            only_md,
            callback,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn id(&self) -> ListId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn only_md(&self) -> bool {
        self.only_md
    }

    pub(crate) fn handle(&self) -> ListHandle {
        ListHandle {
            id: self.id,
            topic: self.topic.clone(),
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.shared.active.store(active, Ordering::SeqCst);
    }

    /// Hand one record to the callback, collecting it when asked
    pub(crate) fn deliver(
        &mut self,
        md: &IndexRecord,
        payload: Option<Value>,
        loaded_from_disk: bool,
    ) -> LoadAction {
        let action = match self.callback.as_mut() {
            Some(cb) => cb.on_record(md, payload.as_ref(), loaded_from_disk),
            None => LoadAction::Collect,
        };

        if action == LoadAction::Collect {
            let payload = payload.map(|mut p| {
                if let Value::Object(map) = &mut p {
                    map.insert(METADATA_FIELD.to_string(), md.to_metadata());
                }
                p
            });
            self.shared.items.write().push(ListItem {
                md: md.clone(),
                payload,
            });
        }

        action
    }
}
