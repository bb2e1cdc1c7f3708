// ── Generic reactive entity collection ──
//
// An ordered, copy-on-write sequence published through a `watch` channel.
// Every mutation builds a NEW snapshot vector: consumers holding the old
// `Arc` never observe a half-applied state, and reference equality is a
// valid change check.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::watch;

use crate::error::SyncError;
use crate::model::Entity;

/// A reactive collection for a single entity type.
///
/// Identifier uniqueness is the caller's responsibility: `add` accepts a
/// duplicate id, which then coexists with the original. `update` and
/// `delete` act on every matching record.
pub struct EntityCollection<T: Entity> {
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,

    /// Monotonic refresh tickets. A wholesale replacement is applied only
    /// if no newer ticket has already been applied, so a slow response
    /// overtaken by a later refresh cannot clobber newer data.
    issued: AtomicU64,
    applied: Mutex<u64>,
}

impl<T: Entity> EntityCollection<T> {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            snapshot,
            issued: AtomicU64::new(0),
            applied: Mutex::new(0),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    /// First record whose id matches, if any.
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.snapshot.borrow().iter().find(|r| r.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.borrow().is_empty()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Replace the whole collection.
    pub fn replace_all(&self, items: Vec<T>) {
        let items: Vec<Arc<T>> = items.into_iter().map(Arc::new).collect();
        self.snapshot.send_modify(|snap| *snap = Arc::new(items));
    }

    /// Append a record. Identifier uniqueness is NOT enforced.
    pub fn add(&self, item: T) {
        self.snapshot.send_modify(|snap| {
            let mut items: Vec<Arc<T>> = snap.as_ref().clone();
            items.push(Arc::new(item));
            *snap = Arc::new(items);
        });
    }

    /// Shallow-merge a JSON object patch over the record(s) matching `id`.
    ///
    /// An unknown `id` is a silent no-op (`Ok(false)`, nothing notified).
    /// A patch that is not an object, or that produces a record failing
    /// typed validation, is an error and leaves the collection untouched.
    pub fn update(&self, id: &str, patch: &Value) -> Result<bool, SyncError> {
        let patch = patch.as_object().ok_or_else(|| SyncError::Validation {
            message: "update patch must be a JSON object".into(),
        })?;

        let mut touched = false;
        let mut failure: Option<SyncError> = None;

        self.snapshot.send_if_modified(|snap| {
            if !snap.iter().any(|r| r.id() == id) {
                return false;
            }

            let mut items = Vec::with_capacity(snap.len());
            for record in snap.iter() {
                if record.id() == id {
                    match merge_record(record.as_ref(), patch) {
                        Ok(merged) => items.push(Arc::new(merged)),
                        Err(e) => {
                            failure = Some(e);
                            return false;
                        }
                    }
                } else {
                    items.push(Arc::clone(record));
                }
            }

            touched = true;
            *snap = Arc::new(items);
            true
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(touched),
        }
    }

    /// Remove the record(s) matching `id`. No-op when absent.
    pub fn delete(&self, id: &str) -> bool {
        let mut removed = false;
        self.snapshot.send_if_modified(|snap| {
            let before = snap.len();
            let items: Vec<Arc<T>> = snap.iter().filter(|r| r.id() != id).cloned().collect();
            if items.len() == before {
                return false;
            }
            removed = true;
            *snap = Arc::new(items);
            true
        });
        removed
    }

    // ── Refresh sequencing ───────────────────────────────────────────

    /// Hand out a monotonic ticket before starting a refresh fetch.
    pub fn begin_refresh(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Apply a refresh result. Returns `false` (and drops the items) when a
    /// newer ticket has already been applied.
    pub fn apply_refresh(&self, ticket: u64, items: Vec<T>) -> bool {
        let mut applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
        if ticket <= *applied {
            return false;
        }
        *applied = ticket;
        self.replace_all(items);
        true
    }
}

impl<T: Entity> Default for EntityCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize, overlay the patch's top-level keys, deserialize. The typed
/// round trip is the validation boundary for patched records.
fn merge_record<T: Entity>(
    current: &T,
    patch: &serde_json::Map<String, Value>,
) -> Result<T, SyncError> {
    let mut value = serde_json::to_value(current)
        .map_err(|e| SyncError::Internal(format!("entity failed to serialize: {e}")))?;

    let Value::Object(map) = &mut value else {
        return Err(SyncError::Internal("entity did not serialize to an object".into()));
    };
    for (key, patched) in patch {
        map.insert(key.clone(), patched.clone());
    }

    serde_json::from_value(value).map_err(|e| SyncError::Validation {
        message: format!("patched record is invalid: {e}"),
    })
}

// ── Tests ────────────────────────────────────────────────────────────
