//! In-process reference implementation of [`DocumentStore`].
//!
//! Backs the integration tests and serves as the behavioral reference for
//! real adapters: push notifications fire synchronously on the writer's
//! thread for every matching create and update, and queries see all writes
//! that happened-before them. Collection locks are released before callbacks
//! run, so subscribers may freely call back into the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::store::adapter::{Document, DocumentStore, Filter, SubscriberFn, Subscription};
use crate::{QuizError, QuizResult};

struct SubEntry {
    id: u64,
    collection: String,
    filters: Vec<Filter>,
    callback: SubscriberFn,
}

#[derive(Default)]
struct Inner {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    subscribers: Mutex<Vec<SubEntry>>,
    next_doc: AtomicU64,
    next_sub: AtomicU64,
}

impl Inner {
    /// Invokes every matching subscriber with `doc`. Must be called with no
    /// store locks held by this thread.
    fn notify(&self, collection: &str, doc: &Document) {
        let callbacks: Vec<SubscriberFn> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .filter(|entry| {
                    entry.collection == collection
                        && entry.filters.iter().all(|filter| filter.matches(doc))
                })
                .map(|entry| entry.callback.clone())
                .collect()
        };
        for callback in callbacks {
            callback(doc);
        }
    }
}

/// Shared in-memory document store with synchronous push subscriptions.
///
/// Cloning is cheap and every clone views the same data, which is how tests
/// model multiple clients sharing one remote store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .collections
            .lock()
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Returns `true` if `collection` holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collections = self.inner.collections.lock();
        let mut dbg = f.debug_struct("MemoryStore");
        for (name, docs) in collections.iter() {
            dbg.field(name, &docs.len());
        }
        dbg.finish()
    }
}

impl DocumentStore for MemoryStore {
    fn create(&self, collection: &str, doc: Value) -> QuizResult<String> {
        if !doc.is_object() {
            return Err(QuizError::InvalidRequest {
                info: format!("document for {} must be a JSON object", collection),
            });
        }
        let id = format!("doc-{}", self.inner.next_doc.fetch_add(1, Ordering::Relaxed));
        let stored = Document {
            id: id.clone(),
            data: doc,
        };
        {
            let mut collections = self.inner.collections.lock();
            collections
                .entry(collection.to_owned())
                .or_default()
                .push(stored.clone());
        }
        self.inner.notify(collection, &stored);
        Ok(id)
    }

    fn query(&self, collection: &str, filters: &[Filter]) -> QuizResult<Vec<Document>> {
        let collections = self.inner.collections.lock();
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filters.iter().all(|filter| filter.matches(doc)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn subscribe(
        &self,
        collection: &str,
        filters: &[Filter],
        callback: SubscriberFn,
    ) -> QuizResult<Subscription> {
        let sub_id = self.inner.next_sub.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push(SubEntry {
            id: sub_id,
            collection: collection.to_owned(),
            filters: filters.to_vec(),
            callback,
        });

        let inner = self.inner.clone();
        Ok(Subscription::new(move || {
            inner.subscribers.lock().retain(|entry| entry.id != sub_id);
        }))
    }

    fn update(&self, collection: &str, id: &str, patch: Value) -> QuizResult<()> {
        let updated = {
            let mut collections = self.inner.collections.lock();
            let docs = collections.get_mut(collection).ok_or_else(|| QuizError::Store {
                context: format!("no collection {}", collection),
            })?;
            let doc = docs
                .iter_mut()
                .find(|doc| doc.id == id)
                .ok_or_else(|| QuizError::Store {
                    context: format!("no document {} in {}", id, collection),
                })?;
            match (doc.data.as_object_mut(), patch.as_object()) {
                (Some(target), Some(changes)) => {
                    for (key, value) in changes {
                        target.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    return Err(QuizError::InvalidRequest {
                        info: "update patch must be a JSON object".to_owned(),
                    })
                }
            }
            doc.clone()
        };
        self.inner.notify(collection, &updated);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_then_query_roundtrips() {
        let store = MemoryStore::new();
        let id = store
            .create("sessions", json!({"class_id": "8-A", "status": "active"}))
            .unwrap();

        let all = store.query("sessions", &[]).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);

        let filtered = store
            .query("sessions", &[Filter::eq("class_id", "8-A")])
            .unwrap();
        assert_eq!(filtered.len(), 1);

        let miss = store
            .query("sessions", &[Filter::eq("class_id", "8-B")])
            .unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn update_merges_shallowly() {
        let store = MemoryStore::new();
        let id = store
            .create("sessions", json!({"status": "active", "end_time": 100}))
            .unwrap();
        store
            .update("sessions", &id, json!({"status": "completed"}))
            .unwrap();

        let docs = store.query("sessions", &[Filter::eq("id", id)]).unwrap();
        assert_eq!(docs[0].data["status"], "completed");
        assert_eq!(docs[0].data["end_time"], 100);
    }

    #[test]
    fn update_missing_document_fails() {
        let store = MemoryStore::new();
        store.create("sessions", json!({})).unwrap();
        let err = store
            .update("sessions", "doc-999", json!({"x": 1}))
            .unwrap_err();
        assert!(matches!(err, QuizError::Store { .. }));
    }

    #[test]
    fn subscribers_receive_creates_and_updates() {
        let store = MemoryStore::new();
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();

        let sink = seen.clone();
        let _sub = store
            .subscribe(
                "sessions",
                &[Filter::eq("class_id", "8-A")],
                Arc::new(move |doc| {
                    sink.lock().push(doc.data["status"].to_string());
                }),
            )
            .unwrap();

        let id = store
            .create("sessions", json!({"class_id": "8-A", "status": "active"}))
            .unwrap();
        // A document for a different class does not match.
        store
            .create("sessions", json!({"class_id": "8-B", "status": "active"}))
            .unwrap();
        store
            .update("sessions", &id, json!({"status": "completed"}))
            .unwrap();

        assert_eq!(seen.lock().as_slice(), ["\"active\"", "\"completed\""]);
    }

    #[test]
    fn dropping_subscription_stops_events() {
        let store = MemoryStore::new();
        let seen: Arc<Mutex<u32>> = Arc::default();

        let sink = seen.clone();
        let sub = store
            .subscribe(
                "sessions",
                &[],
                Arc::new(move |_| {
                    *sink.lock() += 1;
                }),
            )
            .unwrap();

        store.create("sessions", json!({})).unwrap();
        drop(sub);
        store.create("sessions", json!({})).unwrap();

        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn callbacks_may_reenter_the_store() {
        // Submission writes an attempt from inside a status-update callback;
        // the store must not hold collection locks across notification.
        let store = MemoryStore::new();
        let reentrant = store.clone();
        let _sub = store
            .subscribe(
                "sessions",
                &[],
                Arc::new(move |_| {
                    reentrant.create("attempts", json!({"from": "callback"})).unwrap();
                }),
            )
            .unwrap();

        store.create("sessions", json!({})).unwrap();
        assert_eq!(store.len("attempts"), 1);
    }

    #[test]
    fn clones_share_data() {
        let store = MemoryStore::new();
        let view = store.clone();
        store.create("sessions", json!({})).unwrap();
        assert_eq!(view.len("sessions"), 1);
    }
}
