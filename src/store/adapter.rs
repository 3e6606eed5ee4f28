//! The document store capability this crate consumes.
//!
//! All cross-client coordination flows through an eventually-consistent remote
//! document store with four operations: create, query, subscribe, update. The
//! store is external; this trait is the seam. No schema enforcement is assumed
//! from the store; every invariant lives in this crate.
//!
//! Subscriptions are RAII: dropping the returned [`Subscription`] guard
//! unsubscribes. Leaking a guard leaks callbacks, which shows up as duplicate
//! events after a controller remount. Re-establishment of a dropped remote
//! connection is the store implementation's own responsibility; this crate
//! never retries subscriptions itself.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{QuizError, QuizResult};

/// A document returned from a query or pushed to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Store-assigned document id.
    pub id: String,
    /// The document body. Always a JSON object for documents this crate writes.
    pub data: Value,
}

impl Document {
    /// Decodes the document into a typed model, injecting the store-level id
    /// into the body's `id` field (the body itself does not persist its id,
    /// mirroring stores that address documents by name).
    pub fn decode<T: DeserializeOwned>(&self) -> QuizResult<T> {
        let mut data = self.data.clone();
        if let Some(object) = data.as_object_mut() {
            object.insert("id".to_owned(), Value::String(self.id.clone()));
        }
        serde_json::from_value(data).map_err(QuizError::serialization)
    }
}

/// Encodes a model into a document body, stripping any `id` field so the
/// store-level id stays the single source of identity.
pub fn encode_doc<T: Serialize>(value: &T) -> QuizResult<Value> {
    let mut data = serde_json::to_value(value).map_err(QuizError::serialization)?;
    if let Some(object) = data.as_object_mut() {
        object.remove("id");
    }
    Ok(data)
}

/// An equality filter on one document field.
///
/// Equality is the only predicate the coordination layer needs; richer
/// filtering stays inside store implementations.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// The field to compare. The special field `"id"` matches the store-level
    /// document id rather than a body field.
    pub field: String,
    /// The value the field must equal.
    pub value: Value,
}

impl Filter {
    /// Creates an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Returns `true` if `doc` satisfies this filter.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        if self.field == "id" {
            return Value::String(doc.id.clone()) == self.value;
        }
        doc.data.get(&self.field) == Some(&self.value)
    }
}

/// Callback invoked for every matching document create/update.
pub type SubscriberFn = Arc<dyn Fn(&Document) + Send + Sync>;

/// RAII guard for an active subscription; dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Creates a subscription guard from a cancellation action.
    #[must_use]
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancels the subscription now instead of at drop time.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The consumed store capability: create, query, subscribe, update.
///
/// Implementations must be shareable across threads; subscription callbacks
/// may be invoked from any thread, including the writer's.
pub trait DocumentStore: Send + Sync {
    /// Creates a document in `collection` and returns its store-assigned id.
    fn create(&self, collection: &str, doc: Value) -> QuizResult<String>;

    /// Returns all documents in `collection` matching every filter.
    fn query(&self, collection: &str, filters: &[Filter]) -> QuizResult<Vec<Document>>;

    /// Subscribes to create/update events on matching documents. The callback
    /// receives the full document after each change.
    fn subscribe(
        &self,
        collection: &str,
        filters: &[Filter],
        callback: SubscriberFn,
    ) -> QuizResult<Subscription>;

    /// Applies a shallow merge patch to the document with the given id.
    fn update(&self, collection: &str, id: &str, patch: Value) -> QuizResult<()>;
}
