//! Failure-injecting wrapper over any [`DocumentStore`].
//!
//! Degraded-mode behavior (locally synthesized session ids, locally cached
//! attempts) only shows itself when writes fail, so tests need a store that
//! fails on demand. `FlakyStore` wraps a real store and consumes configured
//! failure budgets deterministically: `fail_creates(2)` makes exactly the
//! next two creates fail, then the store heals.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::store::adapter::{Document, DocumentStore, Filter, SubscriberFn, Subscription};
use crate::{QuizError, QuizResult};

/// Wraps a store and injects write failures from pre-armed budgets.
///
/// Reads and subscriptions always pass through; the degraded paths this
/// exercises are all on the write side.
pub struct FlakyStore {
    inner: Arc<dyn DocumentStore>,
    failing_creates: AtomicU32,
    failing_updates: AtomicU32,
}

impl FlakyStore {
    /// Wraps `inner` with empty failure budgets (fully transparent).
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            failing_creates: AtomicU32::new(0),
            failing_updates: AtomicU32::new(0),
        }
    }

    /// Arms the next `count` creates to fail.
    pub fn fail_creates(&self, count: u32) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    /// Arms the next `count` updates to fail.
    pub fn fail_updates(&self, count: u32) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    fn consume(budget: &AtomicU32) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

impl std::fmt::Debug for FlakyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyStore")
            .field("failing_creates", &self.failing_creates.load(Ordering::SeqCst))
            .field("failing_updates", &self.failing_updates.load(Ordering::SeqCst))
            .finish()
    }
}

impl DocumentStore for FlakyStore {
    fn create(&self, collection: &str, doc: Value) -> QuizResult<String> {
        if Self::consume(&self.failing_creates) {
            return Err(QuizError::Store {
                context: format!("injected create failure in {}", collection),
            });
        }
        self.inner.create(collection, doc)
    }

    fn query(&self, collection: &str, filters: &[Filter]) -> QuizResult<Vec<Document>> {
        self.inner.query(collection, filters)
    }

    fn subscribe(
        &self,
        collection: &str,
        filters: &[Filter],
        callback: SubscriberFn,
    ) -> QuizResult<Subscription> {
        self.inner.subscribe(collection, filters, callback)
    }

    fn update(&self, collection: &str, id: &str, patch: Value) -> QuizResult<()> {
        if Self::consume(&self.failing_updates) {
            return Err(QuizError::Store {
                context: format!("injected update failure in {}/{}", collection, id),
            });
        }
        self.inner.update(collection, id, patch)
    }
}
