//! Atomic snapshot store.
//!
//! The current registry, ROA and DNS datasets are each published through
//! one of these. Readers load the pointer once at request entry and keep
//! that snapshot for the whole request; the single refresh worker is the
//! only writer. Old snapshots are reclaimed when the last reader drops
//! its `Arc`.

use std::sync::Arc;

use arc_swap::ArcSwap;

/// A hot-swappable, immutable snapshot slot.
#[derive(Debug)]
pub struct Store<T> {
    current: ArcSwap<T>,
}

impl<T> Store<T> {
    #[must_use]
    pub fn new(initial: T) -> Self {
        Store {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// The current snapshot. Call once per request and hold the result.
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Publish a new snapshot. Single-writer: only the refresh worker
    /// calls this.
    pub fn store(&self, next: T) {
        self.current.store(Arc::new(next));
    }
}
