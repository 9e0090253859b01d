//! # External Serialization
//!
//! The arenas have no internal synchronization. When several threads must
//! share one, every call has to run under a single lock; [`Locked`] is that
//! lock.
//!
//! ```text
//!  Thread 1 ──┐
//!  Thread 2 ──┼──> [Mutex] ──> arena (one call at a time)
//!  Thread N ──┘
//! ```

use parking_lot::Mutex;

use crate::region::Region;

/// An arena behind a mutex held for the duration of each call.
#[derive(Debug)]
pub struct Locked<R> {
    inner: Mutex<R>,
}

impl<R: Region> Locked<R> {
    /// Wraps an arena.
    #[must_use]
    pub fn new(region: R) -> Self {
        Self {
            inner: Mutex::new(region),
        }
    }

    /// Runs `f` with exclusive access to the arena.
    ///
    /// Use this for anything that must be atomic across several calls, such
    /// as allocating and then initializing a record.
    pub fn with<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    /// See [`Region::available`].
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.lock().available()
    }

    /// See [`Region::used`].
    #[must_use]
    pub fn used(&self) -> usize {
        self.inner.lock().used()
    }

    /// See [`Region::is_empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// See [`Region::free_all`].
    pub fn free_all(&self) {
        self.inner.lock().free_all();
    }

    /// Unwraps the arena.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}
