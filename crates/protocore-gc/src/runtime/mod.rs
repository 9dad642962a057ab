//! Thread registry and stop-the-world coordination.
//!
//! This is the collector's view of "the world": every mutator thread that
//! might be holding a `CellPtr` registers here once, and the collector asks
//! this module to stop the world (and later resume it) around a cycle's
//! mark/sweep phases. It does not know anything about execution contexts,
//! call stacks, or argument binding - that's `protocore`'s job. All it
//! coordinates is the safepoint protocol and the deferred-finalization
//! queue.

pub mod finalizer;
pub mod safepoint;

pub use finalizer::Finalizer;
pub use safepoint::{Safepoint, StopGuard};

use crate::config::GcConfig;
use crate::error::{GcError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct ThreadManagerInner {
    safepoint: Safepoint,
    threads: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
}

/// Registry of mutator threads plus the safepoint they poll.
#[derive(Clone)]
pub struct ThreadManager {
    inner: Arc<ThreadManagerInner>,
}

impl ThreadManager {
    pub fn new(config: &GcConfig) -> Self {
        ThreadManager {
            inner: Arc::new(ThreadManagerInner {
                safepoint: Safepoint::new(Duration::from_millis(config.safepoint_poll_interval_ms)),
                threads: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register the calling logical thread (an embedding may map several of
    /// these onto one OS thread, or vice versa; the id is just a handle).
    /// Returns a guard that unregisters on drop.
    pub fn register(&self, name: impl Into<String>) -> ThreadGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.threads.lock().insert(id, name.into());
        self.inner.safepoint.register();
        ThreadGuard {
            id,
            manager: self.inner.clone(),
        }
    }

    /// Called by a registered thread at a point where it holds no
    /// unregistered `CellPtr`s. Parks if a collection is in progress.
    pub fn poll_safepoint(&self) {
        self.inner.safepoint.poll();
    }

    /// Stop every registered thread at its next safepoint poll. The world
    /// resumes when the returned guard is dropped.
    pub fn request_stop_the_world(&self) -> StopGuard<'_> {
        self.inner.safepoint.request_stop()
    }

    pub fn running_thread_count(&self) -> usize {
        self.inner.safepoint.registered_count()
    }

    pub fn thread_name(&self, id: u64) -> Result<String> {
        self.inner
            .threads
            .lock()
            .get(&id)
            .cloned()
            .ok_or(GcError::UnknownThread(id))
    }
}

/// Unregisters its thread from the manager's safepoint on drop.
pub struct ThreadGuard {
    id: u64,
    manager: Arc<ThreadManagerInner>,
}

impl ThreadGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn poll(&self) {
        self.manager.safepoint.poll();
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.manager.threads.lock().remove(&self.id);
        self.manager.safepoint.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_tracks_running_count() {
        let manager = ThreadManager::new(&GcConfig::default());
        assert_eq!(manager.running_thread_count(), 0);
        let guard = manager.register("worker-0");
        assert_eq!(manager.running_thread_count(), 1);
        assert!(manager.thread_name(guard.id()).is_ok());
        drop(guard);
        assert_eq!(manager.running_thread_count(), 0);
    }

    #[test]
    fn unknown_thread_errors() {
        let manager = ThreadManager::new(&GcConfig::default());
        assert!(matches!(manager.thread_name(999), Err(GcError::UnknownThread(999))));
    }
}
