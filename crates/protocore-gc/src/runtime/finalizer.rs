//! Deferred finalization for cells holding external resources.
//!
//! Most cell kinds have nothing to clean up: their [`crate::cell::FinalizeFn`]
//! runs synchronously in the sweeper and returns immediately. A few kinds -
//! byte-rope leaves that own a heap-allocated buffer, a cell shadowing a
//! foreign handle - need cleanup that shouldn't run while the world is
//! stopped (it might call back into code that allocates, or simply take
//! longer than a pause budget allows). Those finalizers get queued here
//! instead of running inline, and a background thread drains the queue
//! after the cycle that condemned them has finished and resumed the world.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{GcError, Result};

type DeferredFn = Box<dyn FnOnce() + Send>;

struct Entry {
    run: DeferredFn,
}

/// Queue of deferred cleanups plus the background thread that drains it.
pub struct Finalizer {
    queue: Arc<Mutex<VecDeque<Entry>>>,
    running: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    poll_interval: Duration,
}

impl Finalizer {
    pub fn new(poll_interval: Duration) -> Self {
        Finalizer {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            running: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(AtomicUsize::new(0)),
            thread: Mutex::new(None),
            poll_interval,
        }
    }

    /// Spawn the background drain thread. Idempotent if already started.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let queue = self.queue.clone();
        let running = self.running.clone();
        let pending = self.pending.clone();
        let interval = self.poll_interval;

        let handle = std::thread::Builder::new()
            .name("protocore-gc-finalizer".into())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    let drained: Vec<Entry> = {
                        let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
                        queue.drain(..).collect()
                    };
                    let drained_count = drained.len();
                    for entry in drained {
                        (entry.run)();
                    }
                    pending.fetch_sub(drained_count, Ordering::Relaxed);
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| GcError::Internal(format!("failed to spawn finalizer thread: {e}")))?;

        *self.thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.join().map_err(|_| {
                GcError::Internal("finalizer thread panicked".into())
            })?;
        }
        Ok(())
    }

    /// Queue `run` to execute on the finalizer thread. Called by a cell
    /// kind's [`crate::cell::FinalizeFn`] when cleanup shouldn't happen
    /// inline during the stop-the-world sweep.
    pub fn defer<F>(&self, run: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Entry { run: Box::new(run) });
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
