//! Safepoint coordination.
//!
//! A safepoint is a program point at which a mutator thread is guaranteed
//! not to be holding a reference to a cell that isn't also reachable from a
//! registered root. Every registered thread must call [`Safepoint::poll`]
//! periodically (a host embedding the runtime is expected to call it
//! between opcode dispatches, or around any call that might block); a
//! collection cycle can then ask every thread to park there while it takes
//! its root snapshot and runs mark/sweep. The collector thread itself never
//! registers and never parks - it's the one thing in the system that is
//! never blocked by a stop-the-world request.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

struct Inner {
    registered: usize,
    parked: usize,
    stop_requested: bool,
}

/// Shared coordination point between mutator threads and the collector.
pub struct Safepoint {
    inner: Mutex<Inner>,
    resume: Condvar,
    quiesced: Condvar,
    poll_interval: Duration,
}

impl Safepoint {
    pub fn new(poll_interval: Duration) -> Self {
        Safepoint {
            inner: Mutex::new(Inner {
                registered: 0,
                parked: 0,
                stop_requested: false,
            }),
            resume: Condvar::new(),
            quiesced: Condvar::new(),
            poll_interval,
        }
    }

    /// A new mutator thread joins the set that `request_stop` waits on.
    pub(crate) fn register(&self) {
        self.inner.lock().registered += 1;
    }

    /// The thread leaves the set. If a stop is in progress and this was the
    /// last unparked thread, wake the requester.
    pub(crate) fn unregister(&self) {
        let mut inner = self.inner.lock();
        inner.registered = inner.registered.saturating_sub(1);
        if inner.stop_requested && inner.parked >= inner.registered {
            self.quiesced.notify_all();
        }
    }

    /// Called by a registered mutator thread. Returns immediately unless a
    /// stop-the-world pause is in progress, in which case it parks until
    /// the pause ends.
    ///
    /// The wait re-checks every `poll_interval` rather than blocking
    /// indefinitely on the resume signal, so a thread that raced a missed
    /// wakeup doesn't stall past one extra interval.
    pub fn poll(&self) {
        let mut inner = self.inner.lock();
        if !inner.stop_requested {
            return;
        }

        inner.parked += 1;
        if inner.parked >= inner.registered {
            self.quiesced.notify_all();
        }

        while inner.stop_requested {
            self.resume.wait_for(&mut inner, self.poll_interval);
        }

        inner.parked -= 1;
    }

    /// Request a stop-the-world pause. Blocks until every registered thread
    /// has reached [`Safepoint::poll`] and parked there. The pause ends,
    /// and parked threads resume, when the returned guard is dropped.
    pub fn request_stop(&self) -> StopGuard<'_> {
        let mut inner = self.inner.lock();
        inner.stop_requested = true;
        while inner.parked < inner.registered {
            self.quiesced.wait(&mut inner);
        }
        drop(inner);
        StopGuard { safepoint: self }
    }

    pub fn registered_count(&self) -> usize {
        self.inner.lock().registered
    }

    pub fn parked_count(&self) -> usize {
        self.inner.lock().parked
    }
}

/// Ends the stop-the-world pause on drop, waking every parked thread.
pub struct StopGuard<'a> {
    safepoint: &'a Safepoint,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self.safepoint.inner.lock();
            inner.stop_requested = false;
        }
        self.safepoint.resume.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn request_stop_waits_for_registered_threads_to_park() {
        let safepoint = Arc::new(Safepoint::new(Duration::from_millis(5)));
        safepoint.register();

        let mutator_safepoint = safepoint.clone();
        let parked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let parked_writer = parked.clone();
        let handle = thread::spawn(move || {
            // Simulate polling until told to stop.
            for _ in 0..200 {
                mutator_safepoint.poll();
                if parked_writer.load(std::sync::atomic::Ordering::Relaxed) {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
        });

        {
            let _guard = safepoint.request_stop();
            assert_eq!(safepoint.parked_count(), 1);
        }
        parked.store(true, std::sync::atomic::Ordering::Relaxed);
        handle.join().unwrap();
        safepoint.unregister();
    }

    #[test]
    fn unregistering_last_parked_thread_unblocks_requester() {
        let safepoint = Arc::new(Safepoint::new(Duration::from_millis(5)));
        safepoint.register();
        // No thread ever polls; the only registered thread unregisters
        // instead, which must still satisfy the requester.
        let sp = safepoint.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            sp.unregister();
        });
        let _guard = safepoint.request_stop();
        handle.join().unwrap();
    }
}
