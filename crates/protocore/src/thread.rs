//! Thread registration, the current-context chain, and the per-thread
//! attribute cache (spec.md §3.9, §4.11 — C12).
//!
//! Per-thread free-list caching for allocation is already handled
//! entirely inside `protocore_gc::allocator::CellAllocator` (thread-local,
//! keyed by allocator id); this module doesn't replicate it (see
//! `DESIGN.md`). What it does own is everything spec.md §3.9 describes
//! as thread-local *above* the allocator: managed/unmanaged state, the
//! current-context pointer, and the direct-mapped attribute cache
//! (§4.8).

use crate::context::{self, Context};
use crate::error::{CoreError, CoreResult};
use crate::space::Space;
use crate::value::Handle;
use parking_lot::Mutex;
use protocore_gc::cell::CellPtr;
use protocore_gc::marker::{RootHandle, RootProvider};
use protocore_gc::runtime::ThreadGuard;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Resolves thread-naming collisions by suffixing a monotonically
/// increasing counter (spec.md §4.11, SPEC_FULL §2.3): the first thread
/// named `"worker"` keeps that name; the second becomes `"worker-1"`,
/// the third `"worker-2"`, and so on.
#[derive(Default)]
pub struct NameRegistry {
    counts: Mutex<HashMap<String, u64>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, requested: &str) -> String {
        let mut counts = self.counts.lock();
        let count = counts.entry(requested.to_string()).or_insert(0);
        let n = *count;
        *count += 1;
        if n == 0 {
            requested.to_string()
        } else {
            format!("{requested}-{n}")
        }
    }
}

#[derive(Clone, Copy, Default)]
struct CacheSlot {
    object: u64,
    name_hash: u64,
    value: u64,
    occupied: bool,
}

/// A thread-private, direct-mapped attribute-lookup cache (spec.md
/// §4.8's "per-thread attribute cache"). It is guarded by a mutex only
/// to satisfy Rust's aliasing rules for a `Thread` shared as `Arc`;
/// contention is never expected, since only the owning OS thread ever
/// reads or writes it.
pub struct AttributeCache {
    depth: usize,
    slots: Mutex<Vec<CacheSlot>>,
}

impl AttributeCache {
    fn new(depth: usize) -> Self {
        let depth = depth.max(1).next_power_of_two();
        AttributeCache {
            depth,
            slots: Mutex::new(vec![CacheSlot::default(); depth]),
        }
    }

    fn index(&self, object: Handle, name_hash: u64) -> usize {
        ((object.raw() ^ name_hash) as usize) & (self.depth - 1)
    }

    pub fn get(&self, object: Handle, name_hash: u64) -> Option<Handle> {
        let idx = self.index(object, name_hash);
        let slot = self.slots.lock()[idx];
        if slot.occupied && slot.object == object.raw() && slot.name_hash == name_hash {
            Some(Handle::from_raw(slot.value))
        } else {
            None
        }
    }

    pub fn put(&self, object: Handle, name_hash: u64, value: Handle) {
        let idx = self.index(object, name_hash);
        self.slots.lock()[idx] = CacheSlot {
            object: object.raw(),
            name_hash,
            value: value.raw(),
            occupied: true,
        };
    }

    /// Drop a cached entry for `(object, name_hash)` if present — called
    /// after any attribute write that could make a cached lookup stale
    /// (spec.md §4.8's write path).
    pub fn invalidate(&self, object: Handle, name_hash: u64) {
        let idx = self.index(object, name_hash);
        let mut slots = self.slots.lock();
        if slots[idx].object == object.raw() && slots[idx].name_hash == name_hash {
            slots[idx].occupied = false;
        }
    }
}

/// One OS thread's registration with a space: its name, its
/// managed/unmanaged safepoint state, its current execution context,
/// and its attribute cache.
pub struct Thread {
    name: String,
    managed: AtomicBool,
    current_context: Mutex<Arc<Context>>,
    cache: AttributeCache,
    guard: ThreadGuard,
    root_handle: Mutex<Option<RootHandle>>,
}

impl Thread {
    /// Register a new thread with `space`, starting in a fresh child
    /// context of the space's root context (spec.md §4.11).
    pub fn new(space: &Space, requested_name: &str) -> Arc<Thread> {
        let name = space.thread_names().register(requested_name);
        let guard = space.gc().register_thread(name.clone());
        let root_context = context::Context::child(space.gc(), space.root_context());
        let thread = Arc::new(Thread {
            name,
            managed: AtomicBool::new(true),
            current_context: Mutex::new(root_context),
            cache: AttributeCache::new(space.config().attribute_cache_depth),
            guard,
            root_handle: Mutex::new(None),
        });
        let provider: Arc<dyn RootProvider> = thread.clone() as Arc<dyn RootProvider>;
        let handle = space.gc().register_roots(provider);
        *thread.root_handle.lock() = Some(handle);
        thread
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.guard.id()
    }

    pub fn set_managed(&self) {
        self.managed.store(true, Ordering::SeqCst);
    }

    pub fn set_unmanaged(&self) {
        self.managed.store(false, Ordering::SeqCst);
    }

    pub fn is_managed(&self) -> bool {
        self.managed.load(Ordering::SeqCst)
    }

    /// Park at the safepoint if a stop-the-world collection is pending
    /// and this thread is managed (spec.md §4.10: "unmanaged threads are
    /// never asked to park").
    pub fn poll(&self) {
        if self.is_managed() {
            self.guard.poll();
        }
    }

    pub fn current_context(&self) -> Arc<Context> {
        self.current_context.lock().clone()
    }

    pub fn push_context(&self, ctx: Arc<Context>) {
        *self.current_context.lock() = ctx;
    }

    /// Finish the current context (promoting its return value into its
    /// parent, per spec.md §4.9) and make the parent current again.
    pub fn pop_context(&self) -> CoreResult<Handle> {
        let mut guard = self.current_context.lock();
        let ret = context::Context::finish(&guard)?;
        let parent = guard.parent().cloned().unwrap_or_else(|| guard.clone());
        *guard = parent;
        Ok(ret)
    }

    pub fn cache(&self) -> &AttributeCache {
        &self.cache
    }
}

impl RootProvider for Thread {
    fn visit_roots(&self, visit: &mut dyn FnMut(CellPtr)) {
        let ctx = self.current_context.lock().clone();
        context::visit_chain(&ctx, visit);
    }
}

/// A spawned thread's join handle (spec.md §4.11's `join`/`detach`).
pub struct JoinHandle {
    inner: Option<std::thread::JoinHandle<()>>,
}

impl JoinHandle {
    pub fn join(mut self) -> CoreResult<()> {
        if let Some(h) = self.inner.take() {
            h.join().map_err(|_| CoreError::ArgumentMismatch("spawned thread panicked".into()))?;
        }
        Ok(())
    }

    /// Detach the underlying OS thread, letting it run to completion
    /// independently (spec.md §4.11). A Rust `JoinHandle` already
    /// detaches on drop, so this is just that.
    pub fn detach(mut self) {
        self.inner.take();
    }
}

/// Spawn a new OS thread registered with `space`, running `entry` with
/// its own [`Thread`] (spec.md §4.11's `new_thread`).
pub fn spawn(
    space: Arc<Space>,
    name: &str,
    entry: impl FnOnce(Arc<Thread>) + Send + 'static,
) -> CoreResult<JoinHandle> {
    let requested = name.to_string();
    let inner = std::thread::Builder::new()
        .name(requested.clone())
        .spawn(move || {
            let thread = Thread::new(&space, &requested);
            entry(thread);
        })
        .map_err(|e| CoreError::ArgumentMismatch(format!("failed to spawn thread: {e}")))?;
    Ok(JoinHandle { inner: Some(inner) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;

    #[test]
    fn name_registry_suffixes_collisions() {
        let registry = NameRegistry::new();
        assert_eq!(registry.register("worker"), "worker");
        assert_eq!(registry.register("worker"), "worker-1");
        assert_eq!(registry.register("worker"), "worker-2");
        assert_eq!(registry.register("other"), "other");
    }

    #[test]
    fn attribute_cache_hits_and_invalidates() {
        let cache = AttributeCache::new(16);
        let obj = Handle::encode_small_int(1).unwrap();
        assert!(cache.get(obj, 7).is_none());
        cache.put(obj, 7, Handle::encode_small_int(99).unwrap());
        assert_eq!(cache.get(obj, 7).and_then(|h| h.as_small_int()), Some(99));
        cache.invalidate(obj, 7);
        assert!(cache.get(obj, 7).is_none());
    }

    #[test]
    fn thread_registration_starts_with_a_child_of_root_context() {
        let gc = test_gc();
        let space = Space::new_for_test(gc);
        let thread = Thread::new(&space, "main");
        assert_eq!(thread.name(), "main");
        let ctx = thread.current_context();
        assert!(std::ptr::eq(
            ctx.parent().map(Arc::as_ptr).unwrap_or(std::ptr::null()),
            Arc::as_ptr(space.root_context())
        ));
    }
}
