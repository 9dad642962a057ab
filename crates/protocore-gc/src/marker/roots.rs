//! Root registration.
//!
//! This crate never walks a native call stack or knows about a mutator's
//! local variables - it has no notion of "stack roots" at all. Instead,
//! whatever sits above it (the tagged-value runtime) registers a
//! [`RootProvider`] for each durable source of root references it owns: the
//! mutable-root map, the symbol interner, per-thread execution-context
//! handles. A marking pass asks every registered provider to report its
//! current roots, once, during the brief stop-the-world root snapshot.

use crate::cell::CellPtr;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A durable source of GC roots.
///
/// Implementations must be exhaustive in the same sense as
/// [`crate::cell::VisitFn`]: any cell reachable from outside the heap that
/// isn't reported here can be collected while still in use.
pub trait RootProvider: Send + Sync {
    fn visit_roots(&self, visit: &mut dyn FnMut(CellPtr));
}

struct Registry {
    providers: RwLock<HashMap<usize, Arc<dyn RootProvider>>>,
    next_id: AtomicUsize,
}

/// Registration table for [`RootProvider`]s.
pub struct RootRegistry {
    inner: Arc<Registry>,
}

impl RootRegistry {
    pub fn new() -> Self {
        RootRegistry {
            inner: Arc::new(Registry {
                providers: RwLock::new(HashMap::new()),
                next_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Register `provider`. The returned handle unregisters it on drop.
    pub fn register(&self, provider: Arc<dyn RootProvider>) -> RootHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.providers.write().insert(id, provider);
        RootHandle {
            id,
            inner: self.inner.clone(),
        }
    }

    /// Visit every cell reported by every currently-registered provider.
    /// Called once per cycle, during the root-snapshot safepoint.
    pub fn visit_all(&self, visit: &mut dyn FnMut(CellPtr)) {
        let providers: Vec<_> = self.inner.providers.read().values().cloned().collect();
        for provider in providers {
            provider.visit_roots(visit);
        }
    }

    pub fn provider_count(&self) -> usize {
        self.inner.providers.read().len()
    }
}

impl Default for RootRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters its provider when dropped.
pub struct RootHandle {
    id: usize,
    inner: Arc<Registry>,
}

impl RootHandle {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for RootHandle {
    fn drop(&mut self) {
        self.inner.providers.write().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{register_kind, CellKind};
    use std::sync::Mutex;

    fn noop_visit(_cell: CellPtr, _visit: &mut dyn FnMut(CellPtr)) {}

    fn kind() -> CellKind {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| register_kind(CellKind(250), noop_visit, None));
        CellKind(250)
    }

    struct FixedRoots(Mutex<Vec<CellPtr>>);
    impl RootProvider for FixedRoots {
        fn visit_roots(&self, visit: &mut dyn FnMut(CellPtr)) {
            for &cell in self.0.lock().unwrap().iter() {
                visit(cell);
            }
        }
    }

    fn dummy_cell() -> CellPtr {
        use crate::cell::Cell;
        use std::alloc::{alloc_zeroed, Layout};
        let layout = Layout::new::<Cell>();
        let ptr = unsafe { alloc_zeroed(layout) } as *mut Cell;
        let cell = unsafe { CellPtr::from_raw(std::ptr::NonNull::new(ptr).unwrap()) };
        unsafe { cell.as_ref().set_kind(kind()) };
        cell
    }

    #[test]
    fn registered_provider_is_visited() {
        let registry = RootRegistry::new();
        let cell = dummy_cell();
        let provider = Arc::new(FixedRoots(Mutex::new(vec![cell])));
        let _handle = registry.register(provider);

        let mut seen = Vec::new();
        registry.visit_all(&mut |c| seen.push(c));
        assert_eq!(seen, vec![cell]);
    }

    #[test]
    fn dropping_handle_unregisters() {
        let registry = RootRegistry::new();
        let provider = Arc::new(FixedRoots(Mutex::new(vec![])));
        let handle = registry.register(provider);
        assert_eq!(registry.provider_count(), 1);
        drop(handle);
        assert_eq!(registry.provider_count(), 0);
    }
}
