//! `Space`: the unit of isolation this crate defines (spec.md §3.9,
//! §4.10, §4.11 — C10/C12 tied together).
//!
//! A space owns exactly one collector, one mutable-root map, one module
//! resolver, one callback table, one thread-name registry, and the root
//! execution context every thread's own context chain ultimately
//! terminates at. It registers itself as a single [`RootProvider`]
//! covering every space-level root source spec.md §4.10 lists except
//! per-thread context chains, which each [`Thread`] reports on its own.

use crate::callbacks::Callbacks;
use crate::config::SpaceConfig;
use crate::context::{self, Context};
use crate::error::{CoreError, CoreResult};
use crate::kinds;
use crate::module::ModuleResolver;
use crate::object::MutableRootMap;
use crate::rope;
use crate::thread::{self, JoinHandle, NameRegistry, Thread};
use crate::Gc;
use parking_lot::{Mutex, RwLock};
use protocore_gc::cell::CellPtr;
use protocore_gc::marker::{RootHandle, RootProvider};
use std::sync::{Arc, Once};

static REGISTER_KINDS: Once = Once::new();

pub struct Space {
    gc: Gc,
    config: SpaceConfig,
    mutable_roots: MutableRootMap,
    module_resolver: ModuleResolver,
    callbacks: RwLock<Callbacks>,
    thread_names: NameRegistry,
    root_context: Arc<Context>,
    root_handle: Mutex<Option<RootHandle>>,
}

impl Space {
    /// Create a new, isolated space: its own collector, sized and tuned
    /// by `config.gc`, plus the space-level state above it.
    pub fn new(config: SpaceConfig) -> CoreResult<Arc<Space>> {
        config.validate().map_err(|e| CoreError::ArgumentMismatch(e.to_string()))?;
        REGISTER_KINDS.call_once(kinds::register_all);

        let gc: Gc = Arc::new(protocore_gc::GarbageCollector::new(config.gc.clone())?);
        Ok(Self::assemble(gc, config))
    }

    fn assemble(gc: Gc, config: SpaceConfig) -> Arc<Space> {
        let root_context = Context::root(&gc);
        let space = Arc::new(Space {
            gc,
            config,
            mutable_roots: MutableRootMap::new(),
            module_resolver: ModuleResolver::new(),
            callbacks: RwLock::new(Callbacks::default()),
            thread_names: NameRegistry::new(),
            root_context,
            root_handle: Mutex::new(None),
        });
        let provider: Arc<dyn RootProvider> = space.clone() as Arc<dyn RootProvider>;
        let handle = space.gc.register_roots(provider);
        *space.root_handle.lock() = Some(handle);
        space
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(gc: Gc) -> Arc<Space> {
        REGISTER_KINDS.call_once(kinds::register_all);
        Self::assemble(gc, SpaceConfig::default())
    }

    pub fn gc(&self) -> &Gc {
        &self.gc
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    pub fn mutable_roots(&self) -> &MutableRootMap {
        &self.mutable_roots
    }

    pub fn module_resolver(&self) -> &ModuleResolver {
        &self.module_resolver
    }

    pub fn callbacks(&self) -> Callbacks {
        *self.callbacks.read()
    }

    pub fn set_callbacks(&self, callbacks: Callbacks) {
        *self.callbacks.write() = callbacks;
    }

    pub fn thread_names(&self) -> &NameRegistry {
        &self.thread_names
    }

    pub fn root_context(&self) -> &Arc<Context> {
        &self.root_context
    }

    /// Register the calling OS thread with this space (spec.md §4.11).
    pub fn new_thread(self: &Arc<Self>, name: &str) -> Arc<Thread> {
        Thread::new(self, name)
    }

    /// Spawn a fresh OS thread registered with this space (spec.md
    /// §4.11's `new_thread`/`spawn`).
    pub fn spawn_thread(
        self: &Arc<Self>,
        name: &str,
        entry: impl FnOnce(Arc<Thread>) + Send + 'static,
    ) -> CoreResult<JoinHandle> {
        thread::spawn(self.clone(), name, entry)
    }

    /// Request a collection now, blocking until it completes (spec.md
    /// §4.10's `collect`).
    pub fn collect(&self) -> CoreResult<()> {
        self.gc.collect().map_err(CoreError::from)
    }
}

impl RootProvider for Space {
    fn visit_roots(&self, visit: &mut dyn FnMut(CellPtr)) {
        self.mutable_roots.visit_roots(visit);
        self.module_resolver.visit_roots(visit);
        rope::visit_global_interner_roots(visit);
        context::visit_own_roots(&self.root_context, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;
    use crate::test_support::test_gc;
    use crate::value::Handle;

    #[test]
    fn new_for_test_builds_a_usable_space() {
        let gc = test_gc();
        let space = Space::new_for_test(gc);
        assert_eq!(space.config().attribute_cache_depth, 256);
        assert!(space.root_context().parent().is_none());
    }

    #[test]
    fn spawned_thread_runs_and_joins() {
        let gc = test_gc();
        let space = Space::new_for_test(gc);
        let handle = space
            .spawn_thread("worker", |thread| {
                assert_eq!(thread.name(), "worker");
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn mutable_root_map_objects_survive_a_collection() {
        let gc = test_gc();
        let space = Space::new_for_test(gc.clone());
        let roots = space.mutable_roots();
        let o = ObjectRef::new_object(&gc, roots, true).unwrap();
        let o = o.set_attribute(&gc, roots, 1, Handle::encode_small_int(5).unwrap()).unwrap();

        space.collect().unwrap();

        assert_eq!(o.attributes(roots).get(1).as_small_int(), Some(5), "mutable object must survive a GC cycle");
    }
}
