//! Module-loader boundary (spec.md §3.10, §4.13's module-loading
//! contract — C14).
//!
//! Filesystem and network providers are embedder concerns (spec.md §1's
//! Non-goals exclude "a module system's filesystem/network resolution
//! policy"); this module defines the trait and registry shape those
//! concerns plug into, a process-wide module cache keyed by logical
//! path, and the resolution-chain walk that ties them together
//! (SPEC_FULL §2.4).

use crate::error::CoreResult;
use crate::object::{MutableRootMap, ObjectRef};
use crate::value::Handle;
use crate::Gc;
use dashmap::DashMap;
use parking_lot::RwLock;
use protocore_gc::cell::CellPtr;
use std::sync::Arc;

/// A source of modules, consulted by logical path. The filesystem
/// provider a real embedding would ship is out of scope here; this
/// trait is the seam it plugs into.
pub trait ModuleProvider: Send + Sync {
    /// Globally unique identifier, used for dedup in [`ProviderRegistry`].
    fn guid(&self) -> &str;

    /// An optional short name a resolution-chain entry can use instead
    /// of the full GUID (spec.md §4.13: `provider:<alias-or-guid>`).
    fn alias(&self) -> Option<&str> {
        None
    }

    fn resolve(&self, logical_path: &str) -> Option<Handle>;
}

/// Registry of [`ModuleProvider`]s, deduplicated by GUID, with alias
/// lookup taking precedence over a bare GUID (spec.md §4.13).
#[derive(Default)]
pub struct ProviderRegistry {
    by_guid: DashMap<String, Arc<dyn ModuleProvider>>,
    by_alias: DashMap<String, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<dyn ModuleProvider>) {
        if let Some(alias) = provider.alias() {
            self.by_alias.insert(alias.to_string(), provider.guid().to_string());
        }
        self.by_guid.insert(provider.guid().to_string(), provider);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ModuleProvider>> {
        if let Some(guid) = self.by_alias.get(key) {
            if let Some(p) = self.by_guid.get(guid.as_str()) {
                return Some(p.clone());
            }
        }
        self.by_guid.get(key).map(|p| p.clone())
    }
}

/// Process-wide cache of resolved modules, keyed by logical path
/// (spec.md §4.13: "a process-wide module cache... treated as an
/// external, thread-safe key -> value cache").
#[derive(Default)]
struct ModuleCache {
    entries: DashMap<String, Handle>,
}

impl ModuleCache {
    fn get(&self, logical_path: &str) -> Option<Handle> {
        self.entries.get(logical_path).map(|v| *v)
    }

    fn insert(&self, logical_path: &str, module: Handle) {
        self.entries.insert(logical_path.to_string(), module);
    }
}

const PROVIDER_PREFIX: &str = "provider:";

/// A space's view of module resolution: an ordered chain of strings,
/// each either a directory path or `provider:<alias-or-guid>` (spec.md
/// §4.13). Directory-path entries are accepted and stored — an
/// embedder's own filesystem lookup can consult
/// [`ModuleResolver::get_resolution_chain`] — but
/// [`ModuleResolver::get_import_module`] itself only ever resolves
/// `provider:` entries, since no filesystem provider ships with this
/// crate.
pub struct ModuleResolver {
    chain: RwLock<Vec<String>>,
    registry: ProviderRegistry,
    cache: ModuleCache,
    roots: RwLock<Vec<Handle>>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        ModuleResolver {
            chain: RwLock::new(Vec::new()),
            registry: ProviderRegistry::new(),
            cache: ModuleCache::default(),
            roots: RwLock::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn get_resolution_chain(&self) -> Vec<String> {
        self.chain.read().clone()
    }

    pub fn set_resolution_chain(&self, chain: Vec<String>) {
        *self.chain.write() = chain;
    }

    /// Resolve `logical_path` (spec.md §4.13): the module cache first,
    /// then the resolution chain in order. On success the module is
    /// cached, recorded as a GC root, and wrapped in a fresh object
    /// exposing it under `attr_name` (mirroring how an import statement
    /// binds the loaded module to a local name).
    pub fn get_import_module(&self, gc: &Gc, logical_path: &str, attr_name: u64) -> CoreResult<Option<Handle>> {
        if let Some(cached) = self.cache.get(logical_path) {
            return Ok(Some(self.wrap(gc, cached, attr_name)?));
        }

        for entry in self.get_resolution_chain() {
            let Some(key) = entry.strip_prefix(PROVIDER_PREFIX) else {
                // Directory-path entries have no resolver in this crate;
                // an embedder layers its own lookup in behind the same
                // chain-entry shape.
                continue;
            };
            let Some(provider) = self.registry.get(key) else {
                continue;
            };
            if let Some(module) = provider.resolve(logical_path) {
                self.cache.insert(logical_path, module);
                self.roots.write().push(module);
                return Ok(Some(self.wrap(gc, module, attr_name)?));
            }
        }
        Ok(None)
    }

    fn wrap(&self, gc: &Gc, module: Handle, attr_name: u64) -> CoreResult<Handle> {
        let roots = MutableRootMap::new();
        let wrapper = ObjectRef::new_object(gc, &roots, false)?;
        let wrapper = wrapper.set_attribute(gc, &roots, attr_name, module)?;
        Ok(wrapper.handle())
    }

    /// GC root: every module cell handed out via [`Self::get_import_module`]
    /// (spec.md §4.10's "module roots").
    pub fn visit_roots(&self, visit: &mut dyn FnMut(CellPtr)) {
        for &module in self.roots.read().iter() {
            if let Some(cell) = unsafe { module.as_cell() } {
                visit(cell);
            }
        }
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}
