//! Execution contexts: argument binding, automatic locals, and the
//! young-generation handoff on return (spec.md §3.9, §4.9 — C10).
//!
//! A context is a node in a tree rooted at its space's root context: one
//! per call frame, holding the automatic-local slots a callee addresses
//! by index, a closure-locals map addressed by parameter-name hash, and
//! a "young generation" list of cells this frame allocated directly
//! (via [`Context::alloc`]) that might not yet be reachable from
//! anywhere else. While a context is live, its whole chain up to the
//! root is a GC root (walked by [`visit_chain`], called from
//! [`crate::thread::Thread`]'s [`protocore_gc::marker::RootProvider`]
//! impl). On exit, if the frame's return value is a heap cell, a
//! `RETURN_REF` cell is allocated *in the parent* and pushed onto the
//! parent's young generation, so the value stays reachable across the
//! instant the child's own roots disappear (spec.md §4.9's
//! "Destruction").

use crate::callbacks::Callbacks;
use crate::error::{CoreError, CoreResult};
use crate::kinds;
use crate::layout;
use crate::map::PersistentMap;
use crate::value::Handle;
use crate::Gc;
use parking_lot::Mutex;
use protocore_gc::cell::CellPtr;
use protocore_util::Symbol;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct Context {
    parent: Option<Arc<Context>>,
    gc: Gc,
    locals: Vec<AtomicU64>,
    closure_locals: PersistentMap,
    young_gen: Mutex<Vec<CellPtr>>,
    return_value: AtomicU64,
}

impl Context {
    /// The space's root context: no parent, no locals, no bound
    /// parameters.
    pub fn root(gc: &Gc) -> Arc<Context> {
        Arc::new(Context {
            parent: None,
            gc: gc.clone(),
            locals: Vec::new(),
            closure_locals: PersistentMap::empty(),
            young_gen: Mutex::new(Vec::new()),
            return_value: AtomicU64::new(0),
        })
    }

    /// A child context with no parameters or locals — the shape a fresh
    /// OS thread's initial frame takes (spec.md §4.11).
    pub fn child(gc: &Gc, parent: &Arc<Context>) -> Arc<Context> {
        Arc::new(Context {
            parent: Some(parent.clone()),
            gc: gc.clone(),
            locals: Vec::new(),
            closure_locals: PersistentMap::empty(),
            young_gen: Mutex::new(Vec::new()),
            return_value: AtomicU64::new(0),
        })
    }

    /// Build a new call frame under `parent`, binding `positional_args`
    /// and `keyword_args` against `param_names` (spec.md §4.9 "Argument
    /// binding"):
    ///
    /// 1. Positional arguments bind left-to-right to `param_names`. More
    ///    positional arguments than parameters is a hard error — this is
    ///    the one binding failure that is not recoverable through a
    ///    callback.
    /// 2. Each keyword argument whose name matches an unbound parameter
    ///    binds that parameter. A name with no matching parameter
    ///    invokes `parameter_not_found`; a name matching an
    ///    already-bound parameter invokes `parameter_twice_assigned`.
    ///    Both are best-effort: the callback's return value does not
    ///    affect binding, matching spec.md's step 4 (only step 3 fails
    ///    the call).
    /// 3. `auto_local_names` sizes the automatic-local slot array,
    ///    initialized to `none`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gc: &Gc,
        parent: &Arc<Context>,
        callbacks: &Callbacks,
        param_names: &[Symbol],
        auto_local_names: &[Symbol],
        positional_args: &[Handle],
        keyword_args: &[(Symbol, Handle)],
    ) -> CoreResult<Arc<Context>> {
        if positional_args.len() > param_names.len() {
            return Err(CoreError::ArgumentMismatch(format!(
                "{} positional arguments supplied for {} parameters",
                positional_args.len(),
                param_names.len()
            )));
        }

        let locals = (0..auto_local_names.len()).map(|_| AtomicU64::new(0)).collect();

        let mut closure = PersistentMap::empty();
        let mut bound = std::collections::HashSet::new();
        for (param, arg) in param_names.iter().zip(positional_args.iter()) {
            let key = param.key_hash();
            closure = closure.set(gc, key, *arg)?;
            bound.insert(key);
        }

        let mut twice_assigned = Vec::new();
        let mut not_found = Vec::new();
        for (name, value) in keyword_args {
            let key = name.key_hash();
            if !param_names.iter().any(|p| p.key_hash() == key) {
                not_found.push((key, *value));
                continue;
            }
            if bound.contains(&key) {
                twice_assigned.push((key, *value));
                continue;
            }
            closure = closure.set(gc, key, *value)?;
            bound.insert(key);
        }

        let ctx = Arc::new(Context {
            parent: Some(parent.clone()),
            gc: gc.clone(),
            locals,
            closure_locals: closure,
            young_gen: Mutex::new(Vec::new()),
            return_value: AtomicU64::new(0),
        });

        for (key, value) in twice_assigned {
            if let Some(cb) = callbacks.parameter_twice_assigned {
                cb(&ctx, key, value);
            }
        }
        for (key, value) in not_found {
            if let Some(cb) = callbacks.parameter_not_found {
                cb(&ctx, key, value);
            }
        }

        Ok(ctx)
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    pub fn get_local(&self, index: usize) -> Handle {
        Handle::from_raw(self.locals[index].load(Ordering::Acquire))
    }

    pub fn set_local(&self, index: usize, value: Handle) {
        self.locals[index].store(value.raw(), Ordering::Release);
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// The parameter-name-hash-keyed map of bound arguments (spec.md
    /// §3.9's "closure-locals").
    pub fn closure_locals(&self) -> PersistentMap {
        self.closure_locals
    }

    pub fn set_return_value(&self, value: Handle) {
        self.return_value.store(value.raw(), Ordering::Release);
    }

    pub fn return_value(&self) -> Handle {
        Handle::from_raw(self.return_value.load(Ordering::Acquire))
    }

    /// Allocate a cell and track it in this context's young generation,
    /// so it stays rooted for as long as this context is live even
    /// before anything else references it (spec.md §3.9's "young
    /// generation... a list of cells allocated directly within this
    /// context").
    pub fn alloc(&self, kind: protocore_gc::cell::CellKind) -> CoreResult<CellPtr> {
        let cell = self.gc.allocate(kind)?;
        self.young_gen.lock().push(cell);
        Ok(cell)
    }

    /// Promote `ctx`'s return value into its parent's young generation
    /// and hand it back (spec.md §4.9's "Destruction"). Call this while
    /// `ctx` is still the thread's current context — the allocation
    /// needs `ctx`'s own chain to still be rooted for the returned
    /// value (if freshly built) to still be reachable at all.
    pub fn finish(ctx: &Arc<Context>) -> CoreResult<Handle> {
        let value = ctx.return_value();
        if let (Some(parent), true) = (&ctx.parent, unsafe { value.as_cell() }.is_some()) {
            let return_ref = alloc_return_ref(&ctx.gc, value)?;
            parent.young_gen.lock().push(return_ref);
        }
        Ok(value)
    }
}

fn alloc_return_ref(gc: &Gc, referenced: Handle) -> CoreResult<CellPtr> {
    let cell = gc.allocate(kinds::RETURN_REF)?;
    unsafe {
        layout::set_u64(cell.as_mut(), 0, referenced.raw());
    }
    Ok(cell)
}

/// Visit every root a single context directly owns: its automatic
/// locals, its closure-locals map, its young generation, and its
/// current return value (in case it has been set but the context has
/// not yet exited).
pub(crate) fn visit_own_roots(ctx: &Context, visit: &mut dyn FnMut(CellPtr)) {
    for local in &ctx.locals {
        let h = Handle::from_raw(local.load(Ordering::Acquire));
        if let Some(c) = unsafe { h.as_cell() } {
            visit(c);
        }
    }
    if let Some(root) = ctx.closure_locals.root_cell() {
        visit(root);
    }
    for &cell in ctx.young_gen.lock().iter() {
        visit(cell);
    }
    let rv = Handle::from_raw(ctx.return_value.load(Ordering::Acquire));
    if let Some(c) = unsafe { rv.as_cell() } {
        visit(c);
    }
}

/// Visit every root reachable from `ctx` up through every ancestor to
/// the space's root context — the shape
/// [`crate::thread::Thread`]'s root-provider impl walks.
pub(crate) fn visit_chain(ctx: &Arc<Context>, visit: &mut dyn FnMut(CellPtr)) {
    let mut current = Some(ctx.clone());
    while let Some(c) = current {
        visit_own_roots(&c, visit);
        current = c.parent.clone();
    }
}

pub(crate) fn register_return_ref_kind() {
    fn visit(cell: CellPtr, visit: &mut dyn FnMut(CellPtr)) {
        let referenced = Handle::from_raw(layout::get_u64(unsafe { cell.as_ref() }, 0));
        if let Some(rc) = unsafe { referenced.as_cell() } {
            visit(rc);
        }
    }
    protocore_gc::cell::register_kind(kinds::RETURN_REF, visit, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;

    #[test]
    fn positional_arguments_bind_left_to_right() {
        let gc = test_gc();
        let root = Context::root(&gc);
        let callbacks = Callbacks::default();
        let x = Symbol::intern("x");
        let y = Symbol::intern("y");
        let args = [Handle::encode_small_int(1).unwrap(), Handle::encode_small_int(2).unwrap()];
        let ctx = Context::new(&gc, &root, &callbacks, &[x, y], &[], &args, &[]).unwrap();
        assert_eq!(ctx.closure_locals().get(x.key_hash()).as_small_int(), Some(1));
        assert_eq!(ctx.closure_locals().get(y.key_hash()).as_small_int(), Some(2));
    }

    #[test]
    fn too_many_positional_arguments_is_an_error() {
        let gc = test_gc();
        let root = Context::root(&gc);
        let callbacks = Callbacks::default();
        let x = Symbol::intern("only_param");
        let args = [Handle::encode_small_int(1).unwrap(), Handle::encode_small_int(2).unwrap()];
        let result = Context::new(&gc, &root, &callbacks, &[x], &[], &args, &[]);
        assert!(matches!(result, Err(CoreError::ArgumentMismatch(_))));
    }

    #[test]
    fn keyword_argument_fills_an_unbound_parameter() {
        let gc = test_gc();
        let root = Context::root(&gc);
        let callbacks = Callbacks::default();
        let a = Symbol::intern("a");
        let b = Symbol::intern("b");
        let kwargs = [(b, Handle::encode_small_int(9).unwrap())];
        let ctx = Context::new(&gc, &root, &callbacks, &[a, b], &[], &[], &kwargs).unwrap();
        assert_eq!(ctx.closure_locals().get(b.key_hash()).as_small_int(), Some(9));
        assert!(ctx.closure_locals().get(a.key_hash()).is_none());
    }

    #[test]
    fn twice_assigned_parameter_invokes_the_callback() {
        use std::sync::atomic::{AtomicU64, Ordering as O};
        static SEEN: AtomicU64 = AtomicU64::new(0);
        fn on_twice(_ctx: &Context, name_hash: u64, _value: Handle) -> Handle {
            SEEN.store(name_hash, O::SeqCst);
            Handle::from_raw(0)
        }

        let gc = test_gc();
        let root = Context::root(&gc);
        let mut callbacks = Callbacks::default();
        callbacks.parameter_twice_assigned = Some(on_twice);
        let a = Symbol::intern("twice_a");
        let args = [Handle::encode_small_int(1).unwrap()];
        let kwargs = [(a, Handle::encode_small_int(2).unwrap())];
        let ctx = Context::new(&gc, &root, &callbacks, &[a], &[], &args, &kwargs).unwrap();
        assert_eq!(SEEN.load(O::SeqCst), a.key_hash());
        // Positional binding wins; the callback's return value never
        // overwrites it.
        assert_eq!(ctx.closure_locals().get(a.key_hash()).as_small_int(), Some(1));
    }

    #[test]
    fn return_value_survives_context_exit_via_parent_young_gen() {
        let gc = test_gc();
        let root = Context::root(&gc);
        let callbacks = Callbacks::default();
        let ctx = Context::new(&gc, &root, &callbacks, &[], &[], &[], &[]).unwrap();

        let map = PersistentMap::empty().set(&gc, 1, Handle::encode_small_int(42).unwrap()).unwrap();
        let returned = Handle::from_cell(map.root_cell().unwrap());
        ctx.set_return_value(returned);

        let result = Context::finish(&ctx).unwrap();
        assert_eq!(result.raw(), returned.raw());

        // The root context's young generation now holds a RETURN_REF
        // keeping the map cell reachable.
        let mut found = false;
        root.young_gen.lock().iter().for_each(|&cell| {
            if cell.kind() == kinds::RETURN_REF {
                found = true;
            }
        });
        assert!(found, "finishing a context must leave a return-ref in the parent's young generation");
    }

    #[test]
    fn root_context_has_no_parent_and_finishing_it_is_a_noop() {
        let gc = test_gc();
        let root = Context::root(&gc);
        root.set_return_value(Handle::encode_small_int(7).unwrap());
        let result = Context::finish(&root).unwrap();
        assert_eq!(result.as_small_int(), Some(7));
    }
}
