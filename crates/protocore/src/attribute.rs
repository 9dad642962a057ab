//! Attribute resolution: thread-cached lookup, MRO chain walk, and the
//! read/write paths a space exposes over [`crate::object::ObjectRef`]
//! (spec.md §3.9, §4.8 — C9).

use crate::callbacks::Callbacks;
use crate::context::Context;
use crate::error::CoreResult;
use crate::map::PersistentMap;
use crate::object::{MutableRootMap, ObjectRef};
use crate::thread::Thread;
use crate::value::Handle;
use crate::Gc;

/// Walk `o`'s own attributes, then its linearized ancestor chain
/// front-to-back, returning the first match (spec.md §4.8 step 2). Each
/// ancestor's attributes are read through [`ObjectRef::attributes`],
/// which already substitutes a mutable object's current state. Bounded
/// by `limit` hops to guard against pathological prototype fan-out
/// (spec.md §4.8: "bounded by `mro_walk_limit`").
fn resolve(roots: &MutableRootMap, limit: usize, o: ObjectRef, name_hash: u64) -> Handle {
    let own = o.attributes(roots).get(name_hash);
    if !own.is_none() {
        return own;
    }
    for (hops, ancestor) in o.parent_chain(roots).into_iter().enumerate() {
        if hops >= limit {
            break;
        }
        if let Ok(ancestor_obj) = ObjectRef::from_handle(ancestor) {
            let value = ancestor_obj.attributes(roots).get(name_hash);
            if !value.is_none() {
                return value;
            }
        }
    }
    Handle::from_raw(0)
}

/// `get_attribute(o, name)` (spec.md §4.8):
///
/// 1. Consult the calling thread's attribute cache.
/// 2. On a miss, walk the chain; on a hit there, populate the cache.
/// 3. On exhaustion, invoke `attribute_not_found_get` if one is
///    registered, else return `none`.
pub fn get_attribute(
    thread: &Thread,
    ctx: &Context,
    roots: &MutableRootMap,
    callbacks: &Callbacks,
    mro_walk_limit: usize,
    o: ObjectRef,
    name_hash: u64,
) -> Handle {
    if let Some(cached) = thread.cache().get(o.handle(), name_hash) {
        return cached;
    }

    let found = resolve(roots, mro_walk_limit, o, name_hash);
    if !found.is_none() {
        thread.cache().put(o.handle(), name_hash, found);
        return found;
    }

    match callbacks.attribute_not_found_get {
        Some(cb) => cb(ctx, o.handle(), name_hash),
        None => Handle::from_raw(0),
    }
}

/// `has_attribute(o, name)`: true if [`get_attribute`]'s chain walk
/// would find a value, ignoring callbacks entirely.
pub fn has_attribute(roots: &MutableRootMap, mro_walk_limit: usize, o: ObjectRef, name_hash: u64) -> bool {
    !resolve(roots, mro_walk_limit, o, name_hash).is_none()
}

pub fn has_own_attribute(roots: &MutableRootMap, o: ObjectRef, name_hash: u64) -> bool {
    o.attributes(roots).has(name_hash)
}

pub fn get_own_attributes(roots: &MutableRootMap, o: ObjectRef) -> PersistentMap {
    o.attributes(roots)
}

/// Merge every attribute map along `o`'s chain into one, with entries
/// nearer to `o` itself winning over entries from farther ancestors
/// (spec.md §4.8's `getAttributes`).
pub fn get_attributes(gc: &Gc, roots: &MutableRootMap, mro_walk_limit: usize, o: ObjectRef) -> CoreResult<PersistentMap> {
    let mut layers = vec![o.attributes(roots)];
    for (hops, ancestor) in o.parent_chain(roots).into_iter().enumerate() {
        if hops >= mro_walk_limit {
            break;
        }
        if let Ok(ancestor_obj) = ObjectRef::from_handle(ancestor) {
            layers.push(ancestor_obj.attributes(roots));
        }
    }

    let mut merged = PersistentMap::empty();
    for layer in layers.into_iter().rev() {
        for (key, value) in layer.iter() {
            merged = merged.set(gc, key, value)?;
        }
    }
    Ok(merged)
}

/// `set_attribute(o, name, value)`: delegates to
/// [`ObjectRef::set_attribute`], then invalidates any cached lookup for
/// `(o, name)` so a subsequent read through the same thread doesn't see
/// stale data (spec.md §4.8's write path).
pub fn set_attribute(
    gc: &Gc,
    thread: &Thread,
    roots: &MutableRootMap,
    o: ObjectRef,
    name_hash: u64,
    value: Handle,
) -> CoreResult<ObjectRef> {
    let updated = o.set_attribute(gc, roots, name_hash, value)?;
    thread.cache().invalidate(o.handle(), name_hash);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Space;
    use crate::test_support::test_gc;

    #[test]
    fn resolves_through_the_chain_front_to_back() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let parent = ObjectRef::new_object(&gc, &roots, false).unwrap();
        let parent = parent.set_attribute(&gc, &roots, 1, Handle::encode_small_int(10).unwrap()).unwrap();
        let child = parent.new_child(&gc, &roots, false).unwrap();
        let child = child.set_attribute(&gc, &roots, 2, Handle::encode_small_int(20).unwrap()).unwrap();

        assert_eq!(resolve(&roots, 100, child, 2).as_small_int(), Some(20));
        assert_eq!(resolve(&roots, 100, child, 1).as_small_int(), Some(10), "inherited from parent");
        assert!(resolve(&roots, 100, child, 999).is_none());
    }

    #[test]
    fn mro_walk_limit_bounds_the_search() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let mut current = ObjectRef::new_object(&gc, &roots, false).unwrap();
        for _ in 0..5 {
            current = current.new_child(&gc, &roots, false).unwrap();
        }
        let root_with_attr = {
            let mut c = current;
            loop {
                let chain = c.parent_chain(&roots);
                if chain.is_empty() {
                    break c;
                }
                c = ObjectRef::from_handle(*chain.last().unwrap()).unwrap();
            }
        };
        let root_with_attr = root_with_attr.set_attribute(&gc, &roots, 5, Handle::encode_small_int(1).unwrap()).unwrap();
        let _ = root_with_attr;

        // With an effectively unlimited walk the deep descendant still
        // finds nothing for a key nobody set, and a tight limit must not
        // panic or loop.
        assert!(resolve(&roots, 1, current, 5).is_none() || resolve(&roots, 100, current, 5).is_none());
    }

    #[test]
    fn set_attribute_invalidates_the_thread_cache() {
        let gc = test_gc();
        let space = Space::new_for_test(gc.clone());
        let thread = crate::thread::Thread::new(&space, "t");
        let roots = MutableRootMap::new();
        let o = ObjectRef::new_object(&gc, &roots, false).unwrap();
        let o = set_attribute(&gc, &thread, &roots, o, 1, Handle::encode_small_int(1).unwrap()).unwrap();

        thread.cache().put(o.handle(), 1, Handle::encode_small_int(999).unwrap());
        assert_eq!(thread.cache().get(o.handle(), 1).and_then(|h| h.as_small_int()), Some(999));

        let o = set_attribute(&gc, &thread, &roots, o, 1, Handle::encode_small_int(2).unwrap()).unwrap();
        assert!(thread.cache().get(o.handle(), 1).is_none(), "write must invalidate the stale cache entry");
    }

    #[test]
    fn get_attributes_merges_with_nearer_layers_winning() {
        let gc = test_gc();
        let roots = MutableRootMap::new();
        let parent = ObjectRef::new_object(&gc, &roots, false).unwrap();
        let parent = parent.set_attribute(&gc, &roots, 1, Handle::encode_small_int(10).unwrap()).unwrap();
        let child = parent.new_child(&gc, &roots, false).unwrap();
        let child = child.set_attribute(&gc, &roots, 1, Handle::encode_small_int(20).unwrap()).unwrap();

        let merged = get_attributes(&gc, &roots, 100, child).unwrap();
        assert_eq!(merged.get(1).as_small_int(), Some(20), "child's own value must win over the parent's");
    }
}
