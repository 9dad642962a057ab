//! End-to-end container properties spanning the persistent map/list/rope
//! family, black-box through the crate's public surface (no `test_support`
//! access from here, unlike the inline unit tests in `src/`).

mod common;

use common::new_space;
use protocore::list::PersistentList;
use protocore::map::PersistentMap;
use protocore::rope::ProtoTuple;
use protocore::value::Handle;

#[test]
fn map_set_get_remove_round_trip_at_scale() {
    let space = new_space();
    let gc = space.gc().clone();

    let mut map = PersistentMap::empty();
    for k in 0..10_000u64 {
        map = map.set(&gc, k, Handle::encode_small_int(k as i64).unwrap()).unwrap();
    }
    assert_eq!(map.size(), 10_000);
    for k in 0..10_000u64 {
        assert_eq!(map.get(k).as_small_int(), Some(k as i64));
    }

    let mut reduced = map;
    for k in (0..10_000u64).step_by(2) {
        reduced = reduced.remove(&gc, k).unwrap();
    }
    assert_eq!(reduced.size(), 5_000);
    for k in (1..10_000u64).step_by(2) {
        assert!(reduced.has(k));
    }
    for k in (0..10_000u64).step_by(2) {
        assert!(!reduced.has(k));
    }
    assert_eq!(map.size(), 10_000, "earlier version must be unaffected by later removals");
}

#[test]
fn list_persists_every_version_across_structural_edits() {
    let space = new_space();
    let gc = space.gc().clone();

    let mut versions = Vec::new();
    let mut list = PersistentList::empty();
    for i in 0..500i64 {
        list = list.append_last(&gc, Handle::encode_small_int(i).unwrap()).unwrap();
        versions.push(list);
    }

    for (i, v) in versions.iter().enumerate() {
        assert_eq!(v.size(), (i + 1) as u64);
        assert_eq!(v.get_at(0).unwrap().as_small_int(), Some(0));
        assert_eq!(v.get_at(i as i64).unwrap().as_small_int(), Some(i as i64));
        assert_eq!(v.get_at(i as i64 + 1).unwrap(), protocore::value::NONE, "reading past a version's own size must return none");
    }
}

#[test]
fn list_split_and_slice_compose_back_to_the_original() {
    let space = new_space();
    let gc = space.gc().clone();

    let mut list = PersistentList::empty();
    for i in 0..1000i64 {
        list = list.append_last(&gc, Handle::encode_small_int(i).unwrap()).unwrap();
    }

    let (prefix, suffix) = list.split_first(&gc, 400).unwrap();
    let rejoined = prefix.extend(&gc, &suffix).unwrap();
    let original: Vec<_> = list.iter().map(|h| h.as_small_int().unwrap()).collect();
    let joined: Vec<_> = rejoined.iter().map(|h| h.as_small_int().unwrap()).collect();
    assert_eq!(original, joined);

    let (head, tail) = list.split_last(&gc, 250).unwrap();
    let joined2: Vec<_> = head.extend(&gc, &tail).unwrap().iter().map(|h| h.as_small_int().unwrap()).collect();
    assert_eq!(original, joined2);
}

#[test]
fn rope_tuple_contents_survive_a_collection_and_reinterning() {
    let space = new_space();
    let gc = space.gc().clone();

    let elements: Vec<Handle> = (0..64).map(|i| Handle::encode_small_int(i).unwrap()).collect();
    let a = ProtoTuple::from_handles(&gc, &elements).unwrap();

    space.collect().unwrap();

    let after: Vec<_> = a.rope().iter().map(|h| h.as_small_int().unwrap()).collect();
    assert_eq!(after, (0..64).collect::<Vec<_>>(), "a still-rooted tuple's contents must survive a GC cycle");

    let b = ProtoTuple::from_handles(&gc, &elements).unwrap();
    let rebuilt: Vec<_> = b.rope().iter().map(|h| h.as_small_int().unwrap()).collect();
    assert_eq!(after, rebuilt, "re-interning the same elements after a cycle yields an equal tuple");
}
