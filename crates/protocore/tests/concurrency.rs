//! Concurrent CAS-append against one mutable-root list: four threads each
//! append 10,000 disjoint integers, and the final list must hold all
//! 40,000 of them, each exactly once (spec.md §8 scenario 3).

mod common;

use common::new_space;
use protocore::list::PersistentList;
use protocore::value::Handle;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: i64 = 4;
const PER_THREAD: i64 = 10_000;

#[test]
fn four_threads_cas_append_ten_thousand_each() {
    let space = new_space();
    let gc = space.gc().clone();

    // Seed with a sentinel so the mutable ref has a live root cell from
    // the start (an empty `PersistentList` has no backing cell at all).
    let seeded = PersistentList::empty().append_last(&gc, Handle::encode_small_int(-1).unwrap()).unwrap();
    let id = space.mutable_roots().insert_new(&gc, seeded.root_cell().unwrap()).unwrap();

    let barrier = Arc::new(Barrier::new(THREADS as usize));
    let mut handles = Vec::new();
    for t in 0..THREADS {
        let space = space.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let gc = space.gc().clone();
            barrier.wait();
            for i in 0..PER_THREAD {
                let value = t * PER_THREAD + i;
                space
                    .mutable_roots()
                    .update(&gc, id, move |current| {
                        let list = PersistentList::from_root(Some(current));
                        let appended = list.append_last(&gc, Handle::encode_small_int(value).unwrap())?;
                        Ok(appended.root_cell().expect("list is non-empty after append"))
                    })
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.join().expect("worker thread must not panic");
    }

    let final_cell = space.mutable_roots().get(id).unwrap();
    let final_list = PersistentList::from_root(Some(final_cell));
    assert_eq!(final_list.size(), THREADS as u64 * PER_THREAD as u64 + 1, "every append from every thread must land, with none lost to a lost CAS race");

    let values: HashSet<i64> = final_list.iter().filter_map(|h| h.as_small_int()).filter(|&v| v != -1).collect();
    assert_eq!(values.len(), (THREADS * PER_THREAD) as usize, "every appended integer must appear, with no duplicate from a retried update applying twice");
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            assert!(values.contains(&(t * PER_THREAD + i)));
        }
    }
}

#[test]
fn concurrent_object_creation_yields_distinct_identities() {
    use protocore::object::ObjectRef;

    let space = new_space();
    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let space = space.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            let gc = space.gc().clone();
            let roots = space.mutable_roots();
            barrier.wait();
            let mut handles = Vec::with_capacity(500);
            for _ in 0..500 {
                handles.push(ObjectRef::new_object(&gc, roots, false).unwrap().handle().raw());
            }
            handles
        }));
    }

    let mut all = HashSet::new();
    for h in handles {
        for raw in h.join().expect("worker thread must not panic") {
            assert!(all.insert(raw), "two concurrently created objects must never share a handle");
        }
    }
    assert_eq!(all.len(), 8 * 500);
}
