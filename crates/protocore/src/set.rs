//! Sets and multisets (spec.md §3.6, §4.6 — C7), implemented as thin
//! wrappers over [`crate::map::PersistentMap`].
//!
//! A value's [`Handle::raw`] bit pattern is already a canonical identity:
//! two equal embedded values always encode to the same word, and two
//! structurally-equal interned heap values (tuples, strings — see
//! [`crate::rope`]) always share one cell address once interned. That
//! means the map's hash-keyed lookup can use `raw()` directly as the key,
//! with no separate structural-hash step, and the original handle can
//! always be reconstructed from the key with `Handle::from_raw`.

use crate::error::CoreResult;
use crate::map::PersistentMap;
use crate::value::Handle;
use crate::Gc;

/// An unordered collection with no duplicate elements.
#[derive(Clone, Copy, Default)]
pub struct PersistentSet {
    map: PersistentMap,
}

impl PersistentSet {
    pub fn empty() -> Self {
        PersistentSet {
            map: PersistentMap::empty(),
        }
    }

    pub fn size(&self) -> u64 {
        self.map.size()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn has(&self, v: Handle) -> bool {
        self.map.has(v.raw())
    }

    pub fn add(&self, gc: &Gc, v: Handle) -> CoreResult<Self> {
        Ok(PersistentSet {
            map: self.map.set(gc, v.raw(), v)?,
        })
    }

    pub fn remove(&self, gc: &Gc, v: Handle) -> CoreResult<Self> {
        Ok(PersistentSet {
            map: self.map.remove(gc, v.raw())?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.map.iter().map(|(_, v)| v)
    }
}

/// An unordered collection that tracks a per-element multiplicity.
#[derive(Clone, Copy, Default)]
pub struct PersistentMultiset {
    map: PersistentMap,
}

impl PersistentMultiset {
    pub fn empty() -> Self {
        PersistentMultiset {
            map: PersistentMap::empty(),
        }
    }

    /// Number of distinct elements (not the sum of counts).
    pub fn size(&self) -> u64 {
        self.map.size()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn has(&self, v: Handle) -> bool {
        self.map.has(v.raw())
    }

    pub fn count(&self, v: Handle) -> i64 {
        self.map.get(v.raw()).as_small_int().unwrap_or(0)
    }

    pub fn add(&self, gc: &Gc, v: Handle) -> CoreResult<Self> {
        let next = self.count(v) + 1;
        Ok(PersistentMultiset {
            map: self.map.set(gc, v.raw(), Handle::encode_small_int(next)?)?,
        })
    }

    /// Decrement `v`'s count, dropping the element entirely once it reaches
    /// zero. A no-op if `v` is not present.
    pub fn remove_one(&self, gc: &Gc, v: Handle) -> CoreResult<Self> {
        let current = self.count(v);
        if current <= 0 {
            return Ok(*self);
        }
        let map = if current == 1 {
            self.map.remove(gc, v.raw())?
        } else {
            self.map.set(gc, v.raw(), Handle::encode_small_int(current - 1)?)?
        };
        Ok(PersistentMultiset { map })
    }

    /// Iterate distinct `(element, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, i64)> + '_ {
        self.map
            .iter()
            .map(|(k, v)| (Handle::from_raw(k), v.as_small_int().unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_gc;

    #[test]
    fn set_add_has_remove() {
        let gc = test_gc();
        let a = Handle::encode_small_int(1).unwrap();
        let b = Handle::encode_small_int(2).unwrap();
        let set = PersistentSet::empty().add(&gc, a).unwrap().add(&gc, a).unwrap();
        assert_eq!(set.size(), 1, "adding the same value twice is idempotent");
        assert!(set.has(a));
        assert!(!set.has(b));

        let removed = set.remove(&gc, a).unwrap();
        assert!(!removed.has(a));
        assert!(set.has(a), "original set must be unaffected");
    }

    #[test]
    fn multiset_tracks_counts() {
        let gc = test_gc();
        let a = Handle::encode_small_int(7).unwrap();
        let ms = PersistentMultiset::empty()
            .add(&gc, a)
            .unwrap()
            .add(&gc, a)
            .unwrap()
            .add(&gc, a)
            .unwrap();
        assert_eq!(ms.count(a), 3);
        assert_eq!(ms.size(), 1);

        let once_removed = ms.remove_one(&gc, a).unwrap();
        assert_eq!(once_removed.count(a), 2);

        let all_removed = once_removed.remove_one(&gc, a).unwrap().remove_one(&gc, a).unwrap();
        assert_eq!(all_removed.count(a), 0);
        assert!(!all_removed.has(a));
        assert_eq!(all_removed.size(), 0);
    }

    #[test]
    fn multiset_remove_one_on_absent_value_is_noop() {
        let gc = test_gc();
        let a = Handle::encode_small_int(1).unwrap();
        let ms = PersistentMultiset::empty();
        let still_empty = ms.remove_one(&gc, a).unwrap();
        assert_eq!(still_empty.size(), 0);
    }
}
