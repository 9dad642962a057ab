//! Name interning for attribute, parameter, and keyword-argument names.
//!
//! A [`Symbol`] is a compact, `Copy` handle to an interned `&str`. The
//! persistent attribute map (protocore's C3) is keyed by a 64-bit hash, not
//! by the symbol index itself, so every `Symbol` also carries the stable
//! hash of its string — computed once, at intern time, and reused as the
//! map key everywhere a name needs to address an attribute dictionary.
//!
//! # Thread safety
//!
//! Interning is lock-free via [`DashMap`], matching the teacher's string
//! table design: multiple threads may intern concurrently without blocking
//! each other.

use ahash::AHasher;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::LazyLock;

/// An interned name. Four bytes, `Copy`, comparable in O(1).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Symbol {
    index: u32,
}

impl Symbol {
    /// Intern `name`, returning a stable handle to it.
    #[inline]
    pub fn intern(name: &str) -> Symbol {
        NAME_TABLE.intern(name)
    }

    /// The interned string this symbol refers to.
    pub fn as_str(self) -> &'static str {
        NAME_TABLE.get(self).unwrap_or("<invalid-symbol>")
    }

    /// The stable 64-bit hash of this name, used as a key in persistent
    /// ordered maps (attribute dictionaries, closure-locals maps).
    #[inline]
    pub fn key_hash(self) -> u64 {
        NAME_TABLE.key_hash(self)
    }

    /// Hash a name directly without needing a `Symbol` first. Used when a
    /// caller only needs the map key (e.g. keyword-argument binding) and
    /// does not need to retain a reversible handle.
    #[inline]
    pub fn hash_name(name: &str) -> u64 {
        hash_str(name)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
fn hash_str(s: &str) -> u64 {
    let mut hasher = AHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}

struct NameTable {
    /// name-hash -> (leaked &'static str, symbol index)
    by_hash: DashMap<u64, (&'static str, u32)>,
    /// symbol index -> (leaked &'static str, name-hash), the reverse of
    /// `by_hash`, so `as_str`/`key_hash` don't need a linear scan.
    by_index: DashMap<u32, (&'static str, u64)>,
    next_index: AtomicU32,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

static NAME_TABLE: LazyLock<NameTable> = LazyLock::new(NameTable::new);

const PROBE_PRIME: u64 = 0x9e37_79b9_7f4a_7c15;
const MAX_PROBES: u64 = 32;

impl NameTable {
    fn new() -> Self {
        Self {
            by_hash: DashMap::with_capacity(256),
            by_index: DashMap::with_capacity(256),
            next_index: AtomicU32::new(0),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn intern(&self, name: &str) -> Symbol {
        let hash = hash_str(name);
        if let Some(entry) = self.by_hash.get(&hash) {
            if entry.value().0 == name {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Symbol { index: entry.value().1 };
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.insert_probed(name, hash)
    }

    fn insert_probed(&self, name: &str, original_hash: u64) -> Symbol {
        let mut probe = original_hash;
        for i in 0..=MAX_PROBES {
            match self.by_hash.entry(probe) {
                dashmap::mapref::entry::Entry::Occupied(e) => {
                    if e.get().0 == name {
                        return Symbol { index: e.get().1 };
                    }
                }
                dashmap::mapref::entry::Entry::Vacant(e) => {
                    let idx = self.insert_new(name, probe);
                    e.insert((self.by_index.get(&idx).unwrap().0, idx));
                    return Symbol { index: idx };
                }
            }
            probe = original_hash.wrapping_add((i + 1).wrapping_mul(PROBE_PRIME));
        }
        // Exhausted the probe sequence; last writer wins rather than looping
        // forever. Collisions this deep would require a pathological input.
        let idx = self.insert_new(name, probe);
        self.by_hash.insert(probe, (self.by_index.get(&idx).unwrap().0, idx));
        Symbol { index: idx }
    }

    /// Leak `name`, assign it a fresh index, and record it in `by_index`
    /// under `key_hash`. Returns the new index; the caller still owns
    /// inserting into `by_hash`.
    fn insert_new(&self, name: &str, key_hash: u64) -> u32 {
        let leaked: &'static str = Box::leak(name.to_string().into_boxed_str());
        let idx = self.next_index.fetch_add(1, Ordering::Relaxed);
        self.by_index.insert(idx, (leaked, key_hash));
        idx
    }

    fn get(&self, symbol: Symbol) -> Option<&'static str> {
        self.by_index.get(&symbol.index).map(|e| e.value().0)
    }

    fn key_hash(&self, symbol: Symbol) -> u64 {
        self.by_index.get(&symbol.index).map(|e| e.value().1).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_same_symbol() {
        assert_eq!(Symbol::intern("x"), Symbol::intern("x"));
        assert_ne!(Symbol::intern("x"), Symbol::intern("y"));
    }

    #[test]
    fn round_trips_through_as_str() {
        let s = Symbol::intern("attribute_name");
        assert_eq!(s.as_str(), "attribute_name");
    }

    #[test]
    fn key_hash_stable_across_interns() {
        let a = Symbol::intern("stable_key");
        let b = Symbol::intern("stable_key");
        assert_eq!(a.key_hash(), b.key_hash());
        assert_eq!(a.key_hash(), Symbol::hash_name("stable_key"));
    }

    #[test]
    fn concurrent_intern_is_consistent() {
        use std::thread;
        let handles: Vec<_> = (0..16)
            .map(|i| thread::spawn(move || Symbol::intern(&format!("concurrent_{i}"))))
            .collect();
        let syms: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (i, s) in syms.iter().enumerate() {
            assert_eq!(s.as_str(), format!("concurrent_{i}"));
        }
    }
}
