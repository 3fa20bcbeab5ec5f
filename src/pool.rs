//! Process-wide string interning.
//!
//! Unit identifiers are used as graph node keys, as hash-set members inside
//! edge sets, and as serialized record keys. Interning them into a dense
//! `Sym` keeps nodes small and edge-set hashing cheap, the same tradeoff the
//! teacher crate makes by keying its `GraphEdges`/`SolFilesCache` structures
//! on compact handles rather than `String` where it can.

use std::collections::HashMap;
use std::sync::RwLock;

/// A dense, interned handle for a unit identifier string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sym(u32);

impl Sym {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Reconstructs a `Sym` from a previously-returned index. Used by `graph::NodeId` to recover
    /// the interned unit after unpacking its bit-packed encoding.
    pub(crate) fn from_index(idx: u32) -> Self {
        Sym(idx)
    }
}

/// A thread-safe append-only intern table.
#[derive(Debug, Default)]
pub struct StringPool {
    inner: RwLock<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    strings: Vec<String>,
    ids: HashMap<String, Sym>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning its dense id. Repeated calls with an equal
    /// string return the same id.
    pub fn intern(&self, s: &str) -> Sym {
        if let Some(&sym) = self.inner.read().unwrap().ids.get(s) {
            return sym;
        }
        let mut inner = self.inner.write().unwrap();
        // Re-check: another writer may have interned `s` between the read-unlock above and
        // taking the write lock.
        if let Some(&sym) = inner.ids.get(s) {
            return sym;
        }
        let sym = Sym(inner.strings.len() as u32);
        inner.strings.push(s.to_owned());
        inner.ids.insert(s.to_owned(), sym);
        sym
    }

    /// Resolves a previously interned id back to its string.
    pub fn resolve(&self, sym: Sym) -> String {
        self.inner.read().unwrap().strings[sym.index()].clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
