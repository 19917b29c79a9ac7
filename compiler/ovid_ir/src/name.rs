//! Interned string identifier.
//!
//! Provides compact 32-bit interned identifiers for method, type, field,
//! and local names. Equality and hashing are O(1) integer operations.

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Interned string identifier.
///
/// A `Name` is an index into a [`NameInterner`]. Two names compare equal
/// iff they intern the same string in the same interner.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Create from a raw u32 value.
    ///
    /// The caller is responsible for the value being a valid index into
    /// the interner it will be resolved against. Primarily for tests.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Interner storage: string → index map plus index → string table.
struct InternerInner {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

/// String interner shared between the front-end and the analysis.
///
/// # Thread Safety
///
/// Guarded by a single `RwLock`; lookups take the read lock, interning
/// takes the write lock. Interned strings are leaked into `'static`
/// storage so resolved `&str` references never dangle — the interner
/// lives for the whole compilation anyway.
pub struct NameInterner {
    inner: RwLock<InternerInner>,
}

impl NameInterner {
    /// Create an interner with the empty string pre-interned at index 0.
    pub fn new() -> Self {
        let mut map = FxHashMap::default();
        let empty: &'static str = "";
        map.insert(empty, 0);
        Self {
            inner: RwLock::new(InternerInner {
                map,
                strings: vec![empty],
            }),
        }
    }

    /// Intern a string, returning its `Name`.
    ///
    /// Repeated calls with the same content return the same `Name`.
    pub fn intern(&self, s: &str) -> Name {
        if let Some(&idx) = self.inner.read().map.get(s) {
            return Name(idx);
        }

        let mut inner = self.inner.write();
        // Re-check under the write lock: another thread may have interned
        // the string between our read and write acquisitions.
        if let Some(&idx) = inner.map.get(s) {
            return Name(idx);
        }

        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let idx = u32::try_from(inner.strings.len()).unwrap_or(u32::MAX);
        inner.strings.push(leaked);
        inner.map.insert(leaked, idx);
        Name(idx)
    }

    /// Resolve a `Name` back to its string content.
    ///
    /// Returns the empty string for names not produced by this interner.
    pub fn resolve(&self, name: Name) -> &'static str {
        self.inner
            .read()
            .strings
            .get(name.0 as usize)
            .copied()
            .unwrap_or("")
    }

    /// Number of interned strings (including the pre-interned empty string).
    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    /// Returns `true` if only the pre-interned empty string is present.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for NameInterner {
    fn default() -> Self {
        Self::new()
    }
}
