//! Process-wide synthesis cache.
//!
//! One compiled clone routine per type for the process lifetime; no eviction.
//! The cache is plain shared state handed around explicitly (`Arc`), so tests
//! get a fresh one each and nothing leaks across them.
//!
//! Race policy: check-then-insert is atomic per key via the map's entry API.
//! Two first-time requests may both compile (redundantly, with identical
//! source); the first registration wins and every caller is handed the
//! winning entry, so distinct callables are never visible post-race.

use std::sync::Arc;

use dashmap::DashMap;

use crate::bridge::Callable;
use crate::classify::ClonePlan;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub callable: Callable,
    /// The classification that produced the routine, kept for inspection
    /// (skipped members, dependency edges) without re-deriving it.
    pub plan: Arc<ClonePlan>,
}

#[derive(Default)]
pub struct SynthesisCache {
    entries: DashMap<String, CacheEntry>,
}

impl SynthesisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_name: &str) -> Option<CacheEntry> {
        self.entries.get(type_name).map(|e| e.value().clone())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// Atomic insert-if-absent. Returns the entry that is actually in the
    /// cache afterwards — the caller's on a win, the earlier one on a loss.
    pub fn insert_if_absent(&self, type_name: &str, entry: CacheEntry) -> CacheEntry {
        self.entries
            .entry(type_name.to_string())
            .or_insert(entry)
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ------------------------------- Tests ------------------------------------ //
