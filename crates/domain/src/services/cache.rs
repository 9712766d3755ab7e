use moka::sync::Cache;

use crate::model::{NATIVE_DIVISIBILITY, NATIVE_MOSAIC};

/// Process-wide mapping from canonical mosaic name to divisibility.
///
/// Entries never expire and are never replaced: the first resolution for a
/// name is permanent, so concurrent lookups always agree.
#[derive(Debug, Clone)]
pub struct DivisibilityCache {
    entries: Cache<String, u8>,
}

impl DivisibilityCache {
    /// Builds a cache seeded with the native asset.
    pub fn new() -> Self {
        let entries = Cache::builder().build();
        entries.insert(NATIVE_MOSAIC.to_string(), NATIVE_DIVISIBILITY);
        Self { entries }
    }

    pub fn get(&self, full_name: &str) -> Option<u8> {
        self.entries.get(full_name)
    }

    /// Stores `divisibility` unless the name is already known and returns
    /// the value that ended up cached.
    pub fn insert_if_absent(&self, full_name: &str, divisibility: u8) -> u8 {
        self.entries
            .entry_by_ref(full_name)
            .or_insert(divisibility)
            .into_value()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.entries.contains_key(full_name)
    }
}

impl Default for DivisibilityCache {
    fn default() -> Self {
        Self::new()
    }
}
