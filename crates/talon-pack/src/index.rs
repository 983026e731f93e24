//! Content-addressed index over all loaded packages.

use std::hash::BuildHasherDefault;

use hashbrown::HashMap as FastHashMap;
use rustc_hash::FxHasher;

pub(crate) type FxHashMap<K, V> = FastHashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Where an object lives inside the loaded package set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocationRecord {
    /// Index of the owning package in the registry.
    pub package_index: u32,
    /// Byte offset of the first block group.
    pub offset: u64,
    /// Bytes occupied by the compressed record, including group padding.
    pub compressed_size: u64,
    /// Decompressed size when the format declares it, otherwise 0.
    pub decompressed_size_hint: u64,
}

impl LocationRecord {
    /// Decompressed size, if the format declared one.
    #[inline]
    pub fn known_size(&self) -> Option<u64> {
        (self.decompressed_size_hint != 0).then_some(self.decompressed_size_hint)
    }

    /// One past the last compressed byte.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.compressed_size)
    }
}

/// Mapping from 64-bit content key to [`LocationRecord`].
///
/// Built once while loading, then read-only. Duplicate keys across packages
/// resolve to the last inserted record; the number of replaced keys is
/// tracked so callers can report it.
#[derive(Debug, Default, Clone)]
pub struct ContentIndex {
    entries: FxHashMap<u64, LocationRecord>,
    overwritten: usize,
}

impl ContentIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any existing one for `key`.
    ///
    /// Returns the replaced record.
    pub fn insert(&mut self, key: u64, record: LocationRecord) -> Option<LocationRecord> {
        let previous = self.entries.insert(key, record);
        if previous.is_some() {
            self.overwritten += 1;
        }
        previous
    }

    /// Look up the record for `key`.
    #[inline]
    pub fn lookup(&self, key: u64) -> Option<LocationRecord> {
        self.entries.get(&key).copied()
    }

    /// Whether `key` is indexed.
    #[inline]
    pub fn exists(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    /// Record the decompressed size for an existing key.
    ///
    /// Returns `false` when the key is not indexed.
    pub fn set_size_hint(&mut self, key: u64, size: u64) -> bool {
        match self.entries.get_mut(&key) {
            Some(record) => {
                record.decompressed_size_hint = size;
                true
            }
            None => false,
        }
    }

    /// Number of indexed keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of inserts that replaced an existing key.
    #[inline]
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }

    /// Iterate over all entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, LocationRecord)> + '_ {
        self.entries.iter().map(|(key, record)| (*key, *record))
    }

    /// All keys, sorted ascending.
    pub fn sorted_keys(&self) -> Vec<u64> {
        let mut keys: Vec<u64> = self.entries.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(package_index: u32, offset: u64) -> LocationRecord {
        LocationRecord {
            package_index,
            offset,
            compressed_size: 16,
            decompressed_size_hint: 0,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut index = ContentIndex::new();
        assert!(index.is_empty());
        assert!(index.insert(0xAA, record(0, 0x80)).is_none());

        assert!(index.exists(0xAA));
        assert!(!index.exists(0xBB));
        assert_eq!(index.lookup(0xAA), Some(record(0, 0x80)));
        assert_eq!(index.lookup(0xBB), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_last_insert_wins() {
        let mut index = ContentIndex::new();
        index.insert(0xAA, record(0, 0x80));
        let replaced = index.insert(0xAA, record(1, 0x100));

        assert_eq!(replaced, Some(record(0, 0x80)));
        assert_eq!(index.lookup(0xAA).unwrap().package_index, 1);
        assert_eq!(index.overwritten(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_size_hint_only_for_known_keys() {
        let mut index = ContentIndex::new();
        index.insert(1, record(0, 0));

        assert!(index.set_size_hint(1, 4096));
        assert!(!index.set_size_hint(2, 4096));
        assert_eq!(index.lookup(1).unwrap().known_size(), Some(4096));
    }

    #[test]
    fn test_sorted_keys() {
        let mut index = ContentIndex::new();
        for key in [9u64, 3, 7] {
            index.insert(key, record(0, 0));
        }
        assert_eq!(index.sorted_keys(), vec![3, 7, 9]);
    }
}
