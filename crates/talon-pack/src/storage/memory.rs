//! In-memory package storage.

use std::sync::Arc;

use super::{has_extension, PackageDescriptor, PackageLocation};

/// Named packages held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    packages: Vec<(String, Arc<[u8]>)>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package. Names use `/` as the separator.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Arc<[u8]>>) {
        self.packages.push((name.into(), data.into()));
    }

    /// Builder form of [`MemoryStorage::insert`].
    pub fn with_package(mut self, name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        self.insert(name, data);
        self
    }

    /// Number of packages held.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether no packages are held.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub(crate) fn enumerate(&self, extensions: &[&str]) -> Vec<PackageDescriptor> {
        let mut packages = Vec::new();
        for ext in extensions {
            let mut group: Vec<_> = self
                .packages
                .iter()
                .enumerate()
                .filter(|(_, (name, _))| has_extension(name, ext))
                .map(|(index, (name, data))| descriptor(index, name, data))
                .collect();
            group.sort_by(|a, b| a.name.cmp(&b.name));
            packages.extend(group);
        }
        packages
    }

    pub(crate) fn find(&self, name: &str) -> Option<PackageDescriptor> {
        self.packages
            .iter()
            .enumerate()
            .find(|(_, (n, _))| n.eq_ignore_ascii_case(name))
            .map(|(index, (name, data))| descriptor(index, name, data))
    }

    pub(crate) fn get(&self, index: usize) -> Option<Arc<[u8]>> {
        self.packages.get(index).map(|(_, data)| Arc::clone(data))
    }
}

fn descriptor(index: usize, name: &str, data: &[u8]) -> PackageDescriptor {
    PackageDescriptor {
        name: name.to_string(),
        size: data.len() as u64,
        location: PackageLocation::Memory(index),
    }
}
