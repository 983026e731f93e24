//! Registry of the packages behind a content index.

use std::path::{Path, PathBuf};

use crate::config::{PackageFormat, StorageKind};
use crate::storage::{MemoryStorage, PackageDescriptor, PackageRead, Storage};
use crate::{Error, Result};

/// What a registered package contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum PackageKind {
    /// A data package and the number of hash entries it declared.
    Data { entries: usize },
    /// A metadata-only package with its header type.
    Metadata { kind: u64 },
}

/// A package known to the registry.
#[derive(Debug, Clone)]
pub struct RegisteredPackage {
    /// The package file itself.
    pub descriptor: PackageDescriptor,
    /// Separate payload file, when the payload does not live inline.
    pub payload: Option<PackageDescriptor>,
    /// What the package contributes.
    pub kind: PackageKind,
}

impl RegisteredPackage {
    /// Name relative to the base path.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// The file record offsets point into.
    pub fn payload_descriptor(&self) -> &PackageDescriptor {
        self.payload.as_ref().unwrap_or(&self.descriptor)
    }
}

/// Enumerates packages under a base path and opens them on demand.
///
/// Packages are referenced by their registration index. Nothing is held
/// open between calls: every [`PackageRegistry::open`] returns a fresh
/// reader, so concurrent callers never share a cursor.
#[derive(Debug)]
pub struct PackageRegistry {
    base_path: PathBuf,
    storage: Storage,
    packages: Vec<RegisteredPackage>,
}

impl PackageRegistry {
    /// Mount the storage at `base_path`.
    pub fn mount(base_path: &Path, kind: Option<StorageKind>, recursive: bool) -> Result<Self> {
        Ok(Self {
            base_path: base_path.to_path_buf(),
            storage: Storage::open(base_path, kind, recursive)?,
            packages: Vec::new(),
        })
    }

    /// Use in-memory packages.
    pub fn from_memory(storage: MemoryStorage) -> Self {
        Self {
            base_path: PathBuf::new(),
            storage: Storage::Memory(storage),
            packages: Vec::new(),
        }
    }

    /// The path packages were mounted from; empty for in-memory storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The storage backend.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Candidate packages for `format`, in load order.
    pub fn enumerate(&self, format: PackageFormat) -> Result<Vec<PackageDescriptor>> {
        self.storage.enumerate(format.extensions())
    }

    /// Resolve a file named `name` next to `package`.
    pub fn sibling(&self, package: &PackageDescriptor, name: &str) -> Result<PackageDescriptor> {
        self.storage.sibling(package, name)
    }

    /// Register a package, returning its index.
    pub fn register(
        &mut self,
        descriptor: PackageDescriptor,
        payload: Option<PackageDescriptor>,
        kind: PackageKind,
    ) -> u32 {
        let index = self.packages.len() as u32;
        self.packages.push(RegisteredPackage {
            descriptor,
            payload,
            kind,
        });
        index
    }

    /// Open the payload of a registered package.
    pub fn open(&self, index: u32) -> Result<Box<dyn PackageRead>> {
        let package = self.get(index).ok_or(Error::UnknownPackage(index))?;
        self.storage.open_package(package.payload_descriptor())
    }

    /// Open any package the storage knows about.
    pub fn open_descriptor(&self, descriptor: &PackageDescriptor) -> Result<Box<dyn PackageRead>> {
        self.storage.open_package(descriptor)
    }

    /// A registered package.
    pub fn get(&self, index: u32) -> Option<&RegisteredPackage> {
        self.packages.get(index as usize)
    }

    /// All registered packages, by index.
    pub fn packages(&self) -> &[RegisteredPackage] {
        &self.packages
    }

    /// Number of registered packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn test_register_and_open() {
        let storage = MemoryStorage::new()
            .with_package("a.xsub", b"index".to_vec())
            .with_package("a.xsubdata", b"payload".to_vec());
        let mut registry = PackageRegistry::from_memory(storage);

        let packages = registry.enumerate(PackageFormat::XsubV2).unwrap();
        assert_eq!(packages.len(), 1);

        let payload = registry.sibling(&packages[0], "a.xsubdata").unwrap();
        let index = registry.register(
            packages[0].clone(),
            Some(payload),
            PackageKind::Data { entries: 0 },
        );
        assert_eq!(index, 0);
        assert_eq!(registry.len(), 1);

        let mut data = String::new();
        registry.open(0).unwrap().read_to_string(&mut data).unwrap();
        assert_eq!(data, "payload");

        assert!(matches!(registry.open(1), Err(Error::UnknownPackage(1))));
    }

    #[test]
    fn test_mount_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.xpak"), b"1").unwrap();
        std::fs::write(dir.path().join("two.xsub"), b"2").unwrap();

        let registry = PackageRegistry::mount(dir.path(), None, false).unwrap();
        assert_eq!(registry.base_path(), dir.path());
        let names: Vec<_> = registry
            .enumerate(PackageFormat::XsubV2)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["two.xsub", "one.xpak"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sibling_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/p.xsub"), b"i").unwrap();
        std::fs::write(dir.path().join("sub/p.xsubdata"), b"dd").unwrap();

        let registry = PackageRegistry::mount(dir.path(), None, true).unwrap();
        let package = registry.enumerate(PackageFormat::Xsub).unwrap().remove(0);
        let sibling = registry.sibling(&package, "p.xsubdata").unwrap();
        assert_eq!(sibling.name, "sub/p.xsubdata");
        assert_eq!(sibling.size, 2);
        assert!(registry.sibling(&package, "missing").is_err());
    }
}
