//! Package storage backends.
//!
//! A backend enumerates package files and opens them for positioned reads.
//! Every open returns an independent reader with its own cursor, so
//! concurrent extractions never share a file position.

mod container;
mod fs;
mod memory;

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use container::{ContainerStorage, WindowReader};
pub use fs::DirectoryStorage;
pub use memory::MemoryStorage;

use crate::config::StorageKind;
use crate::{Error, Result};

/// A readable, seekable package with a known length.
pub trait PackageRead: Read + Seek + Send {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Whether the package is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A standalone package file.
#[derive(Debug)]
pub struct FileReader {
    file: File,
    len: u64,
}

impl FileReader {
    /// Open a file for reading.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl PackageRead for FileReader {
    fn len(&self) -> u64 {
        self.len
    }
}

impl<T: AsRef<[u8]> + Send> PackageRead for Cursor<T> {
    fn len(&self) -> u64 {
        self.get_ref().as_ref().len() as u64
    }
}

/// Where a package's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLocation {
    /// A file on disk.
    File(PathBuf),
    /// An entry inside the container, by position.
    ContainerEntry(usize),
    /// A named in-memory buffer, by position.
    Memory(usize),
}

/// A package discovered by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Name relative to the base path, `/`-separated.
    pub name: String,
    /// Length in bytes.
    pub size: u64,
    /// How to open it.
    pub location: PackageLocation,
}

/// The storage backend of a loaded package set.
#[derive(Debug)]
pub enum Storage {
    /// Plain files in a directory.
    Directory(DirectoryStorage),
    /// One plain file.
    File(PathBuf),
    /// Entries of a zip container.
    Container(ContainerStorage),
    /// Named in-memory buffers.
    Memory(MemoryStorage),
}

impl Storage {
    /// Open the backend for `base_path`.
    ///
    /// With no explicit kind, a directory selects [`Storage::Directory`], a
    /// `.zip` file selects [`Storage::Container`] and any other file is
    /// treated as a single package.
    pub fn open(base_path: &Path, kind: Option<StorageKind>, recursive: bool) -> Result<Self> {
        let kind = match kind {
            Some(kind) => kind,
            None => detect_kind(base_path)?,
        };

        match kind {
            StorageKind::Directory => Ok(Self::Directory(DirectoryStorage::new(
                base_path, recursive,
            ))),
            StorageKind::File => Ok(Self::File(base_path.to_path_buf())),
            StorageKind::Container => Ok(Self::Container(ContainerStorage::open(base_path)?)),
        }
    }

    /// Enumerate packages whose extension is one of `extensions`.
    ///
    /// Packages are grouped by extension in the given order and sorted by
    /// name within each group. A single-file storage always yields its file.
    pub fn enumerate(&self, extensions: &[&str]) -> Result<Vec<PackageDescriptor>> {
        match self {
            Self::Directory(storage) => storage.enumerate(extensions),
            Self::File(path) => {
                let size = std::fs::metadata(path)?.len();
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(vec![PackageDescriptor {
                    name,
                    size,
                    location: PackageLocation::File(path.clone()),
                }])
            }
            Self::Container(storage) => Ok(storage.enumerate(extensions)),
            Self::Memory(storage) => Ok(storage.enumerate(extensions)),
        }
    }

    /// Find the package named `name` next to `package`.
    pub fn sibling(&self, package: &PackageDescriptor, name: &str) -> Result<PackageDescriptor> {
        match (&package.location, self) {
            (PackageLocation::File(path), _) => {
                let sibling = path.with_file_name(name);
                let size = std::fs::metadata(&sibling)?.len();
                let parent_len = package.name.len() - file_name_of(&package.name).len();
                Ok(PackageDescriptor {
                    name: format!("{}{}", &package.name[..parent_len], name),
                    size,
                    location: PackageLocation::File(sibling),
                })
            }
            (PackageLocation::ContainerEntry(_), Self::Container(storage)) => {
                let full = sibling_name(&package.name, name);
                storage.find(&full).ok_or_else(|| not_found(&full))
            }
            (PackageLocation::Memory(_), Self::Memory(storage)) => {
                let full = sibling_name(&package.name, name);
                storage.find(&full).ok_or_else(|| not_found(&full))
            }
            _ => Err(not_found(name)),
        }
    }

    /// Open a package for reading.
    pub fn open_package(&self, package: &PackageDescriptor) -> Result<Box<dyn PackageRead>> {
        match (&package.location, self) {
            (PackageLocation::File(path), _) => Ok(Box::new(FileReader::open(path)?)),
            (PackageLocation::ContainerEntry(index), Self::Container(storage)) => {
                storage.open_entry(*index)
            }
            (PackageLocation::Memory(index), Self::Memory(storage)) => {
                let data: Arc<[u8]> = storage.get(*index).ok_or_else(|| not_found(&package.name))?;
                Ok(Box::new(Cursor::new(data)))
            }
            _ => Err(not_found(&package.name)),
        }
    }
}

fn detect_kind(base_path: &Path) -> Result<StorageKind> {
    let metadata = std::fs::metadata(base_path)?;
    if metadata.is_dir() {
        return Ok(StorageKind::Directory);
    }

    let is_zip = base_path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    Ok(if is_zip {
        StorageKind::Container
    } else {
        StorageKind::File
    })
}

fn file_name_of(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn sibling_name(name: &str, sibling: &str) -> String {
    match name.rfind('/') {
        Some(pos) => format!("{}/{}", &name[..pos], sibling),
        None => sibling.to_string(),
    }
}

fn not_found(name: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("package not found: {}", name),
    ))
}

/// Whether `name` ends in `.{extension}`, ignoring ASCII case.
pub(crate) fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_name() {
        assert_eq!(sibling_name("a/b/pkg.xsub", "pkg.xsubdata"), "a/b/pkg.xsubdata");
        assert_eq!(sibling_name("pkg.xsub", "pkg.xsubdata"), "pkg.xsubdata");
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension("dir/base.XPAK", "xpak"));
        assert!(!has_extension("dir/base.xpakdata", "xpak"));
        assert!(!has_extension("xpak", "xpak"));
    }

    #[test]
    fn test_detect_kind() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_kind(dir.path()).unwrap(), StorageKind::Directory);

        let zip_path = dir.path().join("packages.ZIP");
        std::fs::write(&zip_path, b"").unwrap();
        assert_eq!(detect_kind(&zip_path).unwrap(), StorageKind::Container);

        let file_path = dir.path().join("base.xpak");
        std::fs::write(&file_path, b"").unwrap();
        assert_eq!(detect_kind(&file_path).unwrap(), StorageKind::File);

        assert!(detect_kind(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_cursor_package_len() {
        let cursor = Cursor::new(vec![0u8; 12]);
        assert_eq!(PackageRead::len(&cursor), 12);
    }
}
