//! Cache configuration.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Default Algorithm A output capacity when no size is known (36 MiB).
pub const DEFAULT_INITIAL_CAPACITY: usize = 0x240_0000;

/// Default hard bound for a single decoded object (1 GiB).
pub const DEFAULT_MAX_OBJECT_SIZE: usize = 0x4000_0000;

/// Archive family to index.
///
/// The variants differ in header layout, hash-entry packing and block
/// scheme; see the `format` module for the on-disk details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum PackageFormat {
    /// Legacy XPAK: offset/size triples, fixed 128-byte command headers.
    Xpak,
    /// XPAK with an out-of-band properties table carrying decompressed
    /// sizes, and blocks padded to 4 bytes.
    XpakIndexed,
    /// Raw-file XSUB: packed hash entries, variable command headers.
    Xsub,
    /// Newer XSUB: 20-byte hash entries, descriptor tables, `.xsub` and
    /// `.xpak` packages, sibling data files for type-1 headers.
    XsubV2,
    /// XSUB with descriptor tables and 16-byte hash entries.
    Vgxsub,
}

impl PackageFormat {
    /// All formats, in display order.
    pub const ALL: [PackageFormat; 5] = [
        Self::Xpak,
        Self::XpakIndexed,
        Self::Xsub,
        Self::XsubV2,
        Self::Vgxsub,
    ];

    /// Package file extensions, in enumeration order.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Xpak | Self::XpakIndexed => &["xpak"],
            Self::Xsub | Self::Vgxsub => &["xsub"],
            Self::XsubV2 => &["xsub", "xpak"],
        }
    }

    /// Whether payloads use explicit block-descriptor tables.
    pub fn uses_block_table(self) -> bool {
        matches!(self, Self::XsubV2 | Self::Vgxsub)
    }

    /// Canonical name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Self::Xpak => "xpak",
            Self::XpakIndexed => "xpak-indexed",
            Self::Xsub => "xsub",
            Self::XsubV2 => "xsub-v2",
            Self::Vgxsub => "vgxsub",
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|format| format.name() == normalized)
            .ok_or_else(|| Error::UnknownFormat(s.to_string()))
    }
}

/// Where packages are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum StorageKind {
    /// A directory of standalone package files.
    Directory,
    /// A single package file.
    File,
    /// A zip container whose entries are packages.
    Container,
}

/// Package cache configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
    /// Archive family.
    pub format: PackageFormat,
    /// Storage backend; `None` detects it from the base path.
    pub storage: Option<StorageKind>,
    /// Descend into subdirectories when enumerating a directory.
    pub recursive: bool,
    /// Initial output capacity for command streams of unknown size.
    pub initial_capacity: usize,
    /// Hard bound on a single decoded object.
    pub max_object_size: usize,
    /// Hold one exclusive lock for the whole of every extraction.
    pub serialize_extraction: bool,
}

impl CacheConfig {
    /// Default configuration for a format.
    pub fn new(format: PackageFormat) -> Self {
        Self {
            format,
            storage: None,
            recursive: false,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            serialize_extraction: false,
        }
    }

    /// Force a storage backend.
    pub fn with_storage(mut self, storage: StorageKind) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Enumerate subdirectories too.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set the initial output capacity for streams of unknown size.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Set the bound on a single decoded object.
    pub fn with_max_object_size(mut self, size: usize) -> Self {
        self.max_object_size = size;
        self
    }

    /// Serialize all extractions behind one lock.
    pub fn with_serialized_extraction(mut self, serialize: bool) -> Self {
        self.serialize_extraction = serialize;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(PackageFormat::Xpak)
    }
}
