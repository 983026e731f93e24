//! Talon - game package indexing and extraction library.
//!
//! This crate provides a unified interface to the Talon crates for reading
//! block-compressed XPAK/XSUB game packages.
//!
//! # Crates
//!
//! - [`talon_common`] - Common utilities (binary reading, alignment)
//! - [`talon_pack`] - Package headers, content index, block decoding and
//!   the extraction engine
//!
//! # Example
//!
//! ```no_run
//! use talon::prelude::*;
//!
//! let mut cache = PackageCache::new(CacheConfig::new(PackageFormat::XsubV2));
//! let summary = cache.load("game/packages")?;
//! println!("{} objects", summary.entries);
//!
//! if let Some(data) = cache.extract(0x0123_4567_89ab_cdef, None)? {
//!     std::fs::write("object.bin", data)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use talon_common as common;
pub use talon_pack as pack;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use talon_common::BinaryReader;
    pub use talon_pack::{
        BlockCodec, CacheConfig, CodecError, CodecSet, LoadSummary, LocationRecord,
        MemoryStorage, PackageCache, PackageFormat, PackageKind, RegisteredPackage, StorageKind,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
