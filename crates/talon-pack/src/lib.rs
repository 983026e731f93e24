//! Package indexing and block-stream extraction for XPAK/XSUB game archives.
//!
//! Game assets are stored in large packages addressed by 64-bit content
//! keys. Each package has a header locating a hash table, and every entry
//! points at a record made of independently compressed blocks. This crate:
//!
//! - Parses the supported header layouts ([`PackageFormat`])
//! - Builds a process-wide [`ContentIndex`] over a directory, a zip
//!   container, a single file or in-memory packages
//! - Reassembles records from inline command streams or descriptor tables
//!   through a pluggable [`CodecSet`] (LZ4 built in)
//! - Serves concurrent extractions without a global lock
//!
//! # Example
//!
//! ```no_run
//! use talon_pack::{CacheConfig, PackageCache, PackageFormat};
//!
//! let mut cache = PackageCache::new(CacheConfig::new(PackageFormat::Xpak));
//! cache.load("packages")?;
//!
//! for key in cache.index().sorted_keys().into_iter().take(10) {
//!     match cache.extract(key, None) {
//!         Ok(Some(data)) => println!("{:016x}: {} bytes", key, data.len()),
//!         Ok(None) => {}
//!         Err(e) => eprintln!("{:016x}: {}", key, e),
//!     }
//! }
//! # Ok::<(), talon_pack::Error>(())
//! ```

mod buffer;
mod cache;
mod codec;
mod config;
mod error;
mod index;
mod registry;

pub mod decode;
pub mod format;
pub mod storage;

#[cfg(test)]
mod testing;

pub use buffer::GrowableBuffer;
pub use cache::{LoadSummary, PackageCache};
pub use codec::{BlockCodec, CodecError, CodecSet, Compression, Lz4Codec};
pub use config::{
    CacheConfig, PackageFormat, StorageKind, DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_OBJECT_SIZE,
};
pub use decode::{BlockScheme, BlockStreamDecoder};
pub use error::{Error, Result};
pub use index::{ContentIndex, LocationRecord};
pub use registry::{PackageKind, PackageRegistry, RegisteredPackage};
pub use storage::{MemoryStorage, PackageDescriptor, PackageRead};
