//! The package cache: load a package set, then extract objects by key.

use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::codec::CodecSet;
use crate::config::CacheConfig;
use crate::decode::BlockStreamDecoder;
use crate::format::{read_package, HeaderOutcome, PayloadSource};
use crate::index::{ContentIndex, LocationRecord};
use crate::registry::{PackageKind, PackageRegistry, RegisteredPackage};
use crate::storage::{MemoryStorage, PackageDescriptor};
use crate::{Error, Result};

/// Scratch buffers kept for reuse between extractions.
const SCRATCH_POOL_SIZE: usize = 16;

/// Counters collected while loading.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadSummary {
    /// Packages registered (data and metadata).
    pub packages: usize,
    /// Data packages whose entries were indexed.
    pub indexed: usize,
    /// Metadata-only packages.
    pub skipped_metadata: usize,
    /// Packages rejected because of a header error.
    pub failed: usize,
    /// Distinct keys in the index.
    pub entries: usize,
    /// Entries that replaced a key loaded from an earlier package.
    pub overwritten: usize,
}

/// Content-addressed access to a set of block-compressed packages.
///
/// A cache is loaded once with [`PackageCache::load`] and is read-only from
/// then on; it can be shared by reference across threads. Each extraction
/// opens its own reader on the owning package, so extractions of different
/// keys run in parallel unless [`CacheConfig::serialize_extraction`] is set.
///
/// # Example
///
/// ```no_run
/// use talon_pack::{CacheConfig, PackageCache, PackageFormat};
///
/// let mut cache = PackageCache::new(CacheConfig::new(PackageFormat::Vgxsub));
/// let summary = cache.load("game/packages")?;
/// println!("{} objects in {} packages", summary.entries, summary.packages);
///
/// if let Some(data) = cache.extract(0x1234_5678_9abc_def0, None)? {
///     println!("{} bytes", data.len());
/// }
/// # Ok::<(), talon_pack::Error>(())
/// ```
#[derive(Debug)]
pub struct PackageCache {
    config: CacheConfig,
    decoder: BlockStreamDecoder,
    registry: Option<PackageRegistry>,
    index: ContentIndex,
    summary: LoadSummary,
    scratch: Mutex<Vec<Vec<u8>>>,
    serial: Option<Mutex<()>>,
}

impl PackageCache {
    /// Create an unloaded cache with the built-in codecs.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_codecs(config, CodecSet::new())
    }

    /// Create an unloaded cache with a custom codec set.
    pub fn with_codecs(config: CacheConfig, codecs: CodecSet) -> Self {
        let decoder = BlockStreamDecoder::new(config.format, codecs)
            .with_initial_capacity(config.initial_capacity)
            .with_max_object_size(config.max_object_size);
        let serial = config.serialize_extraction.then(|| Mutex::new(()));

        Self {
            config,
            decoder,
            registry: None,
            index: ContentIndex::new(),
            summary: LoadSummary::default(),
            scratch: Mutex::new(Vec::new()),
            serial,
        }
    }

    /// Index every package under `base_path`.
    ///
    /// A package with a bad header is logged and skipped. A cache can be
    /// loaded once; later calls fail with [`Error::AlreadyLoaded`].
    pub fn load<P: AsRef<Path>>(&mut self, base_path: P) -> Result<LoadSummary> {
        self.ensure_unloaded()?;
        let base_path = base_path.as_ref();
        info!(path = %base_path.display(), format = %self.config.format, "loading packages");

        let registry =
            PackageRegistry::mount(base_path, self.config.storage, self.config.recursive)?;
        self.load_registry(registry)
    }

    /// Index packages held in memory.
    pub fn load_memory(&mut self, storage: MemoryStorage) -> Result<LoadSummary> {
        self.ensure_unloaded()?;
        info!(packages = storage.len(), format = %self.config.format, "loading in-memory packages");
        self.load_registry(PackageRegistry::from_memory(storage))
    }

    fn ensure_unloaded(&self) -> Result<()> {
        match &self.registry {
            Some(registry) => Err(Error::AlreadyLoaded(
                registry.base_path().display().to_string(),
            )),
            None => Ok(()),
        }
    }

    fn load_registry(&mut self, mut registry: PackageRegistry) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();

        for descriptor in registry.enumerate(self.config.format)? {
            let name = descriptor.name.clone();
            match self.load_package(&mut registry, descriptor) {
                Ok(PackageKind::Data { entries }) => {
                    summary.indexed += 1;
                    debug!(package = %name, entries, "indexed package");
                }
                Ok(PackageKind::Metadata { kind }) => {
                    summary.skipped_metadata += 1;
                    debug!(package = %name, kind, "skipped metadata package");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(package = %name, error = %e, "skipping package");
                }
            }
        }

        summary.packages = registry.len();
        summary.entries = self.index.len();
        summary.overwritten = self.index.overwritten();
        info!(
            packages = summary.packages,
            entries = summary.entries,
            skipped = summary.skipped_metadata,
            failed = summary.failed,
            overwritten = summary.overwritten,
            "packages loaded"
        );

        self.registry = Some(registry);
        self.summary = summary;
        Ok(summary)
    }

    fn load_package(
        &mut self,
        registry: &mut PackageRegistry,
        descriptor: PackageDescriptor,
    ) -> Result<PackageKind> {
        let file_name = descriptor
            .name
            .rsplit('/')
            .next()
            .unwrap_or(&descriptor.name)
            .to_string();
        let mut reader = registry.open_descriptor(&descriptor)?;

        match read_package(&mut *reader, self.config.format, &file_name)? {
            HeaderOutcome::Skip { kind } => {
                let kind = PackageKind::Metadata { kind };
                registry.register(descriptor, None, kind);
                Ok(kind)
            }
            HeaderOutcome::Indexed {
                entries,
                payload,
                size_hints,
                ..
            } => {
                let payload = match payload {
                    PayloadSource::Inline => None,
                    PayloadSource::Sibling(name) => Some(registry.sibling(&descriptor, &name)?),
                };
                let kind = PackageKind::Data {
                    entries: entries.len(),
                };
                let package_index = registry.register(descriptor, payload, kind);

                let mut replaced = 0usize;
                for entry in entries {
                    let record = LocationRecord {
                        package_index,
                        offset: entry.offset,
                        compressed_size: entry.compressed_size,
                        decompressed_size_hint: entry.decompressed_size_hint,
                    };
                    if self.index.insert(entry.key, record).is_some() {
                        replaced += 1;
                    }
                }
                if replaced > 0 {
                    debug!(package_index, replaced, "package replaced earlier keys");
                }

                if !size_hints.is_empty() {
                    let applied = size_hints
                        .iter()
                        .filter(|hint| self.index.set_size_hint(hint.key, hint.size))
                        .count();
                    debug!(package_index, applied, hints = size_hints.len(), "applied size hints");
                }
                Ok(kind)
            }
        }
    }

    /// Whether a package set has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.registry.is_some()
    }

    /// Whether `key` is indexed.
    pub fn exists(&self, key: u64) -> bool {
        self.index.exists(key)
    }

    /// The location of `key`.
    pub fn lookup(&self, key: u64) -> Option<LocationRecord> {
        self.index.lookup(key)
    }

    /// Decode the object stored under `key`.
    ///
    /// `expected` is the caller's decompressed size, if known; the result
    /// must match it exactly or [`Error::SizeMismatch`] is returned. A key
    /// that is not indexed yields `Ok(None)`.
    pub fn extract(&self, key: u64, expected: Option<usize>) -> Result<Option<Vec<u8>>> {
        let (Some(record), Some(registry)) = (self.index.lookup(key), self.registry.as_ref())
        else {
            return Ok(None);
        };
        let expected = expected.filter(|&size| size > 0);
        if let Some(size) = expected.filter(|&size| size > self.config.max_object_size) {
            return Err(Error::OutputOverflow {
                offset: 0,
                len: size,
                bound: self.config.max_object_size,
            });
        }
        debug!(
            key = %format!("{:#018x}", key),
            package = record.package_index,
            offset = record.offset,
            "extracting"
        );

        let _serial = self.serial.as_ref().map(|lock| lock.lock());
        let mut reader = registry.open(record.package_index)?;
        let mut scratch = self.take_scratch();
        let result = self
            .decoder
            .decode(&mut *reader, key, &record, expected, &mut scratch);
        self.return_scratch(scratch);
        let data = result?;

        match expected {
            Some(size) if data.len() != size => Err(Error::SizeMismatch {
                expected: size,
                actual: data.len(),
            }),
            _ => Ok(Some(data)),
        }
    }

    /// The stored bytes of `key`, without decoding.
    pub fn extract_raw(&self, key: u64) -> Result<Option<Vec<u8>>> {
        use std::io::{Seek, SeekFrom};
        use talon_common::ReadExt;

        let (Some(record), Some(registry)) = (self.index.lookup(key), self.registry.as_ref())
        else {
            return Ok(None);
        };

        let _serial = self.serial.as_ref().map(|lock| lock.lock());
        let mut reader = registry.open(record.package_index)?;
        reader.seek(SeekFrom::Start(record.offset))?;
        Ok(Some(reader.read_vec(record.compressed_size)?))
    }

    /// Decode a compressed record the caller fetched itself.
    ///
    /// `size` is the exact decompressed size. Returns `None` when the
    /// record does not belong to `key`, is malformed, or `size` is zero.
    pub fn decompress_object(&self, key: u64, data: &[u8], size: usize) -> Option<Vec<u8>> {
        let _serial = self.serial.as_ref().map(|lock| lock.lock());
        match self.decoder.decode_slice(key, data, size) {
            Ok(out) => Some(out),
            Err(e) => {
                debug!(key = %format!("{:#018x}", key), error = %e, "rejected streamed record");
                None
            }
        }
    }

    /// Extract several keys. A failure for one key does not affect the
    /// others; results are in input order.
    pub fn extract_many(&self, keys: &[u64]) -> Vec<(u64, Result<Option<Vec<u8>>>)> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            keys.par_iter()
                .map(|&key| (key, self.extract(key, None)))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            keys.iter()
                .map(|&key| (key, self.extract(key, None)))
                .collect()
        }
    }

    fn take_scratch(&self) -> Vec<u8> {
        self.scratch.lock().pop().unwrap_or_default()
    }

    fn return_scratch(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        let mut pool = self.scratch.lock();
        if pool.len() < SCRATCH_POOL_SIZE {
            pool.push(buffer);
        }
    }

    /// The base path packages were loaded from.
    pub fn packages_path(&self) -> Option<&Path> {
        self.registry.as_ref().map(|r| r.base_path())
    }

    /// Number of indexed keys.
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Number of registered packages.
    pub fn package_count(&self) -> usize {
        self.registry.as_ref().map_or(0, |r| r.len())
    }

    /// Registered packages, by index.
    pub fn packages(&self) -> &[RegisteredPackage] {
        self.registry
            .as_ref()
            .map(|r| r.packages())
            .unwrap_or(&[])
    }

    /// Counters from the last load.
    pub fn load_summary(&self) -> LoadSummary {
        self.summary
    }

    /// The content index.
    pub fn index(&self) -> &ContentIndex {
        &self.index
    }

    /// The configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Drop the loaded package set so the cache can be loaded again.
    pub fn unload(&mut self) {
        self.registry = None;
        self.index = ContentIndex::new();
        self.summary = LoadSummary::default();
        self.scratch.lock().clear();
    }
}
