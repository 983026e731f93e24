//! Zip container storage.
//!
//! Packages are entries of a single zip file. Stored entries are read in
//! place through a bounded window over a fresh file handle; compressed
//! entries are inflated on first access and the result is kept.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::debug;
use zip::{CompressionMethod, ZipArchive};

use super::{has_extension, PackageDescriptor, PackageLocation, PackageRead};
use crate::{Error, Result};

#[derive(Debug)]
struct ContainerEntry {
    archive_index: usize,
    name: String,
    size: u64,
    data_start: u64,
    stored: bool,
    inflated: OnceLock<Arc<[u8]>>,
}

/// Packages held inside a zip container.
#[derive(Debug)]
pub struct ContainerStorage {
    path: PathBuf,
    entries: Vec<ContainerEntry>,
}

impl ContainerStorage {
    /// Read the container's central directory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut archive = ZipArchive::new(File::open(path)?)?;
        let mut entries = Vec::with_capacity(archive.len());

        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if !entry.is_file() {
                continue;
            }
            entries.push(ContainerEntry {
                archive_index: index,
                name: entry.name().replace('\\', "/"),
                size: entry.size(),
                data_start: entry.data_start(),
                stored: entry.compression() == CompressionMethod::Stored,
                inflated: OnceLock::new(),
            });
        }

        debug!(path = %path.display(), entries = entries.len(), "opened container");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Path of the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List entries whose extension matches, grouped by extension then
    /// sorted by name.
    pub fn enumerate(&self, extensions: &[&str]) -> Vec<PackageDescriptor> {
        let mut packages = Vec::new();
        for ext in extensions {
            let mut group: Vec<_> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| has_extension(&e.name, ext))
                .map(|(index, e)| self.descriptor(index, e))
                .collect();
            group.sort_by(|a, b| a.name.cmp(&b.name));
            packages.extend(group);
        }
        packages
    }

    /// Find an entry by its full name, ignoring ASCII case.
    pub fn find(&self, name: &str) -> Option<PackageDescriptor> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.name.eq_ignore_ascii_case(name))
            .map(|(index, e)| self.descriptor(index, e))
    }

    /// Open an entry for positioned reads.
    pub fn open_entry(&self, index: usize) -> Result<Box<dyn PackageRead>> {
        let entry = self.entries.get(index).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no container entry {}", index),
            ))
        })?;

        if entry.stored {
            let file = File::open(&self.path)?;
            return Ok(Box::new(WindowReader::new(file, entry.data_start, entry.size)));
        }

        if let Some(data) = entry.inflated.get() {
            return Ok(Box::new(Cursor::new(Arc::clone(data))));
        }

        let mut archive = ZipArchive::new(File::open(&self.path)?)?;
        let mut file = archive.by_index(entry.archive_index)?;
        let mut data = Vec::with_capacity(entry.size as usize);
        file.read_to_end(&mut data)?;
        debug!(entry = %entry.name, bytes = data.len(), "inflated container entry");

        let data = entry.inflated.get_or_init(|| Arc::from(data));
        Ok(Box::new(Cursor::new(Arc::clone(data))))
    }

    fn descriptor(&self, index: usize, entry: &ContainerEntry) -> PackageDescriptor {
        PackageDescriptor {
            name: entry.name.clone(),
            size: entry.size,
            location: PackageLocation::ContainerEntry(index),
        }
    }
}

/// A bounded, independently positioned view into a larger stream.
#[derive(Debug)]
pub struct WindowReader<R> {
    inner: R,
    start: u64,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek> WindowReader<R> {
    /// View `len` bytes of `inner` starting at `start`.
    pub fn new(inner: R, start: u64, len: u64) -> Self {
        Self {
            inner,
            start,
            len,
            pos: 0,
        }
    }
}

impl<R: Read + Seek> Read for WindowReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(remaining.min(usize::MAX as u64) as usize);
        self.inner.seek(SeekFrom::Start(self.start + self.pos))?;
        let read = self.inner.read(&mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for WindowReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of window",
            )),
        }
    }
}

impl<R: Read + Seek + Send> PackageRead for WindowReader<R> {
    fn len(&self) -> u64 {
        self.len
    }
}
