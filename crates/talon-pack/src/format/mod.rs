//! Package header readers.
//!
//! Every supported package starts with the same magic, then diverges: the
//! legacy XPAK header locates a table of `{key, offset, size}` triples, the
//! XSUB header carries an explicit type and a table of bit-packed entries.
//! [`read_package`] validates the header for the configured
//! [`PackageFormat`] and returns the decoded hash entries, or a skip outcome
//! for packages that hold no payload.

mod properties;
mod xpak;
mod xsub;

use std::io::{Seek, SeekFrom};

use talon_common::{BinaryReader, ReadExt};

pub use properties::{parse_c_integer, SizeHint};
pub use xpak::{XpakHashEntry, XpakPrologue, XpakTables, XPAK_VERSION_EXTENDED};
pub use xsub::{PackedHashEntry, PackedHashEntryEx, XsubHeader, XSUB_TYPE_DATA, XSUB_TYPE_SIDECAR};

use crate::config::PackageFormat;
use crate::storage::PackageRead;
use crate::{Error, Result};

/// Magic shared by every package format (`KAPI` on disk).
pub const PACKAGE_MAGIC: u32 = 0x4950_414B;

/// Mask applied to legacy entry sizes; the top byte carries flags.
pub const TRIPLE_SIZE_MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;

/// The parts of a package header the indexer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    /// Format version.
    pub version: u16,
    /// Kind discriminator; 0 for formats that have none.
    pub kind: u64,
    /// Start of the payload region.
    pub data_offset: u64,
    /// Start of the hash table.
    pub hash_offset: u64,
    /// Number of hash entries.
    pub hash_count: u64,
    /// Start of the properties table.
    pub index_offset: u64,
    /// Number of properties records.
    pub index_count: u64,
}

/// A decoded hash-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEntry {
    /// Content key.
    pub key: u64,
    /// Absolute offset of the record in its payload file.
    pub offset: u64,
    /// Compressed size of the record.
    pub compressed_size: u64,
    /// Decompressed size, or 0 when unknown.
    pub decompressed_size_hint: u64,
}

/// How `(offset, size)` pairs are stored in a hash table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashPacking {
    /// `{key, offset, size}`; offsets are relative to the data region.
    Triple { data_offset: u64 },
    /// `{key, packed}`; offset is `packed >> 32 << 7`, size is bits 1..31.
    Packed,
    /// As [`HashPacking::Packed`] followed by a 32-bit extension word.
    PackedEx,
}

impl HashPacking {
    /// On-disk size of one entry.
    pub const fn entry_size(self) -> usize {
        match self {
            Self::Triple { .. } => std::mem::size_of::<XpakHashEntry>(),
            Self::Packed => std::mem::size_of::<PackedHashEntry>(),
            Self::PackedEx => std::mem::size_of::<PackedHashEntryEx>(),
        }
    }

    /// Decode one entry from its on-disk bytes.
    pub fn decode(self, bytes: &[u8]) -> Result<HashEntry> {
        let mut reader = BinaryReader::new(bytes);
        Ok(match self {
            Self::Triple { data_offset } => {
                let raw: XpakHashEntry = reader.read_struct()?;
                HashEntry {
                    key: raw.key,
                    offset: data_offset.wrapping_add(raw.offset),
                    compressed_size: raw.size & TRIPLE_SIZE_MASK,
                    decompressed_size_hint: 0,
                }
            }
            Self::Packed => {
                let raw: PackedHashEntry = reader.read_struct()?;
                unpack(raw.key, raw.packed_info)
            }
            Self::PackedEx => {
                let raw: PackedHashEntryEx = reader.read_struct()?;
                unpack(raw.key, raw.packed_info)
            }
        })
    }
}

#[inline]
fn unpack(key: u64, packed: u64) -> HashEntry {
    HashEntry {
        key,
        offset: (packed >> 32) << 7,
        compressed_size: (packed >> 1) & 0x3FFF_FFFF,
        decompressed_size_hint: 0,
    }
}

/// Where a package's payload bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// In the package itself.
    Inline,
    /// In a sibling file with this name.
    Sibling(String),
}

/// Result of reading one package header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderOutcome {
    /// A data package: its header and hash entries.
    Indexed {
        header: PackHeader,
        entries: Vec<HashEntry>,
        payload: PayloadSource,
        /// Decompressed sizes from the properties table, by key.
        size_hints: Vec<SizeHint>,
    },
    /// A metadata-only package; registered but contributes no entries.
    Skip { kind: u64 },
}

/// Read and validate the header of a package named `file_name`.
pub fn read_package(
    reader: &mut dyn PackageRead,
    format: PackageFormat,
    file_name: &str,
) -> Result<HeaderOutcome> {
    let length = reader.len();
    reader.seek(SeekFrom::Start(0))?;

    match format {
        PackageFormat::Xpak | PackageFormat::XpakIndexed => {
            let header = xpak::read_header(reader)?;
            let packing = HashPacking::Triple {
                data_offset: header.data_offset,
            };
            let entries = read_hash_table(reader, &header, packing, length)?;
            let size_hints = if format == PackageFormat::XpakIndexed {
                properties::read_size_hints(reader, &header, length)?
            } else {
                Vec::new()
            };
            Ok(HeaderOutcome::Indexed {
                header,
                entries,
                payload: PayloadSource::Inline,
                size_hints,
            })
        }
        PackageFormat::Xsub | PackageFormat::Vgxsub | PackageFormat::XsubV2 => {
            let header = xsub::read_header(reader)?;
            let payload = match (format, header.kind) {
                (_, XSUB_TYPE_DATA) => PayloadSource::Inline,
                (PackageFormat::XsubV2, XSUB_TYPE_SIDECAR) => {
                    PayloadSource::Sibling(format!("{}data", file_name))
                }
                (_, kind) => return Ok(HeaderOutcome::Skip { kind }),
            };
            let packing = if format == PackageFormat::XsubV2 {
                HashPacking::PackedEx
            } else {
                HashPacking::Packed
            };
            let entries = read_hash_table(reader, &header, packing, length)?;
            Ok(HeaderOutcome::Indexed {
                header,
                entries,
                payload,
                size_hints: Vec::new(),
            })
        }
    }
}

fn read_hash_table(
    reader: &mut dyn PackageRead,
    header: &PackHeader,
    packing: HashPacking,
    length: u64,
) -> Result<Vec<HashEntry>> {
    let out_of_range = || Error::HashTableOutOfRange {
        offset: header.hash_offset,
        count: header.hash_count,
        length,
    };

    let table_len = header
        .hash_count
        .checked_mul(packing.entry_size() as u64)
        .ok_or_else(out_of_range)?;
    let table_end = header
        .hash_offset
        .checked_add(table_len)
        .ok_or_else(out_of_range)?;
    if header.hash_offset >= length || table_end > length {
        return Err(out_of_range());
    }

    reader.seek(SeekFrom::Start(header.hash_offset))?;
    let table = reader.read_vec(table_len)?;
    table
        .chunks_exact(packing.entry_size())
        .map(|chunk| packing.decode(chunk))
        .collect()
}

pub(crate) fn check_magic(actual: u32) -> Result<()> {
    if actual != PACKAGE_MAGIC {
        return Err(Error::InvalidMagic {
            expected: PACKAGE_MAGIC,
            actual,
        });
    }
    Ok(())
}
