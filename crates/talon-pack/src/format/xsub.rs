//! XSUB header and packed hash entries.

use talon_common::ReadExt;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use super::{check_magic, PackHeader};
use crate::storage::PackageRead;
use crate::Result;

/// Header type of packages that carry payload data.
pub const XSUB_TYPE_DATA: u64 = 3;

/// Header type whose payload lives in a sibling `<name>data` file.
pub const XSUB_TYPE_SIDECAR: u64 = 1;

/// Size of the opaque region between the fixed fields and the tables.
pub const XSUB_OPAQUE_LEN: usize = 1896;

/// The 2024-byte XSUB header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct XsubHeader {
    pub magic: u32,
    pub unknown1: u16,
    pub version: u16,
    pub unknown2: u64,
    /// Only [`XSUB_TYPE_DATA`] (and, for some games, [`XSUB_TYPE_SIDECAR`])
    /// headers are indexed.
    pub kind: u64,
    pub size: u64,
    pub opaque: [u8; XSUB_OPAQUE_LEN],
    pub file_count: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub hash_count: u64,
    pub hash_offset: u64,
    pub hash_size: u64,
    pub unknown3: u64,
    pub unknown_offset: u64,
    pub unknown4: u64,
    pub index_count: u64,
    pub index_offset: u64,
    pub index_size: u64,
}

impl XsubHeader {
    /// An all-zero header.
    pub fn zeroed() -> Self {
        <Self as FromZeros>::new_zeroed()
    }
}

/// `{key, packedInfo}` hash entry.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct PackedHashEntry {
    pub key: u64,
    pub packed_info: u64,
}

/// `{key, packedInfo, packedInfoEx}` hash entry.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct PackedHashEntryEx {
    pub key: u64,
    pub packed_info: u64,
    pub packed_info_ex: u32,
}

pub(super) fn read_header(reader: &mut dyn PackageRead) -> Result<PackHeader> {
    let header: XsubHeader = reader.read_struct()?;
    check_magic(header.magic)?;

    Ok(PackHeader {
        version: header.version,
        kind: header.kind,
        data_offset: header.data_offset,
        hash_offset: header.hash_offset,
        hash_count: header.hash_count,
        index_offset: header.index_offset,
        index_count: header.index_count,
    })
}
