//! Legacy XPAK header.

use std::io::{Seek, SeekFrom};

use talon_common::ReadExt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{check_magic, PackHeader};
use crate::storage::PackageRead;
use crate::Result;

/// Version whose header carries 288 extra bytes after the prologue.
pub const XPAK_VERSION_EXTENDED: u16 = 0xD;

/// Bytes inserted after the prologue by [`XPAK_VERSION_EXTENDED`] headers.
pub const XPAK_EXTENDED_GAP: u64 = 288;

/// First 24 bytes of an XPAK header.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct XpakPrologue {
    pub magic: u32,
    pub unknown1: u16,
    pub version: u16,
    pub unknown2: u64,
    pub size: u64,
}

/// Region table that follows the prologue.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct XpakTables {
    pub file_count: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub hash_count: u64,
    pub hash_offset: u64,
    pub hash_size: u64,
    pub unknown3: u64,
    pub unknown_offset: u64,
    pub unknown4: u64,
    /// Properties record count.
    pub index_count: u64,
    /// Properties table offset.
    pub index_offset: u64,
    pub index_size: u64,
}

/// One `{key, offset, size}` hash entry.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct XpakHashEntry {
    pub key: u64,
    /// Relative to the data region.
    pub offset: u64,
    /// Compressed size; the top byte may carry flags.
    pub size: u64,
}

pub(super) fn read_header(reader: &mut dyn PackageRead) -> Result<PackHeader> {
    let prologue: XpakPrologue = reader.read_struct()?;
    check_magic(prologue.magic)?;

    if prologue.version == XPAK_VERSION_EXTENDED {
        reader.seek(SeekFrom::Current(XPAK_EXTENDED_GAP as i64))?;
    }
    let tables: XpakTables = reader.read_struct()?;

    Ok(PackHeader {
        version: prologue.version,
        kind: 0,
        data_offset: tables.data_offset,
        hash_offset: tables.hash_offset,
        hash_count: tables.hash_count,
        index_offset: tables.index_offset,
        index_count: tables.index_count,
    })
}
