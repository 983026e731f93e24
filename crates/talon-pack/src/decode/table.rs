//! Block-descriptor table decoding.
//!
//! Each 128-byte aligned group opens with a small header naming the
//! record's key and a count of 21-byte descriptors. A descriptor gives the
//! block's position relative to the group, its stored and decoded sizes and
//! where in the output it lands, so no running cursor is needed.

use std::io::{Read, Seek, SeekFrom};

use byteorder::ReadBytesExt;
use talon_common::align::align_group;
use talon_common::{BinaryReader, ReadExt};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::command::OutputPlan;
use crate::buffer::GrowableBuffer;
use crate::codec::{CodecSet, Compression};
use crate::{Error, Result};

/// Marker at the start of every block group.
pub const GROUP_MARKER: u16 = 0xF01D;

/// Byte offset of the descriptor count inside a group.
pub const GROUP_COUNT_OFFSET: u64 = 22;

/// Block group header.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct TableGroupHeader {
    pub marker: u16,
    pub key: u64,
    pub opaque: [u8; 12],
    pub count: u8,
}

/// One block of a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct BlockDescriptor {
    /// Compression tag: 0 store, 3 LZ4, 6 proprietary, other padding.
    pub kind: u8,
    pub compressed_size: u32,
    pub decompressed_size: u32,
    /// Relative to the start of the group.
    pub block_offset: u32,
    pub decompressed_offset: u32,
    pub unknown: u32,
}

impl BlockDescriptor {
    /// Codec for this block, or `None` for padding.
    pub fn compression(&self) -> Option<Compression> {
        match self.kind {
            0x0 => Some(Compression::Store),
            0x3 => Some(Compression::Lz4),
            0x6 => Some(Compression::Oodle),
            _ => None,
        }
    }
}

fn apply_block(
    descriptor: &BlockDescriptor,
    block: &[u8],
    output: &mut GrowableBuffer,
    codecs: &CodecSet,
    offset: u64,
) -> Result<()> {
    let Some(compression) = descriptor.compression() else {
        return Ok(());
    };
    let start = descriptor.decompressed_offset as usize;
    let len = descriptor.decompressed_size as usize;

    codecs
        .decode_exact(compression, block, output.window(start, len)?)
        .map_err(|source| Error::Codec { offset, source })?;
    output.commit(start + len);
    Ok(())
}

/// The decoded bytes, which must cover exactly `size` when one is known.
fn finish(output: GrowableBuffer, size: Option<usize>) -> Result<Vec<u8>> {
    match size {
        Some(size) if output.len() != size => Err(Error::SizeMismatch {
            expected: size,
            actual: output.len(),
        }),
        _ => Ok(output.into_vec()),
    }
}

/// Decode the record at `offset` from a seekable package.
///
/// A record whose embedded key does not match `key` is stored unblocked
/// and returned verbatim.
pub(crate) fn decode<R: Read + Seek + ?Sized>(
    reader: &mut R,
    key: u64,
    offset: u64,
    compressed_size: u64,
    plan: OutputPlan,
    codecs: &CodecSet,
    scratch: &mut Vec<u8>,
) -> Result<Vec<u8>> {
    let embedded = if compressed_size >= 10 {
        reader.seek(SeekFrom::Start(offset + 2))?;
        Some(reader.read_u64_le()?)
    } else {
        None
    };
    if embedded != Some(key) {
        if compressed_size > plan.bound as u64 {
            return Err(Error::OutputOverflow {
                offset: 0,
                len: usize::try_from(compressed_size).unwrap_or(usize::MAX),
                bound: plan.bound,
            });
        }
        reader.seek(SeekFrom::Start(offset))?;
        return Ok(reader.read_vec(compressed_size)?);
    }

    let size = plan.budget.map(|s| s as usize);
    let mut output = GrowableBuffer::with_capacity(plan.initial, plan.bound);
    let end = offset + compressed_size;
    let mut group = offset;

    loop {
        reader.seek(SeekFrom::Start(group + GROUP_COUNT_OFFSET))?;
        let count = reader.read_u8()?;
        let descriptors: Vec<BlockDescriptor> = reader.read_array(count as usize)?;
        let mut position = group + GROUP_COUNT_OFFSET + 1 + (count as u64) * 21;

        for descriptor in &descriptors {
            let block_start = group + descriptor.block_offset as u64;
            reader.seek(SeekFrom::Start(block_start))?;
            reader.read_into(scratch, descriptor.compressed_size as u64)?;
            position = block_start + descriptor.compressed_size as u64;
            apply_block(descriptor, scratch, &mut output, codecs, block_start)?;
        }

        group = align_group(position);
        if group >= end {
            break;
        }
    }

    finish(output, size)
}

/// Decode a record already held in memory.
///
/// Every group must carry [`GROUP_MARKER`] and `key`, and every block must
/// lie inside `data`; anything else rejects the whole record.
pub(crate) fn decode_slice(
    key: u64,
    data: &[u8],
    size: usize,
    codecs: &CodecSet,
) -> Result<Vec<u8>> {
    let mut output = GrowableBuffer::with_capacity(size, size);
    let mut reader = BinaryReader::new(data);

    while !reader.is_empty() {
        let group = reader.position();
        let header: TableGroupHeader = reader.read_struct()?;

        let marker = header.marker;
        if marker != GROUP_MARKER {
            return Err(Error::StreamRejected(format!(
                "group at {:#x} has marker {:#06x}",
                group, marker
            )));
        }
        let embedded = header.key;
        if embedded != key {
            return Err(Error::StreamRejected(format!(
                "group at {:#x} belongs to {:#018x}",
                group, embedded
            )));
        }
        if header.count == 0 {
            break;
        }

        let descriptors: Vec<BlockDescriptor> = reader.read_array(header.count as usize)?;
        for descriptor in &descriptors {
            let start = group + descriptor.block_offset as usize;
            let block = start
                .checked_add(descriptor.compressed_size as usize)
                .and_then(|end| data.get(start..end))
                .ok_or_else(|| {
                    Error::StreamRejected(format!(
                        "block at {:#x} runs past the end of the record",
                        start
                    ))
                })?;
            reader.seek(start + block.len());
            apply_block(descriptor, block, &mut output, codecs, start as u64)?;
        }

        reader.seek(align_group(reader.position() as u64) as usize);
    }

    finish(output, Some(size))
}
