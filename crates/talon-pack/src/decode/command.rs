//! Inline command-stream decoding.
//!
//! A record is a run of block groups. Each group starts with a header of
//! 32-bit command words, one per block: the low 24 bits are the block's
//! stored size and the high 8 bits its compression tag. Blocks follow the
//! header back to back, and the group is padded to 128 bytes after its
//! last block. Decompressed sizes are not recorded, so the write cursor is
//! tracked here and the output grows as needed.

use std::io::{Read, Seek, SeekFrom};

use talon_common::align::{align_group, align_up};
use talon_common::ReadExt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::buffer::GrowableBuffer;
use crate::codec::{CodecError, CodecSet, Compression};
use crate::{Error, Result};

/// Command words held by a fixed group header.
pub const FIXED_COMMAND_SLOTS: usize = 30;

/// Largest command count a variable group header may carry; anything
/// above ends the stream.
pub const MAX_VARIABLE_COMMANDS: u32 = 256;

/// Largest output of one budgeted block.
pub const BUDGETED_BLOCK_LIMIT: u64 = 262_112;

const TAG_STORE: u8 = 0x0;
const TAG_LZ4: u8 = 0x3;
const TAG_BUDGETED: u8 = 0x6;

/// Fixed 128-byte group header.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct CommandGroupHeader {
    pub count: u32,
    pub offset: u32,
    pub commands: [u32; FIXED_COMMAND_SLOTS],
}

/// How group headers are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupHeaderKind {
    /// Always [`CommandGroupHeader`]; more than 30 commands is an error.
    Fixed,
    /// `count, offset`, then `max(30, count)` command words.
    Variable,
}

/// Command-stream parameters of one format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLayout {
    /// Group header layout.
    pub header: GroupHeaderKind,
    /// Every block's stored size is rounded up to this.
    pub block_alignment: u64,
    /// Tags whose payload starts with a 32-bit decompressed length.
    pub prefixed_tags: &'static [u8],
}

/// A decoded command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Stored size of the block.
    pub size: u32,
    /// Compression tag.
    pub tag: u8,
}

impl Command {
    /// Split a command word.
    #[inline]
    pub const fn from_word(word: u32) -> Self {
        Self {
            size: word & 0x00FF_FFFF,
            tag: (word >> 24) as u8,
        }
    }

    /// Pack into a command word.
    #[inline]
    pub const fn to_word(self) -> u32 {
        ((self.tag as u32) << 24) | (self.size & 0x00FF_FFFF)
    }
}

struct Group {
    commands: Vec<Command>,
    header_size: u64,
}

/// Output sizing for one decode.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OutputPlan {
    /// Bytes to allocate up front.
    pub initial: usize,
    /// Hard bound on the output.
    pub bound: usize,
    /// Known total size, used by budgeted blocks.
    pub budget: Option<u64>,
}

impl CommandLayout {
    fn read_group<R: Read + ?Sized>(&self, reader: &mut R, offset: u64) -> Result<Option<Group>> {
        match self.header {
            GroupHeaderKind::Fixed => {
                let header: CommandGroupHeader = reader.read_struct()?;
                let count = header.count as usize;
                if count > FIXED_COMMAND_SLOTS {
                    return Err(Error::MalformedBlock {
                        offset,
                        reason: format!(
                            "{} commands in a {}-slot header",
                            count, FIXED_COMMAND_SLOTS
                        ),
                    });
                }
                let words = header.commands;
                Ok(Some(Group {
                    commands: words[..count].iter().map(|&w| Command::from_word(w)).collect(),
                    header_size: std::mem::size_of::<CommandGroupHeader>() as u64,
                }))
            }
            GroupHeaderKind::Variable => {
                let count = reader.read_u32_le()?;
                let _offset = reader.read_u32_le()?;
                if count > MAX_VARIABLE_COMMANDS {
                    return Ok(None);
                }
                let slots = (count as usize).max(FIXED_COMMAND_SLOTS);
                let words: Vec<u32> = reader.read_array(slots)?;
                Ok(Some(Group {
                    commands: words[..count as usize]
                        .iter()
                        .map(|&w| Command::from_word(w))
                        .collect(),
                    header_size: 8 + 4 * slots as u64,
                }))
            }
        }
    }

    /// Decode `compressed_size` bytes of command groups starting at `offset`.
    pub(crate) fn decode<R: Read + Seek + ?Sized>(
        &self,
        reader: &mut R,
        offset: u64,
        compressed_size: u64,
        plan: OutputPlan,
        codecs: &CodecSet,
        scratch: &mut Vec<u8>,
    ) -> Result<Vec<u8>> {
        let mut output = GrowableBuffer::with_capacity(plan.initial, plan.bound);
        let mut budget = plan.budget;
        let mut cursor = 0usize;
        let mut consumed = 0u64;
        let mut position = offset;

        reader.seek(SeekFrom::Start(position))?;
        while consumed < compressed_size {
            let Some(group) = self.read_group(reader, position)? else {
                break;
            };
            position += group.header_size;

            let last = group.commands.len().saturating_sub(1);
            for (i, command) in group.commands.iter().enumerate() {
                reader.read_into(scratch, command.size as u64)?;
                let written = self.decode_block(
                    *command,
                    scratch,
                    &mut output,
                    cursor,
                    &mut budget,
                    codecs,
                    position,
                )?;
                cursor += written;
                output.commit(cursor);

                let stored = align_up(command.size as u64, self.block_alignment);
                let next = if i == last {
                    align_group(position + stored)
                } else {
                    position + stored
                };
                consumed += next - position;
                position = next;
                reader.seek(SeekFrom::Start(position))?;
            }
            consumed += group.header_size;
        }

        Ok(output.into_vec())
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_block(
        &self,
        command: Command,
        block: &[u8],
        output: &mut GrowableBuffer,
        cursor: usize,
        budget: &mut Option<u64>,
        codecs: &CodecSet,
        offset: u64,
    ) -> Result<usize> {
        let codec_error = |source: CodecError| Error::Codec { offset, source };

        match command.tag {
            TAG_STORE => {
                output.window(cursor, block.len())?.copy_from_slice(block);
                *budget = budget.map(|b| b.saturating_sub(block.len() as u64));
                Ok(block.len())
            }
            TAG_LZ4 => decode_unsized(codecs, block, output, cursor, offset),
            TAG_BUDGETED => {
                let remaining = budget.filter(|&b| b > 0).ok_or_else(|| Error::MalformedBlock {
                    offset,
                    reason: "budgeted block without a known object size".into(),
                })?;
                let len = remaining.min(BUDGETED_BLOCK_LIMIT) as usize;
                *budget = Some(remaining - len as u64);
                codecs
                    .decode_exact(Compression::Oodle, block, output.window(cursor, len)?)
                    .map_err(codec_error)?;
                Ok(len)
            }
            tag if self.prefixed_tags.contains(&tag) => {
                if block.len() < 4 {
                    return Err(Error::MalformedBlock {
                        offset,
                        reason: format!("{}-byte block has no length prefix", block.len()),
                    });
                }
                let len = u32::from_le_bytes([block[0], block[1], block[2], block[3]]) as usize;
                codecs
                    .decode_exact(Compression::Oodle, &block[4..], output.window(cursor, len)?)
                    .map_err(codec_error)?;
                Ok(len)
            }
            _ => Ok(0),
        }
    }
}

/// Decode an LZ4 block whose output size is unknown, growing the output
/// until it fits or the bound is reached.
fn decode_unsized(
    codecs: &CodecSet,
    block: &[u8],
    output: &mut GrowableBuffer,
    cursor: usize,
    offset: u64,
) -> Result<usize> {
    let room = output.limit().saturating_sub(cursor);
    let mut window = output
        .capacity()
        .saturating_sub(cursor)
        .max(block.len().saturating_mul(4))
        .min(room);

    loop {
        match codecs.decode(Compression::Lz4, block, output.window(cursor, window)?) {
            Ok(written) => return Ok(written),
            Err(CodecError::OutputTooSmall { .. }) if window < room => {
                window = window.saturating_mul(2).max(64).min(room);
            }
            Err(source) => return Err(Error::Codec { offset, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::testing::{command_group, ReversingCodec};

    const FIXED: CommandLayout = CommandLayout {
        header: GroupHeaderKind::Fixed,
        block_alignment: 1,
        prefixed_tags: &[8],
    };

    fn plan(initial: usize, bound: usize, budget: Option<u64>) -> OutputPlan {
        OutputPlan {
            initial,
            bound,
            budget,
        }
    }

    #[test]
    fn test_command_word() {
        let command = Command::from_word(0x0300_1234);
        assert_eq!(command, Command { size: 0x1234, tag: 3 });
        assert_eq!(command.to_word(), 0x0300_1234);
    }

    #[test]
    fn test_store_blocks_across_groups() {
        let mut stream = command_group(GroupHeaderKind::Fixed, &[(0, b"hello ".to_vec())], 1);
        stream.extend(command_group(GroupHeaderKind::Fixed, &[(0, b"world".to_vec())], 1));
        let len = stream.len() as u64;

        let out = FIXED
            .decode(
                &mut Cursor::new(stream),
                0,
                len,
                plan(64, 1024, None),
                &CodecSet::new(),
                &mut Vec::new(),
            )
            .unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_lz4_grows_past_initial_capacity() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let blocks = vec![
            (TAG_LZ4, lz4_flex::block::compress(&payload[..6000])),
            (TAG_STORE, payload[6000..].to_vec()),
        ];
        let stream = command_group(GroupHeaderKind::Fixed, &blocks, 1);
        let len = stream.len() as u64;

        let out = FIXED
            .decode(
                &mut Cursor::new(stream),
                0,
                len,
                plan(16, 1 << 20, None),
                &CodecSet::new(),
                &mut Vec::new(),
            )
            .unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_bound_is_enforced() {
        let stream = command_group(GroupHeaderKind::Fixed, &[(TAG_STORE, vec![1u8; 100])], 1);
        let len = stream.len() as u64;
        let err = FIXED
            .decode(
                &mut Cursor::new(stream),
                0,
                len,
                plan(16, 64, None),
                &CodecSet::new(),
                &mut Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::OutputOverflow { bound: 64, .. }));
    }

    #[test]
    fn test_padding_and_prefixed_blocks() {
        let mut prefixed = 4u32.to_le_bytes().to_vec();
        prefixed.extend_from_slice(&[1, 2, 3, 4]);
        let blocks = vec![(0xCF, vec![0xEE; 9]), (8, prefixed), (TAG_STORE, b"!".to_vec())];
        let stream = command_group(GroupHeaderKind::Fixed, &blocks, 1);
        let len = stream.len() as u64;

        let codecs = CodecSet::new().with_oodle(ReversingCodec);
        let out = FIXED
            .decode(&mut Cursor::new(stream), 0, len, plan(64, 64, None), &codecs, &mut Vec::new())
            .unwrap();
        assert_eq!(out, [4, 3, 2, 1, b'!']);
    }

    #[test]
    fn test_budgeted_blocks_split_known_size() {
        let blocks = vec![(TAG_BUDGETED, vec![9u8; 6])];
        let stream = command_group(GroupHeaderKind::Fixed, &blocks, 1);
        let len = stream.len() as u64;
        let codecs = CodecSet::new().with_oodle(ReversingCodec);

        let out = FIXED
            .decode(
                &mut Cursor::new(stream.clone()),
                0,
                len,
                plan(6, 6, Some(6)),
                &codecs,
                &mut Vec::new(),
            )
            .unwrap();
        assert_eq!(out, vec![9u8; 6]);

        let err = FIXED
            .decode(&mut Cursor::new(stream), 0, len, plan(6, 6, None), &codecs, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedBlock { .. }));
    }

    #[test]
    fn test_block_alignment_and_variable_header() {
        let layout = CommandLayout {
            header: GroupHeaderKind::Variable,
            block_alignment: 4,
            prefixed_tags: &[8, 9],
        };
        let blocks: Vec<(u8, Vec<u8>)> = (0..40u8).map(|i| (TAG_STORE, vec![i; 3])).collect();
        let stream = command_group(GroupHeaderKind::Variable, &blocks, 4);
        assert_eq!(stream.len(), align_group(8 + 4 * 40 + 40 * 4) as usize);
        let len = stream.len() as u64;

        let codecs = CodecSet::new();
        let growing = plan(8, 1024, None);
        let out = layout
            .decode(&mut Cursor::new(stream), 0, len, growing, &codecs, &mut Vec::new())
            .unwrap();
        let expected: Vec<u8> = (0..40u8).flat_map(|i| [i; 3]).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_oversized_fixed_header_is_malformed() {
        let mut header = CommandGroupHeader::default();
        header.count = 31;
        let bytes = header.as_bytes().to_vec();

        let codecs = CodecSet::new();
        let err = FIXED
            .decode(&mut Cursor::new(bytes), 0, 128, plan(8, 8, None), &codecs, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedBlock { .. }));
    }

    #[test]
    fn test_variable_header_overflow_ends_stream() {
        let layout = CommandLayout {
            header: GroupHeaderKind::Variable,
            block_alignment: 1,
            prefixed_tags: &[8, 9],
        };
        let mut bytes = 257u32.to_le_bytes().to_vec();
        bytes.resize(128, 0);

        let codecs = CodecSet::new();
        let out = layout
            .decode(&mut Cursor::new(bytes), 0, 128, plan(8, 8, None), &codecs, &mut Vec::new())
            .unwrap();
        assert!(out.is_empty());
    }
}
