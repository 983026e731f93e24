//! Block stream decoding.
//!
//! Two schemes exist. Command-stream formats describe each block with a
//! packed 32-bit command word and leave the decompressed size implicit;
//! block-table formats carry explicit descriptors per group. Both walk
//! 128-byte aligned block groups and hand every block to the [`CodecSet`].

pub mod command;
pub mod table;

use std::io::Cursor;

pub use command::{Command, CommandGroupHeader, CommandLayout, GroupHeaderKind};
pub use table::{BlockDescriptor, TableGroupHeader, GROUP_MARKER};

use command::OutputPlan;

use crate::codec::CodecSet;
use crate::config::PackageFormat;
use crate::index::LocationRecord;
use crate::storage::PackageRead;
use crate::{Error, Result};

/// How a format lays out the blocks of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockScheme {
    /// Inline command words.
    Commands(CommandLayout),
    /// Explicit descriptor tables.
    Table,
}

impl BlockScheme {
    /// The scheme used by `format`.
    pub fn for_format(format: PackageFormat) -> Self {
        if format.uses_block_table() {
            return Self::Table;
        }

        let layout = match format {
            PackageFormat::XpakIndexed => CommandLayout {
                header: GroupHeaderKind::Fixed,
                block_alignment: 4,
                prefixed_tags: &[0x8],
            },
            PackageFormat::Xsub => CommandLayout {
                header: GroupHeaderKind::Variable,
                block_alignment: 1,
                prefixed_tags: &[0x8, 0x9],
            },
            _ => CommandLayout {
                header: GroupHeaderKind::Fixed,
                block_alignment: 1,
                prefixed_tags: &[0x8],
            },
        };
        Self::Commands(layout)
    }
}

/// Decodes records of one format.
#[derive(Debug, Clone)]
pub struct BlockStreamDecoder {
    scheme: BlockScheme,
    codecs: CodecSet,
    initial_capacity: usize,
    max_object_size: usize,
}

impl BlockStreamDecoder {
    /// Create a decoder for `format`.
    pub fn new(format: PackageFormat, codecs: CodecSet) -> Self {
        Self {
            scheme: BlockScheme::for_format(format),
            codecs,
            initial_capacity: crate::config::DEFAULT_INITIAL_CAPACITY,
            max_object_size: crate::config::DEFAULT_MAX_OBJECT_SIZE,
        }
    }

    /// Set the output capacity used when no size is known.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Set the bound on a single decoded object.
    pub fn with_max_object_size(mut self, size: usize) -> Self {
        self.max_object_size = size;
        self
    }

    /// The active scheme.
    pub fn scheme(&self) -> BlockScheme {
        self.scheme
    }

    /// The codecs blocks are dispatched to.
    pub fn codecs(&self) -> &CodecSet {
        &self.codecs
    }

    /// Decode `record` for `key` from an open package.
    ///
    /// With `expected` set, exactly that many bytes are allocated and any
    /// write beyond them fails. Otherwise the record's size hint, or the
    /// initial capacity, is a starting point that grows up to the object
    /// bound. `scratch` holds compressed blocks between reads.
    pub fn decode(
        &self,
        reader: &mut dyn PackageRead,
        key: u64,
        record: &LocationRecord,
        expected: Option<usize>,
        scratch: &mut Vec<u8>,
    ) -> Result<Vec<u8>> {
        let plan = self.plan(record, expected);
        match self.scheme {
            BlockScheme::Commands(layout) => layout.decode(
                reader,
                record.offset,
                record.compressed_size,
                plan,
                &self.codecs,
                scratch,
            ),
            BlockScheme::Table => table::decode(
                reader,
                key,
                record.offset,
                record.compressed_size,
                plan,
                &self.codecs,
                scratch,
            ),
        }
    }

    /// Decode a compressed record already held in memory.
    ///
    /// `size` must be the exact decompressed size and cannot be zero.
    pub fn decode_slice(&self, key: u64, data: &[u8], size: usize) -> Result<Vec<u8>> {
        if size == 0 {
            return Err(Error::StreamRejected("decompressed size is required".into()));
        }
        if size > self.max_object_size {
            return Err(Error::OutputOverflow {
                offset: 0,
                len: size,
                bound: self.max_object_size,
            });
        }

        match self.scheme {
            BlockScheme::Commands(layout) => {
                let plan = OutputPlan {
                    initial: size,
                    bound: size,
                    budget: Some(size as u64),
                };
                let out = layout.decode(
                    &mut Cursor::new(data),
                    0,
                    data.len() as u64,
                    plan,
                    &self.codecs,
                    &mut Vec::new(),
                )?;
                if out.len() != size {
                    return Err(Error::SizeMismatch {
                        expected: size,
                        actual: out.len(),
                    });
                }
                Ok(out)
            }
            BlockScheme::Table => table::decode_slice(key, data, size, &self.codecs),
        }
    }

    fn plan(&self, record: &LocationRecord, expected: Option<usize>) -> OutputPlan {
        if let Some(size) = expected {
            return OutputPlan {
                initial: size,
                bound: size,
                budget: Some(size as u64),
            };
        }

        let hint = record
            .known_size()
            .filter(|&size| size <= self.max_object_size as u64)
            .map(|size| size as usize);
        match (self.scheme, hint) {
            (BlockScheme::Table, Some(size)) => OutputPlan {
                initial: size,
                bound: size,
                budget: Some(size as u64),
            },
            (BlockScheme::Commands(_), Some(size)) => OutputPlan {
                initial: size,
                bound: self.max_object_size,
                budget: Some(size as u64),
            },
            (_, None) => OutputPlan {
                initial: self.initial_capacity.min(self.max_object_size),
                bound: self.max_object_size,
                budget: None,
            },
        }
    }
}
