//! Synthetic package fixtures for tests.

use talon_common::align::{align_group, align_up};
use zerocopy::IntoBytes;

use crate::codec::{BlockCodec, CodecError};
use crate::config::PackageFormat;
use crate::decode::{BlockDescriptor, Command, CommandGroupHeader, GroupHeaderKind, GROUP_MARKER};
use crate::format::{
    PackedHashEntry, PackedHashEntryEx, XpakHashEntry, XpakPrologue, XpakTables, XsubHeader,
    PACKAGE_MAGIC, XPAK_VERSION_EXTENDED, XSUB_TYPE_DATA,
};

/// Stand-in for the proprietary codec: output is the input reversed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReversingCodec;

impl BlockCodec for ReversingCodec {
    fn name(&self) -> &'static str {
        "reversing"
    }

    fn decode(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        if dst.len() < src.len() {
            return Err(CodecError::OutputTooSmall {
                needed: src.len(),
                available: dst.len(),
            });
        }
        for (out, byte) in dst.iter_mut().zip(src.iter().rev()) {
            *out = *byte;
        }
        Ok(src.len())
    }
}

fn pad_to(bytes: &mut Vec<u8>, len: usize) {
    if bytes.len() < len {
        bytes.resize(len, 0);
    }
}

/// One command group holding `blocks` as `(tag, stored bytes)`, each
/// padded to `alignment`, the group padded to 128 bytes.
pub(crate) fn command_group(
    header: GroupHeaderKind,
    blocks: &[(u8, Vec<u8>)],
    alignment: u64,
) -> Vec<u8> {
    let words: Vec<u32> = blocks
        .iter()
        .map(|(tag, data)| {
            Command {
                size: data.len() as u32,
                tag: *tag,
            }
            .to_word()
        })
        .collect();

    let mut out = match header {
        GroupHeaderKind::Fixed => {
            let mut group = CommandGroupHeader {
                count: words.len() as u32,
                ..Default::default()
            };
            let mut commands = group.commands;
            commands[..words.len()].copy_from_slice(&words);
            group.commands = commands;
            group.as_bytes().to_vec()
        }
        GroupHeaderKind::Variable => {
            let mut bytes = (words.len() as u32).to_le_bytes().to_vec();
            bytes.extend_from_slice(&0u32.to_le_bytes());
            for slot in 0..words.len().max(30) {
                bytes.extend_from_slice(&words.get(slot).copied().unwrap_or(0).to_le_bytes());
            }
            bytes
        }
    };

    for (_, data) in blocks {
        out.extend_from_slice(data);
        let len = align_up(out.len() as u64, alignment) as usize;
        pad_to(&mut out, len);
    }
    let len = align_group(out.len() as u64) as usize;
    pad_to(&mut out, len);
    out
}

/// A block for [`table_group`].
#[derive(Debug, Clone)]
pub(crate) struct TableBlock {
    kind: u8,
    stored: Vec<u8>,
    decompressed_offset: u32,
    decompressed_size: u32,
}

impl TableBlock {
    pub(crate) fn store(decompressed_offset: u32, data: &[u8]) -> Self {
        Self {
            kind: 0,
            stored: data.to_vec(),
            decompressed_offset,
            decompressed_size: data.len() as u32,
        }
    }

    pub(crate) fn lz4(decompressed_offset: u32, original: &[u8]) -> Self {
        Self {
            kind: 3,
            stored: lz4_flex::block::compress(original),
            decompressed_offset,
            decompressed_size: original.len() as u32,
        }
    }

    pub(crate) fn oodle(decompressed_offset: u32, stored: &[u8], decompressed_size: u32) -> Self {
        Self {
            kind: 6,
            stored: stored.to_vec(),
            decompressed_offset,
            decompressed_size,
        }
    }

    pub(crate) fn padding(len: usize) -> Self {
        Self {
            kind: 0xCF,
            stored: vec![0xCF; len],
            decompressed_offset: 0,
            decompressed_size: 0,
        }
    }
}

/// One descriptor-table group for `key`, padded to 128 bytes.
pub(crate) fn table_group(key: u64, blocks: &[TableBlock]) -> Vec<u8> {
    let mut out = GROUP_MARKER.to_le_bytes().to_vec();
    out.extend_from_slice(&key.to_le_bytes());
    out.extend_from_slice(&[0u8; 12]);
    out.push(blocks.len() as u8);

    let table_end = out.len() + blocks.len() * std::mem::size_of::<BlockDescriptor>();
    let mut data_offset = table_end;
    for block in blocks {
        let descriptor = BlockDescriptor {
            kind: block.kind,
            compressed_size: block.stored.len() as u32,
            decompressed_size: block.decompressed_size,
            block_offset: data_offset as u32,
            decompressed_offset: block.decompressed_offset,
            unknown: 0,
        };
        out.extend_from_slice(descriptor.as_bytes());
        data_offset += block.stored.len();
    }
    for block in blocks {
        out.extend_from_slice(&block.stored);
    }

    let len = align_group(out.len() as u64) as usize;
    pad_to(&mut out, len);
    out
}

/// An explicit hash entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PackEntry {
    key: u64,
    offset: u64,
    size: u64,
}

impl PackEntry {
    /// An entry at a 128-aligned `offset`.
    pub(crate) fn packed(key: u64, offset: u64, size: u64) -> Self {
        Self { key, offset, size }
    }

    fn packed_info(&self) -> u64 {
        ((self.offset >> 7) << 32) | ((self.size & 0x3FFF_FFFF) << 1)
    }
}

/// Builds XPAK packages.
#[derive(Debug, Clone)]
pub(crate) struct XpakBuilder {
    version: u16,
    records: Vec<(u64, Vec<u8>)>,
    properties: Vec<(u64, Vec<u8>)>,
}

impl XpakBuilder {
    pub(crate) fn new() -> Self {
        Self {
            version: 0xB,
            records: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub(crate) fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    /// A record holding `data` in a single store block.
    pub(crate) fn raw_record(self, key: u64, data: &[u8]) -> Self {
        let group = command_group(GroupHeaderKind::Fixed, &[(0, data.to_vec())], 1);
        self.record(key, group)
    }

    /// A record with prebuilt block groups.
    pub(crate) fn record(mut self, key: u64, groups: Vec<u8>) -> Self {
        self.records.push((key, groups));
        self
    }

    pub(crate) fn property(mut self, key: u64, text: &str) -> Self {
        self.properties.push((key, text.as_bytes().to_vec()));
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let header_len = if self.version == XPAK_VERSION_EXTENDED {
            24 + 288 + 96
        } else {
            120
        };
        let data_offset = align_group(header_len);

        let mut data = Vec::new();
        let mut entries = Vec::new();
        for (key, record) in &self.records {
            entries.push(XpakHashEntry {
                key: *key,
                offset: data.len() as u64,
                size: record.len() as u64 | (0x80u64 << 56),
            });
            data.extend_from_slice(record);
        }

        let hash_offset = data_offset + data.len() as u64;
        let hash_table: Vec<u8> = entries.iter().flat_map(|e| e.as_bytes().to_vec()).collect();
        let index_offset = hash_offset + hash_table.len() as u64;

        let prologue = XpakPrologue {
            magic: PACKAGE_MAGIC,
            version: self.version,
            ..Default::default()
        };
        let tables = XpakTables {
            file_count: self.records.len() as u64,
            data_offset,
            data_size: data.len() as u64,
            hash_count: entries.len() as u64,
            hash_offset,
            hash_size: hash_table.len() as u64,
            index_count: self.properties.len() as u64,
            index_offset,
            ..Default::default()
        };

        let mut out = prologue.as_bytes().to_vec();
        if self.version == XPAK_VERSION_EXTENDED {
            out.extend_from_slice(&[0u8; 288]);
        }
        out.extend_from_slice(tables.as_bytes());
        pad_to(&mut out, data_offset as usize);
        out.extend_from_slice(&data);
        out.extend_from_slice(&hash_table);
        for (key, text) in &self.properties {
            out.extend_from_slice(&key.to_le_bytes());
            out.extend_from_slice(&(text.len() as u64).to_le_bytes());
            out.extend_from_slice(text);
        }
        out
    }
}

/// Builds XSUB packages.
#[derive(Debug, Clone)]
pub(crate) struct XsubBuilder {
    format: PackageFormat,
    kind: u64,
    hash_offset: Option<u64>,
    table_override: Option<(u64, u64)>,
    records: Vec<(u64, Vec<u8>)>,
    entries: Vec<PackEntry>,
}

impl XsubBuilder {
    pub(crate) fn new(format: PackageFormat) -> Self {
        Self {
            format,
            kind: XSUB_TYPE_DATA,
            hash_offset: None,
            table_override: None,
            records: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn kind(mut self, kind: u64) -> Self {
        self.kind = kind;
        self
    }

    /// Place the hash table inside the header's opaque region.
    pub(crate) fn hash_offset(mut self, offset: u64) -> Self {
        self.hash_offset = Some(offset);
        self
    }

    /// Write these table bounds instead of the real ones.
    pub(crate) fn hash_table_override(mut self, offset: u64, count: u64) -> Self {
        self.table_override = Some((offset, count));
        self
    }

    /// A record laid out by the builder.
    pub(crate) fn record(mut self, key: u64, groups: Vec<u8>) -> Self {
        self.records.push((key, groups));
        self
    }

    /// An entry with explicit placement.
    pub(crate) fn entry(mut self, entry: PackEntry) -> Self {
        self.entries.push(entry);
        self
    }

    fn entry_bytes(&self, entries: &[PackEntry]) -> Vec<u8> {
        entries
            .iter()
            .flat_map(|e| match self.format {
                PackageFormat::XsubV2 => PackedHashEntryEx {
                    key: e.key,
                    packed_info: e.packed_info(),
                    packed_info_ex: 0,
                }
                .as_bytes()
                .to_vec(),
                _ => PackedHashEntry {
                    key: e.key,
                    packed_info: e.packed_info(),
                }
                .as_bytes()
                .to_vec(),
            })
            .collect()
    }

    /// Lay out records starting at `base`, returning entries and payload.
    fn layout(&self, base: u64) -> (Vec<PackEntry>, Vec<u8>) {
        let mut entries = self.entries.clone();
        let mut payload = Vec::new();
        for (key, record) in &self.records {
            let offset = base + payload.len() as u64;
            entries.push(PackEntry::packed(*key, offset, record.len() as u64));
            payload.extend_from_slice(record);
            let len = align_group(payload.len() as u64) as usize;
            pad_to(&mut payload, len);
        }
        (entries, payload)
    }

    fn header(&self, hash_offset: u64, hash_count: u64) -> XsubHeader {
        let (hash_offset, hash_count) = self.table_override.unwrap_or((hash_offset, hash_count));
        let mut header = XsubHeader::zeroed();
        header.magic = PACKAGE_MAGIC;
        header.version = 1;
        header.kind = self.kind;
        header.hash_offset = hash_offset;
        header.hash_count = hash_count;
        header
    }

    /// A package with its payload inline.
    pub(crate) fn build(self) -> Vec<u8> {
        let header_len = std::mem::size_of::<XsubHeader>() as u64;
        let (entries, payload) = self.layout(align_group(header_len));
        let table = self.entry_bytes(&entries);

        let hash_offset = match self.hash_offset {
            Some(offset) => offset,
            None => align_group(header_len) + payload.len() as u64,
        };
        let header = self.header(hash_offset, entries.len() as u64);

        let mut out = header.as_bytes().to_vec();
        if self.hash_offset.is_some() {
            let start = hash_offset as usize;
            out[start..start + table.len()].copy_from_slice(&table);
        }
        pad_to(&mut out, align_group(header_len) as usize);
        out.extend_from_slice(&payload);
        if self.hash_offset.is_none() {
            out.extend_from_slice(&table);
        }
        out
    }

    /// An index package and its separate payload file.
    pub(crate) fn build_split(self) -> (Vec<u8>, Vec<u8>) {
        let header_len = std::mem::size_of::<XsubHeader>() as u64;
        let (entries, payload) = self.layout(0);
        let table = self.entry_bytes(&entries);
        let header = self.header(header_len, entries.len() as u64);

        let mut index = header.as_bytes().to_vec();
        index.extend_from_slice(&table);
        (index, payload)
    }
}
