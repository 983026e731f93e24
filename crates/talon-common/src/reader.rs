//! Binary readers for package parsing.
//!
//! [`BinaryReader`] is a cursor over a byte slice that reads without copying.
//! [`ReadExt`] adds fixed-layout struct reads to any [`Read`] stream, which is
//! how package headers and hash tables are pulled out of files that are far
//! too large to load whole.

use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use zerocopy::FromBytes;

use crate::{Error, Result};

/// Cursor over an in-memory record that reads fixed-layout structures.
///
/// Reads borrow from the underlying slice; a read that would run past the
/// end fails without moving the cursor.
///
/// # Example
///
/// ```
/// use talon_common::{BinaryReader, FromBytes, Immutable, KnownLayout};
///
/// #[derive(FromBytes, Immutable, KnownLayout)]
/// #[repr(C, packed)]
/// struct Marker {
///     magic: u16,
///     count: u8,
/// }
///
/// let data = [0x1D, 0xF0, 0x03];
/// let mut reader = BinaryReader::new(&data);
///
/// let marker: Marker = reader.read_struct().unwrap();
/// assert_eq!({ marker.magic }, 0xF01D);
/// assert_eq!(marker.count, 3);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Offset of the cursor from the start of the slice.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Bytes left after the cursor.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Move the cursor to an absolute offset, which may lie past the end.
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Borrow the next `count` bytes and advance past them.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if available < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available,
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    /// Read one fixed-layout structure.
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }

    /// Read `count` consecutive structures.
    pub fn read_array<T: FromBytes>(&mut self, count: usize) -> Result<Vec<T>> {
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(self.read_struct::<T>()?);
        }
        Ok(items)
    }
}

/// Stream extensions for reading package structures.
///
/// Primitive reads come from byteorder's [`ReadBytesExt`]; this trait adds
/// zerocopy struct reads and bounded buffer reads on top.
pub trait ReadExt: Read {
    /// Read a fixed-layout structure from the stream.
    fn read_struct<T: FromBytes>(&mut self) -> io::Result<T> {
        let size = std::mem::size_of::<T>();
        let mut bytes = vec![0u8; size];
        self.read_exact(&mut bytes)?;
        T::read_from_bytes(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", e)))
    }

    /// Read `count` consecutive fixed-layout structures.
    fn read_array<T: FromBytes>(&mut self, count: usize) -> io::Result<Vec<T>> {
        let elem_size = std::mem::size_of::<T>();
        let bytes = self.read_vec(count.saturating_mul(elem_size) as u64)?;

        let mut result = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(elem_size) {
            let item = T::read_from_bytes(chunk)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", e)))?;
            result.push(item);
        }
        Ok(result)
    }

    /// Read exactly `len` bytes into a new buffer.
    ///
    /// The buffer grows with the data actually read, so a corrupt length
    /// fails with `UnexpectedEof` instead of allocating up front.
    fn read_vec(&mut self, len: u64) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.read_into(&mut buffer, len)?;
        Ok(buffer)
    }

    /// Replace the contents of `buffer` with exactly `len` bytes.
    fn read_into(&mut self, buffer: &mut Vec<u8>, len: u64) -> io::Result<()> {
        buffer.clear();
        Read::take(&mut *self, len).read_to_end(buffer)?;
        if (buffer.len() as u64) != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes, read {}", len, buffer.len()),
            ));
        }
        Ok(())
    }

    /// Read a little-endian u64.
    #[inline]
    fn read_u64_le(&mut self) -> io::Result<u64> {
        self.read_u64::<LittleEndian>()
    }

    /// Read a little-endian u32.
    #[inline]
    fn read_u32_le(&mut self) -> io::Result<u32> {
        self.read_u32::<LittleEndian>()
    }
}

impl<R: Read + ?Sized> ReadExt for R {}
