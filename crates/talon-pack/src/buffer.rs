//! Growable output buffer for block decoding.

use crate::{Error, Result};

/// Output buffer that grows on demand up to a hard limit.
///
/// Writes are addressed by offset. Growing preserves everything already
/// written; capacity at least doubles each time so a stream of small blocks
/// does not reallocate per block. The logical length is the furthest byte
/// committed so far.
#[derive(Debug)]
pub struct GrowableBuffer {
    data: Vec<u8>,
    len: usize,
    limit: usize,
}

impl GrowableBuffer {
    /// Create a zero-filled buffer of `initial` bytes that may grow to `limit`.
    pub fn with_capacity(initial: usize, limit: usize) -> Self {
        Self {
            data: vec![0u8; initial.min(limit)],
            len: 0,
            limit,
        }
    }

    /// Furthest byte committed.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been committed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Currently allocated bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Maximum size the buffer may grow to.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Ensure `offset..offset + len` is allocated.
    pub fn reserve_at(&mut self, offset: usize, len: usize) -> Result<()> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.limit)
            .ok_or(Error::OutputOverflow {
                offset,
                len,
                bound: self.limit,
            })?;

        if end > self.data.len() {
            let grown = self.data.len().saturating_mul(2).clamp(end, self.limit);
            self.data.resize(grown, 0);
        }
        Ok(())
    }

    /// Mutable window of `len` bytes at `offset`, growing if needed.
    pub fn window(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        self.reserve_at(offset, len)?;
        Ok(&mut self.data[offset..offset + len])
    }

    /// Mark `offset..end` as written.
    #[inline]
    pub fn commit(&mut self, end: usize) {
        self.len = self.len.max(end);
    }

    /// Finish with the committed length.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.len);
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_preserves_contents() {
        let mut buffer = GrowableBuffer::with_capacity(4, 1024);
        buffer.window(0, 4).unwrap().copy_from_slice(b"abcd");
        buffer.commit(4);

        buffer.window(4, 100).unwrap().fill(b'z');
        buffer.commit(104);

        assert!(buffer.capacity() >= 104);
        let data = buffer.into_vec();
        assert_eq!(data.len(), 104);
        assert_eq!(&data[..4], b"abcd");
        assert!(data[4..].iter().all(|&b| b == b'z'));
    }

    #[test]
    fn test_growth_is_amortized() {
        let mut buffer = GrowableBuffer::with_capacity(64, 1 << 20);
        buffer.reserve_at(64, 1).unwrap();
        assert_eq!(buffer.capacity(), 128);
    }

    #[test]
    fn test_limit_is_enforced() {
        let mut buffer = GrowableBuffer::with_capacity(16, 32);
        assert!(buffer.window(16, 16).is_ok());
        let err = buffer.window(30, 8).unwrap_err();
        assert!(matches!(err, Error::OutputOverflow { bound: 32, .. }));
        assert!(buffer.window(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_truncates_to_committed_length() {
        let mut buffer = GrowableBuffer::with_capacity(4096, 4096);
        buffer.window(0, 3).unwrap().copy_from_slice(b"xyz");
        buffer.commit(3);
        assert_eq!(buffer.into_vec(), b"xyz");
    }
}
