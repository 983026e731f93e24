//! Block codec dispatch.
//!
//! Every block in a package payload is tagged with a compression kind. The
//! decoders translate the on-disk tag into a [`Compression`] and hand the
//! compressed bytes to a [`CodecSet`], which owns one implementation per kind.
//!
//! LZ4 block decoding is built in. The proprietary high-ratio codec is not
//! reimplemented here; callers register an implementation with
//! [`CodecSet::with_oodle`], and until they do every such block fails with
//! [`CodecError::Unavailable`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Compression applied to a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Stored verbatim.
    Store,
    /// LZ4 block format (no frame header).
    Lz4,
    /// Proprietary high-ratio codec ("Oodle").
    Oodle,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => f.write_str("store"),
            Self::Lz4 => f.write_str("lz4"),
            Self::Oodle => f.write_str("oodle"),
        }
    }
}

/// Errors reported by block codecs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The destination cannot hold the decoded block.
    #[error("output buffer too small: need {needed} bytes, have {available}")]
    OutputTooSmall { needed: usize, available: usize },

    /// The compressed data is corrupt.
    #[error("corrupt block: {0}")]
    Corrupt(String),

    /// The codec produced a different amount of data than the block declares.
    #[error("decoded {actual} bytes, block declares {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    /// No implementation is registered for this codec.
    #[error("no {0} codec registered")]
    Unavailable(&'static str),
}

/// A block decompression primitive.
///
/// `decode` writes at most `dst.len()` bytes and returns how many it wrote.
pub trait BlockCodec: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decode `src` into `dst`.
    fn decode(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError>;
}

/// LZ4 block decoder backed by `lz4_flex`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Codec;

impl BlockCodec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn decode(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        use lz4_flex::block::DecompressError;

        lz4_flex::block::decompress_into(src, dst).map_err(|e| match e {
            DecompressError::OutputTooSmall { expected, actual } => CodecError::OutputTooSmall {
                needed: expected,
                available: actual,
            },
            other => CodecError::Corrupt(other.to_string()),
        })
    }
}

/// The codecs available to the block decoders.
#[derive(Clone)]
pub struct CodecSet {
    lz4: Arc<dyn BlockCodec>,
    oodle: Option<Arc<dyn BlockCodec>>,
}

impl CodecSet {
    /// Built-in LZ4, no proprietary codec.
    pub fn new() -> Self {
        Self {
            lz4: Arc::new(Lz4Codec),
            oodle: None,
        }
    }

    /// Register the proprietary high-ratio codec.
    pub fn with_oodle<C: BlockCodec + 'static>(mut self, codec: C) -> Self {
        self.oodle = Some(Arc::new(codec));
        self
    }

    /// Replace the LZ4 implementation.
    pub fn with_lz4<C: BlockCodec + 'static>(mut self, codec: C) -> Self {
        self.lz4 = Arc::new(codec);
        self
    }

    /// Whether a proprietary codec has been registered.
    pub fn has_oodle(&self) -> bool {
        self.oodle.is_some()
    }

    /// Decode one block into `dst`, returning the number of bytes written.
    pub fn decode(
        &self,
        compression: Compression,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, CodecError> {
        match compression {
            Compression::Store => {
                if dst.len() < src.len() {
                    return Err(CodecError::OutputTooSmall {
                        needed: src.len(),
                        available: dst.len(),
                    });
                }
                dst[..src.len()].copy_from_slice(src);
                Ok(src.len())
            }
            Compression::Lz4 => self.lz4.decode(src, dst),
            Compression::Oodle => match &self.oodle {
                Some(codec) => codec.decode(src, dst),
                None => Err(CodecError::Unavailable("oodle")),
            },
        }
    }

    /// Decode one block that must fill `dst` exactly.
    pub fn decode_exact(
        &self,
        compression: Compression,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<(), CodecError> {
        let written = self.decode(compression, src, dst)?;
        if written != dst.len() {
            return Err(CodecError::LengthMismatch {
                expected: dst.len(),
                actual: written,
            });
        }
        Ok(())
    }
}

impl Default for CodecSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecSet")
            .field("lz4", &self.lz4.name())
            .field("oodle", &self.oodle.as_ref().map(|c| c.name()))
            .finish()
    }
}
