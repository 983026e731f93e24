//! Error types for the package engine.

use thiserror::Error;

use crate::codec::CodecError;

/// Errors that can occur while indexing or extracting packages.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] talon_common::Error),

    /// Container (zip) error.
    #[error("container error: {0}")]
    Container(#[from] zip::result::ZipError),

    /// Package magic did not match.
    #[error("invalid package magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic { expected: u32, actual: u32 },

    /// Hash table does not fit inside the package.
    #[error("hash table at {offset:#x} ({count} entries) exceeds package length {length:#x}")]
    HashTableOutOfRange { offset: u64, count: u64, length: u64 },

    /// A block group could not be interpreted.
    #[error("malformed block group at {offset:#x}: {reason}")]
    MalformedBlock { offset: u64, reason: String },

    /// A block codec failed.
    #[error("codec failure at {offset:#x}: {source}")]
    Codec {
        offset: u64,
        #[source]
        source: CodecError,
    },

    /// Decoded size disagreed with the expected size.
    #[error("size mismatch: expected {expected} bytes, decoded {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A block would be written past the output bound.
    #[error("block write of {len} bytes at {offset:#x} exceeds output bound {bound}")]
    OutputOverflow { offset: usize, len: usize, bound: usize },

    /// A streamed record did not carry the expected group marker or key.
    #[error("streamed record rejected: {0}")]
    StreamRejected(String),

    /// The record references a package that was never registered.
    #[error("unknown package index: {0}")]
    UnknownPackage(u32),

    /// The cache was already loaded.
    #[error("package cache already loaded from {0}")]
    AlreadyLoaded(String),

    /// Unknown package format name.
    #[error("unknown package format: {0}")]
    UnknownFormat(String),
}

/// Result type for package operations.
pub type Result<T> = std::result::Result<T, Error>;
