//! Common utilities for Talon.
//!
//! This crate provides foundational types used across the Talon crates:
//!
//! - [`BinaryReader`] - Zero-copy binary reading from byte slices
//! - [`ReadExt`] - Fixed-layout struct reads from seekable streams
//! - [`align`] - Power-of-two alignment helpers used by block-compressed packages

mod error;
mod reader;

pub mod align;

pub use error::{Error, Result};
pub use reader::{BinaryReader, ReadExt};

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
