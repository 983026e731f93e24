//! Alignment helpers.
//!
//! Package payloads are laid out in groups that start on 128-byte boundaries,
//! and some platforms pad every block to 4 bytes.

/// Alignment of block groups inside a package payload.
pub const BLOCK_GROUP_ALIGNMENT: u64 = 0x80;

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. An alignment of 0 or 1 returns the
/// value unchanged.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    (value + alignment - 1) & !(alignment - 1)
}

/// Round `value` up to the next 128-byte block group boundary.
#[inline]
pub const fn align_group(value: u64) -> u64 {
    align_up(value, BLOCK_GROUP_ALIGNMENT)
}
