//! Out-of-band properties table of indexed XPAK packages.
//!
//! Some XPAK packages do not record decompressed sizes in their hash
//! entries. Instead a second table at `index_offset` holds one record per
//! key: `{key: u64, len: u64}` followed by `len` bytes of newline-separated
//! `name:value` text. The `size0` property is the decompressed size.

use std::io::{Seek, SeekFrom};

use memchr::memchr_iter;
use talon_common::ReadExt;
use tracing::{debug, warn};

use super::PackHeader;
use crate::storage::PackageRead;
use crate::Result;

/// Property holding the decompressed size.
pub const SIZE_PROPERTY: &str = "size0";

/// A decompressed size declared by the properties table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeHint {
    pub key: u64,
    pub size: u64,
}

/// Collect the `size0` property of every record in the table.
///
/// Hints are keyed globally: the caller applies them to whatever package
/// currently owns the key. A truncated table stops the walk; hints found up
/// to that point are kept.
pub(super) fn read_size_hints(
    reader: &mut dyn PackageRead,
    header: &PackHeader,
    length: u64,
) -> Result<Vec<SizeHint>> {
    let mut hints = Vec::new();
    if header.index_count == 0 {
        return Ok(hints);
    }
    if header.index_offset >= length {
        warn!(
            offset = header.index_offset,
            length, "properties table starts past end of package"
        );
        return Ok(hints);
    }

    reader.seek(SeekFrom::Start(header.index_offset))?;
    let mut text = Vec::new();

    for _ in 0..header.index_count {
        let record = reader
            .read_u64_le()
            .and_then(|key| reader.read_u64_le().map(|len| (key, len)));
        let (key, len) = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "properties table truncated");
                break;
            }
        };

        if let Err(e) = reader.read_into(&mut text, len) {
            warn!(key = %format!("{:#018x}", key), error = %e, "properties record truncated");
            break;
        }
        if let Some(size) = parse_size_property(&text) {
            hints.push(SizeHint { key, size });
        }
    }

    debug!(hints = hints.len(), records = header.index_count, "read size properties");
    Ok(hints)
}

/// Find `size0:<n>` in a properties blob.
fn parse_size_property(text: &[u8]) -> Option<u64> {
    let mut start = 0;
    let ends = memchr_iter(b'\n', text).chain(std::iter::once(text.len()));
    let mut size = None;

    for end in ends {
        let line = &text[start..end];
        start = end + 1;

        let mut parts = line.split(|&b| b == b':').filter(|p| !p.is_empty());
        let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if name == SIZE_PROPERTY.as_bytes() {
            size = parse_c_integer(value);
        }
    }
    size
}

/// Parse an unsigned integer with C prefix rules.
///
/// `0x`/`0X` selects hex, a leading `0` octal, anything else decimal.
/// Leading whitespace and a `+` are accepted, parsing stops at the first
/// character that is not a digit of the base, and overflow saturates.
/// Returns `None` when no digit was consumed.
pub fn parse_c_integer(text: &[u8]) -> Option<u64> {
    let mut rest = text;
    while let [first, tail @ ..] = rest {
        if !first.is_ascii_whitespace() {
            break;
        }
        rest = tail;
    }
    if let [b'+', tail @ ..] = rest {
        rest = tail;
    }

    let (radix, digits) = match rest {
        [b'0', b'x' | b'X', tail @ ..] if tail.first().is_some_and(u8::is_ascii_hexdigit) => {
            (16, tail)
        }
        [b'0', ..] => (8, rest),
        _ => (10, rest),
    };

    let mut value: u64 = 0;
    let mut consumed = false;
    for &b in digits {
        let Some(digit) = (b as char).to_digit(radix) else {
            break;
        };
        consumed = true;
        value = value
            .checked_mul(radix as u64)
            .and_then(|v| v.checked_add(digit as u64))
            .unwrap_or(u64::MAX);
    }
    consumed.then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_c_integer_bases() {
        assert_eq!(parse_c_integer(b"4096"), Some(4096));
        assert_eq!(parse_c_integer(b"0x1000"), Some(0x1000));
        assert_eq!(parse_c_integer(b"0X1f"), Some(0x1F));
        assert_eq!(parse_c_integer(b"010"), Some(8));
        assert_eq!(parse_c_integer(b"0"), Some(0));
        assert_eq!(parse_c_integer(b"  +42\r"), Some(42));
        assert_eq!(parse_c_integer(b"0x"), Some(0));
        assert_eq!(parse_c_integer(b"089"), Some(0));
        assert_eq!(parse_c_integer(b"abc"), None);
        assert_eq!(parse_c_integer(b"99999999999999999999999"), Some(u64::MAX));
    }

    #[test]
    fn test_parse_size_property() {
        assert_eq!(parse_size_property(b"name:foo\nsize0:0x20\n"), Some(0x20));
        assert_eq!(parse_size_property(b"size0:100"), Some(100));
        assert_eq!(parse_size_property(b"size1:100\nsize0"), None);
        assert_eq!(parse_size_property(b"size0:1:2"), None);
        assert_eq!(parse_size_property(b""), None);
    }

    #[test]
    fn test_read_size_hints() {
        use std::io::Cursor;

        let mut table = Vec::new();
        let records: [(u64, &[u8]); 3] = [
            (9, b"size0:64"),
            (1, b"name:a\nsize0:0x80"),
            (2, b"name:b"),
        ];
        for (key, text) in records {
            table.extend_from_slice(&key.to_le_bytes());
            table.extend_from_slice(&(text.len() as u64).to_le_bytes());
            table.extend_from_slice(text);
        }
        let length = table.len() as u64;
        let header = PackHeader {
            version: 0xD,
            kind: 0,
            data_offset: 0,
            hash_offset: 0,
            hash_count: 0,
            index_offset: 0,
            index_count: 4,
        };

        let hints = read_size_hints(&mut Cursor::new(table), &header, length).unwrap();
        assert_eq!(
            hints,
            vec![SizeHint { key: 9, size: 64 }, SizeHint { key: 1, size: 0x80 }]
        );
    }
}
