//! Composite byte keys and fixed-width height encodings

use crate::{Error, Result};

/// Separator between the components of a composite key
pub const SEPARATOR: u8 = 0;

/// Joins `parts` with a single [`SEPARATOR`] byte.
pub fn compose(parts: &[&[u8]]) -> Vec<u8> {
    let size = parts.iter().map(|p| p.len()).sum::<usize>() + parts.len().saturating_sub(1);
    let mut key = Vec::with_capacity(size);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(SEPARATOR);
        }
        key.extend_from_slice(part);
    }
    key
}

/// Bytes of `key` after `prefix` and its separator. The separator byte
/// itself is not checked.
pub fn decompose<'k>(key: &'k [u8], prefix: &[u8]) -> Result<&'k [u8]> {
    if prefix.len() + 1 > key.len() {
        return Err(Error::malformed_key(key, "shorter than its prefix"));
    }
    Ok(&key[prefix.len() + 1..])
}

/// Whether `key` starts with `prefix` followed by the separator. An empty
/// prefix matches nothing.
pub fn has_prefix(key: &[u8], prefix: &[u8]) -> bool {
    !prefix.is_empty()
        && key.len() > prefix.len()
        && key.starts_with(prefix)
        && key[prefix.len()] == SEPARATOR
}

/// Exclusive upper bound of the keys starting with `prefix`, `None` when the
/// range is unbounded.
pub fn range_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last != u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

pub fn encode_height_be(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

pub fn decode_height_be(bytes: &[u8]) -> Result<u64> {
    Ok(u64::from_be_bytes(height_bytes(bytes)?))
}

/// Little-endian counterpart, for the legacy auxiliary key families.
///
/// Legacy keys may carry bytes after the height; only the first 8 are read.
pub fn decode_height_le(bytes: &[u8]) -> Result<u64> {
    let head = bytes
        .get(..8)
        .ok_or_else(|| Error::malformed_key(bytes, "height is shorter than 8 bytes"))?;
    Ok(u64::from_le_bytes(height_bytes(head)?))
}

fn height_bytes(bytes: &[u8]) -> Result<[u8; 8]> {
    bytes
        .try_into()
        .map_err(|_| Error::malformed_key(bytes, "height is not 8 bytes"))
}

/// Moves `old_prefix\0<LE height>` to `new_prefix\0<BE height>`.
pub fn rewrite_prefix(key: &[u8], old_prefix: &[u8], new_prefix: &[u8]) -> Result<Vec<u8>> {
    let height = decode_height_le(decompose(key, old_prefix)?)?;
    Ok(compose(&[new_prefix, &encode_height_be(height)]))
}
