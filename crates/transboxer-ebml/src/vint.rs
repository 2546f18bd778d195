//! EBML variable-length integers.
//!
//! The number of leading zero bits in the first byte, plus one, is the total
//! width in bytes. The bits following the single marker bit, concatenated
//! big-endian across all bytes, form the value. A value whose bits are all
//! ones is reserved as the "unknown size" marker.

use crate::error::{Error, Result};

/// Widest vint the format allows.
pub const MAX_WIDTH: usize = 8;

/// A decoded variable-length integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vint {
    /// Value with the width marker stripped.
    pub value: u64,
    /// Encoded width in bytes (1..=8).
    pub width: usize,
    /// Raw big-endian bytes including the marker. Element ids use this form.
    pub raw: u64,
}

impl Vint {
    /// True when every value bit is set, the reserved "unknown size" marker.
    pub fn is_unknown(&self) -> bool {
        self.value == max_value(self.width)
    }
}

/// Width implied by the first byte of a vint, or `None` if it has no marker bit.
pub fn width_of(first: u8) -> Option<usize> {
    match first.leading_zeros() as usize {
        n if n < MAX_WIDTH => Some(n + 1),
        _ => None,
    }
}

/// All-ones value for a given width (the unknown-size marker).
pub fn max_value(width: usize) -> u64 {
    (1u64 << (7 * width)) - 1
}

/// Read a vint from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold the whole integer.
/// `offset` is the absolute stream position of `buf[0]`, used in errors.
pub fn read_vint(buf: &[u8], offset: u64) -> Result<Option<Vint>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let width = width_of(first).ok_or(Error::InvalidVintWidth { offset, first })?;
    if buf.len() < width {
        return Ok(None);
    }

    let mut raw = 0u64;
    for &b in &buf[..width] {
        raw = (raw << 8) | b as u64;
    }
    let value = raw & max_value(width);

    Ok(Some(Vint { value, width, raw }))
}

/// Encode `value` in the narrowest width that does not collide with the
/// unknown-size marker.
pub fn encode_vint(value: u64) -> Result<Vec<u8>> {
    let width = (1..=MAX_WIDTH)
        .find(|&w| value < max_value(w))
        .ok_or(Error::VintOverflow {
            value,
            width: MAX_WIDTH,
        })?;
    encode_vint_width(value, width)
}

/// Encode `value` using exactly `width` bytes.
pub fn encode_vint_width(value: u64, width: usize) -> Result<Vec<u8>> {
    if !(1..=MAX_WIDTH).contains(&width) {
        return Err(Error::VintWidthOutOfRange(width));
    }
    if value >= max_value(width) {
        return Err(Error::VintOverflow { value, width });
    }
    Ok(with_marker(value, width))
}

/// The unknown-size marker at the given width.
pub fn unknown_size(width: usize) -> Result<Vec<u8>> {
    if !(1..=MAX_WIDTH).contains(&width) {
        return Err(Error::VintWidthOutOfRange(width));
    }
    Ok(with_marker(max_value(width), width))
}

fn with_marker(value: u64, width: usize) -> Vec<u8> {
    let marked = value | (1u64 << (7 * width));
    marked.to_be_bytes()[MAX_WIDTH - width..].to_vec()
}
