//! EBML element builders.
//!
//! Every builder returns a complete element (id, size, payload) that
//! [`Decoder`](crate::Decoder) reads back unchanged. Masters take already
//! encoded children.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::vint::{self, width_of};

pub use crate::vint::{encode_vint, encode_vint_width};

/// Big-endian bytes of a raw element id, validated against its marker.
pub fn id_bytes(id: u64) -> Result<Vec<u8>> {
    let len = (8 - id.leading_zeros() as usize / 8).max(1);
    let bytes = id.to_be_bytes()[8 - len..].to_vec();
    match width_of(bytes[0]) {
        Some(w) if w == len && len <= 4 => Ok(bytes),
        _ => Err(Error::InvalidElementId(id)),
    }
}

/// An element with an arbitrary payload.
pub fn element(id: u64, payload: &[u8]) -> Result<Bytes> {
    let id = id_bytes(id)?;
    let size = encode_vint(payload.len() as u64)?;
    let mut buf = BytesMut::with_capacity(id.len() + size.len() + payload.len());
    buf.put_slice(&id);
    buf.put_slice(&size);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Unsigned integer element in the fewest bytes (at least one).
pub fn unsigned(id: u64, value: u64) -> Result<Bytes> {
    let len = (8 - value.leading_zeros() as usize / 8).max(1);
    element(id, &value.to_be_bytes()[8 - len..])
}

/// Signed integer element, 1, 2, 4 or 8 bytes wide.
pub fn signed(id: u64, value: i64) -> Result<Bytes> {
    if let Ok(v) = i8::try_from(value) {
        element(id, &v.to_be_bytes())
    } else if let Ok(v) = i16::try_from(value) {
        element(id, &v.to_be_bytes())
    } else if let Ok(v) = i32::try_from(value) {
        element(id, &v.to_be_bytes())
    } else {
        element(id, &value.to_be_bytes())
    }
}

/// 8-byte float element.
pub fn float(id: u64, value: f64) -> Result<Bytes> {
    element(id, &value.to_be_bytes())
}

/// Text element (String or UTF-8), without padding.
pub fn string(id: u64, value: &str) -> Result<Bytes> {
    element(id, value.as_bytes())
}

/// Master element with a known size.
pub fn master<I, B>(id: u64, children: I) -> Result<Bytes>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut body = BytesMut::new();
    for child in children {
        body.put_slice(child.as_ref());
    }
    element(id, &body)
}

/// Master element announcing the unknown-size marker, as live muxers write
/// Segment and Cluster.
pub fn master_unknown_size<I, B>(id: u64, children: I) -> Result<Bytes>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut buf = BytesMut::new();
    buf.put_slice(&id_bytes(id)?);
    buf.put_slice(&vint::unknown_size(1)?);
    for child in children {
        buf.put_slice(child.as_ref());
    }
    Ok(buf.freeze())
}

/// SimpleBlock element without lacing.
pub fn simple_block(track: u64, timecode: i16, keyframe: bool, frame: &[u8]) -> Result<Bytes> {
    let track = encode_vint(track)?;
    let mut body = BytesMut::with_capacity(track.len() + 3 + frame.len());
    body.put_slice(&track);
    body.put_i16(timecode);
    body.put_u8(if keyframe { 0x80 } else { 0x00 });
    body.put_slice(frame);
    element(crate::schema::ids::SIMPLE_BLOCK, &body)
}
