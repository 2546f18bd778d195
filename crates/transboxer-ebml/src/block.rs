//! SimpleBlock / Block payload headers.
//!
//! ```text
//! track number    vint (marker stripped)
//! timecode        i16, relative to the cluster Timecode
//! flags           u8
//! frame data      rest of the element
//! ```

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};
use crate::vint::read_vint;

/// Lacing mode signalled in the flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lacing {
    None,
    Xiph,
    FixedSize,
    Ebml,
}

impl From<u8> for Lacing {
    fn from(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Lacing::None,
            1 => Lacing::Xiph,
            2 => Lacing::FixedSize,
            _ => Lacing::Ebml,
        }
    }
}

/// A decoded block header plus its frame data.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub track: u64,
    pub timecode: i16,
    pub flags: u8,
    /// SimpleBlock only; always false for Block.
    pub keyframe: bool,
    pub invisible: bool,
    pub lacing: Lacing,
    /// SimpleBlock only; always false for Block.
    pub discardable: bool,
    pub payload: Bytes,
}

impl Block {
    /// Parse a block element body. `simple` selects SimpleBlock flag semantics.
    pub fn parse(mut data: Bytes, simple: bool) -> Result<Self> {
        let track = read_vint(&data, 0)
            .map_err(|_| Error::malformed_block("invalid track number"))?
            .ok_or_else(|| Error::malformed_block("missing track number"))?;
        data.advance(track.width);

        if data.len() < 3 {
            return Err(Error::malformed_block(format!(
                "header needs 3 bytes after track number, found {}",
                data.len()
            )));
        }
        let timecode = data.get_i16();
        let flags = data.get_u8();

        Ok(Self {
            track: track.value,
            timecode,
            flags,
            keyframe: simple && flags & 0x80 != 0,
            invisible: flags & 0x08 != 0,
            lacing: Lacing::from(flags >> 1),
            discardable: simple && flags & 0x01 != 0,
            payload: data,
        })
    }
}
