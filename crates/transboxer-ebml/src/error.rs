//! Error types for transboxer-ebml.

use thiserror::Error;

/// Result type for transboxer-ebml operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for EBML decoding and encoding.
#[derive(Debug, Error)]
pub enum Error {
    /// A variable-length integer has no marker bit in its first byte.
    #[error("Corrupt stream: vint at offset {offset} is wider than 8 bytes (first byte {first:#04x})")]
    InvalidVintWidth {
        /// Absolute stream offset of the offending byte.
        offset: u64,
        /// The first byte of the vint.
        first: u8,
    },

    /// A value does not fit the requested vint width.
    #[error("Value {value} does not fit in a {width}-byte vint")]
    VintOverflow { value: u64, width: usize },

    /// An element id whose leading byte does not announce its own width.
    #[error("Invalid element id {0:#x}")]
    InvalidElementId(u64),

    /// Vint widths are limited to 1..=8 bytes.
    #[error("Invalid vint width {0}, expected 1..=8")]
    VintWidthOutOfRange(usize),

    /// An element claims to extend past the end of its parent.
    #[error("Element {id:#x} at offset {offset} ends at {end}, past its parent's end {parent_end}")]
    ElementOverrun {
        id: u64,
        offset: u64,
        end: u64,
        parent_end: u64,
    },

    /// Only master elements may use the unknown-length size marker.
    #[error("Element {id:#x} ({name}) at offset {offset} has unknown size but is not a container")]
    UnknownSizeLeaf {
        id: u64,
        name: &'static str,
        offset: u64,
    },

    /// A leaf element declares more content than the decoder will buffer.
    #[error("Element {id:#x} ({name}) at offset {offset} declares {size} bytes, limit is {max}")]
    LeafTooLarge {
        id: u64,
        name: &'static str,
        offset: u64,
        size: u64,
        max: u64,
    },

    /// A SimpleBlock or Block payload is too short to hold its header.
    #[error("Malformed block: {0}")]
    MalformedBlock(String),

    /// Input was written after `finish`.
    #[error("Decoder already finished")]
    Finished,
}

impl Error {
    /// Create a malformed block error.
    pub fn malformed_block(msg: impl Into<String>) -> Self {
        Self::MalformedBlock(msg.into())
    }
}
