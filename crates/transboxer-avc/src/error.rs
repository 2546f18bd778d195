//! Error types for transboxer-avc.

use thiserror::Error;

/// Result type for transboxer-avc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing H.264 parameter sets and NALU streams.
#[derive(Debug, Error)]
pub enum Error {
    /// A read crossed the end of the bitstream.
    #[error("Bitstream exhausted")]
    BitstreamExhausted,

    /// `read_bits` accepts 1..=32 bits.
    #[error("Cannot read {0} bits at once")]
    InvalidBitCount(u32),

    /// Exp-Golomb prefix longer than 31 zero bits.
    #[error("Exp-Golomb code too long")]
    ExpGolombOverflow,

    /// The NAL header's forbidden_zero_bit was set.
    #[error("Forbidden bit set in NAL header")]
    ForbiddenBit,

    /// The NAL unit is not the parameter set being parsed.
    #[error("Wrong unit type: expected {expected}, found {found}")]
    WrongUnitType { expected: u8, found: u8 },

    /// profile_idc is not a known H.264 profile.
    #[error("Unknown profile {0}")]
    UnknownProfile(u8),

    /// A syntax element is outside its legal range.
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    /// Neither Annex-B markers nor a consistent length prefix were found.
    #[error("Unknown packet format")]
    UnknownPacketFormat,

    /// The stream cannot be converted with its current framing.
    #[error("Unexpected packet format: {0}")]
    UnexpectedPacketFormat(String),

    /// A NALU does not fit in the configured length prefix.
    #[error("NALU of {len} bytes does not fit a {width}-byte length prefix")]
    NaluTooLong { len: usize, width: usize },

    /// A required SPS or PPS was not found.
    #[error("Missing {0}")]
    MissingParameterSet(&'static str),

    /// avcC configurationVersion other than 1.
    #[error("Unsupported avcC version {0}")]
    UnsupportedVersion(u8),

    /// A truncated or inconsistent avcC record.
    #[error("Invalid avcC: {0}")]
    InvalidAvcC(String),
}

impl Error {
    pub(crate) fn out_of_range(field: &'static str, value: impl Into<i64>) -> Self {
        Self::OutOfRange {
            field,
            value: value.into(),
        }
    }
}
