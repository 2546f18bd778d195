//! H.264 helpers for remuxing: parameter sets, NALU framing and avcC.
//!
//! - [`bitreader`]: MSB-first bit cursor with Exp-Golomb codes
//! - [`sps`] / [`pps`]: parameter-set parsing with range validation
//! - [`nal`]: NAL unit types and Annex-B / length-prefixed streams
//! - [`avcc`]: the `avcC` decoder configuration record

pub mod avcc;
pub mod bitreader;
pub mod error;
pub mod nal;
pub mod pps;
pub mod sps;

pub use avcc::AvcConfig;
pub use bitreader::BitReader;
pub use error::{Error, Result};
pub use nal::{NalUnitType, NaluFormat, NaluStream};
pub use pps::Pps;
pub use sps::{Profile, Sps};
