//! H.264 NAL units and NALU stream framing.
//!
//! A stream is either Annex-B (units separated by `00 00 01` or
//! `00 00 00 01` start markers) or length-prefixed (each unit preceded by a
//! 1 to 4 byte big-endian length, as in MP4 samples).

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{Error, Result};

/// H.264 NAL unit types (Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    NonIdrSlice,
    SliceDataA,
    SliceDataB,
    SliceDataC,
    /// Coded slice of an IDR picture
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    FillerData,
    SpsExtension,
    Unknown(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            1 => NalUnitType::NonIdrSlice,
            2 => NalUnitType::SliceDataA,
            3 => NalUnitType::SliceDataB,
            4 => NalUnitType::SliceDataC,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::FillerData,
            13 => NalUnitType::SpsExtension,
            other => NalUnitType::Unknown(other),
        }
    }
}

impl NalUnitType {
    /// Type of a NAL unit from its header byte.
    pub fn of(nalu: &[u8]) -> Option<Self> {
        nalu.first().map(|&b| Self::from(b))
    }

    pub fn is_slice(self) -> bool {
        matches!(self, NalUnitType::NonIdrSlice | NalUnitType::IdrSlice)
    }
}

/// nal_ref_idc from a NAL header byte.
pub fn nal_ref_idc(header: u8) -> u8 {
    (header >> 5) & 0x03
}

/// forbidden_zero_bit from a NAL header byte.
pub fn forbidden_bit(header: u8) -> bool {
    header & 0x80 != 0
}

/// Strip emulation-prevention bytes (the `03` in `00 00 03`) to get the RBSP.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut zeros = 0;

    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        result.push(b);
    }

    result
}

/// Look-ahead used when probing for a length-prefix width.
const LOOKAHEAD_PACKETS: usize = 20;

/// Framing convention of a NALU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluFormat {
    /// Start-marker delimited; `marker_width` is 3 or 4 for the first marker.
    AnnexB { marker_width: usize },
    /// Big-endian length prefix of `width` bytes (1..=4).
    LengthPrefixed { width: usize },
}

impl NaluFormat {
    /// Width of the marker or length prefix.
    pub fn width(self) -> usize {
        match self {
            NaluFormat::AnnexB { marker_width } => marker_width,
            NaluFormat::LengthPrefixed { width } => width,
        }
    }

    /// Inspect a buffer and guess its framing.
    ///
    /// A leading start marker means Annex-B. Otherwise length-prefix widths
    /// 4, 3, 2 and 1 are tried in turn; the first width whose first packets
    /// (up to a small look-ahead) are non-empty, start with a valid NAL
    /// header and stay inside the buffer wins.
    pub fn detect(buf: &[u8]) -> Option<Self> {
        if buf.starts_with(&[0, 0, 1]) {
            return Some(NaluFormat::AnnexB { marker_width: 3 });
        }
        if buf.starts_with(&[0, 0, 0, 1]) {
            return Some(NaluFormat::AnnexB { marker_width: 4 });
        }
        [4, 3, 2, 1]
            .into_iter()
            .find(|&width| looks_length_prefixed(buf, width))
            .map(|width| NaluFormat::LengthPrefixed { width })
    }
}

fn looks_length_prefixed(buf: &[u8], width: usize) -> bool {
    let mut pos = 0;
    let mut packets = 0;
    while pos < buf.len() && packets < LOOKAHEAD_PACKETS {
        let Some(len) = read_prefix(buf, pos, width) else {
            return false;
        };
        let start = pos + width;
        if len == 0 || start + len > buf.len() || forbidden_bit(buf[start]) {
            return false;
        }
        pos = start + len;
        packets += 1;
    }
    packets > 0
}

fn read_prefix(buf: &[u8], pos: usize, width: usize) -> Option<usize> {
    let bytes = buf.get(pos..pos + width)?;
    Some(bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize))
}

/// A buffer of NAL units with known framing.
#[derive(Debug, Clone)]
pub struct NaluStream {
    buf: Bytes,
    format: NaluFormat,
}

impl NaluStream {
    /// Wrap `buf`, detecting its framing unless `hint` is given.
    ///
    /// An undetectable framing is an error in `strict` mode; otherwise a
    /// 4-byte length prefix is assumed.
    pub fn new(buf: impl Into<Bytes>, hint: Option<NaluFormat>, strict: bool) -> Result<Self> {
        let buf = buf.into();
        let format = match hint.or_else(|| NaluFormat::detect(&buf)) {
            Some(format) => format,
            None if strict => return Err(Error::UnknownPacketFormat),
            None => {
                debug!(len = buf.len(), "unrecognized NALU framing");
                NaluFormat::LengthPrefixed { width: 4 }
            }
        };
        if let NaluFormat::LengthPrefixed { width } = format {
            if !(1..=4).contains(&width) {
                return Err(Error::UnexpectedPacketFormat(format!(
                    "length prefix width {width}, expected 1..=4"
                )));
            }
        }
        Ok(Self { buf, format })
    }

    pub fn format(&self) -> NaluFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Iterate over the NAL units, without their markers or prefixes.
    ///
    /// Each call starts over from the beginning of the buffer.
    pub fn nalus(&self) -> Nalus<'_> {
        Nalus {
            buf: &self.buf,
            pos: 0,
            format: self.format,
        }
    }

    pub fn packet_count(&self) -> usize {
        self.nalus().count()
    }

    /// First unit of the given type.
    pub fn find(&self, ty: NalUnitType) -> Option<&[u8]> {
        self.nalus().find(|n| NalUnitType::of(n) == Some(ty))
    }

    /// Rewrite Annex-B framing as length prefixes of the marker's width.
    ///
    /// A stream that is already length-prefixed is left untouched.
    pub fn convert_to_packet(&mut self) -> Result<()> {
        let width = match self.format {
            NaluFormat::LengthPrefixed { .. } => return Ok(()),
            NaluFormat::AnnexB { marker_width } if matches!(marker_width, 3 | 4) => marker_width,
            NaluFormat::AnnexB { marker_width } => {
                return Err(Error::UnexpectedPacketFormat(format!(
                    "start marker width {marker_width}, expected 3 or 4"
                )))
            }
        };

        let max = (1u64 << (8 * width)) - 1;
        let mut out = BytesMut::with_capacity(self.buf.len() + width);
        for nalu in self.nalus() {
            if nalu.len() as u64 > max {
                return Err(Error::NaluTooLong {
                    len: nalu.len(),
                    width,
                });
            }
            out.put_uint(nalu.len() as u64, width);
            out.put_slice(nalu);
        }

        self.buf = out.freeze();
        self.format = NaluFormat::LengthPrefixed { width };
        Ok(())
    }
}

/// Iterator over the units of a [`NaluStream`].
#[derive(Debug, Clone)]
pub struct Nalus<'a> {
    buf: &'a [u8],
    pos: usize,
    format: NaluFormat,
}

impl<'a> Iterator for Nalus<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        match self.format {
            NaluFormat::AnnexB { .. } => self.next_annexb(),
            NaluFormat::LengthPrefixed { width } => {
                let len = read_prefix(self.buf, self.pos, width)?;
                let start = self.pos + width;
                let nalu = self.buf.get(start..start + len)?;
                self.pos = start + len;
                Some(nalu)
            }
        }
    }
}

impl<'a> Nalus<'a> {
    fn next_annexb(&mut self) -> Option<&'a [u8]> {
        loop {
            let start = find_start_code(self.buf, self.pos)? + 3;
            let (end, next) = match find_start_code(self.buf, start) {
                // a zero before `00 00 01` belongs to a 4-byte marker
                Some(i) if i > start && self.buf[i - 1] == 0 => (i - 1, i),
                Some(i) => (i, i),
                None => (self.buf.len(), self.buf.len()),
            };
            self.pos = next;
            if end > start {
                return Some(&self.buf[start..end]);
            }
        }
    }
}

/// Offset of the next `00 00 01` at or after `from`.
fn find_start_code(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(3)
        .position(|w| w == [0, 0, 1])
        .map(|i| from + i)
}
