//! AVCDecoderConfigurationRecord (ISO/IEC 14496-15 5.3.3.1).
//!
//! ```text
//! u8   configurationVersion = 1
//! u8   AVCProfileIndication
//! u8   profile_compatibility
//! u8   AVCLevelIndication
//! u8   0xFC | lengthSizeMinusOne
//! u8   0xE0 | numOfSequenceParameterSets
//!      { u16 length, SPS bytes } *
//! u8   numOfPictureParameterSets
//!      { u16 length, PPS bytes } *
//!      trailing bytes (high-profile extensions), kept verbatim
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{Error, Result};
use crate::nal::{NalUnitType, NaluStream};
use crate::sps::Sps;

/// A parsed or assembled avcC record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    pub version: u8,
    pub profile: u8,
    pub compatibility: u8,
    pub level: u8,
    /// NALU length prefix width, 1..=4.
    pub length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    pub trailing: Bytes,
}

impl AvcConfig {
    /// Build from explicit parameter sets. Profile bytes come from the SPS.
    pub fn from_parameter_sets(sps: Bytes, pps: Bytes, length_size: u8) -> Result<Self> {
        if !(1..=4).contains(&length_size) {
            return Err(Error::InvalidAvcC(format!(
                "length size {length_size}, expected 1..=4"
            )));
        }
        if sps.len() < 4 {
            return Err(Error::InvalidAvcC(format!("SPS of {} bytes", sps.len())));
        }
        if sps.len() > u16::MAX as usize || pps.len() > u16::MAX as usize {
            return Err(Error::InvalidAvcC("parameter set longer than 65535 bytes".into()));
        }
        Ok(Self {
            version: 1,
            profile: sps[1],
            compatibility: sps[2],
            level: sps[3],
            length_size,
            sps: vec![sps],
            pps: vec![pps],
            trailing: Bytes::new(),
        })
    }

    /// Take the first SPS and first PPS found in a NALU stream.
    ///
    /// In strict mode a missing SPS or PPS is an error; otherwise the
    /// corresponding list is left empty.
    pub fn from_nalu_stream(stream: &NaluStream, strict: bool) -> Result<Self> {
        let mut sps = None;
        let mut pps = None;
        for nalu in stream.nalus() {
            match NalUnitType::of(nalu) {
                Some(NalUnitType::Sps) if sps.is_none() => sps = Some(Bytes::copy_from_slice(nalu)),
                Some(NalUnitType::Pps) if pps.is_none() => pps = Some(Bytes::copy_from_slice(nalu)),
                _ => {}
            }
            if sps.is_some() && pps.is_some() {
                break;
            }
        }

        if strict {
            if sps.is_none() {
                return Err(Error::MissingParameterSet("SPS"));
            }
            if pps.is_none() {
                return Err(Error::MissingParameterSet("PPS"));
            }
        }

        let length_size = stream.format().width() as u8;
        match (sps, pps) {
            (Some(sps), Some(pps)) => Self::from_parameter_sets(sps, pps, length_size),
            (sps, pps) => {
                debug!(
                    has_sps = sps.is_some(),
                    has_pps = pps.is_some(),
                    "incomplete parameter sets in NALU stream"
                );
                let (profile, compatibility, level) = sps
                    .as_ref()
                    .filter(|s| s.len() >= 4)
                    .map_or((0, 0, 0), |s| (s[1], s[2], s[3]));
                Ok(Self {
                    version: 1,
                    profile,
                    compatibility,
                    level,
                    length_size,
                    sps: sps.into_iter().collect(),
                    pps: pps.into_iter().collect(),
                    trailing: Bytes::new(),
                })
            }
        }
    }

    /// Parse an existing record, e.g. a Matroska CodecPrivate.
    pub fn parse(data: &[u8], strict: bool) -> Result<Self> {
        let mut buf = data;
        if buf.remaining() < 6 {
            return Err(Error::InvalidAvcC(format!("{} bytes, need at least 6", buf.len())));
        }
        let version = buf.get_u8();
        if strict && version != 1 {
            return Err(Error::UnsupportedVersion(version));
        }
        let profile = buf.get_u8();
        let compatibility = buf.get_u8();
        let level = buf.get_u8();
        let length_size = (buf.get_u8() & 0x03) + 1;

        let sps_count = buf.get_u8() & 0x1F;
        let sps = read_sets(&mut buf, sps_count as usize, "SPS")?;

        if !buf.has_remaining() {
            return Err(Error::InvalidAvcC("missing PPS count".into()));
        }
        let pps_count = buf.get_u8();
        let pps = read_sets(&mut buf, pps_count as usize, "PPS")?;

        Ok(Self {
            version,
            profile,
            compatibility,
            level,
            length_size,
            sps,
            pps,
            trailing: Bytes::copy_from_slice(buf),
        })
    }

    /// Serialize the record from its current lists.
    ///
    /// The PPS count byte is written as the plain count, with no reserved
    /// high bits, matching the records browsers and WebM muxers emit
    /// (e.g. `01 4d 40 1e ff e1 .. 01 00 04 ..`). [`parse`](Self::parse)
    /// reads it the same way.
    ///
    /// Fails when a list or a parameter set is too long for its field: at
    /// most 31 SPS, 255 PPS, 65535 bytes each.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let sps_count = u8::try_from(self.sps.len())
            .ok()
            .filter(|&n| n <= 0x1F)
            .ok_or_else(|| Error::InvalidAvcC(format!("{} SPS, at most 31", self.sps.len())))?;
        let pps_count = u8::try_from(self.pps.len())
            .map_err(|_| Error::InvalidAvcC(format!("{} PPS, at most 255", self.pps.len())))?;

        let sets: usize = self.sps.iter().chain(&self.pps).map(|s| s.len() + 2).sum();
        let mut out = BytesMut::with_capacity(7 + sets + self.trailing.len());
        out.put_u8(self.version);
        out.put_u8(self.profile);
        out.put_u8(self.compatibility);
        out.put_u8(self.level);
        out.put_u8(0xFC | (self.length_size.clamp(1, 4) - 1));
        out.put_u8(0xE0 | sps_count);
        for sps in &self.sps {
            out.put_u16(set_len("SPS", sps)?);
            out.put_slice(sps);
        }
        out.put_u8(pps_count);
        for pps in &self.pps {
            out.put_u16(set_len("PPS", pps)?);
            out.put_slice(pps);
        }
        out.put_slice(&self.trailing);
        Ok(out.freeze())
    }

    /// Decode the first SPS.
    pub fn first_sps(&self) -> Result<Sps> {
        let sps = self.sps.first().ok_or(Error::MissingParameterSet("SPS"))?;
        Sps::parse(sps)
    }

    /// RFC 6381 codec string from the record's profile bytes.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02X}{:02X}{:02X}",
            self.profile, self.compatibility, self.level
        )
    }
}

fn set_len(what: &str, set: &[u8]) -> Result<u16> {
    u16::try_from(set.len())
        .map_err(|_| Error::InvalidAvcC(format!("{what} of {} bytes, at most 65535", set.len())))
}

fn read_sets(buf: &mut &[u8], count: usize, what: &str) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for i in 0..count {
        if buf.remaining() < 2 {
            return Err(Error::InvalidAvcC(format!("{what} {i} length truncated")));
        }
        let len = buf.get_u16() as usize;
        if buf.remaining() < len {
            return Err(Error::InvalidAvcC(format!(
                "{what} {i} needs {len} bytes, {} left",
                buf.remaining()
            )));
        }
        sets.push(Bytes::copy_from_slice(&buf[..len]));
        buf.advance(len);
    }
    Ok(sets)
}
