//! Initialization segment and fragment assembly.
//!
//! An init segment is `ftyp` + `moov` for a single AVC video track with an
//! empty sample table and an `mvex`. Each fragment is one `moof` carrying a
//! single sample, followed by the `mdat` holding that sample.

use tracing::trace;

use crate::atom::{AtomId, AtomTree, ChunkSink, FourCc};
use crate::boxes::{
    BoxSpec, DEFAULT_SAMPLE_FLAGS, HEADER_LEN, KEYFRAME_SAMPLE_FLAGS, MFHD_LEN, TFDT_LEN, TFHD_LEN,
    TRUN_LEN,
};
use crate::error::{Error, Result};

pub const MAJOR_BRAND: FourCc = *b"mp42";
pub const MINOR_VERSION: u32 = 1;
pub const COMPATIBLE_BRANDS: [FourCc; 3] = [*b"isom", *b"mp42", *b"avc1"];

/// Length of every single-sample `moof` we write.
pub const MOOF_LEN: u32 =
    HEADER_LEN + MFHD_LEN + HEADER_LEN + TFHD_LEN + TFDT_LEN + TRUN_LEN;

/// Offset from the start of the `moof` to the first sample byte in the
/// following `mdat`.
pub const SAMPLE_DATA_OFFSET: u32 = MOOF_LEN + HEADER_LEN;

/// Everything the init segment says about the one video track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrack<'a> {
    pub track_id: u32,
    pub timescale: u32,
    pub width: u32,
    pub height: u32,
    pub handler_name: &'a str,
    /// Serialized avcC record.
    pub avcc: &'a [u8],
}

/// One sample and its position in the fragment sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample<'a> {
    /// `mfhd` sequence number, starting at 1.
    pub sequence: u32,
    pub track_id: u32,
    /// Decode time in track timescale units.
    pub decode_time: u64,
    pub duration: u32,
    pub keyframe: bool,
    /// Length-prefixed NALUs.
    pub data: &'a [u8],
}

pub fn write_ftyp<S: ChunkSink>(tree: &mut AtomTree<S>, parent: AtomId) -> Result<usize> {
    tree.write_box(
        parent,
        &BoxSpec::Ftyp {
            major_brand: MAJOR_BRAND,
            minor_version: MINOR_VERSION,
            compatible_brands: &COMPATIBLE_BRANDS,
        },
    )
}

/// `trak` with `tkhd` and the full `mdia` chain down to `avcC`.
pub fn write_trak<S: ChunkSink>(
    tree: &mut AtomTree<S>,
    parent: AtomId,
    track: &VideoTrack<'_>,
) -> Result<usize> {
    let trak = tree.open_box(parent, &BoxSpec::Trak)?;
    tree.write_box(
        trak,
        &BoxSpec::Tkhd {
            track_id: track.track_id,
            duration: 0,
            width: track.width,
            height: track.height,
        },
    )?;

    let mdia = tree.open_box(trak, &BoxSpec::Mdia)?;
    tree.write_box(
        mdia,
        &BoxSpec::Mdhd {
            timescale: track.timescale,
            duration: 0,
        },
    )?;
    tree.write_box(
        mdia,
        &BoxSpec::Hdlr {
            handler_type: *b"vide",
            name: track.handler_name,
        },
    )?;

    let minf = tree.open_box(mdia, &BoxSpec::Minf)?;
    tree.write_box(minf, &BoxSpec::Vmhd)?;
    tree.write_box(minf, &BoxSpec::Dinf)?;

    let stbl = tree.open_box(minf, &BoxSpec::Stbl)?;
    let stsd = tree.open_box(stbl, &BoxSpec::Stsd)?;
    let avc1 = tree.open_box(
        stsd,
        &BoxSpec::Avc1 {
            width: clamp_u16(track.width),
            height: clamp_u16(track.height),
        },
    )?;
    tree.write_box(avc1, &BoxSpec::AvcC { record: track.avcc })?;
    tree.end(avc1)?;
    tree.end(stsd)?;
    for table in [BoxSpec::Stsz, BoxSpec::Stsc, BoxSpec::Stts, BoxSpec::Stco] {
        tree.write_box(stbl, &table)?;
    }
    tree.end(stbl)?;
    tree.end(minf)?;
    tree.end(mdia)?;
    tree.end(trak)
}

pub fn write_mvex<S: ChunkSink>(
    tree: &mut AtomTree<S>,
    parent: AtomId,
    track_id: u32,
) -> Result<usize> {
    let mvex = tree.open_box(parent, &BoxSpec::Mvex)?;
    tree.write_box(mvex, &BoxSpec::Mehd { duration: 0 })?;
    tree.write_box(mvex, &BoxSpec::Trex { track_id })?;
    tree.end(mvex)
}

/// `ftyp` + `moov` under the root. The caller flushes.
pub fn write_init_segment<S: ChunkSink>(
    tree: &mut AtomTree<S>,
    track: &VideoTrack<'_>,
) -> Result<usize> {
    let root = tree.root();
    let mut len = write_ftyp(tree, root)?;

    let moov = tree.open_box(root, &BoxSpec::Moov)?;
    tree.write_box(
        moov,
        &BoxSpec::Mvhd {
            timescale: track.timescale,
            duration: 0,
            next_track_id: 0xFFFF_FFFF,
        },
    )?;
    write_trak(tree, moov, track)?;
    write_mvex(tree, moov, track.track_id)?;
    len += tree.end(moov)?;

    trace!(
        len,
        width = track.width,
        height = track.height,
        timescale = track.timescale,
        "wrote init segment"
    );
    Ok(len)
}

/// `moof` + `mdat` for one sample under the root. The caller flushes.
pub fn write_fragment<S: ChunkSink>(tree: &mut AtomTree<S>, sample: &Sample<'_>) -> Result<usize> {
    let root = tree.root();
    let size = u32::try_from(sample.data.len()).map_err(|_| Error::AtomTooLarge {
        fourcc: "mdat".into(),
        len: sample.data.len(),
    })?;
    let first_sample_flags = if sample.keyframe {
        KEYFRAME_SAMPLE_FLAGS
    } else {
        DEFAULT_SAMPLE_FLAGS
    };

    let moof = tree.open_box(root, &BoxSpec::Moof)?;
    tree.write_box(
        moof,
        &BoxSpec::Mfhd {
            sequence: sample.sequence,
        },
    )?;
    let traf = tree.open_box(moof, &BoxSpec::Traf)?;
    tree.write_box(
        traf,
        &BoxSpec::Tfhd {
            track_id: sample.track_id,
        },
    )?;
    tree.write_box(
        traf,
        &BoxSpec::Tfdt {
            decode_time: sample.decode_time,
        },
    )?;
    tree.write_box(
        traf,
        &BoxSpec::Trun {
            data_offset: SAMPLE_DATA_OFFSET,
            first_sample_flags,
            duration: sample.duration,
            size,
        },
    )?;
    tree.end(traf)?;
    let moof_len = tree.end(moof)?;
    debug_assert_eq!(moof_len, MOOF_LEN as usize);

    let mdat_len = tree.write_box(root, &BoxSpec::Mdat { payload: sample.data })?;
    trace!(
        sequence = sample.sequence,
        decode_time = sample.decode_time,
        duration = sample.duration,
        keyframe = sample.keyframe,
        size,
        "wrote fragment"
    );
    Ok(moof_len + mdat_len)
}

fn clamp_u16(v: u32) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}
