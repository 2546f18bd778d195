//! Synthetic WebM streams for integration tests.
//!
//! Streams are laid out the way live recorders write them: an EBML header,
//! then an unknown-size Segment holding Info, Tracks and unknown-size
//! Clusters of H.264 frames.

#![allow(dead_code)]

use bytes::Bytes;
use transboxer_avc::AvcConfig;
use transboxer_ebml::encode;
use transboxer_ebml::schema::ids;

/// Baseline 640x480 SPS carrying an emulation-prevention byte.
pub const SPS: &str = "6742c01e95a0280f6840000003004000000f03682211a8";
pub const PPS: &str = "68ce3880";
const AUD: &str = "0910";
const IDR_SLICE: &str = "6588840021fe";
const P_SLICE: &str = "419a0220ab";

const OPUS_FRAME: [u8; 4] = [0xFC, 0xFF, 0xFE, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// 4-byte start codes
    AnnexB,
    /// 4-byte big-endian lengths
    LengthPrefixed,
}

#[derive(Debug, Clone)]
pub struct Stream {
    pub clusters: usize,
    pub frames_per_cluster: usize,
    /// Milliseconds between frames.
    pub frame_ms: i16,
    pub framing: Framing,
    /// Put an avcC built from the parameter sets into CodecPrivate.
    pub codec_private: bool,
    /// Hex SPS to put in the CodecPrivate record instead of [`SPS`].
    pub codec_private_sps: Option<&'static str>,
    /// Leave the parameter sets out of the frames.
    pub omit_parameter_sets: bool,
    /// Follow every video frame with a frame on audio track 2.
    pub audio_track: bool,
    /// Wrap frames in BlockGroups; delta frames carry a ReferenceBlock.
    pub block_groups: bool,
    pub pixel_width: u64,
    pub pixel_height: u64,
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            clusters: 3,
            frames_per_cluster: 5,
            frame_ms: 40,
            framing: Framing::AnnexB,
            codec_private: false,
            codec_private_sps: None,
            omit_parameter_sets: false,
            audio_track: false,
            block_groups: false,
            pixel_width: 640,
            pixel_height: 480,
        }
    }
}

impl Stream {
    pub fn video_frames(&self) -> usize {
        self.clusters * self.frames_per_cluster
    }

    pub fn blocks(&self) -> usize {
        self.video_frames() * if self.audio_track { 2 } else { 1 }
    }

    /// Absolute time of frame `n` in milliseconds.
    pub fn frame_time(&self, n: usize) -> u64 {
        n as u64 * self.frame_ms as u64
    }
}

fn unhex(s: &str) -> Vec<u8> {
    hex::decode(s).unwrap()
}

/// NAL units of one access unit, without framing.
pub fn access_unit(keyframe: bool, parameter_sets: bool) -> Vec<Vec<u8>> {
    let mut nalus = vec![unhex(AUD)];
    if keyframe {
        if parameter_sets {
            nalus.push(unhex(SPS));
            nalus.push(unhex(PPS));
        }
        nalus.push(unhex(IDR_SLICE));
    } else {
        nalus.push(unhex(P_SLICE));
    }
    nalus
}

pub fn frame(nalus: &[Vec<u8>], framing: Framing) -> Vec<u8> {
    let mut out = Vec::new();
    for nalu in nalus {
        match framing {
            Framing::AnnexB => out.extend_from_slice(&[0, 0, 0, 1]),
            Framing::LengthPrefixed => out.extend_from_slice(&(nalu.len() as u32).to_be_bytes()),
        }
        out.extend_from_slice(nalu);
    }
    out
}

/// The avcC record the stream's parameter sets produce.
pub fn avcc() -> Bytes {
    avcc_with(SPS)
}

/// An avcC record holding `sps` and the stream's PPS.
pub fn avcc_with(sps: &str) -> Bytes {
    AvcConfig::from_parameter_sets(Bytes::from(unhex(sps)), Bytes::from(unhex(PPS)), 4)
        .unwrap()
        .to_bytes()
        .unwrap()
}

fn block_body(track: u64, timecode: i16, flags: u8, frame: &[u8]) -> Vec<u8> {
    let mut body = encode::encode_vint(track).unwrap().to_vec();
    body.extend_from_slice(&timecode.to_be_bytes());
    body.push(flags);
    body.extend_from_slice(frame);
    body
}

fn video_block(stream: &Stream, timecode: i16, keyframe: bool, frame: &[u8]) -> Bytes {
    if !stream.block_groups {
        return encode::simple_block(1, timecode, keyframe, frame).unwrap();
    }
    let block = encode::element(ids::BLOCK, &block_body(1, timecode, 0, frame)).unwrap();
    let mut children = vec![block];
    if !keyframe {
        children.push(encode::signed(ids::REFERENCE_BLOCK, -(stream.frame_ms as i64)).unwrap());
    }
    encode::master(ids::BLOCK_GROUP, children).unwrap()
}

fn tracks(stream: &Stream) -> Bytes {
    let mut video = vec![
        encode::unsigned(ids::TRACK_NUMBER, 1).unwrap(),
        encode::unsigned(ids::TRACK_TYPE, 1).unwrap(),
        encode::string(ids::CODEC_ID, "V_MPEG4/ISO/AVC").unwrap(),
    ];
    if stream.codec_private {
        let record = avcc_with(stream.codec_private_sps.unwrap_or(SPS));
        video.push(encode::element(ids::CODEC_PRIVATE, &record).unwrap());
    }
    video.push(
        encode::master(
            ids::VIDEO,
            [
                encode::unsigned(ids::PIXEL_WIDTH, stream.pixel_width).unwrap(),
                encode::unsigned(ids::PIXEL_HEIGHT, stream.pixel_height).unwrap(),
            ],
        )
        .unwrap(),
    );

    let mut entries = vec![encode::master(ids::TRACK_ENTRY, video).unwrap()];
    if stream.audio_track {
        entries.push(
            encode::master(
                ids::TRACK_ENTRY,
                [
                    encode::unsigned(ids::TRACK_NUMBER, 2).unwrap(),
                    encode::unsigned(ids::TRACK_TYPE, 2).unwrap(),
                    encode::string(ids::CODEC_ID, "A_OPUS").unwrap(),
                ],
            )
            .unwrap(),
        );
    }
    encode::master(ids::TRACKS, entries).unwrap()
}

/// Header, Info and Tracks only.
pub fn preamble(stream: &Stream) -> Vec<u8> {
    webm_parts(stream, false)
}

/// A complete stream.
pub fn webm(stream: &Stream) -> Vec<u8> {
    webm_parts(stream, true)
}

fn webm_parts(stream: &Stream, with_clusters: bool) -> Vec<u8> {
    let header = encode::master(
        ids::EBML,
        [
            encode::unsigned(0x4286, 1).unwrap(), // EBMLVersion
            encode::string(ids::DOC_TYPE, "webm").unwrap(),
        ],
    )
    .unwrap();

    let info = encode::master(
        ids::INFO,
        [
            encode::unsigned(ids::TIMECODE_SCALE, 1_000_000).unwrap(),
            encode::string(ids::MUXING_APP, "transboxer-tests").unwrap(),
        ],
    )
    .unwrap();

    let mut segment = vec![info, tracks(stream)];
    if with_clusters {
        for c in 0..stream.clusters {
            let base = (c * stream.frames_per_cluster) as u64 * stream.frame_ms as u64;
            let mut children = vec![encode::unsigned(ids::TIMECODE, base).unwrap()];
            for i in 0..stream.frames_per_cluster {
                let keyframe = i == 0;
                let nalus = access_unit(keyframe, !stream.omit_parameter_sets);
                let timecode = i as i16 * stream.frame_ms;
                children.push(video_block(
                    stream,
                    timecode,
                    keyframe,
                    &frame(&nalus, stream.framing),
                ));
                if stream.audio_track {
                    children.push(encode::simple_block(2, timecode, true, &OPUS_FRAME).unwrap());
                }
            }
            segment.push(encode::master_unknown_size(ids::CLUSTER, children).unwrap());
        }
    }

    let segment = encode::master_unknown_size(ids::SEGMENT, segment).unwrap();
    let mut out = header.to_vec();
    out.extend_from_slice(&segment);
    out
}

/// A box found while walking MP4 output.
#[derive(Debug, Clone, Copy)]
pub struct Mp4Box<'a> {
    pub fourcc: [u8; 4],
    pub body: &'a [u8],
}

impl Mp4Box<'_> {
    pub fn name(&self) -> &str {
        std::str::from_utf8(&self.fourcc).unwrap()
    }
}

/// Split a run of sibling boxes. Panics on a malformed size.
pub fn boxes(mut data: &[u8]) -> Vec<Mp4Box<'_>> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let size = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
        assert!(size >= 8 && size <= data.len(), "bad box size {size}");
        out.push(Mp4Box {
            fourcc: data[4..8].try_into().unwrap(),
            body: &data[8..size],
        });
        data = &data[size..];
    }
    out
}

/// Follow a path of container names, e.g. `["moof", "traf", "tfdt"]`.
/// Skips `skip` bytes of fields before the children of counted containers.
pub fn find<'a>(data: &'a [u8], path: &[&str]) -> Option<&'a [u8]> {
    let (first, rest) = path.split_first()?;
    let found = boxes(data).into_iter().find(|b| b.name() == *first)?;
    if rest.is_empty() {
        return Some(found.body);
    }
    let children = match *first {
        "stsd" => &found.body[8..],
        "avc1" => &found.body[78..],
        _ => found.body,
    };
    find(children, rest)
}

pub fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(data[at..at + 4].try_into().unwrap())
}

pub fn be_u64(data: &[u8], at: usize) -> u64 {
    u64::from_be_bytes(data[at..at + 8].try_into().unwrap())
}
