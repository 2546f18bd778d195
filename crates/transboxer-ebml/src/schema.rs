//! Static EBML / Matroska element registry.
//!
//! Keys are raw element ids, marker bits included (`0x1A45DFA3` for the EBML
//! header). A level of `-1` marks global elements (Void, CRC-32) that may
//! appear at any depth.

use phf::phf_map;

/// Storage class of an element's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Master,
    Unsigned,
    Signed,
    Float,
    String,
    Utf8,
    Date,
    Binary,
    /// SimpleBlock / Block payloads, decoded structurally.
    Block,
    Unknown,
}

impl ElementType {
    pub fn is_master(self) -> bool {
        self == ElementType::Master
    }
}

/// Registry entry for one element id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementSchema {
    pub name: &'static str,
    pub ty: ElementType,
    pub level: i8,
}

const fn el(name: &'static str, ty: ElementType, level: i8) -> ElementSchema {
    ElementSchema { name, ty, level }
}

use ElementType::{Binary, Block, Date, Float, Master, Signed, String, Unsigned, Utf8};

static SCHEMA: phf::Map<u64, ElementSchema> = phf_map! {
    // EBML header
    0x1A45DFA3u64 => el("EBML", Master, 0),
    0x4286u64 => el("EBMLVersion", Unsigned, 1),
    0x42F7u64 => el("EBMLReadVersion", Unsigned, 1),
    0x42F2u64 => el("EBMLMaxIDLength", Unsigned, 1),
    0x42F3u64 => el("EBMLMaxSizeLength", Unsigned, 1),
    0x4282u64 => el("DocType", String, 1),
    0x4287u64 => el("DocTypeVersion", Unsigned, 1),
    0x4285u64 => el("DocTypeReadVersion", Unsigned, 1),

    // Global
    0xECu64 => el("Void", Binary, -1),
    0xBFu64 => el("CRC-32", Binary, -1),

    // Segment
    0x18538067u64 => el("Segment", Master, 0),

    // Meta seek
    0x114D9B74u64 => el("SeekHead", Master, 1),
    0x4DBBu64 => el("Seek", Master, 2),
    0x53ABu64 => el("SeekID", Binary, 3),
    0x53ACu64 => el("SeekPosition", Unsigned, 3),

    // Segment information
    0x1549A966u64 => el("Info", Master, 1),
    0x73A4u64 => el("SegmentUID", Binary, 2),
    0x7384u64 => el("SegmentFilename", Utf8, 2),
    0x2AD7B1u64 => el("TimecodeScale", Unsigned, 2),
    0x4489u64 => el("Duration", Float, 2),
    0x4461u64 => el("DateUTC", Date, 2),
    0x7BA9u64 => el("Title", Utf8, 2),
    0x4D80u64 => el("MuxingApp", Utf8, 2),
    0x5741u64 => el("WritingApp", Utf8, 2),

    // Cluster
    0x1F43B675u64 => el("Cluster", Master, 1),
    0xE7u64 => el("Timecode", Unsigned, 2),
    0xA7u64 => el("Position", Unsigned, 2),
    0xABu64 => el("PrevSize", Unsigned, 2),
    0xA3u64 => el("SimpleBlock", Block, 2),
    0xA0u64 => el("BlockGroup", Master, 2),
    0xA1u64 => el("Block", Block, 3),
    0x9Bu64 => el("BlockDuration", Unsigned, 3),
    0xFAu64 => el("ReferencePriority", Unsigned, 3),
    0xFBu64 => el("ReferenceBlock", Signed, 3),
    0xA4u64 => el("CodecState", Binary, 3),
    0x75A2u64 => el("DiscardPadding", Signed, 3),

    // Tracks
    0x1654AE6Bu64 => el("Tracks", Master, 1),
    0xAEu64 => el("TrackEntry", Master, 2),
    0xD7u64 => el("TrackNumber", Unsigned, 3),
    0x73C5u64 => el("TrackUID", Unsigned, 3),
    0x83u64 => el("TrackType", Unsigned, 3),
    0xB9u64 => el("FlagEnabled", Unsigned, 3),
    0x88u64 => el("FlagDefault", Unsigned, 3),
    0x55AAu64 => el("FlagForced", Unsigned, 3),
    0x9Cu64 => el("FlagLacing", Unsigned, 3),
    0x23E383u64 => el("DefaultDuration", Unsigned, 3),
    0x536Eu64 => el("Name", Utf8, 3),
    0x22B59Cu64 => el("Language", String, 3),
    0x86u64 => el("CodecID", String, 3),
    0x63A2u64 => el("CodecPrivate", Binary, 3),
    0x258688u64 => el("CodecName", Utf8, 3),
    0x56AAu64 => el("CodecDelay", Unsigned, 3),
    0x56BBu64 => el("SeekPreRoll", Unsigned, 3),

    // Video settings
    0xE0u64 => el("Video", Master, 3),
    0x9Au64 => el("FlagInterlaced", Unsigned, 4),
    0x53B8u64 => el("StereoMode", Unsigned, 4),
    0x53C0u64 => el("AlphaMode", Unsigned, 4),
    0xB0u64 => el("PixelWidth", Unsigned, 4),
    0xBAu64 => el("PixelHeight", Unsigned, 4),
    0x54AAu64 => el("PixelCropBottom", Unsigned, 4),
    0x54BBu64 => el("PixelCropTop", Unsigned, 4),
    0x54CCu64 => el("PixelCropLeft", Unsigned, 4),
    0x54DDu64 => el("PixelCropRight", Unsigned, 4),
    0x54B0u64 => el("DisplayWidth", Unsigned, 4),
    0x54BAu64 => el("DisplayHeight", Unsigned, 4),
    0x54B2u64 => el("DisplayUnit", Unsigned, 4),
    0x2383E3u64 => el("FrameRate", Float, 4),

    // Audio settings
    0xE1u64 => el("Audio", Master, 3),
    0xB5u64 => el("SamplingFrequency", Float, 4),
    0x78B5u64 => el("OutputSamplingFrequency", Float, 4),
    0x9Fu64 => el("Channels", Unsigned, 4),
    0x6264u64 => el("BitDepth", Unsigned, 4),

    // Cueing data
    0x1C53BB6Bu64 => el("Cues", Master, 1),
    0xBBu64 => el("CuePoint", Master, 2),
    0xB3u64 => el("CueTime", Unsigned, 3),
    0xB7u64 => el("CueTrackPositions", Master, 3),
    0xF7u64 => el("CueTrack", Unsigned, 4),
    0xF1u64 => el("CueClusterPosition", Unsigned, 4),
    0x5378u64 => el("CueBlockNumber", Unsigned, 4),

    // Tagging
    0x1254C367u64 => el("Tags", Master, 1),
    0x7373u64 => el("Tag", Master, 2),
    0x63C0u64 => el("Targets", Master, 3),
    0x67C8u64 => el("SimpleTag", Master, 3),
    0x45A3u64 => el("TagName", Utf8, 4),
    0x4487u64 => el("TagString", Utf8, 4),
};

/// Look up the registry entry for a raw element id.
pub fn lookup(id: u64) -> Option<&'static ElementSchema> {
    SCHEMA.get(&id)
}

/// Name of a raw element id, or `"Unknown"`.
pub fn name_of(id: u64) -> &'static str {
    lookup(id).map_or("Unknown", |s| s.name)
}

/// Raw element ids the transboxer cares about by name.
pub mod ids {
    pub const EBML: u64 = 0x1A45DFA3;
    pub const DOC_TYPE: u64 = 0x4282;
    pub const SEGMENT: u64 = 0x18538067;
    pub const INFO: u64 = 0x1549A966;
    pub const TIMECODE_SCALE: u64 = 0x2AD7B1;
    pub const DURATION: u64 = 0x4489;
    pub const DATE_UTC: u64 = 0x4461;
    pub const MUXING_APP: u64 = 0x4D80;
    pub const CLUSTER: u64 = 0x1F43B675;
    pub const TIMECODE: u64 = 0xE7;
    pub const SIMPLE_BLOCK: u64 = 0xA3;
    pub const BLOCK_GROUP: u64 = 0xA0;
    pub const BLOCK: u64 = 0xA1;
    pub const TRACKS: u64 = 0x1654AE6B;
    pub const TRACK_ENTRY: u64 = 0xAE;
    pub const TRACK_NUMBER: u64 = 0xD7;
    pub const TRACK_TYPE: u64 = 0x83;
    pub const CODEC_ID: u64 = 0x86;
    pub const CODEC_PRIVATE: u64 = 0x63A2;
    pub const VIDEO: u64 = 0xE0;
    pub const PIXEL_WIDTH: u64 = 0xB0;
    pub const PIXEL_HEIGHT: u64 = 0xBA;
    pub const VOID: u64 = 0xEC;
    pub const REFERENCE_BLOCK: u64 = 0xFB;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        let s = lookup(ids::CLUSTER).unwrap();
        assert_eq!(s.name, "Cluster");
        assert!(s.ty.is_master());
        assert_eq!(s.level, 1);

        assert_eq!(lookup(ids::SIMPLE_BLOCK).unwrap().ty, ElementType::Block);
        assert_eq!(lookup(ids::DATE_UTC).unwrap().ty, ElementType::Date);
        assert_eq!(lookup(ids::VOID).unwrap().level, -1);
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(lookup(0x12345678).is_none());
        assert_eq!(name_of(0x12345678), "Unknown");
        assert_eq!(name_of(ids::PIXEL_WIDTH), "PixelWidth");
    }

    #[test]
    fn test_children_are_deeper_than_parents() {
        let pairs = [
            (ids::SEGMENT, ids::CLUSTER),
            (ids::CLUSTER, ids::SIMPLE_BLOCK),
            (ids::TRACKS, ids::TRACK_ENTRY),
            (ids::TRACK_ENTRY, ids::VIDEO),
            (ids::VIDEO, ids::PIXEL_HEIGHT),
            (ids::BLOCK_GROUP, ids::BLOCK),
        ];
        for (parent, child) in pairs {
            assert_eq!(
                lookup(parent).unwrap().level + 1,
                lookup(child).unwrap().level,
                "{} -> {}",
                name_of(parent),
                name_of(child)
            );
        }
    }
}
