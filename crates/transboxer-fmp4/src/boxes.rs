//! Box payload layouts for the fragmented MP4 subset we emit.
//!
//! Each [`BoxSpec`] knows its four-character code, a size hint, whether it
//! is a counted container, and how to write its own fields. Children are
//! added by the caller through the [`AtomTree`].

use crate::atom::{AtomId, AtomTree, AtomWriter, ChunkSink, FourCc};
use crate::error::Result;

/// Default handler name written into `hdlr`.
pub const DEFAULT_HANDLER_NAME: &str = "WebM Transboxer";

/// trun flags: data-offset, first-sample-flags, sample-duration and
/// sample-size present.
pub const TRUN_FLAGS: u32 = 0x0000_0305;
/// tfhd flags: default-sample-flags present, default-base-is-moof.
pub const TFHD_FLAGS: u32 = 0x0002_0020;
/// Non-sync, depends on others.
pub const DEFAULT_SAMPLE_FLAGS: u32 = 0x0101_0000;
/// Sync sample, depends on no others.
pub const KEYFRAME_SAMPLE_FLAGS: u32 = 0x0200_0000;

/// Packed language field written into every `mdhd`.
pub const MDHD_LANGUAGE: u16 = 0x15E0;

pub(crate) const MFHD_LEN: u32 = 16;
pub(crate) const TFHD_LEN: u32 = 20;
pub(crate) const TFDT_LEN: u32 = 20;
pub(crate) const TRUN_LEN: u32 = 32;
pub(crate) const HEADER_LEN: u32 = 8;

const UNITY_MATRIX: [u32; 9] = [
    0x0001_0000,
    0,
    0,
    0,
    0x0001_0000,
    0,
    0,
    0,
    0x4000_0000,
];

/// One box and the values its fields are written from.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxSpec<'a> {
    Ftyp {
        major_brand: FourCc,
        minor_version: u32,
        compatible_brands: &'a [FourCc],
    },
    Moov,
    Mvhd {
        timescale: u32,
        duration: u32,
        next_track_id: u32,
    },
    Trak,
    Tkhd {
        track_id: u32,
        duration: u32,
        width: u32,
        height: u32,
    },
    Mdia,
    Mdhd {
        timescale: u32,
        duration: u32,
    },
    Hdlr {
        handler_type: FourCc,
        name: &'a str,
    },
    Minf,
    Vmhd,
    Dinf,
    Stbl,
    Stsd,
    Avc1 {
        width: u16,
        height: u16,
    },
    AvcC {
        record: &'a [u8],
    },
    Stsz,
    Stsc,
    Stts,
    Stco,
    Mvex,
    Mehd {
        duration: u32,
    },
    Trex {
        track_id: u32,
    },
    Moof,
    Mfhd {
        sequence: u32,
    },
    Traf,
    Tfhd {
        track_id: u32,
    },
    Tfdt {
        decode_time: u64,
    },
    Trun {
        data_offset: u32,
        first_sample_flags: u32,
        duration: u32,
        size: u32,
    },
    Mdat {
        payload: &'a [u8],
    },
}

impl BoxSpec<'_> {
    pub fn fourcc(&self) -> FourCc {
        match self {
            BoxSpec::Ftyp { .. } => *b"ftyp",
            BoxSpec::Moov => *b"moov",
            BoxSpec::Mvhd { .. } => *b"mvhd",
            BoxSpec::Trak => *b"trak",
            BoxSpec::Tkhd { .. } => *b"tkhd",
            BoxSpec::Mdia => *b"mdia",
            BoxSpec::Mdhd { .. } => *b"mdhd",
            BoxSpec::Hdlr { .. } => *b"hdlr",
            BoxSpec::Minf => *b"minf",
            BoxSpec::Vmhd => *b"vmhd",
            BoxSpec::Dinf => *b"dinf",
            BoxSpec::Stbl => *b"stbl",
            BoxSpec::Stsd => *b"stsd",
            BoxSpec::Avc1 { .. } => *b"avc1",
            BoxSpec::AvcC { .. } => *b"avcC",
            BoxSpec::Stsz => *b"stsz",
            BoxSpec::Stsc => *b"stsc",
            BoxSpec::Stts => *b"stts",
            BoxSpec::Stco => *b"stco",
            BoxSpec::Mvex => *b"mvex",
            BoxSpec::Mehd { .. } => *b"mehd",
            BoxSpec::Trex { .. } => *b"trex",
            BoxSpec::Moof => *b"moof",
            BoxSpec::Mfhd { .. } => *b"mfhd",
            BoxSpec::Traf => *b"traf",
            BoxSpec::Tfhd { .. } => *b"tfhd",
            BoxSpec::Tfdt { .. } => *b"tfdt",
            BoxSpec::Trun { .. } => *b"trun",
            BoxSpec::Mdat { .. } => *b"mdat",
        }
    }

    /// Bytes to reserve when the box is opened.
    pub fn initial_size(&self) -> usize {
        match self {
            BoxSpec::Ftyp {
                compatible_brands, ..
            } => 16 + 4 * compatible_brands.len(),
            BoxSpec::Moov => 1024,
            BoxSpec::Mvhd { .. } => 120,
            BoxSpec::Trak => 500,
            BoxSpec::Tkhd { .. } => 100,
            BoxSpec::Mdia => 400,
            BoxSpec::Mdhd { .. } => 32,
            BoxSpec::Hdlr { name, .. } => 33 + name.len(),
            BoxSpec::Minf => 350,
            BoxSpec::Vmhd => 20,
            BoxSpec::Dinf => 50,
            BoxSpec::Stbl => 250,
            BoxSpec::Stsd => 150,
            BoxSpec::Avc1 { .. } => 150,
            BoxSpec::AvcC { record } => 8 + record.len(),
            BoxSpec::Stsz => 20,
            BoxSpec::Stsc | BoxSpec::Stts | BoxSpec::Stco => 16,
            BoxSpec::Mvex => 56,
            BoxSpec::Mehd { .. } => 16,
            BoxSpec::Trex { .. } => 32,
            BoxSpec::Moof => 110,
            BoxSpec::Mfhd { .. } => MFHD_LEN as usize,
            BoxSpec::Traf => 90,
            BoxSpec::Tfhd { .. } => TFHD_LEN as usize,
            BoxSpec::Tfdt { .. } => TFDT_LEN as usize,
            BoxSpec::Trun { .. } => TRUN_LEN as usize,
            BoxSpec::Mdat { payload } => HEADER_LEN as usize + payload.len(),
        }
    }

    /// Containers whose body starts with a child count.
    pub fn is_counted(&self) -> bool {
        matches!(self, BoxSpec::Stsd)
    }

    /// Write this box's own fields. For counted containers the count
    /// placeholder follows whatever this writes.
    pub fn populate(&self, w: &mut AtomWriter<'_>) {
        match *self {
            BoxSpec::Ftyp {
                ref major_brand,
                minor_version,
                compatible_brands,
            } => {
                w.fourcc(major_brand).u32(minor_version);
                for brand in compatible_brands {
                    w.fourcc(brand);
                }
            }
            BoxSpec::Mvhd {
                timescale,
                duration,
                next_track_id,
            } => {
                w.u32(0) // version/flags
                    .u32(0) // creation time
                    .u32(0) // modification time
                    .u32(timescale)
                    .u32(duration)
                    .u32(0x0001_0000) // rate 1.0
                    .u16(0x0100) // volume 1.0
                    .zeros(2 + 8)
                    .u32s(&UNITY_MATRIX)
                    .zeros(24) // pre_defined
                    .u32(next_track_id);
            }
            BoxSpec::Tkhd {
                track_id,
                duration,
                width,
                height,
            } => {
                w.u32(0x0000_0007) // enabled, in movie, in preview
                    .u32(0)
                    .u32(0)
                    .u32(track_id)
                    .u32(0)
                    .u32(duration)
                    .zeros(8)
                    .u16(0) // layer
                    .u16(0) // alternate group
                    .u16(0) // volume
                    .u16(0)
                    .u32s(&UNITY_MATRIX)
                    .fixed16_16(f64::from(width))
                    .fixed16_16(f64::from(height));
            }
            BoxSpec::Mdhd {
                timescale,
                duration,
            } => {
                w.u32(0)
                    .u32(0)
                    .u32(0)
                    .u32(timescale)
                    .u32(duration)
                    .u16(MDHD_LANGUAGE)
                    .u16(0);
            }
            BoxSpec::Hdlr {
                ref handler_type,
                name,
            } => {
                w.u32(0).u32(0).fourcc(handler_type).zeros(12).cstring(name);
            }
            BoxSpec::Vmhd => {
                w.u32(0x0000_0001).u16(0).u16(0).u16(0).u16(0);
            }
            BoxSpec::Dinf => {
                // dref with a single self-contained `url ` entry
                w.u32(28)
                    .fourcc(b"dref")
                    .u32(0)
                    .u32(1)
                    .u32(12)
                    .fourcc(b"url ")
                    .u32(0x0000_0001);
            }
            BoxSpec::Stsd => {
                w.u32(0);
            }
            BoxSpec::Avc1 { width, height } => {
                w.u32(0) // reserved
                    .u32(1) // reserved, data_reference_index
                    .zeros(16)
                    .u16(width)
                    .u16(height)
                    .u32(0x0048_0000) // 72 dpi
                    .u32(0x0048_0000)
                    .u32(0)
                    .u16(1) // frame count
                    .u8(4)
                    .cstring("h264")
                    .zeros(27)
                    .u8(0x18) // depth
                    .u16(0xFFFF); // pre_defined
            }
            BoxSpec::AvcC { record } => {
                w.bytes(record);
            }
            BoxSpec::Stsz => {
                w.u32(0).u32(0).u32(0);
            }
            BoxSpec::Stsc | BoxSpec::Stts | BoxSpec::Stco => {
                w.u32(0).u32(0);
            }
            BoxSpec::Mehd { duration } => {
                w.u32(0).u32(duration);
            }
            BoxSpec::Trex { track_id } => {
                w.u32(0).u32(track_id).u32(1).u32(0).u32(0).u32(0);
            }
            BoxSpec::Mfhd { sequence } => {
                w.u32(0).u32(sequence);
            }
            BoxSpec::Tfhd { track_id } => {
                w.u32(TFHD_FLAGS).u32(track_id).u32(DEFAULT_SAMPLE_FLAGS);
            }
            BoxSpec::Tfdt { decode_time } => {
                w.u8(1).u24(0).u64(decode_time);
            }
            BoxSpec::Trun {
                data_offset,
                first_sample_flags,
                duration,
                size,
            } => {
                w.u32(TRUN_FLAGS)
                    .u32(1) // sample count
                    .u32(data_offset)
                    .u32(first_sample_flags)
                    .u32(duration)
                    .u32(size);
            }
            BoxSpec::Mdat { payload } => {
                w.bytes(payload);
            }
            BoxSpec::Moov
            | BoxSpec::Trak
            | BoxSpec::Mdia
            | BoxSpec::Minf
            | BoxSpec::Stbl
            | BoxSpec::Mvex
            | BoxSpec::Moof
            | BoxSpec::Traf => {}
        }
    }
}

impl<S: ChunkSink> AtomTree<S> {
    /// Open `spec` under `parent` and write its fields. Children may follow.
    pub fn open_box(&mut self, parent: AtomId, spec: &BoxSpec<'_>) -> Result<AtomId> {
        let id = if spec.is_counted() {
            self.open_counted(parent, spec.fourcc(), spec.initial_size())?
        } else {
            self.open(parent, spec.fourcc(), spec.initial_size())?
        };
        spec.populate(&mut self.writer(id)?);
        if spec.is_counted() {
            self.count_placeholder(id)?;
        }
        Ok(id)
    }

    /// Write a leaf box in one go. Returns its length.
    pub fn write_box(&mut self, parent: AtomId, spec: &BoxSpec<'_>) -> Result<usize> {
        let id = self.open_box(parent, spec)?;
        self.end(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::OutputChunk;

    fn write(spec: BoxSpec<'_>) -> Vec<u8> {
        let mut tree: AtomTree<Vec<OutputChunk>> = AtomTree::new("video/mp4", 64, Vec::new());
        let root = tree.root();
        tree.write_box(root, &spec).unwrap();
        tree.peek(root).unwrap().to_vec()
    }

    #[test]
    fn test_fixed_box_lengths() {
        let cases = [
            (
                BoxSpec::Mvhd {
                    timescale: 1000,
                    duration: 0,
                    next_track_id: 0xFFFF_FFFF,
                },
                108,
            ),
            (
                BoxSpec::Tkhd {
                    track_id: 1,
                    duration: 0,
                    width: 640,
                    height: 480,
                },
                92,
            ),
            (
                BoxSpec::Mdhd {
                    timescale: 1000,
                    duration: 0,
                },
                32,
            ),
            (BoxSpec::Vmhd, 20),
            (BoxSpec::Dinf, 36),
            (BoxSpec::Avc1 { width: 1, height: 1 }, 86),
            (BoxSpec::Stsz, 20),
            (BoxSpec::Stco, 16),
            (BoxSpec::Mfhd { sequence: 1 }, MFHD_LEN as usize),
            (BoxSpec::Tfhd { track_id: 1 }, TFHD_LEN as usize),
            (BoxSpec::Tfdt { decode_time: 0 }, TFDT_LEN as usize),
            (
                BoxSpec::Trun {
                    data_offset: 0,
                    first_sample_flags: 0,
                    duration: 0,
                    size: 0,
                },
                TRUN_LEN as usize,
            ),
        ];
        for (spec, len) in cases {
            let fourcc = spec.fourcc();
            let bytes = write(spec);
            assert_eq!(bytes.len(), len, "{}", String::from_utf8_lossy(&fourcc));
            assert_eq!(&bytes[..4], &(len as u32).to_be_bytes());
            assert_eq!(&bytes[4..8], &fourcc);
        }
    }

    #[test]
    fn test_ftyp() {
        let bytes = write(BoxSpec::Ftyp {
            major_brand: *b"mp42",
            minor_version: 1,
            compatible_brands: &[*b"isom", *b"mp42", *b"avc1"],
        });
        assert_eq!(
            hex::encode(bytes),
            "0000001c667479706d7034320000000169736f6d6d70343261766331"
        );
    }

    #[test]
    fn test_hdlr_name_is_nul_terminated() {
        let bytes = write(BoxSpec::Hdlr {
            handler_type: *b"vide",
            name: "Bento4 Video Handler",
        });
        assert_eq!(bytes.len(), 0x35);
        assert_eq!(&bytes[16..20], b"vide");
        assert_eq!(bytes.last(), Some(&0));
    }

    #[test]
    fn test_tfdt_is_version_1() {
        let bytes = write(BoxSpec::Tfdt {
            decode_time: 0x0102_0304_0506,
        });
        assert_eq!(
            hex::encode(bytes),
            "0000001474666474010000000000010203040506"
        );
    }

    #[test]
    fn test_short_mdat() {
        let payload = hex::decode("0000000209100000000468ce3880").unwrap();
        let bytes = write(BoxSpec::Mdat { payload: &payload });
        assert_eq!(
            hex::encode(bytes),
            "000000166d6461740000000209100000000468ce3880"
        );
    }
}
