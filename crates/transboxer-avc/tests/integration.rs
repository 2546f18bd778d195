//! Integration tests for transboxer-avc: a camera-style Annex-B access unit
//! through detection, conversion and avcC assembly.

use transboxer_avc::{AvcConfig, NalUnitType, NaluFormat, NaluStream, Pps, Profile, Sps};

/// SPS with an emulation-prevention byte (`00 00 03`) inside the VUI.
const SPS_WITH_EPB: &str = "6742c01e95a0280f6840000003004000000f03682211a8";
const PPS: &str = "68ce3880";

fn access_unit() -> Vec<u8> {
    let mut buf = Vec::new();
    for nalu in ["0910", SPS_WITH_EPB, PPS, "6588840021fe"] {
        buf.extend_from_slice(&[0, 0, 0, 1]);
        buf.extend_from_slice(&hex::decode(nalu).unwrap());
    }
    buf
}

#[test]
fn test_annexb_access_unit_to_avcc() {
    let mut stream = NaluStream::new(access_unit(), None, true).unwrap();
    assert_eq!(stream.format(), NaluFormat::AnnexB { marker_width: 4 });
    assert_eq!(stream.packet_count(), 4);

    stream.convert_to_packet().unwrap();
    assert_eq!(stream.packet_count(), 4);

    let types: Vec<_> = stream.nalus().filter_map(NalUnitType::of).collect();
    assert_eq!(
        types,
        vec![
            NalUnitType::AccessUnitDelimiter,
            NalUnitType::Sps,
            NalUnitType::Pps,
            NalUnitType::IdrSlice,
        ]
    );

    let config = AvcConfig::from_nalu_stream(&stream, true).unwrap();
    assert_eq!(config.length_size, 4);
    assert_eq!(config.codec_string(), "avc1.42C01E");

    let sps = config.first_sps().unwrap();
    assert_eq!(sps.profile, Profile::Baseline);
    assert_eq!((sps.width(), sps.height()), (640, 480));

    let reparsed = AvcConfig::parse(&config.to_bytes().unwrap(), true).unwrap();
    assert_eq!(reparsed, config);
}

#[test]
fn test_parameter_sets_parse_from_stream() {
    let stream = NaluStream::new(access_unit(), None, true).unwrap();
    let sps = Sps::parse(stream.find(NalUnitType::Sps).unwrap()).unwrap();
    let pps = Pps::parse(stream.find(NalUnitType::Pps).unwrap()).unwrap();
    assert_eq!(pps.seq_parameter_set_id, sps.seq_parameter_set_id);
    assert!(sps.vui_parameters_present);
}

#[test]
fn test_redetect_converted_stream() {
    let mut stream = NaluStream::new(access_unit(), None, true).unwrap();
    stream.convert_to_packet().unwrap();
    let bytes = stream.into_bytes();

    assert_eq!(
        NaluFormat::detect(&bytes),
        Some(NaluFormat::LengthPrefixed { width: 4 })
    );
}
