//! Integration tests for transboxer-ebml: chunk boundaries never change the
//! event sequence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use transboxer_ebml::{encode, schema::ids, Decoder, Error, TagEvent, TagKind, Value};

fn sample_stream() -> Vec<u8> {
    let header = encode::master(
        ids::EBML,
        [encode::string(ids::DOC_TYPE, "webm").unwrap()],
    )
    .unwrap();

    let info = encode::master(
        ids::INFO,
        [
            encode::unsigned(ids::TIMECODE_SCALE, 1_000_000).unwrap(),
            encode::float(ids::DURATION, 0.0).unwrap(),
        ],
    )
    .unwrap();

    let mut clusters = Vec::new();
    for c in 0..3u64 {
        let mut children = vec![encode::unsigned(ids::TIMECODE, c * 1000).unwrap()];
        for b in 0..5i16 {
            let frame = vec![0, 0, 0, 4, 0x65, b as u8, 0xAA, 0xBB];
            children.push(encode::simple_block(1, b * 33, b == 0, &frame).unwrap());
        }
        clusters.push(encode::master_unknown_size(ids::CLUSTER, children).unwrap());
    }

    let mut segment_body = vec![info];
    segment_body.extend(clusters);
    let segment = encode::master_unknown_size(ids::SEGMENT, segment_body).unwrap();

    let mut out = header.to_vec();
    out.extend_from_slice(&segment);
    out
}

fn decode_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Vec<TagEvent> {
    let mut decoder = Decoder::new();
    let mut events = Vec::new();
    for chunk in chunks {
        decoder
            .write(chunk, |ev| {
                events.push(ev);
                Ok::<_, Error>(())
            })
            .unwrap();
    }
    decoder
        .finish(|ev| {
            events.push(ev);
            Ok::<_, Error>(())
        })
        .unwrap();
    events
}

fn random_chunks(data: &[u8], seed: u64, max: usize) -> Vec<&[u8]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let end = (pos + rng.gen_range(1..=max)).min(data.len());
        chunks.push(&data[pos..end]);
        pos = end;
    }
    chunks
}

#[test]
fn test_whole_stream_structure() {
    let data = sample_stream();
    let events = decode_chunks([&data[..]]);

    let starts = events.iter().filter(|e| e.kind == TagKind::Start).count();
    let ends = events.iter().filter(|e| e.kind == TagKind::End).count();
    assert_eq!(starts, ends);
    // EBML, Segment, Info, three Clusters
    assert_eq!(starts, 6);

    let blocks = events
        .iter()
        .filter(|e| e.id == ids::SIMPLE_BLOCK)
        .count();
    assert_eq!(blocks, 15);

    let last = events.last().unwrap();
    assert_eq!((last.kind, last.name), (TagKind::End, "Segment"));
}

#[test]
fn test_clusters_close_before_next_cluster() {
    let data = sample_stream();
    let events = decode_chunks([&data[..]]);

    let mut open_clusters = 0i32;
    for ev in &events {
        if ev.id == ids::CLUSTER {
            match ev.kind {
                TagKind::Start => open_clusters += 1,
                TagKind::End => open_clusters -= 1,
                TagKind::Tag => unreachable!(),
            }
            assert!((0..=1).contains(&open_clusters));
        }
        if ev.id == ids::SIMPLE_BLOCK {
            assert_eq!(ev.depth, 2);
        }
    }
}

#[test]
fn test_random_fragmentation_matches_whole() {
    let data = sample_stream();
    let whole = decode_chunks([&data[..]]);

    for seed in 0..8 {
        let small = decode_chunks(random_chunks(&data, seed, 7));
        assert_eq!(whole, small, "seed {seed}, small chunks");
        let large = decode_chunks(random_chunks(&data, seed, 64));
        assert_eq!(whole, large, "seed {seed}, large chunks");
    }
}

#[test]
fn test_cluster_timecodes() {
    let data = sample_stream();
    let timecodes: Vec<u64> = decode_chunks([&data[..]])
        .iter()
        .filter(|e| e.id == ids::TIMECODE)
        .filter_map(|e| e.value.as_ref().and_then(Value::as_u64))
        .collect();
    assert_eq!(timecodes, vec![0, 1000, 2000]);
}
