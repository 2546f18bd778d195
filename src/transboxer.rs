//! WebM to fragmented MP4 orchestration.
//!
//! The [`Transboxer`] feeds input chunks to the EBML decoder and reacts to
//! its events: track and timing elements are remembered, and every video
//! block becomes one `moof` + `mdat` fragment. The first video block also
//! produces the `ftyp` + `moov` init segment. Output is handed to a
//! [`TransboxSink`] as soon as each piece is complete.

use std::collections::{BTreeMap, HashSet};
use std::io;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, trace, warn};

use transboxer_avc::{AvcConfig, NalUnitType, NaluFormat, NaluStream};
use transboxer_ebml::schema::ids;
use transboxer_ebml::{Block, Decoder, TagEvent, TagKind, Value};
use transboxer_fmp4::{writer, AtomTree, ChunkSink, OutputChunk, Sample, VideoTrack};

use crate::config::TransboxConfig;
use crate::error::{Error, Result};

/// TimecodeScale when the Info element does not give one: 1 ms ticks.
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

const TRACK_TYPE_VIDEO: u64 = 1;
const AVC_CODEC_ID: &str = "V_MPEG4/ISO/AVC";

/// Running totals, reported once when the stream finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Input chunks accepted.
    pub packets: u64,
    pub bytes: u64,
    /// SimpleBlock and Block elements, on any track.
    pub blocks: u64,
    /// `moof` + `mdat` pairs written.
    pub fragments: u64,
}

/// Receiver of transboxed output.
pub trait TransboxSink: ChunkSink {
    /// Called exactly once, after the last chunk of a finished stream.
    fn finished(&mut self, counts: &Counts);
}

impl TransboxSink for Vec<OutputChunk> {
    fn finished(&mut self, _counts: &Counts) {}
}

impl TransboxSink for () {
    fn finished(&mut self, _counts: &Counts) {}
}

/// Keeps every chunk and the final counts in memory.
#[derive(Debug, Default)]
pub struct Collector {
    pub chunks: Vec<OutputChunk>,
    pub counts: Option<Counts>,
}

impl Collector {
    /// All output bytes, concatenated.
    pub fn concat(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|c| c.data.iter().copied()).collect()
    }
}

impl ChunkSink for Collector {
    fn write_chunk(&mut self, chunk: OutputChunk) -> io::Result<()> {
        self.chunks.push(chunk);
        Ok(())
    }
}

impl TransboxSink for Collector {
    fn finished(&mut self, counts: &Counts) {
        self.counts = Some(*counts);
    }
}

/// Writes chunk bytes straight through to an [`io::Write`].
#[derive(Debug)]
pub struct WriteSink<W> {
    inner: W,
    written: u64,
    counts: Option<Counts>,
}

impl<W: io::Write> WriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            written: 0,
            counts: None,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn counts(&self) -> Option<Counts> {
        self.counts
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> ChunkSink for WriteSink<W> {
    fn write_chunk(&mut self, chunk: OutputChunk) -> io::Result<()> {
        self.inner.write_all(&chunk.data)?;
        self.written += chunk.data.len() as u64;
        Ok(())
    }
}

impl<W: io::Write> TransboxSink for WriteSink<W> {
    fn finished(&mut self, counts: &Counts) {
        if let Err(e) = self.inner.flush() {
            warn!(error = %e, "failed to flush output");
        }
        self.counts = Some(*counts);
    }
}

/// Outstanding input writes and the finish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Idle,
    Writing(usize),
    /// Finish requested while this many writes were outstanding.
    FinishPending(usize),
    Finished,
    Aborted,
}

/// An input chunk announced with [`Transboxer::begin_write`] whose bytes
/// are delivered later.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "complete or cancel the write, or a pending finish never fires"]
pub struct PendingWrite {
    id: u64,
}

impl PendingWrite {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Remuxes one WebM stream into fragmented MP4.
pub struct Transboxer<S: TransboxSink> {
    decoder: Decoder,
    mux: Muxer<S>,
    state: WriteState,
    outstanding: HashSet<u64>,
    next_ticket: u64,
}

impl<S: TransboxSink> Transboxer<S> {
    pub fn new(config: TransboxConfig, sink: S) -> Self {
        Self {
            decoder: Decoder::new().with_max_leaf_size(config.max_leaf_size),
            mux: Muxer::new(config, sink),
            state: WriteState::Idle,
            outstanding: HashSet::new(),
            next_ticket: 0,
        }
    }

    /// Feed one chunk of input. Chunk boundaries never affect the output.
    pub fn write_buffer(&mut self, chunk: &[u8]) -> Result<()> {
        let ticket = self.begin_write()?;
        self.complete_write(ticket, chunk)
    }

    /// Announce a chunk whose bytes are not available yet. A finish
    /// requested meanwhile waits for it.
    pub fn begin_write(&mut self) -> Result<PendingWrite> {
        self.state = match self.state {
            WriteState::Idle => WriteState::Writing(1),
            WriteState::Writing(n) => WriteState::Writing(n + 1),
            WriteState::FinishPending(_) => return Err(Error::FinishRequested),
            WriteState::Finished => return Err(Error::Finished),
            WriteState::Aborted => return Err(Error::Aborted),
        };
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.outstanding.insert(id);
        Ok(PendingWrite { id })
    }

    /// Deliver the bytes for `ticket`.
    pub fn complete_write(&mut self, ticket: PendingWrite, chunk: &[u8]) -> Result<()> {
        if !self.outstanding.remove(&ticket.id) {
            return Err(Error::UnknownTicket(ticket.id));
        }
        if self.state == WriteState::Aborted {
            return Err(Error::Aborted);
        }

        self.mux.counts.packets += 1;
        self.mux.counts.bytes += chunk.len() as u64;
        let mux = &mut self.mux;
        let fed = self.decoder.write(chunk, |ev| mux.handle(ev));
        if let Err(e) = fed {
            self.abort(&e);
            return Err(e);
        }
        self.settle()
    }

    /// Withdraw a write that will never deliver bytes.
    pub fn cancel_write(&mut self, ticket: PendingWrite) -> Result<()> {
        if !self.outstanding.remove(&ticket.id) {
            return Err(Error::UnknownTicket(ticket.id));
        }
        if self.state == WriteState::Aborted {
            return Ok(());
        }
        self.settle()
    }

    /// Request end of stream. Runs immediately when no writes are
    /// outstanding, otherwise when the last one completes.
    pub fn end(&mut self) -> Result<()> {
        match self.state {
            WriteState::Idle => self.finish_now(),
            WriteState::Writing(n) => {
                debug!(outstanding = n, "finish deferred");
                self.state = WriteState::FinishPending(n);
                Ok(())
            }
            WriteState::FinishPending(_) | WriteState::Finished => Err(Error::FinishRequested),
            WriteState::Aborted => Err(Error::Aborted),
        }
    }

    fn settle(&mut self) -> Result<()> {
        match self.state {
            WriteState::Writing(1) => self.state = WriteState::Idle,
            WriteState::Writing(n) => self.state = WriteState::Writing(n - 1),
            WriteState::FinishPending(1) => return self.finish_now(),
            WriteState::FinishPending(n) => self.state = WriteState::FinishPending(n - 1),
            WriteState::Idle | WriteState::Finished | WriteState::Aborted => {}
        }
        Ok(())
    }

    fn finish_now(&mut self) -> Result<()> {
        self.state = WriteState::Finished;
        let mux = &mut self.mux;
        let mut result = self.decoder.finish(|ev| mux.handle(ev));
        if result.is_ok() {
            result = mux.finish();
        }
        if let Err(e) = result {
            self.abort(&e);
            return Err(e);
        }
        Ok(())
    }

    fn abort(&mut self, error: &Error) {
        warn!(error = %error, offset = self.decoder.offset(), "aborting stream");
        self.state = WriteState::Aborted;
    }

    pub fn counts(&self) -> Counts {
        self.mux.counts
    }

    /// Writes announced but not yet completed or cancelled.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_finished(&self) -> bool {
        self.state == WriteState::Finished
    }

    /// Scalar element values keyed by their dot-joined element path, e.g.
    /// `Segment.Info.TimecodeScale`. Later occurrences overwrite earlier ones.
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.mux.metadata
    }

    /// Track number of the muxed video track, once the track header is seen.
    pub fn video_track(&self) -> Option<u64> {
        self.mux.video_track
    }

    /// The codec configuration in use, once known.
    pub fn codec_config(&self) -> Option<&AvcConfig> {
        self.mux.codec_config.as_ref()
    }

    pub fn sink(&self) -> &S {
        self.mux.tree.sink()
    }

    pub fn into_sink(self) -> S {
        self.mux.tree.into_sink()
    }
}

#[derive(Debug, Default)]
struct TrackEntry {
    number: Option<u64>,
    track_type: Option<u64>,
    codec_id: Option<String>,
    codec_private: Option<Bytes>,
    pixel_width: Option<u64>,
    pixel_height: Option<u64>,
}

/// A Block waiting for the end of its BlockGroup, where a ReferenceBlock
/// decides whether it is a keyframe.
#[derive(Debug)]
struct GroupedBlock {
    block: Block,
    referenced: bool,
}

struct Muxer<S> {
    config: TransboxConfig,
    tree: AtomTree<S>,
    counts: Counts,

    path: Vec<&'static str>,
    metadata: BTreeMap<String, Value>,
    entry: Option<TrackEntry>,
    group: Option<GroupedBlock>,

    timecode_scale: u64,
    cluster_timecode: u64,
    video_track: Option<u64>,
    pixel_size: Option<(u32, u32)>,
    codec_config: Option<AvcConfig>,
    nalu_format: Option<NaluFormat>,

    header_written: bool,
    sequence: u32,
    previous_decode_time: Option<u64>,
    foreign_warned: bool,
}

impl<S: TransboxSink> Muxer<S> {
    fn new(config: TransboxConfig, sink: S) -> Self {
        let tree = AtomTree::new(config.media_type.as_str(), config.initial_size, sink);
        Self {
            config,
            tree,
            counts: Counts::default(),
            path: Vec::new(),
            metadata: BTreeMap::new(),
            entry: None,
            group: None,
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            cluster_timecode: 0,
            video_track: None,
            pixel_size: None,
            codec_config: None,
            nalu_format: None,
            header_written: false,
            sequence: 0,
            previous_decode_time: None,
            foreign_warned: false,
        }
    }

    fn handle(&mut self, ev: TagEvent) -> Result<()> {
        trace!(kind = ?ev.kind, name = ev.name, depth = ev.depth, offset = ev.tag_start, "tag");
        match ev.kind {
            TagKind::Start => {
                self.path.push(ev.name);
                match ev.id {
                    ids::TRACK_ENTRY => self.entry = Some(TrackEntry::default()),
                    ids::CLUSTER => self.cluster_timecode = 0,
                    ids::BLOCK_GROUP => self.group = None,
                    _ => {}
                }
            }
            TagKind::End => {
                match ev.id {
                    ids::TRACK_ENTRY => {
                        if let Some(entry) = self.entry.take() {
                            self.add_track(entry);
                        }
                    }
                    ids::BLOCK_GROUP => {
                        if let Some(grouped) = self.group.take() {
                            self.mux_block(grouped.block, !grouped.referenced)?;
                        }
                    }
                    _ => {}
                }
                self.path.pop();
            }
            TagKind::Tag => match (ev.id, ev.value) {
                (ids::SIMPLE_BLOCK, Some(Value::Block(block))) => {
                    self.counts.blocks += 1;
                    let keyframe = block.keyframe;
                    self.mux_block(block, keyframe)?;
                }
                (ids::BLOCK, Some(Value::Block(block))) => {
                    self.counts.blocks += 1;
                    self.group = Some(GroupedBlock {
                        block,
                        referenced: false,
                    });
                }
                (ids::REFERENCE_BLOCK, _) => {
                    if let Some(grouped) = self.group.as_mut() {
                        grouped.referenced = true;
                    }
                }
                (id, Some(value)) => self.record(id, ev.name, value),
                (_, None) => {}
            },
        }
        Ok(())
    }

    fn record(&mut self, id: u64, name: &'static str, value: Value) {
        match id {
            ids::TIMECODE_SCALE => match value.as_u64() {
                Some(0) | None => warn!(?value, "ignoring unusable TimecodeScale"),
                Some(scale) => self.timecode_scale = scale,
            },
            ids::TIMECODE => {
                if let Some(timecode) = value.as_u64() {
                    self.cluster_timecode = timecode;
                }
            }
            _ => {}
        }

        if let Some(entry) = self.entry.as_mut() {
            match id {
                ids::TRACK_NUMBER => entry.number = value.as_u64(),
                ids::TRACK_TYPE => entry.track_type = value.as_u64(),
                ids::CODEC_ID => entry.codec_id = value.as_str().map(str::to_owned),
                ids::CODEC_PRIVATE => entry.codec_private = value.as_bytes().cloned(),
                ids::PIXEL_WIDTH => entry.pixel_width = value.as_u64(),
                ids::PIXEL_HEIGHT => entry.pixel_height = value.as_u64(),
                _ => {}
            }
        }

        if matches!(value, Value::Binary(_) | Value::Unknown(_) | Value::Block(_)) {
            return;
        }
        let key = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path.join("."), name)
        };
        self.metadata.insert(key, value);
    }

    fn add_track(&mut self, entry: TrackEntry) {
        debug!(
            number = ?entry.number,
            track_type = ?entry.track_type,
            codec = ?entry.codec_id,
            "track entry"
        );
        if entry.track_type != Some(TRACK_TYPE_VIDEO) || self.video_track.is_some() {
            return;
        }
        self.video_track = entry.number;

        if let Some(codec) = entry.codec_id.as_deref().filter(|c| *c != AVC_CODEC_ID) {
            warn!(codec, "video track is not H.264");
        }
        if let (Some(w), Some(h)) = (entry.pixel_width, entry.pixel_height) {
            self.pixel_size = Some((even(w), even(h)));
        }
        if let Some(private) = entry.codec_private {
            match AvcConfig::parse(&private, self.config.strict) {
                Ok(config) => {
                    debug!(
                        codec = %config.codec_string(),
                        length_size = config.length_size,
                        "using CodecPrivate avcC"
                    );
                    self.nalu_format = Some(NaluFormat::LengthPrefixed {
                        width: config.length_size as usize,
                    });
                    self.codec_config = Some(config);
                }
                Err(e) => warn!(error = %e, "ignoring unparseable CodecPrivate"),
            }
        }
    }

    fn mux_block(&mut self, block: Block, keyframe: bool) -> Result<()> {
        if let Some(video) = self.video_track {
            if block.track != video {
                if !self.foreign_warned {
                    warn!(track = block.track, video, "skipping blocks from non-video track");
                    self.foreign_warned = true;
                }
                trace!(track = block.track, "skipped block");
                return Ok(());
            }
        }

        let mut stream = NaluStream::new(block.payload, self.nalu_format, self.config.strict)?;
        if self.nalu_format.is_none() {
            debug!(format = ?stream.format(), "detected NALU framing");
            self.nalu_format = Some(stream.format());
        }
        stream.convert_to_packet()?;

        if !self.header_written {
            self.write_header(&stream)?;
        }

        let decode_time = self.decode_time(block.timecode);
        let delta = self
            .previous_decode_time
            .map_or(0, |previous| decode_time.saturating_sub(previous));
        let duration = u32::try_from(delta).unwrap_or(u32::MAX).max(1);
        self.previous_decode_time = Some(decode_time);
        self.sequence = self.sequence.wrapping_add(1);

        let keyframe = keyframe || stream.find(NalUnitType::IdrSlice).is_some();
        writer::write_fragment(
            &mut self.tree,
            &Sample {
                sequence: self.sequence,
                track_id: self.config.track_id,
                decode_time,
                duration,
                keyframe,
                data: stream.as_bytes(),
            },
        )?;
        self.tree.flush()?;
        self.counts.fragments += 1;
        Ok(())
    }

    fn write_header(&mut self, stream: &NaluStream) -> Result<()> {
        let config = match self.codec_config.take() {
            Some(config) => config,
            None => AvcConfig::from_nalu_stream(stream, self.config.strict)?,
        };
        let (width, height) = match config.first_sps() {
            Ok(sps) => (sps.width(), sps.height()),
            // A present but malformed SPS is fatal unless lenient.
            Err(e)
                if self.config.strict
                    && !matches!(e, transboxer_avc::Error::MissingParameterSet(_)) =>
            {
                return Err(e.into())
            }
            Err(e) => match self.pixel_size {
                Some(size) => {
                    debug!(error = %e, "SPS unavailable, using PixelWidth/PixelHeight");
                    size
                }
                None => {
                    return Err(Error::MissingGeometry {
                        reason: e.to_string(),
                    })
                }
            },
        };

        let record = config.to_bytes()?;
        writer::write_init_segment(
            &mut self.tree,
            &VideoTrack {
                track_id: self.config.track_id,
                timescale: self.config.timescale,
                width,
                height,
                handler_name: &self.config.handler_name,
                avcc: &record,
            },
        )?;
        self.tree.flush()?;
        debug!(width, height, codec = %config.codec_string(), "wrote init segment");

        self.codec_config = Some(config);
        self.header_written = true;
        Ok(())
    }

    /// Block time in track timescale units: (cluster + relative) ticks,
    /// scaled by TimecodeScale ns per tick.
    fn decode_time(&self, relative: i16) -> u64 {
        let ticks = i128::from(self.cluster_timecode) + i128::from(relative);
        let scaled = ticks * i128::from(self.timecode_scale) * i128::from(self.config.timescale)
            / 1_000_000_000;
        u64::try_from(scaled.max(0)).unwrap_or(u64::MAX)
    }

    fn finish(&mut self) -> Result<()> {
        self.tree.flush()?;
        debug!(
            packets = self.counts.packets,
            bytes = self.counts.bytes,
            blocks = self.counts.blocks,
            fragments = self.counts.fragments,
            "stream finished"
        );
        let counts = self.counts;
        self.tree.sink_mut().finished(&counts);
        Ok(())
    }
}

fn even(v: u64) -> u32 {
    let v = u32::try_from(v).unwrap_or(u32::MAX);
    v - v % 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use transboxer_ebml::encode;

    fn header() -> Bytes {
        encode::master(
            ids::EBML,
            [encode::string(ids::DOC_TYPE, "webm").unwrap()],
        )
        .unwrap()
    }

    fn transboxer() -> Transboxer<Collector> {
        Transboxer::new(TransboxConfig::default(), Collector::default())
    }

    #[test]
    fn test_finish_reports_counts_once() {
        let mut t = transboxer();
        let header = header();
        t.write_buffer(&header[..3]).unwrap();
        t.write_buffer(&header[3..]).unwrap();
        t.end().unwrap();

        assert!(t.is_finished());
        assert_matches!(t.end(), Err(Error::FinishRequested));
        assert_matches!(t.write_buffer(&[0]), Err(Error::Finished));

        let sink = t.into_sink();
        let counts = sink.counts.unwrap();
        assert_eq!(counts.packets, 2);
        assert_eq!(counts.bytes, header.len() as u64);
        assert_eq!(counts.blocks, 0);
        assert!(sink.chunks.is_empty());
    }

    #[test]
    fn test_finish_deferred_until_writes_complete() {
        let mut t = transboxer();
        let first = t.begin_write().unwrap();
        let second = t.begin_write().unwrap();
        assert_eq!(t.outstanding(), 2);

        t.end().unwrap();
        assert!(!t.is_finished());
        assert_matches!(t.begin_write(), Err(Error::FinishRequested));
        assert_matches!(t.end(), Err(Error::FinishRequested));

        t.complete_write(first, &header()).unwrap();
        assert!(!t.is_finished());
        t.cancel_write(second).unwrap();
        assert!(t.is_finished());
        assert_eq!(t.sink().counts.unwrap().packets, 1);
    }

    #[test]
    fn test_ticket_cannot_be_reused() {
        let mut t = transboxer();
        let ticket = t.begin_write().unwrap();
        let stale = PendingWrite { id: ticket.id() };
        t.complete_write(ticket, &[]).unwrap();
        assert_matches!(t.complete_write(stale, &[]), Err(Error::UnknownTicket(0)));
    }

    #[test]
    fn test_corrupt_input_aborts() {
        let mut t = transboxer();
        assert_matches!(t.write_buffer(&[0x00, 0x00]), Err(Error::Ebml(_)));
        assert_matches!(t.write_buffer(&header()), Err(Error::Aborted));
        assert_matches!(t.end(), Err(Error::Aborted));
        assert!(t.sink().counts.is_none());
    }

    #[test]
    fn test_metadata_paths() {
        let segment = encode::master(
            ids::SEGMENT,
            [encode::master(
                ids::INFO,
                [
                    encode::unsigned(ids::TIMECODE_SCALE, 1_000_000).unwrap(),
                    encode::string(ids::MUXING_APP, "test").unwrap(),
                ],
            )
            .unwrap()],
        )
        .unwrap();
        let mut t = transboxer();
        t.write_buffer(&header()).unwrap();
        t.write_buffer(&segment).unwrap();
        t.end().unwrap();

        let metadata = t.metadata();
        assert_eq!(metadata.get("EBML.DocType"), Some(&Value::String("webm".into())));
        assert_eq!(
            metadata.get("Segment.Info.TimecodeScale"),
            Some(&Value::Unsigned(1_000_000))
        );
        assert_eq!(
            metadata.get("Segment.Info.MuxingApp").and_then(Value::as_str),
            Some("test")
        );
    }

    #[test]
    fn test_decode_time_scaling() {
        let mut mux = Muxer::new(TransboxConfig::default(), ());
        mux.cluster_timecode = 2000;
        assert_eq!(mux.decode_time(40), 2040);
        assert_eq!(mux.decode_time(-3000), 0);

        mux.config.timescale = 90_000;
        mux.timecode_scale = 100_000;
        assert_eq!(mux.decode_time(0), 18_000);
    }

    #[test]
    fn test_even_rounding() {
        assert_eq!(even(641), 640);
        assert_eq!(even(480), 480);
    }
}
