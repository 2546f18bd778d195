//! Incremental ISO BMFF atom tree.
//!
//! All atoms share one output buffer. Opening an atom writes an 8-byte
//! header with a zero size; ending it patches the size in place once the
//! children are known. Ending the root delivers everything written so far
//! to the [`ChunkSink`] and starts a fresh buffer.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{Error, Result};

/// Four-character box type.
pub type FourCc = [u8; 4];

/// Default reservation for the root buffer.
pub const DEFAULT_INITIAL_SIZE: usize = 8192;

const HEADER_LEN: usize = 8;

/// Handle for an atom in an [`AtomTree`]. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u64);

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A finished piece of output: a media type tag and the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub media_type: Arc<str>,
    pub data: Bytes,
}

/// Receiver of flushed output.
pub trait ChunkSink {
    fn write_chunk(&mut self, chunk: OutputChunk) -> io::Result<()>;
}

impl ChunkSink for Vec<OutputChunk> {
    fn write_chunk(&mut self, chunk: OutputChunk) -> io::Result<()> {
        self.push(chunk);
        Ok(())
    }
}

/// Discards everything.
impl ChunkSink for () {
    fn write_chunk(&mut self, _chunk: OutputChunk) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ChunkSink + ?Sized> ChunkSink for &mut S {
    fn write_chunk(&mut self, chunk: OutputChunk) -> io::Result<()> {
        (**self).write_chunk(chunk)
    }
}

#[derive(Debug)]
struct Frame {
    id: AtomId,
    fourcc: FourCc,
    /// Offset of the size field in the shared buffer.
    start: usize,
    counted: bool,
    /// Offset of the u32 child count, once reserved.
    count_at: Option<usize>,
    children: u32,
}

/// Open atoms form a path from the root; only the innermost one accepts
/// writes, new children, or `end`.
pub struct AtomTree<S> {
    media_type: Arc<str>,
    initial_size: usize,
    buf: BytesMut,
    /// `stack[0]` is the root, which has no header of its own.
    stack: Vec<Frame>,
    next_id: u64,
    sink: S,
}

impl<S: ChunkSink> AtomTree<S> {
    /// Create a tree delivering chunks tagged with `media_type` to `sink`.
    pub fn new(media_type: impl Into<Arc<str>>, initial_size: usize, sink: S) -> Self {
        let initial_size = initial_size.max(HEADER_LEN);
        Self {
            media_type: media_type.into(),
            initial_size,
            buf: BytesMut::with_capacity(initial_size),
            stack: vec![Frame {
                id: AtomId(0),
                fourcc: *b"root",
                start: 0,
                counted: false,
                count_at: None,
                children: 0,
            }],
            next_id: 1,
            sink,
        }
    }

    pub fn root(&self) -> AtomId {
        AtomId(0)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Bytes written since the last flush.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn is_open(&self, id: AtomId) -> bool {
        self.stack.iter().any(|f| f.id == id)
    }

    /// The innermost open atom.
    pub fn current(&self) -> AtomId {
        self.top().id
    }

    /// Open a plain child under `parent`, reserving `size_hint` bytes.
    pub fn open(&mut self, parent: AtomId, fourcc: FourCc, size_hint: usize) -> Result<AtomId> {
        self.open_inner(parent, fourcc, size_hint, false)
    }

    /// Open a container whose body starts with a u32 child count
    /// (e.g. `stsd`). Reserve the count with [`count_placeholder`] after
    /// any version/flags fields.
    ///
    /// [`count_placeholder`]: AtomTree::count_placeholder
    pub fn open_counted(
        &mut self,
        parent: AtomId,
        fourcc: FourCc,
        size_hint: usize,
    ) -> Result<AtomId> {
        self.open_inner(parent, fourcc, size_hint, true)
    }

    fn open_inner(
        &mut self,
        parent: AtomId,
        fourcc: FourCc,
        size_hint: usize,
        counted: bool,
    ) -> Result<AtomId> {
        self.ensure_top(parent, |child| Error::ChildAlreadyOpen { parent, child })?;

        let id = AtomId(self.next_id);
        self.next_id += 1;
        self.grow(size_hint.max(HEADER_LEN));

        let start = self.buf.len();
        self.buf.put_u32(0); // size, patched on end
        self.buf.put_slice(&fourcc);
        self.stack.push(Frame {
            id,
            fourcc,
            start,
            counted,
            count_at: None,
            children: 0,
        });
        trace!(%id, fourcc = %fourcc_str(&fourcc), offset = start, "open atom");
        Ok(id)
    }

    /// Reserve the child count of a counted container at the current
    /// write position.
    pub fn count_placeholder(&mut self, id: AtomId) -> Result<()> {
        self.ensure_top(id, |child| Error::ChildStillOpen { atom: id, child })?;
        self.grow(4);
        let at = self.buf.len();
        let frame = self.top_mut();
        if !frame.counted || frame.count_at.is_some() {
            return Err(Error::UnexpectedCountPlaceholder(fourcc_str(&frame.fourcc)));
        }
        frame.count_at = Some(at);
        self.buf.put_u32(0);
        Ok(())
    }

    /// Writer for the body of `id`, which must be the innermost open atom.
    pub fn writer(&mut self, id: AtomId) -> Result<AtomWriter<'_>> {
        self.ensure_top(id, |child| Error::ChildStillOpen { atom: id, child })?;
        Ok(AtomWriter { buf: &mut self.buf })
    }

    /// Finish `id`: patch its size (and child count), and count it in its
    /// parent. Returns the atom's total length.
    ///
    /// Ending the root is a [`flush`](AtomTree::flush).
    pub fn end(&mut self, id: AtomId) -> Result<usize> {
        if id == self.root() {
            return self.flush();
        }
        if !self.is_open(id) {
            return Err(if id.0 < self.next_id {
                Error::AlreadyEnded(id)
            } else {
                Error::UnknownAtom(id)
            });
        }
        self.ensure_top(id, |child| Error::ChildStillOpen { atom: id, child })?;

        let len = self.buf.len() - self.top().start;
        let frame = self.patch_top()?;
        if let Some(parent) = self.stack.last_mut() {
            parent.children += 1;
        }
        trace!(id = %frame.id, fourcc = %fourcc_str(&frame.fourcc), len, "end atom");
        Ok(len)
    }

    /// Patch and pop the innermost frame. On error the frame stays open.
    fn patch_top(&mut self) -> Result<Frame> {
        let top = self.top();
        let size = size_field(&top.fourcc, self.buf.len() - top.start)?;
        let count_at = match (top.counted, top.count_at) {
            (true, None) => return Err(Error::MissingCountPlaceholder(fourcc_str(&top.fourcc))),
            (_, at) => at,
        };
        let (start, children) = (top.start, top.children);

        self.buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
        if let Some(at) = count_at {
            self.buf[at..at + 4].copy_from_slice(&children.to_be_bytes());
        }
        match self.stack.pop() {
            Some(frame) => Ok(frame),
            None => Err(Error::UnknownAtom(AtomId(0))),
        }
    }

    /// Deliver the root buffer to the sink. Every child of the root must
    /// have ended. An empty buffer is not delivered.
    pub fn flush(&mut self) -> Result<usize> {
        if let Some(child) = self.stack.get(1) {
            return Err(Error::ChildStillOpen {
                atom: self.root(),
                child: child.id,
            });
        }
        let len = self.buf.len();
        if len == 0 {
            return Ok(0);
        }
        let data = self.buf.split().freeze();
        self.buf.reserve(self.initial_size);
        self.stack[0].children = 0;
        trace!(len, media_type = %self.media_type, "flush root");
        self.sink.write_chunk(OutputChunk {
            media_type: Arc::clone(&self.media_type),
            data,
        })?;
        Ok(len)
    }

    /// Snapshot of an open atom's bytes so far, with its size (and child
    /// count) patched as if it ended now. Peeking the root returns the
    /// unflushed buffer.
    pub fn peek(&self, id: AtomId) -> Result<Bytes> {
        let frame = self.frame(id)?;
        let mut out = BytesMut::from(&self.buf[frame.start..]);
        if id != self.root() {
            let size = size_field(&frame.fourcc, out.len())?;
            out[..4].copy_from_slice(&size.to_be_bytes());
            if let Some(at) = frame.count_at {
                let at = at - frame.start;
                out[at..at + 4].copy_from_slice(&frame.children.to_be_bytes());
            }
        }
        Ok(out.freeze())
    }

    /// Bytes written to `id` so far, header included.
    pub fn len(&self, id: AtomId) -> Result<usize> {
        let frame = self.frame(id)?;
        Ok(self.buf.len() - frame.start)
    }

    fn frame(&self, id: AtomId) -> Result<&Frame> {
        match self.stack.iter().find(|f| f.id == id) {
            Some(frame) => Ok(frame),
            None if id.0 < self.next_id => Err(Error::NotOpen(id)),
            None => Err(Error::UnknownAtom(id)),
        }
    }

    /// `id` must be open and innermost; otherwise `blocked` builds the
    /// error from the open child in the way.
    fn ensure_top(&self, id: AtomId, blocked: impl FnOnce(AtomId) -> Error) -> Result<()> {
        let pos = match self.stack.iter().position(|f| f.id == id) {
            Some(pos) => pos,
            None if id.0 < self.next_id => return Err(Error::NotOpen(id)),
            None => return Err(Error::UnknownAtom(id)),
        };
        match self.stack.get(pos + 1) {
            Some(child) => Err(blocked(child.id)),
            None => Ok(()),
        }
    }

    fn top(&self) -> &Frame {
        // The root frame is never popped.
        &self.stack[self.stack.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn grow(&mut self, needed: usize) {
        grow(&mut self.buf, needed);
    }
}

impl<S> fmt::Debug for AtomTree<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomTree")
            .field("media_type", &self.media_type)
            .field("pending", &self.buf.len())
            .field("open", &self.stack.iter().map(|f| fourcc_str(&f.fourcc)).collect::<Vec<_>>())
            .finish()
    }
}

/// Reserve at least `needed` spare bytes, growing by half the current
/// capacity to keep reallocations rare.
fn grow(buf: &mut BytesMut, needed: usize) {
    if buf.capacity() - buf.len() < needed {
        buf.reserve(buf.capacity() / 2 + needed);
    }
}

fn size_field(fourcc: &FourCc, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::AtomTooLarge {
        fourcc: fourcc_str(fourcc),
        len,
    })
}

pub(crate) fn fourcc_str(fourcc: &FourCc) -> String {
    String::from_utf8_lossy(fourcc).into_owned()
}

/// Big-endian body writer for the innermost open atom.
#[derive(Debug)]
pub struct AtomWriter<'a> {
    buf: &'a mut BytesMut,
}

impl AtomWriter<'_> {
    pub fn u8(&mut self, v: u8) -> &mut Self {
        grow(self.buf, 1);
        self.buf.put_u8(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        grow(self.buf, 2);
        self.buf.put_u16(v);
        self
    }

    /// Low 24 bits, e.g. the flags after a version byte.
    pub fn u24(&mut self, v: u32) -> &mut Self {
        grow(self.buf, 3);
        self.buf.put_uint(u64::from(v & 0x00FF_FFFF), 3);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        grow(self.buf, 4);
        self.buf.put_u32(v);
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        grow(self.buf, 8);
        self.buf.put_u64(v);
        self
    }

    pub fn u32s(&mut self, values: &[u32]) -> &mut Self {
        grow(self.buf, values.len() * 4);
        for v in values {
            self.buf.put_u32(*v);
        }
        self
    }

    /// 16.16 fixed point.
    pub fn fixed16_16(&mut self, v: f64) -> &mut Self {
        let raw = (v * 65536.0).round().clamp(0.0, f64::from(u32::MAX)) as u32;
        self.u32(raw)
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        grow(self.buf, data.len());
        self.buf.put_slice(data);
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        grow(self.buf, n);
        self.buf.put_bytes(0, n);
        self
    }

    /// UTF-8 bytes followed by a NUL.
    pub fn cstring(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes()).u8(0)
    }

    pub fn fourcc(&mut self, fourcc: &FourCc) -> &mut Self {
        self.bytes(fourcc)
    }
}
