//! Incremental EBML tag decoder.
//!
//! Input arrives in chunks with arbitrary boundaries. The decoder keeps the
//! unconsumed tail in a buffer and walks a three-state machine:
//!
//! ```text
//! TAG  -> read element id vint
//! SIZE -> read data size vint; masters emit Start and return to TAG
//! CONTENT -> wait for `size` bytes, decode, emit Tag, return to TAG
//! ```
//!
//! Open masters sit on a parse stack. A frame with a known size is popped
//! (emitting End) once the consumed offset reaches its end; several ancestors
//! can close at once. A frame with the unknown-size marker closes when an
//! element arrives whose schema level shows it is not a descendant, or at
//! [`Decoder::finish`].

use std::ops::Range;

use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::error::Error;
use crate::schema::{self, ElementType};
use crate::value::Value;
use crate::vint::read_vint;

/// What happened at a point in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// A master element was opened.
    Start,
    /// A leaf element was decoded.
    Tag,
    /// A master element was closed.
    End,
}

/// One decoder event. Handed to the caller's callback and not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEvent {
    pub kind: TagKind,
    /// Raw element id, marker bits included.
    pub id: u64,
    pub name: &'static str,
    pub ty: ElementType,
    /// Number of open masters enclosing this element.
    pub depth: usize,
    /// Offset of the first id byte.
    pub tag_start: u64,
    /// Offset of the first payload byte.
    pub data_start: u64,
    /// Payload size, `None` for unknown-size masters.
    pub data_size: Option<u64>,
    /// Decoded payload, present for `Tag` events only.
    pub value: Option<Value>,
}

impl TagEvent {
    /// Byte range covered by the element, when its size is known.
    pub fn range(&self) -> Option<Range<u64>> {
        self.data_size
            .map(|size| self.tag_start..self.data_start + size)
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    id: u64,
    name: &'static str,
    level: i8,
    tag_start: u64,
    data_start: u64,
    end: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct Leaf {
    id: u64,
    name: &'static str,
    ty: ElementType,
    tag_start: u64,
    data_start: u64,
    size: u64,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Tag,
    Size { id: u64, tag_start: u64 },
    Content(Leaf),
}

/// Largest leaf element buffered by default: 64 MiB.
pub const DEFAULT_MAX_LEAF_SIZE: u64 = 64 * 1024 * 1024;

/// Streaming EBML decoder.
#[derive(Debug)]
pub struct Decoder {
    state: State,
    buffer: BytesMut,
    /// Absolute offset of `buffer[0]`.
    total: u64,
    stack: Vec<Frame>,
    finished: bool,
    max_leaf_size: u64,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: State::Tag,
            buffer: BytesMut::new(),
            total: 0,
            stack: Vec::new(),
            finished: false,
            max_leaf_size: DEFAULT_MAX_LEAF_SIZE,
        }
    }

    /// Reject leaf elements declaring more than `max` content bytes
    /// instead of buffering them.
    pub fn with_max_leaf_size(mut self, max: u64) -> Self {
        self.max_leaf_size = max;
        self
    }

    pub fn max_leaf_size(&self) -> u64 {
        self.max_leaf_size
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.total
    }

    /// Number of currently open masters.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk, invoking `on_event` for every event it completes.
    ///
    /// Events are delivered in stream order. The first error, from the
    /// stream or from the callback, aborts the call.
    pub fn write<F, E>(&mut self, chunk: &[u8], mut on_event: F) -> std::result::Result<(), E>
    where
        F: FnMut(TagEvent) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        if self.finished {
            return Err(Error::Finished.into());
        }
        self.buffer.extend_from_slice(chunk);
        while self.step(&mut on_event)? {}
        Ok(())
    }

    /// Signal end of input.
    ///
    /// Closes every frame still open, emitting End for each. A truncated
    /// trailing element is logged and dropped. Further writes fail.
    pub fn finish<F, E>(&mut self, mut on_event: F) -> std::result::Result<(), E>
    where
        F: FnMut(TagEvent) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        if self.finished {
            return Err(Error::Finished.into());
        }
        self.finished = true;

        if !matches!(self.state, State::Tag) || !self.buffer.is_empty() {
            warn!(
                offset = self.total,
                pending = self.buffer.len(),
                "input ended inside an element"
            );
        }
        self.buffer.clear();
        self.state = State::Tag;

        while let Some(frame) = self.stack.pop() {
            if frame.end.is_some_and(|end| end > self.total) {
                warn!(name = frame.name, offset = frame.tag_start, "truncated master element");
            }
            self.emit_end(frame, &mut on_event)?;
        }
        Ok(())
    }

    fn step<F, E>(&mut self, on_event: &mut F) -> std::result::Result<bool, E>
    where
        F: FnMut(TagEvent) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        match self.state {
            State::Tag => {
                let Some(id) = read_vint(&self.buffer, self.total)? else {
                    return Ok(false);
                };
                let tag_start = self.total;
                self.consume(id.width);
                self.close_unknown_for(id.raw, on_event)?;
                self.state = State::Size {
                    id: id.raw,
                    tag_start,
                };
            }
            State::Size { id, tag_start } => {
                let Some(size) = read_vint(&self.buffer, self.total)? else {
                    return Ok(false);
                };
                self.consume(size.width);
                let data_start = self.total;
                let size = (!size.is_unknown()).then_some(size.value);
                self.start_element(id, tag_start, data_start, size, on_event)?;
            }
            State::Content(leaf) => {
                if (self.buffer.len() as u64) < leaf.size {
                    return Ok(false);
                }
                let data = self.buffer.split_to(leaf.size as usize).freeze();
                self.total += leaf.size;
                self.state = State::Tag;

                let value = Value::decode(leaf.ty, data, leaf.id == schema::ids::SIMPLE_BLOCK)?;
                trace!(name = leaf.name, offset = leaf.tag_start, "tag");
                on_event(TagEvent {
                    kind: TagKind::Tag,
                    id: leaf.id,
                    name: leaf.name,
                    ty: leaf.ty,
                    depth: self.stack.len(),
                    tag_start: leaf.tag_start,
                    data_start: leaf.data_start,
                    data_size: Some(leaf.size),
                    value: Some(value),
                })?;
                self.pop_finished(on_event)?;
            }
        }
        Ok(true)
    }

    fn start_element<F, E>(
        &mut self,
        id: u64,
        tag_start: u64,
        data_start: u64,
        size: Option<u64>,
        on_event: &mut F,
    ) -> std::result::Result<(), E>
    where
        F: FnMut(TagEvent) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        let (name, ty, level) = match schema::lookup(id) {
            Some(s) => (s.name, s.ty, s.level),
            None => ("Unknown", ElementType::Unknown, -1),
        };

        let end = size.map(|s| data_start + s);
        if let (Some(end), Some(parent_end)) = (end, self.enclosing_end()) {
            if end > parent_end {
                return Err(Error::ElementOverrun {
                    id,
                    offset: tag_start,
                    end,
                    parent_end,
                }
                .into());
            }
        }

        if ty.is_master() {
            trace!(name, offset = tag_start, unknown_size = size.is_none(), "start");
            on_event(TagEvent {
                kind: TagKind::Start,
                id,
                name,
                ty,
                depth: self.stack.len(),
                tag_start,
                data_start,
                data_size: size,
                value: None,
            })?;
            self.stack.push(Frame {
                id,
                name,
                level,
                tag_start,
                data_start,
                end,
            });
            self.state = State::Tag;
            // an empty master is already complete
            self.pop_finished(on_event)?;
            return Ok(());
        }

        let Some(size) = size else {
            return Err(Error::UnknownSizeLeaf {
                id,
                name,
                offset: tag_start,
            }
            .into());
        };
        if size > self.max_leaf_size {
            return Err(Error::LeafTooLarge {
                id,
                name,
                offset: tag_start,
                size,
                max: self.max_leaf_size,
            }
            .into());
        }
        self.state = State::Content(Leaf {
            id,
            name,
            ty,
            tag_start,
            data_start,
            size,
        });
        Ok(())
    }

    /// End offset of the innermost open frame with a known size.
    fn enclosing_end(&self) -> Option<u64> {
        self.stack.iter().rev().find_map(|f| f.end)
    }

    /// Close unknown-size frames that cannot contain element `id`.
    fn close_unknown_for<F, E>(&mut self, id: u64, on_event: &mut F) -> std::result::Result<(), E>
    where
        F: FnMut(TagEvent) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        let Some(level) = schema::lookup(id).map(|s| s.level).filter(|&l| l >= 0) else {
            return Ok(());
        };
        while let Some(top) = self.stack.last().copied() {
            if top.end.is_some() || level > top.level {
                break;
            }
            self.stack.pop();
            self.emit_end(top, on_event)?;
        }
        Ok(())
    }

    /// Pop every frame whose end has been reached, innermost first.
    fn pop_finished<F, E>(&mut self, on_event: &mut F) -> std::result::Result<(), E>
    where
        F: FnMut(TagEvent) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        let total = self.total;
        let Some(lowest) = self
            .stack
            .iter()
            .position(|f| f.end.is_some_and(|end| end <= total))
        else {
            return Ok(());
        };
        while self.stack.len() > lowest {
            if let Some(frame) = self.stack.pop() {
                self.emit_end(frame, on_event)?;
            }
        }
        Ok(())
    }

    fn emit_end<F, E>(&self, frame: Frame, on_event: &mut F) -> std::result::Result<(), E>
    where
        F: FnMut(TagEvent) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        trace!(name = frame.name, offset = self.total, "end");
        let schema_ty = schema::lookup(frame.id).map_or(ElementType::Master, |s| s.ty);
        on_event(TagEvent {
            kind: TagKind::End,
            id: frame.id,
            name: frame.name,
            ty: schema_ty,
            depth: self.stack.len(),
            tag_start: frame.tag_start,
            data_start: frame.data_start,
            data_size: frame.end.map(|end| end - frame.data_start),
            value: None,
        })
    }

    fn consume(&mut self, n: usize) {
        self.buffer.advance(n);
        self.total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::schema::ids;
    use assert_matches::assert_matches;

    fn decode_all(chunks: &[&[u8]]) -> Result<Vec<TagEvent>> {
        let mut decoder = Decoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            decoder.write(chunk, |ev| {
                events.push(ev);
                Ok::<_, Error>(())
            })?;
        }
        decoder.finish(|ev| {
            events.push(ev);
            Ok::<_, Error>(())
        })?;
        Ok(events)
    }

    fn kinds(events: &[TagEvent]) -> Vec<(TagKind, &'static str)> {
        events.iter().map(|e| (e.kind, e.name)).collect()
    }

    #[test]
    fn test_single_leaf() {
        // TimecodeScale = 1_000_000
        let events = decode_all(&[&[0x2A, 0xD7, 0xB1, 0x83, 0x0F, 0x42, 0x40]]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TagKind::Tag);
        assert_eq!(events[0].id, ids::TIMECODE_SCALE);
        assert_eq!(events[0].value, Some(Value::Unsigned(1_000_000)));
        assert_eq!(events[0].range(), Some(0..7));
    }

    #[test]
    fn test_nested_masters_close_together() {
        // Info { TimecodeScale = 1 }, both end on the same byte
        let data = [0x15, 0x49, 0xA9, 0x66, 0x85, 0x2A, 0xD7, 0xB1, 0x81, 0x01];
        let events = decode_all(&[&data]).unwrap();
        assert_eq!(
            kinds(&events),
            vec![
                (TagKind::Start, "Info"),
                (TagKind::Tag, "TimecodeScale"),
                (TagKind::End, "Info"),
            ]
        );
        assert_eq!(events[2].depth, 0);
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let data = [
            0x1F, 0x43, 0xB6, 0x75, 0x89, // Cluster, 9 bytes
            0xE7, 0x81, 0x05, // Timecode 5
            0xA3, 0x84, 0x81, 0x00, 0x01, 0x80, // SimpleBlock
        ];
        let whole = decode_all(&[&data]).unwrap();
        let pieces: Vec<&[u8]> = data.chunks(1).collect();
        let split = decode_all(&pieces).unwrap();
        assert_eq!(whole, split);
        assert_eq!(
            kinds(&whole),
            vec![
                (TagKind::Start, "Cluster"),
                (TagKind::Tag, "Timecode"),
                (TagKind::Tag, "SimpleBlock"),
                (TagKind::End, "Cluster"),
            ]
        );
        let block = whole[2].value.as_ref().and_then(Value::as_block).unwrap();
        assert_eq!(block.timecode, 1);
        assert!(block.keyframe);
    }

    #[test]
    fn test_empty_master_closes_immediately() {
        let events = decode_all(&[&[0xE0, 0x80, 0xB0, 0x81, 0x10]]).unwrap();
        assert_eq!(
            kinds(&events),
            vec![
                (TagKind::Start, "Video"),
                (TagKind::End, "Video"),
                (TagKind::Tag, "PixelWidth"),
            ]
        );
    }

    #[test]
    fn test_unknown_size_cluster_closed_by_sibling() {
        let data = [
            0x1F, 0x43, 0xB6, 0x75, 0xFF, // Cluster, unknown size
            0xE7, 0x81, 0x00, // Timecode 0
            0x1F, 0x43, 0xB6, 0x75, 0xFF, // next Cluster
            0xE7, 0x81, 0x21, // Timecode 33
        ];
        let events = decode_all(&[&data]).unwrap();
        assert_eq!(
            kinds(&events),
            vec![
                (TagKind::Start, "Cluster"),
                (TagKind::Tag, "Timecode"),
                (TagKind::End, "Cluster"),
                (TagKind::Start, "Cluster"),
                (TagKind::Tag, "Timecode"),
                (TagKind::End, "Cluster"),
            ]
        );
        assert_eq!(events[0].data_size, None);
    }

    #[test]
    fn test_unknown_id_passthrough() {
        let events = decode_all(&[&[0x4F, 0xFF, 0x82, 0xDE, 0xAD]]).unwrap();
        assert_eq!(events[0].name, "Unknown");
        assert_eq!(
            events[0].value.as_ref().and_then(Value::as_bytes).map(|b| &b[..]),
            Some(&[0xDE, 0xAD][..])
        );
    }

    #[test]
    fn test_corrupt_vint() {
        let mut decoder = Decoder::new();
        let err = decoder.write(&[0x00, 0x81], |_| Ok::<_, Error>(())).unwrap_err();
        assert_matches!(err, Error::InvalidVintWidth { offset: 0, first: 0 });
    }

    #[test]
    fn test_child_overrunning_parent() {
        // Info of 2 bytes holding a 4-byte TimecodeScale element
        let mut decoder = Decoder::new();
        let err = decoder
            .write(
                &[0x15, 0x49, 0xA9, 0x66, 0x82, 0x2A, 0xD7, 0xB1, 0x81, 0x01],
                |_| Ok::<_, Error>(()),
            )
            .unwrap_err();
        assert_matches!(err, Error::ElementOverrun { id: ids::TIMECODE_SCALE, .. });
    }

    #[test]
    fn test_leaf_size_limit() {
        // SimpleBlock declaring 2^48 bytes, no content needed to reject it
        let huge = [0xA3, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut decoder = Decoder::new();
        let err = decoder.write(&huge, |_| Ok::<_, Error>(())).unwrap_err();
        assert_matches!(
            err,
            Error::LeafTooLarge {
                id: ids::SIMPLE_BLOCK,
                offset: 0,
                size: 0x1_0000_0000_0000,
                max: DEFAULT_MAX_LEAF_SIZE,
                ..
            }
        );

        let mut decoder = Decoder::new().with_max_leaf_size(4);
        assert_eq!(decoder.max_leaf_size(), 4);
        let err = decoder
            .write(&[0xE7, 0x85, 1, 2, 3, 4, 5], |_| Ok::<_, Error>(()))
            .unwrap_err();
        assert_matches!(err, Error::LeafTooLarge { id: ids::TIMECODE, size: 5, max: 4, .. });

        let mut decoder = Decoder::new().with_max_leaf_size(4);
        let mut values = Vec::new();
        decoder
            .write(&[0xE7, 0x84, 0, 0, 0, 7], |ev| {
                values.push(ev.value.as_ref().and_then(Value::as_u64));
                Ok::<_, Error>(())
            })
            .unwrap();
        assert_eq!(values, vec![Some(7)]);
    }

    #[test]
    fn test_unknown_size_leaf_rejected() {
        let mut decoder = Decoder::new();
        let err = decoder.write(&[0xE7, 0xFF], |_| Ok::<_, Error>(())).unwrap_err();
        assert_matches!(err, Error::UnknownSizeLeaf { id: ids::TIMECODE, .. });
    }

    #[test]
    fn test_write_after_finish() {
        let mut decoder = Decoder::new();
        decoder.finish(|_| Ok::<_, Error>(())).unwrap();
        assert!(decoder.is_finished());
        assert_matches!(
            decoder.write(&[0x80], |_| Ok::<_, Error>(())),
            Err(Error::Finished)
        );
    }

    #[test]
    fn test_finish_closes_truncated_frames() {
        let events = decode_all(&[&[0x18, 0x53, 0x80, 0x67, 0x90, 0xE7, 0x81]]).unwrap();
        assert_eq!(
            kinds(&events),
            vec![(TagKind::Start, "Segment"), (TagKind::End, "Segment")]
        );
    }

    #[test]
    fn test_callback_error_aborts() {
        let mut decoder = Decoder::new();
        let result = decoder.write(&[0xE7, 0x81, 0x00], |_| Err(Error::Finished));
        assert_matches!(result, Err(Error::Finished));
    }
}
