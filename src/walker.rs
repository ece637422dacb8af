//! The recursive walker (§4.5): the heart of the parser.
//!
//! Five mutually recursive procedures drive the grammar — the top-level
//! dataset, defined/undefined-length sequences, defined/undefined-length
//! items, and encapsulated pixel data — dispatching on each decoded
//! element header along the way.

use snafu::ensure;
use tracing::{debug, trace, warn};

use crate::error::{
    MalformedLengthSnafu, MalformedMagicSnafu, MalformedMetaSnafu, Result,
    UnsupportedUndefinedUnknownSnafu,
};
use crate::handler::ParseHandler;
use crate::header::{
    decode_explicit_header, decode_explicit_or_end_item_header, decode_item_marker,
    ElementHeader, ItemElementHeader, ItemMarker,
};
use crate::length::Length;
use crate::path::{PathStack, TargetPathSet, DEFAULT_MAX_DEPTH};
use crate::reader::{ByteReader, ReadSeek};
use crate::tag::Tag;
use crate::vr::Vr;

const META_GROUP_LENGTH_TAG: Tag = Tag(0x0002, 0x0000);
const DICM_MAGIC: [u8; 4] = *b"DICM";
const PREAMBLE_LEN: u64 = 128;

/// Drives a depth-first, pre-order descent over a DICOM byte stream,
/// delivering selected attribute values and pixel-item offsets to a
/// [`ParseHandler`].
///
/// The walker's only mutable state across recursive frames is the path
/// stack and the underlying reader's file offset.
pub struct Walker<S> {
    reader: ByteReader<S>,
    max_depth: usize,
}

impl<S: ReadSeek> Walker<S> {
    pub fn new(source: S) -> Self {
        Walker {
            reader: ByteReader::new(source),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(source: S, max_depth: usize) -> Self {
        Walker {
            reader: ByteReader::new(source),
            max_depth,
        }
    }

    /// The reader's current absolute byte offset.
    pub fn tell(&self) -> u64 {
        self.reader.tell()
    }

    /// Run a complete parse: preamble, file meta group, then the dataset
    /// to EOF.
    pub fn run(&mut self, targets: &TargetPathSet, handler: &mut dyn ParseHandler) -> Result<()> {
        self.read_preamble_and_meta()?;
        let mut path = PathStack::new(self.max_depth);
        self.run_dataset(targets, handler, &mut path)
    }

    fn read_preamble_and_meta(&mut self) -> Result<()> {
        self.reader.skip(PREAMBLE_LEN)?;

        let magic = self.reader.read_exact(4)?;
        ensure!(magic == DICM_MAGIC, MalformedMagicSnafu);

        let position = self.reader.tell();
        let header = decode_explicit_header(&mut self.reader)?;
        let is_group_length = header.tag == META_GROUP_LENGTH_TAG
            && header.vr == Vr::from_bytes(*b"UL").unwrap()
            && header.len == Length::from(4);
        ensure!(is_group_length, MalformedMetaSnafu { position });

        let group_len = self.reader.read_u32()?;
        trace!(group_len, "skipping file meta group");
        self.reader.skip(u64::from(group_len))?;
        Ok(())
    }

    fn run_dataset(
        &mut self,
        targets: &TargetPathSet,
        handler: &mut dyn ParseHandler,
        path: &mut PathStack,
    ) -> Result<()> {
        trace!(offset = self.reader.tell(), "entering top-level dataset");
        let mut last_tag: Option<Tag> = None;
        loop {
            if self.reader.at_eof()? {
                trace!(offset = self.reader.tell(), "reached end of dataset");
                return Ok(());
            }
            let header = decode_explicit_header(&mut self.reader)?;
            debug_assert!(
                last_tag.map_or(true, |t| t < header.tag),
                "tags must be emitted in increasing order"
            );
            last_tag = Some(header.tag);
            self.dispatch(header, targets, handler, path)?;
        }
    }

    /// Dispatch on a just-decoded, non-sentinel element header (§4.5).
    fn dispatch(
        &mut self,
        de: ElementHeader,
        targets: &TargetPathSet,
        handler: &mut dyn ParseHandler,
        path: &mut PathStack,
    ) -> Result<()> {
        let position = self.reader.tell();
        path.push(de.tag, position)?;

        let result = (|| -> Result<()> {
            if de.len.is_undefined() {
                if de.tag.is_pixel_data() {
                    trace!(offset = position, "entering encapsulated pixel data");
                    handler.on_attribute(path.as_slice(), de, None);
                    self.encapsulated_pixel_data(handler)
                } else if de.vr.is_sequence() {
                    handler.on_attribute(path.as_slice(), de, None);
                    self.undefined_sequence(targets, handler, path)
                } else {
                    UnsupportedUndefinedUnknownSnafu { tag: de.tag, position }.fail()
                }
            } else if de.vr.is_sequence() {
                let len = de.len.get().expect("checked defined above");
                if targets.contains_prefix_of(path.as_slice()) {
                    self.defined_sequence(len, targets, handler, path)
                } else {
                    debug!(tag = %de.tag, len, "skipping unmatched sequence");
                    self.reader.skip(u64::from(len)).map(|_| ())
                }
            } else {
                let len = de.len.get().expect("checked defined above");
                let mut view = self.reader.bounded_view(len);
                handler.on_attribute(path.as_slice(), de, Some(&mut view));
                if view.remaining() > 0 {
                    warn!(tag = %de.tag, remaining = view.remaining(), "callback read less than declared value size");
                }
                view.finish()?;
                self.reader.commit_bounded(len);
                Ok(())
            }
        })();

        path.pop();
        result
    }

    /// Undefined-length sequence (§4.5): loop until the end-of-sequence
    /// marker, dispatching start-of-item markers along the way.
    fn undefined_sequence(
        &mut self,
        targets: &TargetPathSet,
        handler: &mut dyn ParseHandler,
        path: &mut PathStack,
    ) -> Result<()> {
        loop {
            match decode_item_marker(&mut self.reader)? {
                ItemMarker::SequenceDelimiter => {
                    trace!(offset = self.reader.tell(), "undefined sequence ended");
                    return Ok(());
                }
                ItemMarker::Item { len } => self.dispatch_item(len, targets, handler, path)?,
            }
        }
    }

    /// Defined-length sequence (§4.5): same shape as an undefined
    /// sequence, but terminated by accumulated byte count rather than an
    /// end-of-sequence marker.
    fn defined_sequence(
        &mut self,
        seqlen: u32,
        targets: &TargetPathSet,
        handler: &mut dyn ParseHandler,
        path: &mut PathStack,
    ) -> Result<()> {
        let start = self.reader.tell();
        let end = start + u64::from(seqlen);
        while self.reader.tell() < end {
            match decode_item_marker(&mut self.reader)? {
                ItemMarker::Item { len } => self.dispatch_item(len, targets, handler, path)?,
                ItemMarker::SequenceDelimiter => {
                    return MalformedLengthSnafu {
                        position: self.reader.tell(),
                        overrun: 0u64,
                    }
                    .fail();
                }
            }
        }
        ensure!(
            self.reader.tell() == end,
            MalformedLengthSnafu {
                position: self.reader.tell(),
                overrun: self.reader.tell() - end,
            }
        );
        Ok(())
    }

    /// Shared tail of both sequence variants: an item just started with
    /// declared length `len`, which may itself be defined or undefined.
    fn dispatch_item(
        &mut self,
        len: Length,
        targets: &TargetPathSet,
        handler: &mut dyn ParseHandler,
        path: &mut PathStack,
    ) -> Result<()> {
        match len.get() {
            None => self.undefined_item(targets, handler, path),
            Some(itemlen) => {
                if targets.contains_prefix_of(path.as_slice()) {
                    self.defined_item(itemlen, targets, handler, path)
                } else {
                    debug!(len = itemlen, "skipping unmatched item");
                    self.reader.skip(u64::from(itemlen)).map(|_| ())
                }
            }
        }
    }

    /// Undefined-length item (§4.5): loop until the item delimiter,
    /// dispatching elements as at the top level.
    fn undefined_item(
        &mut self,
        targets: &TargetPathSet,
        handler: &mut dyn ParseHandler,
        path: &mut PathStack,
    ) -> Result<()> {
        let mut last_tag: Option<Tag> = None;
        loop {
            match decode_explicit_or_end_item_header(&mut self.reader)? {
                ItemElementHeader::ItemDelimiter => return Ok(()),
                ItemElementHeader::Element(header) => {
                    debug_assert!(
                        last_tag.map_or(true, |t| t < header.tag),
                        "tags must be emitted in increasing order"
                    );
                    last_tag = Some(header.tag);
                    self.dispatch(header, targets, handler, path)?;
                }
            }
        }
    }

    /// Defined-length item (§4.5): same shape as an undefined item, but
    /// terminated by accumulated byte count rather than an item delimiter.
    fn defined_item(
        &mut self,
        itemlen: u32,
        targets: &TargetPathSet,
        handler: &mut dyn ParseHandler,
        path: &mut PathStack,
    ) -> Result<()> {
        let start = self.reader.tell();
        let end = start + u64::from(itemlen);
        let mut last_tag: Option<Tag> = None;
        while self.reader.tell() < end {
            match decode_explicit_or_end_item_header(&mut self.reader)? {
                ItemElementHeader::Element(header) => {
                    debug_assert!(
                        last_tag.map_or(true, |t| t < header.tag),
                        "tags must be emitted in increasing order"
                    );
                    last_tag = Some(header.tag);
                    self.dispatch(header, targets, handler, path)?;
                }
                ItemElementHeader::ItemDelimiter => {
                    return MalformedLengthSnafu {
                        position: self.reader.tell(),
                        overrun: 0u64,
                    }
                    .fail();
                }
            }
        }
        ensure!(
            self.reader.tell() == end,
            MalformedLengthSnafu {
                position: self.reader.tell(),
                overrun: self.reader.tell() - end,
            }
        );
        Ok(())
    }

    /// Encapsulated pixel data (§4.5): loop over fragment items until the
    /// end-of-sequence marker, reporting each item's absolute offset and
    /// length without ever copying its bytes. The first item is the basic
    /// offset table; the caller decides whether to treat it specially.
    fn encapsulated_pixel_data(&mut self, handler: &mut dyn ParseHandler) -> Result<()> {
        loop {
            match decode_item_marker(&mut self.reader)? {
                ItemMarker::SequenceDelimiter => return Ok(()),
                ItemMarker::Item { len } => {
                    let itemlen = len.get().unwrap_or(0);
                    let offset = self.reader.tell();
                    handler.on_pixel_item(offset, itemlen);
                    self.reader.skip(u64::from(itemlen))?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::mock::{RecordedEvent, RecordingHandler};
    use crate::length::Length;
    use std::io::Cursor;

    fn walker_over(data: Vec<u8>) -> Walker<Cursor<Vec<u8>>> {
        Walker::new(Cursor::new(data))
    }

    fn full_file(dataset: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 128];
        out.extend_from_slice(b"DICM");
        #[rustfmt::skip]
        out.extend_from_slice(&[
            0x02, 0x00, 0x00, 0x00, // (0002,0000)
            b'U', b'L',
            0x04, 0x00,
            0x00, 0x00, 0x00, 0x00, // meta group length = 0
        ]);
        out.extend_from_slice(dataset);
        out
    }

    #[test]
    fn directory_index_value_is_delivered_when_target_matches() {
        #[rustfmt::skip]
        let dataset = [
            0x04, 0x00, 0x20, 0x12, // (0004,1220) DirectoryRecordSequence
            b'S', b'Q',
            0x00, 0x00,
            0xff, 0xff, 0xff, 0xff, // undefined length
            // item, undefined length
            0xfe, 0xff, 0x00, 0xe0,
            0xff, 0xff, 0xff, 0xff,
            // (0004,1500) ReferencedFileID, value "A\B\C " (8 bytes)
            0x04, 0x00, 0x00, 0x15,
            b'C', b'S',
            0x08, 0x00,
            b'A', b'\\', b'B', b'\\', b'C', b' ', b' ', b' ',
            // item delimiter
            0xfe, 0xff, 0x0d, 0xe0, 0x00, 0x00, 0x00, 0x00,
            // sequence delimiter
            0xfe, 0xff, 0xdd, 0xe0, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut w = walker_over(full_file(&dataset));
        let mut targets = TargetPathSet::new();
        targets.add(vec![Tag(0x0004, 0x1220), Tag(0x0004, 0x1500)]);
        let mut handler = RecordingHandler::default();
        w.run(&targets, &mut handler).unwrap();

        let values: Vec<_> = handler
            .events
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Attribute { tag, value: Some(v), .. }
                    if *tag == Tag(0x0004, 0x1500) =>
                {
                    Some(v.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(values.len(), 1);
        assert_eq!(&values[0], b"A\\B\\C   ");
    }

    #[test]
    fn empty_target_set_still_yields_leaf_but_not_descend() {
        #[rustfmt::skip]
        let dataset = [
            0x18, 0x00, 0x11, 0x60, // (0018,6011) sequence
            b'S', b'Q',
            0x00, 0x00,
            0x0a, 0x00, 0x00, 0x00, // defined length 10
            0xfe, 0xff, 0x00, 0xe0, // item
            0x02, 0x00, 0x00, 0x00, // item len 2
            0xAB, 0xCD, // opaque payload, never parsed as an element
            0x20, 0x00, 0x00, 0x40, // (0020,4000) leaf after the sequence
            b'L', b'T',
            0x04, 0x00,
            b'T', b'E', b'S', b'T',
        ];
        let mut w = walker_over(full_file(&dataset));
        let targets = TargetPathSet::new();
        let mut handler = RecordingHandler::default();
        w.run(&targets, &mut handler).unwrap();

        // only the trailing leaf is delivered; the sequence is skipped whole
        assert_eq!(handler.events.len(), 1);
        match &handler.events[0] {
            RecordedEvent::Attribute { tag, value: Some(v), .. } => {
                assert_eq!(*tag, Tag(0x0020, 0x4000));
                assert_eq!(v, b"TEST");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn undefined_sequence_with_zero_items_yields_one_nil_callback() {
        #[rustfmt::skip]
        let dataset = [
            0x40, 0x00, 0x55, 0x05, // (0040,0555) sequence
            b'S', b'Q',
            0x00, 0x00,
            0xff, 0xff, 0xff, 0xff, // undefined length
            0xfe, 0xff, 0xdd, 0xe0, 0x00, 0x00, 0x00, 0x00, // immediate sequence delimiter
        ];
        let mut w = walker_over(full_file(&dataset));
        let mut targets = TargetPathSet::new();
        // prefix-match so the walker descends, even though there's nothing inside
        targets.add(vec![Tag(0x0040, 0x0555), Tag(0x0008, 0x0100)]);
        let mut handler = RecordingHandler::default();
        w.run(&targets, &mut handler).unwrap();

        assert_eq!(handler.events.len(), 1);
        match &handler.events[0] {
            RecordedEvent::Attribute { tag, value: None, .. } => {
                assert_eq!(*tag, Tag(0x0040, 0x0555));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn encapsulated_pixel_data_reports_offsets_for_bot_and_frames() {
        #[rustfmt::skip]
        let dataset = [
            0xe0, 0x7f, 0x10, 0x00, // (7FE0,0010) PixelData
            b'O', b'B',
            0x00, 0x00,
            0xff, 0xff, 0xff, 0xff, // undefined length
            // basic offset table, empty
            0xfe, 0xff, 0x00, 0xe0, 0x00, 0x00, 0x00, 0x00,
            // frame 1, 2 bytes
            0xfe, 0xff, 0x00, 0xe0, 0x02, 0x00, 0x00, 0x00, 0xAA, 0xBB,
            // frame 2, 2 bytes
            0xfe, 0xff, 0x00, 0xe0, 0x02, 0x00, 0x00, 0x00, 0xCC, 0xDD,
            // sequence delimiter
            0xfe, 0xff, 0xdd, 0xe0, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut w = walker_over(full_file(&dataset));
        let targets = TargetPathSet::new();
        let mut handler = RecordingHandler::default();
        w.run(&targets, &mut handler).unwrap();

        let items: Vec<_> = handler
            .events
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::PixelItem { offset, length } => Some((*offset, *length)),
                _ => None,
            })
            .collect();
        assert_eq!(items.len(), 3);
        // BOT discarded by convention; remaining items strictly increasing
        assert!(items[1].0 > items[0].0);
        assert_eq!(items[0].1, 0);
        assert_eq!(items[1].1, 2);
        assert_eq!(items[2].1, 2);
    }

    #[test]
    fn pixel_data_item_of_length_zero_still_fires_callback() {
        #[rustfmt::skip]
        let dataset = [
            0xe0, 0x7f, 0x10, 0x00,
            b'O', b'B',
            0x00, 0x00,
            0xff, 0xff, 0xff, 0xff,
            0xfe, 0xff, 0x00, 0xe0, 0x00, 0x00, 0x00, 0x00, // zero-length item
            0xfe, 0xff, 0xdd, 0xe0, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut w = walker_over(full_file(&dataset));
        let targets = TargetPathSet::new();
        let mut handler = RecordingHandler::default();
        w.run(&targets, &mut handler).unwrap();

        // one nil attribute callback for the undefined-length PixelData
        // element itself, then the single pixel item
        assert_eq!(handler.events.len(), 2);
        match &handler.events[0] {
            RecordedEvent::Attribute { tag, value: None, .. } => {
                assert_eq!(*tag, Tag(0x7fe0, 0x0010));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            handler.events[1],
            RecordedEvent::PixelItem { offset: w.tell() - 8, length: 0 }
        );
    }

    #[test]
    fn unknown_vr_code_is_treated_as_long_length_family() {
        #[rustfmt::skip]
        let dataset = [
            0x08, 0x00, 0x00, 0x00,
            b'Z', b'Z', // synthetic unknown VR
            0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            0xAB, 0xCD,
        ];
        let mut w = walker_over(full_file(&dataset));
        let targets = TargetPathSet::new();
        let mut handler = RecordingHandler::default();
        w.run(&targets, &mut handler).unwrap();
        assert_eq!(handler.events.len(), 1);
    }

    #[test]
    fn nested_optical_path_code_value_is_delivered() {
        #[rustfmt::skip]
        let inner_item = [
            0x08, 0x00, 0x00, 0x01, // (0008,0100) CodeValue
            b'S', b'H',
            0x08, 0x00,
            b'A', b'-', b'0', b'0', b'1', b'1', b'8', b' ',
        ];
        let inner_seq_len = 8 + inner_item.len() as u32; // item header + content
        #[rustfmt::skip]
        let mid_item = {
            let mut v = vec![
                0x22, 0x00, 0x19, 0x00, // (0022,0019) inner sequence
                b'S', b'Q',
                0x00, 0x00,
            ];
            v.extend_from_slice(&inner_seq_len.to_le_bytes());
            v.extend_from_slice(&[0xfe, 0xff, 0x00, 0xe0]);
            v.extend_from_slice(&(inner_item.len() as u32).to_le_bytes());
            v.extend_from_slice(&inner_item);
            v
        };
        let mid_seq_len = 8 + mid_item.len() as u32;
        let mut outer_seq = vec![
            0x48, 0x00, 0x05, 0x01, // (0048,0105) outer sequence
            b'S', b'Q',
            0x00, 0x00,
        ];
        outer_seq.extend_from_slice(&mid_seq_len.to_le_bytes());
        outer_seq.extend_from_slice(&[0xfe, 0xff, 0x00, 0xe0]);
        outer_seq.extend_from_slice(&(mid_item.len() as u32).to_le_bytes());
        outer_seq.extend_from_slice(&mid_item);

        let mut w = walker_over(full_file(&outer_seq));
        let mut targets = TargetPathSet::new();
        targets.add(vec![
            Tag(0x0048, 0x0105),
            Tag(0x0022, 0x0019),
            Tag(0x0008, 0x0100),
        ]);
        let mut handler = RecordingHandler::default();
        w.run(&targets, &mut handler).unwrap();

        let values: Vec<_> = handler
            .events
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Attribute { tag, value: Some(v), .. }
                    if *tag == Tag(0x0008, 0x0100) =>
                {
                    Some(v.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(values.len(), 1);
        assert_eq!(&values[0], b"A-00118 ");
    }

    #[test]
    fn depth_overflow_is_fatal() {
        // seventeen nested sequences, each containing the next
        let leaf = [
            0x08, 0x00, 0x00, 0x01, b'S', b'H', 0x00, 0x00, // (0008,0100), empty value
        ];
        let mut content: Vec<u8> = leaf.to_vec();
        // depth runs 17 (outermost) down to 1 (innermost, wrapping the leaf);
        // pushing in this same order keeps `path` outermost-first
        let mut path: Vec<Tag> = Vec::new();
        for depth in (1..=17u16).rev() {
            let mut seq = vec![0x10, 0x00];
            seq.extend_from_slice(&depth.to_le_bytes());
            seq.extend_from_slice(b"SQ");
            seq.extend_from_slice(&[0x00, 0x00]);
            let item_len = 8 + content.len() as u32; // item marker header + item content
            seq.extend_from_slice(&item_len.to_le_bytes());
            seq.extend_from_slice(&[0xfe, 0xff, 0x00, 0xe0]);
            seq.extend_from_slice(&(content.len() as u32).to_le_bytes());
            seq.extend_from_slice(&content);
            debug_assert_eq!(seq.len() as u32, 12 + item_len);
            content = seq;
            path.push(Tag(0x0010, depth));
        }
        path.push(Tag(0x0008, 0x0100));

        let mut w = walker_over(full_file(&content));
        let mut targets = TargetPathSet::new();
        // match everything so the walker always descends
        targets.add(path);

        let mut handler = RecordingHandler::default();
        let err = w.run(&targets, &mut handler).unwrap_err();
        assert!(matches!(err, crate::error::Error::PathOverflow { .. }));
    }
}
