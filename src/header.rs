//! The element decoder (§4.3): three header-only decode modes over an
//! explicit-VR little-endian byte stream. Value bytes are always left in
//! the stream for the walker to hand off via a [`crate::bounded::BoundedView`].

use crate::error::{Error, MalformedHeaderSnafu, Result};
use crate::length::Length;
use crate::reader::{ByteReader, ReadSeek};
use crate::tag::Tag;
use crate::vr::{LengthFamily, Vr};
use snafu::ensure;

/// A short read while decoding a header is a malformed header, not a plain
/// I/O failure (§4.3, §7): the stream ended mid-grammar rather than the
/// source becoming unreadable. Reader errors from any other cause pass
/// through unchanged.
fn header_read<T>(result: Result<T>, position: u64) -> Result<T> {
    result.map_err(|err| match err {
        Error::Io { source, .. } => MalformedHeaderSnafu {
            position,
            reason: format!("short read: {}", source),
        }
        .build(),
        other => other,
    })
}

/// A decoded `(tag, vr, vl)` triple for a non-sentinel data element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub tag: Tag,
    pub vr: Vr,
    pub len: Length,
}

/// The result of decoding a header inside an undefined-length item, where
/// an item delimiter may appear in place of a real element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemElementHeader {
    Element(ElementHeader),
    ItemDelimiter,
}

/// The result of decoding a tag-only marker at the head of a sequence or
/// inside encapsulated pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemMarker {
    Item { len: Length },
    SequenceDelimiter,
}

/// Read the 2-byte VR and, depending on its length family, either a 2-byte
/// or a 4-byte value length (with 2 reserved zero bytes in the latter
/// case). `position` is the header's starting offset, used for error
/// reporting only.
fn decode_vr_and_len<S: ReadSeek>(
    reader: &mut ByteReader<S>,
    position: u64,
) -> Result<(Vr, Length)> {
    let vr_bytes = header_read(reader.read_exact(2), position)?;
    let vr = Vr::from_bytes([vr_bytes[0], vr_bytes[1]]).ok_or_else(|| {
        MalformedHeaderSnafu {
            position,
            reason: format!(
                "invalid VR bytes {:#04x} {:#04x}",
                vr_bytes[0], vr_bytes[1]
            ),
        }
        .build()
    })?;

    let len = match vr.length_family() {
        LengthFamily::Long => {
            let reserved = header_read(reader.read_exact(2), position)?;
            ensure!(
                reserved == [0u8, 0u8],
                MalformedHeaderSnafu {
                    position,
                    reason: "non-zero reserved padding".to_string(),
                }
            );
            Length::from(header_read(reader.read_u32(), position)?)
        }
        LengthFamily::Short => Length::from(u32::from(header_read(reader.read_u16(), position)?)),
    };

    Ok((vr, len))
}

/// Decode an explicit header: 2-byte group, 2-byte element, 2-byte VR, and
/// a length field per §4.3. Used at the top-level dataset, where a
/// sentinel tag is never expected.
pub fn decode_explicit_header<S: ReadSeek>(reader: &mut ByteReader<S>) -> Result<ElementHeader> {
    let position = reader.tell();
    let group = header_read(reader.read_u16(), position)?;
    let element = header_read(reader.read_u16(), position)?;
    let tag = Tag(group, element);

    ensure!(
        !tag.is_sentinel(),
        MalformedHeaderSnafu {
            position,
            reason: format!("unexpected sentinel tag {} outside item context", tag),
        }
    );

    let (vr, len) = decode_vr_and_len(reader, position)?;
    Ok(ElementHeader { tag, vr, len })
}

/// Decode an explicit header that may instead be an item delimiter
/// (`(FFFE,E00D)`), used inside undefined-length items.
pub fn decode_explicit_or_end_item_header<S: ReadSeek>(
    reader: &mut ByteReader<S>,
) -> Result<ItemElementHeader> {
    let position = reader.tell();
    let group = header_read(reader.read_u16(), position)?;
    let element = header_read(reader.read_u16(), position)?;
    let tag = Tag(group, element);

    if tag.is_item_delimiter() {
        let len = Length::from(header_read(reader.read_u32(), position)?);
        ensure!(
            len == Length::ZERO,
            MalformedHeaderSnafu {
                position,
                reason: "item delimiter has non-zero value length".to_string(),
            }
        );
        return Ok(ItemElementHeader::ItemDelimiter);
    }

    ensure!(
        !tag.is_sentinel(),
        MalformedHeaderSnafu {
            position,
            reason: format!("unexpected sentinel tag {} inside item", tag),
        }
    );

    let (vr, len) = decode_vr_and_len(reader, position)?;
    Ok(ItemElementHeader::Element(ElementHeader { tag, vr, len }))
}

/// Decode a tag-only header: a 4-byte tag followed directly by a 4-byte
/// value length, with no VR field. Used to decode item and sequence
/// delimiter markers at the head of a sequence or encapsulated pixel data.
pub fn decode_item_marker<S: ReadSeek>(reader: &mut ByteReader<S>) -> Result<ItemMarker> {
    let position = reader.tell();
    let group = header_read(reader.read_u16(), position)?;
    let element = header_read(reader.read_u16(), position)?;
    let tag = Tag(group, element);
    let len = Length::from(header_read(reader.read_u32(), position)?);

    if tag.is_item() {
        return Ok(ItemMarker::Item { len });
    }
    if tag.is_sequence_delimiter() {
        ensure!(
            len == Length::ZERO,
            MalformedHeaderSnafu {
                position,
                reason: "sequence delimiter has non-zero value length".to_string(),
            }
        );
        return Ok(ItemMarker::SequenceDelimiter);
    }

    MalformedHeaderSnafu {
        position,
        reason: format!("expected item start or sequence delimiter, found {}", tag),
    }
    .fail()
}
