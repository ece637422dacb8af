//! The callback surface (§4.6): the two-entry contract the walker invokes
//! while it drives the grammar.
//!
//! Modeled as a trait object rather than a generic parameter, per the
//! design note in §9 — this keeps the walker free of a type parameter and
//! lets it be exercised in tests with a small recording mock.

use crate::bounded::BoundedView;
use crate::header::ElementHeader;
use crate::tag::Tag;

/// Receives tokens from the [`crate::walker`] as it descends through a
/// DICOM stream.
///
/// Neither method can fail: a callback that wants to reject a value must
/// validate it after the parse completes. Implementations may read less
/// than `value`'s declared size, or not at all; the walker always
/// consumes the rest on their behalf.
pub trait ParseHandler {
    /// Invoked once per non-sentinel element, in document order.
    ///
    /// `path` is the full nested tag path ending in `header.tag`.
    /// `value` is `Some` unless the element has undefined length, in
    /// which case the walker will descend into it next and no value view
    /// is available.
    fn on_attribute(&mut self, path: &[Tag], header: ElementHeader, value: Option<&mut BoundedView<'_>>);

    /// Invoked once per encapsulated pixel-data item, including the basic
    /// offset table (conventionally the first call).
    fn on_pixel_item(&mut self, absolute_offset: u64, length: u32);
}
