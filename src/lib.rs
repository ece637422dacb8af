#![deny(trivial_casts, trivial_numeric_casts, unsafe_code)]
#![warn(missing_debug_implementations, unused_qualifications, unused_import_braces)]

//! A dictionary-free, synchronous parser for whole-slide DICOM images and
//! the directory-index files that reference them.
//!
//! This crate walks an explicit-VR little-endian data set without ever
//! consulting an attribute dictionary: every decision (whether to descend
//! into a sequence, whether to treat undefined length as a sequence or
//! encapsulated pixel data) is made from the bytes on the wire plus a
//! caller-supplied set of target tag paths. See [`DicomStreamParser`] for
//! the entry point.
//!
//! ```no_run
//! use dicom_wsi_parser::{DicomStreamParser, ParseHandler, ElementHeader, BoundedView, Tag};
//!
//! struct PrintRows;
//!
//! impl ParseHandler for PrintRows {
//!     fn on_attribute(&mut self, _path: &[Tag], header: ElementHeader, value: Option<&mut BoundedView<'_>>) {
//!         if header.tag == Tag(0x0028, 0x0010) {
//!             if let Some(v) = value {
//!                 println!("rows = {:?}", v.read_all());
//!             }
//!         }
//!     }
//!     fn on_pixel_item(&mut self, _absolute_offset: u64, _length: u32) {}
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut parser = DicomStreamParser::open("slide.dcm")?;
//! parser.run(&mut PrintRows)?;
//! # Ok(())
//! # }
//! ```

pub mod bounded;
pub mod error;
pub mod handler;
pub mod header;
pub mod length;
pub mod path;
pub mod reader;
pub mod tag;
pub mod vr;
pub mod walker;

mod parser;

pub use bounded::BoundedView;
pub use error::{Error, Result};
pub use handler::ParseHandler;
pub use header::{ElementHeader, ItemElementHeader, ItemMarker};
pub use length::Length;
pub use parser::DicomStreamParser;
pub use path::{PathStack, TargetPathSet, DEFAULT_MAX_DEPTH};
pub use reader::{ByteReader, ReadSeek};
pub use tag::Tag;
pub use vr::{LengthFamily, Vr};
