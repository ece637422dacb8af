//! The error taxonomy for this crate.
//!
//! Every variant is fatal to the parse in progress: callbacks cannot raise,
//! so any value a caller needs to reject must be validated after the fact
//! (see [`crate::handler`]).

use crate::tag::Tag;
use snafu::{Backtrace, Snafu};

/// Type alias for a result from this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the whole-slide DICOM parser.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// An I/O failure occurred reading from or seeking within the source.
    #[snafu(display("I/O error at byte offset {}", position))]
    Io {
        position: u64,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// The 128-byte preamble was not followed by the `DICM` magic code.
    #[snafu(display("preamble magic code is not DICM"))]
    MalformedMagic { backtrace: Backtrace },

    /// The file meta group length element was missing or malformed.
    #[snafu(display("malformed file meta group at byte offset {}", position))]
    MalformedMeta { position: u64, backtrace: Backtrace },

    /// A data element, item, or delimiter header could not be decoded:
    /// a short read, an invalid VR, or non-zero reserved padding.
    #[snafu(display("malformed element header at byte offset {}: {}", position, reason))]
    MalformedHeader {
        position: u64,
        reason: String,
        backtrace: Backtrace,
    },

    /// A child element's on-wire size overran the length declared by its
    /// enclosing sequence or item.
    #[snafu(display(
        "element at byte offset {} overruns its enclosing container by {} bytes",
        position,
        overrun
    ))]
    MalformedLength {
        position: u64,
        overrun: u64,
        backtrace: Backtrace,
    },

    /// An element had undefined length but a VR that is neither a sequence
    /// nor the pixel data attribute.
    #[snafu(display(
        "tag {} at byte offset {} has undefined length but is not a sequence or pixel data",
        tag,
        position
    ))]
    UnsupportedUndefinedUnknown {
        tag: Tag,
        position: u64,
        backtrace: Backtrace,
    },

    /// The nested tag path exceeded the configured depth bound.
    #[snafu(display(
        "tag path exceeded the depth bound of {} at byte offset {}",
        bound,
        position
    ))]
    PathOverflow {
        bound: usize,
        position: u64,
        backtrace: Backtrace,
    },
}

impl Error {
    /// The byte offset at which this error was detected, when known.
    pub fn position(&self) -> Option<u64> {
        match self {
            Error::Io { position, .. }
            | Error::MalformedMeta { position, .. }
            | Error::MalformedHeader { position, .. }
            | Error::MalformedLength { position, .. }
            | Error::UnsupportedUndefinedUnknown { position, .. }
            | Error::PathOverflow { position, .. } => Some(*position),
            Error::MalformedMagic { .. } => None,
        }
    }
}
