//! A thin byte reader over a seekable source, tracking the current file
//! offset and normalizing little-endian-on-wire integers to host order.

use byteordered::byteorder::{ByteOrder, LittleEndian};
use snafu::ResultExt;
use std::io::{Read, Seek, SeekFrom};

use crate::bounded::BoundedView;
use crate::error::{IoSnafu, Result};

/// Marker trait for sources the reader can operate on.
pub trait ReadSeek: Read + Seek {}
impl<T: ?Sized> ReadSeek for T where T: Read + Seek {}

/// Wraps a seekable byte source, exposing fixed-width reads and skips while
/// tracking the absolute byte offset.
///
/// All multi-byte integers on the wire are little-endian; this reader
/// normalizes them to the host's native representation on ingest, so every
/// other component in the crate can work with plain Rust integers.
pub struct ByteReader<S> {
    source: S,
    position: u64,
}

impl<S: ReadSeek> ByteReader<S> {
    /// Wrap a source that is already positioned at its first byte.
    pub fn new(source: S) -> Self {
        ByteReader { source, position: 0 }
    }

    /// The current absolute byte offset from the start of the source.
    #[inline]
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Read exactly `n` bytes, advancing the offset by `n`.
    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.source
            .read_exact(&mut buf)
            .context(IoSnafu { position: self.position })?;
        self.position += n as u64;
        Ok(buf)
    }

    /// Read exactly `n` bytes into a caller-supplied buffer, returning the
    /// number of bytes actually read (which may be less than `buf.len()`
    /// or `n` on a short read at end of stream).
    ///
    /// Unlike [`ByteReader::read_exact`], this does not fail on a short
    /// read; it is used by [`crate::bounded::BoundedView`], whose callers
    /// are permitted to read less than the declared value size.
    pub fn read_partial(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match self.source.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(e).context(IoSnafu { position: self.position });
                }
            }
        }
        self.position += total as u64;
        Ok(total)
    }

    /// Skip forward `n` bytes without reading their contents.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        self.source
            .seek(SeekFrom::Current(n as i64))
            .context(IoSnafu { position: self.position })?;
        self.position += n;
        Ok(())
    }

    /// Read a 16-bit unsigned integer, wire-order little-endian.
    pub fn read_u16(&mut self) -> Result<u16> {
        let buf = self.read_exact(2)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    /// Read a 32-bit unsigned integer, wire-order little-endian.
    pub fn read_u32(&mut self) -> Result<u32> {
        let buf = self.read_exact(4)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Whether the source has been exhausted (a zero-length read at the
    /// current position). Used only to detect top-level EOF.
    pub fn at_eof(&mut self) -> Result<bool> {
        let mut probe = [0u8; 1];
        match self.source.read(&mut probe) {
            Ok(0) => Ok(true),
            Ok(n) => {
                // push the probed byte(s) back by seeking to where we were
                self.source
                    .seek(SeekFrom::Current(-(n as i64)))
                    .context(IoSnafu { position: self.position })?;
                Ok(false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(true),
            Err(e) => Err(e).context(IoSnafu { position: self.position }),
        }
    }

    /// Borrow the source as a type-erased [`BoundedView`] limited to
    /// `declared_len` bytes, for handing value bytes off to a callback.
    ///
    /// The caller must invoke [`ByteReader::commit_bounded`] with the same
    /// `declared_len` once done with the view, since reads and skips
    /// through the view do not update this reader's own offset tracking.
    pub(crate) fn bounded_view(&mut self, declared_len: u32) -> BoundedView<'_> {
        BoundedView::new(&mut self.source, self.position, declared_len)
    }

    /// Record that a [`BoundedView`] of `declared_len` bytes, obtained via
    /// [`ByteReader::bounded_view`], has been fully consumed.
    pub(crate) fn commit_bounded(&mut self, declared_len: u32) {
        self.position += u64::from(declared_len);
    }
}
