//! A read-cursor limited to a declared byte length.
//!
//! This is the only mechanism by which raw value bytes reach a caller's
//! [`on_attribute`](crate::handler::ParseHandler::on_attribute) callback.
//! It guarantees that whatever the callback does — read all of it, read
//! part of it, or read nothing — the walker can always advance the
//! underlying reader to exactly the end of the declared value.
//!
//! The view is type-erased over `dyn ReadSeek` (rather than generic over
//! the walker's source type) so that [`crate::handler::ParseHandler`]
//! remains a plain trait object, per the dynamic-dispatch design note.

use crate::error::{IoSnafu, Result};
use crate::reader::ReadSeek;
use snafu::ResultExt;
use std::io::SeekFrom;

pub struct BoundedView<'r> {
    source: &'r mut dyn ReadSeek,
    base_offset: u64,
    declared_len: u64,
    consumed: u64,
}

impl<'r> BoundedView<'r> {
    pub(crate) fn new(source: &'r mut dyn ReadSeek, base_offset: u64, declared_len: u32) -> Self {
        BoundedView {
            source,
            base_offset,
            declared_len: u64::from(declared_len),
            consumed: 0,
        }
    }

    /// The total declared size of this value, in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.declared_len
    }

    /// How many bytes remain unread within the view.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.declared_len - self.consumed
    }

    /// Read up to `buf.len()` bytes, or the remainder of the view,
    /// whichever is smaller. Returns the number of bytes actually read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        use std::io::Read;

        let take = (buf.len() as u64).min(self.remaining()) as usize;
        if take == 0 {
            return Ok(0);
        }
        let mut total = 0;
        while total < take {
            match self.source.read(&mut buf[total..take]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(e).context(IoSnafu {
                        position: self.base_offset + self.consumed,
                    })
                }
            }
        }
        self.consumed += total as u64;
        Ok(total)
    }

    /// Read and return up to `n` bytes, or the remainder of the view.
    pub fn read_to_vec(&mut self, n: u64) -> Result<Vec<u8>> {
        let take = n.min(self.remaining());
        let mut buf = vec![0u8; take as usize];
        let got = self.read(&mut buf)?;
        buf.truncate(got);
        Ok(buf)
    }

    /// Read the whole remainder of the view.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.read_to_vec(self.remaining())
    }

    /// Skip `n` bytes, or the remainder of the view, whichever is smaller.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let take = n.min(self.remaining());
        if take > 0 {
            self.source
                .seek(SeekFrom::Current(take as i64))
                .context(IoSnafu {
                    position: self.base_offset + self.consumed,
                })?;
            self.consumed += take;
        }
        Ok(())
    }

    /// Discard whatever bytes the callback did not consume, guaranteeing
    /// the underlying reader ends up exactly at the end of the declared
    /// value. Invoked by the walker after every callback, even if the
    /// callback read nothing at all.
    pub(crate) fn finish(mut self) -> Result<()> {
        self.skip(self.remaining())
    }
}
