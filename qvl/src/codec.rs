//! Bounds-checked little-endian decoding over a borrowed byte range.
//!
//! All the wire formats handled by this crate (DCAP quotes, SEV-SNP
//! reports, HCL envelopes) are fixed-layout little-endian structures, so a
//! single cursor type covers them. Every read names the field it decodes;
//! a short read fails deterministically with the offset, the requested
//! size, and the bytes actually remaining.

use crate::error::{Error, Result};

/// A cursor over a borrowed byte slice.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Borrow the next `n` bytes.
    pub fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::truncated(field, self.pos, n, self.remaining()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Copy the next `N` bytes into a fixed array.
    pub fn array<const N: usize>(
        &mut self,
        field: &'static str,
    ) -> Result<[u8; N]> {
        let bytes = self.take(N, field)?;
        // infallible: `take` returned exactly N bytes
        Ok(<[u8; N]>::try_from(bytes).unwrap())
    }

    pub fn u16(&mut self, field: &'static str) -> Result<u16> {
        self.array::<2>(field).map(u16::from_le_bytes)
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32> {
        self.array::<4>(field).map(u32::from_le_bytes)
    }

    pub fn u64(&mut self, field: &'static str) -> Result<u64> {
        self.array::<8>(field).map(u64::from_le_bytes)
    }

    /// Borrow a length-prefixed region whose `u32` size field must fit the
    /// remaining buffer.
    pub fn sized_region(&mut self, field: &'static str) -> Result<&'a [u8]> {
        let len = self.u32(field)? as usize;
        self.take(len, field)
    }

    /// Skip `n` reserved bytes.
    pub fn skip(&mut self, n: usize, field: &'static str) -> Result<()> {
        self.take(n, field).map(|_| ())
    }
}
