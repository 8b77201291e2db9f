//! Primitive field readers and writers for frame payloads.
//!
//! All multi-byte integers are big-endian. Variable-length fields are a
//! `u32` byte count followed by that many bytes. [`PayloadReader`] never
//! reads past the end of its slice; a short payload is reported as
//! [`DecodeError::UnexpectedEnd`].

use crate::error::{DecodeError, Result};

/// Bounds-checked cursor over one frame payload.
///
/// # Examples
///
/// ```
/// use sqinn_core::{PayloadReader, PayloadWriter};
///
/// let mut w = PayloadWriter::new();
/// w.put_u8(7);
/// w.put_str("hello");
/// let bytes = w.into_bytes();
///
/// let mut r = PayloadReader::new(&bytes);
/// assert_eq!(r.u8().unwrap(), 7);
/// assert_eq!(r.str("greeting").unwrap(), "hello");
/// r.finish().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    /// Creates a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset into the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consumes exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    /// Reads an IEEE-754 double from its big-endian bit pattern.
    pub fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.u64()?))
    }

    /// Reads a `u32` length followed by that many raw bytes.
    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// Reads a length-prefixed UTF-8 string. `field` names the string in
    /// the error when validation fails.
    pub fn str(&mut self, field: &'static str) -> Result<&'a str> {
        let raw = self.bytes()?;
        std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8(field))
    }

    /// Asserts that the whole payload was consumed.
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

/// Growable payload builder; the inverse of [`PayloadReader`].
#[derive(Debug, Clone, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.put_u64(v.to_bits());
    }

    /// Writes a `u32` length prefix and the bytes.
    ///
    /// Inputs longer than `u32::MAX` are clamped to the first `u32::MAX`
    /// bytes; the frame limit rejects such payloads long before this.
    pub fn put_bytes(&mut self, v: &[u8]) {
        let len = u32::try_from(v.len()).unwrap_or(u32::MAX);
        self.put_u32(len);
        self.buf.extend_from_slice(&v[..len as usize]);
    }

    pub fn put_str(&mut self, v: &str) {
        self.put_bytes(v.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
