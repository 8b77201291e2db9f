//! Length-prefixed frame codec.
//!
//! ```text
//!    Payload
//!      Len              Payload
//! +------------+-----------------------+
//! | 0 0 0 20   |  20 bytes             |
//! +------------+-----------------------+
//!    4 bytes
//!   Big-endian
//! ```
//!
//! A clean end of stream *between* frames is normal termination and is
//! reported as `Ok(None)`. An end of stream anywhere inside a frame,
//! including inside the length prefix, is [`FrameError::Truncated`].

use std::io::{ErrorKind, Read, Write};

use crate::error::FrameError;

/// Width of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a frame payload (128 MiB).
pub const DEFAULT_MAX_FRAME_LEN: u32 = 128 * 1024 * 1024;

const INITIAL_PAYLOAD_CAPACITY: usize = 64 * 1024;

/// Reads until `buf` is full or the stream ends, returning the number of
/// bytes read. Retries on [`ErrorKind::Interrupted`].
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads one frame and returns its payload.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte
/// of a length prefix.
///
/// # Errors
///
/// - [`FrameError::Truncated`] if the stream ends inside the prefix or payload.
/// - [`FrameError::EmptyFrame`] if the declared length is zero.
/// - [`FrameError::TooLarge`] if the declared length exceeds `max_len`.
/// - [`FrameError::Io`] for any other channel failure.
///
/// # Examples
///
/// ```
/// use sqinn_core::{read_frame, write_frame, DEFAULT_MAX_FRAME_LEN};
///
/// let mut wire = Vec::new();
/// write_frame(&mut wire, b"ping").unwrap();
///
/// let mut input = wire.as_slice();
/// let payload = read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap();
/// assert_eq!(payload.as_deref(), Some(&b"ping"[..]));
/// assert!(read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap().is_none());
/// ```
pub fn read_frame<R: Read + ?Sized>(
    reader: &mut R,
    max_len: u32,
) -> Result<Option<Vec<u8>>, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    let got = read_full(reader, &mut prefix)?;
    if got == 0 {
        return Ok(None);
    }
    if got < LENGTH_PREFIX_LEN {
        return Err(FrameError::Truncated {
            expected: LENGTH_PREFIX_LEN,
            actual: got,
        });
    }

    let len = u32::from_be_bytes(prefix);
    if len == 0 {
        return Err(FrameError::EmptyFrame);
    }
    if len > max_len {
        return Err(FrameError::TooLarge {
            len: u64::from(len),
            max: u64::from(max_len),
        });
    }

    // The buffer grows with the bytes that actually arrive, not with the
    // declared length.
    let expected = len as usize;
    let mut payload = Vec::with_capacity(expected.min(INITIAL_PAYLOAD_CAPACITY));
    (&mut *reader)
        .take(u64::from(len))
        .read_to_end(&mut payload)?;
    if payload.len() < expected {
        return Err(FrameError::Truncated {
            expected,
            actual: payload.len(),
        });
    }
    Ok(Some(payload))
}

/// Writes one frame and flushes the writer.
///
/// # Errors
///
/// Returns [`FrameError::EmptyFrame`] for an empty payload,
/// [`FrameError::TooLarge`] if the payload length does not fit the prefix,
/// and [`FrameError::Io`] on channel failure.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyFrame);
    }
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len() as u64,
        max: u64::from(u32::MAX),
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most one byte per call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    #[test]
    fn test_clean_end_of_stream() {
        let mut input: &[u8] = &[];
        assert!(read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap().is_none());
    }

    #[test]
    fn test_partial_prefix_is_truncated() {
        let mut input: &[u8] = &[0, 0];
        let err = read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_short_payload_is_truncated() {
        let mut input: &[u8] = &[0, 0, 0, 10, 1, 2, 3];
        let err = read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 10,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_large_declared_length_with_short_body() {
        let mut input: Vec<u8> = DEFAULT_MAX_FRAME_LEN.to_be_bytes().to_vec();
        input.extend_from_slice(b"abc");
        let err = read_frame(&mut Trickle(&input), DEFAULT_MAX_FRAME_LEN).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated { expected, actual: 3 } if expected == DEFAULT_MAX_FRAME_LEN as usize
        ));
    }

    #[test]
    fn test_zero_length_is_rejected() {
        let mut input: &[u8] = &[0, 0, 0, 0];
        assert!(matches!(
            read_frame(&mut input, DEFAULT_MAX_FRAME_LEN),
            Err(FrameError::EmptyFrame)
        ));
    }

    #[test]
    fn test_length_above_limit_is_rejected() {
        let mut input: &[u8] = &[0, 0, 1, 0, 0];
        assert!(matches!(
            read_frame(&mut input, 16),
            Err(FrameError::TooLarge { len: 256, max: 16 })
        ));
    }

    #[test]
    fn test_fragmented_reads_are_reassembled() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"abc").unwrap();
        write_frame(&mut wire, b"de").unwrap();

        let mut input = Trickle(&wire);
        assert_eq!(
            read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap(),
            Some(b"abc".to_vec())
        );
        assert_eq!(
            read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap(),
            Some(b"de".to_vec())
        );
        assert!(read_frame(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap().is_none());
    }

    #[test]
    fn test_write_rejects_empty_payload() {
        let mut wire = Vec::new();
        assert!(matches!(write_frame(&mut wire, &[]), Err(FrameError::EmptyFrame)));
        assert!(wire.is_empty());
    }
}
