//! Forward-only cursor over a seekable byte stream.
//!
//! [`StreamCursor`] is the raw primitive underneath the format reader. Every
//! read is exact-length and lands in one scratch buffer that is reused across
//! calls, so decoding a file does not allocate per field.

use std::io::{BufRead, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use zerocopy::FromBytes;

use crate::{Error, Result, Transcoder};

/// A cursor that reads exact-length chunks from a stream.
///
/// Position only moves forward, except through [`StreamCursor::reposition`],
/// which exists for restoring a saved reader context.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use strata_common::{StreamCursor, Transcoder};
///
/// let mut cursor = StreamCursor::new(Cursor::new(vec![1, 0, 0, 0, b'h', b'i']), Transcoder::default())?;
/// assert_eq!(cursor.read_u32()?, 1);
/// assert_eq!(cursor.read_string(2)?, "hi");
/// assert_eq!(cursor.remaining(), 0);
/// # Ok::<(), strata_common::Error>(())
/// ```
#[derive(Debug)]
pub struct StreamCursor<R> {
    inner: R,
    position: u64,
    len: u64,
    scratch: Vec<u8>,
    transcoder: Transcoder,
}

impl<R: BufRead + Seek> StreamCursor<R> {
    /// Wrap a stream, positioned at its start.
    pub fn new(mut inner: R, transcoder: Transcoder) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            position: 0,
            len,
            scratch: Vec::with_capacity(256),
            transcoder,
        })
    }

    /// Get the absolute position in the stream.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get the total length of the stream.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check whether the stream is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the number of bytes between the position and the end of the stream.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }

    /// Get the transcoder applied by [`StreamCursor::read_string`].
    #[inline]
    pub fn transcoder(&self) -> Transcoder {
        self.transcoder
    }

    fn ensure(&self, needed: u64) -> Result<()> {
        if self.remaining() < needed {
            return Err(Error::TruncatedStream {
                offset: self.position,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Read exactly `count` bytes into the scratch buffer.
    pub fn read_exact(&mut self, count: usize) -> Result<&[u8]> {
        self.ensure(count as u64)?;
        self.scratch.resize(count, 0);
        self.inner.read_exact(&mut self.scratch)?;
        self.position += count as u64;
        Ok(&self.scratch)
    }

    /// Read exactly `count` bytes into an owned buffer.
    pub fn read_vec(&mut self, count: usize) -> Result<Vec<u8>> {
        self.read_exact(count).map(<[u8]>::to_vec)
    }

    /// Read a fixed-size value using zerocopy.
    pub fn read_scalar<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let offset = self.position;
        let bytes = self.read_exact(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::TruncatedStream {
            offset,
            needed: size as u64,
            available: 0,
        })
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_exact(1).map(|b| b[0])
    }

    /// Read a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_exact(2).map(LittleEndian::read_u16)
    }

    /// Read a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_exact(4).map(LittleEndian::read_u32)
    }

    /// Read a little-endian i32.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_exact(4).map(LittleEndian::read_i32)
    }

    /// Read a little-endian u64.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_exact(8).map(LittleEndian::read_u64)
    }

    /// Read a little-endian f32.
    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_exact(4).map(LittleEndian::read_f32)
    }

    /// Read `count` bytes of text and decode them with the configured
    /// transcoder. The text ends at the first NUL, if any.
    pub fn read_string(&mut self, count: usize) -> Result<String> {
        let transcoder = self.transcoder;
        let bytes = self.read_exact(count)?;
        Ok(transcoder.decode(bytes))
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let buffered = self.inner.fill_buf()?;
        buffered.first().copied().ok_or(Error::TruncatedStream {
            offset: self.position,
            needed: 1,
            available: 0,
        })
    }

    /// Skip `count` bytes.
    pub fn skip(&mut self, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ensure(count)?;
        let delta = i64::try_from(count).map_err(|_| Error::TruncatedStream {
            offset: self.position,
            needed: count,
            available: self.remaining(),
        })?;
        self.inner.seek(SeekFrom::Current(delta))?;
        self.position += count;
        Ok(())
    }

    /// Move to an absolute offset. Used only when restoring a saved context.
    pub fn reposition(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(Error::TruncatedStream {
                offset,
                needed: 0,
                available: 0,
            });
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::Encoding;

    fn cursor(data: &[u8]) -> StreamCursor<Cursor<Vec<u8>>> {
        StreamCursor::new(Cursor::new(data.to_vec()), Transcoder::default()).unwrap()
    }

    #[test]
    fn test_scalars_advance_position() {
        let mut c = cursor(&[0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0x00, 0x00, 0x80, 0x3F]);
        assert_eq!(c.read_u16().unwrap(), 0x1234);
        assert_eq!(c.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(c.position(), 6);
        assert_eq!(c.read_f32().unwrap(), 1.0);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn test_truncated_read_reports_offset() {
        let mut c = cursor(&[1, 2, 3, 4, 5, 6]);
        c.skip(4).unwrap();
        match c.read_u32() {
            Err(Error::TruncatedStream {
                offset,
                needed,
                available,
            }) => {
                assert_eq!((offset, needed, available), (4, 4, 2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // A failed read does not move the cursor.
        assert_eq!(c.position(), 4);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut c = cursor(&[7, 8]);
        assert_eq!(c.peek_u8().unwrap(), 7);
        assert_eq!(c.position(), 0);
        assert_eq!(c.read_u8().unwrap(), 7);
        assert_eq!(c.peek_u8().unwrap(), 8);
    }

    #[test]
    fn test_read_string_transcodes() {
        let data = [0xC0, 0xE1, 0x00, 0x00];
        let mut c = StreamCursor::new(
            Cursor::new(data.to_vec()),
            Transcoder::new(Encoding::Windows1251),
        )
        .unwrap();
        assert_eq!(c.read_string(4).unwrap(), "Аб");
    }

    #[test]
    fn test_reposition_then_read() {
        let mut c = cursor(b"abcdef");
        c.skip(5).unwrap();
        c.reposition(2).unwrap();
        assert_eq!(c.read_exact(2).unwrap(), b"cd");
        assert!(c.reposition(7).is_err());
    }
}
