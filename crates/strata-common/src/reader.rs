//! Binary reader for zero-copy parsing of in-memory payloads.
//!
//! Subrecords are small and self-delimiting, so the format reader pulls a whole
//! payload into memory and decodes its fields with [`BinaryReader`].

use byteorder::{ByteOrder, LittleEndian};

use crate::{Error, FormId, Result};

/// Little-endian cursor over a borrowed payload. Strings and byte runs are
/// returned as slices of the payload.
///
/// # Example
///
/// ```
/// use strata_common::{BinaryReader, FormId};
///
/// // An XLOC payload: lock level, then key form id.
/// let data = [0x32, 0x00, 0x00, 0x00, 0x30, 0x00, 0x00, 0x01];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_i32().unwrap(), 50);
/// assert_eq!(reader.read_form_id().unwrap(), FormId::new(1, 0x30));
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Offset of the next byte within the payload.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Bytes left after the current position.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Skip `count` bytes.
    pub fn advance(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(drop)
    }

    /// Take the next `count` bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if available < count {
            return Err(Error::TruncatedStream {
                offset: self.position as u64,
                needed: count as u64,
                available: available as u64,
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_bytes(2).map(LittleEndian::read_u16)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bytes(4).map(LittleEndian::read_u32)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_bytes(4).map(LittleEndian::read_i32)
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_bytes(8).map(LittleEndian::read_u64)
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_bytes(4).map(LittleEndian::read_f32)
    }

    /// Read `N` consecutive little-endian f32 values.
    pub fn read_f32_array<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0.0f32; N];
        for value in &mut out {
            *value = self.read_f32()?;
        }
        Ok(out)
    }

    /// Read a raw 32-bit form identifier.
    #[inline]
    pub fn read_form_id(&mut self) -> Result<FormId> {
        self.read_u32().map(FormId::from_raw)
    }

    /// Read a u16 length prefix followed by that many UTF-8 bytes.
    pub fn read_prefixed_str(&mut self) -> Result<&'a str> {
        let length = self.read_u16()? as usize;
        let bytes = self.read_bytes(length)?;
        std::str::from_utf8(bytes).map_err(Error::Utf8)
    }

    /// Read a fixed-size field, returning the bytes before the first NUL.
    pub fn read_padded(&mut self, field_size: usize) -> Result<&'a [u8]> {
        let bytes = self.read_bytes(field_size)?;
        let end = memchr::memchr(0, bytes).unwrap_or(field_size);
        Ok(&bytes[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let mut data = vec![0x2A, 0x34, 0x12];
        data.extend_from_slice(&(-5i32).to_le_bytes());
        data.extend_from_slice(&1.5f32.to_le_bytes());
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 0x2A);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_i32().unwrap(), -5);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_padded_stops_at_nul() {
        let data = b"abc\0\0\0zz";
        let mut reader = BinaryReader::new(data);

        assert_eq!(reader.read_padded(6).unwrap(), b"abc");
        assert_eq!(reader.position(), 6);
    }

    #[test]
    fn test_prefixed_str() {
        let data = [0x03, 0x00, b'k', b'e', b'y'];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_prefixed_str().unwrap(), "key");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_eof_error_reports_offset() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = BinaryReader::new(&data);
        reader.advance(2).unwrap();

        match reader.read_u32() {
            Err(Error::TruncatedStream {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 4);
                assert_eq!(available, 1);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }
}
