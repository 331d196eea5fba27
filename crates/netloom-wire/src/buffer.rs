//! Cursor-based reads and writes of the primitive wire types over a plain byte slice.
//!
//! Every read advances the cursor by exactly the bytes consumed on success. On failure
//! the cursor is driven to the end of the buffer so a caller that ignores the error still
//! sees no further partial data on a subsequent read.

use crate::error::{WireError, WireResult};
use byteorder::{BigEndian, ByteOrder};

/// Read-only cursor over a byte slice, advancing as values are decoded.
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    #[inline]
    pub fn new(buf: &'a [u8]) -> ReadCursor<'a> {
        ReadCursor { buf, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    fn require(&mut self, need: usize) -> WireResult<()> {
        if self.remaining() < need {
            self.pos = self.buf.len();
            return Err(WireError::BufferTooSmall {
                need,
                have: self.remaining(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn read_u8(&mut self) -> WireResult<u8> {
        self.require(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    #[inline]
    pub fn read_u16(&mut self) -> WireResult<u16> {
        self.require(2)?;
        let v = BigEndian::read_u16(&self.buf[self.pos..]);
        self.pos += 2;
        Ok(v)
    }

    #[inline]
    pub fn read_u32(&mut self) -> WireResult<u32> {
        self.require(4)?;
        let v = BigEndian::read_u32(&self.buf[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    #[inline]
    pub fn read_u64(&mut self) -> WireResult<u64> {
        self.require(8)?;
        let v = BigEndian::read_u64(&self.buf[self.pos..]);
        self.pos += 8;
        Ok(v)
    }

    /// Reads a 32-bit length prefix followed by that many bytes of UTF-8.
    pub fn read_string(&mut self) -> WireResult<String> {
        let len = self.read_u32()? as usize;
        if self.remaining() < len {
            self.pos = self.buf.len();
            return Err(WireError::OutOfBounds);
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        let s = std::str::from_utf8(bytes)
            .map_err(|_| {
                self.pos = self.buf.len();
                WireError::OutOfBounds
            })?
            .to_owned();
        self.pos += len;
        Ok(s)
    }

    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> WireResult<&'a [u8]> {
        self.require(len)?;
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

/// Mutable cursor over a byte slice used to serialize the primitive wire types.
pub struct WriteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    #[inline]
    pub fn new(buf: &'a mut [u8]) -> WriteCursor<'a> {
        WriteCursor { buf, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    fn require(&mut self, need: usize) -> WireResult<()> {
        if self.buf.len() - self.pos < need {
            self.pos = self.buf.len();
            return Err(WireError::BufferTooSmall {
                need,
                have: self.buf.len() - self.pos,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn write_u8(&mut self, v: u8) -> WireResult<()> {
        self.require(1)?;
        self.buf[self.pos] = v;
        self.pos += 1;
        Ok(())
    }

    #[inline]
    pub fn write_u16(&mut self, v: u16) -> WireResult<()> {
        self.require(2)?;
        BigEndian::write_u16(&mut self.buf[self.pos..], v);
        self.pos += 2;
        Ok(())
    }

    #[inline]
    pub fn write_u32(&mut self, v: u32) -> WireResult<()> {
        self.require(4)?;
        BigEndian::write_u32(&mut self.buf[self.pos..], v);
        self.pos += 4;
        Ok(())
    }

    #[inline]
    pub fn write_u64(&mut self, v: u64) -> WireResult<()> {
        self.require(8)?;
        BigEndian::write_u64(&mut self.buf[self.pos..], v);
        self.pos += 8;
        Ok(())
    }

    pub fn write_string(&mut self, s: &str) -> WireResult<()> {
        self.write_u32(s.len() as u32)?;
        self.write_bytes(s.as_bytes())
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> WireResult<()> {
        self.require(bytes.len())?;
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}

/// Encoded length of a length-prefixed string, for pre-sizing a payload buffer.
#[inline]
pub fn string_len(s: &str) -> usize {
    4 + s.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_integers() {
        let mut buf = [0u8; 15];
        let mut w = WriteCursor::new(&mut buf);
        w.write_u8(7).unwrap();
        w.write_u16(1000).unwrap();
        w.write_u32(1_000_000).unwrap();
        w.write_u64(u64::MAX).unwrap();

        let mut r = ReadCursor::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u16().unwrap(), 1000);
        assert_eq!(r.read_u32().unwrap(), 1_000_000);
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
    }

    #[test]
    fn roundtrip_string() {
        let mut buf = [0u8; 64];
        let mut w = WriteCursor::new(&mut buf);
        w.write_string("hello protocol").unwrap();

        let mut r = ReadCursor::new(&buf);
        assert_eq!(r.read_string().unwrap(), "hello protocol");
    }

    #[test]
    fn read_out_of_bounds_drains_cursor() {
        let buf = [0u8; 2];
        let mut r = ReadCursor::new(&buf);
        assert!(r.read_u32().is_err());
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn read_string_rejects_length_beyond_buffer() {
        let mut buf = [0u8; 8];
        BigEndian::write_u32(&mut buf, 1000);
        let mut r = ReadCursor::new(&buf);
        assert_eq!(r.read_string().unwrap_err(), WireError::OutOfBounds);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn write_out_of_bounds_drains_cursor() {
        let mut buf = [0u8; 1];
        let mut w = WriteCursor::new(&mut buf);
        assert!(w.write_u32(1).is_err());
    }
}
