//! A small positional, little-endian byte cursor
//!
//! X3F is little-endian throughout and the whole file is read into memory
//! before parsing (`spec.md` §5), so unlike `zune_core::bytestream::ZReader`
//! this cursor only needs to support one backing type, `&[u8]`, and one
//! endianness.
use crate::errors::{Result, X3fError};

#[derive(Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        ByteCursor { data, pos }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Borrow the rest of the buffer from the current position without
    /// advancing the cursor.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(X3fError::TruncatedStream);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let b = self.read_exact(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.read_exact(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_f32_le(&mut self) -> Result<f32> {
        let b = self.read_exact(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_fourcc(&mut self) -> Result<u32> {
        self.read_u32_le()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_le_integers() {
        let data = [0x01, 0x00, 0x00, 0x00, 0x34, 0x12];
        let mut cur = ByteCursor::new(&data);
        assert_eq!(cur.read_u32_le().unwrap(), 1);
        assert_eq!(cur.read_u16_le().unwrap(), 0x1234);
    }

    #[test]
    fn truncated_read_errors() {
        let data = [0x00, 0x01];
        let mut cur = ByteCursor::new(&data);
        assert!(matches!(cur.read_u32_le(), Err(X3fError::TruncatedStream)));
    }
}
