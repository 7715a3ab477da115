//! Bounds-checked little-endian cursor over a borrowed byte buffer.
//!
//! Every read checks `remaining()` before touching `bytes::Buf`, so a short
//! buffer surfaces as `TruncatedFile` instead of a panic.

use super::errors::{DbError, Result};
use bytes::Buf;

#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty, $get:ident) => {
        #[inline(always)]
        pub fn $name(&mut self) -> Result<$ty> {
            let mut chunk = self.take(std::mem::size_of::<$ty>())?;
            Ok(chunk.$get())
        }
    };
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(DbError::TruncatedFile {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    /// Bytes up to (not including) the next NUL; the cursor ends just past the NUL.
    pub fn take_cstr(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                self.pos += end + 1;
                Ok(&rest[..end])
            }
            None => Err(DbError::TruncatedFile {
                offset: self.pos,
                needed: rest.len() + 1,
                available: rest.len(),
            }),
        }
    }

    read_le!(read_u8, u8, get_u8);
    read_le!(read_i8, i8, get_i8);
    read_le!(read_u16, u16, get_u16_le);
    read_le!(read_i16, i16, get_i16_le);
    read_le!(read_u32, u32, get_u32_le);
    read_le!(read_i32, i32, get_i32_le);
    read_le!(read_u64, u64, get_u64_le);
    read_le!(read_i64, i64, get_i64_le);
    read_le!(read_f32, f32, get_f32_le);
    read_le!(read_f64, f64, get_f64_le);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian() {
        let bytes = [0x01, 0x00, 0x00, 0x00, 0xff, 0xff];
        let mut cur = ByteCursor::new(&bytes);
        assert_eq!(cur.read_u32().unwrap(), 1);
        assert_eq!(cur.read_i16().unwrap(), -1);
        assert!(cur.is_empty());
    }

    #[test]
    fn short_read_is_truncation() {
        let bytes = [0u8; 3];
        let mut cur = ByteCursor::new(&bytes);
        match cur.read_u32() {
            Err(DbError::TruncatedFile {
                offset,
                needed,
                available,
            }) => {
                assert_eq!((offset, needed, available), (0, 4, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
        // position untouched after a failed read
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn cstr_stops_after_nul() {
        let bytes = b"abc\0de\0";
        let mut cur = ByteCursor::new(bytes);
        assert_eq!(cur.take_cstr().unwrap(), b"abc");
        assert_eq!(cur.position(), 4);
        assert_eq!(cur.take_cstr().unwrap(), b"de");
        assert!(cur.is_empty());
    }

    #[test]
    fn unterminated_cstr_is_truncation() {
        let mut cur = ByteCursor::new(b"abc");
        assert!(matches!(
            cur.take_cstr(),
            Err(DbError::TruncatedFile { .. })
        ));
    }
}
