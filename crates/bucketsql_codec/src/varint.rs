//! Variable-length integers used as segment length prefixes.
//!
//! The format is the compact-size encoding used by Bitcoin wire messages:
//!
//! | value range              | bytes                     |
//! |--------------------------|---------------------------|
//! | `0..=0xfc`               | the value itself          |
//! | `0xfd..=0xffff`          | `0xfd` + u16 little-endian |
//! | `0x1_0000..=0xffff_ffff` | `0xfe` + u32 little-endian |
//! | larger                   | `0xff` + u64 little-endian |
//!
//! Only the shortest form is accepted on decode, so every value has exactly
//! one encoding.

use crate::error::{CodecError, CodecResult};

const MARKER_U16: u8 = 0xfd;
const MARKER_U32: u8 = 0xfe;
const MARKER_U64: u8 = 0xff;

/// Returns the number of bytes `value` occupies when encoded.
#[inline]
#[must_use]
pub const fn encoded_len(value: u64) -> usize {
    if value < MARKER_U16 as u64 {
        1
    } else if value <= 0xffff {
        3
    } else if value <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Appends the shortest encoding of `value` to `out`.
pub fn write_varint(out: &mut Vec<u8>, value: u64) {
    if value < u64::from(MARKER_U16) {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(MARKER_U16);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(MARKER_U32);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(MARKER_U64);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Appends `bytes` prefixed by its length.
pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.reserve(encoded_len(bytes.len() as u64) + bytes.len());
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// A cursor over encoded bytes.
#[derive(Debug, Clone)]
pub struct VarReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> VarReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns true once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Returns the current read offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::IntegerOverflow)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Reads one variable-length integer.
    ///
    /// # Errors
    ///
    /// Fails on truncated input or a non-minimal encoding.
    pub fn read_varint(&mut self) -> CodecResult<u64> {
        let marker = self.read_byte()?;
        let (value, width, min) = match marker {
            MARKER_U16 => {
                let b = self.read_bytes(2)?;
                (u64::from(u16::from_le_bytes([b[0], b[1]])), 3, u64::from(MARKER_U16))
            }
            MARKER_U32 => {
                let b = self.read_bytes(4)?;
                (
                    u64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                    5,
                    0x1_0000,
                )
            }
            MARKER_U64 => {
                let b = self.read_bytes(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(b);
                (u64::from_le_bytes(buf), 9, 0x1_0000_0000)
            }
            small => return Ok(u64::from(small)),
        };
        if value < min {
            return Err(CodecError::NonCanonicalLength { value, width });
        }
        Ok(value)
    }

    /// Reads one length-prefixed byte string.
    ///
    /// # Errors
    ///
    /// Fails if the prefix is malformed or the payload is truncated.
    pub fn read_var_bytes(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| CodecError::IntegerOverflow)?;
        self.read_bytes(len)
    }
}
