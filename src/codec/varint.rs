//! Zig-zag variable-length integer encoding.
//!
//! Signed values are zig-zag mapped (0, -1, 1, -2, ... → 0, 1, 2, 3, ...)
//! and then written as base-128 varints, 7 data bits per byte with the high
//! bit as a continuation flag. This is the integer encoding the rest of the
//! wire formats build on.

use bytes::{BufMut, BytesMut};

use crate::{Error, Result};

/// Maximum encoded length of an `i64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Writes a zig-zag varint to the buffer, returning the number of bytes
/// written (1-10).
pub fn write_varint(buf: &mut BytesMut, value: i64) -> usize {
    let mut val = zigzag(value);
    let mut count = 1;
    while (val & !0x7F) != 0 {
        buf.put_u8((val & 0x7F) as u8 | 0x80);
        val >>= 7;
        count += 1;
    }
    buf.put_u8(val as u8);
    count
}

/// Reads a zig-zag varint from the front of `data`, advancing it past the
/// consumed bytes.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the input ends mid-varint or the varint
/// overflows 64 bits.
pub fn read_varint(data: &mut &[u8]) -> Result<i64> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN || (i == MAX_VARINT_LEN - 1 && byte & 0xFE != 0) {
            return Err(Error::Encoding("varint overflows 64 bits".to_string()));
        }
        val |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            *data = &data[i + 1..];
            return Ok(unzigzag(val));
        }
    }
    Err(Error::Encoding("truncated varint".to_string()))
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
