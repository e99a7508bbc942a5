// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! LEB128 varint codecs specialized for the format's 32-bit integer widths.
//!
//! Decoding is byte-at-a-time so the cursor can suspend mid-varint when the
//! buffer runs dry: feed bytes into a decoder until it yields a value. A
//! continuation bit on a fifth-and-final byte is a hard error (corruption,
//! not truncation), as are value bits beyond 32.

use alloc::vec::Vec;

use super::DecodeError;

/// Maximum encoded length of a 32-bit varint.
const MAX_BYTES: u32 = 5;

/// Incremental unsigned LEB128 decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct UlebDecoder {
    value: u32,
    shift: u32,
}

impl UlebDecoder {
    /// Creates a fresh decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte; returns `Some(value)` once the varint is complete.
    pub fn push(&mut self, byte: u8) -> Result<Option<u32>, DecodeError> {
        if self.shift >= 7 * MAX_BYTES {
            return Err(DecodeError::VarintTooLong);
        }
        let group = u32::from(byte & 0x7f);
        // The fifth byte contributes bits 28..34; anything above bit 31 must
        // be zero for the value to fit.
        if self.shift == 28 && group > 0xf {
            return Err(DecodeError::VarintOverflow);
        }
        self.value |= group << self.shift;
        self.shift += 7;
        if byte & 0x80 == 0 {
            Ok(Some(self.value))
        } else {
            Ok(None)
        }
    }
}

/// Incremental signed LEB128 decoder (used for switch-case labels).
#[derive(Clone, Copy, Debug, Default)]
pub struct SlebDecoder {
    value: u32,
    shift: u32,
}

impl SlebDecoder {
    /// Creates a fresh decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte; returns `Some(value)` once the varint is complete.
    pub fn push(&mut self, byte: u8) -> Result<Option<i32>, DecodeError> {
        if self.shift >= 7 * MAX_BYTES {
            return Err(DecodeError::VarintTooLong);
        }
        let group = u32::from(byte & 0x7f);
        if self.shift == 28 {
            // Bits 28..31 plus the sign; the upper three value bits of the
            // final group must agree with the sign bit.
            let sign_bits = (byte >> 3) & 0xf;
            if sign_bits != 0 && sign_bits != 0xf {
                return Err(DecodeError::VarintOverflow);
            }
        }
        self.value |= group << self.shift;
        self.shift += 7;
        if byte & 0x80 == 0 {
            let mut v = self.value;
            if self.shift < 32 && byte & 0x40 != 0 {
                v |= u32::MAX << self.shift;
            }
            Ok(Some(v as i32))
        } else {
            Ok(None)
        }
    }
}

/// Appends the minimal unsigned LEB128 encoding of `v`.
pub fn write_uleb128_u32(out: &mut Vec<u8>, mut v: u32) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Appends the minimal signed LEB128 encoding of `v`.
pub fn write_sleb128_i32(out: &mut Vec<u8>, v: i32) {
    let mut v = i64::from(v);
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (v == 0 && sign_clear) || (v == -1 && !sign_clear) {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn decode_u32(bytes: &[u8]) -> Result<(u32, usize), DecodeError> {
        let mut d = UlebDecoder::new();
        for (i, &b) in bytes.iter().enumerate() {
            if let Some(v) = d.push(b)? {
                return Ok((v, i + 1));
            }
        }
        panic!("varint truncated in test input");
    }

    fn decode_i32(bytes: &[u8]) -> Result<(i32, usize), DecodeError> {
        let mut d = SlebDecoder::new();
        for (i, &b) in bytes.iter().enumerate() {
            if let Some(v) = d.push(b)? {
                return Ok((v, i + 1));
            }
        }
        panic!("varint truncated in test input");
    }

    #[test]
    fn uleb_roundtrip_is_minimal() {
        for v in [
            0u32,
            1,
            0x7f,
            0x80,
            0x3fff,
            0x4000,
            0x001f_ffff,
            0x0020_0000,
            0x0fff_ffff,
            0x1000_0000,
            u32::MAX,
        ] {
            let mut bytes = Vec::new();
            write_uleb128_u32(&mut bytes, v);
            let expected_len = match v {
                0..=0x7f => 1,
                0x80..=0x3fff => 2,
                0x4000..=0x001f_ffff => 3,
                0x0020_0000..=0x0fff_ffff => 4,
                _ => 5,
            };
            assert_eq!(bytes.len(), expected_len, "non-minimal encoding of {v}");
            assert_eq!(decode_u32(&bytes).unwrap(), (v, bytes.len()));
        }
    }

    #[test]
    fn uleb_accepts_redundant_but_in_range_encodings() {
        // 0 written with a redundant continuation byte.
        assert_eq!(decode_u32(&[0x80, 0x00]).unwrap(), (0, 2));
    }

    #[test]
    fn uleb_rejects_sixth_byte() {
        let err = decode_u32(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).unwrap_err();
        assert_eq!(err, DecodeError::VarintTooLong);
    }

    #[test]
    fn uleb_rejects_overflow_bits() {
        // Fifth byte carries bits above 31.
        let err = decode_u32(&[0xff, 0xff, 0xff, 0xff, 0x1f]).unwrap_err();
        assert_eq!(err, DecodeError::VarintOverflow);
        // u32::MAX itself is fine.
        assert_eq!(
            decode_u32(&[0xff, 0xff, 0xff, 0xff, 0x0f]).unwrap(),
            (u32::MAX, 5)
        );
    }

    #[test]
    fn sleb_roundtrip() {
        for v in [0i32, 1, -1, 63, 64, -64, -65, 8191, -8192, i32::MAX, i32::MIN] {
            let mut bytes = Vec::new();
            write_sleb128_i32(&mut bytes, v);
            assert_eq!(decode_i32(&bytes).unwrap(), (v, bytes.len()), "value {v}");
        }
    }

    #[test]
    fn sleb_single_byte_forms() {
        let mut bytes = Vec::new();
        write_sleb128_i32(&mut bytes, -1);
        assert_eq!(bytes, [0x7f]);
        bytes.clear();
        write_sleb128_i32(&mut bytes, 1);
        assert_eq!(bytes, [0x01]);
    }
}
