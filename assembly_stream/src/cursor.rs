// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chunked byte queue with commit/rollback read semantics.
//!
//! Input arrives in arbitrarily sized chunks via [`ByteCursor::push`]. Reads
//! advance a *pending* position without discarding anything; a caller that
//! completes a logical unit calls [`ByteCursor::advance`] to commit, and a
//! caller that runs out of buffered bytes mid-unit calls
//! [`ByteCursor::reset`] to roll the pending position back to the last
//! commit, then retries the whole unit once more input arrives.
//!
//! Running dry surfaces as [`ReadError::NeedMore`], a control signal distinct
//! from fatal [`DecodeError`]s: it must never abort a decode session.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;

use crate::format::{DecodeError, SlebDecoder, UlebDecoder, utf8_string};

/// A read outcome that distinguishes suspension from corruption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadError {
    /// Not enough buffered bytes; retry the unit after the next `push`.
    ///
    /// The caller must [`ByteCursor::reset`] before returning control to
    /// whatever feeds the stream.
    NeedMore,
    /// The stream is corrupt; the decode session is dead.
    Fatal(DecodeError),
}

impl From<DecodeError> for ReadError {
    fn from(e: DecodeError) -> Self {
        Self::Fatal(e)
    }
}

/// An append-only queue of byte chunks with a committed and a pending cursor.
#[derive(Clone, Debug, Default)]
pub struct ByteCursor {
    chunks: VecDeque<Vec<u8>>,
    /// Committed offset within `chunks[0]`.
    head: usize,
    /// Pending position: chunk index and offset within that chunk.
    cur_chunk: usize,
    cur_off: usize,
    /// Bytes read since the last commit.
    pending: usize,
    /// Total committed bytes since creation (absolute stream offset).
    consumed: usize,
}

impl ByteCursor {
    /// Creates an empty cursor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk. Empty chunks are ignored.
    pub fn push(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.chunks.push_back(bytes.to_vec());
        }
    }

    /// Absolute stream offset of the last commit.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Bytes read since the last commit.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Unread buffered bytes past the pending position.
    #[must_use]
    pub fn remaining(&self) -> usize {
        let total: usize = self.chunks.iter().map(Vec::len).sum();
        total - self.head - self.pending
    }

    /// Commits the pending position: everything read so far is consumed for
    /// good and fully-read chunks are released.
    pub fn advance(&mut self) {
        self.consumed += self.pending;
        for _ in 0..self.cur_chunk {
            self.chunks.pop_front();
        }
        self.cur_chunk = 0;
        self.head = self.cur_off;
        if let Some(front) = self.chunks.front() {
            if self.head >= front.len() {
                self.chunks.pop_front();
                self.head = 0;
                self.cur_off = 0;
            }
        }
        self.cur_off = self.head;
        self.pending = 0;
    }

    /// Rolls the pending position back to the last commit, as if no reads
    /// had happened since.
    pub fn reset(&mut self) {
        self.cur_chunk = 0;
        self.cur_off = self.head;
        self.pending = 0;
    }

    fn next_byte(&mut self) -> Result<u8, ReadError> {
        loop {
            let Some(chunk) = self.chunks.get(self.cur_chunk) else {
                return Err(ReadError::NeedMore);
            };
            if self.cur_off < chunk.len() {
                let b = chunk[self.cur_off];
                self.cur_off += 1;
                self.pending += 1;
                return Ok(b);
            }
            self.cur_chunk += 1;
            self.cur_off = 0;
        }
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        self.next_byte()
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> Result<u32, ReadError> {
        let mut b = [0u8; 4];
        for slot in &mut b {
            *slot = self.next_byte()?;
        }
        Ok(u32::from_le_bytes(b))
    }

    /// Reads a little-endian IEEE 754 `f32`.
    pub fn read_f32_le(&mut self) -> Result<f32, ReadError> {
        let mut b = [0u8; 4];
        for slot in &mut b {
            *slot = self.next_byte()?;
        }
        Ok(f32::from_le_bytes(b))
    }

    /// Reads a little-endian IEEE 754 `f64`.
    pub fn read_f64_le(&mut self) -> Result<f64, ReadError> {
        let mut b = [0u8; 8];
        for slot in &mut b {
            *slot = self.next_byte()?;
        }
        Ok(f64::from_le_bytes(b))
    }

    /// Reads an unsigned LEB128 varint.
    pub fn read_varint_u32(&mut self) -> Result<u32, ReadError> {
        let mut d = UlebDecoder::new();
        loop {
            let byte = self.next_byte()?;
            if let Some(v) = d.push(byte)? {
                return Ok(v);
            }
        }
    }

    /// Reads a signed LEB128 varint.
    pub fn read_varint_i32(&mut self) -> Result<i32, ReadError> {
        let mut d = SlebDecoder::new();
        loop {
            let byte = self.next_byte()?;
            if let Some(v) = d.push(byte)? {
                return Ok(v);
            }
        }
    }

    /// Reads a NUL-terminated UTF-8 string (terminator consumed, excluded).
    pub fn read_cstring(&mut self) -> Result<String, ReadError> {
        let mut bytes = Vec::new();
        loop {
            let b = self.next_byte()?;
            if b == 0 {
                return Ok(utf8_string(bytes)?);
            }
            bytes.push(b);
        }
    }
}
