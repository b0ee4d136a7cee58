//! Byte-order aware stream writer and reader
//!
//! The key stream is written in the configured [`ByteOrder`]; the byteorder
//! crate does the actual swapping.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Byte order of multi-byte values inside a compressed byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ByteOrder {
    #[default]
    Little = 0,
    Big = 1,
}

impl ByteOrder {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(ByteOrder::Little),
            1 => Ok(ByteOrder::Big),
            other => Err(CodecError::Malformed(format!("unknown byte order {other}"))),
        }
    }

    /// Byte order of the running platform
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Appends values to a growable buffer in a fixed byte order
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
    order: ByteOrder,
}

impl ByteWriter {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            buf: Vec::new(),
            order,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Current write offset
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        let written = match self.order {
            ByteOrder::Little => self.buf.write_u16::<LittleEndian>(value),
            ByteOrder::Big => self.buf.write_u16::<BigEndian>(value),
        };
        debug_assert!(written.is_ok(), "Vec writes are infallible");
    }

    pub fn write_u32(&mut self, value: u32) {
        let written = match self.order {
            ByteOrder::Little => self.buf.write_u32::<LittleEndian>(value),
            ByteOrder::Big => self.buf.write_u32::<BigEndian>(value),
        };
        debug_assert!(written.is_ok(), "Vec writes are infallible");
    }

    pub fn write_f32(&mut self, value: f32) {
        let written = match self.order {
            ByteOrder::Little => self.buf.write_f32::<LittleEndian>(value),
            ByteOrder::Big => self.buf.write_f32::<BigEndian>(value),
        };
        debug_assert!(written.is_ok(), "Vec writes are infallible");
    }

    /// Pads with `pad` until the position is a multiple of `alignment`
    pub fn align(&mut self, alignment: usize, pad: u8) {
        debug_assert!(alignment.is_power_of_two());
        while self.buf.len() % alignment != 0 {
            self.buf.push(pad);
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Sequential reader over a compressed byte stream.
///
/// The decoder trusts encoder output: reading past the end trips a debug
/// assertion and yields zeroes in release builds instead of panicking.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], order: ByteOrder) -> Self {
        Self {
            data,
            pos: 0,
            order,
        }
    }

    /// Reader positioned at `pos`
    pub fn at(data: &'a [u8], pos: usize, order: ByteOrder) -> Self {
        Self { data, pos, order }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip(&mut self, count: usize) {
        self.pos += count;
    }

    /// Skips forward to the next multiple of `alignment`
    pub fn align(&mut self, alignment: usize) {
        debug_assert!(alignment.is_power_of_two());
        self.pos = (self.pos + alignment - 1) & !(alignment - 1);
    }

    /// Next `count` bytes, or zeroes when the stream is too short
    #[inline]
    fn take(&mut self, count: usize) -> &'a [u8] {
        static ZEROES: [u8; 4] = [0; 4];
        let start = self.pos;
        self.pos += count;
        match self.data.get(start..start + count) {
            Some(bytes) => bytes,
            None => {
                debug_assert!(
                    false,
                    "read of {count} bytes at {start} past end of {}-byte stream",
                    self.data.len()
                );
                &ZEROES[..count]
            }
        }
    }

    #[inline]
    pub fn read_u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    #[inline]
    pub fn read_u16(&mut self) -> u16 {
        let bytes = self.take(2);
        match self.order {
            ByteOrder::Little => LittleEndian::read_u16(bytes),
            ByteOrder::Big => BigEndian::read_u16(bytes),
        }
    }

    #[inline]
    pub fn read_u32(&mut self) -> u32 {
        let bytes = self.take(4);
        match self.order {
            ByteOrder::Little => LittleEndian::read_u32(bytes),
            ByteOrder::Big => BigEndian::read_u32(bytes),
        }
    }

    #[inline]
    pub fn read_f32(&mut self) -> f32 {
        let bytes = self.take(4);
        match self.order {
            ByteOrder::Little => LittleEndian::read_f32(bytes),
            ByteOrder::Big => BigEndian::read_f32(bytes),
        }
    }

    /// Reads a `u32` without moving the cursor
    #[inline]
    pub fn peek_u32(&self) -> u32 {
        let mut copy = *self;
        copy.read_u32()
    }
}
