//! Per-track header word of the per-track codec

use super::{Format, MAX_TRACK_KEYS};
use crate::error::CodecError;

/// Packed 32-bit track header
///
/// ```text
/// bits 28..32  key_format        Format discriminant
/// bit  27      has_frame_table   key to frame table follows the keys
/// bits 24..27  format_flags      X/Y/Z present mask, or interval pair count
/// bits  0..24  num_keys
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackHeader {
    pub key_format: Format,
    pub has_frame_table: bool,
    pub format_flags: u8,
    pub num_keys: u32,
}

impl TrackHeader {
    pub const SIZE: usize = 4;

    pub fn new(
        key_format: Format,
        format_flags: u8,
        num_keys: usize,
        has_frame_table: bool,
    ) -> Result<Self, CodecError> {
        if num_keys > MAX_TRACK_KEYS {
            return Err(CodecError::TooManyKeys(num_keys));
        }
        Ok(Self {
            key_format,
            has_frame_table,
            format_flags: format_flags & 0x7,
            num_keys: num_keys as u32,
        })
    }

    /// Pack into the header word
    pub fn to_u32(&self) -> u32 {
        ((self.key_format as u32) << 28)
            | (u32::from(self.has_frame_table) << 27)
            | (u32::from(self.format_flags & 0x7) << 24)
            | (self.num_keys & MAX_TRACK_KEYS as u32)
    }

    /// Unpack a header word, rejecting unknown formats
    pub fn from_u32(word: u32) -> Result<Self, CodecError> {
        Ok(Self {
            key_format: Format::from_u8((word >> 28) as u8)?,
            has_frame_table: (word >> 27) & 1 == 1,
            format_flags: ((word >> 24) & 0x7) as u8,
            num_keys: word & MAX_TRACK_KEYS as u32,
        })
    }

    /// Number of (min, range) pairs in front of an interval track
    pub fn interval_pair_count(&self) -> usize {
        if self.key_format.has_bounds() && self.num_keys > 1 {
            self.format_flags as usize
        } else {
            0
        }
    }
}
