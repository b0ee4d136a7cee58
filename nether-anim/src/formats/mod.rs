//! Key storage formats and bitstream primitives
//!
//! Every compressed track is a run of fixed-stride keys in one [`Format`].
//! Legacy codecs record the format once per channel at the sequence level;
//! the per-track codec stores it in a [`TrackHeader`] word in front of each track.
//!
//! # Key strides
//! ```text
//! Format            Rotation  Vector
//! None              16        12
//! Float96           12        12
//! Fixed48           6         6
//! IntervalFixed32   4 (+24)   4 (+24)      (+24: min/range bounds per multi-key track)
//! Fixed32           4         -
//! Float32           4         -
//! Identity          0         0
//! ```

mod cursor;
mod header;
mod packing;

#[cfg(test)]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

pub use cursor::{ByteOrder, ByteReader, ByteWriter};
pub use header::TrackHeader;
pub use packing::{
    ComponentFlags, IntervalBounds, QUAT_FIXED48_LOG2_MAX, VECTOR_FIXED48_LOG2_MAX,
    canonicalize_quat, compress_fixed16, decompress_fixed16, flagged_stride,
    pack_quat_fixed32, pack_quat_float32,
    pack_quat_interval, pack_reduced_float, pack_vector_interval, read_quat, read_vector,
    rebuild_quat_w, unpack_quat_fixed32, unpack_quat_float32, unpack_quat_interval,
    unpack_reduced_float, unpack_vector_interval, write_quat, write_vector,
};

/// Largest key count a per-track header can describe (24 bits)
pub const MAX_TRACK_KEYS: usize = (1 << 24) - 1;

/// Largest frame count a `u16` frame table can index
pub const MAX_FRAME_TABLE_FRAMES: u32 = u16::MAX as u32;

/// Frame tables switch from `u8` to `u16` entries above this many frames
pub const MAX_U8_FRAME_TABLE_FRAMES: u32 = 255;

/// Sentinel written when aligning key data
pub const ALIGN_PAD_BYTE: u8 = 0x55;

/// Padding written after a frame table
pub const FRAME_TABLE_PAD_BYTE: u8 = 0x00;

/// Alignment of every track start in the byte stream
pub const TRACK_ALIGNMENT: usize = 4;

/// Bytes of min/range bounds in front of a multi-key interval track
pub const INTERVAL_BOUNDS_SIZE: usize = 24;

// ============================================================================
// Format
// ============================================================================

/// Storage format of one track's keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Format {
    /// Uncompressed (quaternions keep all four components)
    None = 0,
    /// Three full floats, W rebuilt for quaternions
    #[default]
    Float96 = 1,
    /// Three 16-bit fixed-point components
    Fixed48 = 2,
    /// 32 bits quantised against per-track min/range bounds
    IntervalFixed32 = 3,
    /// 11/11/10-bit fixed point (quaternions only)
    Fixed32 = 4,
    /// 11/11/10-bit reduced floats (quaternions only)
    Float32 = 5,
    /// No data: the channel is at its rest value
    Identity = 6,
}

impl Format {
    pub const ALL: [Format; 7] = [
        Format::None,
        Format::Float96,
        Format::Fixed48,
        Format::IntervalFixed32,
        Format::Fixed32,
        Format::Float32,
        Format::Identity,
    ];

    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(CodecError::UnknownFormat(value))
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::None => "None",
            Format::Float96 => "Float96NoW",
            Format::Fixed48 => "Fixed48NoW",
            Format::IntervalFixed32 => "IntervalFixed32NoW",
            Format::Fixed32 => "Fixed32NoW",
            Format::Float32 => "Float32NoW",
            Format::Identity => "Identity",
        }
    }

    /// Bytes per rotation key
    pub const fn quat_stride(self) -> usize {
        match self {
            Format::None => 16,
            Format::Float96 => 12,
            Format::Fixed48 => 6,
            Format::IntervalFixed32 | Format::Fixed32 | Format::Float32 => 4,
            Format::Identity => 0,
        }
    }

    /// Bytes per translation/scale key, `None` for rotation-only formats
    pub const fn vector_stride(self) -> Option<usize> {
        match self {
            Format::None | Format::Float96 => Some(12),
            Format::Fixed48 => Some(6),
            Format::IntervalFixed32 => Some(4),
            Format::Identity => Some(0),
            Format::Fixed32 | Format::Float32 => None,
        }
    }

    pub const fn supports_vectors(self) -> bool {
        self.vector_stride().is_some()
    }

    /// Bytes per key for `channel`, or an error if the format has no layout for it
    pub fn stride(self, channel: Channel) -> Result<usize, CodecError> {
        match channel {
            Channel::Rotation => Ok(self.quat_stride()),
            Channel::Translation | Channel::Scale => self
                .vector_stride()
                .ok_or(CodecError::UnsupportedFormat { format: self, channel }),
        }
    }

    /// Whether a multi-key track in this format is preceded by min/range bounds
    pub const fn has_bounds(self) -> bool {
        matches!(self, Format::IntervalFixed32)
    }

    /// Whether `format_flags` select individual X/Y/Z components
    pub const fn uses_component_flags(self) -> bool {
        matches!(self, Format::Float96 | Format::Fixed48)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Key encoding / interpolation / channel
// ============================================================================

/// How keys are laid out and located in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum KeyEncoding {
    /// Keys evenly spread over the sequence, no frame tables
    #[default]
    ConstantKeyLerp = 0,
    /// Every multi-key track carries a key to frame table
    VariableKeyLerp = 1,
    /// Per-track headers, formats and optional frame tables
    PerTrack = 2,
}

impl KeyEncoding {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(KeyEncoding::ConstantKeyLerp),
            1 => Ok(KeyEncoding::VariableKeyLerp),
            2 => Ok(KeyEncoding::PerTrack),
            other => Err(CodecError::UnknownKeyEncoding(other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyEncoding::ConstantKeyLerp => "ConstantKeyLerp",
            KeyEncoding::VariableKeyLerp => "VariableKeyLerp",
            KeyEncoding::PerTrack => "PerTrackCompression",
        }
    }

    /// Number of `i32` entries per track in the scale offset table
    pub const fn scale_strip_size(self) -> usize {
        match self {
            KeyEncoding::PerTrack => 1,
            _ => 2,
        }
    }

    /// Number of `i32` entries per track in the translation/rotation offset table
    pub const fn track_strip_size(self) -> usize {
        match self {
            KeyEncoding::PerTrack => 2,
            _ => 4,
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Playback interpolation between bracketing keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Interpolation {
    #[default]
    Linear = 0,
    /// Hold the lower key
    Step = 1,
}

impl Interpolation {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(Interpolation::Linear),
            1 => Ok(Interpolation::Step),
            other => Err(CodecError::UnknownInterpolation(other)),
        }
    }
}

/// Which part of a bone transform a track animates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Translation,
    Rotation,
    Scale,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Translation => "translation",
            Channel::Rotation => "rotation",
            Channel::Scale => "scale",
        })
    }
}

/// Sequence-level formats of the legacy codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFormats {
    pub translation: Format,
    pub rotation: Format,
    pub scale: Format,
}

impl Default for ChannelFormats {
    fn default() -> Self {
        Self {
            translation: Format::None,
            rotation: Format::Float96,
            scale: Format::None,
        }
    }
}

impl ChannelFormats {
    pub const fn new(translation: Format, rotation: Format, scale: Format) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Rejects combinations the legacy layout cannot express
    pub fn validate_legacy(&self) -> Result<(), CodecError> {
        for (format, channel) in [
            (self.translation, Channel::Translation),
            (self.rotation, Channel::Rotation),
            (self.scale, Channel::Scale),
        ] {
            if format == Format::Identity {
                return Err(CodecError::UnsupportedFormat { format, channel });
            }
            format.stride(channel)?;
        }
        Ok(())
    }
}

/// Width of one frame table entry for a sequence of `num_frames`
#[inline]
pub const fn frame_table_entry_size(num_frames: u32) -> usize {
    if num_frames > MAX_U8_FRAME_TABLE_FRAMES { 2 } else { 1 }
}
