//! Codec error type

use crate::formats::{Channel, Format};

/// Errors produced while encoding, decoding or loading compressed animation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// The requested format has no layout for this channel (e.g. `Fixed32` translations)
    #[error("format {format} is not supported for {channel} tracks")]
    UnsupportedFormat { format: Format, channel: Channel },

    /// A format discriminant outside the known set
    #[error("unknown compression format {0}")]
    UnknownFormat(u8),

    /// A key encoding discriminant outside the known set
    #[error("unknown key encoding {0}")]
    UnknownKeyEncoding(u8),

    /// An interpolation discriminant outside the known set
    #[error("unknown interpolation mode {0}")]
    UnknownInterpolation(u8),

    /// Track key count does not fit the 24-bit per-track header
    #[error("track has {0} keys, maximum is {max}", max = crate::formats::MAX_TRACK_KEYS)]
    TooManyKeys(usize),

    /// Frame count does not fit a 16-bit frame table entry
    #[error("sequence has {0} frames, maximum is 65535")]
    TooManyFrames(u32),

    /// The sequence carries no raw tracks to compress
    #[error("animation has no raw tracks")]
    NoRawData,

    /// A container or stream ended before the expected data
    #[error("buffer too short: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    /// A container passed length checks but is internally inconsistent
    #[error("malformed compressed animation: {0}")]
    Malformed(String),
}
