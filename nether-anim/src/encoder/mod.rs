//! Bitstream encoders
//!
//! Both encoders write every track through one [`ByteWriter`], starting each
//! track on a 4-byte boundary.
//!
//! # Track layout
//! ```text
//! legacy      [bounds?][keys][pad 0x55][frame table?][pad 0x00]
//! per-track   [TrackHeader][bounds?][keys][pad 0x55][frame table?][pad 0x00]
//! ```
//!
//! Single-key tracks are always stored as Float96, without bounds or a frame table.

mod legacy;
mod per_track;

#[cfg(test)]
mod tests;

use glam::{Quat, Vec3};
use tracing::warn;

use crate::error::CodecError;
use crate::formats::{
    ALIGN_PAD_BYTE, ByteReader, ByteWriter, ComponentFlags, FRAME_TABLE_PAD_BYTE, Format,
    Interpolation, IntervalBounds, MAX_FRAME_TABLE_FRAMES, MAX_U8_FRAME_TABLE_FRAMES,
    TRACK_ALIGNMENT, canonicalize_quat, read_quat, read_vector, write_quat, write_vector,
};
use crate::sequence::AnimSequence;
use crate::track::{Track, TrackValue};

pub use legacy::encode_legacy;
pub use per_track::{PerTrackEncoding, encode_per_track};

/// Sequence properties every encoder needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceInfo {
    pub num_frames: u32,
    pub sequence_length: f32,
    pub interpolation: Interpolation,
}

impl From<&AnimSequence> for SequenceInfo {
    fn from(seq: &AnimSequence) -> Self {
        Self {
            num_frames: seq.num_frames,
            sequence_length: seq.sequence_length,
            interpolation: seq.interpolation,
        }
    }
}

// ============================================================================
// Key codec
// ============================================================================

/// Format-generic key packing for vector and quaternion tracks
pub(crate) trait KeyCodec: TrackValue {
    const IS_ROTATION: bool;

    fn bounds(keys: &[Self]) -> IntervalBounds;

    /// X/Y/Z components with any magnitude above `threshold`
    fn component_mask(keys: &[Self], threshold: f32) -> ComponentFlags;

    fn write(
        writer: &mut ByteWriter,
        format: Format,
        flags: ComponentFlags,
        bounds: &IntervalBounds,
        value: Self,
    );

    fn read(
        reader: &mut ByteReader<'_>,
        format: Format,
        flags: ComponentFlags,
        bounds: &IntervalBounds,
    ) -> Self;
}

fn mask_from(components: impl Iterator<Item = Vec3>, threshold: f32) -> ComponentFlags {
    let max = components.fold(Vec3::ZERO, |acc, v| acc.max(v.abs()));
    ComponentFlags::AXES
        .into_iter()
        .enumerate()
        .filter(|&(axis, _)| max[axis] > threshold)
        .fold(ComponentFlags::empty(), |mask, (_, flag)| mask | flag)
}

impl KeyCodec for Vec3 {
    const IS_ROTATION: bool = false;

    fn bounds(keys: &[Self]) -> IntervalBounds {
        IntervalBounds::from_vectors(keys.iter().copied())
    }

    fn component_mask(keys: &[Self], threshold: f32) -> ComponentFlags {
        mask_from(keys.iter().copied(), threshold)
    }

    fn write(
        writer: &mut ByteWriter,
        format: Format,
        flags: ComponentFlags,
        bounds: &IntervalBounds,
        value: Self,
    ) {
        write_vector(writer, format, flags, bounds, value);
    }

    fn read(
        reader: &mut ByteReader<'_>,
        format: Format,
        flags: ComponentFlags,
        bounds: &IntervalBounds,
    ) -> Self {
        read_vector(reader, format, flags, bounds)
    }
}

impl KeyCodec for Quat {
    const IS_ROTATION: bool = true;

    fn bounds(keys: &[Self]) -> IntervalBounds {
        IntervalBounds::from_quats(keys.iter().copied())
    }

    fn component_mask(keys: &[Self], threshold: f32) -> ComponentFlags {
        mask_from(
            keys.iter().map(|&q| {
                let q = canonicalize_quat(q);
                Vec3::new(q.x, q.y, q.z)
            }),
            threshold,
        )
    }

    fn write(
        writer: &mut ByteWriter,
        format: Format,
        flags: ComponentFlags,
        bounds: &IntervalBounds,
        value: Self,
    ) {
        write_quat(writer, format, flags, bounds, value);
    }

    fn read(
        reader: &mut ByteReader<'_>,
        format: Format,
        flags: ComponentFlags,
        bounds: &IntervalBounds,
    ) -> Self {
        read_quat(reader, format, flags, bounds)
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Converts a stream position into an offset table entry
fn offset_entry(position: usize) -> Result<i32, CodecError> {
    i32::try_from(position)
        .map_err(|_| CodecError::Malformed(format!("byte stream offset {position} exceeds i32")))
}

/// Pads the keys, then writes the key to frame table and its padding
fn write_frame_table<T: TrackValue>(
    writer: &mut ByteWriter,
    track: &Track<T>,
    info: &SequenceInfo,
) -> Result<(), CodecError> {
    if info.num_frames > MAX_FRAME_TABLE_FRAMES {
        return Err(CodecError::TooManyFrames(info.num_frames));
    }
    writer.align(TRACK_ALIGNMENT, ALIGN_PAD_BYTE);
    for frame in track.frame_indices(info.num_frames, info.sequence_length) {
        if info.num_frames > MAX_U8_FRAME_TABLE_FRAMES {
            writer.write_u16(frame as u16);
        } else {
            writer.write_u8(frame as u8);
        }
    }
    writer.align(TRACK_ALIGNMENT, FRAME_TABLE_PAD_BYTE);
    Ok(())
}

/// Track `index` of `channel`, or the constant `rest` track if it is missing or empty
fn track_or_rest<'a, T: TrackValue>(
    channel: &'a [Track<T>],
    index: usize,
    rest: &'a Track<T>,
) -> &'a Track<T> {
    match channel.get(index) {
        Some(track) if !track.is_empty() => track,
        _ => {
            warn!(track = index, "missing or empty track, using rest value");
            rest
        }
    }
}
