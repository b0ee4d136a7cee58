//! Run-time sampling of compressed animation
//!
//! Sampling is a pure function of the compressed bytes and a time. It never
//! allocates and never fails: the byte stream is trusted, and a malformed
//! stream trips debug assertions (release builds read zeroes).
//!
//! # Key lookup
//! ```text
//! relative = clamp(time / sequence_length, 0, 1)
//!
//! uniform      key_pos = relative * (num_keys - 1)
//!              low = floor(key_pos), high = min(low + 1, num_keys - 1)
//!
//! frame table  target = relative * (num_frames - 1)
//!              estimate an index, walk a few entries, then bisect
//!              alpha = (target - frame[low]) / (frame[high] - frame[low])
//! ```

use glam::{Quat, Vec3};

use crate::compressed::CompressedAnimation;
use crate::error::CodecError;
use crate::formats::{
    ByteReader, Channel, ComponentFlags, Format, INTERVAL_BOUNDS_SIZE, Interpolation,
    IntervalBounds, KeyEncoding, TRACK_ALIGNMENT, TrackHeader, flagged_stride,
    frame_table_entry_size, read_quat, read_vector,
};
use crate::math::Transform;

/// Entries walked from the index estimate before falling back to bisection
const MAX_WALK: usize = 4;

/// Maps a skeleton bone to the track that animates it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneTrackPair {
    pub bone: usize,
    pub track: usize,
}

/// Location and layout of one encoded track inside the byte stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackView {
    pub channel: Channel,
    pub format: Format,
    /// Stored X/Y/Z components, all of them for formats without flags
    pub components: ComponentFlags,
    pub num_keys: u32,
    /// First byte of the track (header or bounds)
    pub start: usize,
    /// Interval (min, range) pairs stored in front of the keys
    pub interval_pairs: usize,
    pub keys_offset: usize,
    pub has_frame_table: bool,
}

impl TrackView {
    pub fn key_stride(&self) -> usize {
        flagged_stride(self.format, self.components, self.channel == Channel::Rotation)
    }

    fn keys_end(&self) -> usize {
        self.keys_offset + self.num_keys as usize * self.key_stride()
    }

    fn frame_table_offset(&self) -> usize {
        align_up(self.keys_end(), TRACK_ALIGNMENT)
    }

    /// One past the last byte of the track, frame table and padding included
    pub fn end(&self, num_frames: u32) -> usize {
        if self.has_frame_table {
            let table = self.num_keys as usize * frame_table_entry_size(num_frames);
            align_up(self.frame_table_offset() + table, TRACK_ALIGNMENT)
        } else {
            align_up(self.keys_end(), TRACK_ALIGNMENT)
        }
    }

    fn bounds(&self, data: &[u8], anim: &CompressedAnimation) -> IntervalBounds {
        let mut bounds = IntervalBounds::default();
        if self.interval_pairs == 0 {
            return bounds;
        }
        let start = self.keys_offset - self.interval_pairs * 8;
        let mut reader = ByteReader::at(data, start, anim.byte_order);
        for axis in 0..self.interval_pairs.min(3) {
            bounds.min[axis] = reader.read_f32();
            bounds.range[axis] = reader.read_f32();
        }
        bounds
    }
}

#[inline]
fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

fn legacy_format(anim: &CompressedAnimation, channel: Channel) -> Format {
    match channel {
        Channel::Translation => anim.formats.translation,
        Channel::Rotation => anim.formats.rotation,
        Channel::Scale => anim.formats.scale,
    }
}

/// Resolves where `track`'s `channel` lives in the byte stream.
///
/// `Ok(None)` means the channel holds no data and samples as its rest value.
pub fn track_view(
    anim: &CompressedAnimation,
    track: usize,
    channel: Channel,
) -> Result<Option<TrackView>, CodecError> {
    let entry = |table: &[i32], index: usize| {
        table.get(index).copied().ok_or_else(|| {
            CodecError::Malformed(format!("no offset entry {index} for {channel} track {track}"))
        })
    };

    match anim.key_encoding {
        KeyEncoding::ConstantKeyLerp | KeyEncoding::VariableKeyLerp => {
            let (offset, count) = match channel {
                Channel::Translation => (
                    entry(&anim.track_offsets, track * 4)?,
                    entry(&anim.track_offsets, track * 4 + 1)?,
                ),
                Channel::Rotation => (
                    entry(&anim.track_offsets, track * 4 + 2)?,
                    entry(&anim.track_offsets, track * 4 + 3)?,
                ),
                Channel::Scale => {
                    if anim.scale_offsets.is_empty() {
                        return Ok(None);
                    }
                    (
                        entry(&anim.scale_offsets, track * 2)?,
                        entry(&anim.scale_offsets, track * 2 + 1)?,
                    )
                }
            };
            if offset < 0 || count <= 0 {
                return Err(CodecError::Malformed(format!(
                    "{channel} track {track} has offset {offset} and {count} keys"
                )));
            }
            let start = offset as usize;
            let num_keys = count as u32;
            let (format, interval_pairs) = if num_keys == 1 {
                (Format::Float96, 0)
            } else {
                let format = legacy_format(anim, channel);
                (format, if format.has_bounds() { 3 } else { 0 })
            };
            Ok(Some(TrackView {
                channel,
                format,
                components: ComponentFlags::all(),
                num_keys,
                start,
                interval_pairs,
                keys_offset: start + if interval_pairs > 0 { INTERVAL_BOUNDS_SIZE } else { 0 },
                has_frame_table: anim.key_encoding == KeyEncoding::VariableKeyLerp && num_keys > 1,
            }))
        }
        KeyEncoding::PerTrack => {
            let offset = match channel {
                Channel::Translation => entry(&anim.track_offsets, track * 2)?,
                Channel::Rotation => entry(&anim.track_offsets, track * 2 + 1)?,
                Channel::Scale => {
                    if anim.scale_offsets.is_empty() {
                        return Ok(None);
                    }
                    entry(&anim.scale_offsets, track)?
                }
            };
            if offset < 0 {
                return Ok(None);
            }
            let start = offset as usize;
            if start + TrackHeader::SIZE > anim.byte_stream.len() {
                return Err(CodecError::Truncated {
                    expected: start + TrackHeader::SIZE,
                    found: anim.byte_stream.len(),
                });
            }
            let word = ByteReader::at(&anim.byte_stream, start, anim.byte_order).read_u32();
            let header = TrackHeader::from_u32(word)?;
            if header.key_format == Format::Identity {
                return Ok(None);
            }
            if header.num_keys == 0 {
                return Err(CodecError::Malformed(format!("{channel} track {track} has no keys")));
            }
            header.key_format.stride(channel)?;
            let interval_pairs = header.interval_pair_count();
            Ok(Some(TrackView {
                channel,
                format: header.key_format,
                components: if header.key_format.uses_component_flags() {
                    ComponentFlags::from_bits_truncate(header.format_flags)
                } else {
                    ComponentFlags::all()
                },
                num_keys: header.num_keys,
                start,
                interval_pairs,
                keys_offset: start + TrackHeader::SIZE + interval_pairs * 8,
                has_frame_table: header.has_frame_table,
            }))
        }
    }
}

// ============================================================================
// Key lookup
// ============================================================================

/// Bracketing key indices and blend factor
#[derive(Debug, Clone, Copy, PartialEq)]
struct KeyPair {
    low: usize,
    high: usize,
    alpha: f32,
}

impl KeyPair {
    const FIRST: KeyPair = KeyPair { low: 0, high: 0, alpha: 0.0 };

    fn last(index: usize) -> Self {
        Self { low: index, high: index, alpha: 0.0 }
    }
}

fn uniform_keys(num_keys: u32, relative: f32) -> KeyPair {
    if num_keys <= 1 {
        return KeyPair::FIRST;
    }
    let last = num_keys as usize - 1;
    let key_pos = relative * last as f32;
    let low = (key_pos.floor() as usize).min(last);
    KeyPair {
        low,
        high: (low + 1).min(last),
        alpha: if low == last { 0.0 } else { key_pos - low as f32 },
    }
}

/// Finds the keys around `relative` through a key to frame table
fn frame_table_keys(
    num_keys: u32,
    num_frames: u32,
    relative: f32,
    frame_at: impl Fn(usize) -> u32,
) -> KeyPair {
    if num_keys <= 1 {
        return KeyPair::FIRST;
    }
    let last = num_keys as usize - 1;
    let target = relative * num_frames.saturating_sub(1) as f32;
    if target <= frame_at(0) as f32 {
        return KeyPair::FIRST;
    }
    if target >= frame_at(last) as f32 {
        return KeyPair::last(last);
    }

    // frame_at(low) <= target < frame_at(low + 1)
    let mut low = ((relative * last as f32) as usize).min(last - 1);
    let mut found = false;
    for _ in 0..MAX_WALK {
        if frame_at(low) as f32 > target {
            low -= 1;
        } else if frame_at(low + 1) as f32 <= target {
            low += 1;
        } else {
            found = true;
            break;
        }
    }
    if !found {
        let (mut lo, mut hi) = (0, last);
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if frame_at(mid) as f32 <= target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        low = lo;
    }

    let (f_lo, f_hi) = (frame_at(low) as f32, frame_at(low + 1) as f32);
    let span = f_hi - f_lo;
    KeyPair {
        low,
        high: low + 1,
        alpha: if span > 0.0 { (target - f_lo) / span } else { 0.0 },
    }
}

fn locate_keys(anim: &CompressedAnimation, view: &TrackView, relative: f32) -> KeyPair {
    let mut keys = if view.has_frame_table {
        let data = anim.byte_stream.as_slice();
        let table = view.frame_table_offset();
        let order = anim.byte_order;
        if frame_table_entry_size(anim.num_frames) == 1 {
            frame_table_keys(view.num_keys, anim.num_frames, relative, |i| {
                u32::from(ByteReader::at(data, table + i, order).read_u8())
            })
        } else {
            frame_table_keys(view.num_keys, anim.num_frames, relative, |i| {
                u32::from(ByteReader::at(data, table + i * 2, order).read_u16())
            })
        }
    } else {
        uniform_keys(view.num_keys, relative)
    };
    if anim.interpolation == Interpolation::Step {
        keys.alpha = 0.0;
    }
    keys
}

// ============================================================================
// Sampling
// ============================================================================

#[inline]
fn relative_position(anim: &CompressedAnimation, time: f32) -> f32 {
    if anim.sequence_length <= 0.0 {
        return 0.0;
    }
    (time / anim.sequence_length).clamp(0.0, 1.0)
}

fn sample_vector(anim: &CompressedAnimation, view: &TrackView, relative: f32) -> Vec3 {
    let data = anim.byte_stream.as_slice();
    let bounds = view.bounds(data, anim);
    let stride = view.key_stride();
    let keys = locate_keys(anim, view, relative);
    let read = |index: usize| {
        let mut reader = ByteReader::at(data, view.keys_offset + index * stride, anim.byte_order);
        read_vector(&mut reader, view.format, view.components, &bounds)
    };
    let low = read(keys.low);
    if keys.alpha <= 0.0 || keys.low == keys.high {
        return low;
    }
    low.lerp(read(keys.high), keys.alpha)
}

fn sample_rotation(anim: &CompressedAnimation, view: &TrackView, relative: f32) -> Quat {
    let data = anim.byte_stream.as_slice();
    let bounds = view.bounds(data, anim);
    let stride = view.key_stride();
    let keys = locate_keys(anim, view, relative);
    let read = |index: usize| {
        let mut reader = ByteReader::at(data, view.keys_offset + index * stride, anim.byte_order);
        read_quat(&mut reader, view.format, view.components, &bounds)
    };
    let low = read(keys.low);
    if keys.alpha <= 0.0 || keys.low == keys.high {
        return low.normalize();
    }
    crate::math::fast_lerp(low, read(keys.high), keys.alpha)
}

fn resolved(anim: &CompressedAnimation, track: usize, channel: Channel) -> Option<TrackView> {
    match track_view(anim, track, channel) {
        Ok(view) => view,
        Err(err) => {
            debug_assert!(false, "invalid {channel} track {track}: {err}");
            None
        }
    }
}

/// Samples one track's local transform at `time` (seconds, clamped to the sequence)
pub fn sample_bone_transform(anim: &CompressedAnimation, track: usize, time: f32) -> Transform {
    let relative = relative_position(anim, time);
    let translation = resolved(anim, track, Channel::Translation)
        .map_or(Vec3::ZERO, |view| sample_vector(anim, &view, relative));
    let rotation = resolved(anim, track, Channel::Rotation)
        .map_or(Quat::IDENTITY, |view| sample_rotation(anim, &view, relative));
    let scale = resolved(anim, track, Channel::Scale)
        .map_or(Vec3::ONE, |view| sample_vector(anim, &view, relative));
    Transform::new(rotation, translation, scale)
}

/// Samples every bone in `pairs` into `out[pair.bone]`; other entries are left untouched
pub fn sample_full_pose(
    anim: &CompressedAnimation,
    pairs: &[BoneTrackPair],
    time: f32,
    out: &mut [Transform],
) {
    for pair in pairs {
        if let Some(slot) = out.get_mut(pair.bone) {
            *slot = sample_bone_transform(anim, pair.track, time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_keys() {
        assert_eq!(uniform_keys(1, 0.7), KeyPair::FIRST);
        let mid = uniform_keys(5, 0.5);
        assert_eq!((mid.low, mid.high), (2, 3));
        assert_eq!(mid.alpha, 0.0);
        let quarter = uniform_keys(3, 0.25);
        assert_eq!((quarter.low, quarter.high), (0, 1));
        assert!((quarter.alpha - 0.5).abs() < 1e-6);
        assert_eq!(uniform_keys(4, 1.0), KeyPair::last(3));
    }

    #[test]
    fn test_frame_table_clamps() {
        let frames = [2u32, 10, 20];
        let lookup = |relative| frame_table_keys(3, 31, relative, |i| frames[i]);
        assert_eq!(lookup(0.0), KeyPair::FIRST);
        assert_eq!(lookup(1.0), KeyPair::last(2));
    }

    #[test]
    fn test_frame_table_interpolates_between_frames() {
        let frames = [0u32, 10, 20, 30];
        // target frame 15
        let keys = frame_table_keys(4, 31, 0.5, |i| frames[i]);
        assert_eq!((keys.low, keys.high), (1, 2));
        assert!((keys.alpha - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_frame_table_bisects_far_from_estimate() {
        // keys bunched at the start: the estimate lands far from the answer
        let frames: Vec<u32> = (0..40).chain([1000]).collect();
        let keys = frame_table_keys(frames.len() as u32, 1001, 0.5, |i| frames[i]);
        assert_eq!((keys.low, keys.high), (39, 40));
        let expected = (500.0 - 39.0) / (1000.0 - 39.0);
        assert!((keys.alpha - expected).abs() < 1e-5);

        let keys = frame_table_keys(frames.len() as u32, 1001, 0.0205, |i| frames[i]);
        assert_eq!((keys.low, keys.high), (20, 21));
    }
}
