//! Keyed animation curves
//!
//! A [`Track`] is the working representation used by every reduction pass:
//! parallel `times` / `keys` arrays for one bone channel. Passes only remove
//! keys (or adjust values in place), never add them.

use glam::{Quat, Vec3, Vec4};

use crate::math::{fast_lerp, quat_error};

/// Tolerance used when checking whether reduced keys still sit on a uniform grid
pub const UNIFORM_SPACING_TOLERANCE: f32 = 1.0e-4;

/// Value stored in a track
pub trait TrackValue: Copy + PartialEq + std::fmt::Debug {
    /// Rest value of the channel when a track is missing
    const REST: Self;

    fn interpolate(a: Self, b: Self, alpha: f32) -> Self;

    /// Error metric used by the reduction passes
    fn error(a: Self, b: Self) -> f32;

    /// Component-wise check, `true` if any component differs by more than `tolerance`
    fn differs(a: Self, b: Self, tolerance: f32) -> bool;
}

impl TrackValue for Vec3 {
    const REST: Self = Vec3::ZERO;

    #[inline]
    fn interpolate(a: Self, b: Self, alpha: f32) -> Self {
        a.lerp(b, alpha)
    }

    #[inline]
    fn error(a: Self, b: Self) -> f32 {
        a.distance(b)
    }

    #[inline]
    fn differs(a: Self, b: Self, tolerance: f32) -> bool {
        (a - b).abs().max_element() > tolerance
    }
}

impl TrackValue for Quat {
    const REST: Self = Quat::IDENTITY;

    #[inline]
    fn interpolate(a: Self, b: Self, alpha: f32) -> Self {
        fast_lerp(a, b, alpha)
    }

    #[inline]
    fn error(a: Self, b: Self) -> f32 {
        quat_error(a, b)
    }

    /// `q` and `-q` are the same rotation, so both signs are compared
    #[inline]
    fn differs(a: Self, b: Self, tolerance: f32) -> bool {
        let (a, b) = (Vec4::from(a), Vec4::from(b));
        (a - b).abs().max_element() > tolerance && (a + b).abs().max_element() > tolerance
    }
}

// ============================================================================
// Track
// ============================================================================

/// One animated channel of one bone
#[derive(Debug, Clone, PartialEq)]
pub struct Track<T> {
    /// Key times in seconds, strictly increasing
    pub times: Vec<f32>,
    pub keys: Vec<T>,
}

pub type TranslationTrack = Track<Vec3>;
pub type RotationTrack = Track<Quat>;
pub type ScaleTrack = Track<Vec3>;

impl<T: TrackValue> Track<T> {
    /// Constant track with a single key at time 0
    pub fn constant(value: T) -> Self {
        Self {
            times: vec![0.0],
            keys: vec![value],
        }
    }

    /// Track over per-frame samples, spreading them evenly over `sequence_length`
    pub fn from_samples(samples: &[T], sequence_length: f32) -> Self {
        match samples.len() {
            0 => Self::constant(T::REST),
            1 => Self::constant(samples[0]),
            n => {
                let step = sequence_length / (n - 1) as f32;
                Self {
                    times: (0..n).map(|i| i as f32 * step).collect(),
                    keys: samples.to_vec(),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_constant(&self) -> bool {
        self.keys.len() == 1
    }

    pub fn first(&self) -> T {
        self.keys.first().copied().unwrap_or(T::REST)
    }

    /// Drop every key after the first
    pub fn collapse_to_first(&mut self) {
        let first = self.first();
        self.times = vec![0.0];
        self.keys = vec![first];
    }

    /// Keep only the keys at `indices` (ascending)
    pub fn retain_indices(&mut self, indices: &[usize]) {
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        self.times = indices.iter().map(|&i| self.times[i]).collect();
        self.keys = indices.iter().map(|&i| self.keys[i]).collect();
    }

    /// Value at `time`, interpolating between bracketing keys and clamping at both ends
    pub fn evaluate(&self, time: f32) -> T {
        let Some(&last_time) = self.times.last() else {
            return T::REST;
        };
        if self.keys.len() == 1 || time <= self.times[0] {
            return self.keys[0];
        }
        if time >= last_time {
            return self.keys[self.keys.len() - 1];
        }
        let high = self.times.partition_point(|&t| t <= time);
        let low = high - 1;
        let span = self.times[high] - self.times[low];
        let alpha = if span > 0.0 {
            (time - self.times[low]) / span
        } else {
            0.0
        };
        T::interpolate(self.keys[low], self.keys[high], alpha)
    }

    /// Frame index of every key, for a sequence of `num_frames` over `sequence_length`
    pub fn frame_indices(&self, num_frames: u32, sequence_length: f32) -> Vec<u32> {
        self.times
            .iter()
            .map(|&t| time_to_frame(t, num_frames, sequence_length))
            .collect()
    }
}

/// Nearest frame index of `time`
#[inline]
pub fn time_to_frame(time: f32, num_frames: u32, sequence_length: f32) -> u32 {
    if num_frames <= 1 || sequence_length <= 0.0 {
        return 0;
    }
    let last = (num_frames - 1) as f32;
    ((time / sequence_length) * last).round().clamp(0.0, last) as u32
}

/// Time of frame `frame`
#[inline]
pub fn frame_to_time(frame: u32, num_frames: u32, sequence_length: f32) -> f32 {
    if num_frames <= 1 {
        return 0.0;
    }
    frame as f32 * sequence_length / (num_frames - 1) as f32
}

/// Whether keys at `times` can be located by proportional indexing.
///
/// Up to two keys, or one key per frame, is always uniform. Otherwise every
/// delta must match the first within tolerance, and the keys must span the
/// whole sequence.
pub fn has_uniform_key_spacing(num_frames: u32, sequence_length: f32, times: &[f32]) -> bool {
    if times.len() <= 2 || times.len() == num_frames as usize {
        return spans_sequence(times, sequence_length);
    }
    let first_delta = times[1] - times[0];
    let evenly_spaced = times
        .windows(2)
        .all(|w| ((w[1] - w[0]) - first_delta).abs() <= UNIFORM_SPACING_TOLERANCE);
    evenly_spaced && spans_sequence(times, sequence_length)
}

fn spans_sequence(times: &[f32], sequence_length: f32) -> bool {
    match (times.first(), times.last()) {
        (Some(&first), _) if times.len() == 1 => first.abs() <= UNIFORM_SPACING_TOLERANCE,
        (Some(&first), Some(&last)) => {
            first.abs() <= UNIFORM_SPACING_TOLERANCE
                && (last - sequence_length).abs() <= UNIFORM_SPACING_TOLERANCE
        }
        _ => true,
    }
}

// ============================================================================
// Separated tracks
// ============================================================================

/// Working tracks of one sequence, indexed by track (not bone)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeparatedTracks {
    pub translation: Vec<TranslationTrack>,
    pub rotation: Vec<RotationTrack>,
    /// Empty when no bone animates scale
    pub scale: Vec<ScaleTrack>,
}

impl SeparatedTracks {
    pub fn num_tracks(&self) -> usize {
        self.translation.len()
    }

    pub fn has_scale(&self) -> bool {
        !self.scale.is_empty()
    }

    /// Total number of keys over all channels
    pub fn total_keys(&self) -> usize {
        self.translation.iter().map(Track::len).sum::<usize>()
            + self.rotation.iter().map(Track::len).sum::<usize>()
            + self.scale.iter().map(Track::len).sum::<usize>()
    }

    /// Whether every multi-key track sits on the uniform grid of the sequence
    pub fn all_uniform(&self, num_frames: u32, sequence_length: f32) -> bool {
        let uniform = |times: &[f32]| {
            times.len() <= 1 || has_uniform_key_spacing(num_frames, sequence_length, times)
        };
        self.translation.iter().all(|t| uniform(&t.times))
            && self.rotation.iter().all(|t| uniform(&t.times))
            && self.scale.iter().all(|t| uniform(&t.times))
    }
}
