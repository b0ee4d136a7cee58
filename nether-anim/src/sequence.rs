//! Raw animation sequence
//!
//! Raw tracks hold one sample per frame (or a single sample for a constant
//! channel). They are sanitised once, then split into [`SeparatedTracks`]
//! for the reduction passes and sampled directly when measuring error.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CodecError;
use crate::formats::Interpolation;
use crate::math::{Transform, fast_lerp};
use crate::reduction::{TrivialThresholds, filter_trivial_track};
use crate::track::{SeparatedTracks, Track, TrackValue};

/// Per-frame samples of one bone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrack {
    pub pos_keys: Vec<Vec3>,
    pub rot_keys: Vec<Quat>,
    /// Empty when the bone has no scale animation
    #[serde(default)]
    pub scale_keys: Vec<Vec3>,
}

impl RawTrack {
    /// Constant track holding `transform`
    pub fn constant(transform: &Transform) -> Self {
        Self {
            pos_keys: vec![transform.translation],
            rot_keys: vec![transform.rotation],
            scale_keys: vec![transform.scale],
        }
    }
}

/// Raw animation of a skeleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimSequence {
    #[serde(default)]
    pub name: String,
    /// Length in seconds
    pub sequence_length: f32,
    pub num_frames: u32,
    #[serde(default)]
    pub interpolation: Interpolation,
    pub raw_tracks: Vec<RawTrack>,
    /// Skeleton bone animated by each raw track
    pub track_to_bone: Vec<usize>,
}

/// Bracketing key indices and blend weight for a sample time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyIndices {
    pub low: usize,
    pub high: usize,
    pub alpha: f32,
}

/// Uniform key lookup for `time` in a sequence of `num_frames`.
///
/// Times at or before the start map to key 0, times at or after the end map
/// to the last key.
pub fn key_indices_from_time(time: f32, num_frames: u32, sequence_length: f32) -> KeyIndices {
    let last = num_frames.saturating_sub(1) as usize;
    if time <= 0.0 || num_frames <= 1 {
        return KeyIndices {
            low: 0,
            high: 0,
            alpha: 0.0,
        };
    }
    if time >= sequence_length {
        return KeyIndices {
            low: last,
            high: last,
            alpha: 0.0,
        };
    }
    let key_pos = last as f32 * time / sequence_length;
    let low = (key_pos.floor() as usize).min(last);
    let high = (low + 1).min(last);
    KeyIndices {
        low,
        high,
        alpha: key_pos - low as f32,
    }
}

impl AnimSequence {
    pub fn num_tracks(&self) -> usize {
        self.raw_tracks.len()
    }

    /// Seconds between frames
    pub fn time_per_frame(&self) -> f32 {
        if self.num_frames > 1 {
            self.sequence_length / (self.num_frames - 1) as f32
        } else {
            0.0
        }
    }

    pub fn frame_time(&self, frame: u32) -> f32 {
        frame as f32 * self.time_per_frame()
    }

    /// Skeleton bone index to track index (`None` for bones without a track)
    pub fn bone_to_track(&self, num_bones: usize) -> Vec<Option<usize>> {
        let mut map = vec![None; num_bones];
        for (track, &bone) in self.track_to_bone.iter().enumerate() {
            if let Some(slot) = map.get_mut(bone) {
                *slot = Some(track);
            }
        }
        map
    }

    /// Whether any raw track animates scale
    pub fn has_scale(&self) -> bool {
        self.raw_tracks.iter().any(|t| !t.scale_keys.is_empty())
    }

    /// Brings raw tracks into a shape every codec accepts.
    ///
    /// Tracks whose key count is neither 1 nor `num_frames` are chopped to
    /// their first key, missing position/rotation keys become identity, and
    /// scale is dropped entirely when no track actually scales. With
    /// `thresholds`, trivial raw keys are also collapsed.
    pub fn sanitize(&mut self, thresholds: Option<&TrivialThresholds>) -> Result<bool, CodecError> {
        if self.raw_tracks.is_empty() {
            return Err(CodecError::NoRawData);
        }
        if self.track_to_bone.len() != self.raw_tracks.len() {
            warn!(
                sequence = %self.name,
                tracks = self.raw_tracks.len(),
                mapped = self.track_to_bone.len(),
                "track to bone table does not match raw track count"
            );
            self.track_to_bone.resize(self.raw_tracks.len(), 0);
        }

        let num_frames = self.num_frames as usize;
        let mut modified = false;

        for (index, track) in self.raw_tracks.iter_mut().enumerate() {
            if track.pos_keys.is_empty() {
                warn!(sequence = %self.name, track = index, "no position keys, using identity");
                track.pos_keys.push(Vec3::ZERO);
                modified = true;
            }
            if track.rot_keys.is_empty() {
                warn!(sequence = %self.name, track = index, "no rotation keys, using identity");
                track.rot_keys.push(Quat::IDENTITY);
                modified = true;
            }

            let pos_len = track.pos_keys.len();
            let rot_len = track.rot_keys.len();
            let scale_len = track.scale_keys.len();
            if pos_len != 1 && pos_len != num_frames {
                warn!(
                    sequence = %self.name,
                    track = index,
                    keys = pos_len,
                    num_frames,
                    "chopping position keys"
                );
                track.pos_keys.truncate(1);
                modified = true;
            }
            if rot_len != 1 && rot_len != num_frames {
                warn!(
                    sequence = %self.name,
                    track = index,
                    keys = rot_len,
                    num_frames,
                    "chopping rotation keys"
                );
                track.rot_keys.truncate(1);
                modified = true;
            }
            if scale_len > 1 && scale_len != num_frames {
                warn!(
                    sequence = %self.name,
                    track = index,
                    keys = scale_len,
                    num_frames,
                    "chopping scale keys"
                );
                track.scale_keys.truncate(1);
                modified = true;
            }

            for q in &mut track.rot_keys {
                *q = q.normalize();
            }

            if let Some(thresholds) = thresholds {
                modified |= collapse_raw_keys(&mut track.pos_keys, thresholds.translation);
                modified |= collapse_raw_keys(&mut track.rot_keys, thresholds.rotation);
                modified |= collapse_raw_keys(&mut track.scale_keys, thresholds.scale);
            }
        }

        let uses_scale = self.raw_tracks.iter().any(|t| {
            t.scale_keys.len() > 1 || t.scale_keys.iter().any(|s| !s.abs_diff_eq(Vec3::ONE, 1.0e-6))
        });
        if !uses_scale && self.has_scale() {
            for track in &mut self.raw_tracks {
                track.scale_keys.clear();
            }
            modified = true;
        }

        Ok(modified)
    }

    /// Raw transform of `track_index` at `time`, following the sequence interpolation mode
    pub fn sample_raw_track(&self, track_index: usize, time: f32) -> Transform {
        let Some(track) = self.raw_tracks.get(track_index) else {
            return Transform::IDENTITY;
        };
        let indices = key_indices_from_time(time, self.num_frames, self.sequence_length);
        let alpha = match self.interpolation {
            Interpolation::Linear => indices.alpha,
            Interpolation::Step => 0.0,
        };

        let rotation = sample_keys(&track.rot_keys, indices, alpha, Quat::IDENTITY, fast_lerp);
        let translation = sample_keys(&track.pos_keys, indices, alpha, Vec3::ZERO, Vec3::lerp);
        let scale = sample_keys(&track.scale_keys, indices, alpha, Vec3::ONE, Vec3::lerp);
        Transform::new(rotation, translation, scale)
    }

    /// Raw transform of `track_index` at frame `frame`, without interpolation
    pub fn raw_frame(&self, track_index: usize, frame: usize) -> Transform {
        let Some(track) = self.raw_tracks.get(track_index) else {
            return Transform::IDENTITY;
        };
        let pick = |len: usize| frame.min(len.saturating_sub(1));
        Transform::new(
            track.rot_keys.get(pick(track.rot_keys.len())).copied().unwrap_or(Quat::IDENTITY),
            track.pos_keys.get(pick(track.pos_keys.len())).copied().unwrap_or(Vec3::ZERO),
            track.scale_keys.get(pick(track.scale_keys.len())).copied().unwrap_or(Vec3::ONE),
        )
    }

    /// Splits raw tracks into per-channel [`Track`]s.
    ///
    /// Scale tracks are only produced when some raw track carries scale keys.
    pub fn separate_raw_tracks(&self) -> SeparatedTracks {
        let has_scale = self.has_scale();
        let mut tracks = SeparatedTracks::default();
        for raw in &self.raw_tracks {
            tracks
                .translation
                .push(Track::from_samples(&raw.pos_keys, self.sequence_length));
            tracks
                .rotation
                .push(Track::from_samples(&raw.rot_keys, self.sequence_length));
            if has_scale {
                let scale = if raw.scale_keys.is_empty() {
                    Track::constant(Vec3::ONE)
                } else {
                    Track::from_samples(&raw.scale_keys, self.sequence_length)
                };
                tracks.scale.push(scale);
            }
        }
        tracks
    }
}

fn sample_keys<T: Copy>(
    keys: &[T],
    indices: KeyIndices,
    alpha: f32,
    rest: T,
    blend: impl Fn(T, T, f32) -> T,
) -> T {
    match keys.len() {
        0 => rest,
        1 => keys[0],
        len => {
            let low = keys[indices.low.min(len - 1)];
            let high = keys[indices.high.min(len - 1)];
            if alpha > 0.0 { blend(low, high, alpha) } else { low }
        }
    }
}

fn collapse_raw_keys<T: TrackValue>(keys: &mut Vec<T>, tolerance: f32) -> bool {
    if keys.len() <= 1 || tolerance < 0.0 {
        return false;
    }
    let mut track = Track {
        times: vec![0.0; keys.len()],
        keys: std::mem::take(keys),
    };
    let collapsed = filter_trivial_track(&mut track, tolerance);
    *keys = track.keys;
    collapsed
}
