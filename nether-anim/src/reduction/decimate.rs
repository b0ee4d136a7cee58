//! Structural key removal: uniform decimation and frame-rate resampling
//!
//! Neither pass measures error. Kept keys retain their original times, so a
//! decimated track that no longer starts at frame 0 or ends on the last frame
//! is encoded with a frame table.

use tracing::debug;

use crate::track::{SeparatedTracks, Track, TrackValue};

/// Keeps keys `start, start + interval, start + 2 * interval, ...`
pub fn filter_intermittent_keys<T: TrackValue>(
    track: &mut Track<T>,
    start: usize,
    interval: usize,
) {
    let interval = interval.max(1);
    if track.len() <= 1 || start >= track.len() {
        return;
    }
    let indices: Vec<usize> = (start..track.len()).step_by(interval).collect();
    track.retain_indices(&indices);
}

/// Drops every second key of each track holding more than `min_keys` keys
pub fn remove_every_second_key(
    tracks: &mut SeparatedTracks,
    min_keys: usize,
    start_at_second_key: bool,
) {
    let start = usize::from(start_at_second_key);
    for track in &mut tracks.translation {
        if track.len() > min_keys {
            filter_intermittent_keys(track, start, 2);
        }
    }
    for track in &mut tracks.rotation {
        if track.len() > min_keys {
            filter_intermittent_keys(track, start, 2);
        }
    }
    for track in &mut tracks.scale {
        if track.len() > min_keys {
            filter_intermittent_keys(track, start, 2);
        }
    }
}

/// Frame indices kept when resampling `num_frames` by `stride`: every stride-th frame plus the last
pub fn resample_indices(num_frames: usize, stride: usize) -> Vec<usize> {
    let stride = stride.max(1);
    let mut indices: Vec<usize> = (0..num_frames).step_by(stride).collect();
    if let Some(&last) = indices.last() {
        if last + 1 != num_frames {
            indices.push(num_frames - 1);
        }
    }
    indices
}

/// Resamples full-rate tracks to roughly `target_rate` frames per second.
///
/// Only tracks with one key per frame and at least `min_keys` keys are
/// touched. Returns `false` when the target rate does not reduce anything.
pub fn resample_tracks(
    tracks: &mut SeparatedTracks,
    num_frames: u32,
    sequence_length: f32,
    target_rate: f32,
    min_keys: usize,
) -> bool {
    if num_frames <= 2 || sequence_length <= 0.0 || target_rate <= 0.0 {
        return false;
    }
    let source_rate = (num_frames - 1) as f32 / sequence_length;
    let stride = (source_rate / target_rate).round() as usize;
    if stride <= 1 {
        return false;
    }

    let full_rate = num_frames as usize;
    let indices = resample_indices(full_rate, stride);
    debug!(source_rate, target_rate, stride, kept = indices.len(), "resampling tracks");

    fn apply<T: TrackValue>(
        track: &mut Track<T>,
        full_rate: usize,
        min_keys: usize,
        indices: &[usize],
    ) {
        if track.len() == full_rate && track.len() >= min_keys {
            track.retain_indices(indices);
        }
    }
    for track in &mut tracks.translation {
        apply(track, full_rate, min_keys, &indices);
    }
    for track in &mut tracks.rotation {
        apply(track, full_rate, min_keys, &indices);
    }
    for track in &mut tracks.scale {
        apply(track, full_rate, min_keys, &indices);
    }
    true
}
