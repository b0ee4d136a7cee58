//! Trivial-key filter

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::track::{SeparatedTracks, Track, TrackValue};

/// Per-channel tolerance below which a track counts as constant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrivialThresholds {
    #[serde(default = "default_translation_threshold")]
    pub translation: f32,
    #[serde(default = "default_rotation_threshold")]
    pub rotation: f32,
    #[serde(default = "default_scale_threshold")]
    pub scale: f32,
}

fn default_translation_threshold() -> f32 {
    1.0e-4
}

fn default_rotation_threshold() -> f32 {
    3.0e-4
}

fn default_scale_threshold() -> f32 {
    1.0e-6
}

impl Default for TrivialThresholds {
    fn default() -> Self {
        Self {
            translation: default_translation_threshold(),
            rotation: default_rotation_threshold(),
            scale: default_scale_threshold(),
        }
    }
}

/// Collapses `track` to its first key if no key differs from it by more than `tolerance`.
///
/// Returns `true` if keys were removed.
pub fn filter_trivial_track<T: TrackValue>(track: &mut Track<T>, tolerance: f32) -> bool {
    if track.len() <= 1 {
        return false;
    }
    let first = track.first();
    if track.keys.iter().any(|&k| T::differs(first, k, tolerance)) {
        return false;
    }
    track.collapse_to_first();
    true
}

/// Applies [`filter_trivial_track`] to every channel of every track
pub fn filter_trivial_keys(tracks: &mut SeparatedTracks, thresholds: &TrivialThresholds) {
    let mut collapsed = 0usize;
    for track in &mut tracks.translation {
        collapsed += usize::from(filter_trivial_track(track, thresholds.translation));
    }
    for track in &mut tracks.rotation {
        collapsed += usize::from(filter_trivial_track(track, thresholds.rotation));
    }
    for track in &mut tracks.scale {
        collapsed += usize::from(filter_trivial_track(track, thresholds.scale));
    }
    trace!(collapsed, "trivial key filter");
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;

    #[test]
    fn test_collapses_within_tolerance() {
        let samples: Vec<Vec3> = (0..20)
            .map(|i| Vec3::new(1.0, 2.0, 3.0) + Vec3::splat((i % 3) as f32 * 0.4e-4))
            .collect();
        let mut track = Track::from_samples(&samples, 1.0);
        assert!(filter_trivial_track(&mut track, 1.0e-4));
        assert_eq!(track.len(), 1);
        assert_eq!(track.times, vec![0.0]);
        assert_eq!(track.keys[0], samples[0]);
    }

    #[test]
    fn test_key_just_past_tolerance_survives() {
        let mut samples = vec![Vec3::ZERO; 10];
        samples[7] = Vec3::new(0.0, 0.25 + 1.0e-4, 0.0);
        let mut track = Track::from_samples(&samples, 1.0);
        assert!(!filter_trivial_track(&mut track, 0.25));
        assert_eq!(track.len(), 10);
    }

    #[test]
    fn test_single_key_untouched() {
        let mut track = Track::constant(Quat::from_rotation_x(1.0));
        assert!(!filter_trivial_track(&mut track, 10.0));
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn test_filter_all_channels() {
        let mut tracks = SeparatedTracks {
            translation: vec![Track::from_samples(&[Vec3::X; 5], 1.0)],
            rotation: vec![Track::from_samples(
                &[Quat::IDENTITY, Quat::from_rotation_z(0.5)],
                1.0,
            )],
            scale: vec![Track::from_samples(&[Vec3::ONE; 5], 1.0)],
        };
        filter_trivial_keys(&mut tracks, &TrivialThresholds::default());
        assert!(tracks.translation[0].is_constant());
        assert_eq!(tracks.rotation[0].len(), 2);
        assert!(tracks.scale[0].is_constant());
    }
}
