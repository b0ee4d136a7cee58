//! Compression error measurement
//!
//! Error is the world-space drift of end effectors between the raw and the
//! compressed animation, sampled at every frame. Each end effector is extended
//! by a dummy bone so rotation error becomes visible as position error.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::compressed::CompressedAnimation;
use crate::decoder::sample_bone_transform;
use crate::math::{Transform, quat_error};
use crate::reduction::ChannelTolerances;
use crate::sequence::AnimSequence;
use crate::skeleton::{BoneData, compose_pose};

/// Dummy bone length added past regular end effectors
pub const END_EFFECTOR_DUMMY_BONE_LENGTH: f32 = 5.0;

/// Dummy bone length added past socket and key end effectors
pub const END_EFFECTOR_DUMMY_BONE_LENGTH_SOCKET: f32 = 50.0;

pub fn dummy_bone_length(bone: &BoneData) -> f32 {
    if bone.is_sensitive_effector() {
        END_EFFECTOR_DUMMY_BONE_LENGTH_SOCKET
    } else {
        END_EFFECTOR_DUMMY_BONE_LENGTH
    }
}

/// Aggregated end effector error of a compressed animation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub average_error: f32,
    pub max_error: f32,
    pub max_error_bone: usize,
    /// Time in seconds of the worst sample
    pub max_error_time: f32,
}

#[derive(Default)]
struct ErrorAccumulator {
    total: f64,
    count: usize,
    stats: ErrorStats,
}

impl ErrorAccumulator {
    fn add(&mut self, error: f32, bone: usize, time: f32) {
        self.total += f64::from(error);
        self.count += 1;
        if error > self.stats.max_error {
            self.stats.max_error = error;
            self.stats.max_error_bone = bone;
            self.stats.max_error_time = time;
        }
    }

    fn finish(mut self) -> ErrorStats {
        if self.count > 0 {
            self.stats.average_error = (self.total / self.count as f64) as f32;
        }
        self.stats
    }
}

/// Fills `out` with the local pose at `frame`; bones without a track take the reference pose
fn raw_local_pose(
    seq: &AnimSequence,
    bones: &[BoneData],
    bone_to_track: &[Option<usize>],
    frame: usize,
    out: &mut [Transform],
) {
    for (bone, data) in bones.iter().enumerate() {
        out[bone] = match bone_to_track[bone] {
            Some(track) => seq.raw_frame(track, frame),
            None => data.ref_pose(),
        };
    }
}

/// Measures end effector drift of `compressed` against the raw data of `seq`
pub fn compute_compression_error(
    seq: &AnimSequence,
    compressed: &CompressedAnimation,
    bones: &[BoneData],
) -> ErrorStats {
    let num_bones = bones.len();
    let bone_to_track = seq.bone_to_track(num_bones);
    let mut raw_local = vec![Transform::IDENTITY; num_bones];
    let mut new_local = vec![Transform::IDENTITY; num_bones];
    let mut raw_world = vec![Transform::IDENTITY; num_bones];
    let mut new_world = vec![Transform::IDENTITY; num_bones];
    let mut acc = ErrorAccumulator::default();

    for frame in 0..seq.num_frames.max(1) as usize {
        let time = seq.frame_time(frame as u32);
        raw_local_pose(seq, bones, &bone_to_track, frame, &mut raw_local);
        for (bone, data) in bones.iter().enumerate() {
            new_local[bone] = match bone_to_track[bone] {
                Some(track) => sample_bone_transform(compressed, track, time),
                None => data.ref_pose(),
            };
        }
        compose_pose(bones, &raw_local, &mut raw_world);
        compose_pose(bones, &new_local, &mut new_world);

        for (bone, data) in bones.iter().enumerate() {
            if !data.is_end_effector() {
                continue;
            }
            let tip = Vec3::splat(dummy_bone_length(data));
            let error = raw_world[bone]
                .transform_point(tip)
                .distance(new_world[bone].transform_point(tip));
            acc.add(error, bone, time);
        }
    }

    acc.finish()
}

// ============================================================================
// Perturbation tally
// ============================================================================

/// Nudges applied to one track at a time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerturbationProbes {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for PerturbationProbes {
    fn default() -> Self {
        Self {
            translation: Vec3::splat(0.1),
            rotation: Quat::from_axis_angle(Vec3::ONE.normalize(), 0.01),
            scale: Vec3::splat(0.01),
        }
    }
}

impl PerturbationProbes {
    /// Size of each probe in the units of its channel's error metric
    pub fn magnitudes(&self) -> ChannelTolerances {
        ChannelTolerances {
            translation: self.translation.length(),
            rotation: quat_error(Quat::IDENTITY, self.rotation),
            scale: self.scale.length(),
        }
    }
}

/// Largest end effector error per channel caused by one probe
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerturbationEffect {
    pub translation: f32,
    pub rotation: f32,
    pub scale: f32,
}

impl PerturbationEffect {
    fn record(&mut self, base: &Transform, nudged: &Transform, tip: Vec3) {
        self.translation = self
            .translation
            .max(base.transform_point(tip).distance(nudged.transform_point(tip)));
        self.rotation = self.rotation.max(quat_error(base.rotation, nudged.rotation));
        self.scale = self.scale.max(base.scale.distance(nudged.scale));
    }
}

/// Sensitivity of the end effectors to one track
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackPerturbation {
    pub due_to_translation: PerturbationEffect,
    pub due_to_rotation: PerturbationEffect,
    pub due_to_scale: PerturbationEffect,
}

/// Perturbs every track in turn and records the induced end effector error
pub fn tally_errors_from_perturbation(
    seq: &AnimSequence,
    bones: &[BoneData],
    probes: &PerturbationProbes,
) -> Vec<TrackPerturbation> {
    let num_bones = bones.len();
    let bone_to_track = seq.bone_to_track(num_bones);
    let mut tally = vec![TrackPerturbation::default(); seq.num_tracks()];
    let mut local = vec![Transform::IDENTITY; num_bones];
    let mut world = vec![Transform::IDENTITY; num_bones];
    let mut nudged_local = vec![Transform::IDENTITY; num_bones];
    let mut nudged_world = vec![Transform::IDENTITY; num_bones];

    for frame in 0..seq.num_frames.max(1) as usize {
        raw_local_pose(seq, bones, &bone_to_track, frame, &mut local);
        compose_pose(bones, &local, &mut world);

        for (track, entry) in tally.iter_mut().enumerate() {
            let Some(&bone) = seq.track_to_bone.get(track) else {
                continue;
            };
            if bone >= num_bones {
                continue;
            }
            let nudges: [(&mut PerturbationEffect, fn(&mut Transform, &PerturbationProbes)); 3] = [
                (&mut entry.due_to_translation, |t, p| t.translation += p.translation),
                (&mut entry.due_to_rotation, |t, p| {
                    t.rotation = (t.rotation * p.rotation).normalize()
                }),
                (&mut entry.due_to_scale, |t, p| t.scale += p.scale),
            ];
            for (effect, nudge) in nudges {
                nudged_local.copy_from_slice(&local);
                nudge(&mut nudged_local[bone], probes);
                compose_pose(bones, &nudged_local, &mut nudged_world);
                for &effector in &bones[bone].end_effectors {
                    let tip = Vec3::splat(dummy_bone_length(&bones[effector]));
                    effect.record(&world[effector], &nudged_world[effector], tip);
                }
            }
        }
    }

    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Interpolation;
    use crate::sequence::RawTrack;
    use crate::skeleton::{Bone, Skeleton, build_skeleton_metadata};

    fn chain() -> (AnimSequence, Vec<BoneData>) {
        let skeleton = Skeleton {
            bones: vec![
                Bone {
                    name: "root".into(),
                    parent: None,
                    ref_pose: Transform::IDENTITY,
                    has_socket: false,
                },
                Bone {
                    name: "tip".into(),
                    parent: Some(0),
                    ref_pose: Transform::from_translation(Vec3::X),
                    has_socket: false,
                },
            ],
        };
        let seq = AnimSequence {
            name: "chain".into(),
            sequence_length: 1.0,
            num_frames: 2,
            interpolation: Interpolation::Linear,
            raw_tracks: vec![RawTrack::constant(&Transform::IDENTITY)],
            track_to_bone: vec![0],
        };
        (seq, build_skeleton_metadata(&skeleton, &[]))
    }

    #[test]
    fn test_dummy_bone_length() {
        let (_, mut bones) = chain();
        assert_eq!(dummy_bone_length(&bones[1]), END_EFFECTOR_DUMMY_BONE_LENGTH);
        bones[1].has_socket = true;
        assert_eq!(dummy_bone_length(&bones[1]), END_EFFECTOR_DUMMY_BONE_LENGTH_SOCKET);
    }

    #[test]
    fn test_perturbation_reaches_end_effector() {
        let (seq, bones) = chain();
        let probes = PerturbationProbes::default();
        let tally = tally_errors_from_perturbation(&seq, &bones, &probes);
        assert_eq!(tally.len(), 1);
        // a root translation moves the tip by exactly the nudge
        let t = tally[0].due_to_translation.translation;
        assert!((t - probes.translation.length()).abs() < 1e-5);
        // rotation at the root swings the tip
        assert!(tally[0].due_to_rotation.translation > 0.0);
        assert!(tally[0].due_to_rotation.rotation > 0.0);
    }

    #[test]
    fn test_error_accumulator() {
        let mut acc = ErrorAccumulator::default();
        acc.add(1.0, 3, 0.5);
        acc.add(3.0, 4, 0.75);
        let stats = acc.finish();
        assert_eq!(stats.average_error, 2.0);
        assert_eq!(stats.max_error, 3.0);
        assert_eq!(stats.max_error_bone, 4);
        assert_eq!(stats.max_error_time, 0.75);
    }
}
