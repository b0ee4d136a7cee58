//! Linear key removal
//!
//! Removes keys that interpolation between their neighbours reproduces within
//! two budgets: the local channel error, and the world-space drift of every
//! end effector below the bone (each effector extended by a dummy bone so
//! rotational error shows up as positional error).
//!
//! Bones are processed root first, channels in translation, rotation, scale
//! order. A pose table of already-reduced local transforms is kept current so
//! each decision sees the error its ancestors introduced.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ChannelTolerances;
use crate::math::{Transform, safe_reciprocal};
use crate::measure::dummy_bone_length;
use crate::sequence::AnimSequence;
use crate::skeleton::{BoneData, compose_pose};
use crate::track::{SeparatedTracks, Track, TrackValue, frame_to_time, time_to_frame};

/// Tuning of [`remove_linear_keys`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearKeyParams {
    /// Local translation error budget
    pub max_pos_diff: f32,
    /// Local rotation error budget (`quat_error` units)
    pub max_angle_diff: f32,
    pub max_scale_diff: f32,
    /// End effector drift allowed for bones away from the effector
    pub max_effector_diff: f32,
    /// End effector drift allowed when the bone is itself an end effector
    pub min_effector_diff: f32,
    /// End effector drift allowed for socket and key end effectors
    pub effector_diff_socket: f32,
    /// Error multiplier on frames where the parent track kept a key
    pub parent_key_scale: f32,
    /// Re-fit kept keys to the raw world pose through the reduced parent chain
    pub retarget: bool,
    /// When off, only the trivial filter runs
    pub actually_filter_linear_keys: bool,
}

impl Default for LinearKeyParams {
    fn default() -> Self {
        Self {
            max_pos_diff: 0.1,
            max_angle_diff: 0.025,
            max_scale_diff: 0.00001,
            max_effector_diff: 0.001,
            min_effector_diff: 0.001,
            effector_diff_socket: 0.001,
            parent_key_scale: 2.0,
            retarget: true,
            actually_filter_linear_keys: true,
        }
    }
}

impl LinearKeyParams {
    /// Every error budget multiplied by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            max_pos_diff: self.max_pos_diff * factor,
            max_angle_diff: self.max_angle_diff * factor,
            max_scale_diff: self.max_scale_diff * factor,
            max_effector_diff: self.max_effector_diff * factor,
            min_effector_diff: self.min_effector_diff * factor,
            effector_diff_socket: self.effector_diff_socket * factor,
            ..*self
        }
    }

    pub fn local_tolerances(&self) -> ChannelTolerances {
        ChannelTolerances {
            translation: self.max_pos_diff,
            rotation: self.max_angle_diff,
            scale: self.max_scale_diff,
        }
    }
}

// ============================================================================
// Pose tables
// ============================================================================

/// Frame-major `[frame][bone]` tables of raw world and reduced local transforms
struct PoseTables {
    num_bones: usize,
    raw_world: Vec<Transform>,
    new_local: Vec<Transform>,
}

impl PoseTables {
    fn build(seq: &AnimSequence, bones: &[BoneData], tracks: &SeparatedTracks) -> Self {
        let num_frames = seq.num_frames as usize;
        let num_bones = bones.len();
        let bone_to_track = seq.bone_to_track(num_bones);

        let mut raw_local = vec![Transform::IDENTITY; num_frames * num_bones];
        let mut new_local = vec![Transform::IDENTITY; num_frames * num_bones];
        for frame in 0..num_frames {
            let time = seq.frame_time(frame as u32);
            for (bone, data) in bones.iter().enumerate() {
                let slot = frame * num_bones + bone;
                match bone_to_track[bone] {
                    Some(track) => {
                        raw_local[slot] = seq.raw_frame(track, frame);
                        new_local[slot] = evaluate_tracks(tracks, track, time);
                    }
                    None => {
                        raw_local[slot] = data.ref_pose();
                        new_local[slot] = data.ref_pose();
                    }
                }
            }
        }

        let mut raw_world = vec![Transform::IDENTITY; num_frames * num_bones];
        if num_bones > 0 {
            for (local, world) in raw_local
                .chunks_exact(num_bones)
                .zip(raw_world.chunks_exact_mut(num_bones))
            {
                compose_pose(bones, local, world);
            }
        }

        Self {
            num_bones,
            raw_world,
            new_local,
        }
    }

    #[inline]
    fn slot(&self, frame: usize, bone: usize) -> usize {
        frame * self.num_bones + bone
    }

    /// Component-space transform of `bone` at `frame` from the reduced locals
    fn reduced_world(&self, bones: &[BoneData], frame: usize, bone: usize) -> Transform {
        let mut result = self.new_local[self.slot(frame, bone)];
        for &ancestor in &bones[bone].bones_to_root {
            result = result.compose(&self.new_local[self.slot(frame, ancestor)]);
            result.normalize_rotation();
        }
        result
    }
}

fn evaluate_tracks(tracks: &SeparatedTracks, track: usize, time: f32) -> Transform {
    Transform::new(
        tracks.rotation[track].evaluate(time),
        tracks.translation[track].evaluate(time),
        tracks
            .scale
            .get(track)
            .map(|s| s.evaluate(time))
            .unwrap_or(Vec3::ONE),
    )
}

// ============================================================================
// Channel pass
// ============================================================================

struct Effector {
    bone: usize,
    tolerance: f32,
    dummy_length: f32,
}

/// Everything needed to test spans of one channel of one bone
struct ChannelPass<'a> {
    bones: &'a [BoneData],
    bone: usize,
    num_frames: u32,
    sequence_length: f32,
    effectors: &'a [Effector],
    /// Reduced world transform of the parent, per frame
    parent_world: &'a [Transform],
    /// Whether the parent's track for this channel kept a key, per frame
    parent_keyed: Vec<bool>,
    parent_key_scale: f32,
    local_tolerance: f32,
}

impl ChannelPass<'_> {
    /// Whether every key strictly between `low` and `high` is reproduced by interpolation
    fn span_ok<T: TrackValue>(
        &self,
        track: &Track<T>,
        low: usize,
        high: usize,
        tables: &PoseTables,
        set: &impl Fn(&mut Transform, T),
    ) -> bool {
        let t0 = track.times[low];
        let span = track.times[high] - t0;
        for i in low + 1..high {
            let alpha = if span > 0.0 { (track.times[i] - t0) / span } else { 0.0 };
            let value = T::interpolate(track.keys[low], track.keys[high], alpha);
            if T::error(value, track.keys[i]) > self.local_tolerance {
                return false;
            }
            if self.effectors.is_empty() {
                continue;
            }

            let frame =
                time_to_frame(track.times[i], self.num_frames, self.sequence_length) as usize;
            let mut trial = tables.new_local[tables.slot(frame, self.bone)];
            set(&mut trial, value);
            let trial_world = match self.parent_world.get(frame) {
                Some(parent) => trial.compose(parent),
                None => trial,
            };
            let boost = if self.parent_keyed.get(frame).copied().unwrap_or(false) {
                self.parent_key_scale
            } else {
                1.0
            };

            for effector in self.effectors {
                let world = self.effector_world(tables, frame, &trial_world, effector.bone);
                let raw = &tables.raw_world[tables.slot(frame, effector.bone)];
                let tip = Vec3::splat(effector.dummy_length);
                let drift = raw.transform_point(tip).distance(world.transform_point(tip));
                if drift * boost > effector.tolerance {
                    return false;
                }
            }
        }
        true
    }

    /// World transform of `effector` with this pass's bone replaced by `trial_world`
    fn effector_world(
        &self,
        tables: &PoseTables,
        frame: usize,
        trial_world: &Transform,
        effector: usize,
    ) -> Transform {
        if effector == self.bone {
            return *trial_world;
        }
        let mut result = tables.new_local[tables.slot(frame, effector)];
        for &ancestor in &self.bones[effector].bones_to_root {
            if ancestor == self.bone {
                result = result.compose(trial_world);
                break;
            }
            result = result.compose(&tables.new_local[tables.slot(frame, ancestor)]);
        }
        result.normalize_rotation();
        result
    }

    /// Runs span search over `track`, optionally retargets, and writes the result
    /// into the pose table
    fn reduce<T: TrackValue>(
        &self,
        track: &mut Track<T>,
        tables: &mut PoseTables,
        set: impl Fn(&mut Transform, T),
        retarget: Option<impl Fn(&Transform, &Transform) -> T>,
    ) {
        let before = track.len();
        if before > 2 {
            let kept = find_kept_keys(before, |low, high| {
                self.span_ok(track, low, high, tables, &set)
            });
            track.retain_indices(&kept);

            if let Some(retarget) = retarget {
                for (time, key) in track.times.iter().zip(track.keys.iter_mut()) {
                    let frame =
                        time_to_frame(*time, self.num_frames, self.sequence_length) as usize;
                    let parent = self
                        .parent_world
                        .get(frame)
                        .copied()
                        .unwrap_or(Transform::IDENTITY);
                    if self.bone < tables.num_bones {
                        let raw = tables.raw_world[tables.slot(frame, self.bone)];
                        *key = retarget(&parent, &raw);
                    }
                }
            }
        }

        if self.bone < tables.num_bones {
            for frame in 0..self.num_frames as usize {
                let time = frame_to_time(frame as u32, self.num_frames, self.sequence_length);
                let slot = tables.slot(frame, self.bone);
                set(&mut tables.new_local[slot], track.evaluate(time));
            }
        }
    }
}

/// Exponential growth then bisection for the furthest acceptable high key.
///
/// Always keeps the first and last key.
fn find_kept_keys(len: usize, mut span_ok: impl FnMut(usize, usize) -> bool) -> Vec<usize> {
    let mut kept = vec![0];
    if len <= 1 {
        return kept;
    }
    let last = len - 1;
    let mut low = 0;
    while low < last {
        let mut good = low + 1;
        let mut bad = None;
        let mut step = 2;
        loop {
            let candidate = (low + step).min(last);
            if candidate <= good {
                break;
            }
            if span_ok(low, candidate) {
                good = candidate;
                if candidate == last {
                    break;
                }
                step *= 2;
            } else {
                bad = Some(candidate);
                break;
            }
        }
        if let Some(mut bad) = bad {
            while bad - good > 1 {
                let mid = (good + bad) / 2;
                if span_ok(low, mid) {
                    good = mid;
                } else {
                    bad = mid;
                }
            }
        }
        kept.push(good);
        low = good;
    }
    kept
}

fn keyed_frames<T: TrackValue>(
    track: Option<&Track<T>>,
    num_frames: u32,
    sequence_length: f32,
) -> Vec<bool> {
    let mut keyed = vec![false; num_frames as usize];
    if let Some(track) = track.filter(|t| t.len() > 1) {
        for frame in track.frame_indices(num_frames, sequence_length) {
            if let Some(slot) = keyed.get_mut(frame as usize) {
                *slot = true;
            }
        }
    }
    keyed
}

// ============================================================================
// Entry point
// ============================================================================

/// Removes linearly reproducible keys from every track.
///
/// `tolerances` overrides the local budgets per track (adaptive error);
/// otherwise the budgets of `params` apply to every track.
pub fn remove_linear_keys(
    seq: &AnimSequence,
    bones: &[BoneData],
    tracks: &mut SeparatedTracks,
    params: &LinearKeyParams,
    tolerances: Option<&[ChannelTolerances]>,
) {
    if !params.actually_filter_linear_keys || seq.num_frames <= 2 {
        return;
    }
    let num_frames = seq.num_frames;
    let sequence_length = seq.sequence_length;
    let keys_before = tracks.total_keys();
    let mut tables = PoseTables::build(seq, bones, tracks);

    // parents precede children in bone order
    let mut order: Vec<usize> = (0..tracks.num_tracks()).collect();
    order.sort_by_key(|&t| seq.track_to_bone.get(t).copied().unwrap_or(usize::MAX));
    let bone_to_track = seq.bone_to_track(bones.len());

    for track_index in order {
        let bone = seq.track_to_bone.get(track_index).copied().unwrap_or(usize::MAX);
        let in_skeleton = bone < bones.len();
        if !in_skeleton {
            warn!(
                track = track_index,
                bone,
                "track bone outside skeleton, reducing without effector checks"
            );
        }

        let effectors: Vec<Effector> = if in_skeleton {
            bones[bone]
                .end_effectors
                .iter()
                .map(|&effector| {
                    let tolerance = if bones[effector].is_sensitive_effector() {
                        params.effector_diff_socket
                    } else if bones[bone].is_end_effector() {
                        params.min_effector_diff
                    } else {
                        params.max_effector_diff
                    };
                    Effector {
                        bone: effector,
                        tolerance,
                        dummy_length: dummy_bone_length(&bones[effector]),
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        let parent = if in_skeleton { bones[bone].parent() } else { None };
        let parent_world: Vec<Transform> = match parent {
            Some(parent) => (0..num_frames as usize)
                .map(|frame| tables.reduced_world(bones, frame, parent))
                .collect(),
            None => Vec::new(),
        };
        let parent_track = parent.and_then(|p| bone_to_track.get(p).copied().flatten());

        let local = tolerances
            .and_then(|t| t.get(track_index).copied())
            .unwrap_or_else(|| params.local_tolerances());

        let mut pass = ChannelPass {
            bones,
            bone,
            num_frames,
            sequence_length,
            effectors: &effectors,
            parent_world: &parent_world,
            parent_keyed: Vec::new(),
            parent_key_scale: params.parent_key_scale,
            local_tolerance: local.translation,
        };

        let parent_keys = parent_track.map(|p| &tracks.translation[p]);
        pass.parent_keyed = keyed_frames(parent_keys, num_frames, sequence_length);
        pass.reduce(
            &mut tracks.translation[track_index],
            &mut tables,
            |t: &mut Transform, v: Vec3| t.translation = v,
            params.retarget.then_some(|parent: &Transform, raw: &Transform| {
                parent.inverse_transform_point(raw.translation)
            }),
        );

        pass.local_tolerance = local.rotation;
        let parent_keys = parent_track.map(|p| &tracks.rotation[p]);
        pass.parent_keyed = keyed_frames(parent_keys, num_frames, sequence_length);
        pass.reduce(
            &mut tracks.rotation[track_index],
            &mut tables,
            |t: &mut Transform, v: Quat| t.rotation = v,
            params.retarget.then_some(|parent: &Transform, raw: &Transform| {
                (parent.rotation.inverse() * raw.rotation).normalize()
            }),
        );

        if tracks.has_scale() {
            pass.local_tolerance = local.scale;
            let parent_keys = parent_track.map(|p| &tracks.scale[p]);
            pass.parent_keyed = keyed_frames(parent_keys, num_frames, sequence_length);
            pass.reduce(
                &mut tracks.scale[track_index],
                &mut tables,
                |t: &mut Transform, v: Vec3| t.scale = v,
                params.retarget.then_some(|parent: &Transform, raw: &Transform| {
                    raw.scale * safe_reciprocal(parent.scale)
                }),
            );
        }
    }

    debug!(
        keys_before,
        keys_after = tracks.total_keys(),
        "linear key removal"
    );
}
