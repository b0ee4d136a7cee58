//! Per-track error budgets
//!
//! Two heuristics scale a base budget per track: by distance from the nearest
//! end effector, or by measured sensitivity of the end effectors to a small
//! perturbation of the track. Both are tuning policies, not format contracts.

use serde::{Deserialize, Serialize};

use crate::measure::{PerturbationProbes, TrackPerturbation};
use crate::skeleton::{BoneData, track_heights};

/// Smallest budget the perturbation policy hands out
pub const MIN_ADAPTIVE_TOLERANCE: f32 = 1.0e-6;

/// Largest multiple of the base budget the perturbation policy hands out
pub const MAX_ADAPTIVE_RELAXATION: f32 = 8.0;

/// Error budget per channel of one track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelTolerances {
    pub translation: f32,
    pub rotation: f32,
    pub scale: f32,
}

impl ChannelTolerances {
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            translation: self.translation * factor,
            rotation: self.rotation * factor,
            scale: self.scale * factor,
        }
    }

    /// Component-wise `self / base`, 1 where `base` is zero
    pub fn ratio_to(self, base: &ChannelTolerances) -> Self {
        let ratio = |value: f32, base: f32| if base > 0.0 { value / base } else { 1.0 };
        Self {
            translation: ratio(self.translation, base.translation),
            rotation: ratio(self.rotation, base.rotation),
            scale: ratio(self.scale, base.scale),
        }
    }

    /// Component-wise product
    pub fn times(self, factors: &ChannelTolerances) -> Self {
        Self {
            translation: self.translation * factors.translation,
            rotation: self.rotation * factors.rotation,
            scale: self.scale * factors.scale,
        }
    }
}

/// How per-track budgets are derived
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdaptiveError {
    /// Same budget for every track
    #[default]
    None,
    /// `1 / divisor^(height^exponent)` of the budget, tighter towards the root
    TrackHeight {
        parenting_divisor: f32,
        parenting_divisor_exponent: f32,
    },
    /// Budget that keeps the induced end effector error near `target_error`
    Perturbation { target_error: f32 },
}

/// Budget multiplier for a track `height` bones above its nearest end effector
pub fn height_scale(height: u32, parenting_divisor: f32, parenting_divisor_exponent: f32) -> f32 {
    let divisor = if parenting_divisor > 0.0 { parenting_divisor } else { 1.0 };
    1.0 / divisor.powf((height as f32).powf(parenting_divisor_exponent))
}

pub fn height_based_tolerances(
    bones: &[BoneData],
    track_to_bone: &[usize],
    base: ChannelTolerances,
    parenting_divisor: f32,
    parenting_divisor_exponent: f32,
) -> Vec<ChannelTolerances> {
    track_heights(bones, track_to_bone)
        .into_iter()
        .map(|height| {
            base.scaled(height_scale(height, parenting_divisor, parenting_divisor_exponent))
        })
        .collect()
}

/// Budgets from a perturbation tally: `target * probe / induced`, clamped.
///
/// Each channel is judged by the end effector position error its own probe caused.
pub fn perturbation_tolerances(
    tally: &[TrackPerturbation],
    probes: &PerturbationProbes,
    target_error: f32,
    base: ChannelTolerances,
) -> Vec<ChannelTolerances> {
    let magnitudes = probes.magnitudes();
    let budget = |probe: f32, induced: f32, base: f32| {
        let max = (base * MAX_ADAPTIVE_RELAXATION).max(MIN_ADAPTIVE_TOLERANCE);
        if induced <= f32::EPSILON {
            return max;
        }
        (target_error * probe / induced).clamp(MIN_ADAPTIVE_TOLERANCE, max)
    };
    tally
        .iter()
        .map(|t| ChannelTolerances {
            translation: budget(
                magnitudes.translation,
                t.due_to_translation.translation,
                base.translation,
            ),
            rotation: budget(magnitudes.rotation, t.due_to_rotation.translation, base.rotation),
            scale: budget(magnitudes.scale, t.due_to_scale.translation, base.scale),
        })
        .collect()
}

/// Resolves `policy` to one budget per track
pub fn resolve_tolerances(
    policy: &AdaptiveError,
    bones: &[BoneData],
    track_to_bone: &[usize],
    base: ChannelTolerances,
    perturbation: impl FnOnce() -> (Vec<TrackPerturbation>, PerturbationProbes),
) -> Vec<ChannelTolerances> {
    match *policy {
        AdaptiveError::None => vec![base; track_to_bone.len()],
        AdaptiveError::TrackHeight {
            parenting_divisor,
            parenting_divisor_exponent,
        } => height_based_tolerances(
            bones,
            track_to_bone,
            base,
            parenting_divisor,
            parenting_divisor_exponent,
        ),
        AdaptiveError::Perturbation { target_error } => {
            let (tally, probes) = perturbation();
            perturbation_tolerances(&tally, &probes, target_error, base)
        }
    }
}
