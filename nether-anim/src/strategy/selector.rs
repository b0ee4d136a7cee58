//! Automatic strategy selection
//!
//! Starts from a fallback encoding, then tries a fixed list of candidates and
//! keeps whichever beats the running winner according to [`is_better`]:
//!
//! ```text
//! fallback (default codec or least destructive)
//!   -> progressive per-track search
//!   -> bitwise, every-second-key, linear removal (legacy layout)
//!   -> per-track variants (linear, height/perturbation adaptive, downsampled)
//! ```
//!
//! A candidate that fails to encode is skipped. The winner is never larger than
//! the fallback unless `force_below_threshold` trades size for accuracy.

use tracing::{debug, info, warn};

use super::{
    BitwiseParams, CompressionOutcome, CompressionSession, CompressionStrategy, DecimationParams,
    PerTrackParams, RemoveLinearParams, compress_with_strategy,
};
use crate::config::CompressionSettings;
use crate::encoder::PerTrackEncoding;
use crate::error::CodecError;
use crate::formats::{ChannelFormats, Format};
use crate::measure::compute_compression_error;
use crate::reduction::{AdaptiveError, LinearKeyParams};
use crate::sequence::AnimSequence;
use crate::skeleton::BoneData;

/// Frame rates tried by the progressive search, coarsest first
const PROGRESSIVE_RESAMPLE_RATES: [f32; 5] = [5.0, 6.0, 10.0, 15.0, 20.0];

/// Halving steps of the progressive linear and bitwise searches
const PROGRESSIVE_STEPS: usize = 16;

/// Divisor of the first, least aggressive, progressive linear attempt
const PROGRESSIVE_LINEAR_SCALE: f32 = 65536.0;

/// Multiplier of the first, loosest, progressive bitwise attempt
const PROGRESSIVE_BITWISE_SCALE: f32 = 16.0;

/// Size and error of an encoding, the inputs of [`is_better`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measured {
    pub size: usize,
    pub error: f32,
}

/// Whether `candidate` should replace `winner`.
///
/// Within `tolerance`, a smaller candidate wins, and so does a lower-error one
/// that is no larger. With `force_below_threshold`, any error reduction wins
/// while the winner itself is above `tolerance`.
pub fn is_better(
    candidate: Measured,
    winner: Measured,
    tolerance: f32,
    force_below_threshold: bool,
) -> bool {
    let lowers_error = candidate.error < winner.error;
    let within_tolerance = candidate.error <= tolerance;

    let reduces_error_below_threshold =
        force_below_threshold && lowers_error && winner.error > tolerance;
    let saves_space = within_tolerance && candidate.size < winner.size;
    let lowers_error_same_size = within_tolerance && lowers_error && candidate.size <= winner.size;

    reduces_error_below_threshold || saves_space || lowers_error_same_size
}

/// One entry of the fixed candidate list
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: &'static str,
    pub strategy: CompressionStrategy,
}

impl Candidate {
    fn new(label: &'static str, strategy: CompressionStrategy) -> Self {
        Self { label, strategy }
    }
}

fn rotation_only(rotation: Format) -> ChannelFormats {
    ChannelFormats::new(Format::None, rotation, Format::None)
}

fn height_adaptive(parenting_divisor: f32, parenting_divisor_exponent: f32) -> AdaptiveError {
    AdaptiveError::TrackHeight {
        parenting_divisor,
        parenting_divisor_exponent,
    }
}

fn linear(retarget: bool) -> Option<LinearKeyParams> {
    Some(LinearKeyParams {
        retarget,
        ..LinearKeyParams::default()
    })
}

/// Looser bitwise budgets used with perturbation-adaptive tolerances
fn perturbation_encoding() -> PerTrackEncoding {
    PerTrackEncoding {
        max_pos_diff_bitwise: 0.05,
        max_angle_diff_bitwise: 0.02,
        max_scale_diff_bitwise: 0.00005,
        ..PerTrackEncoding::default()
    }
}

/// Candidates tried after the progressive search, in order, filtered by `settings`
pub fn candidate_list(
    settings: &CompressionSettings,
    num_frames: u32,
    tolerance: f32,
) -> Vec<Candidate> {
    let num_frames = num_frames as usize;
    let mut list = Vec::new();

    if settings.try_fixed_bitwise_compression {
        for (label, rotation) in [
            ("Bitwise_Float96", Format::Float96),
            ("Bitwise_Fixed48", Format::Fixed48),
        ] {
            list.push(Candidate::new(
                label,
                CompressionStrategy::BitwiseOnly(BitwiseParams::new(rotation_only(rotation))),
            ));
        }
    }

    let decimation = DecimationParams::default();
    if settings.try_fixed_bitwise_compression
        && settings.try_interval_key_removal
        && num_frames > decimation.min_keys
    {
        for (label, start_at_second_key, rotation) in [
            ("HalfOdd_Float96", false, Format::Float96),
            ("HalfOdd_Fixed48", false, Format::Fixed48),
            ("HalfEven_Float96", true, Format::Float96),
            ("HalfEven_Fixed48", true, Format::Fixed48),
        ] {
            list.push(Candidate::new(
                label,
                CompressionStrategy::RemoveEverySecondKey(DecimationParams {
                    formats: rotation_only(rotation),
                    start_at_second_key,
                    ..decimation
                }),
            ));
        }
    }

    if settings.try_linear_key_removal_compression && num_frames > 1 {
        for (label, rotation) in [
            ("Linear_Float96", Format::Float96),
            ("Linear_Fixed48", Format::Fixed48),
        ] {
            list.push(Candidate::new(
                label,
                CompressionStrategy::RemoveLinearKeys(RemoveLinearParams {
                    formats: rotation_only(rotation),
                    ..RemoveLinearParams::default()
                }),
            ));
        }
    }

    if !settings.try_per_track_bitwise_compression {
        return list;
    }
    let per_track = |label, params: PerTrackParams| {
        Candidate::new(label, CompressionStrategy::PerTrack(params))
    };

    list.push(per_track("Bitwise_PerTrack", PerTrackParams::default()));
    list.push(per_track(
        "Linear_PerTrack",
        PerTrackParams {
            linear: linear(true),
            ..PerTrackParams::default()
        },
    ));
    for (label, retarget) in [
        ("Adaptive1_LinPerTrackNoRT", false),
        ("Adaptive1_LinPerTrack", true),
    ] {
        list.push(per_track(
            label,
            PerTrackParams {
                linear: linear(retarget),
                adaptive: height_adaptive(2.0, 1.6),
                ..PerTrackParams::default()
            },
        ));
    }

    if num_frames > 1 {
        for (label, max_pos_diff, max_scale_diff) in [
            ("Linear_PerTrackExp1", 0.1, 0.00001),
            ("Linear_PerTrackExp2", 0.01, 0.000001),
        ] {
            list.push(per_track(
                label,
                PerTrackParams {
                    linear: Some(LinearKeyParams {
                        max_pos_diff,
                        max_scale_diff,
                        ..LinearKeyParams::default()
                    }),
                    adaptive: height_adaptive(2.0, 1.0),
                    ..PerTrackParams::default()
                },
            ));
        }
    }

    let resampling = PerTrackParams::default();
    if settings.try_interval_key_removal && num_frames >= resampling.min_keys_for_resampling {
        for (label, rate) in [
            ("Downsample20Hz_PerTrack", 20.0),
            ("Downsample15Hz_PerTrack", 15.0),
            ("Downsample10Hz_PerTrack", 10.0),
            ("Downsample5Hz_PerTrack", 5.0),
        ] {
            list.push(per_track(
                label,
                PerTrackParams {
                    resampled_framerate: Some(rate),
                    ..resampling.clone()
                },
            ));
        }
        for (label, rate) in [
            ("Adaptive1_15Hz_LinPerTrack", 15.0),
            ("Adaptive1_10Hz_LinPerTrack", 10.0),
            ("Adaptive1_5Hz_LinPerTrack", 5.0),
        ] {
            list.push(per_track(
                label,
                PerTrackParams {
                    resampled_framerate: Some(rate),
                    linear: linear(false),
                    adaptive: height_adaptive(2.0, 1.6),
                    ..resampling.clone()
                },
            ));
        }
    }

    let perturbation = AdaptiveError::Perturbation { target_error: tolerance };
    if settings.try_interval_key_removal && num_frames >= 3 {
        for (label, rate) in [
            ("Adaptive2_15Hz_LinPerTrack", 15.0),
            ("Adaptive2_10Hz_LinPerTrack", 10.0),
        ] {
            list.push(per_track(
                label,
                PerTrackParams {
                    encoding: perturbation_encoding(),
                    resampled_framerate: Some(rate),
                    min_keys_for_resampling: 3,
                    linear: linear(true),
                    adaptive: perturbation,
                    ..PerTrackParams::default()
                },
            ));
        }
    }

    for (label, linear_removal) in [
        ("Adaptive2_PerTrack", None),
        ("Adaptive2_LinPerTrack", linear(true)),
        ("Adaptive2_LinPerTrackNoRT", linear(false)),
    ] {
        list.push(per_track(
            label,
            PerTrackParams {
                encoding: perturbation_encoding(),
                linear: linear_removal,
                adaptive: perturbation,
                ..PerTrackParams::default()
            },
        ));
    }

    list
}

// ============================================================================
// Selection
// ============================================================================

struct Selector<'a> {
    seq: &'a AnimSequence,
    bones: &'a [BoneData],
    settings: &'a CompressionSettings,
    session: &'a mut CompressionSession,
    tolerance: f32,
    winner: CompressionOutcome,
}

impl Selector<'_> {
    fn winner_measured(&self) -> Measured {
        Measured {
            size: self.winner.compressed.approx_compressed_size(),
            error: self.winner.error.max_error,
        }
    }

    /// Compresses with `strategy`, keeps it if it beats the winner, and returns its max error
    fn try_strategy(&mut self, label: &str, strategy: CompressionStrategy) -> f32 {
        self.session.record_attempt(label);
        let order = self.settings.byte_order;
        let compressed = match compress_with_strategy(self.seq, self.bones, &strategy, order) {
            Ok(compressed) => compressed,
            Err(err) => {
                debug!(candidate = label, error = %err, "candidate failed");
                return f32::INFINITY;
            }
        };
        let error = compute_compression_error(self.seq, &compressed, self.bones);
        let measured = Measured {
            size: compressed.approx_compressed_size(),
            error: error.max_error,
        };
        let winner = self.winner_measured();
        let keep = is_better(measured, winner, self.tolerance, self.settings.force_below_threshold);
        debug!(
            candidate = label,
            size = measured.size,
            saved = winner.size as i64 - measured.size as i64,
            max_error = measured.error,
            keep,
            "candidate"
        );

        if keep {
            self.session
                .record_improvement(label, winner.size as i64 - measured.size as i64);
            self.winner = CompressionOutcome {
                compressed,
                error,
                strategy,
                label: label.to_string(),
            };
        }
        measured.error
    }

    fn try_per_track(&mut self, params: &PerTrackParams) -> f32 {
        self.try_strategy("Progressive_PerTrack", CompressionStrategy::PerTrack(params.clone()))
    }

    /// Perturbation-adaptive per-track compression, then progressively more
    /// aggressive resampling, linear key removal and bitwise budgets while the
    /// error stays under the tolerance
    fn progressive_per_track(&mut self) {
        let tolerance = self.tolerance;
        let num_frames = self.seq.num_frames as usize;
        let mut params = PerTrackParams {
            adaptive: AdaptiveError::Perturbation { target_error: tolerance },
            ..PerTrackParams::default()
        };

        if self.try_per_track(&params) >= tolerance {
            debug!("standard per-track budgets too aggressive, skipping progressive search");
            return;
        }

        if self.settings.try_interval_key_removal && num_frames >= params.min_keys_for_resampling {
            let rate = PROGRESSIVE_RESAMPLE_RATES.into_iter().find(|&rate| {
                params.resampled_framerate = Some(rate);
                self.try_per_track(&params) < tolerance
            });
            if rate.is_none() {
                debug!("resampling exceeded tolerance at every rate");
                params.resampled_framerate = None;
            }
        }

        if num_frames > 1 {
            let linear = LinearKeyParams::default();
            params.linear = Some(linear.scaled(1.0 / PROGRESSIVE_LINEAR_SCALE));
            let mut error = self.try_per_track(&params);
            if error < tolerance {
                let mut scale = 1.0;
                params.linear = Some(linear);
                error = self.try_per_track(&params);
                for _ in 0..PROGRESSIVE_STEPS {
                    if error < tolerance {
                        break;
                    }
                    scale *= 0.5;
                    params.linear = Some(linear.scaled(scale));
                    error = self.try_per_track(&params);
                }
            }
            if error >= tolerance {
                debug!("linear key removal exceeded tolerance");
                params.linear = None;
            }
        }

        let base = params.encoding.bitwise_tolerances();
        let mut scale = PROGRESSIVE_BITWISE_SCALE;
        params.encoding = params.encoding.with_tolerances(base.scaled(scale));
        let mut error = self.try_per_track(&params);
        for _ in 0..PROGRESSIVE_STEPS {
            scale *= 0.5;
            let budgets = base.scaled(scale);
            if error < tolerance || budgets.translation < params.encoding.max_zeroing_threshold {
                break;
            }
            params.encoding = params.encoding.with_tolerances(budgets);
            error = self.try_per_track(&params);
        }
    }
}

/// Strategy the selector starts from
fn fallback_strategy(settings: &CompressionSettings) -> (&'static str, CompressionStrategy) {
    if settings.first_recompress_using_current_or_default {
        (
            "Recompress_Default",
            CompressionStrategy::BitwiseOnly(BitwiseParams::new(settings.default_codec)),
        )
    } else {
        ("LeastDestructive", CompressionStrategy::LeastDestructive)
    }
}

/// Compresses a sanitised sequence with every enabled candidate and returns the best
pub(super) fn select_best(
    seq: &AnimSequence,
    bones: &[BoneData],
    settings: &CompressionSettings,
    session: &mut CompressionSession,
) -> Result<CompressionOutcome, CodecError> {
    let (mut label, mut strategy) = fallback_strategy(settings);
    session.record_attempt(label);
    let compressed = match compress_with_strategy(seq, bones, &strategy, settings.byte_order) {
        Ok(compressed) => compressed,
        Err(err) if strategy != CompressionStrategy::LeastDestructive => {
            warn!(
                sequence = %seq.name,
                error = %err,
                "default codec failed, using least destructive"
            );
            (label, strategy) = ("LeastDestructive", CompressionStrategy::LeastDestructive);
            session.record_attempt(label);
            compress_with_strategy(seq, bones, &strategy, settings.byte_order)?
        }
        Err(err) => return Err(err),
    };
    let error = compute_compression_error(seq, &compressed, bones);
    let fallback_size = compressed.approx_compressed_size();
    info!(
        sequence = %seq.name,
        frames = seq.num_frames,
        length = seq.sequence_length,
        candidate = label,
        size = fallback_size,
        max_error = error.max_error,
        "starting compression"
    );

    let mut tolerance = settings.alternative_compression_threshold;
    if settings.raise_max_error_to_existing && error.max_error > tolerance {
        debug!(from = tolerance, to = error.max_error, "raising tolerance to existing error");
        tolerance = error.max_error;
    }

    let mut selector = Selector {
        seq,
        bones,
        settings,
        session,
        tolerance,
        winner: CompressionOutcome {
            compressed,
            error,
            strategy,
            label: label.to_string(),
        },
    };

    if tolerance > 0.0 {
        if settings.try_per_track_bitwise_compression {
            selector.progressive_per_track();
        }
        for candidate in candidate_list(settings, seq.num_frames, tolerance) {
            selector.try_strategy(candidate.label, candidate.strategy);
        }
    }

    let winner = selector.winner;
    let size = winner.compressed.approx_compressed_size();
    selector
        .session
        .record_win(&winner.label, winner.error.max_error, fallback_size, size);
    info!(
        sequence = %seq.name,
        candidate = %winner.label,
        size,
        saved = fallback_size as i64 - size as i64,
        max_error = winner.error.max_error,
        "compression winner"
    );
    Ok(winner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured(size: usize, error: f32) -> Measured {
        Measured { size, error }
    }

    #[test]
    fn test_smaller_within_tolerance_wins() {
        assert!(is_better(measured(80, 0.5), measured(100, 0.1), 1.0, false));
        assert!(!is_better(measured(80, 1.5), measured(100, 0.1), 1.0, false));
        assert!(!is_better(measured(100, 0.5), measured(100, 0.5), 1.0, false));
    }

    #[test]
    fn test_lower_error_same_size_wins() {
        assert!(is_better(measured(100, 0.2), measured(100, 0.5), 1.0, false));
        assert!(!is_better(measured(120, 0.2), measured(100, 0.5), 1.0, false));
    }

    #[test]
    fn test_force_below_threshold() {
        // winner above tolerance: a bigger but more accurate candidate only wins when forced
        let winner = measured(100, 3.0);
        let candidate = measured(150, 2.0);
        assert!(!is_better(candidate, winner, 1.0, false));
        assert!(is_better(candidate, winner, 1.0, true));
        // winner already within tolerance: forcing changes nothing
        assert!(!is_better(measured(150, 0.1), measured(100, 0.5), 1.0, true));
    }

    #[test]
    fn test_failed_candidate_never_wins() {
        assert!(!is_better(measured(0, f32::INFINITY), measured(100, 0.5), 1.0, true));
    }

    #[test]
    fn test_candidate_list_full() {
        let list = candidate_list(&CompressionSettings::default(), 60, 1.0);
        let labels: Vec<&str> = list.iter().map(|c| c.label).collect();
        assert_eq!(labels.first(), Some(&"Bitwise_Float96"));
        assert!(labels.contains(&"HalfEven_Fixed48"));
        assert!(labels.contains(&"Downsample5Hz_PerTrack"));
        assert_eq!(labels.last(), Some(&"Adaptive2_LinPerTrackNoRT"));

        let mut unique = labels.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), labels.len());
    }

    #[test]
    fn test_candidate_list_gating() {
        let settings = CompressionSettings {
            try_fixed_bitwise_compression: false,
            try_per_track_bitwise_compression: false,
            try_linear_key_removal_compression: false,
            ..CompressionSettings::default()
        };
        assert!(candidate_list(&settings, 60, 1.0).is_empty());

        // short sequences skip decimation and downsampling
        let labels: Vec<&str> = candidate_list(&CompressionSettings::default(), 5, 1.0)
            .iter()
            .map(|c| c.label)
            .collect();
        assert!(!labels.iter().any(|l| l.starts_with("Half")));
        assert!(!labels.iter().any(|l| l.starts_with("Downsample")));
        assert!(labels.contains(&"Adaptive2_10Hz_LinPerTrack"));
        assert!(labels.contains(&"Linear_Fixed48"));
    }

    #[test]
    fn test_perturbation_target_follows_tolerance() {
        let list = candidate_list(&CompressionSettings::default(), 60, 0.25);
        let Some(Candidate {
            strategy: CompressionStrategy::PerTrack(params),
            ..
        }) = list.iter().find(|c| c.label == "Adaptive2_PerTrack")
        else {
            panic!("missing perturbation candidate");
        };
        assert_eq!(params.adaptive, AdaptiveError::Perturbation { target_error: 0.25 });
        assert_eq!(params.encoding.max_angle_diff_bitwise, 0.02);
    }
}
