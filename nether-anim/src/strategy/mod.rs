//! Compression strategies and the pipeline that runs them
//!
//! Every strategy follows the same pipeline over a sanitised sequence:
//!
//! ```text
//! separate raw tracks -> trivial filter -> key reduction -> encode
//! ```
//!
//! The reduction step and the encoder differ per strategy:
//!
//! | strategy                | reduction                                   | encoder   |
//! |-------------------------|---------------------------------------------|-----------|
//! | `LeastDestructive`      | none                                        | legacy    |
//! | `BitwiseOnly`           | none                                        | legacy    |
//! | `RemoveEverySecondKey`  | drop alternate keys                         | legacy    |
//! | `RemoveLinearKeys`      | linear key removal                          | legacy    |
//! | `PerTrack`              | resampling, linear removal, adaptive budget | per-track |
//!
//! `Automatic` runs the candidate selector in [`selector`], which tries many
//! configurations of the strategies above and keeps the best.

mod params;
mod selector;
mod session;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compressed::CompressedAnimation;
use crate::config::CompressionSettings;
use crate::encoder::{SequenceInfo, encode_legacy, encode_per_track};
use crate::error::CodecError;
use crate::formats::{ByteOrder, ChannelFormats, Format};
use crate::measure::{
    ErrorStats, PerturbationProbes, compute_compression_error, tally_errors_from_perturbation,
};
use crate::reduction::{
    AdaptiveError, ChannelTolerances, TrivialThresholds, filter_trivial_keys,
    remove_every_second_key, remove_linear_keys, resample_tracks, resolve_tolerances,
};
use crate::sequence::AnimSequence;
use crate::skeleton::{BoneData, SkeletonProvider, build_skeleton_metadata};
use crate::track::SeparatedTracks;

pub use params::{BitwiseParams, DecimationParams, PerTrackParams, RemoveLinearParams};
pub use selector::{Candidate, Measured, candidate_list, is_better};
pub use session::{CandidateTally, CompressionSession};

/// Formats of the least destructive encoding: everything stored as full floats
pub const LEAST_DESTRUCTIVE_FORMATS: ChannelFormats =
    ChannelFormats::new(Format::None, Format::None, Format::None);

/// A compression technique and its parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompressionStrategy {
    /// Try every enabled candidate and keep the best
    #[default]
    Automatic,
    /// Uncompressed keys, trivial keys collapsed
    LeastDestructive,
    BitwiseOnly(BitwiseParams),
    RemoveEverySecondKey(DecimationParams),
    RemoveLinearKeys(RemoveLinearParams),
    PerTrack(PerTrackParams),
}

impl CompressionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Automatic => "Automatic",
            Self::LeastDestructive => "LeastDestructive",
            Self::BitwiseOnly(_) => "BitwiseCompressOnly",
            Self::RemoveEverySecondKey(_) => "RemoveEverySecondKey",
            Self::RemoveLinearKeys(_) => "RemoveLinearKeys",
            Self::PerTrack(_) => "PerTrackCompression",
        }
    }
}

/// Result of [`compress`]
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub compressed: CompressedAnimation,
    /// End effector error against the sanitised raw data
    pub error: ErrorStats,
    /// Strategy that produced `compressed`
    pub strategy: CompressionStrategy,
    /// Candidate label, the strategy name outside automatic selection
    pub label: String,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs one strategy over an already sanitised sequence.
///
/// `Automatic` has no single encoding of its own; it is resolved by
/// [`compress`] and encodes like `LeastDestructive` here.
pub fn compress_with_strategy(
    seq: &AnimSequence,
    bones: &[BoneData],
    strategy: &CompressionStrategy,
    byte_order: ByteOrder,
) -> Result<CompressedAnimation, CodecError> {
    let info = SequenceInfo::from(seq);
    let mut tracks = seq.separate_raw_tracks();

    match strategy {
        CompressionStrategy::Automatic | CompressionStrategy::LeastDestructive => {
            filter_trivial_keys(&mut tracks, &TrivialThresholds::default());
            encode_legacy(&tracks, &info, LEAST_DESTRUCTIVE_FORMATS, byte_order)
        }
        CompressionStrategy::BitwiseOnly(params) => {
            filter_trivial_keys(&mut tracks, &params.trivial);
            encode_legacy(&tracks, &info, params.formats, byte_order)
        }
        CompressionStrategy::RemoveEverySecondKey(params) => {
            filter_trivial_keys(&mut tracks, &params.trivial);
            remove_every_second_key(&mut tracks, params.min_keys, params.start_at_second_key);
            encode_legacy(&tracks, &info, params.formats, byte_order)
        }
        CompressionStrategy::RemoveLinearKeys(params) => {
            filter_trivial_keys(&mut tracks, &params.trivial);
            remove_linear_keys(seq, bones, &mut tracks, &params.linear, None);
            encode_legacy(&tracks, &info, params.formats, byte_order)
        }
        CompressionStrategy::PerTrack(params) => {
            compress_per_track(seq, bones, params, tracks, &info, byte_order)
        }
    }
}

fn compress_per_track(
    seq: &AnimSequence,
    bones: &[BoneData],
    params: &PerTrackParams,
    mut tracks: SeparatedTracks,
    info: &SequenceInfo,
    byte_order: ByteOrder,
) -> Result<CompressedAnimation, CodecError> {
    filter_trivial_keys(&mut tracks, &params.trivial);
    if let Some(rate) = params.resampled_framerate {
        resample_tracks(
            &mut tracks,
            seq.num_frames,
            seq.sequence_length,
            rate,
            params.min_keys_for_resampling,
        );
    }

    let base = params.encoding.bitwise_tolerances();
    let budgets = resolve_tolerances(&params.adaptive, bones, &seq.track_to_bone, base, || {
        let probes = PerturbationProbes::default();
        (tally_errors_from_perturbation(seq, bones, &probes), probes)
    });

    if let Some(linear) = &params.linear {
        // linear budgets follow the same per-track relaxation as the bitwise ones
        let local: Vec<ChannelTolerances> = budgets
            .iter()
            .map(|budget| budget.ratio_to(&base).times(&linear.local_tolerances()))
            .collect();
        let overrides = (params.adaptive != AdaptiveError::None).then_some(local.as_slice());
        remove_linear_keys(seq, bones, &mut tracks, linear, overrides);
    }

    encode_per_track(&tracks, info, &params.encoding, Some(&budgets), byte_order)
}

/// Compresses `seq` for `skeleton`.
///
/// The sequence is cloned and sanitised first; `Automatic` runs the candidate
/// selector, every other strategy is applied directly. Either way the result is
/// measured and tallied in `session`.
pub fn compress(
    seq: &AnimSequence,
    skeleton: &impl SkeletonProvider,
    strategy: &CompressionStrategy,
    settings: &CompressionSettings,
    session: &mut CompressionSession,
) -> Result<CompressionOutcome, CodecError> {
    let mut seq = seq.clone();
    if seq.sanitize(Some(&TrivialThresholds::default()))? {
        debug!(sequence = %seq.name, "raw data sanitised");
    }
    let bones = build_skeleton_metadata(skeleton, &settings.key_end_effector_match_names);

    if *strategy == CompressionStrategy::Automatic {
        return selector::select_best(&seq, &bones, settings, session);
    }

    let label = strategy.name();
    session.record_attempt(label);
    let compressed = compress_with_strategy(&seq, &bones, strategy, settings.byte_order)?;
    let error = compute_compression_error(&seq, &compressed, &bones);
    let size = compressed.approx_compressed_size();
    session.record_win(label, error.max_error, size, size);
    debug!(sequence = %seq.name, strategy = label, size, max_error = error.max_error, "compressed");

    Ok(CompressionOutcome {
        compressed,
        error,
        strategy: strategy.clone(),
        label: label.to_string(),
    })
}
