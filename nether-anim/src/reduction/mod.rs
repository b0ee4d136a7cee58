//! Key reduction passes
//!
//! All passes mutate [`SeparatedTracks`](crate::track::SeparatedTracks) in
//! place and only ever remove keys. The trivial filter always runs first.

mod adaptive;
mod decimate;
mod linear;
mod trivial;

pub use adaptive::{
    AdaptiveError, ChannelTolerances, MAX_ADAPTIVE_RELAXATION, MIN_ADAPTIVE_TOLERANCE,
    height_based_tolerances, height_scale, perturbation_tolerances, resolve_tolerances,
};
pub use decimate::{
    filter_intermittent_keys, remove_every_second_key, resample_indices, resample_tracks,
};
pub use linear::{LinearKeyParams, remove_linear_keys};
pub use trivial::{TrivialThresholds, filter_trivial_keys, filter_trivial_track};
