//! Parameters of each compression strategy

use serde::{Deserialize, Serialize};

use crate::encoder::PerTrackEncoding;
use crate::formats::ChannelFormats;
use crate::reduction::{AdaptiveError, LinearKeyParams, TrivialThresholds};

/// Trivial filter plus sequence-level formats
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BitwiseParams {
    #[serde(default)]
    pub formats: ChannelFormats,
    #[serde(default)]
    pub trivial: TrivialThresholds,
}

impl BitwiseParams {
    pub fn new(formats: ChannelFormats) -> Self {
        Self {
            formats,
            trivial: TrivialThresholds::default(),
        }
    }
}

/// Drops every second key of long tracks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecimationParams {
    #[serde(default)]
    pub formats: ChannelFormats,
    #[serde(default)]
    pub trivial: TrivialThresholds,

    /// Tracks with this many keys or fewer are left alone.
    /// Default: 10
    #[serde(default = "default_min_keys")]
    pub min_keys: usize,

    /// Keep odd keys instead of even ones.
    /// Default: false
    #[serde(default)]
    pub start_at_second_key: bool,
}

fn default_min_keys() -> usize {
    10
}

impl Default for DecimationParams {
    fn default() -> Self {
        Self {
            formats: ChannelFormats::default(),
            trivial: TrivialThresholds::default(),
            min_keys: default_min_keys(),
            start_at_second_key: false,
        }
    }
}

/// Linear key removal with sequence-level formats
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoveLinearParams {
    #[serde(default)]
    pub formats: ChannelFormats,
    #[serde(default)]
    pub trivial: TrivialThresholds,
    #[serde(default)]
    pub linear: LinearKeyParams,
}

/// Per-track formats with optional resampling, linear key removal and adaptive budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerTrackParams {
    #[serde(default)]
    pub encoding: PerTrackEncoding,
    #[serde(default)]
    pub trivial: TrivialThresholds,

    /// Resample full-rate tracks to this many frames per second
    #[serde(default)]
    pub resampled_framerate: Option<f32>,

    /// Default: 10
    #[serde(default = "default_min_keys")]
    pub min_keys_for_resampling: usize,

    /// Linear key removal, off when absent
    #[serde(default)]
    pub linear: Option<LinearKeyParams>,

    #[serde(default)]
    pub adaptive: AdaptiveError,
}

impl Default for PerTrackParams {
    fn default() -> Self {
        Self {
            encoding: PerTrackEncoding::default(),
            trivial: TrivialThresholds::default(),
            resampled_framerate: None,
            min_keys_for_resampling: default_min_keys(),
            linear: None,
            adaptive: AdaptiveError::None,
        }
    }
}
