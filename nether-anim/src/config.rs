//! Compression settings
//!
//! Process-wide knobs of the strategy selector. Every field has a default, so
//! an empty TOML table (or no file at all) yields [`CompressionSettings::default`].

use serde::{Deserialize, Serialize};

use crate::formats::{ByteOrder, ChannelFormats};

/// Selector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// Largest end effector error a candidate may introduce.
    /// Default: 1.0
    #[serde(default = "default_threshold")]
    pub alternative_compression_threshold: f32,

    /// Accept any error improvement while the current winner is above the threshold.
    /// Default: false
    #[serde(default)]
    pub force_below_threshold: bool,

    /// Start from the default bitwise codec rather than the least destructive one.
    /// Default: true
    #[serde(default = "default_true")]
    pub first_recompress_using_current_or_default: bool,

    /// Raise the threshold to the error of the starting compression.
    /// Default: false
    #[serde(default)]
    pub raise_max_error_to_existing: bool,

    /// Default: true
    #[serde(default = "default_true")]
    pub try_fixed_bitwise_compression: bool,

    /// Default: true
    #[serde(default = "default_true")]
    pub try_per_track_bitwise_compression: bool,

    /// Default: true
    #[serde(default = "default_true")]
    pub try_linear_key_removal_compression: bool,

    /// Default: true
    #[serde(default = "default_true")]
    pub try_interval_key_removal: bool,

    /// Formats of the fallback bitwise codec.
    /// Default: None / Float96 / None
    #[serde(default)]
    pub default_codec: ChannelFormats,

    /// Bones whose name contains one of these are key end effectors
    #[serde(default)]
    pub key_end_effector_match_names: Vec<String>,

    /// Byte order of the produced key streams.
    /// Default: little
    #[serde(default)]
    pub byte_order: ByteOrder,
}

fn default_threshold() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            alternative_compression_threshold: default_threshold(),
            force_below_threshold: false,
            first_recompress_using_current_or_default: true,
            raise_max_error_to_existing: false,
            try_fixed_bitwise_compression: true,
            try_per_track_bitwise_compression: true,
            try_linear_key_removal_compression: true,
            try_interval_key_removal: true,
            default_codec: ChannelFormats::default(),
            key_end_effector_match_names: Vec::new(),
            byte_order: ByteOrder::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Format;

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings: CompressionSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, CompressionSettings::default());
    }

    #[test]
    fn test_partial_settings() {
        let json = r#"{
            "alternative_compression_threshold": 0.5,
            "try_linear_key_removal_compression": false,
            "default_codec": { "translation": "Fixed48", "rotation": "Fixed48", "scale": "None" },
            "byte_order": "big"
        }"#;
        let settings: CompressionSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.alternative_compression_threshold, 0.5);
        assert!(!settings.try_linear_key_removal_compression);
        assert!(settings.try_fixed_bitwise_compression);
        assert_eq!(settings.default_codec.rotation, Format::Fixed48);
        assert_eq!(settings.byte_order, ByteOrder::Big);
    }
}
