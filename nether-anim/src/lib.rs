//! Nether-Anim: keyframe compression for skeletal animation
//!
//! Turns per-frame bone transforms into a compact byte stream and samples
//! poses back out of it at runtime.
//!
//! # Pipeline
//!
//! ```text
//! AnimSequence (raw, one sample per frame)
//!   -> sanitize            chop malformed tracks, drop unused scale
//!   -> separate            one keyed track per channel
//!   -> reduce              trivial / every-second-key / linear / resample
//!   -> encode              legacy (one format per channel) or per-track
//!   -> CompressedAnimation offset tables + 4-byte aligned byte stream
//!   -> sample              bone transforms at any time
//! ```
//!
//! [`strategy::compress`] drives the whole pipeline. With
//! [`CompressionStrategy::Automatic`] it tries every enabled candidate and keeps
//! the smallest encoding whose end effector error stays under the configured
//! threshold.
//!
//! # Formats
//!
//! | Format | Quaternion | Vector | Notes |
//! |--------|-----------:|-------:|-------|
//! | None | 16 B | 12 B | uncompressed |
//! | Float96 | 12 B | 12 B | W rebuilt |
//! | Fixed48 | 6 B | 6 B | 16-bit fixed point |
//! | IntervalFixed32 | 4 B | 4 B | quantised against per-track bounds |
//! | Fixed32 | 4 B | - | 11/11/10 fixed point |
//! | Float32 | 4 B | - | 11/11/10 reduced floats |
//! | Identity | 0 B | 0 B | rest value, per-track only |
//!
//! # Usage
//!
//! ```no_run
//! use nether_anim::{
//!     AnimSequence, CompressionSession, CompressionSettings, CompressionStrategy, Skeleton,
//!     compress, sample_bone_transform,
//! };
//!
//! # fn load() -> (AnimSequence, Skeleton) { unimplemented!() }
//! let (sequence, skeleton) = load();
//! let mut session = CompressionSession::new();
//! let outcome = compress(
//!     &sequence,
//!     &skeleton,
//!     &CompressionStrategy::Automatic,
//!     &CompressionSettings::default(),
//!     &mut session,
//! )
//! .unwrap();
//! let root = sample_bone_transform(&outcome.compressed, 0, 0.5);
//! ```

pub mod compressed;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod formats;
pub mod math;
pub mod measure;
pub mod reduction;
pub mod sequence;
pub mod skeleton;
pub mod strategy;
pub mod track;

pub use compressed::CompressedAnimation;
pub use config::CompressionSettings;
pub use decoder::{BoneTrackPair, sample_bone_transform, sample_full_pose};
pub use error::CodecError;
pub use formats::{ByteOrder, ChannelFormats, Format, Interpolation, KeyEncoding};
pub use math::Transform;
pub use measure::{ErrorStats, compute_compression_error};
pub use sequence::{AnimSequence, RawTrack};
pub use skeleton::{Bone, Skeleton, SkeletonProvider};
pub use strategy::{
    CompressionOutcome, CompressionSession, CompressionStrategy, compress, compress_with_strategy,
};
