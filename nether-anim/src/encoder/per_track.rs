//! Per-track encoding: each track picks its own format
//!
//! A channel whose keys all sit at the rest value is stored as identity
//! (offset -1). Otherwise the allowed formats are tried from smallest to
//! largest encoded size and the first whose round-trip error fits the track's
//! budget wins, with Float96 as the fallback.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{KeyCodec, SequenceInfo, offset_entry, track_or_rest, write_frame_table};
use crate::compressed::CompressedAnimation;
use crate::error::CodecError;
use crate::formats::{
    ALIGN_PAD_BYTE, ByteOrder, ByteReader, ByteWriter, Channel, ChannelFormats, ComponentFlags,
    Format, INTERVAL_BOUNDS_SIZE, IntervalBounds, KeyEncoding, TRACK_ALIGNMENT, TrackHeader,
    flagged_stride,
};
use crate::reduction::ChannelTolerances;
use crate::track::{SeparatedTracks, Track, has_uniform_key_spacing};

/// Offset entry of an identity channel
pub const IDENTITY_OFFSET: i32 = -1;

/// Format choices and bitwise error budgets of the per-track encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerTrackEncoding {
    /// Default: Identity, IntervalFixed32, Fixed48
    #[serde(default = "default_vector_formats")]
    pub allowed_translation_formats: Vec<Format>,

    /// Default: Identity, Fixed48, IntervalFixed32, Fixed32, Float32
    #[serde(default = "default_rotation_formats")]
    pub allowed_rotation_formats: Vec<Format>,

    /// Default: Identity, IntervalFixed32, Fixed48
    #[serde(default = "default_vector_formats")]
    pub allowed_scale_formats: Vec<Format>,

    /// Components (and whole channels) below this magnitude are not stored.
    /// Default: 0.0002
    #[serde(default = "default_zeroing_threshold")]
    pub max_zeroing_threshold: f32,

    /// Default: 0.007
    #[serde(default = "default_pos_diff")]
    pub max_pos_diff_bitwise: f32,

    /// Default: 0.002
    #[serde(default = "default_angle_diff")]
    pub max_angle_diff_bitwise: f32,

    /// Default: 0.0007
    #[serde(default = "default_scale_diff")]
    pub max_scale_diff_bitwise: f32,
}

fn default_vector_formats() -> Vec<Format> {
    vec![Format::Identity, Format::IntervalFixed32, Format::Fixed48]
}

fn default_rotation_formats() -> Vec<Format> {
    vec![
        Format::Identity,
        Format::Fixed48,
        Format::IntervalFixed32,
        Format::Fixed32,
        Format::Float32,
    ]
}

fn default_zeroing_threshold() -> f32 {
    0.0002
}

fn default_pos_diff() -> f32 {
    0.007
}

fn default_angle_diff() -> f32 {
    0.002
}

fn default_scale_diff() -> f32 {
    0.0007
}

impl Default for PerTrackEncoding {
    fn default() -> Self {
        Self {
            allowed_translation_formats: default_vector_formats(),
            allowed_rotation_formats: default_rotation_formats(),
            allowed_scale_formats: default_vector_formats(),
            max_zeroing_threshold: default_zeroing_threshold(),
            max_pos_diff_bitwise: default_pos_diff(),
            max_angle_diff_bitwise: default_angle_diff(),
            max_scale_diff_bitwise: default_scale_diff(),
        }
    }
}

impl PerTrackEncoding {
    /// Uniform bitwise budgets
    pub fn bitwise_tolerances(&self) -> ChannelTolerances {
        ChannelTolerances {
            translation: self.max_pos_diff_bitwise,
            rotation: self.max_angle_diff_bitwise,
            scale: self.max_scale_diff_bitwise,
        }
    }

    /// Checks every allowed format has a layout for its channel
    pub fn validate(&self) -> Result<(), CodecError> {
        let lists = [
            (Channel::Translation, &self.allowed_translation_formats),
            (Channel::Rotation, &self.allowed_rotation_formats),
            (Channel::Scale, &self.allowed_scale_formats),
        ];
        for (channel, formats) in lists {
            for &format in formats {
                format.stride(channel)?;
            }
        }
        Ok(())
    }

    /// Copy with the bitwise budgets replaced by `tolerances`
    pub fn with_tolerances(&self, tolerances: ChannelTolerances) -> Self {
        Self {
            max_pos_diff_bitwise: tolerances.translation,
            max_angle_diff_bitwise: tolerances.rotation,
            max_scale_diff_bitwise: tolerances.scale,
            ..self.clone()
        }
    }
}

// ============================================================================
// Format selection
// ============================================================================

/// Format, stored components and header flags chosen for one channel
#[derive(Debug, Clone, Copy, PartialEq)]
struct ChannelChoice {
    format: Format,
    flags: ComponentFlags,
}

impl ChannelChoice {
    fn stride(&self, rotation: bool) -> usize {
        flagged_stride(self.format, self.flags, rotation)
    }

    /// Value of the header's 3-bit flags field
    fn header_flags(&self) -> u8 {
        if self.format.has_bounds() {
            3
        } else {
            self.flags.bits()
        }
    }

    fn encoded_size(&self, num_keys: usize, rotation: bool) -> usize {
        let bounds = if self.format.has_bounds() && num_keys > 1 {
            INTERVAL_BOUNDS_SIZE
        } else {
            0
        };
        TrackHeader::SIZE + bounds + num_keys * self.stride(rotation)
    }
}

/// Largest error introduced by storing `keys` as `choice`
fn round_trip_error<T: KeyCodec>(keys: &[T], choice: ChannelChoice, order: ByteOrder) -> f32 {
    let bounds = if choice.format.has_bounds() {
        T::bounds(keys)
    } else {
        IntervalBounds::default()
    };
    let mut writer = ByteWriter::new(order);
    for &key in keys {
        T::write(&mut writer, choice.format, choice.flags, &bounds, key);
    }
    let mut reader = ByteReader::new(writer.as_slice(), order);
    keys.iter()
        .map(|&key| T::error(key, T::read(&mut reader, choice.format, choice.flags, &bounds)))
        .fold(0.0, f32::max)
}

/// Picks the smallest allowed format within `tolerance`, `None` for an identity channel
fn choose_format<T: KeyCodec>(
    track: &Track<T>,
    channel: Channel,
    rest: T,
    allowed: &[Format],
    zeroing: f32,
    tolerance: f32,
    order: ByteOrder,
) -> Option<ChannelChoice> {
    let at_rest = track.keys.iter().all(|&key| !T::differs(key, rest, zeroing));
    if at_rest && allowed.contains(&Format::Identity) {
        return None;
    }

    // a dropped component decodes as zero, which scale cannot afford
    let flags = match channel {
        Channel::Scale => ComponentFlags::all(),
        _ => match T::component_mask(&track.keys, zeroing) {
            mask if mask.is_empty() => ComponentFlags::all(),
            mask => mask,
        },
    };
    let with_flags = |format: Format| ChannelChoice {
        format,
        flags: if format.uses_component_flags() {
            flags
        } else {
            ComponentFlags::all()
        },
    };
    let fallback = with_flags(Format::Float96);
    if track.len() == 1 {
        return Some(fallback);
    }

    let mut candidates: Vec<ChannelChoice> = allowed
        .iter()
        .copied()
        .filter(|&format| format != Format::Identity)
        .map(with_flags)
        .collect();
    candidates.sort_by_key(|choice| choice.encoded_size(track.len(), T::IS_ROTATION));

    Some(
        candidates
            .into_iter()
            .find(|&choice| round_trip_error(&track.keys, choice, order) <= tolerance)
            .unwrap_or(fallback),
    )
}

/// Writes one channel and returns its offset entry
#[allow(clippy::too_many_arguments)]
fn write_channel<T: KeyCodec>(
    writer: &mut ByteWriter,
    track: &Track<T>,
    channel: Channel,
    rest: T,
    allowed: &[Format],
    encoding: &PerTrackEncoding,
    tolerance: f32,
    info: &SequenceInfo,
) -> Result<i32, CodecError> {
    let Some(choice) = choose_format(
        track,
        channel,
        rest,
        allowed,
        encoding.max_zeroing_threshold,
        tolerance,
        writer.order(),
    ) else {
        return Ok(IDENTITY_OFFSET);
    };

    debug_assert_eq!(writer.position() % TRACK_ALIGNMENT, 0);
    let offset = offset_entry(writer.position())?;
    let num_keys = track.len();
    let has_frame_table = num_keys > 1
        && !has_uniform_key_spacing(info.num_frames, info.sequence_length, &track.times);
    let header = TrackHeader::new(choice.format, choice.header_flags(), num_keys, has_frame_table)?;
    trace!(
        %channel,
        format = %choice.format,
        flags = choice.header_flags(),
        keys = num_keys,
        has_frame_table,
        "per-track format"
    );
    writer.write_u32(header.to_u32());

    let bounds = if choice.format.has_bounds() && num_keys > 1 {
        let bounds = T::bounds(&track.keys);
        bounds.write(writer);
        bounds
    } else {
        IntervalBounds::default()
    };
    for &key in &track.keys {
        T::write(writer, choice.format, choice.flags, &bounds, key);
    }
    if has_frame_table {
        write_frame_table(writer, track, info)?;
    } else {
        writer.align(TRACK_ALIGNMENT, ALIGN_PAD_BYTE);
    }
    Ok(offset)
}

/// Encodes every track with its own format and an optional per-track error budget
pub fn encode_per_track(
    tracks: &SeparatedTracks,
    info: &SequenceInfo,
    encoding: &PerTrackEncoding,
    tolerances: Option<&[ChannelTolerances]>,
    byte_order: ByteOrder,
) -> Result<CompressedAnimation, CodecError> {
    encoding.validate()?;
    let num_tracks = tracks.translation.len().max(tracks.rotation.len());
    if tracks.translation.len() != tracks.rotation.len() {
        warn!(
            translation = tracks.translation.len(),
            rotation = tracks.rotation.len(),
            "translation/rotation track count mismatch"
        );
    }
    let uniform = encoding.bitwise_tolerances();
    let budget = |index: usize| tolerances.and_then(|t| t.get(index)).copied().unwrap_or(uniform);

    let rest_translation = Track::constant(Vec3::ZERO);
    let rest_rotation = Track::constant(Quat::IDENTITY);
    let rest_scale = Track::constant(Vec3::ONE);

    let mut writer = ByteWriter::new(byte_order);
    let mut track_offsets =
        Vec::with_capacity(num_tracks * KeyEncoding::PerTrack.track_strip_size());
    for index in 0..num_tracks {
        let tolerance = budget(index);
        let translation = track_or_rest(&tracks.translation, index, &rest_translation);
        let offset = write_channel(
            &mut writer,
            translation,
            Channel::Translation,
            Vec3::ZERO,
            &encoding.allowed_translation_formats,
            encoding,
            tolerance.translation,
            info,
        )?;
        track_offsets.push(offset);

        let rotation = track_or_rest(&tracks.rotation, index, &rest_rotation);
        let offset = write_channel(
            &mut writer,
            rotation,
            Channel::Rotation,
            Quat::IDENTITY,
            &encoding.allowed_rotation_formats,
            encoding,
            tolerance.rotation,
            info,
        )?;
        track_offsets.push(offset);
    }

    let mut scale_offsets = Vec::new();
    if tracks.has_scale() {
        scale_offsets.reserve(num_tracks);
        for index in 0..num_tracks {
            let scale = track_or_rest(&tracks.scale, index, &rest_scale);
            let offset = write_channel(
                &mut writer,
                scale,
                Channel::Scale,
                Vec3::ONE,
                &encoding.allowed_scale_formats,
                encoding,
                budget(index).scale,
                info,
            )?;
            scale_offsets.push(offset);
        }
    }

    debug!(tracks = num_tracks, bytes = writer.position(), "per-track encode");

    Ok(CompressedAnimation {
        key_encoding: KeyEncoding::PerTrack,
        formats: ChannelFormats::default(),
        interpolation: info.interpolation,
        byte_order,
        num_frames: info.num_frames,
        sequence_length: info.sequence_length,
        num_tracks,
        track_offsets,
        scale_offsets,
        byte_stream: writer.into_inner(),
    })
}
