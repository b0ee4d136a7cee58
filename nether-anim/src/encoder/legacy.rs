//! Constant- and variable-key encodings with sequence-level formats

use glam::{Quat, Vec3};
use tracing::{debug, warn};

use super::{KeyCodec, SequenceInfo, offset_entry, track_or_rest, write_frame_table};
use crate::compressed::CompressedAnimation;
use crate::error::CodecError;
use crate::formats::{
    ALIGN_PAD_BYTE, ByteOrder, ByteWriter, ChannelFormats, ComponentFlags, Format, IntervalBounds,
    KeyEncoding, MAX_FRAME_TABLE_FRAMES, TRACK_ALIGNMENT,
};
use crate::track::{SeparatedTracks, Track};

/// Writes one track and returns its `(offset, key count)` entries
fn write_track<T: KeyCodec>(
    writer: &mut ByteWriter,
    track: &Track<T>,
    format: Format,
    frame_table: bool,
    info: &SequenceInfo,
) -> Result<[i32; 2], CodecError> {
    debug_assert_eq!(writer.position() % TRACK_ALIGNMENT, 0);
    let offset = offset_entry(writer.position())?;

    if track.len() == 1 {
        let rest_bounds = IntervalBounds::default();
        T::write(writer, Format::Float96, ComponentFlags::all(), &rest_bounds, track.keys[0]);
        writer.align(TRACK_ALIGNMENT, ALIGN_PAD_BYTE);
        return Ok([offset, 1]);
    }

    let bounds = if format.has_bounds() {
        let bounds = T::bounds(&track.keys);
        bounds.write(writer);
        bounds
    } else {
        IntervalBounds::default()
    };
    for &key in &track.keys {
        T::write(writer, format, ComponentFlags::all(), &bounds, key);
    }
    if frame_table {
        write_frame_table(writer, track, info)?;
    } else {
        writer.align(TRACK_ALIGNMENT, ALIGN_PAD_BYTE);
    }
    Ok([offset, offset_entry(track.len())?])
}

/// Encodes every track with the same per-channel formats.
///
/// Uniformly keyed sequences use [`KeyEncoding::ConstantKeyLerp`]; anything
/// else gets [`KeyEncoding::VariableKeyLerp`] with a frame table on every
/// multi-key track.
pub fn encode_legacy(
    tracks: &SeparatedTracks,
    info: &SequenceInfo,
    formats: ChannelFormats,
    byte_order: ByteOrder,
) -> Result<CompressedAnimation, CodecError> {
    formats.validate_legacy()?;

    let key_encoding = if tracks.all_uniform(info.num_frames, info.sequence_length) {
        KeyEncoding::ConstantKeyLerp
    } else {
        KeyEncoding::VariableKeyLerp
    };
    if key_encoding == KeyEncoding::VariableKeyLerp && info.num_frames > MAX_FRAME_TABLE_FRAMES {
        return Err(CodecError::TooManyFrames(info.num_frames));
    }
    let frame_table = key_encoding == KeyEncoding::VariableKeyLerp;

    let num_tracks = tracks.translation.len().max(tracks.rotation.len());
    if tracks.translation.len() != tracks.rotation.len() {
        warn!(
            translation = tracks.translation.len(),
            rotation = tracks.rotation.len(),
            "translation/rotation track count mismatch"
        );
    }

    let rest_translation = Track::constant(Vec3::ZERO);
    let rest_rotation = Track::constant(Quat::IDENTITY);
    let rest_scale = Track::constant(Vec3::ONE);

    let mut writer = ByteWriter::new(byte_order);
    let mut track_offsets =
        Vec::with_capacity(num_tracks * KeyEncoding::VariableKeyLerp.track_strip_size());
    for index in 0..num_tracks {
        let translation = track_or_rest(&tracks.translation, index, &rest_translation);
        track_offsets.extend(write_track(
            &mut writer,
            translation,
            formats.translation,
            frame_table,
            info,
        )?);
        let rotation = track_or_rest(&tracks.rotation, index, &rest_rotation);
        track_offsets.extend(write_track(
            &mut writer,
            rotation,
            formats.rotation,
            frame_table,
            info,
        )?);
    }

    let mut scale_offsets = Vec::new();
    if tracks.has_scale() {
        scale_offsets.reserve(num_tracks * 2);
        for index in 0..num_tracks {
            let scale = track_or_rest(&tracks.scale, index, &rest_scale);
            let entries = write_track(&mut writer, scale, formats.scale, frame_table, info)?;
            scale_offsets.extend(entries);
        }
    }

    debug!(
        encoding = %key_encoding,
        translation = %formats.translation,
        rotation = %formats.rotation,
        scale = %formats.scale,
        bytes = writer.position(),
        "legacy encode"
    );

    Ok(CompressedAnimation {
        key_encoding,
        formats,
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
