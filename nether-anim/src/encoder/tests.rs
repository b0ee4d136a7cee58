//! Encoder tests: layout invariants, checked by sampling the output

use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};

use super::*;
use crate::compressed::CompressedAnimation;
use crate::decoder::{sample_bone_transform, track_view};
use crate::error::CodecError;
use crate::formats::{ByteOrder, Channel, ChannelFormats, ComponentFlags, KeyEncoding, TrackHeader};
use crate::track::SeparatedTracks;

fn info(num_frames: u32, interpolation: Interpolation) -> SequenceInfo {
    SequenceInfo {
        num_frames,
        sequence_length: 1.0,
        interpolation,
    }
}

fn x_ramp(times: &[f32], values: &[f32]) -> Track<Vec3> {
    Track {
        times: times.to_vec(),
        keys: values.iter().map(|&x| Vec3::new(x, 0.0, 0.0)).collect(),
    }
}

fn z_turn(num_keys: usize) -> Track<Quat> {
    let samples: Vec<Quat> = (0..num_keys)
        .map(|i| Quat::from_rotation_z(FRAC_PI_2 * i as f32 / (num_keys - 1) as f32))
        .collect();
    Track::from_samples(&samples, 1.0)
}

fn tracks(translation: Vec<Track<Vec3>>, rotation: Vec<Track<Quat>>) -> SeparatedTracks {
    SeparatedTracks {
        translation,
        rotation,
        scale: Vec::new(),
    }
}

fn header_at(anim: &CompressedAnimation, offset: i32) -> TrackHeader {
    let mut reader = ByteReader::at(&anim.byte_stream, offset as usize, anim.byte_order);
    TrackHeader::from_u32(reader.read_u32()).unwrap()
}

/// Component distance that treats `q` and `-q` as equal
fn rotation_error(a: Quat, b: Quat) -> f32 {
    let (a, b) = (glam::Vec4::from(a), glam::Vec4::from(b));
    (a - b).length().min((a + b).length())
}

// ============================================================================
// Legacy
// ============================================================================

#[test]
fn test_legacy_uniform_round_trip() {
    let seq = tracks(
        vec![x_ramp(&[0.0, 0.25, 0.5, 0.75, 1.0], &[0.0, 1.0, 2.0, 3.0, 4.0])],
        vec![z_turn(5)],
    );
    let formats = ChannelFormats::new(Format::None, Format::Float96, Format::None);
    let anim =
        encode_legacy(&seq, &info(5, Interpolation::Linear), formats, ByteOrder::Little).unwrap();

    assert_eq!(anim.key_encoding, KeyEncoding::ConstantKeyLerp);
    assert_eq!(anim.track_offsets[1], 5);
    assert_eq!(anim.track_offsets[3], 5);
    anim.validate().unwrap();

    let pose = sample_bone_transform(&anim, 0, 0.375);
    assert!((pose.translation.x - 1.5).abs() < 1e-5);
    let mid = sample_bone_transform(&anim, 0, 0.5);
    assert!(rotation_error(mid.rotation, Quat::from_rotation_z(FRAC_PI_2 / 2.0)) < 1e-4);
}

#[test]
fn test_legacy_variable_uses_frame_table() {
    // keys at frames 0, 1 and 4 of a 5-frame sequence, linear in time
    let seq = tracks(
        vec![x_ramp(&[0.0, 0.25, 1.0], &[0.0, 1.0, 4.0])],
        vec![Track::constant(Quat::IDENTITY)],
    );
    let formats = ChannelFormats::new(Format::None, Format::Float96, Format::None);
    let anim =
        encode_legacy(&seq, &info(5, Interpolation::Linear), formats, ByteOrder::Little).unwrap();

    assert_eq!(anim.key_encoding, KeyEncoding::VariableKeyLerp);
    anim.validate().unwrap();
    // 36 bytes of keys, then one u8 per key padded to 4
    assert_eq!(anim.track_offsets[2], 40);
    assert_eq!(&anim.byte_stream[36..40], &[0, 1, 4, 0]);

    for t in [0.1, 0.5, 0.8] {
        let pose = sample_bone_transform(&anim, 0, t);
        assert!((pose.translation.x - 4.0 * t).abs() < 1e-4, "t = {t}");
    }
}

#[test]
fn test_legacy_offsets_are_aligned() {
    let seq = tracks(
        vec![
            x_ramp(&[0.0, 0.5, 1.0], &[0.0, 0.5, 1.0]),
            Track::constant(Vec3::ONE),
            x_ramp(&[0.0, 0.25, 1.0], &[0.0, 1.0, 2.0]),
        ],
        vec![z_turn(3), z_turn(3), Track::constant(Quat::IDENTITY)],
    );
    for rotation in [Format::Fixed48, Format::Fixed32, Format::IntervalFixed32, Format::Float32] {
        let formats = ChannelFormats::new(Format::Fixed48, rotation, Format::None);
        let anim =
            encode_legacy(&seq, &info(3, Interpolation::Linear), formats, ByteOrder::Little)
                .unwrap();
        for offset in anim.track_offsets.iter().step_by(2) {
            assert_eq!(offset % 4, 0, "{rotation}");
        }
        assert_eq!(anim.byte_stream.len() % 4, 0);
        anim.validate().unwrap();
    }
}

#[test]
fn test_legacy_single_key_is_float96() {
    let seq = tracks(
        vec![Track::constant(Vec3::new(0.1, 0.2, 0.3))],
        vec![Track::constant(Quat::from_rotation_x(0.3))],
    );
    let formats = ChannelFormats::new(Format::Fixed48, Format::Fixed32, Format::Fixed48);
    let anim =
        encode_legacy(&seq, &info(10, Interpolation::Linear), formats, ByteOrder::Little).unwrap();
    assert_eq!(anim.byte_stream.len(), 24);

    let pose = sample_bone_transform(&anim, 0, 0.3);
    assert_eq!(pose.translation, Vec3::new(0.1, 0.2, 0.3));
    assert!(rotation_error(pose.rotation, Quat::from_rotation_x(0.3)) < 1e-5);
}

#[test]
fn test_legacy_rejects_unsupported_formats() {
    let seq = tracks(vec![Track::constant(Vec3::ZERO)], vec![Track::constant(Quat::IDENTITY)]);
    let info = info(2, Interpolation::Linear);
    let fixed32 = ChannelFormats::new(Format::Fixed32, Format::Float96, Format::None);
    assert_eq!(
        encode_legacy(&seq, &info, fixed32, ByteOrder::Little),
        Err(CodecError::UnsupportedFormat {
            format: Format::Fixed32,
            channel: crate::formats::Channel::Translation,
        })
    );
    let identity = ChannelFormats::new(Format::None, Format::Identity, Format::None);
    assert!(encode_legacy(&seq, &info, identity, ByteOrder::Little).is_err());
}

#[test]
fn test_legacy_too_many_frames() {
    let seq = tracks(
        vec![x_ramp(&[0.0, 0.1, 1.0], &[0.0, 1.0, 2.0])],
        vec![Track::constant(Quat::IDENTITY)],
    );
    let result = encode_legacy(
        &seq,
        &info(70_000, Interpolation::Linear),
        ChannelFormats::default(),
        ByteOrder::Little,
    );
    assert_eq!(result, Err(CodecError::TooManyFrames(70_000)));
}

#[test]
fn test_step_interpolation_holds_low_key() {
    let seq = tracks(
        vec![x_ramp(&[0.0, 0.5, 1.0], &[0.0, 1.0, 2.0])],
        vec![Track::constant(Quat::IDENTITY)],
    );
    let formats = ChannelFormats::new(Format::None, Format::Float96, Format::None);
    let anim =
        encode_legacy(&seq, &info(3, Interpolation::Step), formats, ByteOrder::Little).unwrap();
    assert_eq!(sample_bone_transform(&anim, 0, 0.4).translation.x, 0.0);
    assert_eq!(sample_bone_transform(&anim, 0, 0.6).translation.x, 1.0);
    assert_eq!(sample_bone_transform(&anim, 0, 1.0).translation.x, 2.0);
}

#[test]
fn test_big_endian_samples_match() {
    let seq = tracks(
        vec![x_ramp(&[0.0, 0.25, 1.0], &[0.0, 1.0, 4.0])],
        vec![z_turn(4)],
    );
    let formats = ChannelFormats::new(Format::Fixed48, Format::Fixed48, Format::None);
    let info = info(5, Interpolation::Linear);
    let little = encode_legacy(&seq, &info, formats, ByteOrder::Little).unwrap();
    let big = encode_legacy(&seq, &info, formats, ByteOrder::Big).unwrap();
    assert_ne!(little.byte_stream, big.byte_stream);
    for t in [0.0, 0.3, 0.7, 1.0] {
        assert_eq!(sample_bone_transform(&little, 0, t), sample_bone_transform(&big, 0, t));
    }
}

// ============================================================================
// Per-track
// ============================================================================

#[test]
fn test_per_track_identity_channels() {
    let seq = tracks(
        vec![Track::constant(Vec3::new(0.0, 0.0001, 0.0))],
        vec![Track::constant(Quat::IDENTITY)],
    );
    let anim = encode_per_track(
        &seq,
        &info(10, Interpolation::Linear),
        &PerTrackEncoding::default(),
        None,
        ByteOrder::Little,
    )
    .unwrap();
    assert_eq!(anim.track_offsets, vec![-1, -1]);
    assert!(anim.byte_stream.is_empty());
    assert_eq!(sample_bone_transform(&anim, 0, 0.5), crate::math::Transform::IDENTITY);
}

#[test]
fn test_per_track_picks_smallest_format_within_budget() {
    let seq = tracks(vec![Track::constant(Vec3::ZERO)], vec![z_turn(31)]);
    let anim = encode_per_track(
        &seq,
        &info(31, Interpolation::Linear),
        &PerTrackEncoding::default(),
        None,
        ByteOrder::Little,
    )
    .unwrap();
    assert_eq!(anim.track_offsets[0], -1);
    let header = header_at(&anim, anim.track_offsets[1]);
    // only Z is animated, so Fixed48 stores a single 16-bit component
    assert_eq!(header.key_format, Format::Fixed48);
    assert_eq!(header.format_flags, ComponentFlags::Z.bits());
    assert_eq!(header.num_keys, 31);
    assert!(!header.has_frame_table);
    let view = track_view(&anim, 0, Channel::Rotation).unwrap().unwrap();
    assert_eq!(view.components, ComponentFlags::Z);
    assert_eq!(view.key_stride(), 2);

    let pose = sample_bone_transform(&anim, 0, 0.5);
    assert!(rotation_error(pose.rotation, Quat::from_rotation_z(FRAC_PI_2 / 2.0)) < 1e-3);
}

#[test]
fn test_per_track_tight_budget_falls_back_to_float96() {
    let seq = tracks(
        vec![x_ramp(&[0.0, 0.5, 1.0], &[0.0, 0.123_456, 100.0])],
        vec![Track::constant(Quat::IDENTITY)],
    );
    let tight = crate::reduction::ChannelTolerances {
        translation: 1e-7,
        rotation: 1e-7,
        scale: 1e-7,
    };
    let anim = encode_per_track(
        &seq,
        &info(3, Interpolation::Linear),
        &PerTrackEncoding::default(),
        Some(&[tight]),
        ByteOrder::Little,
    )
    .unwrap();
    let header = header_at(&anim, anim.track_offsets[0]);
    assert_eq!(header.key_format, Format::Float96);
    assert_eq!(header.format_flags, ComponentFlags::X.bits());
    assert_eq!(sample_bone_transform(&anim, 0, 0.5).translation.x, 0.123_456);
}

#[test]
fn test_per_track_u16_frame_table() {
    let seq = tracks(
        vec![x_ramp(&[0.0, 0.1, 1.0], &[0.0, 1.0, 10.0])],
        vec![Track::constant(Quat::IDENTITY)],
    );
    let encoding = PerTrackEncoding {
        allowed_translation_formats: vec![Format::Float96],
        ..Default::default()
    };
    let anim = encode_per_track(
        &seq,
        &info(301, Interpolation::Linear),
        &encoding,
        None,
        ByteOrder::Little,
    )
    .unwrap();
    let header = header_at(&anim, anim.track_offsets[0]);
    assert!(header.has_frame_table);
    anim.validate().unwrap();

    // keys at frames 0, 30 and 300
    let table = 4 + 3 * 4;
    let frames: Vec<u16> = anim.byte_stream[table..table + 6]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(frames, vec![0, 30, 300]);
    let pose = sample_bone_transform(&anim, 0, 0.55);
    assert!((pose.translation.x - 5.5).abs() < 1e-4);
}

#[test]
fn test_per_track_rejects_rotation_only_translation_format() {
    let seq = tracks(
        vec![x_ramp(&[0.0, 0.5, 1.0], &[0.0, 1.0, 2.0])],
        vec![Track::constant(Quat::IDENTITY)],
    );
    let encoding = PerTrackEncoding {
        allowed_translation_formats: vec![Format::Identity, Format::Fixed32, Format::Fixed48],
        ..Default::default()
    };
    assert_eq!(
        encode_per_track(&seq, &info(3, Interpolation::Linear), &encoding, None, ByteOrder::Little),
        Err(CodecError::UnsupportedFormat {
            format: Format::Fixed32,
            channel: Channel::Translation,
        })
    );

    let scale = PerTrackEncoding {
        allowed_scale_formats: vec![Format::Float32],
        ..Default::default()
    };
    assert!(matches!(
        scale.validate(),
        Err(CodecError::UnsupportedFormat {
            channel: Channel::Scale,
            ..
        })
    ));
    assert_eq!(PerTrackEncoding::default().validate(), Ok(()));
}

#[test]
fn test_per_track_scale_keeps_all_components() {
    let mut seq = tracks(
        vec![Track::constant(Vec3::ZERO)],
        vec![Track::constant(Quat::IDENTITY)],
    );
    seq.scale = vec![Track::constant(Vec3::new(1.0, 2.0, 1.0))];
    let anim = encode_per_track(
        &seq,
        &info(2, Interpolation::Linear),
        &PerTrackEncoding::default(),
        None,
        ByteOrder::Little,
    )
    .unwrap();
    assert_eq!(anim.scale_offsets.len(), 1);
    let header = header_at(&anim, anim.scale_offsets[0]);
    assert_eq!(header.format_flags, ComponentFlags::all().bits());
    assert_eq!(sample_bone_transform(&anim, 0, 0.0).scale, Vec3::new(1.0, 2.0, 1.0));
}

#[test]
fn test_per_track_offsets_are_aligned() {
    let seq = tracks(
        vec![
            x_ramp(&[0.0, 0.5, 1.0], &[0.0, 0.3, 0.9]),
            x_ramp(&[0.0, 0.25, 1.0], &[1.0, 2.0, 3.0]),
        ],
        vec![z_turn(3), z_turn(5)],
    );
    let anim = encode_per_track(
        &seq,
        &info(5, Interpolation::Linear),
        &PerTrackEncoding::default(),
        None,
        ByteOrder::Little,
    )
    .unwrap();
    for &offset in &anim.track_offsets {
        assert!(offset == -1 || offset % 4 == 0);
    }
    anim.validate().unwrap();
}
