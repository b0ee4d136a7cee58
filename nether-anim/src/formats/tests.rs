//! Tests for key formats and packers

use glam::{Quat, Vec3};

use super::*;
use crate::math::quat_error;

fn sample_quats() -> Vec<Quat> {
    vec![
        Quat::IDENTITY,
        Quat::from_rotation_x(0.3),
        Quat::from_rotation_y(-1.2),
        Quat::from_rotation_z(3.0),
        Quat::from_euler(glam::EulerRot::XYZ, 0.4, -2.1, 1.7),
        // negative W on purpose
        -Quat::from_euler(glam::EulerRot::ZYX, 1.0, 0.5, -0.25),
        Quat::from_axis_angle(Vec3::new(1.0, 1.0, 1.0).normalize(), 2.5),
    ]
}

fn roundtrip_quat(format: Format, q: Quat, bounds: &IntervalBounds) -> Quat {
    let mut writer = ByteWriter::new(ByteOrder::Little);
    write_quat(&mut writer, format, ComponentFlags::all(), bounds, q);
    assert_eq!(writer.position(), format.quat_stride());
    let bytes = writer.into_inner();
    let mut reader = ByteReader::new(&bytes, ByteOrder::Little);
    read_quat(&mut reader, format, ComponentFlags::all(), bounds)
}

fn roundtrip_vector(format: Format, v: Vec3, bounds: &IntervalBounds) -> Vec3 {
    let mut writer = ByteWriter::new(ByteOrder::Big);
    write_vector(&mut writer, format, ComponentFlags::all(), bounds, v);
    assert_eq!(Some(writer.position()), format.vector_stride());
    let bytes = writer.into_inner();
    let mut reader = ByteReader::new(&bytes, ByteOrder::Big);
    read_vector(&mut reader, format, ComponentFlags::all(), bounds)
}

// ========================================================================
// Fixed-point Tests
// ========================================================================

#[test]
fn test_fixed16_roundtrip_bound() {
    for log2 in [0u32, 3, 7, 15] {
        let max = (1u32 << log2) as f32;
        let bound = 2f32.powi(log2 as i32 - 15);
        for i in -20..=20 {
            let value = max * i as f32 / 20.0;
            let decoded = decompress_fixed16(compress_fixed16(value, log2), log2);
            assert!(
                (decoded - value).abs() <= bound,
                "log2={log2} value={value} decoded={decoded}"
            );
        }
    }
}

#[test]
fn test_fixed16_monotonic() {
    let mut previous = 0u16;
    for i in -1000..=1000 {
        let value = i as f32 * 0.00137;
        let bits = compress_fixed16(value, 0);
        assert!(bits >= previous);
        previous = bits;
    }
}

#[test]
fn test_fixed16_clamps_out_of_range() {
    assert_eq!(compress_fixed16(1000.0, 7), u16::MAX);
    assert_eq!(compress_fixed16(-1000.0, 7), 0);
    assert_eq!(compress_fixed16(0.0, 7), 32767);
}

// ========================================================================
// Quaternion Tests
// ========================================================================

#[test]
fn test_lossless_quat_roundtrip() {
    let bounds = IntervalBounds::default();
    for q in sample_quats() {
        let none = roundtrip_quat(Format::None, q, &bounds);
        assert_eq!(none, q);

        let float96 = roundtrip_quat(Format::Float96, q, &bounds);
        assert!(float96.abs_diff_eq(canonicalize_quat(q), 1e-5));
        assert!(float96.w >= 0.0);
    }
}

#[test]
fn test_lossy_quats_are_canonical_and_unit() {
    let quats = sample_quats();
    let bounds = IntervalBounds::from_quats(quats.iter().copied());
    // reduced floats lose the most near W = 0
    for (format, tolerance) in [
        (Format::Fixed48, 0.001),
        (Format::Fixed32, 0.01),
        (Format::Float32, 0.03),
        (Format::IntervalFixed32, 0.01),
    ] {
        for &q in &quats {
            let decoded = roundtrip_quat(format, q, &bounds);
            assert!(decoded.w >= 0.0, "{format}: negative W");
            assert!((decoded.length() - 1.0).abs() < 2e-3, "{format}: not unit");
            assert!(
                quat_error(decoded, q) < tolerance,
                "{format}: {q:?} -> {decoded:?}"
            );
        }
    }
}

#[test]
fn test_fixed48_quat_is_precise() {
    let bounds = IntervalBounds::default();
    for q in sample_quats() {
        let decoded = roundtrip_quat(Format::Fixed48, q, &bounds);
        assert!(decoded.abs_diff_eq(canonicalize_quat(q), 5e-4), "{q:?} -> {decoded:?}");
    }
}

#[test]
fn test_identity_quat_has_no_bytes() {
    let bounds = IntervalBounds::default();
    let decoded = roundtrip_quat(Format::Identity, Quat::from_rotation_x(1.0), &bounds);
    assert_eq!(decoded, Quat::IDENTITY);
}

#[test]
fn test_reduced_float_values() {
    assert_eq!(unpack_reduced_float(pack_reduced_float(0.0, 7), 7), 0.0);
    assert_eq!(unpack_reduced_float(pack_reduced_float(1.0, 7), 7), 1.0);
    assert_eq!(unpack_reduced_float(pack_reduced_float(-0.5, 7), 7), -0.5);
    // values past one clamp to one
    assert_eq!(unpack_reduced_float(pack_reduced_float(1.7, 6), 6), 1.0);

    for i in 1..200 {
        let value = i as f32 / 200.0;
        let decoded = unpack_reduced_float(pack_reduced_float(value, 7), 7);
        assert!((decoded - value).abs() <= value * 0.004 + 1e-4, "{value} -> {decoded}");
    }
}

// ========================================================================
// Vector Tests
// ========================================================================

#[test]
fn test_lossless_vector_roundtrip() {
    let bounds = IntervalBounds::default();
    for v in [
        Vec3::ZERO,
        Vec3::new(1.5, -2.25, 1000.0),
        Vec3::new(-0.001, 3.0e6, 7.0),
    ] {
        assert_eq!(roundtrip_vector(Format::None, v, &bounds), v);
        assert_eq!(roundtrip_vector(Format::Float96, v, &bounds), v);
    }
}

#[test]
fn test_fixed48_vector_precision() {
    let bounds = IntervalBounds::default();
    let v = Vec3::new(12.34, -100.5, 0.01);
    let decoded = roundtrip_vector(Format::Fixed48, v, &bounds);
    assert!(decoded.abs_diff_eq(v, 2f32.powi(7 - 15)));
}

#[test]
fn test_interval_vector_within_bounds() {
    let values = [
        Vec3::new(-1.0, 5.0, 100.0),
        Vec3::new(3.0, 5.5, 120.0),
        Vec3::new(0.25, 6.0, 110.0),
    ];
    let bounds = IntervalBounds::from_vectors(values);
    assert_eq!(bounds.min, Vec3::new(-1.0, 5.0, 100.0));
    assert_eq!(bounds.range, Vec3::new(4.0, 1.0, 20.0));

    for v in values {
        let decoded = roundtrip_vector(Format::IntervalFixed32, v, &bounds);
        // X has 10 bits, Y/Z have 11
        let step = bounds.range / Vec3::new(1023.0, 2047.0, 2047.0);
        assert!((decoded - v).abs().cmple(step * 0.5 + 1e-5).all(), "{v} -> {decoded}");
    }
}

#[test]
fn test_interval_zero_range_decodes_to_min() {
    let bounds = IntervalBounds {
        min: Vec3::new(2.0, -3.0, 0.5),
        range: Vec3::ZERO,
    };
    let packed = pack_vector_interval(Vec3::new(2.0, -3.0, 0.5), &bounds);
    assert_eq!(packed, 0);
    assert_eq!(unpack_vector_interval(packed, &bounds), bounds.min);
}

#[test]
fn test_interval_bounds_serialization() {
    let bounds = IntervalBounds {
        min: Vec3::new(1.0, 2.0, 3.0),
        range: Vec3::new(0.5, 0.25, 0.125),
    };
    let mut writer = ByteWriter::new(ByteOrder::Little);
    bounds.write(&mut writer);
    assert_eq!(writer.position(), INTERVAL_BOUNDS_SIZE);
    // first pair is (min.x, range.x)
    assert_eq!(&writer.as_slice()[0..4], &1.0f32.to_le_bytes());
    assert_eq!(&writer.as_slice()[4..8], &0.5f32.to_le_bytes());

    let bytes = writer.into_inner();
    let mut reader = ByteReader::new(&bytes, ByteOrder::Little);
    assert_eq!(IntervalBounds::read(&mut reader), bounds);
}

#[test]
fn test_component_flags_skip_channels() {
    let mut writer = ByteWriter::new(ByteOrder::Little);
    let bounds = IntervalBounds::default();
    let y_only = ComponentFlags::Y;
    write_vector(&mut writer, Format::Float96, y_only, &bounds, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(writer.position(), flagged_stride(Format::Float96, y_only, false));
    let bytes = writer.into_inner();
    let mut reader = ByteReader::new(&bytes, ByteOrder::Little);
    let decoded = read_vector(&mut reader, Format::Float96, y_only, &bounds);
    assert_eq!(decoded, Vec3::new(0.0, 2.0, 0.0));
}

#[test]
fn test_component_flags_header_bits() {
    assert_eq!(ComponentFlags::all().bits(), 0b111);
    assert_eq!((ComponentFlags::X | ComponentFlags::Z).bits(), 0b101);
    // bits above the 3-bit field are dropped
    assert_eq!(ComponentFlags::from_bits_truncate(0b1010), ComponentFlags::Y);
    assert_eq!(flagged_stride(Format::Fixed48, ComponentFlags::X | ComponentFlags::Z, true), 4);
    assert_eq!(flagged_stride(Format::Fixed48, ComponentFlags::empty(), false), 0);
}

#[test]
fn test_vector_formats_reject_rotation_only_layouts() {
    assert!(Format::Fixed32.stride(Channel::Translation).is_err());
    assert!(Format::Float32.stride(Channel::Scale).is_err());
    assert_eq!(Format::Fixed32.stride(Channel::Rotation), Ok(4));
    assert!(
        ChannelFormats::new(Format::Identity, Format::Float96, Format::None)
            .validate_legacy()
            .is_err()
    );
    assert!(ChannelFormats::default().validate_legacy().is_ok());
}

// ========================================================================
// Header / Cursor Tests
// ========================================================================

#[test]
fn test_track_header_roundtrip() {
    let header = TrackHeader::new(Format::IntervalFixed32, 3, 1234, true).unwrap();
    let word = header.to_u32();
    assert_eq!(word >> 28, Format::IntervalFixed32 as u32);
    assert_eq!((word >> 27) & 1, 1);
    assert_eq!((word >> 24) & 7, 3);
    assert_eq!(word & 0xFF_FFFF, 1234);
    assert_eq!(TrackHeader::from_u32(word).unwrap(), header);
    assert_eq!(header.interval_pair_count(), 3);
}

#[test]
fn test_track_header_rejects_unknown_format() {
    let word = (9u32 << 28) | 5;
    assert_eq!(TrackHeader::from_u32(word), Err(CodecError::UnknownFormat(9)));
}

#[test]
fn test_track_header_key_limit() {
    assert!(TrackHeader::new(Format::Float96, 7, MAX_TRACK_KEYS, false).is_ok());
    assert_eq!(
        TrackHeader::new(Format::Float96, 7, MAX_TRACK_KEYS + 1, false),
        Err(CodecError::TooManyKeys(MAX_TRACK_KEYS + 1))
    );
}

#[test]
fn test_writer_align_and_byte_order() {
    let mut writer = ByteWriter::new(ByteOrder::Big);
    writer.write_u8(1);
    writer.write_u16(0x0203);
    writer.align(TRACK_ALIGNMENT, ALIGN_PAD_BYTE);
    writer.write_u32(0x0405_0607);
    assert_eq!(writer.as_slice(), &[1, 2, 3, 0x55, 4, 5, 6, 7]);

    let bytes = writer.into_inner();
    let mut reader = ByteReader::new(&bytes, ByteOrder::Big);
    assert_eq!(reader.read_u8(), 1);
    assert_eq!(reader.read_u16(), 0x0203);
    reader.align(TRACK_ALIGNMENT);
    assert_eq!(reader.read_u32(), 0x0405_0607);
}

#[test]
fn test_little_endian_stream_and_peek() {
    let mut writer = ByteWriter::new(ByteOrder::Little);
    writer.write_u16(0x0203);
    writer.write_f32(-2.5);
    let bytes = writer.into_inner();
    assert_eq!(&bytes[..2], &[3, 2]);
    assert_eq!(&bytes[2..], &(-2.5f32).to_bits().to_le_bytes());

    let mut reader = ByteReader::at(&bytes, 2, ByteOrder::Little);
    assert_eq!(reader.peek_u32(), (-2.5f32).to_bits());
    assert_eq!(reader.position(), 2);
    assert_eq!(reader.read_f32(), -2.5);
    assert_eq!(reader.position(), 6);
}

#[test]
fn test_format_discriminants() {
    for format in Format::ALL {
        assert_eq!(Format::from_u8(format as u8), Ok(format));
    }
    assert_eq!(Format::from_u8(7), Err(CodecError::UnknownFormat(7)));
    assert_eq!(KeyEncoding::from_u8(3), Err(CodecError::UnknownKeyEncoding(3)));
    assert_eq!(frame_table_entry_size(255), 1);
    assert_eq!(frame_table_entry_size(256), 2);
}
