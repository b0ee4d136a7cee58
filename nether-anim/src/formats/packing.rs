//! Scalar, vector and quaternion packers
//!
//! Lossy quaternion formats store only X/Y/Z of the canonical (W >= 0)
//! quaternion and rebuild W on decode, so a decoded rotation never has a
//! negative W even if the input did.

use glam::{Quat, Vec3};

use super::{ByteReader, ByteWriter, Format};

/// Range exponent used for Fixed48 quaternion components (`[-1, 1]`)
pub const QUAT_FIXED48_LOG2_MAX: u32 = 0;

/// Range exponent used for Fixed48 translation/scale components (`[-128, 128]`)
pub const VECTOR_FIXED48_LOG2_MAX: u32 = 7;

bitflags::bitflags! {
    /// Components stored per key by Float96 and Fixed48 tracks.
    ///
    /// Absent components decode as zero; for rotations W is rebuilt from the rest.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ComponentFlags: u8 {
        const X = 0b001;
        const Y = 0b010;
        const Z = 0b100;
    }
}

impl ComponentFlags {
    /// Flag for each axis index
    pub const AXES: [Self; 3] = [Self::X, Self::Y, Self::Z];
}

const FIXED16_OFFSET: i32 = 32767;

// ============================================================================
// Fixed-point
// ============================================================================

#[inline]
fn fixed16_scale(log2_max_value: u32) -> f32 {
    debug_assert!(log2_max_value <= 15);
    FIXED16_OFFSET as f32 / (1u32 << log2_max_value) as f32
}

/// Maps `[-2^k, 2^k]` onto `u16` (k = `log2_max_value`), clamping outside values
#[inline]
pub fn compress_fixed16(value: f32, log2_max_value: u32) -> u16 {
    let quantized = (value * fixed16_scale(log2_max_value)).round() as i32 + FIXED16_OFFSET;
    quantized.clamp(0, u16::MAX as i32) as u16
}

#[inline]
pub fn decompress_fixed16(bits: u16, log2_max_value: u32) -> f32 {
    (bits as i32 - FIXED16_OFFSET) as f32 / fixed16_scale(log2_max_value)
}

// ============================================================================
// Quaternion helpers
// ============================================================================

/// Normalises and flips to the W >= 0 hemisphere
#[inline]
pub fn canonicalize_quat(q: Quat) -> Quat {
    let q = q.normalize();
    if q.w < 0.0 { -q } else { q }
}

/// Rebuilds a unit quaternion from X/Y/Z with non-negative W
#[inline]
pub fn rebuild_quat_w(x: f32, y: f32, z: f32) -> Quat {
    let w_squared = 1.0 - x * x - y * y - z * z;
    Quat::from_xyzw(x, y, z, w_squared.max(0.0).sqrt())
}

// ============================================================================
// Fixed32 (11/11/10 fixed point)
// ============================================================================

const FIXED32_HALF_11: f32 = 1023.0;
const FIXED32_HALF_10: f32 = 511.0;

#[inline]
fn quantize_signed(value: f32, half: f32) -> u32 {
    let max = 2.0 * half + 1.0;
    ((value * half).round() + half).clamp(0.0, max) as u32
}

#[inline]
fn dequantize_signed(bits: u32, half: f32) -> f32 {
    (bits as f32 - half) / half
}

/// Packs as `X:11 | Y:11 | Z:10` (X in the high bits)
pub fn pack_quat_fixed32(q: Quat) -> u32 {
    let q = canonicalize_quat(q);
    let x = quantize_signed(q.x, FIXED32_HALF_11);
    let y = quantize_signed(q.y, FIXED32_HALF_11);
    let z = quantize_signed(q.z, FIXED32_HALF_10);
    (x << 21) | (y << 10) | z
}

pub fn unpack_quat_fixed32(packed: u32) -> Quat {
    let x = dequantize_signed((packed >> 21) & 0x7FF, FIXED32_HALF_11);
    let y = dequantize_signed((packed >> 10) & 0x7FF, FIXED32_HALF_11);
    let z = dequantize_signed(packed & 0x3FF, FIXED32_HALF_10);
    rebuild_quat_w(x, y, z)
}

// ============================================================================
// Float32 (reduced floats)
// ============================================================================

const REDUCED_EXPONENT_BITS: u32 = 3;
const REDUCED_EXPONENT_BIAS: i32 = 7;
/// Smallest normal magnitude (stored exponent 1)
const REDUCED_MIN_NORMAL: f32 = 1.0 / 64.0;

/// Packs `value` (|value| <= 1) as sign:1 | exponent:3 | mantissa:N.
///
/// Stored exponent 0 holds denormals below 2^-6; larger magnitudes clamp to 1.0.
pub fn pack_reduced_float(value: f32, mantissa_bits: u32) -> u32 {
    let sign = u32::from(value < 0.0);
    let magnitude = value.abs().min(1.0);
    let mantissa_scale = (1u32 << mantissa_bits) as f32;
    let mantissa_max = 1u32 << mantissa_bits;

    let (exponent, mantissa) = if magnitude < REDUCED_MIN_NORMAL {
        let m = (magnitude / REDUCED_MIN_NORMAL * mantissa_scale).round() as u32;
        if m >= mantissa_max { (1, 0) } else { (0, m) }
    } else {
        let e = (magnitude.log2().floor() as i32).clamp(1 - REDUCED_EXPONENT_BIAS, 0);
        let fraction = (magnitude / 2f32.powi(e) - 1.0).max(0.0);
        let mut m = (fraction * mantissa_scale).round() as u32;
        let mut stored = (e + REDUCED_EXPONENT_BIAS) as u32;
        if m >= mantissa_max {
            m = 0;
            stored += 1;
        }
        if stored > REDUCED_EXPONENT_BIAS as u32 {
            (REDUCED_EXPONENT_BIAS as u32, 0)
        } else {
            (stored, m)
        }
    };

    (sign << (REDUCED_EXPONENT_BITS + mantissa_bits)) | (exponent << mantissa_bits) | mantissa
}

pub fn unpack_reduced_float(bits: u32, mantissa_bits: u32) -> f32 {
    let mantissa_scale = (1u32 << mantissa_bits) as f32;
    let mantissa = (bits & ((1 << mantissa_bits) - 1)) as f32 / mantissa_scale;
    let exponent = (bits >> mantissa_bits) & ((1 << REDUCED_EXPONENT_BITS) - 1);
    let negative = (bits >> (REDUCED_EXPONENT_BITS + mantissa_bits)) & 1 == 1;

    let magnitude = if exponent == 0 {
        REDUCED_MIN_NORMAL * mantissa
    } else {
        2f32.powi(exponent as i32 - REDUCED_EXPONENT_BIAS) * (1.0 + mantissa)
    };
    if negative { -magnitude } else { magnitude }
}

/// Packs X and Y as 11-bit and Z as 10-bit reduced floats: `X | Y | Z`
pub fn pack_quat_float32(q: Quat) -> u32 {
    let q = canonicalize_quat(q);
    let x = pack_reduced_float(q.x, 7);
    let y = pack_reduced_float(q.y, 7);
    let z = pack_reduced_float(q.z, 6);
    (x << 21) | (y << 10) | z
}

pub fn unpack_quat_float32(packed: u32) -> Quat {
    let x = unpack_reduced_float((packed >> 21) & 0x7FF, 7);
    let y = unpack_reduced_float((packed >> 10) & 0x7FF, 7);
    let z = unpack_reduced_float(packed & 0x3FF, 6);
    rebuild_quat_w(x, y, z)
}

// ============================================================================
// IntervalFixed32
// ============================================================================

/// Per-component `[min, min + range]` box a track's keys are quantised against
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntervalBounds {
    pub min: Vec3,
    pub range: Vec3,
}

impl IntervalBounds {
    /// Bounds enclosing every vector in `values`
    pub fn from_vectors(values: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut any = false;
        for v in values {
            min = min.min(v);
            max = max.max(v);
            any = true;
        }
        if !any {
            return Self::default();
        }
        Self {
            min,
            range: max - min,
        }
    }

    /// Bounds enclosing X/Y/Z of every canonicalised quaternion in `values`
    pub fn from_quats(values: impl IntoIterator<Item = Quat>) -> Self {
        Self::from_vectors(values.into_iter().map(|q| {
            let q = canonicalize_quat(q);
            Vec3::new(q.x, q.y, q.z)
        }))
    }

    /// Writes `min.x, range.x, min.y, range.y, min.z, range.z`
    pub fn write(&self, writer: &mut ByteWriter) {
        for axis in 0..3 {
            writer.write_f32(self.min[axis]);
            writer.write_f32(self.range[axis]);
        }
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Self {
        let mut bounds = Self::default();
        for axis in 0..3 {
            bounds.min[axis] = reader.read_f32();
            bounds.range[axis] = reader.read_f32();
        }
        bounds
    }
}

#[inline]
fn quantize_interval(value: f32, min: f32, range: f32, bits: u32) -> u32 {
    if range <= 0.0 {
        return 0;
    }
    let max = ((1u32 << bits) - 1) as f32;
    let unit = ((value - min) / range).clamp(0.0, 1.0);
    (unit * max).round() as u32
}

#[inline]
fn dequantize_interval(bits: u32, min: f32, range: f32, bit_count: u32) -> f32 {
    let max = ((1u32 << bit_count) - 1) as f32;
    min + range * (bits as f32 / max)
}

/// Packs canonical X/Y/Z as `X:11 | Y:11 | Z:10` relative to `bounds`
pub fn pack_quat_interval(q: Quat, bounds: &IntervalBounds) -> u32 {
    let q = canonicalize_quat(q);
    let x = quantize_interval(q.x, bounds.min.x, bounds.range.x, 11);
    let y = quantize_interval(q.y, bounds.min.y, bounds.range.y, 11);
    let z = quantize_interval(q.z, bounds.min.z, bounds.range.z, 10);
    (x << 21) | (y << 10) | z
}

pub fn unpack_quat_interval(packed: u32, bounds: &IntervalBounds) -> Quat {
    let x = dequantize_interval((packed >> 21) & 0x7FF, bounds.min.x, bounds.range.x, 11);
    let y = dequantize_interval((packed >> 10) & 0x7FF, bounds.min.y, bounds.range.y, 11);
    let z = dequantize_interval(packed & 0x3FF, bounds.min.z, bounds.range.z, 10);
    rebuild_quat_w(x, y, z)
}

/// Packs a vector as `Z:11 | Y:11 | X:10` (X in the low bits) relative to `bounds`
pub fn pack_vector_interval(v: Vec3, bounds: &IntervalBounds) -> u32 {
    let x = quantize_interval(v.x, bounds.min.x, bounds.range.x, 10);
    let y = quantize_interval(v.y, bounds.min.y, bounds.range.y, 11);
    let z = quantize_interval(v.z, bounds.min.z, bounds.range.z, 11);
    (z << 21) | (y << 10) | x
}

pub fn unpack_vector_interval(packed: u32, bounds: &IntervalBounds) -> Vec3 {
    Vec3::new(
        dequantize_interval(packed & 0x3FF, bounds.min.x, bounds.range.x, 10),
        dequantize_interval((packed >> 10) & 0x7FF, bounds.min.y, bounds.range.y, 11),
        dequantize_interval((packed >> 21) & 0x7FF, bounds.min.z, bounds.range.z, 11),
    )
}

// ============================================================================
// Key read / write
// ============================================================================

/// Writes one rotation key.
///
/// `flags` selects stored components for Float96/Fixed48; `bounds` is only read
/// for IntervalFixed32. Vector-only callers must reject formats beforehand.
pub fn write_quat(
    writer: &mut ByteWriter,
    format: Format,
    flags: ComponentFlags,
    bounds: &IntervalBounds,
    q: Quat,
) {
    match format {
        Format::None => {
            writer.write_f32(q.x);
            writer.write_f32(q.y);
            writer.write_f32(q.z);
            writer.write_f32(q.w);
        }
        Format::Float96 => {
            let q = canonicalize_quat(q);
            for axis in 0..3 {
                if flags.contains(ComponentFlags::AXES[axis]) {
                    writer.write_f32(q.to_array()[axis]);
                }
            }
        }
        Format::Fixed48 => {
            let q = canonicalize_quat(q);
            for axis in 0..3 {
                if flags.contains(ComponentFlags::AXES[axis]) {
                    writer.write_u16(compress_fixed16(q.to_array()[axis], QUAT_FIXED48_LOG2_MAX));
                }
            }
        }
        Format::IntervalFixed32 => writer.write_u32(pack_quat_interval(q, bounds)),
        Format::Fixed32 => writer.write_u32(pack_quat_fixed32(q)),
        Format::Float32 => writer.write_u32(pack_quat_float32(q)),
        Format::Identity => {}
    }
}

pub fn read_quat(
    reader: &mut ByteReader<'_>,
    format: Format,
    flags: ComponentFlags,
    bounds: &IntervalBounds,
) -> Quat {
    match format {
        Format::None => {
            let x = reader.read_f32();
            let y = reader.read_f32();
            let z = reader.read_f32();
            let w = reader.read_f32();
            Quat::from_xyzw(x, y, z, w)
        }
        Format::Float96 => {
            let mut xyz = [0.0f32; 3];
            for (axis, value) in xyz.iter_mut().enumerate() {
                if flags.contains(ComponentFlags::AXES[axis]) {
                    *value = reader.read_f32();
                }
            }
            rebuild_quat_w(xyz[0], xyz[1], xyz[2])
        }
        Format::Fixed48 => {
            let mut xyz = [0.0f32; 3];
            for (axis, value) in xyz.iter_mut().enumerate() {
                if flags.contains(ComponentFlags::AXES[axis]) {
                    *value = decompress_fixed16(reader.read_u16(), QUAT_FIXED48_LOG2_MAX);
                }
            }
            rebuild_quat_w(xyz[0], xyz[1], xyz[2])
        }
        Format::IntervalFixed32 => unpack_quat_interval(reader.read_u32(), bounds),
        Format::Fixed32 => unpack_quat_fixed32(reader.read_u32()),
        Format::Float32 => unpack_quat_float32(reader.read_u32()),
        Format::Identity => Quat::IDENTITY,
    }
}

/// Writes one translation/scale key. Fixed32/Float32 write nothing.
pub fn write_vector(
    writer: &mut ByteWriter,
    format: Format,
    flags: ComponentFlags,
    bounds: &IntervalBounds,
    v: Vec3,
) {
    match format {
        Format::None => {
            writer.write_f32(v.x);
            writer.write_f32(v.y);
            writer.write_f32(v.z);
        }
        Format::Float96 => {
            for axis in 0..3 {
                if flags.contains(ComponentFlags::AXES[axis]) {
                    writer.write_f32(v[axis]);
                }
            }
        }
        Format::Fixed48 => {
            for axis in 0..3 {
                if flags.contains(ComponentFlags::AXES[axis]) {
                    writer.write_u16(compress_fixed16(v[axis], VECTOR_FIXED48_LOG2_MAX));
                }
            }
        }
        Format::IntervalFixed32 => writer.write_u32(pack_vector_interval(v, bounds)),
        Format::Fixed32 | Format::Float32 => {
            debug_assert!(false, "{format} has no vector layout");
        }
        Format::Identity => {}
    }
}

pub fn read_vector(
    reader: &mut ByteReader<'_>,
    format: Format,
    flags: ComponentFlags,
    bounds: &IntervalBounds,
) -> Vec3 {
    match format {
        Format::None => {
            let x = reader.read_f32();
            let y = reader.read_f32();
            let z = reader.read_f32();
            Vec3::new(x, y, z)
        }
        Format::Float96 => {
            let mut v = Vec3::ZERO;
            for axis in 0..3 {
                if flags.contains(ComponentFlags::AXES[axis]) {
                    v[axis] = reader.read_f32();
                }
            }
            v
        }
        Format::Fixed48 => {
            let mut v = Vec3::ZERO;
            for axis in 0..3 {
                if flags.contains(ComponentFlags::AXES[axis]) {
                    v[axis] = decompress_fixed16(reader.read_u16(), VECTOR_FIXED48_LOG2_MAX);
                }
            }
            v
        }
        Format::IntervalFixed32 => unpack_vector_interval(reader.read_u32(), bounds),
        Format::Fixed32 | Format::Float32 | Format::Identity => Vec3::ZERO,
    }
}

/// Bytes written per key for `format` once component flags are applied
pub fn flagged_stride(format: Format, flags: ComponentFlags, rotation: bool) -> usize {
    let present = flags.bits().count_ones() as usize;
    match format {
        Format::Float96 => 4 * present,
        Format::Fixed48 => 2 * present,
        Format::None if rotation => 16,
        Format::None => 12,
        Format::IntervalFixed32 | Format::Fixed32 | Format::Float32 => 4,
        Format::Identity => 0,
    }
}
