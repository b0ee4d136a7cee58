//! Rigid transform math shared by the codecs
//!
//! Bone transforms are stored as separate rotation / translation / scale parts,
//! matching the three track channels an animation carries per bone.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Scale components smaller than this are treated as zero when inverting
const SMALL_SCALE: f32 = 1.0e-8;

/// Bone transform (TRS) in the space of its parent bone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Rotation quaternion
    pub rotation: Quat,
    /// Translation
    pub translation: Vec3,
    /// Non-uniform scale
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Identity transform (no rotation, no translation, unit scale)
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub const fn new(rotation: Quat, translation: Vec3, scale: Vec3) -> Self {
        Self {
            rotation,
            translation,
            scale,
        }
    }

    /// Pure translation
    pub const fn from_translation(translation: Vec3) -> Self {
        Self {
            rotation: Quat::IDENTITY,
            translation,
            scale: Vec3::ONE,
        }
    }

    /// Moves `self`, expressed relative to `parent`, into the parent's space.
    ///
    /// Applying the result to a point equals applying `self` and then `parent`.
    #[inline]
    pub fn compose(&self, parent: &Transform) -> Transform {
        Transform {
            rotation: parent.rotation * self.rotation,
            translation: parent.rotation * (parent.scale * self.translation) + parent.translation,
            scale: parent.scale * self.scale,
        }
    }

    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * (self.scale * point) + self.translation
    }

    /// Inverse of [`Transform::transform_point`]; zero scale components map to zero
    #[inline]
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        let unrotated = self.rotation.inverse() * (point - self.translation);
        unrotated * safe_reciprocal(self.scale)
    }

    #[inline]
    pub fn normalize_rotation(&mut self) {
        self.rotation = self.rotation.normalize();
    }

    /// Blends two transforms: linear for translation/scale, [`fast_lerp`] for rotation
    #[inline]
    pub fn blend(a: &Transform, b: &Transform, alpha: f32) -> Transform {
        Transform {
            rotation: fast_lerp(a.rotation, b.rotation, alpha),
            translation: a.translation.lerp(b.translation, alpha),
            scale: a.scale.lerp(b.scale, alpha),
        }
    }

    pub fn contains_nan(&self) -> bool {
        self.rotation.is_nan() || self.translation.is_nan() || self.scale.is_nan()
    }
}

/// Component-wise reciprocal with zero for (near) zero components
#[inline]
pub fn safe_reciprocal(v: Vec3) -> Vec3 {
    let recip = |c: f32| if c.abs() > SMALL_SCALE { 1.0 / c } else { 0.0 };
    Vec3::new(recip(v.x), recip(v.y), recip(v.z))
}

/// Shortest-path linear quaternion blend followed by normalisation.
///
/// Not a slerp: the angular velocity is not constant across the span.
#[inline]
pub fn fast_lerp(a: Quat, b: Quat, alpha: f32) -> Quat {
    let bias = if a.dot(b) >= 0.0 { 1.0 } else { -1.0 };
    (a * (1.0 - alpha) + b * (alpha * bias)).normalize()
}

/// Angular difference between two rotations, in `[0, 1]` (1 = opposite).
///
/// Computed as `acos(|a·b|) / π`; sign of either input is ignored.
#[inline]
pub fn quat_error(a: Quat, b: Quat) -> f32 {
    let cosom = a.dot(b).abs();
    if cosom < 0.999_999_9 {
        cosom.acos() * std::f32::consts::FRAC_1_PI
    } else {
        0.0
    }
}

/// Same as [`quat_error`] but normalises both inputs first
#[inline]
pub fn quat_error_auto_normalize(a: Quat, b: Quat) -> f32 {
    quat_error(a.normalize(), b.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_applies_child_then_parent() {
        let parent = Transform::new(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ONE,
        );
        let child = Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let world = child.compose(&parent);

        let p = Vec3::new(0.5, 0.0, 0.0);
        let expected = parent.transform_point(child.transform_point(p));
        assert!(world.transform_point(p).abs_diff_eq(expected, 1e-5));
        assert!(world.translation.abs_diff_eq(Vec3::new(10.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn test_inverse_transform_point() {
        let t = Transform::new(
            Quat::from_rotation_y(0.7),
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(2.0, 1.0, 0.5),
        );
        let p = Vec3::new(-3.0, 4.0, 0.25);
        let back = t.inverse_transform_point(t.transform_point(p));
        assert!(back.abs_diff_eq(p, 1e-4));
    }

    #[test]
    fn test_quat_error_ignores_sign() {
        let q = Quat::from_rotation_x(0.3);
        assert_eq!(quat_error(q, -q), 0.0);
        assert_eq!(quat_error(q, q), 0.0);
    }

    #[test]
    fn test_quat_error_half_turn() {
        // 180° apart as rotations = 90° apart on the quaternion sphere
        let a = Quat::IDENTITY;
        let b = Quat::from_rotation_z(std::f32::consts::PI);
        assert!((quat_error(a, b) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_fast_lerp_takes_short_path() {
        let a = Quat::from_rotation_z(0.2);
        let b = -Quat::from_rotation_z(0.4);
        let mid = fast_lerp(a, b, 0.5);
        assert!(quat_error(mid, Quat::from_rotation_z(0.3)) < 1e-4);
        assert!((mid.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_fast_lerp_endpoints() {
        let a = Quat::from_rotation_x(0.5);
        let b = Quat::from_rotation_y(1.0);
        assert!(fast_lerp(a, b, 0.0).abs_diff_eq(a, 1e-6));
        assert!(fast_lerp(a, b, 1.0).abs_diff_eq(b, 1e-6));
    }
}
