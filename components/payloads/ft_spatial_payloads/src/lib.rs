use bincode::{Decode, Encode};
use core::fmt::{Debug, Display, Formatter};
use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use std::ops::Mul;
use uom::fmt::DisplayStyle::Abbreviation;
use uom::si::f64::Length as Length64;
use uom::si::length::meter;

/// RigidTransform represents a 3D rigid-body transformation (rotation + translation).
///
/// Applied to a point `p` it yields `rotation * p + translation`, so a transform
/// of a child frame relative to its parent maps child coordinates into the parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub translation: DVec3,
    pub rotation: DQuat,
}

pub type Pose = RigidTransform;

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    pub const IDENTITY: Self = Self {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    pub fn new(translation: DVec3, rotation: DQuat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            translation,
            rotation: DQuat::IDENTITY,
        }
    }

    pub fn from_rotation(rotation: DQuat) -> Self {
        Self {
            translation: DVec3::ZERO,
            rotation,
        }
    }

    /// Build from the raw wire layout: translation (x, y, z), rotation (x, y, z, w).
    pub fn from_arrays(translation: [f64; 3], rotation: [f64; 4]) -> Self {
        Self {
            translation: DVec3::from_array(translation),
            rotation: DQuat::from_array(rotation),
        }
    }

    pub fn to_arrays(&self) -> ([f64; 3], [f64; 4]) {
        (self.translation.to_array(), self.rotation.to_array())
    }

    /// Chain two transforms: `self * rhs` applies `rhs` first.
    /// Rotation is the quaternion product, translation is `self.t + self.r * rhs.t`.
    pub fn compose(&self, rhs: &RigidTransform) -> RigidTransform {
        RigidTransform {
            translation: self.translation + self.rotation * rhs.translation,
            rotation: self.rotation * rhs.rotation,
        }
    }

    /// Computes the inverse of this transformation.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// Linear interpolation of the translation and spherical linear interpolation
    /// of the rotation along the shortest arc, `ratio` in [0, 1].
    pub fn interpolate(&self, other: &RigidTransform, ratio: f64) -> RigidTransform {
        RigidTransform {
            translation: self.translation.lerp(other.translation, ratio),
            rotation: self.rotation.slerp(other.rotation, ratio),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite()
    }

    /// Compare two transforms within `epsilon`; rotations `q` and `-q` are the same.
    pub fn abs_diff_eq(&self, other: &RigidTransform, epsilon: f64) -> bool {
        self.translation.abs_diff_eq(other.translation, epsilon)
            && (self.rotation.abs_diff_eq(other.rotation, epsilon)
                || self.rotation.abs_diff_eq(-other.rotation, epsilon))
    }

    pub fn translation_lengths(&self) -> [Length64; 3] {
        [
            Length64::new::<meter>(self.translation.x),
            Length64::new::<meter>(self.translation.y),
            Length64::new::<meter>(self.translation.z),
        ]
    }
}

impl Display for RigidTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let [x, y, z] = self.translation_lengths();
        let q = self.rotation;
        write!(
            f,
            "translation ({}, {}, {}) rotation ({:.4}, {:.4}, {:.4}, {:.4})",
            x.into_format_args(meter, Abbreviation),
            y.into_format_args(meter, Abbreviation),
            z.into_format_args(meter, Abbreviation),
            q.x,
            q.y,
            q.z,
            q.w
        )
    }
}

impl Mul for RigidTransform {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(&rhs)
    }
}

impl Mul for &RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(rhs)
    }
}

impl Mul<RigidTransform> for &RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> Self::Output {
        self.compose(&rhs)
    }
}

impl Mul<&RigidTransform> for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: &RigidTransform) -> Self::Output {
        self.compose(rhs)
    }
}

// glam types carry no bincode impls, go through the raw array layout.
impl Encode for RigidTransform {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        let (translation, rotation) = self.to_arrays();
        translation.encode(encoder)?;
        rotation.encode(encoder)
    }
}

impl<Context> Decode<Context> for RigidTransform {
    fn decode<D: bincode::de::Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let translation: [f64; 3] = Decode::decode(decoder)?;
        let rotation: [f64; 4] = Decode::decode(decoder)?;
        Ok(Self::from_arrays(translation, rotation))
    }
}

bincode::impl_borrow_decode!(RigidTransform);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_identity_is_neutral() {
        let tf = RigidTransform::new(DVec3::new(1.0, 2.0, 3.0), DQuat::from_rotation_z(0.3));
        assert!((tf * RigidTransform::IDENTITY).abs_diff_eq(&tf, 1e-12));
        assert!((RigidTransform::IDENTITY * tf).abs_diff_eq(&tf, 1e-12));
    }

    #[test]
    fn test_compose_rotates_then_translates() {
        // parent <- child: 90 degrees around z then shift 1 along x
        let a = RigidTransform::new(DVec3::new(1.0, 0.0, 0.0), DQuat::from_rotation_z(FRAC_PI_2));
        let b = RigidTransform::from_translation(DVec3::new(1.0, 0.0, 0.0));
        let c = a * b;
        assert_relative_eq!(c.translation.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.translation.y, 1.0, epsilon = 1e-12);

        let p = DVec3::new(0.5, 0.0, 0.0);
        let expected = a.transform_point(b.transform_point(p));
        assert!(c.transform_point(p).abs_diff_eq(expected, 1e-12));
    }

    #[test]
    fn test_inverse() {
        let tf = RigidTransform::new(DVec3::new(2.0, -3.0, 4.0), DQuat::from_rotation_y(0.7));
        assert!((tf * tf.inverse()).abs_diff_eq(&RigidTransform::IDENTITY, 1e-12));
        assert!((tf.inverse() * tf).abs_diff_eq(&RigidTransform::IDENTITY, 1e-12));
    }

    #[test]
    fn test_interpolate_rotation_midpoint() {
        let from = RigidTransform::IDENTITY;
        let to = RigidTransform::from_rotation(DQuat::from_rotation_z(FRAC_PI_2));
        let mid = from.interpolate(&to, 0.5);
        assert!(mid
            .rotation
            .abs_diff_eq(DQuat::from_rotation_z(FRAC_PI_4), 1e-12));
        assert!(from.interpolate(&to, 0.0).abs_diff_eq(&from, 1e-12));
        assert!(from.interpolate(&to, 1.0).abs_diff_eq(&to, 1e-12));
    }

    #[test]
    fn test_interpolate_takes_shortest_arc() {
        let from = RigidTransform::from_rotation(DQuat::from_rotation_z(0.1));
        let to = RigidTransform::from_rotation(-DQuat::from_rotation_z(0.3));
        let mid = from.interpolate(&to, 0.5);
        let expected = RigidTransform::from_rotation(DQuat::from_rotation_z(0.2));
        assert!(mid.abs_diff_eq(&expected, 1e-9));
    }

    #[test]
    fn test_interpolate_translation() {
        let a = RigidTransform::from_translation(DVec3::new(1.0, 0.0, 0.0));
        let b = RigidTransform::from_translation(DVec3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(a.interpolate(&b, 0.5).translation.x, 1.5);
    }

    #[test]
    fn test_bincode_layout() {
        let tf = RigidTransform::new(DVec3::new(1.0, 2.0, 3.0), DQuat::from_rotation_x(0.5));
        let bytes = bincode::encode_to_vec(tf, bincode::config::standard()).unwrap();
        assert_eq!(bytes.len(), 7 * 8);
        let (decoded, _): (RigidTransform, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, tf);
    }

    #[test]
    fn test_display_in_meters() {
        let tf = RigidTransform::from_translation(DVec3::new(1.5, 0.0, -2.0));
        let text = tf.to_string();
        assert!(text.starts_with("translation (1.5 m, 0 m, -2 m)"), "{text}");
        assert!(text.ends_with("rotation (0.0000, 0.0000, 0.0000, 1.0000)"), "{text}");
    }

    #[test]
    fn test_translation_lengths() {
        let tf = RigidTransform::from_translation(DVec3::new(1.0, 2.0, 3.0));
        let lengths = tf.translation_lengths();
        assert_relative_eq!(lengths[1].get::<meter>(), 2.0);
    }
}
