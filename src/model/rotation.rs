use std::ops::Mul;

use glam::{Mat4, Quat, Vec3};

/// Orientation kept as a unit quaternion together with its axis-angle form.
///
/// Every constructor and mutator goes through `from_quat`, so the two forms
/// can never disagree. The rotation matrix is always derived on read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    quat: Quat,
    axis: Vec3,
    angle: f32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rotation {
    pub const IDENTITY: Rotation = Rotation {
        quat: Quat::IDENTITY,
        axis: Vec3::Z,
        angle: 0.0,
    };

    pub fn from_quat(quat: Quat) -> Self {
        let quat = if quat.length_squared() > f32::EPSILON {
            quat.normalize()
        } else {
            Quat::IDENTITY
        };
        let (axis, angle) = quat.to_axis_angle();
        // glam reports an arbitrary axis for the identity; keep +Z like the default
        let axis = if angle.abs() <= f32::EPSILON || !axis.is_finite() {
            Vec3::Z
        } else {
            axis
        };
        Self { quat, axis, angle }
    }

    /// Rotation of `radians` around `axis`. A zero axis yields the identity
    /// rotation but remembers the requested angle of zero.
    pub fn from_axis_angle(axis: Vec3, radians: f32) -> Self {
        match axis.try_normalize() {
            Some(axis) => Self::from_quat(Quat::from_axis_angle(axis, radians)),
            None => Self::IDENTITY,
        }
    }

    pub fn from_degrees(axis: Vec3, degrees: f32) -> Self {
        Self::from_axis_angle(axis, degrees.to_radians())
    }

    pub fn quat(&self) -> Quat {
        self.quat
    }

    pub fn axis(&self) -> Vec3 {
        self.axis
    }

    /// Angle in radians
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_quat(self.quat)
    }

    pub fn is_finite(&self) -> bool {
        self.quat.is_finite()
    }
}

impl Mul for Rotation {
    type Output = Rotation;

    /// `a * b` applies `b` first, then `a`
    fn mul(self, rhs: Rotation) -> Rotation {
        Rotation::from_quat(self.quat * rhs.quat)
    }
}

impl From<Quat> for Rotation {
    fn from(quat: Quat) -> Self {
        Rotation::from_quat(quat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_mat_eq(a: Mat4, b: Mat4) {
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array().iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_axis_angle_roundtrip_matches_matrix() {
        let mut r = Rotation::IDENTITY;
        for (axis, deg) in [
            (Vec3::Y, 30.0),
            (Vec3::X, -45.0),
            (Vec3::new(1.0, 1.0, 0.0), 120.0),
            (Vec3::Z, 200.0),
        ] {
            r = r * Rotation::from_degrees(axis, deg);
            let rebuilt = Rotation::from_axis_angle(r.axis(), r.angle());
            assert_mat_eq(r.matrix(), rebuilt.matrix());
        }
    }

    #[test]
    fn test_multiplication_order() {
        let a = Rotation::from_degrees(Vec3::Y, 90.0);
        let b = Rotation::from_degrees(Vec3::X, 90.0);
        let ab = (a * b).matrix().transform_vector3(Vec3::Z);
        let expected = a.matrix().transform_vector3(b.matrix().transform_vector3(Vec3::Z));
        assert_abs_diff_eq!(ab.x, expected.x, epsilon = 1e-5);
        assert_abs_diff_eq!(ab.y, expected.y, epsilon = 1e-5);
        assert_abs_diff_eq!(ab.z, expected.z, epsilon = 1e-5);
        assert!(!(a * b).matrix().abs_diff_eq((b * a).matrix(), 1e-3));
    }

    #[test]
    fn test_zero_axis_is_identity() {
        let r = Rotation::from_degrees(Vec3::ZERO, 45.0);
        assert_eq!(r.quat(), Quat::IDENTITY);
        assert_eq!(r.angle(), 0.0);
    }
}
