//! Rigid 3D transformation utilities

use crate::error::{Error, Result};
use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that a matrix is a proper rotation
const ROTATION_TOLERANCE: f32 = 1e-4;

/// A rigid (rotation + translation) transformation that can be applied to
/// points, point clouds and meshes.
///
/// Points are mapped as `p' = rotation * p + translation`. The rotation is
/// always orthonormal with determinant +1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    rotation: Matrix3<f32>,
    translation: Vector3<f32>,
}

impl RigidTransform {
    /// Create an identity transformation
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Create a pure translation
    pub fn translation(translation: Vector3<f32>) -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation,
        }
    }

    /// Create a transformation from a rotation and a translation
    pub fn from_rotation(rotation: Rotation3<f32>, translation: Vector3<f32>) -> Self {
        Self {
            rotation: rotation.into_inner(),
            translation,
        }
    }

    /// Create a transformation from a raw rotation matrix and translation.
    ///
    /// Fails with [`Error::InvalidData`] if `rotation` is not orthonormal or
    /// is a reflection.
    pub fn from_parts(rotation: Matrix3<f32>, translation: Vector3<f32>) -> Result<Self> {
        if !is_proper_rotation(&rotation) {
            return Err(Error::InvalidData(format!(
                "matrix is not a proper rotation (det = {:.6})",
                rotation.determinant()
            )));
        }
        Ok(Self {
            rotation,
            translation,
        })
    }

    /// Create a transformation from a 4x4 homogeneous matrix
    pub fn from_homogeneous(matrix: &Matrix4<f32>) -> Result<Self> {
        let bottom = matrix.fixed_view::<1, 4>(3, 0);
        if (bottom[(0, 0)].abs() + bottom[(0, 1)].abs() + bottom[(0, 2)].abs()) > ROTATION_TOLERANCE
            || (bottom[(0, 3)] - 1.0).abs() > ROTATION_TOLERANCE
        {
            return Err(Error::InvalidData(
                "homogeneous matrix has a projective row".to_string(),
            ));
        }
        let rotation = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let translation = matrix.fixed_view::<3, 1>(0, 3).into_owned();
        Self::from_parts(rotation, translation)
    }

    /// The 3x3 rotation part
    pub fn rotation(&self) -> &Matrix3<f32> {
        &self.rotation
    }

    /// The translation part
    pub fn translation_vector(&self) -> &Vector3<f32> {
        &self.translation
    }

    /// The 4x4 homogeneous matrix
    pub fn to_homogeneous(&self) -> Matrix4<f32> {
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        matrix
    }

    /// Apply the transformation to a point
    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        Point3::from(self.rotation * point.coords + self.translation)
    }

    /// Apply the rotation to a vector (translation does not affect directions)
    pub fn transform_vector(&self, vector: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * vector
    }

    /// Compose this transformation with another: `other` is applied first
    pub fn compose(self, other: Self) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Get the inverse transformation
    pub fn inverse(self) -> Self {
        let rotation = self.rotation.transpose();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// Rotation angle in radians
    pub fn rotation_angle(&self) -> f32 {
        let cos = ((self.rotation.trace() - 1.0) / 2.0).clamp(-1.0, 1.0);
        cos.acos()
    }

    /// Check if this is approximately the identity transformation
    pub fn is_identity(&self, epsilon: f32) -> bool {
        (self.to_homogeneous() - Matrix4::identity()).norm() < epsilon
    }
}

/// Orthonormal with determinant +1, within [`ROTATION_TOLERANCE`]
pub fn is_proper_rotation(matrix: &Matrix3<f32>) -> bool {
    let orthogonality = (matrix.transpose() * matrix - Matrix3::identity()).norm();
    orthogonality < ROTATION_TOLERANCE && (matrix.determinant() - 1.0).abs() < ROTATION_TOLERANCE
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for RigidTransform {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(rhs)
    }
}

impl From<Isometry3<f32>> for RigidTransform {
    fn from(isometry: Isometry3<f32>) -> Self {
        Self {
            rotation: isometry.rotation.to_rotation_matrix().into_inner(),
            translation: isometry.translation.vector,
        }
    }
}

impl From<RigidTransform> for Isometry3<f32> {
    fn from(transform: RigidTransform) -> Self {
        let rotation = Rotation3::from_matrix_unchecked(transform.rotation);
        Isometry3::from_parts(
            Translation3::from(transform.translation),
            UnitQuaternion::from_rotation_matrix(&rotation),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_transform() -> RigidTransform {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        RigidTransform::from_rotation(rotation, Vector3::new(1.0, 2.0, 3.0))
    }

    #[test]
    fn test_transform_point() {
        let transform = sample_transform();
        let p = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 3.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_compose_order() {
        let rotate = RigidTransform::from_rotation(
            Rotation3::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2),
            Vector3::zeros(),
        );
        let shift = RigidTransform::translation(Vector3::new(1.0, 0.0, 0.0));

        // shift first, then rotate
        let p = (rotate * shift).transform_point(&Point3::origin());
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let transform = sample_transform();
        let identity = transform * transform.inverse();
        assert!(identity.is_identity(1e-5));
    }

    #[test]
    fn test_homogeneous_conversion() {
        let transform = sample_transform();
        let back = RigidTransform::from_homogeneous(&transform.to_homogeneous()).unwrap();
        assert_relative_eq!(*back.rotation(), *transform.rotation(), epsilon = 1e-6);
        assert_relative_eq!(*back.translation_vector(), *transform.translation_vector(), epsilon = 1e-6);
    }

    #[test]
    fn test_rejects_reflection() {
        let mirror = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0);
        assert!(RigidTransform::from_parts(mirror, Vector3::zeros()).is_err());

        let scaled = Matrix3::identity() * 2.0;
        assert!(RigidTransform::from_parts(scaled, Vector3::zeros()).is_err());
    }

    #[test]
    fn test_isometry_conversion() {
        let transform = sample_transform();
        let isometry: Isometry3<f32> = transform.into();
        let back = RigidTransform::from(isometry);
        assert_relative_eq!(*back.rotation(), *transform.rotation(), epsilon = 1e-5);
        assert_relative_eq!(transform.rotation_angle(), std::f32::consts::FRAC_PI_2, epsilon = 1e-5);
    }
}
