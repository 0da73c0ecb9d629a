//! Oriented bounding boxes computed by principal component analysis

use crate::error::{Error, Result};
use crate::point::*;
use nalgebra::{Matrix3, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// A box aligned to the principal axes of a point set.
///
/// The columns of `rotation` are the box axes in world coordinates, ordered
/// by decreasing spread of the points, and always form a right-handed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedBoundingBox {
    pub center: Point3f,
    pub rotation: Matrix3<f32>,
    pub half_extents: Vector3f,
}

impl OrientedBoundingBox {
    /// Fit a box to `points`.
    ///
    /// Eigenvector signs are fixed so the largest-magnitude component of the
    /// first two axes is positive; the third axis is their cross product. Two
    /// point sets that differ only by a translation therefore get identical
    /// axes.
    ///
    /// Principal variances within [`ISOTROPY_TOLERANCE`] of each other (a
    /// cube, a square prism) do not pin down their axes. Inside such a tied
    /// subspace the axes are taken from the world axes closest to it, so a
    /// cube always gets the identity frame.
    pub fn from_points(points: &[Point3f]) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InvalidData(
                "cannot compute an oriented bounding box of an empty point set".to_string(),
            ));
        }
        if let Some(i) = points
            .iter()
            .position(|p| !p.coords.iter().all(|c| c.is_finite()))
        {
            return Err(Error::InvalidData(format!(
                "point {} has a non-finite coordinate: {:?}",
                i,
                points[i].coords.as_slice()
            )));
        }

        let n = points.len() as f64;
        let centroid = points
            .iter()
            .fold(Vector3d::zeros(), |acc, p| acc + p.coords.cast::<f64>())
            / n;

        let mut covariance = Matrix3::<f64>::zeros();
        for p in points {
            let d = p.coords.cast::<f64>() - centroid;
            covariance += d * d.transpose();
        }
        covariance /= n;

        let rotation = principal_axes(covariance)?;

        let mut local_min = Vector3d::repeat(f64::INFINITY);
        let mut local_max = Vector3d::repeat(f64::NEG_INFINITY);
        for p in points {
            let local = rotation.transpose() * (p.coords.cast::<f64>() - centroid);
            local_min = local_min.inf(&local);
            local_max = local_max.sup(&local);
        }

        let half_extents = (local_max - local_min) / 2.0;
        let local_center = (local_min + local_max) / 2.0;
        let center = centroid + rotation * local_center;

        Ok(Self {
            center: Point3f::from(center.cast::<f32>()),
            rotation: rotation.cast::<f32>(),
            half_extents: half_extents.cast::<f32>(),
        })
    }

    /// Full side lengths along each box axis
    pub fn extents(&self) -> Vector3f {
        self.half_extents * 2.0
    }

    pub fn volume(&self) -> f32 {
        let e = self.extents();
        e.x * e.y * e.z
    }

    /// Box axis `i` (0, 1 or 2) in world coordinates
    pub fn axis(&self, i: usize) -> Vector3f {
        self.rotation.column(i).into_owned()
    }

    pub fn min_half_extent(&self) -> f32 {
        self.half_extents.min()
    }

    /// True when the thinnest side is negligible next to the widest one
    pub fn is_degenerate(&self, ratio: f32) -> bool {
        let largest = self.half_extents.max();
        largest <= f32::EPSILON || self.min_half_extent() <= ratio * largest
    }

    /// Check if a point is inside the box
    pub fn contains(&self, point: &Point3f) -> bool {
        let local = self.rotation.transpose() * (point - self.center);
        local.x.abs() <= self.half_extents.x
            && local.y.abs() <= self.half_extents.y
            && local.z.abs() <= self.half_extents.z
    }

    /// The 8 corners in world coordinates
    pub fn corners(&self) -> [Point3f; 8] {
        let h = self.half_extents;
        let signs = [
            (-1.0, -1.0, -1.0),
            (1.0, -1.0, -1.0),
            (1.0, 1.0, -1.0),
            (-1.0, 1.0, -1.0),
            (-1.0, -1.0, 1.0),
            (1.0, -1.0, 1.0),
            (1.0, 1.0, 1.0),
            (-1.0, 1.0, 1.0),
        ];
        signs.map(|(sx, sy, sz)| {
            self.center + self.rotation * Vector3f::new(sx * h.x, sy * h.y, sz * h.z)
        })
    }
}

/// Principal variances closer than this fraction of the largest one are
/// treated as equal
pub const ISOTROPY_TOLERANCE: f64 = 0.1;

/// Right-handed frame of principal axes, by decreasing variance
fn principal_axes(covariance: Matrix3<f64>) -> Result<Matrix3<f64>> {
    let eigen = SymmetricEigen::new(covariance);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let variance = |i: usize| eigen.eigenvalues[order[i]];
    let axis = |i: usize| -> Vector3d { eigen.eigenvectors.column(order[i]).into_owned() };
    let tied = |i: usize, j: usize| variance(i) - variance(j) <= ISOTROPY_TOLERANCE * variance(0).abs();

    let (first, second) = if tied(0, 2) {
        (Vector3d::x(), Vector3d::y())
    } else if tied(0, 1) {
        world_aligned_pair(&axis(0), &axis(1))
    } else if tied(1, 2) {
        (canonical_sign(axis(0)), world_aligned_pair(&axis(1), &axis(2)).0)
    } else {
        (canonical_sign(axis(0)), canonical_sign(axis(1)))
    };

    let third = first.cross(&second).try_normalize(f64::EPSILON).ok_or_else(|| {
        Error::Algorithm("principal axes are not independent".to_string())
    })?;
    Ok(Matrix3::from_columns(&[first, second, third]))
}

/// Orthonormal basis of the plane spanned by orthonormal `a` and `b`, built
/// from the world axes nearest that plane and ordered by world axis index
fn world_aligned_pair(a: &Vector3d, b: &Vector3d) -> (Vector3d, Vector3d) {
    // squared length of world axis k projected into the plane; these sum to 2
    let closeness = |k: usize| a[k] * a[k] + b[k] * b[k];
    let nearest = (1..3).fold(0, |best, k| if closeness(k) > closeness(best) { k } else { best });

    let u = (a * a[nearest] + b * b[nearest]).normalize();
    let w = canonical_sign(a.cross(b).cross(&u));
    if w.iamax() < nearest {
        (w, u)
    } else {
        (u, w)
    }
}

fn canonical_sign(axis: Vector3d) -> Vector3d {
    if axis[axis.iamax()] < 0.0 {
        -axis
    } else {
        axis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    fn box_corners(size: Vector3f, offset: Vector3f) -> Vec<Point3f> {
        let mut points = Vec::new();
        for &x in &[0.0, size.x] {
            for &y in &[0.0, size.y] {
                for &z in &[0.0, size.z] {
                    points.push(Point3f::new(x, y, z) + offset);
                }
            }
        }
        points
    }

    #[test]
    fn test_axis_aligned_box() {
        let points = box_corners(Vector3f::new(4.0, 2.0, 1.0), Vector3f::new(1.0, 1.0, 1.0));
        let obb = OrientedBoundingBox::from_points(&points).unwrap();

        assert_relative_eq!(obb.center, Point3f::new(3.0, 2.0, 1.5), epsilon = 1e-5);
        assert_relative_eq!(obb.half_extents, Vector3f::new(2.0, 1.0, 0.5), epsilon = 1e-5);
        assert_relative_eq!(obb.rotation, Matrix3::identity(), epsilon = 1e-5);
        assert_relative_eq!(obb.volume(), 8.0, epsilon = 1e-4);
        assert_relative_eq!(obb.rotation.determinant(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_rotated_box_axes_follow_rotation() {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.4);
        let points: Vec<Point3f> = box_corners(Vector3f::new(4.0, 2.0, 1.0), Vector3f::zeros())
            .iter()
            .map(|p| rotation * p)
            .collect();
        let obb = OrientedBoundingBox::from_points(&points).unwrap();

        assert_relative_eq!(obb.axis(0).dot(&(rotation * Vector3f::x())).abs(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(obb.half_extents, Vector3f::new(2.0, 1.0, 0.5), epsilon = 1e-4);
    }

    #[test]
    fn test_translation_invariant_axes() {
        let a = box_corners(Vector3f::new(3.0, 2.0, 1.0), Vector3f::zeros());
        let b = box_corners(Vector3f::new(3.0, 2.0, 1.0), Vector3f::new(5.0, -2.0, 7.0));
        let obb_a = OrientedBoundingBox::from_points(&a).unwrap();
        let obb_b = OrientedBoundingBox::from_points(&b).unwrap();
        assert_relative_eq!(obb_a.rotation, obb_b.rotation, epsilon = 1e-5);
        assert_relative_eq!(obb_b.center - obb_a.center, Vector3f::new(5.0, -2.0, 7.0), epsilon = 1e-4);
    }

    #[test]
    fn test_contains_and_corners() {
        let points = box_corners(Vector3f::new(2.0, 3.0, 4.0), Vector3f::zeros());
        let obb = OrientedBoundingBox::from_points(&points).unwrap();
        assert!(obb.contains(&Point3f::new(1.0, 1.5, 2.0)));
        assert!(!obb.contains(&Point3f::new(10.0, 1.0, 1.0)));
        for corner in obb.corners() {
            assert!(obb.contains(&(corner + (obb.center - corner) * 1e-3)));
        }
    }

    #[test]
    fn test_flat_set_is_degenerate() {
        let points = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
        ];
        let obb = OrientedBoundingBox::from_points(&points).unwrap();
        assert!(obb.is_degenerate(1e-6));

        let solid = box_corners(Vector3f::new(1.0, 2.0, 3.0), Vector3f::zeros());
        assert!(!OrientedBoundingBox::from_points(&solid).unwrap().is_degenerate(1e-6));
    }

    #[test]
    fn test_empty_input() {
        assert!(OrientedBoundingBox::from_points(&[]).is_err());
    }

    #[test]
    fn test_non_finite_point_rejected() {
        let mut points = box_corners(Vector3f::new(1.0, 2.0, 3.0), Vector3f::zeros());
        points[3].y = f32::NAN;
        assert!(matches!(
            OrientedBoundingBox::from_points(&points),
            Err(Error::InvalidData(_))
        ));

        points[3].y = f32::INFINITY;
        assert!(OrientedBoundingBox::from_points(&points).is_err());
    }

    #[test]
    fn test_near_cube_gets_world_frame() {
        // slightly unequal sides, turned about z: the variances are tied so
        // the frame snaps to the world axes instead of following the turn
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.3);
        let points: Vec<Point3f> = box_corners(Vector3f::new(1.02, 1.0, 0.99), Vector3f::zeros())
            .iter()
            .map(|p| rotation * p)
            .collect();
        let obb = OrientedBoundingBox::from_points(&points).unwrap();
        assert_relative_eq!(obb.rotation, Matrix3::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_square_prism_tied_pair_uses_world_axes() {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.3);
        let points: Vec<Point3f> = box_corners(Vector3f::new(1.0, 0.98, 3.0), Vector3f::zeros())
            .iter()
            .map(|p| rotation * p)
            .collect();
        let obb = OrientedBoundingBox::from_points(&points).unwrap();

        assert_relative_eq!(obb.axis(0), Vector3f::z(), epsilon = 1e-5);
        assert_relative_eq!(obb.axis(1), Vector3f::x(), epsilon = 1e-5);
        assert_relative_eq!(obb.axis(2), Vector3f::y(), epsilon = 1e-5);
        assert_relative_eq!(obb.rotation.determinant(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_flat_square_tied_pair_stays_right_handed() {
        let points: Vec<Point3f> = (0..5)
            .flat_map(|i| (0..5).map(move |j| Point3f::new(i as f32, 0.5, j as f32)))
            .collect();
        let obb = OrientedBoundingBox::from_points(&points).unwrap();

        assert_relative_eq!(obb.axis(0), Vector3f::x(), epsilon = 1e-5);
        assert_relative_eq!(obb.axis(1), Vector3f::z(), epsilon = 1e-5);
        assert_relative_eq!(obb.rotation.determinant(), 1.0, epsilon = 1e-5);
        assert!(obb.is_degenerate(1e-6));
    }
}
