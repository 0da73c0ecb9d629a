//! Core traits for pierfit

use crate::{error::Result, mesh::*, obb::OrientedBoundingBox, point::*, point_cloud::*, transform::RigidTransform};

/// Trait for nearest neighbor search functionality
pub trait NearestNeighborSearch {
    /// Find the single nearest neighbor to a query point
    fn find_nearest(&self, query: &Point3f) -> Option<(usize, f32)>;

    /// Find the k nearest neighbors to a query point, closest first
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;

    /// Find all neighbors within a given radius
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;
}

/// A point that may carry a surface normal.
///
/// Lets the registration code accept any cloud type and estimate normals
/// only when they are missing.
pub trait SurfacePoint: Copy {
    /// Position of the point
    fn position(&self) -> Point3f;

    /// Unit normal, if the point type stores one
    fn normal(&self) -> Option<Vector3f>;

    /// Move the point (and rotate its normal) in place
    fn apply_transform(&mut self, transform: &RigidTransform);
}

impl SurfacePoint for Point3f {
    fn position(&self) -> Point3f {
        *self
    }

    fn normal(&self) -> Option<Vector3f> {
        None
    }

    fn apply_transform(&mut self, transform: &RigidTransform) {
        *self = transform.transform_point(self);
    }
}

impl SurfacePoint for NormalPoint3f {
    fn position(&self) -> Point3f {
        self.position
    }

    fn normal(&self) -> Option<Vector3f> {
        Some(self.normal)
    }

    fn apply_transform(&mut self, transform: &RigidTransform) {
        self.position = transform.transform_point(&self.position);
        self.normal = transform.transform_vector(&self.normal);
    }
}

impl SurfacePoint for ColoredPoint3f {
    fn position(&self) -> Point3f {
        self.position
    }

    fn normal(&self) -> Option<Vector3f> {
        None
    }

    fn apply_transform(&mut self, transform: &RigidTransform) {
        self.position = transform.transform_point(&self.position);
    }
}

/// Trait for objects with spatial extent
pub trait Drawable {
    /// Get the axis-aligned bounding box of the object
    fn bounding_box(&self) -> (Point3f, Point3f);

    /// Get the center point of the axis-aligned bounding box
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        Point3f::new(
            (min.x + max.x) / 2.0,
            (min.y + max.y) / 2.0,
            (min.z + max.z) / 2.0,
        )
    }

    /// Get the PCA oriented bounding box of the object
    fn oriented_bounding_box(&self) -> Result<OrientedBoundingBox>;
}

/// Trait for objects that can be transformed
pub trait Transformable {
    /// Apply a transformation to the object
    fn transform(&mut self, transform: &RigidTransform);
}

fn aabb<I: Iterator<Item = Point3f>>(mut points: I) -> (Point3f, Point3f) {
    let first = match points.next() {
        Some(p) => p,
        None => return (Point3f::origin(), Point3f::origin()),
    };
    let mut min = first;
    let mut max = first;

    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);

        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);
    }

    (min, max)
}

impl<T: SurfacePoint> Drawable for PointCloud<T> {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        aabb(self.points.iter().map(SurfacePoint::position))
    }

    fn oriented_bounding_box(&self) -> Result<OrientedBoundingBox> {
        OrientedBoundingBox::from_points(&self.positions())
    }
}

impl Drawable for TriangleMesh {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        aabb(self.vertices.iter().copied())
    }

    fn oriented_bounding_box(&self) -> Result<OrientedBoundingBox> {
        OrientedBoundingBox::from_points(&self.vertices)
    }
}

impl<T: SurfacePoint> Transformable for PointCloud<T> {
    fn transform(&mut self, transform: &RigidTransform) {
        for point in &mut self.points {
            point.apply_transform(transform);
        }
    }
}

impl Transformable for TriangleMesh {
    fn transform(&mut self, transform: &RigidTransform) {
        for vertex in &mut self.vertices {
            *vertex = transform.transform_point(vertex);
        }
        if let Some(normals) = &mut self.normals {
            for normal in normals.iter_mut() {
                *normal = transform.transform_vector(normal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    #[test]
    fn test_bounding_box_and_center() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(-1.0, 0.0, 2.0),
            Point3f::new(3.0, 4.0, -2.0),
        ]);
        let (min, max) = cloud.bounding_box();
        assert_eq!(min, Point3f::new(-1.0, 0.0, -2.0));
        assert_eq!(max, Point3f::new(3.0, 4.0, 2.0));
        assert_eq!(cloud.center(), Point3f::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_transform_rotates_normals() {
        let mut cloud = PointCloud::from_points(vec![NormalPoint3f::new(
            Point3f::new(1.0, 0.0, 0.0),
            Vector3f::new(1.0, 0.0, 0.0),
        )]);
        let transform = RigidTransform::from_rotation(
            Rotation3::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2),
            Vector3::new(0.0, 0.0, 5.0),
        );
        cloud.transform(&transform);

        let p = cloud[0];
        assert_relative_eq!(p.position.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.position.z, 5.0, epsilon = 1e-6);
        assert_relative_eq!(p.normal.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.normal.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_colored_points_keep_color() {
        let mut cloud: ColoredPointCloud3f = vec![
            ColoredPoint3f::new(Point3f::new(0.0, 0.0, 0.0), [255, 0, 0]),
            ColoredPoint3f::new(Point3f::new(2.0, 2.0, 2.0), [0, 0, 255]),
        ]
        .into_iter()
        .collect();
        cloud.transform(&RigidTransform::translation(Vector3f::new(1.0, 0.0, 0.0)));

        assert_eq!(cloud[0].color, [255, 0, 0]);
        assert_eq!(cloud[1].color, [0, 0, 255]);
        assert_eq!(cloud[1].position(), Point3f::new(3.0, 2.0, 2.0));
        assert!(cloud[0].normal().is_none());
        assert_eq!(cloud.center(), Point3f::new(2.0, 1.0, 1.0));
        assert_eq!(Point3f::from(cloud[0]), Point3f::new(1.0, 0.0, 0.0));
    }
}
