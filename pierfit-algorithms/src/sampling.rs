//! Uniform surface sampling of triangle meshes

use pierfit_core::{Error, NormalPoint3f, PointCloud, Result, TriangleMesh};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

/// Draw `count` points uniformly over the surface of `mesh`.
///
/// Triangles are chosen with probability proportional to their area and the
/// point is placed uniformly inside the chosen triangle. Every sample carries
/// the unit normal of its triangle. The same mesh, count and seed always
/// produce the same cloud.
pub fn sample_points_uniformly(
    mesh: &TriangleMesh,
    count: usize,
    seed: u64,
) -> Result<PointCloud<NormalPoint3f>> {
    if count == 0 {
        return Err(Error::InvalidParameter(
            "sample count must be positive".to_string(),
        ));
    }
    if mesh.is_empty() {
        return Err(Error::InvalidData("cannot sample an empty mesh".to_string()));
    }
    mesh.validate_indices()?;

    let areas = mesh.face_areas();
    let mut cumulative = Vec::with_capacity(areas.len());
    let mut total = 0.0f64;
    for area in &areas {
        total += *area as f64;
        cumulative.push(total);
    }
    if total <= f64::EPSILON {
        return Err(Error::DegenerateGeometry(
            "mesh has zero surface area".to_string(),
        ));
    }

    let face_normals = mesh.calculate_face_normals();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cloud = PointCloud::with_capacity(count);

    for _ in 0..count {
        let target = rng.gen::<f64>() * total;
        let face_idx = cumulative
            .partition_point(|&c| c <= target)
            .min(cumulative.len() - 1);
        let [a, b, c] = mesh.faces[face_idx];

        let r1: f32 = rng.gen::<f32>().sqrt();
        let r2: f32 = rng.gen();
        let (u, v, w) = (1.0 - r1, r1 * (1.0 - r2), r1 * r2);

        let position = mesh.vertices[a].coords * u + mesh.vertices[b].coords * v + mesh.vertices[c].coords * w;
        cloud.push(NormalPoint3f::new(position.into(), face_normals[face_idx]));
    }

    debug!(count, faces = mesh.face_count(), area = total, "sampled mesh surface");
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pierfit_core::{Point3f, Vector3f};

    fn unit_square() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_samples_lie_on_surface() {
        let cloud = sample_points_uniformly(&unit_square(), 500, 3).unwrap();
        assert_eq!(cloud.len(), 500);
        for point in cloud.iter() {
            assert_relative_eq!(point.position.z, 0.0);
            assert!((0.0..=1.0).contains(&point.position.x));
            assert!((0.0..=1.0).contains(&point.position.y));
            assert_relative_eq!(point.normal, Vector3f::z(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_area_weighting() {
        // second triangle has three times the area of the first
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(10.0, 0.0, 0.0),
                Point3f::new(13.0, 0.0, 0.0),
                Point3f::new(10.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        );
        let cloud = sample_points_uniformly(&mesh, 4000, 11).unwrap();
        let on_large = cloud.iter().filter(|p| p.position.x >= 10.0).count() as f32;
        assert_relative_eq!(on_large / 4000.0, 0.75, epsilon = 0.05);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = sample_points_uniformly(&unit_square(), 100, 42).unwrap();
        let b = sample_points_uniformly(&unit_square(), 100, 42).unwrap();
        let c = sample_points_uniformly(&unit_square(), 100, 43).unwrap();
        assert!(a.iter().zip(b.iter()).all(|(p, q)| p.position == q.position));
        assert!(a.iter().zip(c.iter()).any(|(p, q)| p.position != q.position));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            sample_points_uniformly(&unit_square(), 0, 0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            sample_points_uniformly(&TriangleMesh::new(), 10, 0),
            Err(Error::InvalidData(_))
        ));

        let flat = TriangleMesh::from_vertices_and_faces(
            vec![Point3f::origin(), Point3f::new(1.0, 0.0, 0.0), Point3f::new(2.0, 0.0, 0.0)],
            vec![[0, 1, 2]],
        );
        assert!(matches!(
            sample_points_uniformly(&flat, 10, 0),
            Err(Error::DegenerateGeometry(_))
        ));
    }
}
