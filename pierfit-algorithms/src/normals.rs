//! Normal estimation algorithms

use crate::nearest_neighbor::RTreeIndex;
use nalgebra::{Matrix3, SymmetricEigen};
use pierfit_core::{
    Error, NearestNeighborSearch, NormalPoint3f, Point3f, PointCloud, Result, SurfacePoint,
    Vector3d, Vector3f,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters for PCA normal estimation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalEstimationParams {
    /// Neighborhood size, including the query point itself
    pub k_neighbors: usize,
    /// Flip normals that point toward the cloud centroid
    pub orient_outward: bool,
}

impl Default for NormalEstimationParams {
    fn default() -> Self {
        Self {
            k_neighbors: 20,
            orient_outward: false,
        }
    }
}

impl NormalEstimationParams {
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k;
        self
    }

    pub fn with_orient_outward(mut self, orient: bool) -> Self {
        self.orient_outward = orient;
        self
    }
}

/// Estimate a unit normal for every point of `cloud`.
///
/// Each normal is the eigenvector of the smallest eigenvalue of the
/// covariance of the point's k nearest neighbors. Existing normals on the
/// input are ignored.
pub fn estimate_normals<T>(
    cloud: &PointCloud<T>,
    params: &NormalEstimationParams,
) -> Result<PointCloud<NormalPoint3f>>
where
    T: SurfacePoint + Sync,
{
    if cloud.len() < 3 {
        return Err(Error::InvalidData(format!(
            "normal estimation needs at least 3 points, got {}",
            cloud.len()
        )));
    }
    if params.k_neighbors < 3 {
        return Err(Error::InvalidParameter(format!(
            "k_neighbors must be at least 3, got {}",
            params.k_neighbors
        )));
    }

    let positions = cloud.positions();
    let index = RTreeIndex::new(&positions);
    let k = params.k_neighbors.min(positions.len());

    let mut normals: Vec<Vector3f> = positions
        .par_iter()
        .map(|point| {
            let neighbors = index.find_k_nearest(point, k);
            plane_normal(&positions, neighbors.iter().map(|&(idx, _)| idx))
        })
        .collect();

    if params.orient_outward {
        if let Some(centroid) = cloud.centroid() {
            for (normal, point) in normals.iter_mut().zip(&positions) {
                if normal.dot(&(point - centroid)) < 0.0 {
                    *normal = -*normal;
                }
            }
        }
    }

    debug!(points = positions.len(), k, "estimated normals");

    Ok(positions
        .into_iter()
        .zip(normals)
        .map(|(position, normal)| NormalPoint3f::new(position, normal))
        .collect())
}

/// Return a cloud with normals, reusing the input's normals when every point
/// already carries one.
pub fn ensure_normals<T>(
    cloud: &PointCloud<T>,
    params: &NormalEstimationParams,
) -> Result<PointCloud<NormalPoint3f>>
where
    T: SurfacePoint + Sync,
{
    let existing: Option<Vec<NormalPoint3f>> = cloud
        .iter()
        .map(|p| p.normal().map(|n| NormalPoint3f::new(p.position(), n)))
        .collect();

    match existing {
        Some(points) if !points.is_empty() => Ok(PointCloud::from_points(points)),
        _ => estimate_normals(cloud, params),
    }
}

fn plane_normal(positions: &[Point3f], neighborhood: impl Iterator<Item = usize>) -> Vector3f {
    let members: Vec<Vector3d> = neighborhood
        .map(|idx| positions[idx].coords.cast::<f64>())
        .collect();
    let n = members.len().max(1) as f64;
    let mean = members.iter().fold(Vector3d::zeros(), |acc, p| acc + p) / n;

    let mut covariance = Matrix3::<f64>::zeros();
    for p in &members {
        let d = p - mean;
        covariance += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(covariance);
    let smallest = eigen.eigenvalues.imin();
    let normal = eigen.eigenvectors.column(smallest).into_owned();
    normal
        .try_normalize(f64::EPSILON)
        .map(|n| n.cast::<f32>())
        .unwrap_or_else(Vector3f::z)
}
