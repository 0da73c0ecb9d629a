//! Fine alignment by Generalized ICP
//!
//! Every point carries a covariance that is flat along its local surface
//! (`I - (1 - eps) n nᵀ`). Each iteration pairs every transformed source
//! point with its nearest target point inside the correspondence distance and
//! takes one Gauss-Newton step on
//!
//! ```text
//! Σ (T p - q)ᵀ (C_q + R C_p Rᵀ)⁻¹ (T p - q)
//! ```
//!
//! which behaves like plane-to-plane ICP for well sampled surfaces.

use crate::nearest_neighbor::RTreeIndex;
use crate::normals::{ensure_normals, NormalEstimationParams};
use nalgebra::{Matrix3, Matrix3x6, Matrix6, Rotation3, Vector6};
use pierfit_core::{
    Error, NearestNeighborSearch, NormalPoint3f, Point3f, PointCloud, Result, RigidTransform,
    SurfacePoint, Vector3d,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Parameters for GICP registration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GicpParams {
    /// Pairs farther apart than this are not correspondences
    pub max_correspondence_distance: f32,
    pub max_iterations: usize,
    /// Stop when fitness changes by less than this between iterations
    /// (together with `relative_rmse`)
    pub relative_fitness: f64,
    /// Stop when inlier RMSE changes by less than this between iterations
    /// (together with `relative_fitness`)
    pub relative_rmse: f64,
    /// Stop when the norm of a Gauss-Newton update falls below this
    pub min_update: f64,
    /// Covariance along the normal relative to the tangent directions
    pub covariance_epsilon: f64,
    /// Neighborhood size used when a cloud has no normals
    pub normal_k_neighbors: usize,
    /// Fail instead of returning the best transform when the iteration
    /// budget runs out
    pub require_convergence: bool,
}

impl Default for GicpParams {
    fn default() -> Self {
        Self {
            max_correspondence_distance: 0.05,
            max_iterations: 200,
            relative_fitness: 1e-6,
            relative_rmse: 1e-6,
            min_update: 1e-8,
            covariance_epsilon: 1e-3,
            normal_k_neighbors: 20,
            require_convergence: false,
        }
    }
}

impl GicpParams {
    pub fn with_max_correspondence_distance(mut self, distance: f32) -> Self {
        self.max_correspondence_distance = distance;
        self
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_tolerances(mut self, relative_fitness: f64, relative_rmse: f64) -> Self {
        self.relative_fitness = relative_fitness;
        self.relative_rmse = relative_rmse;
        self
    }

    pub fn with_covariance_epsilon(mut self, epsilon: f64) -> Self {
        self.covariance_epsilon = epsilon;
        self
    }

    pub fn with_normal_k_neighbors(mut self, k: usize) -> Self {
        self.normal_k_neighbors = k;
        self
    }

    pub fn with_require_convergence(mut self, require: bool) -> Self {
        self.require_convergence = require;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_correspondence_distance.is_finite() && self.max_correspondence_distance > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "max_correspondence_distance must be positive, got {}",
                self.max_correspondence_distance
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidParameter(
                "max_iterations must be positive".to_string(),
            ));
        }
        if !(self.covariance_epsilon > 0.0 && self.covariance_epsilon <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "covariance_epsilon must be in (0, 1], got {}",
                self.covariance_epsilon
            )));
        }
        if self.relative_fitness < 0.0 || self.relative_rmse < 0.0 || self.min_update < 0.0 {
            return Err(Error::InvalidParameter(
                "convergence tolerances must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Registration quality of one evaluated transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    /// Fraction of source points with a correspondence
    pub fitness: f64,
    /// RMS distance over the correspondences
    pub inlier_rmse: f64,
    pub correspondences: usize,
}

impl IterationStats {
    fn from_matches(matches: &[Correspondence], source_len: usize) -> Self {
        let sum: f64 = matches.iter().map(|m| m.distance_2).sum();
        let count = matches.len();
        Self {
            fitness: count as f64 / source_len as f64,
            inlier_rmse: if count == 0 { 0.0 } else { (sum / count as f64).sqrt() },
            correspondences: count,
        }
    }

    fn is_better_than(&self, other: &Self) -> bool {
        self.fitness > other.fitness
            || (self.fitness == other.fitness && self.inlier_rmse < other.inlier_rmse)
    }
}

/// Result of GICP registration
#[derive(Debug, Clone)]
pub struct GicpResult {
    /// Best transform found, mapping source coordinates into target coordinates
    pub transformation: RigidTransform,
    pub fitness: f64,
    pub inlier_rmse: f64,
    /// Gauss-Newton steps taken
    pub iterations: usize,
    pub converged: bool,
    /// Correspondences at the returned transform
    pub correspondence_count: usize,
    /// Every evaluated transform in order, starting with the initial guess
    pub history: Vec<IterationStats>,
}

#[derive(Debug, Clone, Copy)]
struct Correspondence {
    source: usize,
    target: usize,
    distance_2: f64,
}

struct Surface {
    positions: Vec<Vector3d>,
    covariances: Vec<Matrix3<f64>>,
}

impl Surface {
    fn new(cloud: &PointCloud<NormalPoint3f>, epsilon: f64) -> Self {
        let positions = cloud.iter().map(|p| p.position.coords.cast::<f64>()).collect();
        let covariances = cloud
            .iter()
            .map(|p| plane_covariance(&p.normal.cast::<f64>(), epsilon))
            .collect();
        Self {
            positions,
            covariances,
        }
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

fn plane_covariance(normal: &Vector3d, epsilon: f64) -> Matrix3<f64> {
    match normal.try_normalize(f64::EPSILON) {
        Some(n) => Matrix3::identity() - n * n.transpose() * (1.0 - epsilon),
        None => Matrix3::identity(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Pose {
    rotation: Matrix3<f64>,
    translation: Vector3d,
}

impl Pose {
    fn from_transform(transform: &RigidTransform) -> Self {
        Self {
            rotation: transform.rotation().cast::<f64>(),
            translation: transform.translation_vector().cast::<f64>(),
        }
    }

    fn apply(&self, p: &Vector3d) -> Vector3d {
        self.rotation * p + self.translation
    }

    /// Left-multiply by the rigid motion `(exp(ω), δ)`
    fn apply_update(&mut self, update: &Vector6<f64>) {
        let omega = update.fixed_rows::<3>(0).into_owned();
        let delta = update.fixed_rows::<3>(3).into_owned();
        let step = Rotation3::new(omega).into_inner();
        self.rotation = step * self.rotation;
        self.translation = step * self.translation + delta;
    }

    fn to_transform(self) -> RigidTransform {
        let rotation = Rotation3::from_matrix(&self.rotation).into_inner().cast::<f32>();
        RigidTransform::from_rotation(
            Rotation3::from_matrix_unchecked(rotation),
            self.translation.cast::<f32>(),
        )
    }
}

fn find_correspondences(
    source: &Surface,
    target: &Surface,
    index: &RTreeIndex,
    pose: &Pose,
    max_distance: f64,
) -> Vec<Correspondence> {
    let max_distance_2 = max_distance * max_distance;
    source
        .positions
        .par_iter()
        .enumerate()
        .filter_map(|(source_idx, p)| {
            let moved = pose.apply(p);
            let query = Point3f::from(moved.cast::<f32>());
            let (target_idx, _) = index.find_nearest(&query)?;
            let distance_2 = (target.positions[target_idx] - moved).norm_squared();
            (distance_2 <= max_distance_2).then_some(Correspondence {
                source: source_idx,
                target: target_idx,
                distance_2,
            })
        })
        .collect()
}

/// Solve for the update minimizing the linearized objective, `None` if the
/// normal equations are singular
fn gauss_newton_step(
    source: &Surface,
    target: &Surface,
    pose: &Pose,
    matches: &[Correspondence],
) -> Option<Vector6<f64>> {
    let terms: Vec<(Matrix6<f64>, Vector6<f64>)> = matches
        .par_iter()
        .map(|m| {
            let p = pose.apply(&source.positions[m.source]);
            let residual = p - target.positions[m.target];
            let rotated = pose.rotation * source.covariances[m.source] * pose.rotation.transpose();
            let weight = (target.covariances[m.target] + rotated)
                .try_inverse()
                .unwrap_or_else(Matrix3::identity);

            let mut jacobian = Matrix3x6::<f64>::zeros();
            jacobian.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-p.cross_matrix()));
            jacobian.fixed_view_mut::<3, 3>(0, 3).copy_from(&Matrix3::identity());

            let jt_w = jacobian.transpose() * weight;
            (jt_w * jacobian, jt_w * residual)
        })
        .collect();

    // Sequential sum keeps the result independent of thread scheduling
    let (hessian, gradient) = terms.iter().fold(
        (Matrix6::<f64>::zeros(), Vector6::<f64>::zeros()),
        |(h, g), (hi, gi)| (h + hi, g + gi),
    );

    let rhs = -gradient;
    hessian
        .cholesky()
        .map(|chol| chol.solve(&rhs))
        .or_else(|| hessian.lu().solve(&rhs))
        .filter(|update| update.iter().all(|v| v.is_finite()))
}

/// Refine `initial` so that `source` moved by the result lies on `target`.
///
/// Clouds without normals get them estimated first. Fails with
/// [`Error::RegistrationDidNotConverge`] when the initial guess leaves no
/// source point within the correspondence distance of the target, and, if
/// `require_convergence` is set, when the iteration budget runs out.
/// Otherwise the best transform seen (highest fitness, then lowest RMSE) is
/// returned.
pub fn fine_align_detailed<S, T>(
    source: &PointCloud<S>,
    target: &PointCloud<T>,
    initial: &RigidTransform,
    params: &GicpParams,
) -> Result<GicpResult>
where
    S: SurfacePoint + Sync,
    T: SurfacePoint + Sync,
{
    params.validate()?;
    if source.is_empty() || target.is_empty() {
        return Err(Error::InvalidData(
            "source or target point cloud is empty".to_string(),
        ));
    }

    let normal_params = NormalEstimationParams::default().with_k_neighbors(params.normal_k_neighbors);
    let source_cloud = ensure_normals(source, &normal_params)?;
    let target_cloud = ensure_normals(target, &normal_params)?;
    let index = RTreeIndex::new(&target_cloud.positions());
    let source = Surface::new(&source_cloud, params.covariance_epsilon);
    let target = Surface::new(&target_cloud, params.covariance_epsilon);
    let max_distance = params.max_correspondence_distance as f64;

    let mut pose = Pose::from_transform(initial);
    let mut history: Vec<IterationStats> = Vec::new();
    let mut best: Option<(IterationStats, Pose)> = None;
    let mut iterations = 0;
    let mut converged = false;

    loop {
        let matches = find_correspondences(&source, &target, &index, &pose, max_distance);
        if matches.is_empty() {
            if history.is_empty() {
                return Err(Error::RegistrationDidNotConverge {
                    iterations: 0,
                    reason: format!(
                        "no correspondences within {} of the initial guess",
                        params.max_correspondence_distance
                    ),
                });
            }
            warn!(iterations, "lost all correspondences, keeping best transform");
            break;
        }

        let stats = IterationStats::from_matches(&matches, source.len());
        debug!(
            iteration = iterations,
            fitness = stats.fitness,
            inlier_rmse = stats.inlier_rmse,
            correspondences = stats.correspondences,
            "gicp iteration"
        );

        if let Some(previous) = history.last() {
            if (stats.fitness - previous.fitness).abs() < params.relative_fitness
                && (stats.inlier_rmse - previous.inlier_rmse).abs() < params.relative_rmse
            {
                converged = true;
            }
        }
        history.push(stats);
        if best.as_ref().map_or(true, |(b, _)| stats.is_better_than(b)) {
            best = Some((stats, pose));
        }
        if converged || iterations == params.max_iterations {
            break;
        }

        let Some(update) = gauss_newton_step(&source, &target, &pose, &matches) else {
            warn!(iterations, "singular gicp system, keeping best transform");
            break;
        };
        pose.apply_update(&update);
        iterations += 1;
        if update.norm() < params.min_update {
            converged = true;
        }
    }

    let (stats, best_pose) = best
        .ok_or_else(|| Error::Algorithm("registration evaluated no transform".to_string()))?;

    if !converged {
        if params.require_convergence {
            return Err(Error::RegistrationDidNotConverge {
                iterations,
                reason: format!(
                    "tolerance not met (fitness {:.6}, inlier rmse {:.6})",
                    stats.fitness, stats.inlier_rmse
                ),
            });
        }
        warn!(
            iterations,
            fitness = stats.fitness,
            inlier_rmse = stats.inlier_rmse,
            "gicp stopped before converging, returning best transform"
        );
    }

    info!(
        iterations,
        converged,
        fitness = stats.fitness,
        inlier_rmse = stats.inlier_rmse,
        "gicp finished"
    );

    Ok(GicpResult {
        transformation: best_pose.to_transform(),
        fitness: stats.fitness,
        inlier_rmse: stats.inlier_rmse,
        iterations,
        converged,
        correspondence_count: stats.correspondences,
        history,
    })
}

/// GICP with default tolerances, returning only the transform
pub fn fine_align<S, T>(
    source: &PointCloud<S>,
    target: &PointCloud<T>,
    initial: &RigidTransform,
    distance_threshold: f32,
    max_iterations: usize,
) -> Result<RigidTransform>
where
    S: SurfacePoint + Sync,
    T: SurfacePoint + Sync,
{
    let params = GicpParams::default()
        .with_max_correspondence_distance(distance_threshold)
        .with_max_iterations(max_iterations);
    fine_align_detailed(source, target, initial, &params).map(|result| result.transformation)
}
