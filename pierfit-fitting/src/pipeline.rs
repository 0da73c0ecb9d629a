//! Scan fitting pipeline
//!
//! build solid -> OBB alignment -> surface sampling -> GICP -> fitted solid

use crate::parametric::{DistanceParameters, TPillarBuilder};
use pierfit_algorithms::{
    coarse_align_detailed, fine_align_detailed, sample_points_uniformly, CoarseAlignParams,
    GicpParams, GicpResult,
};
use pierfit_core::{
    Error, PointCloud, Result, RigidTransform, SurfacePoint, Transformable, TriangleMesh,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for the fitting pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Points sampled from the coarsely aligned solid for GICP
    pub sample_count: usize,
    pub sampling_seed: u64,
    pub coarse: CoarseAlignParams,
    pub gicp: GicpParams,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            sample_count: 10_000,
            sampling_seed: 0,
            coarse: CoarseAlignParams::default(),
            gicp: GicpParams::default(),
        }
    }
}

impl FitConfig {
    pub fn with_sample_count(mut self, count: usize) -> Self {
        self.sample_count = count;
        self
    }

    pub fn with_sampling_seed(mut self, seed: u64) -> Self {
        self.sampling_seed = seed;
        self
    }

    pub fn with_coarse(mut self, coarse: CoarseAlignParams) -> Self {
        self.coarse = coarse;
        self
    }

    pub fn with_gicp(mut self, gicp: GicpParams) -> Self {
        self.gicp = gicp;
        self
    }
}

/// Output of a successful fit
#[derive(Debug, Clone)]
pub struct FitResult {
    /// The solid, already in target coordinates
    pub mesh: TriangleMesh,
    pub coarse_transform: RigidTransform,
    /// Applied after `coarse_transform`
    pub fine_transform: RigidTransform,
    /// `fine_transform * coarse_transform`, maps the solid as built onto the scan
    pub transformation: RigidTransform,
    pub registration: GicpResult,
}

/// Fits a T-pillar solid to a scanned point cloud
#[derive(Debug, Clone, Default)]
pub struct FitPipeline {
    config: FitConfig,
    builder: TPillarBuilder,
}

impl FitPipeline {
    pub fn new(config: FitConfig) -> Self {
        Self {
            config,
            builder: TPillarBuilder::new(),
        }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Build the solid described by `params` and move it onto `target`.
    ///
    /// The first failing stage's error is returned unchanged.
    pub fn run<T>(&self, params: &DistanceParameters, target: &PointCloud<T>) -> Result<FitResult>
    where
        T: SurfacePoint + Sync,
    {
        if target.is_empty() {
            return Err(Error::InvalidData("target point cloud is empty".to_string()));
        }

        let mut mesh = self.builder.build(params)?;

        let coarse = coarse_align_detailed(&mesh, target, &self.config.coarse)?;
        mesh.transform(&coarse.transformation);
        debug!(
            angle = coarse.transformation.rotation_angle(),
            mirror_corrected = coarse.mirror_corrected,
            "applied coarse alignment"
        );

        let samples = sample_points_uniformly(
            &mesh,
            self.config.sample_count,
            self.config.sampling_seed,
        )?;
        let registration = fine_align_detailed(
            &samples,
            target,
            &RigidTransform::identity(),
            &self.config.gicp,
        )?;
        mesh.transform(&registration.transformation);

        let transformation = registration.transformation * coarse.transformation;
        info!(
            fitness = registration.fitness,
            inlier_rmse = registration.inlier_rmse,
            iterations = registration.iterations,
            converged = registration.converged,
            "fitted T-pillar to {} target points",
            target.len()
        );

        Ok(FitResult {
            mesh,
            coarse_transform: coarse.transformation,
            fine_transform: registration.transformation,
            transformation,
            registration,
        })
    }
}

/// Build and fit a T-pillar with default settings, returning the fitted mesh
pub fn fit<T>(
    params: &DistanceParameters,
    target: &PointCloud<T>,
    sample_count: usize,
) -> Result<TriangleMesh>
where
    T: SurfacePoint + Sync,
{
    let config = FitConfig::default().with_sample_count(sample_count);
    FitPipeline::new(config).run(params, target).map(|result| result.mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pierfit_core::{Point3f, Vector3f};

    fn scenario() -> DistanceParameters {
        DistanceParameters::new([2.0, 3.0, 0.5, 1.0, 1.0, 0.3]).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = FitConfig::default();
        assert_eq!(config.sample_count, 10_000);
        assert_eq!(config.gicp.max_iterations, 200);
        assert_eq!(config.gicp.max_correspondence_distance, 0.05);
    }

    #[test]
    fn test_empty_target() {
        let target: PointCloud<Point3f> = PointCloud::new();
        assert!(matches!(
            FitPipeline::default().run(&scenario(), &target),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_flat_target_propagates_degenerate_geometry() {
        let target: PointCloud<Point3f> = (0..20)
            .flat_map(|i| (0..20).map(move |j| Point3f::new(i as f32 * 0.1, 0.0, j as f32 * 0.1)))
            .collect();
        assert!(matches!(
            fit(&scenario(), &target, 1000),
            Err(Error::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_zero_samples_rejected() {
        let target: PointCloud<Point3f> = TPillarBuilder::new()
            .build(&scenario())
            .unwrap()
            .vertices
            .iter()
            .map(|v| v + Vector3f::new(1.0, 0.0, 0.0))
            .collect();
        assert!(matches!(
            fit(&scenario(), &target, 0),
            Err(Error::InvalidParameter(_))
        ));
    }
}
