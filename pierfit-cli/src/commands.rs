//! Subcommand implementations

use std::path::Path;

use anyhow::{Context, Result};
use pierfit_algorithms::{
    coarse_align_detailed, fine_align_detailed, sample_points_uniformly, CoarseAlignParams,
    GicpParams, GicpResult,
};
use pierfit_core::{RigidTransform, Transformable, TriangleMesh};
use pierfit_fitting::{DistanceParameters, FitConfig, FitPipeline, TPillarBuilder};
use serde::Serialize;
use tracing::info;

use crate::{Cli, OutputFormat, RegistrationArgs};

/// What `fit` and `align` print
#[derive(Serialize)]
struct AlignmentReport {
    /// Row-major 4x4 matrix mapping the input model onto the scan
    transformation: [[f32; 4]; 4],
    coarse_transformation: [[f32; 4]; 4],
    mirror_corrected: Option<bool>,
    registration: Option<RegistrationReport>,
}

#[derive(Serialize)]
struct RegistrationReport {
    fitness: f64,
    inlier_rmse: f64,
    iterations: usize,
    converged: bool,
    correspondences: usize,
}

impl From<&GicpResult> for RegistrationReport {
    fn from(result: &GicpResult) -> Self {
        Self {
            fitness: result.fitness,
            inlier_rmse: result.inlier_rmse,
            iterations: result.iterations,
            converged: result.converged,
            correspondences: result.correspondence_count,
        }
    }
}

fn rows(transform: &RigidTransform) -> [[f32; 4]; 4] {
    let m = transform.to_homogeneous();
    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = m[(r, c)];
        }
    }
    rows
}

fn gicp_params(args: &RegistrationArgs) -> GicpParams {
    GicpParams::default()
        .with_max_correspondence_distance(args.threshold)
        .with_max_iterations(args.max_iterations)
        .with_require_convergence(args.require_convergence)
}

fn parse_params(values: &[f32]) -> Result<DistanceParameters> {
    DistanceParameters::try_from(values).context("invalid T-pillar parameters")
}

fn load_scan(path: &Path) -> Result<pierfit_core::PointCloud<pierfit_core::Point3f>> {
    let scan = pierfit_io::read_point_cloud(path)
        .with_context(|| format!("failed to read scan {}", path.display()))?;
    info!(points = scan.len(), path = %path.display(), "loaded scan");
    Ok(scan)
}

fn save_mesh(mesh: &TriangleMesh, path: &Path) -> Result<()> {
    pierfit_io::write_mesh(mesh, path)
        .with_context(|| format!("failed to write mesh {}", path.display()))
}

fn print_report(report: &AlignmentReport, cli: &Cli) -> Result<()> {
    if cli.quiet {
        return Ok(());
    }
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!("Transformation:");
            for row in &report.transformation {
                println!(
                    "  {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
                    row[0], row[1], row[2], row[3]
                );
            }
            if let Some(true) = report.mirror_corrected {
                println!("Bounding box alignment needed a mirror correction");
            }
            if let Some(reg) = &report.registration {
                println!(
                    "GICP: fitness {:.4}, inlier RMSE {:.6}, {} iterations{}",
                    reg.fitness,
                    reg.inlier_rmse,
                    reg.iterations,
                    if reg.converged { "" } else { " (not converged)" }
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn generate(params: &[f32], output: &Path, cli: &Cli) -> Result<()> {
    let params = parse_params(params)?;
    let mesh = TPillarBuilder::new().build(&params)?;
    save_mesh(&mesh, output)?;

    if !cli.quiet {
        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&params)?),
            OutputFormat::Text => println!(
                "Wrote T-pillar with {} vertices and {} faces to {}",
                mesh.vertex_count(),
                mesh.face_count(),
                output.display()
            ),
        }
    }
    Ok(())
}

pub(crate) fn fit(
    params: &[f32],
    scan: &Path,
    output: &Path,
    registration: &RegistrationArgs,
    cli: &Cli,
) -> Result<()> {
    let params = parse_params(params)?;
    let target = load_scan(scan)?;

    let config = FitConfig::default()
        .with_sample_count(registration.samples)
        .with_sampling_seed(registration.seed)
        .with_gicp(gicp_params(registration));
    let result = FitPipeline::new(config)
        .run(&params, &target)
        .context("fitting failed")?;
    save_mesh(&result.mesh, output)?;

    print_report(
        &AlignmentReport {
            transformation: rows(&result.transformation),
            coarse_transformation: rows(&result.coarse_transform),
            mirror_corrected: None,
            registration: Some(RegistrationReport::from(&result.registration)),
        },
        cli,
    )
}

pub(crate) fn align(
    mesh_path: &Path,
    scan: &Path,
    output: &Path,
    refine: bool,
    registration: &RegistrationArgs,
    cli: &Cli,
) -> Result<()> {
    let mut mesh = pierfit_io::read_mesh(mesh_path)
        .with_context(|| format!("failed to read mesh {}", mesh_path.display()))?;
    let target = load_scan(scan)?;

    let coarse = coarse_align_detailed(&mesh, &target, &CoarseAlignParams::default())
        .context("bounding box alignment failed")?;
    mesh.transform(&coarse.transformation);

    let mut transformation = coarse.transformation;
    let mut report = None;
    if refine {
        let samples = sample_points_uniformly(&mesh, registration.samples, registration.seed)?;
        let result = fine_align_detailed(
            &samples,
            &target,
            &RigidTransform::identity(),
            &gicp_params(registration),
        )
        .context("GICP refinement failed")?;
        mesh.transform(&result.transformation);
        transformation = result.transformation * transformation;
        report = Some(RegistrationReport::from(&result));
    }
    save_mesh(&mesh, output)?;

    print_report(
        &AlignmentReport {
            transformation: rows(&transformation),
            coarse_transformation: rows(&coarse.transformation),
            mirror_corrected: Some(coarse.mirror_corrected),
            registration: report,
        },
        cli,
    )
}
