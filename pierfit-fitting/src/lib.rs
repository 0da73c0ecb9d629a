//! # Pierfit Fitting
//!
//! Generates the parametric T-pillar solid and fits it to a scanned point
//! cloud in two stages: oriented bounding box alignment followed by GICP.
//!
//! ```no_run
//! use pierfit_core::{Point3f, PointCloud};
//! use pierfit_fitting::{fit, DistanceParameters};
//!
//! # fn main() -> pierfit_core::Result<()> {
//! let scan: PointCloud<Point3f> = PointCloud::new(); // load a scan here
//! let params = DistanceParameters::try_from(&[2.0, 3.0, 0.5, 1.0, 1.0, 0.3][..])?;
//! let fitted = fit(&params, &scan, 10_000)?;
//! println!("{} vertices", fitted.vertex_count());
//! # Ok(())
//! # }
//! ```

pub mod parametric;
pub mod pipeline;

pub use parametric::*;
pub use pipeline::*;
