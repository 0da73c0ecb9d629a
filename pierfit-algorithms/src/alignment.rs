//! Coarse alignment by oriented bounding boxes
//!
//! Boxes from [`OrientedBoundingBox::from_points`] are always right-handed,
//! so the mirror correction in [`box_rotation`] only fires for boxes built
//! some other way, such as a left-handed frame deserialized from disk.

use nalgebra::Matrix3;
use pierfit_core::{
    Drawable, Error, OrientedBoundingBox, PointCloud, Result, RigidTransform, SurfacePoint,
    TriangleMesh,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Parameters for OBB alignment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoarseAlignParams {
    /// A box is rejected when its smallest half-extent is at or below this
    /// fraction of its largest one
    pub degenerate_extent_ratio: f32,
}

impl Default for CoarseAlignParams {
    fn default() -> Self {
        Self {
            degenerate_extent_ratio: 1e-6,
        }
    }
}

impl CoarseAlignParams {
    pub fn with_degenerate_extent_ratio(mut self, ratio: f32) -> Self {
        self.degenerate_extent_ratio = ratio;
        self
    }
}

/// Result of coarse alignment
#[derive(Debug, Clone, Copy)]
pub struct CoarseAlignment {
    /// Maps source coordinates into target coordinates
    pub transformation: RigidTransform,
    pub source_box: OrientedBoundingBox,
    pub target_box: OrientedBoundingBox,
    /// The candidate rotation was a reflection and its third column was negated
    pub mirror_corrected: bool,
}

/// Superimpose the oriented bounding box of `source` onto that of `target`.
///
/// The rotation maps the source box axes onto the target box axes and is
/// applied about the source box center; the translation then moves the
/// rotated source box center onto the target box center.
pub fn coarse_align_detailed<T: SurfacePoint>(
    source: &TriangleMesh,
    target: &PointCloud<T>,
    params: &CoarseAlignParams,
) -> Result<CoarseAlignment> {
    let target_box = target.oriented_bounding_box()?;
    let source_box = source.oriented_bounding_box()?;
    check_extent("target cloud", &target_box, params)?;
    check_extent("source mesh", &source_box, params)?;

    let (rotation, mirror_corrected) = box_rotation(&source_box, &target_box);

    let pivot = source_box.center;
    let rotated: Vec<_> = source
        .vertices
        .iter()
        .map(|v| pivot + rotation * (v - pivot))
        .collect();
    let rotated_box = OrientedBoundingBox::from_points(&rotated)?;
    let offset = target_box.center - rotated_box.center;

    let translation = pivot.coords - rotation * pivot.coords + offset;
    let transformation = RigidTransform::from_parts(rotation, translation)?;

    debug!(
        angle = transformation.rotation_angle(),
        tx = translation.x,
        ty = translation.y,
        tz = translation.z,
        mirror_corrected,
        "coarse alignment"
    );

    Ok(CoarseAlignment {
        transformation,
        source_box,
        target_box,
        mirror_corrected,
    })
}

/// Rigid transform that roughly superimposes `source` onto `target`
pub fn coarse_align<T: SurfacePoint>(
    source: &TriangleMesh,
    target: &PointCloud<T>,
) -> Result<RigidTransform> {
    coarse_align_detailed(source, target, &CoarseAlignParams::default())
        .map(|alignment| alignment.transformation)
}

/// Rotation taking the axes of `source` onto the axes of `target`.
///
/// When the two frames differ in handedness the product is a reflection; its
/// third column is negated and the flag is set.
pub fn box_rotation(
    source: &OrientedBoundingBox,
    target: &OrientedBoundingBox,
) -> (Matrix3<f32>, bool) {
    let mut rotation = target.rotation * source.rotation.transpose();
    let mirror_corrected = rotation.determinant() < 0.0;
    if mirror_corrected {
        warn!("box axes disagree in handedness, negating third rotation column");
        let flipped = -rotation.column(2);
        rotation.set_column(2, &flipped);
    }
    (rotation, mirror_corrected)
}

fn check_extent(
    what: &str,
    obb: &OrientedBoundingBox,
    params: &CoarseAlignParams,
) -> Result<()> {
    if obb.is_degenerate(params.degenerate_extent_ratio) {
        return Err(Error::DegenerateGeometry(format!(
            "{} is flat: oriented box half-extents are {:?}",
            what,
            obb.half_extents.as_slice()
        )));
    }
    Ok(())
}
