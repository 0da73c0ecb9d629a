//! Parametric T-pillar solid
//!
//! The cross-section lies in the X-Z plane: a stem of width `stem_width`
//! rising from the origin, widening through two sloped haunches into a cap
//! of width `outer_width` that ends at `total_height`. The section is
//! extruded along +Y by `depth`.
//!
//! ```text
//!   8 ---- 9 ------ 10 ---- 11      z = total_height
//!   |      |        |       |
//!   4 ---- 5 ------ 6 ----- 7       z = total_height - cap_height
//!      `.  |        |  .'
//!         `2 ------ 3'              z = base_height
//!          |        |
//!          0 ------ 1               z = 0
//! ```
//!
//! Back vertices repeat the front ones at `y = depth` with indices offset
//! by 12.

use pierfit_core::{Error, Point3f, Result, TriangleMesh};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Vertices on one face of the extrusion
const SECTION_VERTICES: usize = 12;

pub const T_PILLAR_VERTEX_COUNT: usize = 2 * SECTION_VERTICES;
pub const T_PILLAR_FACE_COUNT: usize = 2 * FRONT_FACES.len() + 2 * OUTLINE.len();

/// Front triangles, counter-clockwise in (x, z) so the normal faces -Y
const FRONT_FACES: [[usize; 3]; 12] = [
    [0, 1, 2],
    [1, 3, 2],
    [2, 3, 5],
    [3, 6, 5],
    [5, 6, 9],
    [6, 10, 9],
    [2, 5, 4],
    [3, 7, 6],
    [4, 5, 8],
    [5, 9, 8],
    [6, 7, 10],
    [7, 11, 10],
];

/// Boundary of the front section in the same winding as `FRONT_FACES`
const OUTLINE: [usize; 10] = [0, 1, 3, 7, 11, 10, 9, 8, 4, 2];

/// Section vertices where the outline turns
const SECTION_CORNERS: [usize; 8] = [0, 1, 2, 3, 4, 7, 8, 11];

/// Straight outline segments between section corners
const SECTION_EDGES: [[usize; 2]; 8] = [
    [0, 2],
    [2, 4],
    [4, 8],
    [8, 11],
    [11, 7],
    [7, 3],
    [3, 1],
    [1, 0],
];

static FACES: [[usize; 3]; T_PILLAR_FACE_COUNT] = extrude_faces();
static CORNERS: [usize; 2 * SECTION_CORNERS.len()] = mirror_corners();
static FEATURE_EDGES: [[usize; 2]; 3 * SECTION_EDGES.len()] = feature_edges();

/// Front faces, back faces with reversed winding, then one quad per
/// outline segment joining front and back
const fn extrude_faces() -> [[usize; 3]; T_PILLAR_FACE_COUNT] {
    let mut faces = [[0usize; 3]; T_PILLAR_FACE_COUNT];
    let front = FRONT_FACES.len();

    let mut i = 0;
    while i < front {
        let [a, b, c] = FRONT_FACES[i];
        faces[i] = [a, b, c];
        faces[front + i] = [c + SECTION_VERTICES, b + SECTION_VERTICES, a + SECTION_VERTICES];
        i += 1;
    }

    let mut e = 0;
    while e < OUTLINE.len() {
        let a = OUTLINE[e];
        let b = OUTLINE[(e + 1) % OUTLINE.len()];
        let base = 2 * front + 2 * e;
        faces[base] = [b, a, a + SECTION_VERTICES];
        faces[base + 1] = [b, a + SECTION_VERTICES, b + SECTION_VERTICES];
        e += 1;
    }
    faces
}

const fn mirror_corners() -> [usize; 2 * SECTION_CORNERS.len()] {
    let mut corners = [0usize; 2 * SECTION_CORNERS.len()];
    let mut i = 0;
    while i < SECTION_CORNERS.len() {
        corners[i] = SECTION_CORNERS[i];
        corners[SECTION_CORNERS.len() + i] = SECTION_CORNERS[i] + SECTION_VERTICES;
        i += 1;
    }
    corners
}

/// Front outline, back outline, then the depth edges at each corner
const fn feature_edges() -> [[usize; 2]; 3 * SECTION_EDGES.len()] {
    let n = SECTION_EDGES.len();
    let mut edges = [[0usize; 2]; 3 * SECTION_EDGES.len()];
    let mut i = 0;
    while i < n {
        let [a, b] = SECTION_EDGES[i];
        edges[i] = [a, b];
        edges[n + i] = [a + SECTION_VERTICES, b + SECTION_VERTICES];
        i += 1;
    }
    let mut c = 0;
    while c < SECTION_CORNERS.len() {
        let v = SECTION_CORNERS[c];
        edges[2 * n + c] = [v, v + SECTION_VERTICES];
        c += 1;
    }
    edges
}

/// The six cross-section dimensions of a T-pillar, in the order p1..p6
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceParameters {
    /// p1: width of the cap
    pub outer_width: f32,
    /// p2: height of the top of the cap
    pub total_height: f32,
    /// p3: thickness of the cap
    pub cap_height: f32,
    /// p4: height where the haunches start
    pub base_height: f32,
    /// p5: width of the stem
    pub stem_width: f32,
    /// p6: extrusion depth along Y
    pub depth: f32,
}

impl DistanceParameters {
    /// Build from p1..p6 and validate
    pub fn new(values: [f32; 6]) -> Result<Self> {
        let [outer_width, total_height, cap_height, base_height, stem_width, depth] = values;
        let params = Self {
            outer_width,
            total_height,
            cap_height,
            base_height,
            stem_width,
            depth,
        };
        params.validate()?;
        Ok(params)
    }

    /// p1..p6
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.outer_width,
            self.total_height,
            self.cap_height,
            self.base_height,
            self.stem_width,
            self.depth,
        ]
    }

    /// Check that every derived outline vertex is distinct and the solid has
    /// volume. A cap no wider than the stem is rejected.
    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self.to_array().iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "p{} is not finite",
                bad + 1
            )));
        }

        let checks = [
            (self.stem_width > 0.0, "stem width p5 must be positive"),
            (
                self.outer_width > self.stem_width,
                "outer width p1 must exceed stem width p5",
            ),
            (self.base_height > 0.0, "base height p4 must be positive"),
            (self.cap_height > 0.0, "cap height p3 must be positive"),
            (
                self.total_height - self.cap_height > self.base_height,
                "cap underside p2 - p3 must lie above base height p4",
            ),
            (self.depth > 0.0, "depth p6 must be positive"),
        ];
        for (ok, message) in checks {
            if !ok {
                return Err(Error::InvalidParameter(format!(
                    "{} (got {:?})",
                    message,
                    self.to_array()
                )));
            }
        }
        Ok(())
    }

    /// Width of each haunch overhang on either side of the stem
    pub fn overhang(&self) -> f32 {
        (self.outer_width - self.stem_width) / 2.0
    }
}

impl TryFrom<&[f32]> for DistanceParameters {
    type Error = Error;

    fn try_from(values: &[f32]) -> Result<Self> {
        let values: [f32; 6] = values.try_into().map_err(|_| {
            Error::InvalidParameter(format!(
                "a T-pillar needs exactly 6 distance parameters, got {}",
                values.len()
            ))
        })?;
        Self::new(values)
    }
}

/// Builds the closed T-pillar mesh from a fixed topology table
#[derive(Debug, Clone, Copy, Default)]
pub struct TPillarBuilder;

impl TPillarBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Closed, outward-wound mesh with area-weighted vertex normals
    pub fn build(&self, params: &DistanceParameters) -> Result<TriangleMesh> {
        params.validate()?;

        let section = section_outline(params);
        let vertices: Vec<Point3f> = section
            .iter()
            .map(|&(x, z)| Point3f::new(x, 0.0, z))
            .chain(section.iter().map(|&(x, z)| Point3f::new(x, params.depth, z)))
            .collect();

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, FACES.to_vec());
        mesh.compute_vertex_normals();

        debug!(
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            params = ?params.to_array(),
            "built T-pillar"
        );
        Ok(mesh)
    }

    /// Triangle index table shared by every T-pillar
    pub fn faces() -> &'static [[usize; 3]] {
        &FACES
    }

    /// Vertices where the outline of the solid turns
    pub fn corner_vertices() -> &'static [usize] {
        &CORNERS
    }

    /// The visible edges of the solid as vertex index pairs
    pub fn feature_edges() -> &'static [[usize; 2]] {
        &FEATURE_EDGES
    }
}

fn section_outline(params: &DistanceParameters) -> [(f32, f32); SECTION_VERTICES] {
    let w = params.overhang();
    let p5 = params.stem_width;
    let top = params.total_height;
    let underside = params.total_height - params.cap_height;
    let base = params.base_height;
    [
        (0.0, 0.0),
        (p5, 0.0),
        (0.0, base),
        (p5, base),
        (-w, underside),
        (0.0, underside),
        (p5, underside),
        (p5 + w, underside),
        (-w, top),
        (0.0, top),
        (p5, top),
        (p5 + w, top),
    ]
}

/// Build a T-pillar straight from p1..p6
pub fn build_t_pillar(values: &[f32]) -> Result<TriangleMesh> {
    let params = DistanceParameters::try_from(values)?;
    TPillarBuilder::new().build(&params)
}
