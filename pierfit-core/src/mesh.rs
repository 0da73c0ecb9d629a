//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A triangle mesh with vertices and faces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

/// Edge incidence summary of a triangle mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshTopology {
    pub vertex_count: usize,
    pub edge_count: usize,
    pub face_count: usize,
    /// Edges used by exactly one face
    pub boundary_edges: usize,
    /// Edges used by three or more faces
    pub non_manifold_edges: usize,
    /// Interior edges whose two faces traverse them in the same direction
    pub inconsistent_edges: usize,
}

impl MeshTopology {
    /// Every edge shared by exactly two consistently wound triangles
    pub fn is_closed_manifold(&self) -> bool {
        self.face_count > 0
            && self.boundary_edges == 0
            && self.non_manifold_edges == 0
            && self.inconsistent_edges == 0
    }

    /// V - E + F
    pub fn euler_characteristic(&self) -> i64 {
        self.vertex_count as i64 - self.edge_count as i64 + self.face_count as i64
    }
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Check that every face references an existing vertex
    pub fn validate_indices(&self) -> Result<()> {
        let count = self.vertices.len();
        for (face_idx, face) in self.faces.iter().enumerate() {
            if let Some(&bad) = face.iter().find(|&&idx| idx >= count) {
                return Err(Error::InvalidData(format!(
                    "face {} references vertex {} but the mesh has {} vertices",
                    face_idx, bad, count
                )));
            }
        }
        Ok(())
    }

    /// Un-normalized face normal (length is twice the triangle area)
    fn face_cross(&self, face: &[usize; 3]) -> Vector3f {
        let v0 = self.vertices[face[0]];
        let v1 = self.vertices[face[1]];
        let v2 = self.vertices[face[2]];
        (v1 - v0).cross(&(v2 - v0))
    }

    /// Calculate unit face normals; degenerate faces get a zero vector
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let cross = self.face_cross(face);
                cross.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::zeros)
            })
            .collect()
    }

    /// Area of every face
    pub fn face_areas(&self) -> Vec<f32> {
        self.faces
            .iter()
            .map(|face| self.face_cross(face).norm() * 0.5)
            .collect()
    }

    /// Total surface area
    pub fn surface_area(&self) -> f32 {
        self.face_areas().iter().sum()
    }

    /// Compute area-weighted vertex normals and store them on the mesh.
    ///
    /// Vertices that belong to no (non-degenerate) face get a zero normal.
    pub fn compute_vertex_normals(&mut self) {
        let mut accumulated = vec![Vector3d::zeros(); self.vertices.len()];
        for face in &self.faces {
            let weighted = self.face_cross(face).cast::<f64>();
            for &idx in face {
                accumulated[idx] += weighted;
            }
        }
        let normals = accumulated
            .into_iter()
            .map(|n| {
                n.try_normalize(f64::EPSILON)
                    .map(|n| n.cast::<f32>())
                    .unwrap_or_else(Vector3f::zeros)
            })
            .collect();
        self.normals = Some(normals);
    }

    /// Count how faces share edges
    pub fn topology(&self) -> MeshTopology {
        // undirected edge -> (uses, uses in the min->max direction)
        let mut edges: HashMap<(usize, usize), (usize, usize)> = HashMap::new();
        for face in &self.faces {
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                let entry = edges.entry((a.min(b), a.max(b))).or_insert((0, 0));
                entry.0 += 1;
                if a < b {
                    entry.1 += 1;
                }
            }
        }

        let mut topology = MeshTopology {
            vertex_count: self.vertices.len(),
            edge_count: edges.len(),
            face_count: self.faces.len(),
            boundary_edges: 0,
            non_manifold_edges: 0,
            inconsistent_edges: 0,
        };
        for &(uses, forward) in edges.values() {
            match uses {
                1 => topology.boundary_edges += 1,
                2 if forward != 1 => topology.inconsistent_edges += 1,
                2 => {}
                _ => topology.non_manifold_edges += 1,
            }
        }
        topology
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.faces.clear();
        self.normals = None;
        self.colors = None;
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tetrahedron() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
        )
    }

    #[test]
    fn test_closed_tetrahedron_topology() {
        let topology = tetrahedron().topology();
        assert_eq!(topology.edge_count, 6);
        assert!(topology.is_closed_manifold());
        assert_eq!(topology.euler_characteristic(), 2);
    }

    #[test]
    fn test_open_and_flipped_topology() {
        let mut open = tetrahedron();
        open.faces.pop();
        let topology = open.topology();
        assert_eq!(topology.boundary_edges, 3);
        assert!(!topology.is_closed_manifold());

        let mut flipped = tetrahedron();
        flipped.faces[0] = [0, 1, 2];
        let topology = flipped.topology();
        assert_eq!(topology.inconsistent_edges, 3);
        assert!(!topology.is_closed_manifold());
    }

    #[test]
    fn test_face_normals_and_area() {
        let mesh = tetrahedron();
        let normals = mesh.calculate_face_normals();
        assert_relative_eq!(normals[0].z, -1.0, epsilon = 1e-6);
        assert_relative_eq!(mesh.face_areas()[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(mesh.surface_area(), 1.5 + 3f32.sqrt() / 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_vertex_normals_point_outward() {
        let mut mesh = tetrahedron();
        mesh.compute_vertex_normals();
        let normals = mesh.normals.as_ref().unwrap();
        // origin corner normal points away from the solid
        assert!(normals[0].x < 0.0 && normals[0].y < 0.0 && normals[0].z < 0.0);
        assert_relative_eq!(normals[0].norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_validate_indices() {
        let mut mesh = tetrahedron();
        assert!(mesh.validate_indices().is_ok());
        mesh.add_face([0, 1, 9]);
        assert!(matches!(mesh.validate_indices(), Err(Error::InvalidData(_))));
    }
}
