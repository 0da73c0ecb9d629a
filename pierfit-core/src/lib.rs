//! Core data structures and traits for pierfit
//!
//! This crate provides the fundamental types shared by the fitting pipeline:
//! points, point clouds, triangle meshes, rigid transforms, oriented bounding
//! boxes and the error taxonomy every stage reports through.

pub mod point;
pub mod point_cloud;
pub mod mesh;
pub mod traits;
pub mod transform;
pub mod obb;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use mesh::*;
pub use traits::*;
pub use transform::*;
pub use obb::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, Matrix4, Isometry3, Rotation3};

// Type aliases for easier imports
pub type Point = Point3f;
pub type Mesh = TriangleMesh;
