//! # Pierfit Algorithms
//!
//! The numerical stages of the fitting pipeline.
//!
//! This crate provides spatial search, normal estimation, uniform mesh
//! sampling, coarse alignment by oriented bounding boxes and fine alignment by
//! Generalized ICP.

pub mod nearest_neighbor;
pub mod normals;
pub mod sampling;
pub mod alignment;
pub mod registration;

// Re-export commonly used items
pub use nearest_neighbor::*;
pub use normals::*;
pub use sampling::*;
pub use alignment::*;
pub use registration::*;
