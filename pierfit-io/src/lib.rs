//! I/O operations for point clouds and meshes
//!
//! Only PLY is supported. Readers accept anything ply-rs parses (ASCII and
//! binary); writers emit ASCII.

pub mod ply;

pub use ply::{PlyReader, PlyWriter};

use pierfit_core::{ColoredPoint3f, Error, NormalPoint3f, Point3f, PointCloud, Result, TriangleMesh};
use std::path::Path;

/// Trait for reading point clouds from files
pub trait PointCloudReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>>;
}

/// Trait for writing point clouds to files
pub trait PointCloudWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()>;
}

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()>;
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

fn unsupported(kind: &str, path: &Path) -> Error {
    Error::UnsupportedFormat(format!(
        "unsupported {} format: {}",
        kind,
        path.display()
    ))
}

/// Auto-detect format and read point cloud
pub fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyReader::read_point_cloud(path),
        _ => Err(unsupported("point cloud", path)),
    }
}

/// Auto-detect format and write point cloud
pub fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyWriter::write_point_cloud(cloud, path),
        _ => Err(unsupported("point cloud", path)),
    }
}

/// Auto-detect format and write a point cloud with normals
pub fn write_normal_point_cloud<P: AsRef<Path>>(
    cloud: &PointCloud<NormalPoint3f>,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyWriter::write_normal_point_cloud(cloud, path),
        _ => Err(unsupported("point cloud", path)),
    }
}

/// Auto-detect format and read a point cloud with per-vertex colors
pub fn read_colored_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<ColoredPoint3f>> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyReader::read_colored_point_cloud(path),
        _ => Err(unsupported("point cloud", path)),
    }
}

/// Auto-detect format and write a point cloud with per-vertex colors
pub fn write_colored_point_cloud<P: AsRef<Path>>(
    cloud: &PointCloud<ColoredPoint3f>,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyWriter::write_colored_point_cloud(cloud, path),
        _ => Err(unsupported("point cloud", path)),
    }
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyReader::read_mesh(path),
        _ => Err(unsupported("mesh", path)),
    }
}

/// Auto-detect format and write mesh
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyWriter::write_mesh(mesh, path),
        _ => Err(unsupported("mesh", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pierfit_core::Vector3f;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pierfit_io_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_ply_point_cloud_roundtrip() {
        let path = temp_path("cloud.ply");
        let cloud: PointCloud<Point3f> = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.5, -2.0, 0.25),
            Point3f::new(0.0, 1.0, 3.0),
        ]
        .into_iter()
        .collect();

        write_point_cloud(&cloud, &path).unwrap();
        let loaded = read_point_cloud(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.len(), cloud.len());
        for (a, b) in cloud.iter().zip(loaded.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_normal_point_cloud_roundtrip() {
        let path = temp_path("normals.ply");
        let cloud: PointCloud<NormalPoint3f> = (0..4)
            .map(|i| NormalPoint3f::new(Point3f::new(i as f32, 0.0, 0.0), Vector3f::z()))
            .collect();

        write_normal_point_cloud(&cloud, &path).unwrap();
        let loaded = PlyReader::read_normal_point_cloud(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.len(), 4);
        assert!(loaded.iter().all(|p| p.normal == Vector3f::z()));
    }

    #[test]
    fn test_colored_point_cloud_roundtrip() {
        let path = temp_path("colored.ply");
        let cloud: PointCloud<ColoredPoint3f> = vec![
            ColoredPoint3f::new(Point3f::new(0.0, 0.5, 1.0), [255, 0, 0]),
            ColoredPoint3f::new(Point3f::new(-1.0, 2.0, 0.0), [12, 200, 7]),
        ]
        .into_iter()
        .collect();

        write_colored_point_cloud(&cloud, &path).unwrap();
        let loaded = read_colored_point_cloud(&path).unwrap();
        let plain = read_point_cloud(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.len(), 2);
        for (a, b) in cloud.iter().zip(loaded.iter()) {
            assert_eq!(a.color, b.color);
            assert_relative_eq!(a.position, b.position, epsilon = 1e-6);
        }
        assert_relative_eq!(plain[1], Point3f::new(-1.0, 2.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_colored_read_requires_colors() {
        let path = temp_path("uncolored.ply");
        let cloud: PointCloud<Point3f> = vec![Point3f::new(1.0, 2.0, 3.0)].into_iter().collect();
        write_point_cloud(&cloud, &path).unwrap();
        let result = read_colored_point_cloud(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_mesh_roundtrip_with_normals() {
        let path = temp_path("mesh.ply");
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]],
        );
        mesh.compute_vertex_normals();

        write_mesh(&mesh, &path).unwrap();
        let loaded = read_mesh(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.faces, mesh.faces);
        assert_eq!(loaded.vertex_count(), 4);
        assert!(loaded.colors.is_none());
        let (a, b) = (mesh.normals.unwrap(), loaded.normals.unwrap());
        for (n, m) in a.iter().zip(&b) {
            assert_relative_eq!(*n, *m, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_mesh_roundtrip_with_colors() {
        let path = temp_path("colored_mesh.ply");
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        mesh.set_colors(vec![[10, 20, 30], [40, 50, 60], [70, 80, 90]]);

        write_mesh(&mesh, &path).unwrap();
        let loaded = read_mesh(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.colors, mesh.colors);
        assert!(loaded.normals.is_none());
    }

    #[test]
    fn test_quad_faces_are_triangulated() {
        let path = temp_path("quad.ply");
        let content = "ply\nformat ascii 1.0\nelement vertex 4\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0\n1 0 0\n1 1 0\n0 1 0\n4 0 1 2 3\n";
        fs::write(&path, content).unwrap();
        let mesh = read_mesh(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
        assert!(mesh.normals.is_none());
    }

    #[test]
    fn test_out_of_range_face_rejected() {
        let path = temp_path("bad_face.ply");
        let content = "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0\n1 0 0\n1 1 0\n3 0 1 7\n";
        fs::write(&path, content).unwrap();
        let result = read_mesh(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            read_point_cloud("scan.xyz"),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            write_mesh(&TriangleMesh::new(), "model.obj"),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_mesh(temp_path("does_not_exist.ply")),
            Err(Error::Io(_))
        ));
    }
}
