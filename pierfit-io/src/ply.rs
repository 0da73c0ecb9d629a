//! PLY format support

use crate::{MeshReader, MeshWriter, PointCloudReader, PointCloudWriter};
use pierfit_core::{
    ColoredPoint3f, Error, NormalPoint3f, Point3f, PointCloud, Result, TriangleMesh, Vector3f,
};
use ply_rs::{
    parser::Parser,
    ply::{Addable, DefaultElement, ElementDef, Ply, Property, PropertyDef, PropertyType, ScalarType},
    writer::Writer,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

pub struct PlyReader;
pub struct PlyWriter;

fn read_ply(path: &Path) -> Result<Ply<DefaultElement>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let parser = Parser::<DefaultElement>::new();
    let ply = parser.read_ply(&mut reader)?;
    debug!(path = %path.display(), elements = ply.payload.len(), "read ply");
    Ok(ply)
}

fn write_ply(path: &Path, ply: &mut Ply<DefaultElement>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    Writer::new().write_ply(&mut writer, ply)?;
    writer.flush()?;
    debug!(path = %path.display(), "wrote ply");
    Ok(())
}

fn vertex_positions(ply: &Ply<DefaultElement>) -> Result<Vec<Point3f>> {
    ply.payload
        .get("vertex")
        .map(|vertices| {
            vertices
                .iter()
                .map(|v| -> Result<Point3f> {
                    Ok(Point3f::new(
                        property_value(v, "x")?,
                        property_value(v, "y")?,
                        property_value(v, "z")?,
                    ))
                })
                .collect()
        })
        .unwrap_or_else(|| Ok(Vec::new()))
}

/// Per-vertex normals, only when every vertex has all three components
fn vertex_normals(ply: &Ply<DefaultElement>) -> Option<Vec<Vector3f>> {
    let vertices = ply.payload.get("vertex")?;
    if vertices.is_empty() {
        return None;
    }
    vertices
        .iter()
        .map(|v| -> Option<Vector3f> {
            Some(Vector3f::new(
                property_value(v, "nx").ok()?,
                property_value(v, "ny").ok()?,
                property_value(v, "nz").ok()?,
            ))
        })
        .collect()
}

fn vertex_colors(ply: &Ply<DefaultElement>) -> Result<Vec<[u8; 3]>> {
    ply.payload
        .get("vertex")
        .map(|vertices| {
            vertices
                .iter()
                .map(|v| -> Result<[u8; 3]> {
                    Ok([
                        color_value(v, "red")?,
                        color_value(v, "green")?,
                        color_value(v, "blue")?,
                    ])
                })
                .collect()
        })
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn float_property(name: &str) -> PropertyDef {
    PropertyDef::new(name.to_string(), PropertyType::Scalar(ScalarType::Float))
}

fn vertex_element(count: usize, with_normals: bool) -> ElementDef {
    let mut element = ElementDef::new("vertex".to_string());
    element.count = count;
    let names: &[&str] = if with_normals {
        &["x", "y", "z", "nx", "ny", "nz"]
    } else {
        &["x", "y", "z"]
    };
    for name in names {
        element.properties.add(float_property(name));
    }
    element
}

fn add_color_properties(element: &mut ElementDef) {
    for name in ["red", "green", "blue"] {
        element.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::UChar),
        ));
    }
}

fn insert_color(record: &mut DefaultElement, color: &[u8; 3]) {
    record.insert("red".to_string(), Property::UChar(color[0]));
    record.insert("green".to_string(), Property::UChar(color[1]));
    record.insert("blue".to_string(), Property::UChar(color[2]));
}

fn vertex_record(position: &Point3f, normal: Option<&Vector3f>) -> DefaultElement {
    let mut record = DefaultElement::new();
    record.insert("x".to_string(), Property::Float(position.x));
    record.insert("y".to_string(), Property::Float(position.y));
    record.insert("z".to_string(), Property::Float(position.z));
    if let Some(n) = normal {
        record.insert("nx".to_string(), Property::Float(n.x));
        record.insert("ny".to_string(), Property::Float(n.y));
        record.insert("nz".to_string(), Property::Float(n.z));
    }
    record
}

impl PointCloudReader for PlyReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
        let ply = read_ply(path.as_ref())?;
        Ok(PointCloud::from_points(vertex_positions(&ply)?))
    }
}

impl PlyReader {
    /// Read a point cloud that stores `nx`, `ny`, `nz` on every vertex
    pub fn read_normal_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<NormalPoint3f>> {
        let ply = read_ply(path.as_ref())?;
        let positions = vertex_positions(&ply)?;
        let normals = vertex_normals(&ply).ok_or_else(|| {
            Error::InvalidData("PLY vertices do not all carry nx, ny, nz".to_string())
        })?;
        Ok(positions
            .into_iter()
            .zip(normals)
            .map(|(position, normal)| NormalPoint3f::new(position, normal))
            .collect())
    }
}

impl PlyReader {
    /// Read a point cloud that stores `red`, `green`, `blue` on every vertex
    pub fn read_colored_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<ColoredPoint3f>> {
        let ply = read_ply(path.as_ref())?;
        let positions = vertex_positions(&ply)?;
        let colors = vertex_colors(&ply)?;
        Ok(positions
            .into_iter()
            .zip(colors)
            .map(|(position, color)| ColoredPoint3f::new(position, color))
            .collect())
    }
}

impl PointCloudWriter for PlyWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<Point3f>, path: P) -> Result<()> {
        let mut ply = Ply::<DefaultElement>::new();
        ply.header.elements.add(vertex_element(cloud.len(), false));
        let records = cloud.iter().map(|p| vertex_record(p, None)).collect();
        ply.payload.insert("vertex".to_string(), records);
        write_ply(path.as_ref(), &mut ply)
    }
}

impl PlyWriter {
    pub fn write_normal_point_cloud<P: AsRef<Path>>(
        cloud: &PointCloud<NormalPoint3f>,
        path: P,
    ) -> Result<()> {
        let mut ply = Ply::<DefaultElement>::new();
        ply.header.elements.add(vertex_element(cloud.len(), true));
        let records = cloud
            .iter()
            .map(|p| vertex_record(&p.position, Some(&p.normal)))
            .collect();
        ply.payload.insert("vertex".to_string(), records);
        write_ply(path.as_ref(), &mut ply)
    }
}

impl PlyWriter {
    pub fn write_colored_point_cloud<P: AsRef<Path>>(
        cloud: &PointCloud<ColoredPoint3f>,
        path: P,
    ) -> Result<()> {
        let mut element = vertex_element(cloud.len(), false);
        add_color_properties(&mut element);

        let mut ply = Ply::<DefaultElement>::new();
        ply.header.elements.add(element);
        let records = cloud
            .iter()
            .map(|p| {
                let mut record = vertex_record(&p.position, None);
                insert_color(&mut record, &p.color);
                record
            })
            .collect();
        ply.payload.insert("vertex".to_string(), records);
        write_ply(path.as_ref(), &mut ply)
    }
}

impl MeshReader for PlyReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let ply = read_ply(path.as_ref())?;
        let vertices = vertex_positions(&ply)?;

        // Polygons are fanned into triangles
        let mut faces = Vec::new();
        if let Some(face_element) = ply.payload.get("face") {
            for face in face_element {
                let indices = face_indices(face)?;
                for i in 1..indices.len().saturating_sub(1) {
                    faces.push([indices[0], indices[i], indices[i + 1]]);
                }
            }
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        mesh.validate_indices()?;
        if let Some(normals) = vertex_normals(&ply) {
            mesh.set_normals(normals);
        }
        // colors are optional on meshes
        if let Ok(colors) = vertex_colors(&ply) {
            mesh.set_colors(colors);
        }
        Ok(mesh)
    }
}

impl MeshWriter for PlyWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let normals = mesh
            .normals
            .as_ref()
            .filter(|n| n.len() == mesh.vertices.len());

        let colors = mesh
            .colors
            .as_ref()
            .filter(|c| c.len() == mesh.vertices.len());

        let mut element = vertex_element(mesh.vertices.len(), normals.is_some());
        if colors.is_some() {
            add_color_properties(&mut element);
        }
        let mut ply = Ply::<DefaultElement>::new();
        ply.header.elements.add(element);

        let mut face_element = ElementDef::new("face".to_string());
        face_element.count = mesh.faces.len();
        face_element.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        ply.header.elements.add(face_element);

        let vertices = mesh
            .vertices
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut record = vertex_record(v, normals.map(|n| &n[i]));
                if let Some(colors) = colors {
                    insert_color(&mut record, &colors[i]);
                }
                record
            })
            .collect();
        ply.payload.insert("vertex".to_string(), vertices);

        let mut faces = Vec::with_capacity(mesh.faces.len());
        for face in &mesh.faces {
            let indices = face
                .iter()
                .map(|&idx| {
                    i32::try_from(idx).map_err(|_| {
                        Error::InvalidData(format!("vertex index {} does not fit a PLY int", idx))
                    })
                })
                .collect::<Result<Vec<i32>>>()?;
            let mut record = DefaultElement::new();
            record.insert("vertex_indices".to_string(), Property::ListInt(indices));
            faces.push(record);
        }
        ply.payload.insert("face".to_string(), faces);

        write_ply(path.as_ref(), &mut ply)
    }
}

/// Extract a property value as f32 from a PLY element
fn property_value(element: &DefaultElement, name: &str) -> Result<f32> {
    match element.get(name) {
        Some(Property::Float(val)) => Ok(*val),
        Some(Property::Double(val)) => Ok(*val as f32),
        Some(Property::Int(val)) => Ok(*val as f32),
        Some(Property::UInt(val)) => Ok(*val as f32),
        Some(Property::Short(val)) => Ok(*val as f32),
        Some(Property::UShort(val)) => Ok(*val as f32),
        _ => Err(Error::InvalidData(format!(
            "property '{}' not found or not numeric",
            name
        ))),
    }
}

/// Extract a color channel as u8; float channels are read as 0..1
fn color_value(element: &DefaultElement, name: &str) -> Result<u8> {
    match element.get(name) {
        Some(Property::UChar(val)) => Ok(*val),
        Some(Property::UShort(val)) => Ok((*val >> 8) as u8),
        Some(Property::Float(val)) => Ok((val.clamp(0.0, 1.0) * 255.0).round() as u8),
        Some(Property::Double(val)) => Ok((val.clamp(0.0, 1.0) * 255.0).round() as u8),
        _ => Err(Error::InvalidData(format!(
            "color property '{}' not found or not a color channel",
            name
        ))),
    }
}

/// Extract face indices from a PLY face element
fn face_indices(element: &DefaultElement) -> Result<Vec<usize>> {
    let to_index = |idx: i64| {
        usize::try_from(idx)
            .map_err(|_| Error::InvalidData(format!("negative face index {}", idx)))
    };
    match element.get("vertex_indices").or_else(|| element.get("vertex_index")) {
        Some(Property::ListInt(indices)) => indices.iter().map(|&i| to_index(i as i64)).collect(),
        Some(Property::ListUInt(indices)) => indices.iter().map(|&i| to_index(i as i64)).collect(),
        Some(Property::ListUChar(indices)) => indices.iter().map(|&i| to_index(i as i64)).collect(),
        _ => Err(Error::InvalidData("face indices not found".to_string())),
    }
}
