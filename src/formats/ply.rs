//! PLY (Polygon File Format) import via `ply-rs`.
//!
//! Reads ASCII and both binary encodings. Vertex positions come from the
//! `x`/`y`/`z` properties; faces from `vertex_indices` (or the older
//! `vertex_index`) with fan triangulation for polygons. Files without a face
//! element are point clouds and are rejected.

use std::io::Cursor;

use glam::Vec3;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};

use crate::formats::{MeshData, ParseError, ParsedModel};

pub fn parse(bytes: &[u8]) -> Result<ParsedModel, ParseError> {
    let mut reader = Cursor::new(bytes);
    let parser = Parser::<DefaultElement>::new();

    let header = parser
        .read_header(&mut reader)
        .map_err(|e| ParseError::invalid("ply", format!("bad header: {e}")))?;
    let payload = parser
        .read_payload(&mut reader, &header)
        .map_err(|e| ParseError::invalid("ply", format!("bad payload: {e}")))?;

    let mut mesh = MeshData::default();

    if let Some(vertex_elements) = payload.get("vertex") {
        mesh.positions.reserve(vertex_elements.len());
        for element in vertex_elements {
            let x = float_property(element, "x").unwrap_or(0.0);
            let y = float_property(element, "y").unwrap_or(0.0);
            let z = float_property(element, "z").unwrap_or(0.0);
            mesh.positions.push(Vec3::new(x, y, z));
        }
    }

    match payload.get("face") {
        Some(face_elements) => {
            mesh.indices.reserve(face_elements.len() * 3);
            for element in face_elements {
                let corners = index_list(element);
                if corners.len() < 3 {
                    continue;
                }
                for i in 1..corners.len() - 1 {
                    mesh.indices.extend([corners[0], corners[i], corners[i + 1]]);
                }
            }
        }
        None => {
            return Err(ParseError::invalid(
                "ply",
                "no face element; point clouds are not supported",
            ));
        }
    }

    Ok(ParsedModel { meshes: vec![mesh] })
}

fn float_property(element: &DefaultElement, key: &str) -> Option<f32> {
    match element.get(key)? {
        Property::Float(v) => Some(*v),
        Property::Double(v) => Some(*v as f32),
        _ => None,
    }
}

/// Face indices show up under two property names and several integer widths.
/// Negative values wrap here and are caught by index validation afterwards.
fn index_list(element: &DefaultElement) -> Vec<u32> {
    for key in ["vertex_indices", "vertex_index"] {
        if let Some(property) = element.get(key) {
            return match property {
                Property::ListInt(v) => v.iter().map(|&i| i as u32).collect(),
                Property::ListUInt(v) => v.clone(),
                Property::ListShort(v) => v.iter().map(|&i| i as u32).collect(),
                Property::ListUShort(v) => v.iter().map(|&i| u32::from(i)).collect(),
                Property::ListChar(v) => v.iter().map(|&i| i as u32).collect(),
                Property::ListUChar(v) => v.iter().map(|&i| u32::from(i)).collect(),
                _ => continue,
            };
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_triangle_parses() {
        let ply = b"ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
0 1 0
3 0 1 2
";

        let model = parse(ply).unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.positions[2], Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn binary_little_endian_parses() {
        let mut bytes = b"ply
format binary_little_endian 1.0
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
"
        .to_vec();

        for value in [
            0.0f32, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0,
        ] {
            bytes.extend(value.to_le_bytes());
        }
        bytes.push(3);
        for index in [0i32, 1, 2] {
            bytes.extend(index.to_le_bytes());
        }

        let model = parse(&bytes).unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn quad_is_fan_triangulated() {
        let ply = b"ply
format ascii 1.0
element vertex 4
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
1 1 0
0 1 0
4 0 1 2 3
";

        let model = parse(ply).unwrap();
        assert_eq!(model.meshes[0].indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn double_precision_vertices_parse() {
        let ply = b"ply
format ascii 1.0
element vertex 3
property double x
property double y
property double z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
0.5 0 0
0 0.5 0
3 0 1 2
";

        let model = parse(ply).unwrap();
        assert_eq!(model.meshes[0].positions[1], Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn point_cloud_is_rejected() {
        let ply = b"ply
format ascii 1.0
element vertex 2
property float x
property float y
property float z
end_header
0 0 0
1 1 1
";

        assert!(parse(ply).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse(b"not a ply file at all").is_err());
    }

    #[test]
    fn fit_places_parsed_model_on_ground_plane() {
        use crate::config::FitPolicy;
        use crate::math::normalize;

        let ply = b"ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
1 2 3
3 2 3
1 4 7
3 0 1 2
";

        let model = parse(ply).unwrap();
        let bounds = model.bounds().unwrap();
        let fit = normalize::fit(&bounds, 3.0, FitPolicy::GroundPlane);

        let min = bounds.min * fit.scale + fit.offset;
        let max = bounds.max * fit.scale + fit.offset;
        assert!((min.x + max.x).abs() < 1e-4);
        assert!((min.z + max.z).abs() < 1e-4);
        assert!(min.y.abs() < 1e-4);
        assert!(((max - min).max_element() - 3.0).abs() < 1e-4);
    }
}
