//! Wavefront OBJ import.
//!
//! Handles `v`, `vn` and `f` records. Texture coordinates, materials, groups
//! and the rest of the format are skipped. Faces with more than three corners
//! are fan triangulated; indices may be 1-based or negative (relative).

use std::collections::HashMap;

use glam::Vec3;

use crate::formats::{MeshData, ParseError, ParsedModel};

pub fn parse(bytes: &[u8]) -> Result<ParsedModel, ParseError> {
    let text = String::from_utf8_lossy(bytes);

    let mut positions: Vec<Vec3> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();

    let mut mesh = MeshData::default();
    // Maps (position index, normal index) pairs to output vertices so that
    // corners shared between faces are emitted once.
    let mut remap: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut all_have_normals = true;

    for (line_number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };

        match keyword {
            "v" => positions.push(read_vec3(&mut parts, line_number, "v")?),
            "vn" => normals.push(read_vec3(&mut parts, line_number, "vn")?),
            "f" => {
                let mut corners: Vec<u32> = Vec::new();
                for token in parts {
                    let corner = parse_corner(token, line_number, positions.len(), normals.len())?;
                    let index = *remap.entry(corner).or_insert_with(|| {
                        let index = mesh.positions.len() as u32;
                        mesh.positions.push(positions[corner.0]);
                        match corner.1 {
                            Some(normal) => mesh.normals.push(normals[normal]),
                            None => all_have_normals = false,
                        }
                        index
                    });
                    corners.push(index);
                }

                if corners.len() < 3 {
                    continue;
                }

                for i in 1..corners.len() - 1 {
                    mesh.indices.extend([corners[0], corners[i], corners[i + 1]]);
                }
            }
            _ => {}
        }
    }

    // Mixed faces leave holes in the normal array, so drop it and let the
    // importer recompute a consistent set.
    if !all_have_normals || mesh.normals.len() != mesh.positions.len() {
        mesh.normals.clear();
    }

    Ok(ParsedModel { meshes: vec![mesh] })
}

fn read_vec3<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    line_number: usize,
    record: &str,
) -> Result<Vec3, ParseError> {
    let mut component = |axis: &str| -> Result<f32, ParseError> {
        parts
            .next()
            .and_then(|token| token.parse::<f32>().ok())
            .ok_or_else(|| {
                ParseError::invalid(
                    "obj",
                    format!("line {}: bad {} in {} record", line_number + 1, axis, record),
                )
            })
    };
    let x = component("x")?;
    let y = component("y")?;
    let z = component("z")?;
    Ok(Vec3::new(x, y, z))
}

/// Parses one `f` corner of the form `v`, `v/vt`, `v//vn` or `v/vt/vn` into
/// zero-based (position, normal) indices.
fn parse_corner(
    token: &str,
    line_number: usize,
    position_count: usize,
    normal_count: usize,
) -> Result<(usize, Option<usize>), ParseError> {
    let mut fields = token.split('/');

    let position = fields
        .next()
        .and_then(|field| resolve_index(field, position_count))
        .ok_or_else(|| {
            ParseError::invalid(
                "obj",
                format!("line {}: bad face index '{}'", line_number + 1, token),
            )
        })?;

    let _texcoord = fields.next();

    let normal = match fields.next() {
        Some("") | None => None,
        Some(field) => Some(resolve_index(field, normal_count).ok_or_else(|| {
            ParseError::invalid(
                "obj",
                format!("line {}: bad normal index '{}'", line_number + 1, token),
            )
        })?),
    };

    Ok((position, normal))
}

/// OBJ indices are 1-based; negative values count back from the end of the
/// list seen so far.
fn resolve_index(field: &str, count: usize) -> Option<usize> {
    let value: i64 = field.parse().ok()?;
    let resolved = if value > 0 {
        value - 1
    } else if value < 0 {
        count as i64 + value
    } else {
        return None;
    };

    (0..count as i64).contains(&resolved).then_some(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_parses() {
        let obj = b"# comment
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3";

        let model = parse(obj).unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert!(mesh.normals.is_empty());
    }

    #[test]
    fn normals_survive_when_every_corner_has_one() {
        let obj = b"v 0 0 0
v 1 0 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1";

        let model = parse(obj).unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.normals.len(), 3);
        assert_eq!(mesh.normals[0], Vec3::Z);
    }

    #[test]
    fn mixed_normal_usage_drops_normals() {
        let obj = b"v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
vn 0 0 1
f 1//1 2//1 3//1
f 2 4 3";

        let model = parse(obj).unwrap();
        assert!(model.meshes[0].normals.is_empty());
    }

    #[test]
    fn negative_indices_resolve_from_the_end() {
        let obj = b"v 0 0 0
v 1 0 0
v 0 1 0
f -3 -2 -1";

        let model = parse(obj).unwrap();
        assert_eq!(model.meshes[0].indices, vec![0, 1, 2]);
        assert_eq!(model.meshes[0].positions[2], Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn quad_is_fan_triangulated() {
        let obj = b"v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4";

        let model = parse(obj).unwrap();
        assert_eq!(model.meshes[0].indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let obj = b"v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
f 1 2 3
f 2 4 3";

        let model = parse(obj).unwrap();
        assert_eq!(model.meshes[0].positions.len(), 4);
        assert_eq!(model.meshes[0].indices.len(), 6);
    }

    #[test]
    fn degenerate_face_is_skipped() {
        let obj = b"v 0 0 0
v 1 0 0
f 1 2";

        let model = parse(obj).unwrap();
        assert!(model.meshes[0].indices.is_empty());
    }

    #[test]
    fn out_of_range_face_index_is_rejected() {
        let obj = b"v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 9";

        assert!(parse(obj).is_err());
    }

    #[test]
    fn bad_vertex_coordinate_is_rejected() {
        let obj = b"v 0 zero 0";
        assert!(parse(obj).is_err());
    }

    #[test]
    fn fit_places_parsed_model_on_ground_plane() {
        use crate::config::FitPolicy;
        use crate::math::normalize;

        let obj = b"v 1 2 3
v 3 2 3
v 1 4 7
f 1 2 3";

        let model = parse(obj).unwrap();
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
