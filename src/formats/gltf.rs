//! glTF 2.0 import (.gltf JSON and .glb binary) via the `gltf` crate.
//!
//! Buffers must be embedded, either in the GLB binary chunk or as base64
//! data URIs; references to external files are rejected. Node transforms are
//! baked into the vertex data so the parsed model carries no scene graph of
//! its own.

use glam::{Mat4, Vec3};

use crate::formats::{MeshData, ParseError, ParsedModel, DEFAULT_BASE_COLOR};

pub fn parse(bytes: &[u8]) -> Result<ParsedModel, ParseError> {
    let (document, buffers, _images) =
        gltf::import_slice(bytes).map_err(|e| ParseError::invalid("gltf", e.to_string()))?;

    let mut meshes = Vec::new();

    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                visit_node(&node, Mat4::IDENTITY, &buffers, &mut meshes);
            }
        }
        // Scene-less files are legal; bake every mesh at the origin.
        None => {
            for mesh in document.meshes() {
                append_mesh(&mesh, Mat4::IDENTITY, &buffers, &mut meshes);
            }
        }
    }

    Ok(ParsedModel { meshes })
}

fn visit_node(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    meshes: &mut Vec<MeshData>,
) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        append_mesh(&mesh, world, buffers, meshes);
    }

    for child in node.children() {
        visit_node(&child, world, buffers, meshes);
    }
}

fn append_mesh(
    mesh: &gltf::Mesh,
    world: Mat4,
    buffers: &[gltf::buffer::Data],
    meshes: &mut Vec<MeshData>,
) {
    let normal_matrix = world.inverse().transpose();

    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            continue;
        }

        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
        let Some(position_reader) = reader.read_positions() else {
            continue;
        };

        let positions: Vec<Vec3> = position_reader
            .map(|position| world.transform_point3(Vec3::from(position)))
            .collect();

        let normals: Vec<Vec3> = reader
            .read_normals()
            .map(|normal_reader| {
                normal_reader
                    .map(|normal| {
                        normal_matrix
                            .transform_vector3(Vec3::from(normal))
                            .normalize_or(Vec3::Y)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let indices: Vec<u32> = match reader.read_indices() {
            Some(index_reader) => index_reader.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };

        let material = primitive.material();
        let base_color = if material.index().is_some() {
            material.pbr_metallic_roughness().base_color_factor()
        } else {
            DEFAULT_BASE_COLOR
        };

        meshes.push(MeshData {
            positions,
            normals,
            indices,
            base_color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // A triangle at (0,0,0), (1,0,0), (0,1,0), 36 bytes of f32 positions.
    const TRIANGLE_POSITIONS_URI: &str = "data:application/octet-stream;base64,\
AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA";

    // The same triangle followed by three (0,0,1) normals, 72 bytes.
    const TRIANGLE_WITH_NORMALS_URI: &str = "data:application/octet-stream;base64,\
AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA\
AAAAAAAAAAAAAIA/AAAAAAAAAAAAAIA/AAAAAAAAAAAAAIA/";

    fn position_accessor() -> serde_json::Value {
        json!({
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [1.0, 1.0, 0.0]
        })
    }

    #[test]
    fn triangle_with_material_parses() {
        let document = json!({
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "material": 0}]}],
            "materials": [{"pbrMetallicRoughness": {"baseColorFactor": [1.0, 0.0, 0.0, 1.0]}}],
            "accessors": [position_accessor()],
            "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
            "buffers": [{"byteLength": 36, "uri": TRIANGLE_POSITIONS_URI}]
        });

        let model = parse(document.to_string().as_bytes()).unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.positions[1], Vec3::X);
        // No index accessor, so indices are sequential
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.base_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn node_transform_is_baked_into_vertices() {
        let document = json!({
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0, "translation": [0.0, 2.0, 0.0]}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0, "NORMAL": 1}}]}],
            "accessors": [
                position_accessor(),
                {
                    "bufferView": 1,
                    "componentType": 5126,
                    "count": 3,
                    "type": "VEC3"
                }
            ],
            "bufferViews": [
                {"buffer": 0, "byteOffset": 0, "byteLength": 36},
                {"buffer": 0, "byteOffset": 36, "byteLength": 36}
            ],
            "buffers": [{"byteLength": 72, "uri": TRIANGLE_WITH_NORMALS_URI}]
        });

        let model = parse(document.to_string().as_bytes()).unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.positions[1], Vec3::new(1.0, 2.0, 0.0));
        // Translation must leave normals alone
        assert_eq!(mesh.normals[0], Vec3::Z);
    }

    #[test]
    fn non_triangle_primitives_are_skipped() {
        let document = json!({
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "mode": 1}]}],
            "accessors": [position_accessor()],
            "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
            "buffers": [{"byteLength": 36, "uri": TRIANGLE_POSITIONS_URI}]
        });

        let model = parse(document.to_string().as_bytes()).unwrap();
        assert!(model.meshes.is_empty());
    }

    #[test]
    fn external_buffer_uri_is_rejected() {
        let document = json!({
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
            "accessors": [position_accessor()],
            "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
            "buffers": [{"byteLength": 36, "uri": "mesh.bin"}]
        });

        assert!(parse(document.to_string().as_bytes()).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse(b"definitely not gltf").is_err());
    }

    #[test]
    fn fit_places_parsed_model_on_ground_plane() {
        use crate::config::FitPolicy;
        use crate::math::normalize;

        let document = json!({
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0, "translation": [1.0, 2.0, 3.0]}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
            "accessors": [position_accessor()],
            "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": 36}],
            "buffers": [{"byteLength": 36, "uri": TRIANGLE_POSITIONS_URI}]
        });

        let model = parse(document.to_string().as_bytes()).unwrap();
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
