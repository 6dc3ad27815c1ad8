//! Binary FBX import.
//!
//! Reads the binary container format (FBX 7.x), walks the node tree and
//! extracts mesh geometry: control points, polygons and the normal layer.
//! Model transforms are resolved through object connections and baked into
//! the vertex data. ASCII FBX and the pre-7.0 binary layout are rejected.
//!
//! The container is a tree of named records. Each record carries a property
//! list (scalars, strings and optionally zlib compressed arrays) followed by
//! child records, terminated by a zeroed sentinel record.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::ZlibDecoder;
use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::formats::{MeshData, ParseError, ParsedModel};

const MAGIC: &[u8] = b"Kaydara FBX Binary  \x00";
const HEADER_SIZE: usize = 27;
const MIN_VERSION: u32 = 7000;

/// Upper bound on decoded array lengths, guards against hostile headers.
const MAX_ARRAY_LEN: usize = 1 << 26;

pub fn parse(bytes: &[u8]) -> Result<ParsedModel, ParseError> {
    if !bytes.starts_with(MAGIC) {
        return Err(if looks_ascii(bytes) {
            ParseError::invalid(
                "fbx",
                "ASCII FBX is not supported, re-export as binary FBX",
            )
        } else {
            ParseError::invalid("fbx", "missing binary FBX magic")
        });
    }

    if bytes.len() < HEADER_SIZE {
        return Err(ParseError::invalid("fbx", "truncated header"));
    }

    let version = u32::from_le_bytes([bytes[23], bytes[24], bytes[25], bytes[26]]);
    if version < MIN_VERSION {
        return Err(ParseError::invalid(
            "fbx",
            format!("unsupported FBX version {version}, 7000 or newer required"),
        ));
    }

    let mut cursor = Cursor {
        bytes,
        offset: HEADER_SIZE,
    };

    // Version 7.5 widened the record offsets from 32 to 64 bits.
    let wide = version >= 7500;
    let sentinel_size = if wide { 25 } else { 13 };

    let mut document = Vec::new();
    while cursor.remaining() >= sentinel_size {
        match parse_node(&mut cursor, wide)? {
            Some(node) => document.push(node),
            None => break,
        }
    }

    extract(&document)
}

fn looks_ascii(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    std::str::from_utf8(head)
        .map(|text| text.contains("FBX"))
        .unwrap_or(false)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .offset
            .checked_add(count)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| ParseError::invalid("fbx", "unexpected end of file"))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, ParseError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, ParseError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn length(&mut self, wide: bool) -> Result<usize, ParseError> {
        if wide {
            Ok(self.u64()? as usize)
        } else {
            Ok(self.u32()? as usize)
        }
    }
}

struct FbxNode {
    name: String,
    properties: Vec<FbxProperty>,
    children: Vec<FbxNode>,
}

enum FbxProperty {
    I16(i16),
    Bool(bool),
    I32(i32),
    F32(f32),
    F64(f64),
    I64(i64),
    String(String),
    Raw(Vec<u8>),
    BoolArray(Vec<bool>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
}

impl FbxNode {
    fn child(&self, name: &str) -> Option<&FbxNode> {
        self.children.iter().find(|child| child.name == name)
    }
}

/// Parses one record. A zeroed record (end offset 0) is the sentinel that
/// terminates a sibling list and comes back as `None`.
fn parse_node(cursor: &mut Cursor, wide: bool) -> Result<Option<FbxNode>, ParseError> {
    let end_offset = cursor.length(wide)?;
    let num_properties = cursor.length(wide)?;
    let _property_list_len = cursor.length(wide)?;
    let name_len = cursor.u8()? as usize;
    let name = String::from_utf8_lossy(cursor.take(name_len)?).into_owned();

    if end_offset == 0 {
        return Ok(None);
    }
    if end_offset > cursor.bytes.len() {
        return Err(ParseError::invalid(
            "fbx",
            "node record extends past end of file",
        ));
    }

    let mut properties = Vec::with_capacity(num_properties.min(64));
    for _ in 0..num_properties {
        properties.push(parse_property(cursor)?);
    }

    let mut children = Vec::new();
    while cursor.offset < end_offset {
        match parse_node(cursor, wide)? {
            Some(child) => children.push(child),
            None => break,
        }
    }

    if cursor.offset > end_offset {
        return Err(ParseError::invalid(
            "fbx",
            format!("node '{name}' overruns its record"),
        ));
    }
    cursor.offset = end_offset;

    Ok(Some(FbxNode {
        name,
        properties,
        children,
    }))
}

fn parse_property(cursor: &mut Cursor) -> Result<FbxProperty, ParseError> {
    let type_code = cursor.u8()?;
    let property = match type_code {
        b'Y' => {
            let b = cursor.take(2)?;
            FbxProperty::I16(i16::from_le_bytes([b[0], b[1]]))
        }
        b'C' => FbxProperty::Bool(cursor.u8()? & 1 == 1),
        b'I' => FbxProperty::I32(cursor.u32()? as i32),
        b'F' => FbxProperty::F32(f32::from_bits(cursor.u32()?)),
        b'D' => FbxProperty::F64(f64::from_bits(cursor.u64()?)),
        b'L' => FbxProperty::I64(cursor.u64()? as i64),
        b'S' => {
            let len = cursor.u32()? as usize;
            FbxProperty::String(String::from_utf8_lossy(cursor.take(len)?).into_owned())
        }
        b'R' => {
            let len = cursor.u32()? as usize;
            FbxProperty::Raw(cursor.take(len)?.to_vec())
        }
        b'b' => FbxProperty::BoolArray(
            read_array(cursor, 1)?.iter().map(|&b| b & 1 == 1).collect(),
        ),
        b'i' => FbxProperty::I32Array(
            read_array(cursor, 4)?
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        ),
        b'l' => FbxProperty::I64Array(
            read_array(cursor, 8)?
                .chunks_exact(8)
                .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
        ),
        b'f' => FbxProperty::F32Array(
            read_array(cursor, 4)?
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        ),
        b'd' => FbxProperty::F64Array(
            read_array(cursor, 8)?
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
        ),
        other => {
            return Err(ParseError::invalid(
                "fbx",
                format!("unknown property type 0x{other:02x}"),
            ));
        }
    };
    Ok(property)
}

/// Reads an array property payload, inflating it when zlib compressed, and
/// returns the raw little endian bytes.
fn read_array(cursor: &mut Cursor, element_size: usize) -> Result<Vec<u8>, ParseError> {
    let length = cursor.u32()? as usize;
    let encoding = cursor.u32()?;
    let compressed_length = cursor.u32()? as usize;

    if length > MAX_ARRAY_LEN {
        return Err(ParseError::invalid(
            "fbx",
            format!("array of {length} elements exceeds the size limit"),
        ));
    }
    let expected = length * element_size;

    let raw = match encoding {
        0 => cursor.take(expected)?.to_vec(),
        1 => {
            let compressed = cursor.take(compressed_length)?;
            let mut decoded = Vec::with_capacity(expected);
            ZlibDecoder::new(compressed)
                .take(expected as u64 + 1)
                .read_to_end(&mut decoded)
                .map_err(|e| ParseError::invalid("fbx", format!("bad zlib stream: {e}")))?;
            decoded
        }
        other => {
            return Err(ParseError::invalid(
                "fbx",
                format!("unknown array encoding {other}"),
            ));
        }
    };

    if raw.len() != expected {
        return Err(ParseError::invalid(
            "fbx",
            "array payload does not match its declared length",
        ));
    }

    Ok(raw)
}

fn extract(document: &[FbxNode]) -> Result<ParsedModel, ParseError> {
    let Some(objects) = document.iter().find(|node| node.name == "Objects") else {
        return Ok(ParsedModel { meshes: Vec::new() });
    };

    // Object-to-object links, child id to parent id. Parent 0 is the scene
    // root.
    let mut parents: HashMap<i64, i64> = HashMap::new();
    if let Some(connections) = document.iter().find(|node| node.name == "Connections") {
        for connection in connections.children.iter().filter(|c| c.name == "C") {
            let object_link = matches!(
                connection.properties.first(),
                Some(FbxProperty::String(kind)) if kind == "OO"
            );
            if !object_link {
                continue;
            }
            let ids: Vec<i64> = connection.properties.iter().filter_map(as_i64).collect();
            if let [child, parent, ..] = ids[..] {
                parents.insert(child, parent);
            }
        }
    }

    let mut locals: HashMap<i64, Mat4> = HashMap::new();
    for model in objects.children.iter().filter(|c| c.name == "Model") {
        if let Some(id) = first_i64(model) {
            locals.insert(id, model_local_transform(model));
        }
    }

    let mut meshes = Vec::new();
    for geometry in objects.children.iter().filter(|c| c.name == "Geometry") {
        let is_mesh = geometry
            .properties
            .iter()
            .any(|p| matches!(p, FbxProperty::String(class) if class == "Mesh"));
        if !is_mesh {
            continue;
        }

        let Some(mut mesh) = geometry_mesh(geometry)? else {
            continue;
        };

        let world = first_i64(geometry)
            .map(|id| world_transform(id, &parents, &locals))
            .unwrap_or(Mat4::IDENTITY);
        if world != Mat4::IDENTITY {
            let normal_matrix = world.inverse().transpose();
            for position in &mut mesh.positions {
                *position = world.transform_point3(*position);
            }
            for normal in &mut mesh.normals {
                *normal = normal_matrix.transform_vector3(*normal).normalize_or(Vec3::Y);
            }
        }

        meshes.push(mesh);
    }

    Ok(ParsedModel { meshes })
}

fn geometry_mesh(geometry: &FbxNode) -> Result<Option<MeshData>, ParseError> {
    let Some(control_points) = geometry.child("Vertices").and_then(vec3_values) else {
        return Ok(None);
    };
    let Some(raw_indices) = geometry.child("PolygonVertexIndex").and_then(index_values) else {
        return Ok(None);
    };

    // The index stream is a flat list of polygons; a negative entry is the
    // bitwise complement of the final corner's control point index.
    let mut polygons: Vec<Vec<u32>> = Vec::new();
    let mut polygon: Vec<u32> = Vec::new();
    for &raw in &raw_indices {
        let control = if raw < 0 { !raw } else { raw } as usize;
        if control >= control_points.len() {
            return Err(ParseError::invalid(
                "fbx",
                "polygon references a missing control point",
            ));
        }
        polygon.push(control as u32);
        if raw < 0 {
            polygons.push(std::mem::take(&mut polygon));
        }
    }

    let mut mesh = MeshData::default();
    match NormalLayer::from_geometry(geometry) {
        Some(layer) => {
            // Normals can differ per polygon corner, so corners expand into
            // unique vertices.
            let mut corner_index = 0usize;
            let mut complete = true;
            for polygon in &polygons {
                let base = mesh.positions.len() as u32;
                for &control in polygon {
                    mesh.positions.push(control_points[control as usize]);
                    match layer.normal_at(corner_index, control as usize) {
                        Some(normal) => mesh.normals.push(normal),
                        None => {
                            complete = false;
                            mesh.normals.push(Vec3::Y);
                        }
                    }
                    corner_index += 1;
                }
                for i in 1..polygon.len().saturating_sub(1) {
                    mesh.indices
                        .extend([base, base + i as u32, base + i as u32 + 1]);
                }
            }
            if !complete {
                mesh.normals.clear();
            }
        }
        None => {
            mesh.positions = control_points;
            for polygon in &polygons {
                for i in 1..polygon.len().saturating_sub(1) {
                    mesh.indices.extend([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
        }
    }

    Ok(Some(mesh))
}

struct NormalLayer {
    values: Vec<Vec3>,
    indices: Option<Vec<i64>>,
    by_corner: bool,
}

impl NormalLayer {
    fn from_geometry(geometry: &FbxNode) -> Option<NormalLayer> {
        let layer = geometry.child("LayerElementNormal")?;
        let mapping = layer.child("MappingInformationType").and_then(first_string)?;
        let reference = layer
            .child("ReferenceInformationType")
            .and_then(first_string)
            .unwrap_or("Direct");
        let values = layer.child("Normals").and_then(vec3_values)?;
        if values.is_empty() {
            return None;
        }

        let by_corner = match mapping {
            "ByPolygonVertex" => true,
            "ByVertex" | "ByVertice" => false,
            _ => return None,
        };
        let indices = match reference {
            "Direct" => None,
            "IndexToDirect" | "Index" => {
                Some(layer.child("NormalsIndex").and_then(index_values)?)
            }
            _ => return None,
        };

        Some(NormalLayer {
            values,
            indices,
            by_corner,
        })
    }

    fn normal_at(&self, corner_index: usize, control_index: usize) -> Option<Vec3> {
        let slot = if self.by_corner {
            corner_index
        } else {
            control_index
        };
        let index = match &self.indices {
            Some(indices) => usize::try_from(*indices.get(slot)?).ok()?,
            None => slot,
        };
        self.values.get(index).copied()
    }
}

fn model_local_transform(model: &FbxNode) -> Mat4 {
    let mut translation = Vec3::ZERO;
    let mut rotation_deg = Vec3::ZERO;
    let mut scale = Vec3::ONE;

    if let Some(properties) = model.child("Properties70") {
        for record in properties.children.iter().filter(|c| c.name == "P") {
            let Some(FbxProperty::String(key)) = record.properties.first() else {
                continue;
            };
            let values: Vec<f64> = record.properties.iter().filter_map(as_f64).collect();
            if values.len() < 3 {
                continue;
            }
            let vector = Vec3::new(values[0] as f32, values[1] as f32, values[2] as f32);
            match key.as_str() {
                "Lcl Translation" => translation = vector,
                "Lcl Rotation" => rotation_deg = vector,
                "Lcl Scaling" => scale = vector,
                _ => {}
            }
        }
    }

    let rotation = Quat::from_euler(
        EulerRot::XYZ,
        rotation_deg.x.to_radians(),
        rotation_deg.y.to_radians(),
        rotation_deg.z.to_radians(),
    );
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

/// Composes model transforms from the scene root down to the geometry's
/// model. The hop cap guards against connection cycles.
fn world_transform(
    geometry_id: i64,
    parents: &HashMap<i64, i64>,
    locals: &HashMap<i64, Mat4>,
) -> Mat4 {
    let mut chain = Vec::new();
    let mut current = geometry_id;
    for _ in 0..64 {
        match parents.get(&current) {
            Some(&parent) if parent != 0 => {
                chain.push(parent);
                current = parent;
            }
            _ => break,
        }
    }

    let mut world = Mat4::IDENTITY;
    for id in chain.iter().rev() {
        if let Some(local) = locals.get(id) {
            world *= *local;
        }
    }
    world
}

fn vec3_values(node: &FbxNode) -> Option<Vec<Vec3>> {
    node.properties.iter().find_map(|property| match property {
        FbxProperty::F64Array(values) => Some(
            values
                .chunks_exact(3)
                .map(|c| Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32))
                .collect(),
        ),
        FbxProperty::F32Array(values) => Some(
            values
                .chunks_exact(3)
                .map(|c| Vec3::new(c[0], c[1], c[2]))
                .collect(),
        ),
        _ => None,
    })
}

fn index_values(node: &FbxNode) -> Option<Vec<i64>> {
    node.properties.iter().find_map(|property| match property {
        FbxProperty::I32Array(values) => {
            Some(values.iter().map(|&i| i64::from(i)).collect())
        }
        FbxProperty::I64Array(values) => Some(values.clone()),
        _ => None,
    })
}

fn first_string(node: &FbxNode) -> Option<&str> {
    node.properties.iter().find_map(|property| match property {
        FbxProperty::String(value) => Some(value.as_str()),
        _ => None,
    })
}

fn first_i64(node: &FbxNode) -> Option<i64> {
    node.properties.iter().find_map(as_i64)
}

fn as_i64(property: &FbxProperty) -> Option<i64> {
    match property {
        FbxProperty::I64(v) => Some(*v),
        FbxProperty::I32(v) => Some(i64::from(*v)),
        _ => None,
    }
}

fn as_f64(property: &FbxProperty) -> Option<f64> {
    match property {
        FbxProperty::F64(v) => Some(*v),
        FbxProperty::F32(v) => Some(f64::from(*v)),
        FbxProperty::I32(v) => Some(f64::from(*v)),
        FbxProperty::I64(v) => Some(*v as f64),
        FbxProperty::I16(v) => Some(f64::from(*v)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    enum P {
        I64(i64),
        Str(&'static str),
        F64(f64),
        F64Array(Vec<f64>),
        F64ArrayCompressed(Vec<f64>),
        I32Array(Vec<i32>),
    }

    struct TestNode {
        name: &'static str,
        props: Vec<P>,
        children: Vec<TestNode>,
    }

    fn node(name: &'static str, props: Vec<P>, children: Vec<TestNode>) -> TestNode {
        TestNode {
            name,
            props,
            children,
        }
    }

    fn emit_len(out: &mut Vec<u8>, value: u64, wide: bool) {
        if wide {
            out.extend(value.to_le_bytes());
        } else {
            out.extend((value as u32).to_le_bytes());
        }
    }

    fn patch_len(out: &mut Vec<u8>, at: usize, value: u64, wide: bool) {
        if wide {
            out[at..at + 8].copy_from_slice(&value.to_le_bytes());
        } else {
            out[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes());
        }
    }

    fn emit_prop(out: &mut Vec<u8>, prop: &P) {
        match prop {
            P::I64(v) => {
                out.push(b'L');
                out.extend(v.to_le_bytes());
            }
            P::Str(s) => {
                out.push(b'S');
                out.extend((s.len() as u32).to_le_bytes());
                out.extend(s.as_bytes());
            }
            P::F64(v) => {
                out.push(b'D');
                out.extend(v.to_le_bytes());
            }
            P::F64Array(values) => {
                out.push(b'd');
                out.extend((values.len() as u32).to_le_bytes());
                out.extend(0u32.to_le_bytes());
                out.extend(((values.len() * 8) as u32).to_le_bytes());
                for v in values {
                    out.extend(v.to_le_bytes());
                }
            }
            P::F64ArrayCompressed(values) => {
                let mut raw = Vec::with_capacity(values.len() * 8);
                for v in values {
                    raw.extend(v.to_le_bytes());
                }
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&raw).unwrap();
                let compressed = encoder.finish().unwrap();

                out.push(b'd');
                out.extend((values.len() as u32).to_le_bytes());
                out.extend(1u32.to_le_bytes());
                out.extend((compressed.len() as u32).to_le_bytes());
                out.extend(compressed);
            }
            P::I32Array(values) => {
                out.push(b'i');
                out.extend((values.len() as u32).to_le_bytes());
                out.extend(0u32.to_le_bytes());
                out.extend(((values.len() * 4) as u32).to_le_bytes());
                for v in values {
                    out.extend(v.to_le_bytes());
                }
            }
        }
    }

    fn emit_node(out: &mut Vec<u8>, node: &TestNode, wide: bool) {
        let end_patch = out.len();
        emit_len(out, 0, wide);
        emit_len(out, node.props.len() as u64, wide);
        let plen_patch = out.len();
        emit_len(out, 0, wide);
        out.push(node.name.len() as u8);
        out.extend(node.name.as_bytes());

        let props_start = out.len();
        for prop in &node.props {
            emit_prop(out, prop);
        }
        let plen = (out.len() - props_start) as u64;
        patch_len(out, plen_patch, plen, wide);

        if !node.children.is_empty() {
            for child in &node.children {
                emit_node(out, child, wide);
            }
            out.extend(vec![0u8; if wide { 25 } else { 13 }]);
        }

        patch_len(out, end_patch, out.len() as u64, wide);
    }

    fn document(nodes: Vec<TestNode>, version: u32) -> Vec<u8> {
        let wide = version >= 7500;
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend([0x1A, 0x00]);
        out.extend(version.to_le_bytes());
        for node in &nodes {
            emit_node(&mut out, node, wide);
        }
        out.extend(vec![0u8; if wide { 25 } else { 13 }]);
        out
    }

    fn triangle_geometry(id: i64) -> TestNode {
        node(
            "Geometry",
            vec![P::I64(id), P::Str("\u{0}\u{1}Geometry"), P::Str("Mesh")],
            vec![
                node(
                    "Vertices",
                    vec![P::F64Array(vec![
                        0.0, 0.0, 0.0, //
                        1.0, 0.0, 0.0, //
                        0.0, 1.0, 0.0,
                    ])],
                    vec![],
                ),
                node(
                    "PolygonVertexIndex",
                    vec![P::I32Array(vec![0, 1, -3])],
                    vec![],
                ),
            ],
        )
    }

    #[test]
    fn binary_triangle_parses() {
        let bytes = document(vec![node("Objects", vec![], vec![triangle_geometry(100)])], 7400);

        let model = parse(&bytes).unwrap();
        assert_eq!(model.meshes.len(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.positions[1], Vec3::X);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn wide_records_parse() {
        let bytes = document(vec![node("Objects", vec![], vec![triangle_geometry(100)])], 7500);

        let model = parse(&bytes).unwrap();
        assert_eq!(model.meshes[0].positions.len(), 3);
    }

    #[test]
    fn quad_is_fan_triangulated() {
        let geometry = node(
            "Geometry",
            vec![P::I64(100), P::Str("\u{0}\u{1}Geometry"), P::Str("Mesh")],
            vec![
                node(
                    "Vertices",
                    vec![P::F64Array(vec![
                        0.0, 0.0, 0.0, //
                        1.0, 0.0, 0.0, //
                        1.0, 1.0, 0.0, //
                        0.0, 1.0, 0.0,
                    ])],
                    vec![],
                ),
                node(
                    "PolygonVertexIndex",
                    vec![P::I32Array(vec![0, 1, 2, -4])],
                    vec![],
                ),
            ],
        );
        let bytes = document(vec![node("Objects", vec![], vec![geometry])], 7400);

        let model = parse(&bytes).unwrap();
        assert_eq!(model.meshes[0].indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn model_translation_applies() {
        let model_node = node(
            "Model",
            vec![P::I64(200), P::Str("\u{0}\u{1}Model"), P::Str("Mesh")],
            vec![node(
                "Properties70",
                vec![],
                vec![node(
                    "P",
                    vec![
                        P::Str("Lcl Translation"),
                        P::Str("Lcl Translation"),
                        P::Str(""),
                        P::Str("A"),
                        P::F64(0.0),
                        P::F64(2.0),
                        P::F64(0.0),
                    ],
                    vec![],
                )],
            )],
        );
        let connections = node(
            "Connections",
            vec![],
            vec![
                node("C", vec![P::Str("OO"), P::I64(100), P::I64(200)], vec![]),
                node("C", vec![P::Str("OO"), P::I64(200), P::I64(0)], vec![]),
            ],
        );
        let bytes = document(
            vec![
                node("Objects", vec![], vec![triangle_geometry(100), model_node]),
                connections,
            ],
            7400,
        );

        let model = parse(&bytes).unwrap();
        assert_eq!(model.meshes[0].positions[1], Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn compressed_vertex_array_parses() {
        let geometry = node(
            "Geometry",
            vec![P::I64(100), P::Str("\u{0}\u{1}Geometry"), P::Str("Mesh")],
            vec![
                node(
                    "Vertices",
                    vec![P::F64ArrayCompressed(vec![
                        0.0, 0.0, 0.0, //
                        1.0, 0.0, 0.0, //
                        0.0, 1.0, 0.0,
                    ])],
                    vec![],
                ),
                node(
                    "PolygonVertexIndex",
                    vec![P::I32Array(vec![0, 1, -3])],
                    vec![],
                ),
            ],
        );
        let bytes = document(vec![node("Objects", vec![], vec![geometry])], 7400);

        let model = parse(&bytes).unwrap();
        assert_eq!(model.meshes[0].positions[1], Vec3::X);
    }

    #[test]
    fn per_corner_normals_are_read() {
        let mut geometry = triangle_geometry(100);
        geometry.children.push(node(
            "LayerElementNormal",
            vec![],
            vec![
                node(
                    "MappingInformationType",
                    vec![P::Str("ByPolygonVertex")],
                    vec![],
                ),
                node("ReferenceInformationType", vec![P::Str("Direct")], vec![]),
                node(
                    "Normals",
                    vec![P::F64Array(vec![
                        0.0, 0.0, 1.0, //
                        0.0, 0.0, 1.0, //
                        0.0, 0.0, 1.0,
                    ])],
                    vec![],
                ),
            ],
        ));
        let bytes = document(vec![node("Objects", vec![], vec![geometry])], 7400);

        let model = parse(&bytes).unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.normals.len(), 3);
        assert_eq!(mesh.normals[0], Vec3::Z);
    }

    #[test]
    fn out_of_range_polygon_index_is_rejected() {
        let geometry = node(
            "Geometry",
            vec![P::I64(100), P::Str("\u{0}\u{1}Geometry"), P::Str("Mesh")],
            vec![
                node(
                    "Vertices",
                    vec![P::F64Array(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])],
                    vec![],
                ),
                node(
                    "PolygonVertexIndex",
                    vec![P::I32Array(vec![0, 1, -100])],
                    vec![],
                ),
            ],
        );
        let bytes = document(vec![node("Objects", vec![], vec![geometry])], 7400);

        assert!(parse(&bytes).is_err());
    }

    #[test]
    fn ascii_fbx_is_rejected() {
        let text = b"; FBX 7.4.0 project file\nFBXHeaderExtension:  {\n}\n";
        let error = parse(text).unwrap_err();
        assert!(error.to_string().contains("ASCII"));
    }

    #[test]
    fn old_version_is_rejected() {
        let bytes = document(vec![node("Objects", vec![], vec![triangle_geometry(100)])], 6100);
        assert!(parse(&bytes).is_err());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let mut bytes = document(vec![node("Objects", vec![], vec![triangle_geometry(100)])], 7400);
        bytes.truncate(bytes.len() - 20);
        assert!(parse(&bytes).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse(&[0u8; 64]).is_err());
    }

    #[test]
    fn fit_places_parsed_model_on_ground_plane() {
        use crate::config::FitPolicy;
        use crate::math::normalize;

        let geometry = node(
            "Geometry",
            vec![P::I64(100), P::Str("\u{0}\u{1}Geometry"), P::Str("Mesh")],
            vec![
                node(
                    "Vertices",
                    vec![P::F64Array(vec![
                        1.0, 2.0, 3.0, //
                        3.0, 2.0, 3.0, //
                        1.0, 4.0, 7.0,
                    ])],
                    vec![],
                ),
                node(
                    "PolygonVertexIndex",
                    vec![P::I32Array(vec![0, 1, -3])],
                    vec![],
                ),
            ],
        );
        let bytes = document(vec![node("Objects", vec![], vec![geometry])], 7400);

        let model = parse(&bytes).unwrap();
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
