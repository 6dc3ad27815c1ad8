//! STL (stereolithography) import, binary and ASCII.
//!
//! Detection follows the usual heuristic: ASCII files start with "solid",
//! but some binary exporters write "solid" into the 80 byte header too, so a
//! null byte scan and a length cross check settle the ambiguity.
//!
//! Facet normals stored in the file are ignored. They are unreliable in the
//! wild, so per-vertex normals are recomputed downstream for every STL.

use glam::Vec3;

use crate::formats::{MeshData, ParseError, ParsedModel};

const HEADER_SIZE: usize = 80;

/// Normal + 3 vertices + attribute byte count.
const TRIANGLE_SIZE: usize = 50;

pub fn parse(bytes: &[u8]) -> Result<ParsedModel, ParseError> {
    if bytes.len() < 6 {
        return Err(ParseError::invalid("stl", "file too small to be valid STL"));
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(HEADER_SIZE)]);
    if head.trim_start().starts_with("solid") && !looks_binary(bytes) {
        parse_ascii(bytes)
    } else {
        parse_binary(bytes)
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_SIZE + 4 {
        return false;
    }

    if bytes[..HEADER_SIZE].contains(&0) {
        return true;
    }

    // A binary file is exactly header + count + count * 50 bytes
    let count = triangle_count(bytes) as usize;
    (bytes.len() - HEADER_SIZE - 4) / TRIANGLE_SIZE == count
        && (bytes.len() - HEADER_SIZE - 4) % TRIANGLE_SIZE == 0
}

fn triangle_count(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([
        bytes[HEADER_SIZE],
        bytes[HEADER_SIZE + 1],
        bytes[HEADER_SIZE + 2],
        bytes[HEADER_SIZE + 3],
    ])
}

fn parse_binary(bytes: &[u8]) -> Result<ParsedModel, ParseError> {
    if bytes.len() < HEADER_SIZE + 4 {
        return Err(ParseError::invalid("stl", "truncated binary header"));
    }

    let count = triangle_count(bytes) as usize;
    let payload = &bytes[HEADER_SIZE + 4..];
    if payload.len() / TRIANGLE_SIZE < count {
        return Err(ParseError::invalid(
            "stl",
            format!(
                "header promises {} triangles but the file holds {}",
                count,
                payload.len() / TRIANGLE_SIZE
            ),
        ));
    }

    let mut mesh = MeshData {
        positions: Vec::with_capacity(count * 3),
        indices: Vec::with_capacity(count * 3),
        ..Default::default()
    };

    for i in 0..count {
        let record = &payload[i * TRIANGLE_SIZE..][..TRIANGLE_SIZE];
        // Skip the 12 byte facet normal
        let base = mesh.positions.len() as u32;
        mesh.positions.push(read_vec3(&record[12..24]));
        mesh.positions.push(read_vec3(&record[24..36]));
        mesh.positions.push(read_vec3(&record[36..48]));
        mesh.indices.extend([base, base + 1, base + 2]);
    }

    Ok(ParsedModel { meshes: vec![mesh] })
}

fn read_vec3(buf: &[u8]) -> Vec3 {
    let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let z = f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    Vec3::new(x, y, z)
}

fn parse_ascii(bytes: &[u8]) -> Result<ParsedModel, ParseError> {
    let text = String::from_utf8_lossy(bytes);

    let mut mesh = MeshData::default();
    let mut in_facet = false;
    let mut in_loop = false;
    let mut facet_vertices: Vec<Vec3> = Vec::with_capacity(3);

    for (line_number, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };

        match keyword.to_lowercase().as_str() {
            "facet" => {
                in_facet = true;
            }
            "outer" => {
                in_loop = true;
                facet_vertices.clear();
            }
            "vertex" => {
                if in_loop {
                    let mut component = |axis: &str| -> Result<f32, ParseError> {
                        parts
                            .next()
                            .and_then(|token| token.parse::<f32>().ok())
                            .ok_or_else(|| {
                                ParseError::invalid(
                                    "stl",
                                    format!("line {}: bad {} coordinate", line_number + 1, axis),
                                )
                            })
                    };
                    let x = component("x")?;
                    let y = component("y")?;
                    let z = component("z")?;
                    facet_vertices.push(Vec3::new(x, y, z));
                }
            }
            "endloop" => {
                in_loop = false;
            }
            "endfacet" => {
                if in_facet && facet_vertices.len() == 3 {
                    let base = mesh.positions.len() as u32;
                    mesh.positions.append(&mut facet_vertices);
                    mesh.indices.extend([base, base + 1, base + 2]);
                }
                in_facet = false;
            }
            "endsolid" => break,
            _ => {}
        }
    }

    Ok(ParsedModel { meshes: vec![mesh] })
}
