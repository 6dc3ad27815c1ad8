pub mod fbx;
pub mod gltf;
pub mod obj;
pub mod ply;
pub mod stl;

use std::path::Path;

use glam::Vec3;
use thiserror::Error;

use crate::math::bounds::AABB;
use crate::math::normalize;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid {format} content: {message}")]
    InvalidContent {
        format: &'static str,
        message: String,
    },
    #[error("model contains no usable geometry")]
    EmptyModel,
}

impl ParseError {
    pub(crate) fn invalid(format: &'static str, message: impl Into<String>) -> ParseError {
        ParseError::InvalidContent {
            format,
            message: message.into(),
        }
    }
}

/// The supported import formats. Unknown extensions are rejected before any
/// file I/O happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Gltf,
    Fbx,
    Obj,
    Stl,
    Ply,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Option<ModelFormat> {
        let extension = path.extension()?.to_str()?.to_lowercase();

        match extension.as_str() {
            "gltf" | "glb" => Some(ModelFormat::Gltf),
            "fbx" => Some(ModelFormat::Fbx),
            "obj" => Some(ModelFormat::Obj),
            "stl" => Some(ModelFormat::Stl),
            "ply" => Some(ModelFormat::Ply),
            _ => None,
        }
    }

    pub fn parse(self, bytes: &[u8]) -> Result<ParsedModel, ParseError> {
        let parsed = match self {
            ModelFormat::Gltf => gltf::parse(bytes)?,
            ModelFormat::Fbx => fbx::parse(bytes)?,
            ModelFormat::Obj => obj::parse(bytes)?,
            ModelFormat::Stl => stl::parse(bytes)?,
            ModelFormat::Ply => ply::parse(bytes)?,
        };

        parsed.validated()
    }
}

pub const DEFAULT_BASE_COLOR: [f32; 4] = [0.78, 0.78, 0.8, 1.0];

/// One submesh as it comes out of a parser. `normals` may be empty or
/// mismatched when the file carries none; they are recomputed before upload.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub base_color: [f32; 4],
}

impl Default for MeshData {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            indices: Vec::new(),
            base_color: DEFAULT_BASE_COLOR,
        }
    }
}

impl MeshData {
    pub fn bounds(&self) -> Option<AABB> {
        AABB::from_points(self.positions.iter().copied())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedModel {
    pub meshes: Vec<MeshData>,
}

impl ParsedModel {
    fn validated(mut self) -> Result<ParsedModel, ParseError> {
        self.meshes
            .retain(|mesh| !mesh.positions.is_empty() && mesh.indices.len() >= 3);

        for mesh in &self.meshes {
            let vertex_count = mesh.positions.len() as u32;
            if mesh.indices.len() % 3 != 0 {
                return Err(ParseError::invalid("model", "index count is not a multiple of 3"));
            }
            if mesh.indices.iter().any(|&index| index >= vertex_count) {
                return Err(ParseError::invalid("model", "face index out of range"));
            }
        }

        if self.meshes.is_empty() {
            return Err(ParseError::EmptyModel);
        }

        Ok(self)
    }

    pub fn bounds(&self) -> Option<AABB> {
        self.meshes
            .iter()
            .filter_map(MeshData::bounds)
            .reduce(|a, b| a.union(&b))
    }

    /// Recomputes normals for every mesh whose normal data is absent or does
    /// not line up with its positions.
    pub fn ensure_normals(&mut self) {
        for mesh in &mut self.meshes {
            if mesh.normals.len() != mesh.positions.len() {
                mesh.normals = normalize::recompute_normals(&mesh.positions, &mesh.indices);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_dispatch_is_case_insensitive() {
        assert_eq!(
            ModelFormat::from_path(Path::new("model.GLB")),
            Some(ModelFormat::Gltf)
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("model.gltf")),
            Some(ModelFormat::Gltf)
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("scan.Stl")),
            Some(ModelFormat::Stl)
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("a/b/thing.fbx")),
            Some(ModelFormat::Fbx)
        );
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        assert_eq!(ModelFormat::from_path(Path::new("model.xyz")), None);
        assert_eq!(ModelFormat::from_path(Path::new("model")), None);
        assert_eq!(ModelFormat::from_path(Path::new(".stl")), None);
    }

    #[test]
    fn validation_rejects_out_of_range_indices() {
        let model = ParsedModel {
            meshes: vec![MeshData {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                indices: vec![0, 1, 7],
                ..Default::default()
            }],
        };

        assert!(model.validated().is_err());
    }

    #[test]
    fn validation_drops_empty_meshes() {
        let model = ParsedModel {
            meshes: vec![
                MeshData::default(),
                MeshData {
                    positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                    indices: vec![0, 1, 2],
                    ..Default::default()
                },
            ],
        };

        let validated = model.validated().unwrap();
        assert_eq!(validated.meshes.len(), 1);
    }

    #[test]
    fn all_meshes_empty_is_an_error() {
        let model = ParsedModel {
            meshes: vec![MeshData::default()],
        };
        assert!(matches!(model.validated(), Err(ParseError::EmptyModel)));
    }

    #[test]
    fn ensure_normals_fills_missing_ones() {
        let mut model = ParsedModel {
            meshes: vec![MeshData {
                positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                indices: vec![0, 1, 2],
                ..Default::default()
            }],
        };

        model.ensure_normals();
        assert_eq!(model.meshes[0].normals.len(), 3);
    }

    #[test]
    fn bounds_cover_all_meshes() {
        let model = ParsedModel {
            meshes: vec![
                MeshData {
                    positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                    indices: vec![0, 1, 2],
                    ..Default::default()
                },
                MeshData {
                    positions: vec![Vec3::splat(5.0), Vec3::splat(6.0), Vec3::splat(7.0)],
                    indices: vec![0, 1, 2],
                    ..Default::default()
                },
            ],
        };

        let bounds = model.bounds().unwrap();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::splat(7.0));
    }
}
