use glam::Vec3;

use crate::config::FitPolicy;
use crate::math::bounds::AABB;

/// Uniform scale and translation that fits a model into the viewing volume.
/// The offset is in post-scale units and is applied to the scaled model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f32,
    pub offset: Vec3,
}

pub fn fit(bounds: &AABB, target_size: f32, policy: FitPolicy) -> Normalization {
    let extent = bounds.max_extent();
    // Degenerate models fall back to a divisor of 1
    let scale = if extent.is_finite() && extent > 0.0 {
        target_size / extent
    } else {
        target_size
    };

    let center = bounds.center();
    let offset = match policy {
        FitPolicy::GroundPlane => Vec3::new(-center.x, -bounds.min.y, -center.z) * scale,
        FitPolicy::Centered => -center * scale,
    };

    Normalization { scale, offset }
}

/// Area-weighted vertex normals. The unnormalized cross product already
/// carries the triangle area, so summing it per vertex weights large faces
/// more heavily.
pub fn recompute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let i0 = triangle[0] as usize;
        let i1 = triangle[1] as usize;
        let i2 = triangle[2] as usize;

        let edge1 = positions[i1] - positions[i0];
        let edge2 = positions[i2] - positions[i0];
        let face_normal = edge1.cross(edge2);

        normals[i0] += face_normal;
        normals[i1] += face_normal;
        normals[i2] += face_normal;
    }

    for normal in &mut normals {
        *normal = normal.normalize_or(Vec3::Y);
    }

    normals
}
