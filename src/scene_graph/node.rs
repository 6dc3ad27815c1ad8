use glam::Vec3;
use id_arena::Id;

use crate::scene_graph::transform::Transform;

pub type NodeId = Id<SceneNode>;

/// Index of an uploaded mesh in the renderer's mesh list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Mesh(MeshHandle),
}

pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
    pub child_ids: Vec<NodeId>,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Transform::from_translation(Vec3::ZERO),
            kind: NodeKind::Group,
            parent_id: None,
            child_ids: Vec::new(),
        }
    }
}
