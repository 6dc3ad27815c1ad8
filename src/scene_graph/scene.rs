use glam::{Mat4, Quat, Vec3};
use id_arena::Arena;

use crate::math::normalize::Normalization;
use crate::pose::Pose;
use crate::scene_graph::node::{MeshHandle, NodeId, NodeKind, SceneNode};
use crate::scene_graph::transform::Transform;

/// One mesh draw with its resolved world matrix.
#[derive(Debug, Clone, Copy)]
pub struct DrawItem {
    pub mesh: MeshHandle,
    pub world: Mat4,
}

/// The viewer's scene graph. There is a fixed root group and at most one
/// model subtree below it: a pose node driven by user gestures, a fit node
/// carrying the normalization transform, and one leaf per mesh.
pub struct Scene {
    nodes: Arena<SceneNode>,
    root_id: NodeId,
    model_root_id: Option<NodeId>,
}

impl Scene {
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let root_id = nodes.alloc(SceneNode {
            name: "root".to_string(),
            ..Default::default()
        });

        Self {
            nodes,
            root_id,
            model_root_id: None,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model_root_id.is_some()
    }

    /// Replaces the current model subtree with one built from `meshes`,
    /// normalized by `fit`. Returns the id of the new pose node.
    pub fn attach_model(&mut self, meshes: &[MeshHandle], fit: &Normalization) -> NodeId {
        self.clear_model();

        let model_root = self.nodes.alloc(SceneNode {
            name: "model".to_string(),
            ..Default::default()
        });
        self.set_node_parent(model_root, Some(self.root_id));

        let fit_group = self.nodes.alloc(SceneNode {
            name: "fit".to_string(),
            transform: Transform::new(fit.offset, Quat::IDENTITY, fit.scale),
            ..Default::default()
        });
        self.set_node_parent(fit_group, Some(model_root));

        for (index, &mesh) in meshes.iter().enumerate() {
            let leaf = self.nodes.alloc(SceneNode {
                name: format!("mesh {index}"),
                kind: NodeKind::Mesh(mesh),
                ..Default::default()
            });
            self.set_node_parent(leaf, Some(fit_group));
        }

        self.model_root_id = Some(model_root);
        model_root
    }

    /// Drops the model subtree. The arena has no removal, and the graph is
    /// tiny, so this rebuilds it from scratch.
    pub fn clear_model(&mut self) {
        self.nodes = Arena::new();
        self.root_id = self.nodes.alloc(SceneNode {
            name: "root".to_string(),
            ..Default::default()
        });
        self.model_root_id = None;
    }

    pub fn set_model_pose(&mut self, pose: &Pose) {
        let Some(model_root_id) = self.model_root_id else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(model_root_id) {
            node.transform
                .set_transform(Vec3::ZERO, pose.rotation_quat(), pose.scale);
        }
        self.invalidate_hierarchy(model_root_id);
    }

    /// Sets the parent of a node and updates child lists on both ends.
    pub fn set_node_parent(&mut self, child_id: NodeId, new_parent_id: Option<NodeId>) {
        if let Some(child) = self.nodes.get(child_id) {
            if let Some(old_parent_id) = child.parent_id {
                if let Some(old_parent) = self.nodes.get_mut(old_parent_id) {
                    old_parent.child_ids.retain(|&id| id != child_id);
                }
            }
        }

        if let Some(child) = self.nodes.get_mut(child_id) {
            child.parent_id = new_parent_id;

            if let Some(new_parent_id) = new_parent_id {
                if let Some(new_parent) = self.nodes.get_mut(new_parent_id) {
                    new_parent.child_ids.push(child_id);
                }
            }
        }

        self.invalidate_hierarchy(child_id);
    }

    /// Invalidates world transforms for a node and all its descendants.
    fn invalidate_hierarchy(&self, node_id: NodeId) {
        if let Some(node) = self.nodes.get(node_id) {
            node.transform.invalidate_world();

            for &child_id in &node.child_ids {
                self.invalidate_hierarchy(child_id);
            }
        }
    }

    /// Updates all world transforms in hierarchical order.
    pub fn update_transforms(&self) {
        self.update_transform_recursive(self.root_id, Mat4::IDENTITY);
    }

    fn update_transform_recursive(&self, node_id: NodeId, parent_world_matrix: Mat4) {
        if let Some(node) = self.nodes.get(node_id) {
            if node.transform.is_world_dirty() {
                let local_matrix = *node.transform.get_local_matrix();
                node.transform
                    .set_world_matrix(parent_world_matrix * local_matrix);
            }

            let world_matrix = *node.transform.get_world_matrix();
            for &child_id in &node.child_ids {
                self.update_transform_recursive(child_id, world_matrix);
            }
        }
    }

    pub fn draw_items(&self) -> Vec<DrawItem> {
        self.nodes
            .iter()
            .filter_map(|(_, node)| match node.kind {
                NodeKind::Mesh(mesh) => Some(DrawItem {
                    mesh,
                    world: *node.transform.get_world_matrix(),
                }),
                NodeKind::Group => None,
            })
            .collect()
    }
}
