//! Scene graph host
//!
//! A plain node hierarchy with parent-relative transforms. The graph has no
//! policy of its own: whoever creates a node owns it and is responsible for
//! removing it again.

use std::collections::HashMap;
use std::fmt;

use cgmath::{Matrix4, One, Quaternion, SquareMatrix, Vector3};

use super::object::MeshId;

/// Stable identifier of a node in the [`SceneGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Parent-relative translation, rotation and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// T * R * S
    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translation)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

/// A single node in the hierarchy
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub transform: Transform,
    /// Mesh instance drawn at this node, if any
    pub mesh: Option<MeshId>,
}

/// Node arena rooted at a single root node
pub struct SceneGraph {
    nodes: HashMap<NodeId, SceneNode>,
    root: NodeId,
    next_id: u64,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            SceneNode {
                id: root,
                name: "root".to_string(),
                parent: None,
                children: Vec::new(),
                transform: Transform::default(),
                mesh: None,
            },
        );

        Self {
            nodes,
            root,
            next_id: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Creates a node under `parent`. Falls back to the root if `parent` is gone.
    pub fn add_child(&mut self, parent: NodeId, name: &str, transform: Transform) -> NodeId {
        let parent = if self.nodes.contains_key(&parent) {
            parent
        } else {
            log::warn!("add_child: parent {} does not exist, attaching to root", parent);
            self.root
        };

        let id = NodeId(self.next_id);
        self.next_id += 1;

        self.nodes.insert(
            id,
            SceneNode {
                id,
                name: name.to_string(),
                parent: Some(parent),
                children: Vec::new(),
                transform,
                mesh: None,
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }

        id
    }

    /// Removes `id` and its whole subtree, returning the removed nodes
    /// (pre-order) so their owner can release what they referenced.
    /// The root cannot be removed.
    pub fn remove_subtree(&mut self, id: NodeId) -> Vec<SceneNode> {
        if id == self.root || !self.nodes.contains_key(&id) {
            return Vec::new();
        }

        let ids = self.descendants(id);

        if let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != id);
            }
        }

        ids.into_iter()
            .filter_map(|node_id| self.nodes.remove(&node_id))
            .collect()
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Direct child of `parent` with the given name
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.name == name))
    }

    /// `id` and every node below it, pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                out.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn set_translation(&mut self, id: NodeId, translation: Vector3<f32>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.transform.translation = translation;
        }
    }

    pub fn local_transform(&self, id: NodeId) -> Option<Transform> {
        self.nodes.get(&id).map(|n| n.transform)
    }

    /// Accumulated parent-to-world matrix of `id`
    pub fn world_matrix(&self, id: NodeId) -> Matrix4<f32> {
        let mut matrix = Matrix4::identity();
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.nodes.get(&node_id) {
                Some(node) => {
                    matrix = node.transform.matrix() * matrix;
                    current = node.parent;
                }
                None => break,
            }
        }
        matrix
    }

    pub fn world_position(&self, id: NodeId) -> Vector3<f32> {
        self.world_matrix(id).w.truncate()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Rotation3};

    #[test]
    fn test_add_and_lookup_by_name() {
        let mut graph = SceneGraph::new();
        let container = graph.add_child(graph.root(), "models", Transform::default());
        let a = graph.add_child(container, "model-a", Transform::default());

        assert_eq!(graph.find_child(container, "model-a"), Some(a));
        assert_eq!(graph.find_child(container, "missing"), None);
        assert_eq!(graph.get(a).unwrap().parent, Some(container));
    }

    #[test]
    fn test_remove_subtree_detaches_and_returns_nodes() {
        let mut graph = SceneGraph::new();
        let container = graph.add_child(graph.root(), "models", Transform::default());
        let a = graph.add_child(container, "a", Transform::default());
        let b = graph.add_child(a, "b", Transform::default());
        let _c = graph.add_child(b, "c", Transform::default());

        let removed = graph.remove_subtree(a);

        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0].id, a);
        assert!(graph.children(container).is_empty());
        assert!(!graph.contains(b));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_root_is_not_removable() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        assert!(graph.remove_subtree(root).is_empty());
        assert!(graph.contains(root));
    }

    #[test]
    fn test_world_matrix_composes_parents() {
        let mut graph = SceneGraph::new();
        let pivot = graph.add_child(
            graph.root(),
            "pivot",
            Transform {
                translation: Vector3::new(1.0, 0.0, 0.0),
                rotation: Quaternion::from_angle_y(Deg(90.0)),
                ..Default::default()
            },
        );
        let child = graph.add_child(
            pivot,
            "camera",
            Transform::from_translation(Vector3::new(0.0, 0.0, 2.0)),
        );

        let p = graph.world_position(child);
        approx::assert_relative_eq!(p.x, 3.0, epsilon = 1e-5);
        approx::assert_relative_eq!(p.y, 0.0, epsilon = 1e-5);
        approx::assert_relative_eq!(p.z, 0.0, epsilon = 1e-5);
    }
}
