//! # Scene Management Module
//!
//! The scene graph host: a node hierarchy with parent-relative transforms,
//! the mesh instances placed in it, and the registries for the materials and
//! textures those meshes draw with.
//!
//! ## Key Components
//!
//! - [`SceneGraph`] - node arena, add/remove/lookup, world transforms
//! - [`Scene`] - graph plus mesh instances, materials and textures
//! - [`Mesh`] / [`MeshInstance`] - geometry and its placement
//! - [`Aabb`] - bounds for framing, picking and collision
//! - [`Vertex3D`] - vertex layout shared by all pipelines
//!
//! The scene itself has no policy. The camera controller owns the rig nodes
//! and the model lifecycle manager owns the model subtrees.

pub mod bounds;
pub mod graph;
pub mod object;
pub mod scene;
pub mod vertex;

// Re-export main types
pub use bounds::Aabb;
pub use graph::{NodeId, SceneGraph, SceneNode, Transform};
pub use object::{DrawMesh, Mesh, MeshId, MeshInstance};
pub use scene::Scene;
pub use vertex::Vertex3D;
