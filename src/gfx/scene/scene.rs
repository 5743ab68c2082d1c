use std::collections::BTreeMap;

use cgmath::Matrix4;
use wgpu::Device;

use super::{
    bounds::Aabb,
    graph::{NodeId, SceneGraph, Transform},
    object::{Mesh, MeshId, MeshInstance},
};
use crate::gfx::resources::{
    material::{MaterialId, MaterialManager},
    texture_resource::TextureManager,
};
use crate::wgpu_utils::BindGroupLayoutWithDesc;

/// Name of the node every model root is attached under
pub const MODELS_CONTAINER: &str = "models";

/// Main scene containing the node hierarchy, mesh instances, materials and
/// textures
pub struct Scene {
    pub graph: SceneGraph,
    pub materials: MaterialManager,
    pub textures: TextureManager,
    meshes: BTreeMap<MeshId, MeshInstance>,
    models_container: NodeId,
    next_mesh_id: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        let mut graph = SceneGraph::new();
        let models_container = graph.add_child(graph.root(), MODELS_CONTAINER, Transform::default());

        Self {
            graph,
            materials: MaterialManager::new(),
            textures: TextureManager::new(),
            meshes: BTreeMap::new(),
            models_container,
            next_mesh_id: 0,
        }
    }

    pub fn models_container(&self) -> NodeId {
        self.models_container
    }

    /// Registers `mesh` as drawable at `node` with `material` as its current
    /// material. The scene takes ownership of the material.
    pub fn add_mesh_instance(
        &mut self,
        node: NodeId,
        name: &str,
        model_id: &str,
        mesh: Mesh,
        material: MaterialId,
    ) -> MeshId {
        let id = MeshId(self.next_mesh_id);
        self.next_mesh_id += 1;

        if let Some(scene_node) = self.graph.get_mut(node) {
            scene_node.mesh = Some(id);
        }

        self.meshes.insert(
            id,
            MeshInstance {
                id,
                identifier: format!("{}/{}", model_id, name),
                name: name.to_string(),
                model_id: model_id.to_string(),
                node,
                mesh,
                material,
            },
        );
        id
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshInstance> {
        self.meshes.get(&id)
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut MeshInstance> {
        self.meshes.get_mut(&id)
    }

    pub fn contains_mesh(&self, id: MeshId) -> bool {
        self.meshes.contains_key(&id)
    }

    /// Mesh instances in creation order
    pub fn meshes(&self) -> impl Iterator<Item = &MeshInstance> {
        self.meshes.values()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn find_mesh(&self, identifier: &str) -> Option<MeshId> {
        self.meshes
            .values()
            .find(|m| m.identifier == identifier)
            .map(|m| m.id)
    }

    /// Material the mesh is currently drawn with
    pub fn mesh_material(&self, id: MeshId) -> Option<MaterialId> {
        self.meshes.get(&id).map(|m| m.material)
    }

    pub fn set_mesh_material(&mut self, id: MeshId, material: MaterialId) {
        if let Some(mesh) = self.meshes.get_mut(&id) {
            mesh.material = material;
        }
    }

    /// Mesh instances attached anywhere under `node`
    pub fn meshes_in_subtree(&self, node: NodeId) -> Vec<MeshId> {
        self.graph
            .descendants(node)
            .into_iter()
            .filter_map(|n| self.graph.get(n).and_then(|n| n.mesh))
            .collect()
    }

    /// Removes the subtree at `node`, releasing every mesh it carried together
    /// with the mesh's current material. Returns the removed mesh ids.
    pub fn remove_subtree(&mut self, node: NodeId) -> Vec<MeshId> {
        let removed = self.graph.remove_subtree(node);
        let mut mesh_ids = Vec::new();

        for mesh_id in removed.iter().filter_map(|n| n.mesh) {
            if let Some(mut instance) = self.meshes.remove(&mesh_id) {
                instance.mesh.release_gpu_resources();
                self.materials.destroy(instance.material);
                mesh_ids.push(mesh_id);
            }
        }

        mesh_ids
    }

    pub fn mesh_world_matrix(&self, id: MeshId) -> Option<Matrix4<f32>> {
        self.meshes
            .get(&id)
            .map(|m| self.graph.world_matrix(m.node))
    }

    pub fn mesh_world_bounds(&self, id: MeshId) -> Option<Aabb> {
        let instance = self.meshes.get(&id)?;
        let local = instance.mesh.local_bounds()?;
        Some(local.transform(&self.graph.world_matrix(instance.node)))
    }

    /// World bounds of every mesh instance in the scene
    pub fn all_mesh_world_bounds(&self) -> Vec<Aabb> {
        self.meshes
            .keys()
            .filter_map(|id| self.mesh_world_bounds(*id))
            .collect()
    }

    /// Union of the world bounds of every mesh under `node`
    pub fn subtree_world_bounds(&self, node: NodeId) -> Option<Aabb> {
        self.meshes_in_subtree(node)
            .into_iter()
            .filter_map(|id| self.mesh_world_bounds(id))
            .reduce(|a, b| a.union(&b))
    }

    /// Uploads anything created or changed since the last frame
    pub fn sync_gpu(
        &mut self,
        device: &Device,
        queue: &wgpu::Queue,
        material_layout: &BindGroupLayoutWithDesc,
    ) {
        self.textures.sync_gpu(device, queue);
        self.materials
            .update_all_gpu_resources(device, queue, material_layout, &self.textures);
        for instance in self.meshes.values_mut() {
            instance.mesh.init_gpu_resources(device);
        }
    }

    /// Releases every mesh, material and texture the scene holds
    pub fn destroy_all(&mut self) {
        for (_, mut instance) in std::mem::take(&mut self.meshes) {
            instance.mesh.release_gpu_resources();
        }
        self.materials.destroy_all();
        self.textures.destroy_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::resources::material::Material;
    use cgmath::Vector3;

    fn cube(half: f32) -> Mesh {
        let positions = [
            -half, -half, -half, half, -half, -half, half, half, half, -half, half, half,
        ];
        Mesh::new(&positions, &[], &[], vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn test_subtree_bounds_follow_translation() {
        let mut scene = Scene::new();
        let model = scene
            .graph
            .add_child(scene.models_container(), "model", Transform::default());
        let node = scene.graph.add_child(
            model,
            "part",
            Transform::from_translation(Vector3::new(4.0, 0.0, 0.0)),
        );
        let material = scene.materials.create(Material::default());
        scene.add_mesh_instance(node, "part", "model", cube(1.0), material);

        let bounds = scene.subtree_world_bounds(model).unwrap();
        assert_eq!(bounds.center(), Vector3::new(4.0, 0.0, 0.0));
        assert_eq!(bounds.largest_half_extent(), 1.0);
    }

    #[test]
    fn test_remove_subtree_releases_meshes_and_materials() {
        let mut scene = Scene::new();
        let model = scene
            .graph
            .add_child(scene.models_container(), "model", Transform::default());
        let a = scene.graph.add_child(model, "a", Transform::default());
        let b = scene.graph.add_child(a, "b", Transform::default());
        let mat_a = scene.materials.create(Material::default());
        let mat_b = scene.materials.create(Material::default());
        let mesh_a = scene.add_mesh_instance(a, "a", "model", cube(1.0), mat_a);
        let mesh_b = scene.add_mesh_instance(b, "b", "model", cube(1.0), mat_b);

        let mut removed = scene.remove_subtree(model);
        removed.sort();

        assert_eq!(removed, vec![mesh_a, mesh_b]);
        assert_eq!(scene.mesh_count(), 0);
        assert!(scene.materials.is_empty());
        assert!(scene.graph.children(scene.models_container()).is_empty());
    }

    #[test]
    fn test_identifier_lookup() {
        let mut scene = Scene::new();
        let node = scene
            .graph
            .add_child(scene.models_container(), "chair", Transform::default());
        let material = scene.materials.create(Material::default());
        let id = scene.add_mesh_instance(node, "seat", "chair", cube(0.5), material);

        assert_eq!(scene.find_mesh("chair/seat"), Some(id));
        assert_eq!(scene.mesh(id).unwrap().identifier, "chair/seat");
        assert_eq!(scene.mesh_material(id), Some(material));
    }
}
