//! Material system
//!
//! Every mesh instance owns its own material so that highlighting or
//! retexturing one mesh never bleeds into another. Materials are stored in
//! the [`MaterialManager`] and referenced by [`MaterialId`]; GPU resources
//! are created lazily on sync and released explicitly on destroy.

use std::collections::HashMap;
use std::fmt;

use wgpu::Device;

use super::texture_resource::{TextureId, TextureManager};
use crate::wgpu_utils::{
    binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc},
    binding_types,
    uniform_buffer::UniformBuffer,
};

/// Material ID for referencing materials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "material#{}", self.0)
    }
}

/// GPU uniform data for materials
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    /// 1.0 when a diffuse map is bound
    pub has_map: f32,
    /// tiling.xy, offset.xy
    pub uv_transform: [f32; 4],
}

type MaterialUBO = UniformBuffer<MaterialUniform>;

/// Creates the layout shared by all material bind groups:
/// uniform, diffuse texture, diffuse sampler
pub fn material_bind_group_layout(device: &Device) -> BindGroupLayoutWithDesc {
    BindGroupLayoutBuilder::new()
        .next_binding_fragment(binding_types::uniform())
        .next_binding_fragment(binding_types::texture_2d())
        .next_binding_fragment(binding_types::sampler(wgpu::SamplerBindingType::Filtering))
        .create(device, "Material Bind Group")
}

struct MaterialGpu {
    ubo: MaterialUBO,
    bind_group: wgpu::BindGroup,
    /// Map the bind group was built against
    bound_map: Option<TextureId>,
}

/// Diffuse/emissive material with optional tiled diffuse map
pub struct Material {
    pub name: String,
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub diffuse_map: Option<TextureId>,
    pub tiling: [f32; 2],
    pub offset: [f32; 2],

    gpu: Option<MaterialGpu>,
}

impl Default for Material {
    fn default() -> Self {
        Self::new("Default", [0.8, 0.8, 0.8, 1.0])
    }
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("base_color", &self.base_color)
            .field("emissive", &self.emissive)
            .field("diffuse_map", &self.diffuse_map)
            .field("tiling", &self.tiling)
            .field("offset", &self.offset)
            .finish()
    }
}

impl Material {
    pub fn new(name: &str, base_color: [f32; 4]) -> Self {
        Self {
            name: name.to_string(),
            base_color,
            emissive: [0.0, 0.0, 0.0],
            diffuse_map: None,
            tiling: [1.0, 1.0],
            offset: [0.0, 0.0],
            gpu: None,
        }
    }

    /// Builder pattern: Set emissive color
    pub fn with_emission(mut self, r: f32, g: f32, b: f32) -> Self {
        self.emissive = [r, g, b];
        self
    }

    pub fn with_diffuse_map(mut self, map: Option<TextureId>) -> Self {
        self.diffuse_map = map;
        self
    }

    /// Copy of every visual property, without GPU resources
    pub fn duplicate(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            base_color: self.base_color,
            emissive: self.emissive,
            diffuse_map: self.diffuse_map,
            tiling: self.tiling,
            offset: self.offset,
            gpu: None,
        }
    }

    fn uniform(&self) -> MaterialUniform {
        MaterialUniform {
            base_color: self.base_color,
            emissive: self.emissive,
            has_map: if self.diffuse_map.is_some() { 1.0 } else { 0.0 },
            uv_transform: [self.tiling[0], self.tiling[1], self.offset[0], self.offset[1]],
        }
    }

    /// Creates or refreshes the uniform buffer and bind group
    pub fn update_gpu_resources(
        &mut self,
        device: &Device,
        queue: &wgpu::Queue,
        layout: &BindGroupLayoutWithDesc,
        textures: &TextureManager,
    ) {
        // Unknown or not yet uploaded maps fall back to white
        let bound_map = self
            .diffuse_map
            .filter(|id| textures.gpu_resource(Some(*id)).is_some());
        let Some(texture) = textures.gpu_resource(bound_map) else {
            return; // Textures not synced yet
        };

        let needs_rebuild = self
            .gpu
            .as_ref()
            .is_none_or(|gpu| gpu.bound_map != bound_map);

        if needs_rebuild {
            let ubo = match self.gpu.take() {
                Some(gpu) => gpu.ubo,
                None => MaterialUBO::new(device),
            };
            let bind_group = BindGroupBuilder::new(layout)
                .resource(ubo.binding_resource())
                .texture(&texture.view)
                .sampler(&texture.sampler)
                .create(device, &format!("Material Bind Group: {}", self.name));
            self.gpu = Some(MaterialGpu {
                ubo,
                bind_group,
                bound_map,
            });
        }

        let uniform = self.uniform();
        if let Some(gpu) = &mut self.gpu {
            gpu.ubo.update_content(queue, uniform);
        }
    }

    /// Gets the bind group for rendering
    pub fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.gpu.as_ref().map(|gpu| &gpu.bind_group)
    }

    pub fn has_gpu_resources(&self) -> bool {
        self.gpu.is_some()
    }

    fn release_gpu_resources(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            gpu.ubo.destroy();
        }
    }
}

/// Manages all materials in the viewer
///
/// Centralized storage with explicit lifetimes: nothing is freed until
/// [`MaterialManager::destroy`] is called for it.
#[derive(Default)]
pub struct MaterialManager {
    materials: HashMap<MaterialId, Material>,
    next_id: u64,
}

impl MaterialManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a material and returns its new id
    pub fn create(&mut self, material: Material) -> MaterialId {
        self.next_id += 1;
        let id = MaterialId(self.next_id);
        self.materials.insert(id, material);
        id
    }

    /// Clones `source` into a new material entry
    pub fn duplicate(&mut self, source: MaterialId, name: &str) -> Option<MaterialId> {
        let copy = self.materials.get(&source)?.duplicate(name);
        Some(self.create(copy))
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(&id)
    }

    pub fn contains(&self, id: MaterialId) -> bool {
        self.materials.contains_key(&id)
    }

    /// Removes the material and frees its GPU resources
    pub fn destroy(&mut self, id: MaterialId) -> bool {
        match self.materials.remove(&id) {
            Some(mut material) => {
                material.release_gpu_resources();
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&mut self) {
        for (_, mut material) in self.materials.drain() {
            material.release_gpu_resources();
        }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Whether any material still samples `texture`
    pub fn references_texture(&self, texture: TextureId) -> bool {
        self.materials
            .values()
            .any(|m| m.diffuse_map == Some(texture))
    }

    /// Updates GPU resources for all materials
    pub fn update_all_gpu_resources(
        &mut self,
        device: &Device,
        queue: &wgpu::Queue,
        layout: &BindGroupLayoutWithDesc,
        textures: &TextureManager,
    ) {
        for material in self.materials.values_mut() {
            material.update_gpu_resources(device, queue, layout, textures);
        }
    }
}
