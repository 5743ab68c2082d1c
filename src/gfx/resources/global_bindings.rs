//! Global uniform bindings for camera and light data
//!
//! Manages the per-frame uniform buffer and bind group shared across all
//! objects in a scene. This is bound to slot 0 in every render pipeline.

use crate::{
    gfx::camera::camera_utils::CameraUniform,
    settings::LightSettings,
    wgpu_utils::{
        binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc},
        binding_types,
        uniform_buffer::UniformBuffer,
    },
};

/// Constant ambient term added to every lit fragment
pub const AMBIENT_STRENGTH: f32 = 0.25;

/// Global uniform buffer content structure
///
/// MUST match the `Globals` struct in the shaders exactly.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlobalUBOContent {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
    light_position: [f32; 3],
    light_intensity: f32,
    light_color: [f32; 3],
    ambient: f32,
}

impl GlobalUBOContent {
    pub fn new(camera: CameraUniform, light: &LightSettings) -> Self {
        Self {
            view_position: camera.view_position,
            view_proj: camera.view_proj,
            light_position: light.position,
            light_intensity: light.intensity,
            light_color: light.color,
            ambient: AMBIENT_STRENGTH,
        }
    }
}

/// Type alias for the global uniform buffer
pub type GlobalUBO = UniformBuffer<GlobalUBOContent>;

/// Updates the global uniform buffer with camera and light data
pub fn update_global_ubo(
    ubo: &mut GlobalUBO,
    queue: &wgpu::Queue,
    camera: CameraUniform,
    light: &LightSettings,
) {
    ubo.update_content(queue, GlobalUBOContent::new(camera, light));
}

/// Manages bind group layouts and bind groups for global uniforms
pub struct GlobalBindings {
    bind_group_layout: BindGroupLayoutWithDesc,
    bind_group: Option<wgpu::BindGroup>,
}

impl GlobalBindings {
    /// Sets up the layout; the bind group is created by `create_bind_group()`
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = BindGroupLayoutBuilder::new()
            .next_binding_rendering(binding_types::uniform()) // camera + light
            .create(device, "Globals Bind Group");

        GlobalBindings {
            bind_group_layout,
            bind_group: None,
        }
    }

    pub fn create_bind_group(&mut self, device: &wgpu::Device, ubo: &GlobalUBO) {
        self.bind_group = Some(
            BindGroupBuilder::new(&self.bind_group_layout)
                .resource(ubo.binding_resource())
                .create(device, "Global Bind Group"),
        );
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout.layout
    }

    pub fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.bind_group.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_content_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<GlobalUBOContent>() % 16, 0);
    }

    #[test]
    fn test_light_settings_are_copied() {
        let light = LightSettings {
            intensity: 3.0,
            color: [1.0, 0.5, 0.25],
            position: [1.0, 2.0, 3.0],
        };
        let content = GlobalUBOContent::new(CameraUniform::default(), &light);

        assert_eq!(content.light_intensity, 3.0);
        assert_eq!(content.light_color, [1.0, 0.5, 0.25]);
        assert_eq!(content.light_position, [1.0, 2.0, 3.0]);
    }
}
