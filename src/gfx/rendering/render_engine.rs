//! WGPU-based forward renderer for the viewer
//!
//! Owns the surface, device and queue, the depth buffer and the single scene
//! pipeline. Per-frame it uploads whatever the scene created since the last
//! frame, refreshes per-mesh transforms and draws every mesh with its
//! current material.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use cgmath::{Matrix, Matrix4, SquareMatrix};
use wgpu::TextureFormat;

use crate::gfx::{
    camera::camera_utils::CameraUniform,
    resources::{
        global_bindings::{update_global_ubo, GlobalBindings, GlobalUBO},
        material::material_bind_group_layout,
        texture_resource::TextureResource,
    },
    scene::{DrawMesh, MeshId, Scene},
};
use crate::settings::LightSettings;
use crate::wgpu_utils::{
    binding_types, BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc,
    UniformBuffer,
};

use super::pipeline_manager::{PipelineConfig, PipelineManager};

const SCENE_PIPELINE: &str = "Scene";

/// MUST match `ModelTransform` in scene.wgsl
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshTransformUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
}

impl MeshTransformUniform {
    pub fn new(model: Matrix4<f32>) -> Self {
        let normal = model
            .invert()
            .map(|inverse| inverse.transpose())
            .unwrap_or(model);
        Self {
            model: model.into(),
            normal: normal.into(),
        }
    }
}

struct MeshTransformBinding {
    ubo: UniformBuffer<MeshTransformUniform>,
    bind_group: wgpu::BindGroup,
}

/// Core rendering engine managing GPU resources and draw calls
pub struct RenderEngine {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    depth_texture: TextureResource,
    format: TextureFormat,
    pipeline_manager: PipelineManager,
    global_ubo: GlobalUBO,
    global_bindings: GlobalBindings,
    material_layout: BindGroupLayoutWithDesc,
    transform_layout: BindGroupLayoutWithDesc,
    transforms: HashMap<MeshId, MeshTransformBinding>,
    background: wgpu::Color,
}

impl RenderEngine {
    /// Creates a new render engine for the given window
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> anyhow::Result<RenderEngine> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to request a device")?;

        let surface_capabilities = surface.get_capabilities(&adapter);
        // Diffuse maps are sampled as sRGB, so present through an sRGB surface
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .context("Surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_capabilities.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture =
            TextureResource::create_depth_texture(&device, &config, "depth_texture");

        let global_ubo = GlobalUBO::new(&device);
        let mut global_bindings = GlobalBindings::new(&device);
        global_bindings.create_bind_group(&device, &global_ubo);

        let transform_layout = BindGroupLayoutBuilder::new()
            .next_binding_vertex(binding_types::uniform())
            .create(&device, "Transform Bind Group");
        let material_layout = material_bind_group_layout(&device);

        let device: Arc<wgpu::Device> = device.into();
        let queue: Arc<wgpu::Queue> = queue.into();
        let mut pipeline_manager = PipelineManager::new(device.clone());

        pipeline_manager.load_shader("scene", include_str!("scene.wgsl"));
        pipeline_manager.register_pipeline(
            SCENE_PIPELINE,
            PipelineConfig::default()
                .with_label("SCENE")
                .with_shader("scene")
                // Imported models are not reliably closed or consistently wound
                .with_cull_mode(None)
                .with_depth_format(TextureResource::DEPTH_FORMAT)
                .with_bind_group_layouts(vec![
                    global_bindings.bind_group_layout().clone(),
                    transform_layout.layout.clone(),
                    material_layout.layout.clone(),
                ])
                .with_color_targets(vec![Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })]),
        );
        if let Err(errors) = pipeline_manager.create_all_pipelines() {
            for error in errors {
                log::error!("{}", error);
            }
        }

        log::info!(
            "Render engine ready: {} ({:?}), surface {}x{} {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            config.width,
            config.height,
            format
        );

        Ok(RenderEngine {
            surface,
            device,
            queue,
            config,
            depth_texture,
            format,
            pipeline_manager,
            global_ubo,
            global_bindings,
            material_layout,
            transform_layout,
            transforms: HashMap::new(),
            background: wgpu::Color::BLACK,
        })
    }

    /// Clear colour for the next frames, linear RGB
    pub fn set_background(&mut self, color: [f32; 3]) {
        self.background = wgpu::Color {
            r: color[0] as f64,
            g: color[1] as f64,
            b: color[2] as f64,
            a: 1.0,
        };
    }

    /// Updates camera and light uniform buffers
    pub fn update(&mut self, camera_uniform: CameraUniform, light: &LightSettings) {
        update_global_ubo(&mut self.global_ubo, &self.queue, camera_uniform, light);
    }

    /// Brings per-mesh transform uniforms in line with the scene
    fn sync_transforms(&mut self, scene: &Scene) {
        let stale: Vec<MeshId> = self
            .transforms
            .keys()
            .filter(|id| !scene.contains_mesh(**id))
            .copied()
            .collect();
        for id in stale {
            if let Some(binding) = self.transforms.remove(&id) {
                binding.ubo.destroy();
            }
        }

        for instance in scene.meshes() {
            let Some(model) = scene.mesh_world_matrix(instance.id) else {
                continue;
            };
            let content = MeshTransformUniform::new(model);

            match self.transforms.get_mut(&instance.id) {
                Some(binding) => binding.ubo.update_content(&self.queue, content),
                None => {
                    let ubo = UniformBuffer::new_with_data(&self.device, &content);
                    let bind_group = BindGroupBuilder::new(&self.transform_layout)
                        .resource(ubo.binding_resource())
                        .create(&self.device, &format!("Transform: {}", instance.identifier));
                    self.transforms
                        .insert(instance.id, MeshTransformBinding { ubo, bind_group });
                }
            }
        }
    }

    /// Uploads pending scene resources and draws one frame
    ///
    /// Surface errors are returned so the caller can reconfigure on
    /// `Lost`/`Outdated`.
    pub fn render_frame(&mut self, scene: &mut Scene) -> Result<(), wgpu::SurfaceError> {
        scene.sync_gpu(&self.device, &self.queue, &self.material_layout);
        self.sync_transforms(scene);

        let surface_texture = self.surface.get_current_texture()?;
        let surface_texture_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_texture_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.background),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let (Some(globals), Some(pipeline)) = (
                self.global_bindings.bind_group(),
                self.pipeline_manager.get_pipeline(SCENE_PIPELINE),
            ) {
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, globals, &[]);

                for instance in scene.meshes() {
                    let Some(transform) = self.transforms.get(&instance.id) else {
                        continue;
                    };
                    let Some(material) = scene
                        .materials
                        .get(instance.material)
                        .and_then(|m| m.bind_group())
                    else {
                        log::trace!("Skipping '{}': material not uploaded", instance.identifier);
                        continue;
                    };

                    render_pass.set_bind_group(1, &transform.bind_group, &[]);
                    render_pass.set_bind_group(2, material, &[]);
                    render_pass.draw_mesh(&instance.mesh);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    /// Resizes the surface and recreates the depth buffer
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        let old = std::mem::replace(
            &mut self.depth_texture,
            TextureResource::create_depth_texture(&self.device, &self.config, "depth_texture"),
        );
        old.destroy();
    }

    /// Reapplies the current configuration after a lost or outdated surface
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Current surface dimensions in pixels
    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Frees every GPU resource the engine owns itself
    pub fn destroy(&mut self) {
        for (_, binding) in self.transforms.drain() {
            binding.ubo.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector4};

    #[test]
    fn test_transform_uniform_layout() {
        assert_eq!(std::mem::size_of::<MeshTransformUniform>(), 128);
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let model = Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0);
        let uniform = MeshTransformUniform::new(model);
        let normal = Matrix4::from(uniform.normal);

        // A slanted surface normal must stay perpendicular after scaling
        let n = normal * Vector4::new(1.0, 1.0, 0.0, 0.0);
        let tangent = model * Vector4::new(1.0, -1.0, 0.0, 0.0);
        approx::assert_abs_diff_eq!(
            n.truncate().dot(tangent.truncate()),
            0.0,
            epsilon = 1e-6
        );
    }
}
