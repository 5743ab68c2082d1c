//! GPU id-buffer picker
//!
//! Renders every mesh into an `R32Uint` target with its id instead of its
//! colour, then reads back the single pixel under the pointer.

use std::sync::Arc;

use cgmath::Matrix4;
use futures::channel::oneshot;

use super::{validate_pick_target, Picker};
use crate::error::PickerDeviceError;
use crate::gfx::rendering::pipeline_manager::{PipelineConfig, PipelineManager};
use crate::gfx::resources::TextureResource;
use crate::gfx::scene::{DrawMesh, MeshId, Scene};
use crate::wgpu_utils::{
    binding_types, BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc,
    UniformBuffer,
};

const PICK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;
const PICK_PIPELINE: &str = "Pick";

/// MUST match `PickUniform` in pick.wgsl
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct PickUniform {
    model: [[f32; 4]; 4],
    view_proj: [[f32; 4]; 4],
    id: u32,
    _padding: [u32; 3],
}

/// Encodes a mesh id so that zero stays free for empty space. `None` when
/// the id does not fit the id target.
fn encode_id(mesh: MeshId) -> Option<u32> {
    u32::try_from(mesh.0).ok()?.checked_add(1)
}

fn decode_id(value: u32) -> Option<MeshId> {
    value.checked_sub(1).map(|id| MeshId(id as u64))
}

struct PickTargets {
    width: u32,
    height: u32,
    ids: wgpu::Texture,
    ids_view: wgpu::TextureView,
    depth: TextureResource,
}

impl PickTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let ids = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Pick Id Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: PICK_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let ids_view = ids.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = TextureResource::create_depth_texture_sized(device, width, height, "Pick Depth");

        Self {
            width,
            height,
            ids,
            ids_view,
            depth,
        }
    }

    fn destroy(self) {
        self.ids.destroy();
        self.depth.destroy();
    }
}

/// Picker backed by an offscreen id render target
pub struct GpuPicker {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline_manager: PipelineManager,
    uniform_layout: BindGroupLayoutWithDesc,
    targets: Option<PickTargets>,
    readback: wgpu::Buffer,
}

impl GpuPicker {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let uniform_layout = BindGroupLayoutBuilder::new()
            .next_binding_rendering(binding_types::uniform())
            .create(&device, "Pick Bind Group");

        let mut pipeline_manager = PipelineManager::new(device.clone());
        pipeline_manager.load_shader("pick", include_str!("pick.wgsl"));
        pipeline_manager.register_pipeline(
            PICK_PIPELINE,
            PipelineConfig::default()
                .with_label("PICK")
                .with_shader("pick")
                .with_cull_mode(None)
                .with_depth_format(TextureResource::DEPTH_FORMAT)
                .with_bind_group_layouts(vec![uniform_layout.layout.clone()])
                .with_color_targets(vec![Some(wgpu::ColorTargetState {
                    format: PICK_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })]),
        );

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pick Readback Buffer"),
            size: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            pipeline_manager,
            uniform_layout,
            targets: None,
            readback,
        }
    }

    fn read_pixel(&self) -> Result<u32, PickerDeviceError> {
        let slice = self.readback.slice(..4);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| PickerDeviceError::Readback(e.to_string()))?;

        match futures::executor::block_on(rx) {
            Ok(Ok(())) => {
                let value = {
                    let mapped = slice.get_mapped_range();
                    bytemuck::pod_read_unaligned::<u32>(&mapped[..4])
                };
                self.readback.unmap();
                Ok(value)
            }
            Ok(Err(e)) => Err(PickerDeviceError::Readback(e.to_string())),
            Err(oneshot::Canceled) => Err(PickerDeviceError::Readback(
                "map callback was dropped".to_string(),
            )),
        }
    }
}

impl Picker for GpuPicker {
    fn ensure_size(&mut self, width: u32, height: u32) {
        let current = self.targets.as_ref().map(|t| (t.width, t.height));
        if current == Some((width, height)) {
            return;
        }

        if let Some(old) = self.targets.take() {
            old.destroy();
        }
        if width > 0 && height > 0 {
            self.targets = Some(PickTargets::new(&self.device, width, height));
        }
    }

    fn pick(
        &mut self,
        scene: &Scene,
        view_proj: &Matrix4<f32>,
        x: u32,
        y: u32,
    ) -> Result<Option<MeshId>, PickerDeviceError> {
        let Some(targets) = &self.targets else {
            return Err(PickerDeviceError::ZeroSizedTarget {
                width: 0,
                height: 0,
            });
        };
        validate_pick_target(x, y, targets.width, targets.height)?;

        // Per-mesh uniforms live only for this pick
        let per_mesh: Vec<_> = scene
            .meshes()
            .filter(|instance| instance.mesh.has_gpu_resources())
            .filter_map(|instance| {
                let Some(id) = encode_id(instance.id) else {
                    log::warn!("{} is out of the pickable id range, skipping it", instance.id);
                    return None;
                };
                let model = scene.mesh_world_matrix(instance.id)?;
                let ubo = UniformBuffer::new_with_data(
                    &self.device,
                    &PickUniform {
                        model: model.into(),
                        view_proj: (*view_proj).into(),
                        id,
                        _padding: [0; 3],
                    },
                );
                let bind_group = BindGroupBuilder::new(&self.uniform_layout)
                    .resource(ubo.binding_resource())
                    .create(&self.device, "Pick Bind Group");
                Some((instance, ubo, bind_group))
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pick Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Pick Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &targets.ids_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &targets.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(pipeline) = self.pipeline_manager.get_pipeline(PICK_PIPELINE) {
                pass.set_pipeline(pipeline);
                for (instance, _, bind_group) in &per_mesh {
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.draw_mesh(&instance.mesh);
                }
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &targets.ids,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let value = self.read_pixel();
        for (_, ubo, _) in per_mesh {
            ubo.destroy();
        }

        Ok(decode_id(value?).filter(|mesh| scene.contains_mesh(*mesh)))
    }
}

impl Drop for GpuPicker {
    fn drop(&mut self) {
        if let Some(targets) = self.targets.take() {
            targets.destroy();
        }
        self.readback.destroy();
    }
}
