// src/wgpu_utils/uniform_buffer.rs
use std::marker::PhantomData;

use wgpu::util::DeviceExt;

/// Uniform buffer holding one `Content` value.
///
/// Writes that would upload the bytes already on the GPU are dropped, so
/// per-frame updates of static materials and meshes cost nothing.
pub struct UniformBuffer<Content> {
    buffer: wgpu::Buffer,
    uploaded: Vec<u8>,
    _content: PhantomData<Content>,
}

/// Short type name used in buffer labels
fn label_for<T>() -> String {
    let full = std::any::type_name::<T>();
    let short = full.rsplit("::").next().unwrap_or(full);
    format!("{} uniform", short)
}

impl<Content: bytemuck::Pod> UniformBuffer<Content> {
    /// Zero-initialised buffer
    pub fn new(device: &wgpu::Device) -> Self {
        Self::new_with_data(device, &Content::zeroed())
    }

    pub fn new_with_data(device: &wgpu::Device, content: &Content) -> Self {
        let bytes = bytemuck::bytes_of(content);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&label_for::<Content>()),
            contents: bytes,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            buffer,
            uploaded: bytes.to_vec(),
            _content: PhantomData,
        }
    }

    /// Queues a write when `content` differs from the last upload
    pub fn update_content(&mut self, queue: &wgpu::Queue, content: Content) {
        if let Some(bytes) = changed_bytes(&self.uploaded, &content) {
            queue.write_buffer(&self.buffer, 0, bytes);
            self.uploaded.clear();
            self.uploaded.extend_from_slice(bytes);
        }
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Frees the GPU allocation immediately
    pub fn destroy(self) {
        self.buffer.destroy();
    }
}

/// Bytes of `content` if they differ from `uploaded`
fn changed_bytes<'a, T: bytemuck::Pod>(uploaded: &[u8], content: &'a T) -> Option<&'a [u8]> {
    let bytes = bytemuck::bytes_of(content);
    (uploaded != bytes).then_some(bytes)
}
