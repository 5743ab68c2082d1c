//! Texture resource management for wgpu
//!
//! CPU-side images live in the [`TextureManager`] from the moment they are
//! decoded; GPU textures are attached on the next sync and released
//! explicitly through [`TextureManager::destroy`].

use std::collections::HashMap;
use std::fmt;

/// Stable identifier of a texture in the [`TextureManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture#{}", self.0)
    }
}

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureImage {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Expands tightly packed RGB8 pixels to RGBA8
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Self {
        let rgba = rgb
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect();
        Self::new(width, height, rgba)
    }

    /// 1x1 image of a single color
    pub fn solid(color: [u8; 4]) -> Self {
        Self::new(1, 1, color.to_vec())
    }
}

/// GPU texture resource containing texture, view, and sampler
///
/// Bundles the three main components needed for texture operations:
/// - Texture: The actual GPU memory allocation
/// - View: Interface for shader access
/// - Sampler: Filtering and addressing configuration
pub struct TextureResource {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl TextureResource {
    /// Standard depth buffer format used throughout the engine
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Creates a depth texture matching the surface configuration
    pub fn create_depth_texture(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        label: &str,
    ) -> Self {
        Self::create_depth_texture_sized(device, config.width, config.height, label)
    }

    pub fn create_depth_texture_sized(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Creates a repeat-wrapped sRGB texture from an RGBA8 image
    ///
    /// Tiling factors above one rely on the repeat address mode.
    pub fn create_repeating(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &TextureImage,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Frees the GPU allocation immediately
    pub fn destroy(self) {
        self.texture.destroy();
    }
}

struct TextureEntry {
    label: String,
    image: TextureImage,
    gpu: Option<TextureResource>,
}

/// Owns every texture used by materials
///
/// The manager does not track who uses a texture; whoever creates one is
/// responsible for destroying it.
pub struct TextureManager {
    textures: HashMap<TextureId, TextureEntry>,
    next_id: u64,
    /// White 1x1 texture bound by materials without a diffuse map
    fallback: Option<TextureResource>,
}

impl Default for TextureManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureManager {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_id: 1,
            fallback: None,
        }
    }

    pub fn create(&mut self, label: &str, image: TextureImage) -> TextureId {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(
            id,
            TextureEntry {
                label: label.to_string(),
                image,
                gpu: None,
            },
        );
        id
    }

    /// Removes the texture and releases its GPU memory. Returns false if the
    /// id was unknown.
    pub fn destroy(&mut self, id: TextureId) -> bool {
        match self.textures.remove(&id) {
            Some(entry) => {
                if let Some(gpu) = entry.gpu {
                    gpu.destroy();
                }
                log::debug!("Destroyed texture {} ({})", id, entry.label);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: TextureId) -> bool {
        self.textures.contains_key(&id)
    }

    pub fn image(&self, id: TextureId) -> Option<&TextureImage> {
        self.textures.get(&id).map(|e| &e.image)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Uploads every texture that has no GPU counterpart yet
    pub fn sync_gpu(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if self.fallback.is_none() {
            self.fallback = Some(TextureResource::create_repeating(
                device,
                queue,
                &TextureImage::solid([255, 255, 255, 255]),
                "Fallback White",
            ));
        }

        for entry in self.textures.values_mut().filter(|e| e.gpu.is_none()) {
            entry.gpu = Some(TextureResource::create_repeating(
                device,
                queue,
                &entry.image,
                &entry.label,
            ));
        }
    }

    /// GPU resource of `id`, or the white fallback when `id` is `None`
    pub fn gpu_resource(&self, id: Option<TextureId>) -> Option<&TextureResource> {
        match id {
            Some(id) => self.textures.get(&id).and_then(|e| e.gpu.as_ref()),
            None => self.fallback.as_ref(),
        }
    }

    /// Releases all textures, including the fallback
    pub fn destroy_all(&mut self) {
        let ids: Vec<TextureId> = self.textures.keys().copied().collect();
        for id in ids {
            self.destroy(id);
        }
        if let Some(fallback) = self.fallback.take() {
            fallback.destroy();
        }
    }
}
