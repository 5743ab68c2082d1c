//! # Object Picking System
//!
//! Resolves a click in device pixels to the mesh instance under it and keeps
//! the single active selection with its highlight material.
//!
//! ## How it works
//!
//! 1. **Click classification**: [`ClickTracker`] separates clicks from drags
//! 2. **Pick**: a [`Picker`] maps the pixel to a [`MeshId`] (or to nothing)
//! 3. **Selection**: [`SelectionState`] swaps materials and notifies observers
//!
//! The viewer uses the GPU id-buffer picker when a device is available. The
//! ray picker answers the same question on the CPU from mesh geometry and
//! is what the headless tests drive.

pub mod click;
pub mod gpu_picker;
pub mod selection;

use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3, Vector4};

use crate::error::PickerDeviceError;
use crate::gfx::scene::{MeshId, Scene};

pub use click::{ClickTracker, CLICK_SLOP_MOUSE, CLICK_SLOP_TOUCH};
pub use gpu_picker::GpuPicker;
pub use selection::{BaseDiffuseSnapshot, Selection, SelectionChange, SelectionState, SELECTION_GLOW};

/// A 3D ray for intersection testing
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Ray origin point in world space
    pub origin: Vector3<f32>,
    /// Ray direction (normalized)
    pub direction: Vector3<f32>,
}

impl Ray {
    /// Create a new ray
    pub fn new(origin: Vector3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Get a point along the ray at distance t
    pub fn point_at(&self, t: f32) -> Vector3<f32> {
        self.origin + self.direction * t
    }

    /// Ray through pixel `(x, y)` of a `width` x `height` viewport
    pub fn from_screen(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        view_proj: &Matrix4<f32>,
    ) -> Option<Self> {
        let ndc_x = (2.0 * (x + 0.5)) / width - 1.0;
        let ndc_y = 1.0 - (2.0 * (y + 0.5)) / height; // Flip Y axis

        let inv_view_proj = view_proj.invert()?;
        let unproject = |z: f32| {
            let p = inv_view_proj * Vector4::new(ndc_x, ndc_y, z, 1.0);
            p.truncate() / p.w
        };

        // wgpu clip space depth runs from 0 (near) to 1 (far)
        let near = unproject(0.0);
        let far = unproject(1.0);
        Some(Ray::new(near, far - near))
    }

    /// Möller-Trumbore ray/triangle test; distance along the ray on hit
    pub fn intersect_triangle(
        &self,
        v0: Vector3<f32>,
        v1: Vector3<f32>,
        v2: Vector3<f32>,
    ) -> Option<f32> {
        const EPSILON: f32 = 1e-7;
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;
        let h = self.direction.cross(edge2);
        let a = edge1.dot(h);
        if a.abs() < EPSILON {
            return None; // Parallel
        }

        let f = 1.0 / a;
        let s = self.origin - v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * self.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        (t > EPSILON).then_some(t)
    }
}

/// Resolves device pixels to mesh instances
pub trait Picker {
    /// Matches the pick target to the current canvas size. Cheap when the
    /// size has not changed.
    fn ensure_size(&mut self, width: u32, height: u32);

    /// Mesh under pixel `(x, y)`, `None` for empty space
    fn pick(
        &mut self,
        scene: &Scene,
        view_proj: &Matrix4<f32>,
        x: u32,
        y: u32,
    ) -> Result<Option<MeshId>, PickerDeviceError>;
}

/// Checks that `(x, y)` addresses a pixel of a non-empty target
pub fn validate_pick_target(
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<(), PickerDeviceError> {
    if width == 0 || height == 0 {
        return Err(PickerDeviceError::ZeroSizedTarget { width, height });
    }
    if x >= width || y >= height {
        return Err(PickerDeviceError::OutOfBounds {
            x,
            y,
            width,
            height,
        });
    }
    Ok(())
}

/// CPU picker that casts a ray against mesh triangles
#[derive(Debug, Default)]
pub struct RayPicker {
    width: u32,
    height: u32,
}

impl RayPicker {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Nearest mesh hit by `ray` and the distance to it
    pub fn cast(scene: &Scene, ray: &Ray) -> Option<(MeshId, f32)> {
        let mut closest: Option<(MeshId, f32)> = None;

        for instance in scene.meshes() {
            let Some(bounds) = scene.mesh_world_bounds(instance.id) else {
                continue;
            };
            // Broad phase
            match bounds.intersect_ray(ray) {
                Some(t) if closest.is_none_or(|(_, best)| t <= best) => {}
                _ => continue,
            }

            let world = scene.graph.world_matrix(instance.node);
            let vertices = instance.mesh.vertices();
            let to_world = |i: u32| {
                let p = vertices[i as usize].position;
                (world * Vector4::new(p[0], p[1], p[2], 1.0)).truncate()
            };

            for tri in instance.mesh.indices().chunks_exact(3) {
                if tri.iter().any(|i| *i as usize >= vertices.len()) {
                    continue;
                }
                if let Some(t) = ray.intersect_triangle(to_world(tri[0]), to_world(tri[1]), to_world(tri[2])) {
                    if closest.is_none_or(|(_, best)| t < best) {
                        closest = Some((instance.id, t));
                    }
                }
            }
        }

        closest
    }
}

impl Picker for RayPicker {
    fn ensure_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn pick(
        &mut self,
        scene: &Scene,
        view_proj: &Matrix4<f32>,
        x: u32,
        y: u32,
    ) -> Result<Option<MeshId>, PickerDeviceError> {
        validate_pick_target(x, y, self.width, self.height)?;

        let Some(ray) = Ray::from_screen(
            x as f32,
            y as f32,
            self.width as f32,
            self.height as f32,
            view_proj,
        ) else {
            return Ok(None); // Degenerate camera
        };

        Ok(Self::cast(scene, &ray).map(|(id, _)| id))
    }
}
