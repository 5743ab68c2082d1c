//! # Graphics Module
//!
//! Everything that lives in or draws the 3D scene: the scene graph host,
//! the camera rig and its controller, picking and selection, GPU resources
//! and the forward renderer.
//!
//! ## Architecture Overview
//!
//! - **Scene** ([`scene`]) - node hierarchy, mesh instances, materials and textures
//! - **Camera** ([`camera`]) - orbit, tour and tweening over a pivot/camera rig
//! - **Picking** ([`picking`]) - click classification, pickers, highlight selection
//! - **Resources** ([`resources`]) - materials, textures and global uniforms
//! - **Rendering** ([`rendering`]) - pipelines and the per-frame draw
//!
//! Scene state is plain data and never requires a GPU. Resources are uploaded
//! lazily by [`RenderEngine::render_frame`], which is why the whole scene side
//! can be driven headless.

pub mod camera;
pub mod picking;
pub mod rendering;
pub mod resources;
pub mod scene;

// Re-export commonly used types
pub use camera::CameraController;
pub use rendering::render_engine::RenderEngine;
pub use scene::Scene;
