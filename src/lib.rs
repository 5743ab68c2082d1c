// src/lib.rs
//! Vitrine 3D Model Viewer
//!
//! An interactive model viewer runtime built on wgpu and winit: load obj,
//! glTF, stl or fbx models, orbit or tour them, pick and highlight meshes,
//! re-texture them and save camera bookmarks.
//!
//! [`viewer::Viewer`] is the headless core; [`app::VitrineApp`] wraps it in a
//! window.

pub mod app;
pub mod assets;
pub mod bookmarks;
pub mod error;
pub mod gfx;
pub mod prelude;
pub mod session;
pub mod settings;
pub mod texturing;
pub mod viewer;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use app::{AppConfig, VitrineApp};
pub use viewer::Viewer;
