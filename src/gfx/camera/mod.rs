pub mod camera_controller;
pub mod camera_rig;
pub mod camera_utils;
pub mod input;
pub mod tween;

// Re-export main types
pub use camera_controller::{CameraController, CameraMode};
pub use camera_rig::{CameraPose, CameraRig};
pub use camera_utils::{CameraUniform, Projection};
pub use input::{InputState, MovementKeys, PointerKind};
pub use tween::TweenState;
