//! Camera rig: a pivot node with the camera as its child
//!
//! The pivot carries the position and the yaw/pitch rotation; the camera
//! node only carries the orbit offset along the pivot's local Z axis.

use cgmath::{Deg, Quaternion, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::gfx::scene::{NodeId, SceneGraph, Transform};

pub const MIN_PITCH: f32 = -89.0;
pub const MAX_PITCH: f32 = 89.0;
pub const MIN_ORBIT_DISTANCE: f32 = 0.5;
pub const MAX_ORBIT_DISTANCE: f32 = 50.0;
pub const DEFAULT_ORBIT_DISTANCE: f32 = 5.0;

/// Snapshot of everything needed to reproduce a camera placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Pivot position in world space
    pub position: [f32; 3],
    /// Degrees
    pub yaw: f32,
    /// Degrees
    pub pitch: f32,
    pub orbit_distance: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            yaw: 0.0,
            pitch: 0.0,
            orbit_distance: DEFAULT_ORBIT_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraOffset {
    /// Camera sits `orbit_distance` behind the pivot
    Orbit,
    /// Camera sits at the pivot
    FirstPerson,
}

/// Pivot and camera nodes plus the angles that drive them
#[derive(Debug)]
pub struct CameraRig {
    pivot: NodeId,
    camera: NodeId,
    yaw: f32,
    pitch: f32,
    orbit_distance: f32,
}

impl CameraRig {
    /// Creates the pivot under the graph root and the camera under the pivot
    pub fn attach(graph: &mut SceneGraph, pose: &CameraPose) -> Self {
        let pivot = graph.add_child(
            graph.root(),
            "camera_pivot",
            Transform::from_translation(pose.position.into()),
        );
        let camera = graph.add_child(pivot, "camera", Transform::default());

        let mut rig = Self {
            pivot,
            camera,
            yaw: pose.yaw,
            pitch: 0.0,
            orbit_distance: DEFAULT_ORBIT_DISTANCE,
        };
        rig.set_pitch(pose.pitch);
        rig.set_orbit_distance(pose.orbit_distance);
        rig
    }

    pub fn pivot(&self) -> NodeId {
        self.pivot
    }

    pub fn camera(&self) -> NodeId {
        self.camera
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn orbit_distance(&self) -> f32 {
        self.orbit_distance
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        self.yaw = yaw;
    }

    /// Clamped to [-89, 89]
    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(MIN_PITCH, MAX_PITCH);
    }

    /// Clamped to [0.5, 50]
    pub fn set_orbit_distance(&mut self, distance: f32) {
        self.orbit_distance = distance.clamp(MIN_ORBIT_DISTANCE, MAX_ORBIT_DISTANCE);
    }

    pub fn add_yaw(&mut self, delta: f32) {
        self.set_yaw(self.yaw + delta);
    }

    pub fn add_pitch(&mut self, delta: f32) {
        self.set_pitch(self.pitch + delta);
    }

    pub fn add_distance(&mut self, delta: f32) {
        self.set_orbit_distance(self.orbit_distance + delta);
    }

    pub fn rotation(&self) -> Quaternion<f32> {
        Quaternion::from_angle_y(Deg(self.yaw)) * Quaternion::from_angle_x(Deg(self.pitch))
    }

    /// Yaw-only rotation, for movement along the floor
    pub fn heading(&self) -> Quaternion<f32> {
        Quaternion::from_angle_y(Deg(self.yaw))
    }

    pub fn position(&self, graph: &SceneGraph) -> Vector3<f32> {
        graph
            .local_transform(self.pivot)
            .map(|t| t.translation)
            .unwrap_or(Vector3::new(0.0, 0.0, 0.0))
    }

    pub fn set_position(&self, graph: &mut SceneGraph, position: Vector3<f32>) {
        graph.set_translation(self.pivot, position);
    }

    /// Writes the angles and the camera offset into the graph
    pub fn apply(&self, graph: &mut SceneGraph, offset: CameraOffset) {
        if let Some(pivot) = graph.get_mut(self.pivot) {
            pivot.transform.rotation = self.rotation();
        }
        let local = match offset {
            CameraOffset::Orbit => Vector3::new(0.0, 0.0, self.orbit_distance),
            CameraOffset::FirstPerson => Vector3::new(0.0, 0.0, 0.0),
        };
        graph.set_translation(self.camera, local);
    }

    pub fn pose(&self, graph: &SceneGraph) -> CameraPose {
        CameraPose {
            position: self.position(graph).into(),
            yaw: self.yaw,
            pitch: self.pitch,
            orbit_distance: self.orbit_distance,
        }
    }
}
