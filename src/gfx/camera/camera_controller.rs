//! Camera state machine
//!
//! The controller is the only writer of the camera rig. It runs in one of
//! three states: free orbit around the pivot, first-person tour at a locked
//! eye height, or an animated transition to a restored bookmark. Bookmark
//! traffic arrives exclusively through the [`CameraMessage`] channel.

use cgmath::{Rotation, Vector3};
use futures::{channel::mpsc::UnboundedReceiver, FutureExt, StreamExt};

use super::{
    camera_rig::{CameraOffset, CameraPose, CameraRig},
    input::InputState,
    tween::TweenState,
};
use crate::bookmarks::{CameraBookmark, CameraMessage};
use crate::gfx::scene::{Aabb, SceneGraph};
use crate::settings::ViewerSettings;

/// Tour movement speed in units per second
pub const TOUR_SPEED: f32 = 10.0;
/// Auto-rotate speed in degrees per second
pub const AUTO_ROTATE_SPEED: f32 = 12.0;
/// Radius kept between the tour pivot and mesh bounds
pub const COLLISION_MARGIN: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    Orbit,
    Tour,
    Tweening,
}

pub struct CameraController {
    rig: CameraRig,
    mode: CameraMode,
    tween: Option<TweenState>,
    input: InputState,
    messages: UnboundedReceiver<CameraMessage>,
    tour_mode: bool,
    tour_height: f32,
    auto_rotate: bool,
    collision_enabled: bool,
}

impl CameraController {
    /// Attaches a rig to `graph` at `initial` and starts in Orbit, or in Tour
    /// when the settings already ask for it
    pub fn new(
        graph: &mut SceneGraph,
        settings: &ViewerSettings,
        initial: &CameraPose,
        messages: UnboundedReceiver<CameraMessage>,
    ) -> Self {
        let rig = CameraRig::attach(graph, initial);
        let mode = if settings.tour_mode {
            CameraMode::Tour
        } else {
            CameraMode::Orbit
        };

        let controller = Self {
            rig,
            mode,
            tween: None,
            input: InputState::new(),
            messages,
            tour_mode: settings.tour_mode,
            tour_height: settings.tour_height,
            auto_rotate: settings.auto_rotate,
            collision_enabled: settings.collision_enabled,
        };
        controller.rig.apply(graph, controller.offset());
        controller
    }

    pub fn rig(&self) -> &CameraRig {
        &self.rig
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn is_tweening(&self) -> bool {
        self.tween.is_some()
    }

    pub fn pose(&self, graph: &SceneGraph) -> CameraPose {
        self.rig.pose(graph)
    }

    /// Auto-framing entry point; clamps like every other distance change
    pub fn set_orbit_distance(&mut self, distance: f32) {
        self.rig.set_orbit_distance(distance);
    }

    /// Picks up the host's latest settings. A tour-mode change switches
    /// between Orbit and Tour immediately unless a tween is running, in
    /// which case the tween ends in the new mode.
    pub fn apply_settings(&mut self, settings: &ViewerSettings) {
        self.tour_height = settings.tour_height;
        self.auto_rotate = settings.auto_rotate;
        self.collision_enabled = settings.collision_enabled;

        if settings.tour_mode != self.tour_mode {
            self.tour_mode = settings.tour_mode;
            if self.mode != CameraMode::Tweening {
                self.mode = self.resting_mode();
                log::debug!("Camera mode switched to {:?}", self.mode);
            }
        }
    }

    fn resting_mode(&self) -> CameraMode {
        if self.tour_mode {
            CameraMode::Tour
        } else {
            CameraMode::Orbit
        }
    }

    fn offset(&self) -> CameraOffset {
        match self.mode {
            CameraMode::Tour => CameraOffset::FirstPerson,
            CameraMode::Tweening if self.tour_mode => CameraOffset::FirstPerson,
            _ => CameraOffset::Orbit,
        }
    }

    /// Starts a transition to `bookmark`, replacing any running one
    pub fn restore(&mut self, graph: &SceneGraph, bookmark: &CameraBookmark) {
        let start = self.rig.position(graph);
        self.tween = Some(TweenState::new(
            start,
            self.rig.pitch(),
            self.rig.yaw(),
            bookmark.position.into(),
            bookmark.orientation.pitch,
            bookmark.orientation.yaw,
        ));
        self.mode = CameraMode::Tweening;
        log::debug!("Restoring bookmark '{}' ({})", bookmark.name, bookmark.id);
    }

    fn process_messages(&mut self, graph: &SceneGraph) {
        while let Some(Some(message)) = self.messages.next().now_or_never() {
            match message {
                CameraMessage::Capture(reply) => {
                    // The requester may have gone away; nothing to do then
                    let _ = reply.send(self.rig.pose(graph));
                }
                CameraMessage::Restore(bookmark) => self.restore(graph, &bookmark),
            }
        }
    }

    /// Advances the state machine by `dt` seconds and writes the rig into the
    /// graph. `obstacles` are the world bounds used for tour collision.
    pub fn update(&mut self, dt: f32, graph: &mut SceneGraph, obstacles: &[Aabb]) {
        self.process_messages(graph);

        match self.mode {
            CameraMode::Tweening => self.update_tween(dt, graph),
            CameraMode::Orbit => self.update_orbit(dt),
            CameraMode::Tour => self.update_tour(dt, graph, obstacles),
        }

        self.rig.apply(graph, self.offset());
        self.input.end_frame();
    }

    fn apply_drag(&mut self) {
        let (yaw, pitch) = self.input.rotation_delta();
        self.rig.add_yaw(yaw);
        self.rig.add_pitch(pitch);
    }

    fn update_orbit(&mut self, dt: f32) {
        self.apply_drag();
        self.rig.add_distance(self.input.zoom_delta());

        if self.auto_rotate && !self.input.is_dragging() {
            self.rig.add_yaw(AUTO_ROTATE_SPEED * dt);
        }
    }

    fn update_tour(&mut self, dt: f32, graph: &mut SceneGraph, obstacles: &[Aabb]) {
        self.apply_drag();

        let keys = self.input.keys;
        let current = self.rig.position(graph);
        let mut next = current;

        if keys.forward_axis() != 0.0 || keys.right_axis() != 0.0 {
            let rotation = self.rig.heading();
            // Forward is local -Z
            let local = Vector3::new(
                keys.right_axis() * TOUR_SPEED * dt,
                0.0,
                -keys.forward_axis() * TOUR_SPEED * dt,
            );
            next += rotation.rotate_vector(local);
        }
        next.y = self.tour_height;

        if self.collision_enabled && next != current && Self::blocked(current, next, obstacles) {
            // Keep the floor lock even when the move is rejected
            next = Vector3::new(current.x, self.tour_height, current.z);
        }

        self.rig.set_position(graph, next);
    }

    /// True when `next` enters a box that `current` is not already inside,
    /// so a pivot standing within a mesh's bounds can still walk out
    fn blocked(current: Vector3<f32>, next: Vector3<f32>, obstacles: &[Aabb]) -> bool {
        obstacles.iter().any(|b| {
            let b = b.expanded(COLLISION_MARGIN);
            b.contains(next) && !b.contains(current)
        })
    }

    fn update_tween(&mut self, dt: f32, graph: &mut SceneGraph) {
        let Some(tween) = self.tween.as_mut() else {
            self.mode = self.resting_mode();
            return;
        };

        let frame = tween.advance(dt);
        self.rig.set_position(graph, frame.position);
        self.rig.set_yaw(frame.yaw);
        self.rig.set_pitch(frame.pitch);

        if frame.finished {
            self.tween = None;
            self.mode = self.resting_mode();
            log::debug!("Camera transition finished, resuming {:?}", self.mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::{camera_channel, CameraMessageSender, Orientation};
    use crate::gfx::camera::camera_rig::{
        MAX_ORBIT_DISTANCE, MAX_PITCH, MIN_ORBIT_DISTANCE, MIN_PITCH,
    };
    use crate::gfx::camera::input::{MovementKeys, PointerKind};
    use approx::assert_relative_eq;

    fn controller_with(settings: &ViewerSettings) -> (CameraController, SceneGraph, CameraMessageSender) {
        let mut graph = SceneGraph::new();
        let (sender, receiver) = camera_channel();
        let controller =
            CameraController::new(&mut graph, settings, &CameraPose::default(), receiver);
        (controller, graph, sender)
    }

    fn bookmark(position: [f32; 3], pitch: f32, yaw: f32) -> CameraBookmark {
        CameraBookmark {
            id: "b1".to_string(),
            name: "View 1".to_string(),
            position,
            orientation: Orientation { pitch, yaw },
        }
    }

    #[test]
    fn test_initial_mode_follows_tour_setting() {
        let (orbit, _, _) = controller_with(&ViewerSettings::default());
        assert_eq!(orbit.mode(), CameraMode::Orbit);

        let settings = ViewerSettings {
            tour_mode: true,
            ..Default::default()
        };
        let (tour, _, _) = controller_with(&settings);
        assert_eq!(tour.mode(), CameraMode::Tour);
    }

    #[test]
    fn test_clamps_hold_for_any_input_sequence() {
        let (mut controller, mut graph, _sender) = controller_with(&ViewerSettings::default());

        let drags = [
            (PointerKind::Mouse, 0.0, 5000.0),
            (PointerKind::Touch, 30.0, -9000.0),
            (PointerKind::Mouse, -4.0, 12.5),
            (PointerKind::Touch, 0.0, 800.0),
        ];
        let zooms = [1000.0, -3000.0, 0.25, 999.0, -0.75];

        for (i, (kind, dx, dy)) in drags.iter().cycle().take(40).enumerate() {
            controller.input_mut().drag(*kind, *dx, *dy);
            if i % 2 == 0 {
                controller.input_mut().wheel(zooms[i % zooms.len()]);
            } else {
                controller.input_mut().pinch(zooms[i % zooms.len()] * 10.0);
            }
            controller.update(0.016, &mut graph, &[]);

            let rig = controller.rig();
            assert!((MIN_PITCH..=MAX_PITCH).contains(&rig.pitch()));
            assert!((MIN_ORBIT_DISTANCE..=MAX_ORBIT_DISTANCE).contains(&rig.orbit_distance()));
        }
    }

    #[test]
    fn test_orbit_places_camera_at_distance() {
        let (mut controller, mut graph, _sender) = controller_with(&ViewerSettings::default());
        controller.input_mut().wheel(4.0);
        controller.update(0.016, &mut graph, &[]);

        let camera = graph.local_transform(controller.rig().camera()).unwrap();
        assert_eq!(camera.translation, Vector3::new(0.0, 0.0, 7.0));
    }

    #[test]
    fn test_tour_moves_along_heading_with_floor_lock() {
        let settings = ViewerSettings {
            tour_mode: true,
            ..Default::default()
        };
        let (mut controller, mut graph, _sender) = controller_with(&settings);
        controller.input_mut().keys = MovementKeys {
            forward: true,
            ..Default::default()
        };

        controller.update(0.5, &mut graph, &[]);

        let p = controller.rig().position(&graph);
        assert_relative_eq!(p.z, -5.0, epsilon = 1e-5);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
        assert_eq!(p.y, settings.tour_height);

        let camera = graph.local_transform(controller.rig().camera()).unwrap();
        assert_eq!(camera.translation, Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_tour_collision_rejects_move_into_mesh() {
        let settings = ViewerSettings {
            tour_mode: true,
            collision_enabled: true,
            ..Default::default()
        };
        let (mut controller, mut graph, _sender) = controller_with(&settings);
        let wall = Aabb::new(Vector3::new(-5.0, 0.0, -3.0), Vector3::new(5.0, 3.0, -1.0));
        controller.input_mut().keys = MovementKeys {
            forward: true,
            ..Default::default()
        };

        controller.update(0.05, &mut graph, &[wall]);
        assert_relative_eq!(controller.rig().position(&graph).z, -0.5, epsilon = 1e-5);

        // Next step would land inside the expanded wall
        controller.update(0.05, &mut graph, &[wall]);
        assert_relative_eq!(controller.rig().position(&graph).z, -0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_tour_walks_out_of_bounds_it_starts_inside() {
        let settings = ViewerSettings {
            tour_mode: true,
            collision_enabled: true,
            ..Default::default()
        };
        let (mut controller, mut graph, _sender) = controller_with(&settings);
        // Centred model taller than the eye height
        let model = Aabb::new(Vector3::new(-2.0, -2.0, -2.0), Vector3::new(2.0, 2.0, 2.0));
        controller.input_mut().keys = MovementKeys {
            forward: true,
            ..Default::default()
        };

        for _ in 0..100 {
            controller.update(0.05, &mut graph, &[model]);
        }

        let p = controller.rig().position(&graph);
        assert!(p.z < -40.0, "pivot stuck at {:?}", p);
        assert_eq!(p.y, settings.tour_height);
    }

    #[test]
    fn test_tour_speed_ignores_pitch() {
        let settings = ViewerSettings {
            tour_mode: true,
            ..Default::default()
        };
        let (mut controller, mut graph, _sender) = controller_with(&settings);
        // Look steeply down: 300 px * 0.2 = 60 degrees
        controller.input_mut().drag(PointerKind::Mouse, 0.0, 300.0);
        controller.update(0.016, &mut graph, &[]);
        assert_relative_eq!(controller.rig().pitch(), -60.0, epsilon = 1e-4);
        let start = controller.rig().position(&graph);

        controller.input_mut().keys = MovementKeys {
            forward: true,
            ..Default::default()
        };
        controller.update(0.5, &mut graph, &[]);

        let moved = controller.rig().position(&graph) - start;
        assert_relative_eq!(moved.z, -5.0, epsilon = 1e-4);
        assert_relative_eq!(moved.x, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_tour_drag_looks_around_with_orbit_gains_and_clamp() {
        let settings = ViewerSettings {
            tour_mode: true,
            ..Default::default()
        };
        let (mut controller, mut graph, _sender) = controller_with(&settings);
        let yaw = controller.rig().yaw();
        let pitch = controller.rig().pitch();

        controller.input_mut().drag(PointerKind::Mouse, -50.0, -25.0);
        controller.update(0.016, &mut graph, &[]);
        assert_eq!(controller.mode(), CameraMode::Tour);
        assert_relative_eq!(controller.rig().yaw(), yaw + 10.0, epsilon = 1e-4);
        assert_relative_eq!(controller.rig().pitch(), pitch + 5.0, epsilon = 1e-4);

        controller.input_mut().drag(PointerKind::Touch, 20.0, 0.0);
        controller.update(0.016, &mut graph, &[]);
        assert_relative_eq!(controller.rig().yaw(), yaw + 4.0, epsilon = 1e-4);

        controller.input_mut().drag(PointerKind::Touch, 0.0, -10_000.0);
        controller.update(0.016, &mut graph, &[]);
        assert_eq!(controller.rig().pitch(), MAX_PITCH);

        // Zoom stays out of tour, the camera still sits on the pivot
        let camera = graph.local_transform(controller.rig().camera()).unwrap();
        assert_eq!(camera.translation, Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_tour_ignores_zoom() {
        let settings = ViewerSettings {
            tour_mode: true,
            ..Default::default()
        };
        let (mut controller, mut graph, _sender) = controller_with(&settings);
        let before = controller.rig().orbit_distance();
        controller.input_mut().wheel(10.0);
        controller.update(0.016, &mut graph, &[]);
        assert_eq!(controller.rig().orbit_distance(), before);
    }

    #[test]
    fn test_setting_toggles_orbit_and_tour() {
        let (mut controller, mut graph, _sender) = controller_with(&ViewerSettings::default());
        let mut settings = ViewerSettings {
            tour_mode: true,
            ..Default::default()
        };

        controller.apply_settings(&settings);
        assert_eq!(controller.mode(), CameraMode::Tour);
        controller.update(0.016, &mut graph, &[]);
        assert_eq!(controller.rig().position(&graph).y, settings.tour_height);

        settings.tour_mode = false;
        controller.apply_settings(&settings);
        assert_eq!(controller.mode(), CameraMode::Orbit);
    }

    #[test]
    fn test_auto_rotate_advances_yaw_when_idle() {
        let settings = ViewerSettings {
            auto_rotate: true,
            ..Default::default()
        };
        let (mut controller, mut graph, _sender) = controller_with(&settings);

        controller.update(0.5, &mut graph, &[]);
        assert_relative_eq!(controller.rig().yaw(), 6.0, epsilon = 1e-5);

        controller.input_mut().set_dragging(true);
        controller.update(0.5, &mut graph, &[]);
        assert_relative_eq!(controller.rig().yaw(), 6.0, epsilon = 1e-5);
    }

    #[test]
    fn test_restore_message_tweens_to_exact_pose() {
        let (mut controller, mut graph, sender) = controller_with(&ViewerSettings::default());
        sender.restore(bookmark([1.0, 2.0, 3.0], 10.0, 45.0));

        controller.update(0.1, &mut graph, &[]);
        assert_eq!(controller.mode(), CameraMode::Tweening);

        for _ in 0..20 {
            controller.update(0.05, &mut graph, &[]);
        }

        assert_eq!(controller.mode(), CameraMode::Orbit);
        assert_eq!(
            controller.rig().position(&graph),
            Vector3::new(1.0, 2.0, 3.0)
        );
        assert_eq!(controller.rig().yaw(), 45.0);
        assert_eq!(controller.rig().pitch(), 10.0);
    }

    #[test]
    fn test_input_during_tween_is_discarded() {
        let (mut controller, mut graph, sender) = controller_with(&ViewerSettings::default());
        sender.restore(bookmark([0.0, 0.0, 0.0], 0.0, 30.0));
        controller.update(0.0, &mut graph, &[]);

        let distance = controller.rig().orbit_distance();
        controller.input_mut().drag(PointerKind::Mouse, 500.0, 500.0);
        controller.input_mut().wheel(10.0);
        controller.update(1.0, &mut graph, &[]);

        assert_eq!(controller.rig().yaw(), 30.0);
        assert_eq!(controller.rig().pitch(), 0.0);
        assert_eq!(controller.rig().orbit_distance(), distance);
    }

    #[test]
    fn test_newer_restore_replaces_running_tween() {
        let (mut controller, mut graph, sender) = controller_with(&ViewerSettings::default());
        sender.restore(bookmark([5.0, 0.0, 0.0], 0.0, 0.0));
        controller.update(0.1, &mut graph, &[]);
        sender.restore(bookmark([0.0, 0.0, -5.0], 20.0, 90.0));
        controller.update(2.0, &mut graph, &[]);

        assert_eq!(
            controller.rig().position(&graph),
            Vector3::new(0.0, 0.0, -5.0)
        );
        assert_eq!(controller.rig().yaw(), 90.0);
    }

    #[test]
    fn test_capture_message_replies_with_pose() {
        let (mut controller, mut graph, sender) = controller_with(&ViewerSettings::default());
        controller.input_mut().drag(PointerKind::Mouse, -50.0, 0.0);
        controller.update(0.016, &mut graph, &[]);

        let mut reply = sender.capture();
        controller.update(0.016, &mut graph, &[]);

        let pose = reply.try_recv().unwrap().unwrap();
        assert_relative_eq!(pose.yaw, 10.0, epsilon = 1e-5);
    }

    #[test]
    fn test_tween_ends_in_tour_when_setting_changed_mid_flight() {
        let (mut controller, mut graph, sender) = controller_with(&ViewerSettings::default());
        sender.restore(bookmark([0.0, 0.0, 0.0], 0.0, 0.0));
        controller.update(0.1, &mut graph, &[]);

        controller.apply_settings(&ViewerSettings {
            tour_mode: true,
            ..Default::default()
        });
        assert_eq!(controller.mode(), CameraMode::Tweening);

        controller.update(1.0, &mut graph, &[]);
        assert_eq!(controller.mode(), CameraMode::Tour);
    }
}
