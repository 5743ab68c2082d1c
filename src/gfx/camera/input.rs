//! Per-frame input accumulation
//!
//! Window events arrive between frames; they are summed here and consumed
//! once by the camera controller's update.

/// Degrees of rotation per pixel of mouse drag
pub const MOUSE_DRAG_GAIN: f32 = 0.2;
/// Degrees of rotation per pixel of touch drag
pub const TOUCH_DRAG_GAIN: f32 = 0.3;
/// Orbit distance per wheel line
pub const WHEEL_ZOOM_GAIN: f32 = 0.5;
/// Orbit distance per pixel of pinch
pub const PINCH_ZOOM_GAIN: f32 = 0.05;
/// Pixel-precise wheels report this many pixels per line
pub const PIXELS_PER_LINE: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
}

impl PointerKind {
    pub fn drag_gain(self) -> f32 {
        match self {
            PointerKind::Mouse => MOUSE_DRAG_GAIN,
            PointerKind::Touch => TOUCH_DRAG_GAIN,
        }
    }
}

/// Movement keys currently held
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MovementKeys {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl MovementKeys {
    /// -1, 0 or 1 along the forward axis
    pub fn forward_axis(&self) -> f32 {
        (self.forward as i8 - self.backward as i8) as f32
    }

    /// -1, 0 or 1 along the right axis
    pub fn right_axis(&self) -> f32 {
        (self.right as i8 - self.left as i8) as f32
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InputState {
    /// Scaled yaw delta in degrees
    yaw_delta: f32,
    /// Scaled pitch delta in degrees
    pitch_delta: f32,
    zoom_delta: f32,
    dragging: bool,
    pub keys: MovementKeys,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer moved by `(dx, dy)` pixels while a button or finger is down
    pub fn drag(&mut self, kind: PointerKind, dx: f32, dy: f32) {
        let gain = kind.drag_gain();
        self.yaw_delta -= dx * gain;
        self.pitch_delta -= dy * gain;
    }

    /// Wheel turned by `lines`; positive moves the camera away
    pub fn wheel(&mut self, lines: f32) {
        self.zoom_delta += lines * WHEEL_ZOOM_GAIN;
    }

    /// Pinch changed by `delta` pixels; positive (fingers closing) moves the
    /// camera away
    pub fn pinch(&mut self, delta: f32) {
        self.zoom_delta += delta * PINCH_ZOOM_GAIN;
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn rotation_delta(&self) -> (f32, f32) {
        (self.yaw_delta, self.pitch_delta)
    }

    pub fn zoom_delta(&self) -> f32 {
        self.zoom_delta
    }

    /// Drops the accumulated deltas; held keys and drag state persist
    pub fn end_frame(&mut self) {
        self.yaw_delta = 0.0;
        self.pitch_delta = 0.0;
        self.zoom_delta = 0.0;
    }
}
