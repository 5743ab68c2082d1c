use cgmath::{Vector3, VectorSpace};

/// Progress gained per second; a full transition takes 1/1.5 s
pub const TWEEN_SPEED: f32 = 1.5;

/// Cubic ease-out, `1 - (1 - t)^3`
pub fn ease_out_cubic(t: f32) -> f32 {
    1.0 - (1.0 - t).powi(3)
}

/// Wraps `angle` into (-180, 180]
fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Interpolated rig values for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TweenFrame {
    pub position: Vector3<f32>,
    pub pitch: f32,
    pub yaw: f32,
    pub finished: bool,
}

/// Timed transition between two camera poses
#[derive(Debug, Clone, PartialEq)]
pub struct TweenState {
    t: f32,
    start_position: Vector3<f32>,
    end_position: Vector3<f32>,
    start_pitch: f32,
    end_pitch: f32,
    start_yaw: f32,
    end_yaw: f32,
}

impl TweenState {
    pub fn new(
        start_position: Vector3<f32>,
        start_pitch: f32,
        start_yaw: f32,
        end_position: Vector3<f32>,
        end_pitch: f32,
        end_yaw: f32,
    ) -> Self {
        // Accumulated yaw can be many turns away from the target; start from
        // the equivalent angle nearest to it.
        let start_yaw = end_yaw + wrap_degrees(start_yaw - end_yaw);

        Self {
            t: 0.0,
            start_position,
            end_position,
            start_pitch,
            end_pitch,
            start_yaw,
            end_yaw,
        }
    }

    pub fn progress(&self) -> f32 {
        self.t
    }

    /// Advances by `dt` seconds. Once progress reaches 1 the frame carries the
    /// end values exactly.
    pub fn advance(&mut self, dt: f32) -> TweenFrame {
        self.t = (self.t + dt * TWEEN_SPEED).min(1.0);

        if self.t >= 1.0 {
            return TweenFrame {
                position: self.end_position,
                pitch: self.end_pitch,
                yaw: self.end_yaw,
                finished: true,
            };
        }

        let k = ease_out_cubic(self.t);
        TweenFrame {
            position: self.start_position.lerp(self.end_position, k),
            pitch: self.start_pitch + (self.end_pitch - self.start_pitch) * k,
            yaw: self.start_yaw + (self.end_yaw - self.start_yaw) * k,
            finished: false,
        }
    }
}
