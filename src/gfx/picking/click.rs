//! Click versus drag classification

use crate::gfx::camera::PointerKind;

/// Largest cumulative mouse travel, in pixels, that still counts as a click
pub const CLICK_SLOP_MOUSE: f32 = 5.0;
/// Largest cumulative touch travel, in pixels, that still counts as a click
pub const CLICK_SLOP_TOUCH: f32 = 10.0;

#[derive(Debug, Clone, Copy)]
struct Press {
    kind: PointerKind,
    last: (f32, f32),
    travelled: f32,
    over_ui: bool,
}

/// Tracks one press from down to up
#[derive(Debug, Default)]
pub struct ClickTracker {
    press: Option<Press>,
}

impl ClickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer went down at `(x, y)`. Presses that start on host UI chrome
    /// never produce a click.
    pub fn press(&mut self, kind: PointerKind, x: f32, y: f32, over_ui: bool) {
        self.press = Some(Press {
            kind,
            last: (x, y),
            travelled: 0.0,
            over_ui,
        });
    }

    /// Pointer moved; returns the delta since the previous position while
    /// pressed
    pub fn motion(&mut self, x: f32, y: f32) -> Option<(f32, f32)> {
        let press = self.press.as_mut()?;
        let delta = (x - press.last.0, y - press.last.1);
        press.travelled += (delta.0 * delta.0 + delta.1 * delta.1).sqrt();
        press.last = (x, y);
        Some(delta)
    }

    pub fn is_pressed(&self) -> bool {
        self.press.is_some()
    }

    pub fn pointer_kind(&self) -> Option<PointerKind> {
        self.press.map(|p| p.kind)
    }

    /// Pointer went up at `(x, y)`; returns the click position if the press
    /// qualifies as a click
    pub fn release(&mut self, x: f32, y: f32) -> Option<(f32, f32)> {
        self.motion(x, y);
        let press = self.press.take()?;

        let slop = match press.kind {
            PointerKind::Mouse => CLICK_SLOP_MOUSE,
            PointerKind::Touch => CLICK_SLOP_TOUCH,
        };

        (!press.over_ui && press.travelled < slop).then_some((x, y))
    }

    /// Abandons the current press (e.g. a second finger arrived)
    pub fn cancel(&mut self) {
        self.press = None;
    }
}
