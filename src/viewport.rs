//! Pan/zoom state between screen (pointer) space and surface space.
//!
//! A surface point `p` is displayed at `offset + p * scale`. Zoom keeps the
//! point under the pointer fixed on screen.

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 5.0;
pub const DEFAULT_ZOOM_INTENSITY: f32 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub offset_x: f32,
    pub offset_y: f32,
    scale: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(offset_x: f32, offset_y: f32, scale: f32) -> Self {
        Self {
            offset_x,
            offset_y,
            scale: clamp_scale(scale),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Translate the view by a screen-space delta.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Wheel zoom anchored at the pointer. Negative `delta_y` zooms in.
    pub fn zoom_at(&mut self, pointer_x: f32, pointer_y: f32, delta_y: f32, intensity: f32) {
        let factor = if delta_y < 0.0 { 1.0 + intensity } else { 1.0 - intensity };
        let next = clamp_scale(self.scale * factor);

        // Surface point currently under the pointer
        let px = (pointer_x - self.offset_x) / self.scale;
        let py = (pointer_y - self.offset_y) / self.scale;

        self.offset_x = pointer_x - px * next;
        self.offset_y = pointer_y - py * next;
        self.scale = next;
    }

    /// Map a screen position into backing-pixel coordinates of a surface whose
    /// backing resolution is `ratio` times its displayed size.
    pub fn screen_to_surface(&self, px: f32, py: f32, ratio: (f32, f32)) -> (f32, f32) {
        (
            (px - self.offset_x) / self.scale * ratio.0,
            (py - self.offset_y) / self.scale * ratio.1,
        )
    }

    /// Inverse of [`screen_to_surface`](Self::screen_to_surface).
    pub fn surface_to_screen(&self, sx: f32, sy: f32, ratio: (f32, f32)) -> (f32, f32) {
        let rx = if ratio.0 != 0.0 { ratio.0 } else { 1.0 };
        let ry = if ratio.1 != 0.0 { ratio.1 } else { 1.0 };
        (
            sx / rx * self.scale + self.offset_x,
            sy / ry * self.scale + self.offset_y,
        )
    }
}

fn clamp_scale(scale: f32) -> f32 {
    if scale.is_finite() {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    } else {
        1.0
    }
}
