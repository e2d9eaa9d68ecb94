use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::canvas::RenderSurface;
use crate::components::pressure::StrokeSample;

/// Smallest segment length used for stepping; a zero-length segment still stamps once.
const MIN_SEGMENT: f32 = 0.0001;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    Select,
    Fill,
    Hand,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Brush => "Brush",
            Tool::Eraser => "Eraser",
            Tool::Select => "Select",
            Tool::Fill => "Fill",
            Tool::Hand => "Hand",
        }
    }

    pub fn all() -> &'static [Tool] {
        &[Tool::Brush, Tool::Eraser, Tool::Select, Tool::Fill, Tool::Hand]
    }

    /// Case-insensitive lookup by label ("fill", "Hand", ...).
    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::all()
            .iter()
            .copied()
            .find(|t| t.label().eq_ignore_ascii_case(name.trim()))
    }

    /// Tools that stamp the brush along the pointer path.
    pub fn is_stroke(&self) -> bool {
        matches!(self, Tool::Brush | Tool::Eraser)
    }
}

/// Stamp primitive placed at every step of a stroke.
#[derive(Clone, Debug, Default)]
pub enum BrushShape {
    #[default]
    Circle,
    Square,
    /// Raster tip drawn scaled to the stamp size.
    Stamp(Arc<RgbaImage>),
}

impl BrushShape {
    pub fn name(&self) -> &'static str {
        match self {
            BrushShape::Circle => "circle",
            BrushShape::Square => "square",
            BrushShape::Stamp(_) => "stamp",
        }
    }

    /// Parse a procedural shape name. Stamps are built from an image instead.
    pub fn from_name(name: &str) -> Option<BrushShape> {
        match name.trim().to_ascii_lowercase().as_str() {
            "circle" | "round" => Some(BrushShape::Circle),
            "square" => Some(BrushShape::Square),
            _ => None,
        }
    }
}

/// Brush settings consumed by each stroke.
#[derive(Clone, Debug)]
pub struct Brush {
    pub size: f32,
    pub color: Rgba<u8>,
    pub opacity: f32,
    pub shape: BrushShape,
    /// Distance between stamps, in display pixels.
    pub spacing: f32,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            size: 10.0,
            color: Rgba([0x1b, 0x1b, 0x1b, 255]),
            opacity: 1.0,
            shape: BrushShape::Circle,
            spacing: 1.0,
        }
    }
}

impl Brush {
    /// Brush colour with its alpha scaled by the opacity (used by the fill tool).
    pub fn effective_color(&self) -> Rgba<u8> {
        let mut c = self.color;
        c[3] = (c[3] as f32 * self.opacity.clamp(0.0, 1.0)).round() as u8;
        c
    }

    fn step(&self, device_scale: f32) -> f32 {
        let spacing = if self.spacing.is_finite() && self.spacing > 0.0 { self.spacing } else { 1.0 };
        (spacing * device_scale).max(MIN_SEGMENT)
    }
}

// ============================================================================
// STROKE RASTERIZER
// ============================================================================

/// Stamp the brush along `from → to` (surface backing-pixel coordinates).
///
/// Stamps are placed every `spacing * device_scale` pixels starting at
/// `from`. Pressure is interpolated by position along the segment and scales
/// both stamp size and opacity. Returns the number of stamps placed.
pub fn draw_segment<S: RenderSurface>(
    surface: &mut S,
    from: &StrokeSample,
    to: &StrokeSample,
    brush: &Brush,
    viewport_scale: f32,
    device_scale: f32,
    erase: bool,
) -> usize {
    if !surface.is_ready() {
        return 0;
    }
    // Stamps land on exact backing pixels regardless of the display transform
    surface.reset_transform();

    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let dist = (dx * dx + dy * dy).sqrt().max(MIN_SEGMENT);
    let step = brush.step(device_scale);
    let base_size = brush.size * viewport_scale * device_scale;

    let mut stamps = 0;
    let mut i = 0.0f32;
    while i < dist {
        let t = i / dist;
        let x = from.x + dx * t;
        let y = from.y + dy * t;
        let pressure = from.pressure + (to.pressure - from.pressure) * t;
        stamp(surface, x, y, base_size * pressure, brush.opacity * pressure, brush, erase);
        stamps += 1;
        i = stamps as f32 * step;
    }
    stamps
}

fn stamp<S: RenderSurface>(surface: &mut S, x: f32, y: f32, size: f32, opacity: f32, brush: &Brush, erase: bool) {
    if size <= 0.0 {
        return;
    }
    let half = size / 2.0;
    if erase {
        surface.clear_rect(x - half, y - half, size, size);
        return;
    }
    match &brush.shape {
        BrushShape::Stamp(image) => surface.draw_image(image, x - half, y - half, size, size, opacity),
        BrushShape::Square => surface.fill_rect(x - half, y - half, size, size, brush.color, opacity),
        BrushShape::Circle => surface.fill_circle(x, y, half, brush.color, opacity),
    }
}
