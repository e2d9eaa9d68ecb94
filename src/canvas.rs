use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use uuid::Uuid;

use crate::components::history::HistoryStack;

/// Fully transparent pixel, the initial content of every non-background layer.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Opaque white, painted into the bottom-most layer when it is created.
pub const BACKGROUND_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

// ============================================================================
// HOST RENDERING SURFACE
// ============================================================================

/// Drawing contract the editing engine needs from whatever owns a layer's pixels.
///
/// Draw calls take surface-space float coordinates and go through the
/// surface's current transform (a uniform scale, e.g. the device pixel ratio
/// applied at setup). `read_pixels` / `write_pixels` always address the
/// backing buffer directly as flat RGBA8.
pub trait RenderSurface {
    /// Allocate a transparent surface displayed at `display_width × display_height`
    /// whose backing buffer is `device_scale` times larger.
    fn with_size(display_width: u32, display_height: u32, device_scale: f32) -> Self
    where
        Self: Sized;

    /// Backing buffer width in device pixels.
    fn width(&self) -> u32;

    /// Backing buffer height in device pixels.
    fn height(&self) -> u32;

    /// On-screen size before any viewport zoom.
    fn display_size(&self) -> (f32, f32);

    /// Ratio of backing resolution to displayed size, per axis.
    fn device_scale(&self) -> (f32, f32) {
        let (dw, dh) = self.display_size();
        if dw <= 0.0 || dh <= 0.0 {
            return (1.0, 1.0);
        }
        (self.width() as f32 / dw, self.height() as f32 / dh)
    }

    /// A zero-sized surface is treated as "not attached yet": every edit skips it.
    fn is_ready(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    fn set_transform(&mut self, scale: f32);

    /// Back to the identity transform so draw calls land on exact device pixels.
    fn reset_transform(&mut self) {
        self.set_transform(1.0);
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba<u8>, alpha: f32);

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>, alpha: f32);

    /// Composite `image` scaled into the destination rectangle.
    fn draw_image(&mut self, image: &RgbaImage, x: f32, y: f32, w: f32, h: f32, alpha: f32);

    /// Set every pixel whose centre falls in the rectangle to full transparency.
    fn clear_rect(&mut self, x: f32, y: f32, w: f32, h: f32);

    /// Overwrite the whole backing buffer with `color` (ignores the transform).
    fn fill(&mut self, color: Rgba<u8>);

    fn read_pixels(&self) -> Vec<u8>;

    /// Replace the whole backing buffer. Buffers of the wrong length are
    /// refused and leave the surface untouched.
    fn write_pixels(&mut self, data: &[u8]) -> bool;
}

/// Normal ("source-over") blend of `top` onto `base` with unpremultiplied channels.
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    // Fully transparent top pixel: nothing to blend
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    // Opaque top at full opacity: overwrite
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return TRANSPARENT;
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let b = base[c] as f32 / 255.0;
        let t = top[c] as f32 / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Range of pixel indices whose centres lie in `[min, max)`, clipped to `0..limit`.
fn pixel_span(min: f32, max: f32, limit: u32) -> Option<(u32, u32)> {
    if !min.is_finite() || !max.is_finite() {
        return None;
    }
    let lo = (min - 0.5).ceil().max(0.0);
    let hi = (max - 0.5).ceil().min(limit as f32);
    if lo >= hi {
        return None;
    }
    Some((lo as u32, hi as u32))
}

// ============================================================================
// SOFTWARE SURFACE – RgbaImage-backed implementation of RenderSurface
// ============================================================================

/// In-memory host surface used by the headless binary and the tests.
#[derive(Clone, Debug)]
pub struct PixelSurface {
    pixels: RgbaImage,
    display_width: f32,
    display_height: f32,
    transform: f32,
}

impl PixelSurface {
    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Read one backing pixel, `None` outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.pixels.width() || y >= self.pixels.height() {
            return None;
        }
        Some(self.pixels.get_pixel(x, y).0)
    }

    pub fn transform(&self) -> f32 {
        self.transform
    }
}

impl RenderSurface for PixelSurface {
    fn with_size(display_width: u32, display_height: u32, device_scale: f32) -> Self {
        let scale = if device_scale.is_finite() && device_scale > 0.0 {
            device_scale
        } else {
            1.0
        };
        let w = (display_width as f32 * scale).round() as u32;
        let h = (display_height as f32 * scale).round() as u32;
        Self {
            pixels: RgbaImage::new(w, h),
            display_width: display_width as f32,
            display_height: display_height as f32,
            // Mirrors the initial setup: drawing in display units by default.
            transform: scale,
        }
    }

    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn display_size(&self) -> (f32, f32) {
        (self.display_width, self.display_height)
    }

    fn set_transform(&mut self, scale: f32) {
        self.transform = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba<u8>, alpha: f32) {
        let t = self.transform;
        let (cx, cy, r) = (cx * t, cy * t, radius * t);
        if r <= 0.0 || alpha <= 0.0 {
            return;
        }
        let r_sq = r * r;
        let Some((x0, x1)) = pixel_span(cx - r, cx + r, self.pixels.width()) else { return };
        let Some((y0, y1)) = pixel_span(cy - r, cy + r, self.pixels.height()) else { return };

        for y in y0..y1 {
            let dy = y as f32 + 0.5 - cy;
            let dy_sq = dy * dy;
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - cx;
                if dx * dx + dy_sq > r_sq {
                    continue;
                }
                let px = self.pixels.get_pixel_mut(x, y);
                *px = blend_over(*px, color, alpha);
            }
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>, alpha: f32) {
        let t = self.transform;
        if alpha <= 0.0 {
            return;
        }
        let Some((x0, x1)) = pixel_span(x * t, (x + w) * t, self.pixels.width()) else { return };
        let Some((y0, y1)) = pixel_span(y * t, (y + h) * t, self.pixels.height()) else { return };
        for py in y0..y1 {
            for px in x0..x1 {
                let p = self.pixels.get_pixel_mut(px, py);
                *p = blend_over(*p, color, alpha);
            }
        }
    }

    fn draw_image(&mut self, image: &RgbaImage, x: f32, y: f32, w: f32, h: f32, alpha: f32) {
        let t = self.transform;
        let (dx, dy, dw, dh) = (x * t, y * t, w * t, h * t);
        if dw <= 0.0 || dh <= 0.0 || alpha <= 0.0 || image.width() == 0 || image.height() == 0 {
            return;
        }
        let Some((x0, x1)) = pixel_span(dx, dx + dw, self.pixels.width()) else { return };
        let Some((y0, y1)) = pixel_span(dy, dy + dh, self.pixels.height()) else { return };
        let (iw, ih) = (image.width(), image.height());

        for py in y0..y1 {
            // Nearest-neighbour sample of the source at the destination pixel centre
            let v = ((py as f32 + 0.5 - dy) / dh * ih as f32) as u32;
            let sy = v.min(ih - 1);
            for px in x0..x1 {
                let u = ((px as f32 + 0.5 - dx) / dw * iw as f32) as u32;
                let sx = u.min(iw - 1);
                let src = *image.get_pixel(sx, sy);
                let p = self.pixels.get_pixel_mut(px, py);
                *p = blend_over(*p, src, alpha);
            }
        }
    }

    fn clear_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let t = self.transform;
        let Some((x0, x1)) = pixel_span(x * t, (x + w) * t, self.pixels.width()) else { return };
        let Some((y0, y1)) = pixel_span(y * t, (y + h) * t, self.pixels.height()) else { return };
        for py in y0..y1 {
            for px in x0..x1 {
                self.pixels.put_pixel(px, py, TRANSPARENT);
            }
        }
    }

    fn fill(&mut self, color: Rgba<u8>) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = color;
        }
    }

    fn read_pixels(&self) -> Vec<u8> {
        self.pixels.as_raw().clone()
    }

    fn write_pixels(&mut self, data: &[u8]) -> bool {
        if data.len() != self.pixels.as_raw().len() {
            return false;
        }
        self.pixels.as_mut().copy_from_slice(data);
        true
    }
}

// ============================================================================
// LAYER MODEL
// ============================================================================

pub type LayerId = Uuid;

/// One named raster surface. The surface and its history belong to this layer alone.
pub struct Layer<S: RenderSurface = PixelSurface> {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    /// Always equal to the layer's position in `CanvasState::layers`.
    pub z_index: usize,
    pub surface: S,
    pub history: HistoryStack,
}

impl<S: RenderSurface> Layer<S> {
    pub fn new(
        name: String,
        width: u32,
        height: u32,
        device_scale: f32,
        background: Option<Rgba<u8>>,
        max_undo_steps: usize,
    ) -> Self {
        let mut surface = S::with_size(width, height, device_scale);
        if let Some(color) = background {
            surface.fill(color);
        }
        // The floor of history is whatever the surface holds right now.
        let history = HistoryStack::new(&surface).with_limit(max_undo_steps);
        Self {
            id: Uuid::new_v4(),
            name,
            visible: true,
            z_index: 0,
            surface,
            history,
        }
    }
}

/// Ordered layer stack (index 0 = bottom) plus the active-layer selection.
pub struct CanvasState<S: RenderSurface = PixelSurface> {
    pub layers: Vec<Layer<S>>,
    pub selected: Option<LayerId>,
    pub width: u32,
    pub height: u32,
    pub device_scale: f32,
    pub max_undo_steps: usize,
}

impl<S: RenderSurface> CanvasState<S> {
    /// An empty stack; the first layer added gets the white background.
    pub fn new(width: u32, height: u32, device_scale: f32) -> Self {
        Self {
            layers: Vec::new(),
            selected: None,
            width,
            height,
            device_scale,
            max_undo_steps: 0,
        }
    }

    /// "Background" plus "Layer 1", with "Layer 1" selected.
    pub fn with_default_layers(width: u32, height: u32, device_scale: f32, max_undo_steps: usize) -> Self {
        let mut state = Self::new(width, height, device_scale);
        state.max_undo_steps = max_undo_steps;
        state.add_layer(Some("Background"));
        state.add_layer(Some("Layer 1"));
        state
    }

    /// Append a layer on top and select it. Returns the new layer's id.
    pub fn add_layer(&mut self, name: Option<&str>) -> LayerId {
        let name = match name {
            Some(n) => n.to_string(),
            None => format!("Layer {}", self.layers.len() + 1),
        };
        let background = if self.layers.is_empty() { Some(BACKGROUND_WHITE) } else { None };
        let mut layer = Layer::new(
            name,
            self.width,
            self.height,
            self.device_scale,
            background,
            self.max_undo_steps,
        );
        layer.z_index = self.layers.len();
        let id = layer.id;
        crate::log_info!("Layer added: '{}' (z={})", layer.name, layer.z_index);
        self.layers.push(layer);
        self.selected = Some(id);
        id
    }

    /// Remove a layer, releasing its surface and history.
    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        let Some(index) = self.index_of(id) else { return false };
        let removed = self.layers.remove(index);
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.renumber();
        crate::log_info!("Layer removed: '{}'", removed.name);
        true
    }

    /// Flip visibility; returns the new state, `None` for an unknown id.
    pub fn toggle_visibility(&mut self, id: LayerId) -> Option<bool> {
        let layer = self.layer_mut(id)?;
        layer.visible = !layer.visible;
        Some(layer.visible)
    }

    pub fn select_layer(&mut self, id: LayerId) -> bool {
        if self.index_of(id).is_none() {
            return false;
        }
        self.selected = Some(id);
        true
    }

    /// Move a layer to `new_index` (clamped to the top), then rederive every z-index.
    pub fn reorder_layer(&mut self, id: LayerId, new_index: usize) -> bool {
        let Some(index) = self.index_of(id) else { return false };
        let layer = self.layers.remove(index);
        let insert_at = new_index.min(self.layers.len());
        self.layers.insert(insert_at, layer);
        self.renumber();
        crate::log_info!("Layer moved {} → {}", index, insert_at);
        true
    }

    fn renumber(&mut self) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.z_index = i;
        }
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer<S>> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer<S>> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn selected_layer(&self) -> Option<&Layer<S>> {
        self.selected.and_then(|id| self.layer(id))
    }

    pub fn selected_layer_mut(&mut self) -> Option<&mut Layer<S>> {
        let id = self.selected?;
        self.layer_mut(id)
    }

    /// The layer that receives strokes and fills: the selection, if visible.
    pub fn input_target_mut(&mut self) -> Option<&mut Layer<S>> {
        self.selected_layer_mut().filter(|l| l.visible)
    }

    /// Backing size shared by every layer surface.
    pub fn backing_size(&self) -> (u32, u32) {
        match self.layers.first() {
            Some(l) => (l.surface.width(), l.surface.height()),
            None => (
                (self.width as f32 * self.device_scale).round() as u32,
                (self.height as f32 * self.device_scale).round() as u32,
            ),
        }
    }

    /// Flatten visible layers back-to-front with normal blending.
    /// Rows are composited in parallel with rayon.
    pub fn composite(&self) -> RgbaImage {
        let (w, h) = self.backing_size();
        let expected = w as usize * h as usize * 4;
        let buffers: Vec<Vec<u8>> = self
            .layers
            .iter()
            .filter(|l| l.visible)
            .map(|l| l.surface.read_pixels())
            .filter(|buf| buf.len() == expected)
            .collect();

        let mut out = vec![0u8; expected];
        let stride = w as usize * 4;
        if stride > 0 {
            out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
                let row_start = y * stride;
                for buf in &buffers {
                    let src = &buf[row_start..row_start + stride];
                    for (dst, top) in row.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                        let base = Rgba([dst[0], dst[1], dst[2], dst[3]]);
                        let px = blend_over(base, Rgba([top[0], top[1], top[2], top[3]]), 1.0);
                        dst.copy_from_slice(&px.0);
                    }
                }
            });
        }

        RgbaImage::from_raw(w, h, out).unwrap_or_else(|| RgbaImage::new(w, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn blend_over_opaque_top_replaces_base() {
        assert_eq!(blend_over(BACKGROUND_WHITE, RED, 1.0), RED);
        assert_eq!(blend_over(RED, TRANSPARENT, 1.0), RED);
    }

    #[test]
    fn blend_over_half_opacity_mixes_channels() {
        let out = blend_over(BACKGROUND_WHITE, Rgba([0, 0, 0, 255]), 0.5);
        assert_eq!(out[3], 255);
        assert!((out[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn device_scale_sizes_backing_buffer() {
        let s = PixelSurface::with_size(10, 20, 2.0);
        assert_eq!((s.width(), s.height()), (20, 40));
        assert_eq!(s.device_scale(), (2.0, 2.0));
        assert_eq!(s.transform(), 2.0);
    }

    #[test]
    fn circle_covers_pixel_centres_inside_radius() {
        let mut s = PixelSurface::with_size(10, 10, 1.0);
        s.fill_circle(5.0, 5.0, 2.0, RED, 1.0);
        assert_eq!(s.pixel(5, 5), Some(RED.0));
        assert_eq!(s.pixel(4, 4), Some(RED.0));
        assert_eq!(s.pixel(5, 8), Some([0, 0, 0, 0]));
        assert_eq!(s.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn transform_scales_draw_calls_until_reset() {
        let mut s = PixelSurface::with_size(4, 4, 2.0);
        s.fill_rect(0.0, 0.0, 1.0, 1.0, RED, 1.0);
        // 1×1 display unit == 2×2 device pixels
        assert_eq!(s.pixel(1, 1), Some(RED.0));
        assert_eq!(s.pixel(2, 2), Some([0, 0, 0, 0]));

        s.reset_transform();
        s.clear_rect(0.0, 0.0, 1.0, 1.0);
        assert_eq!(s.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(s.pixel(1, 1), Some(RED.0));
    }

    #[test]
    fn draw_image_scales_source_into_rect() {
        let mut stamp = RgbaImage::new(2, 2);
        stamp.put_pixel(0, 0, RED);
        let mut s = PixelSurface::with_size(8, 8, 1.0);
        s.draw_image(&stamp, 0.0, 0.0, 4.0, 4.0, 1.0);
        assert_eq!(s.pixel(1, 1), Some(RED.0));
        assert_eq!(s.pixel(3, 3), Some([0, 0, 0, 0]));
    }

    #[test]
    fn write_pixels_refuses_wrong_length() {
        let mut s = PixelSurface::with_size(2, 2, 1.0);
        s.fill(RED);
        assert!(!s.write_pixels(&[0u8; 3]));
        assert_eq!(s.pixel(0, 0), Some(RED.0));
        assert!(s.write_pixels(&[0u8; 16]));
        assert_eq!(s.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn default_layers_have_white_background_and_select_top() {
        let state: CanvasState = CanvasState::with_default_layers(4, 4, 1.0, 0);
        assert_eq!(state.layers.len(), 2);
        assert_eq!(state.layers[0].name, "Background");
        assert_eq!(state.layers[0].surface.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(state.layers[1].surface.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(state.selected, Some(state.layers[1].id));
    }

    #[test]
    fn add_layer_defaults_name_and_z_index() {
        let mut state: CanvasState = CanvasState::with_default_layers(4, 4, 1.0, 0);
        let id = state.add_layer(None);
        let layer = state.layer(id).unwrap();
        assert_eq!(layer.name, "Layer 3");
        assert_eq!(layer.z_index, 2);
        assert_eq!(state.selected, Some(id));
    }

    #[test]
    fn reorder_rederives_z_index_from_position() {
        let mut state: CanvasState = CanvasState::with_default_layers(4, 4, 1.0, 0);
        let top = state.add_layer(Some("Top"));
        assert!(state.reorder_layer(top, 0));
        assert_eq!(state.layers[0].id, top);
        for (i, l) in state.layers.iter().enumerate() {
            assert_eq!(l.z_index, i);
        }
        // Past-the-end index lands on top
        assert!(state.reorder_layer(top, 99));
        assert_eq!(state.layers[2].id, top);
        assert!(!state.reorder_layer(Uuid::new_v4(), 0));
    }

    #[test]
    fn remove_selected_layer_clears_selection() {
        let mut state: CanvasState = CanvasState::with_default_layers(4, 4, 1.0, 0);
        let selected = state.selected.unwrap();
        assert!(state.remove_layer(selected));
        assert_eq!(state.selected, None);
        assert_eq!(state.layers.len(), 1);
        assert_eq!(state.layers[0].z_index, 0);
        assert!(!state.remove_layer(selected));
    }

    #[test]
    fn hidden_layer_receives_no_input_and_is_not_composited() {
        let mut state: CanvasState = CanvasState::with_default_layers(2, 2, 1.0, 0);
        let top = state.selected.unwrap();
        state.layer_mut(top).unwrap().surface.fill(RED);
        assert_eq!(state.composite().get_pixel(0, 0).0, RED.0);

        assert_eq!(state.toggle_visibility(top), Some(false));
        assert!(state.input_target_mut().is_none());
        assert_eq!(state.composite().get_pixel(0, 0).0, [255, 255, 255, 255]);
    }
}
