use image::RgbaImage;

use crate::canvas::{CanvasState, Layer, LayerId, PixelSurface, RenderSurface};
use crate::components::pressure::{PressureSettings, PressureSimulator, PressureStats};
use crate::components::tools::{Brush, Tool, draw_segment};
use crate::keymap::{BindableAction, Keymap, normalize_key};
use crate::ops::fill::{flood_fill_scanline, pixel_color};
use crate::settings::EngineSettings;
use crate::viewport::Viewport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PointerButton {
    #[default]
    Primary,
    Secondary,
    Middle,
}

/// One pointer sample from the host, in screen (display) coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub x: f32,
    pub y: f32,
    pub button: PointerButton,
    pub timestamp_ms: u64,
    /// Hardware pressure (0..1) when the device reports one.
    pub pressure: Option<f32>,
}

impl PointerEvent {
    pub fn primary(x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self {
            x,
            y,
            button: PointerButton::Primary,
            timestamp_ms,
            pressure: None,
        }
    }
}

/// Change notifications delivered to the listener after each mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorEvent {
    ViewportChanged,
    PixelsChanged { layer: LayerId },
    HistoryChanged { layer: LayerId },
    LayersChanged,
    ToolChanged(Tool),
    BrushChanged,
}

type Listener = Box<dyn FnMut(&EditorEvent) + Send>;

/// What the current pointer drag is doing. Panning and drawing never overlap.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Gesture {
    Idle,
    Panning { last_x: f32, last_y: f32 },
    Stroking { layer: LayerId, erase: bool },
}

/// The editing session: layers, viewport, brush, tool and input routing.
///
/// All mutation goes through `&mut self`; observers are told what changed
/// through [`set_listener`](Self::set_listener).
pub struct Editor<S: RenderSurface = PixelSurface> {
    pub canvas: CanvasState<S>,
    viewport: Viewport,
    brush: Brush,
    tool: Tool,
    pressure: PressureSimulator,
    keymap: Keymap,
    zoom_intensity: f32,
    space_held: bool,
    gesture: Gesture,
    listener: Option<Listener>,
}

impl Default for Editor<PixelSurface> {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Editor<PixelSurface> {
    pub fn new(settings: &EngineSettings) -> Self {
        Self::new_with_surface(settings)
    }

    /// Shorthand for a default-configured editor of the given size.
    pub fn with_size(width: u32, height: u32, device_scale: f32) -> Self {
        Self::new(&EngineSettings {
            canvas_width: width,
            canvas_height: height,
            device_scale,
            ..Default::default()
        })
    }
}

impl<S: RenderSurface> Editor<S> {
    /// Build an editor over any host surface type.
    pub fn new_with_surface(settings: &EngineSettings) -> Self {
        log_info!(
            "Editor created: {}x{} @ {}x",
            settings.canvas_width,
            settings.canvas_height,
            settings.device_scale
        );
        Self {
            canvas: CanvasState::with_default_layers(
                settings.canvas_width,
                settings.canvas_height,
                settings.device_scale,
                settings.max_undo_steps,
            ),
            viewport: Viewport::default(),
            brush: settings.brush.clone(),
            tool: Tool::default(),
            pressure: PressureSimulator::new(settings.pressure),
            keymap: settings.keymap.clone(),
            zoom_intensity: settings.zoom_intensity,
            space_held: false,
            gesture: Gesture::Idle,
            listener: None,
        }
    }

    // ========================================================================
    // OBSERVER
    // ========================================================================

    pub fn set_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&EditorEvent) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    fn emit(&mut self, event: EditorEvent) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&event);
        }
    }

    // ========================================================================
    // STATE ACCESSORS
    // ========================================================================

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        if self.tool == tool {
            return;
        }
        self.tool = tool;
        self.emit(EditorEvent::ToolChanged(tool));
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
        self.emit(EditorEvent::BrushChanged);
    }

    /// Edit the brush in place, then notify.
    pub fn update_brush(&mut self, f: impl FnOnce(&mut Brush)) {
        f(&mut self.brush);
        self.emit(EditorEvent::BrushChanged);
    }

    pub fn pressure_settings(&self) -> &PressureSettings {
        self.pressure.settings()
    }

    pub fn set_pressure_settings(&mut self, settings: PressureSettings) {
        self.pressure.set_settings(settings);
        self.emit(EditorEvent::BrushChanged);
    }

    pub fn set_force_constant_pressure(&mut self, force: bool) {
        self.pressure.set_force_constant(force);
    }

    pub fn force_constant_pressure(&self) -> bool {
        self.pressure.force_constant()
    }

    /// Statistics of the current (or most recent batch) stroke.
    pub fn pressure_stats(&self) -> PressureStats {
        self.pressure.stats()
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn keymap_mut(&mut self) -> &mut Keymap {
        &mut self.keymap
    }

    pub fn zoom_intensity(&self) -> f32 {
        self.zoom_intensity
    }

    pub fn set_zoom_intensity(&mut self, intensity: f32) {
        self.zoom_intensity = intensity;
    }

    pub fn space_held(&self) -> bool {
        self.space_held
    }

    pub fn is_panning(&self) -> bool {
        matches!(self.gesture, Gesture::Panning { .. })
    }

    pub fn is_stroking(&self) -> bool {
        matches!(self.gesture, Gesture::Stroking { .. })
    }

    // ========================================================================
    // VIEWPORT
    // ========================================================================

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.viewport.pan(dx, dy);
        self.emit(EditorEvent::ViewportChanged);
    }

    /// Wheel zoom at the pointer. Ignored while a stroke is in progress.
    pub fn wheel(&mut self, x: f32, y: f32, delta_y: f32) -> bool {
        if self.is_stroking() {
            return false;
        }
        self.viewport.zoom_at(x, y, delta_y, self.zoom_intensity);
        self.emit(EditorEvent::ViewportChanged);
        true
    }

    /// Screen → backing-pixel coordinates of the selected layer's surface.
    pub fn screen_to_surface(&self, x: f32, y: f32) -> (f32, f32) {
        let ratio = self
            .canvas
            .selected_layer()
            .or_else(|| self.canvas.layers.first())
            .map_or((self.canvas.device_scale, self.canvas.device_scale), |l| l.surface.device_scale());
        self.viewport.screen_to_surface(x, y, ratio)
    }

    // ========================================================================
    // POINTER INPUT
    // ========================================================================

    /// Returns `true` when the event started a pan, a stroke or a fill.
    pub fn pointer_down(&mut self, ev: &PointerEvent) -> bool {
        if self.gesture != Gesture::Idle {
            return false;
        }
        if self.tool == Tool::Hand || self.space_held {
            self.gesture = Gesture::Panning {
                last_x: ev.x,
                last_y: ev.y,
            };
            return true;
        }
        if ev.button != PointerButton::Primary {
            return false;
        }
        match self.tool {
            Tool::Fill => {
                let (sx, sy) = self.screen_to_surface(ev.x, ev.y);
                self.fill_at(sx, sy) > 0
            }
            Tool::Brush | Tool::Eraser => self.begin_stroke(ev),
            Tool::Select | Tool::Hand => false,
        }
    }

    fn begin_stroke(&mut self, ev: &PointerEvent) -> bool {
        let erase = self.tool == Tool::Eraser;
        let Some(layer) = self.canvas.input_target_mut() else { return false };
        if !layer.surface.is_ready() {
            return false;
        }
        let (sx, sy) = self.viewport.screen_to_surface(ev.x, ev.y, layer.surface.device_scale());
        layer.history.save_state(&layer.surface);
        let id = layer.id;

        self.pressure.begin();
        self.pressure.push_with_pressure(sx, sy, ev.timestamp_ms, ev.pressure);
        self.gesture = Gesture::Stroking { layer: id, erase };
        self.emit(EditorEvent::HistoryChanged { layer: id });
        true
    }

    /// Continue the active pan or stroke.
    pub fn pointer_move(&mut self, ev: &PointerEvent) -> bool {
        match self.gesture {
            Gesture::Idle => false,
            Gesture::Panning { last_x, last_y } => {
                self.viewport.pan(ev.x - last_x, ev.y - last_y);
                self.gesture = Gesture::Panning {
                    last_x: ev.x,
                    last_y: ev.y,
                };
                self.emit(EditorEvent::ViewportChanged);
                true
            }
            Gesture::Stroking { layer, erase } => {
                let Some(prev) = self.pressure.last().copied() else { return false };
                let zoom = self.viewport.scale();
                let Some(target) = self.canvas.layer_mut(layer) else { return false };
                if !target.visible {
                    return false;
                }
                let ratio = target.surface.device_scale();
                let (sx, sy) = self.viewport.screen_to_surface(ev.x, ev.y, ratio);
                let sample = self.pressure.push_with_pressure(sx, sy, ev.timestamp_ms, ev.pressure);
                draw_segment(&mut target.surface, &prev, &sample, &self.brush, zoom, ratio.0, erase);
                self.emit(EditorEvent::PixelsChanged { layer });
                true
            }
        }
    }

    /// End the active pan or stroke.
    pub fn pointer_up(&mut self, _ev: &PointerEvent) -> bool {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle => false,
            Gesture::Panning { .. } => true,
            Gesture::Stroking { .. } => {
                self.pressure.end();
                true
            }
        }
    }

    // ========================================================================
    // KEYBOARD
    // ========================================================================

    /// Feed a key press through the keymap and run the bound action.
    pub fn key_down(&mut self, key: &str, repeat: bool) -> Option<BindableAction> {
        if normalize_key(key) == "space" {
            self.space_held = true;
        }
        let action = self.keymap.key_down(key, repeat)?;
        self.run_action(action);
        Some(action)
    }

    pub fn key_up(&mut self, key: &str) {
        if normalize_key(key) == "space" {
            self.space_held = false;
        }
        self.keymap.key_up(key);
    }

    /// Focus lost: forget held keys.
    pub fn blur(&mut self) {
        self.keymap.blur();
        self.space_held = false;
    }

    pub fn run_action(&mut self, action: BindableAction) {
        match action {
            BindableAction::Undo => {
                self.undo();
            }
            BindableAction::Redo => {
                self.redo();
            }
            _ => {
                if let Some(tool) = action.tool() {
                    self.set_tool(tool);
                }
            }
        }
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    pub fn can_undo(&self) -> bool {
        self.canvas.selected_layer().is_some_and(|l| l.history.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.canvas.selected_layer().is_some_and(|l| l.history.can_redo())
    }

    /// Change the per-layer undo limit (0 = unlimited). Existing histories are
    /// pruned right away and layers added later inherit the limit.
    pub fn set_max_undo_steps(&mut self, max_steps: usize) {
        self.canvas.max_undo_steps = max_steps;
        for layer in &mut self.canvas.layers {
            layer.history.set_limit(max_steps);
        }
    }

    /// Undo the selected layer's last edit. No-op at the floor or mid-stroke.
    pub fn undo(&mut self) -> bool {
        if self.is_stroking() {
            return false;
        }
        let Some(layer) = self.canvas.selected_layer_mut() else { return false };
        let id = layer.id;
        if !layer.history.undo(&mut layer.surface) {
            log_info!("Undo: nothing to undo on '{}'", layer.name);
            return false;
        }
        self.emit(EditorEvent::HistoryChanged { layer: id });
        self.emit(EditorEvent::PixelsChanged { layer: id });
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.is_stroking() {
            return false;
        }
        let Some(layer) = self.canvas.selected_layer_mut() else { return false };
        let id = layer.id;
        if !layer.history.redo(&mut layer.surface) {
            log_info!("Redo: nothing to redo on '{}'", layer.name);
            return false;
        }
        self.emit(EditorEvent::HistoryChanged { layer: id });
        self.emit(EditorEvent::PixelsChanged { layer: id });
        true
    }

    // ========================================================================
    // EDITS IN SURFACE SPACE
    // ========================================================================

    /// Flood-fill the selected layer at backing-pixel `(x, y)` with the brush
    /// colour. Returns the number of pixels recoloured.
    pub fn fill_at(&mut self, x: f32, y: f32) -> usize {
        let color = self.brush.effective_color().0;
        let Some(layer) = self.canvas.input_target_mut() else { return 0 };
        if !layer.surface.is_ready() {
            return 0;
        }
        let (w, h) = (layer.surface.width(), layer.surface.height());
        if !(x >= 0.0 && y >= 0.0 && x < w as f32 && y < h as f32) {
            log_info!("Fill skipped: seed ({:.1}, {:.1}) outside {}x{}", x, y, w, h);
            return 0;
        }
        let (px, py) = (x.floor() as u32, y.floor() as u32);

        let mut data = layer.surface.read_pixels();
        let Some(target) = pixel_color(&data, w, px, py) else { return 0 };
        if target == color {
            log_info!("Fill skipped: region already has the fill colour");
            return 0;
        }

        layer.history.save_state(&layer.surface);
        let filled = flood_fill_scanline(&mut data, w, h, px, py, target, color);
        if !layer.surface.write_pixels(&data) {
            log_warn!("Fill: surface refused the filled buffer");
        }
        let id = layer.id;
        self.emit(EditorEvent::HistoryChanged { layer: id });
        self.emit(EditorEvent::PixelsChanged { layer: id });
        filled
    }

    /// Draw a whole stroke given in backing-pixel space as `(x, y, t_ms)`.
    ///
    /// Pressure is simulated over the complete path, so the end taper applies.
    /// Uses the eraser when the eraser tool is active. Returns the stamp count.
    pub fn stroke_path(&mut self, points: &[(f32, f32, u64)]) -> usize {
        if points.is_empty() || self.gesture != Gesture::Idle {
            return 0;
        }
        let erase = self.tool == Tool::Eraser;
        let zoom = self.viewport.scale();
        let Some(layer) = self.canvas.input_target_mut() else { return 0 };
        if !layer.surface.is_ready() {
            return 0;
        }

        let samples = self.pressure.simulate(points);
        layer.history.save_state(&layer.surface);
        let device_scale = layer.surface.device_scale().0;

        let mut stamps = 0;
        if let [only] = samples.as_slice() {
            stamps += draw_segment(&mut layer.surface, only, only, &self.brush, zoom, device_scale, erase);
        } else {
            for pair in samples.windows(2) {
                stamps += draw_segment(&mut layer.surface, &pair[0], &pair[1], &self.brush, zoom, device_scale, erase);
            }
        }

        let id = layer.id;
        self.emit(EditorEvent::HistoryChanged { layer: id });
        self.emit(EditorEvent::PixelsChanged { layer: id });
        stamps
    }

    // ========================================================================
    // LAYERS
    // ========================================================================

    pub fn layers(&self) -> &[Layer<S>] {
        &self.canvas.layers
    }

    pub fn selected_layer_id(&self) -> Option<LayerId> {
        self.canvas.selected
    }

    /// Id of the layer at stack position `index` (0 = bottom).
    pub fn layer_id_at(&self, index: usize) -> Option<LayerId> {
        self.canvas.layers.get(index).map(|l| l.id)
    }

    pub fn add_layer(&mut self, name: Option<&str>) -> LayerId {
        let id = self.canvas.add_layer(name);
        self.emit(EditorEvent::LayersChanged);
        id
    }

    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        if let Gesture::Stroking { layer, .. } = self.gesture
            && layer == id
        {
            self.pressure.end();
            self.gesture = Gesture::Idle;
        }
        let removed = self.canvas.remove_layer(id);
        if removed {
            self.emit(EditorEvent::LayersChanged);
        }
        removed
    }

    pub fn toggle_visibility(&mut self, id: LayerId) -> Option<bool> {
        let visible = self.canvas.toggle_visibility(id)?;
        self.emit(EditorEvent::LayersChanged);
        Some(visible)
    }

    pub fn select_layer(&mut self, id: LayerId) -> bool {
        let ok = self.canvas.select_layer(id);
        if ok {
            self.emit(EditorEvent::LayersChanged);
        }
        ok
    }

    pub fn reorder_layer(&mut self, id: LayerId, new_index: usize) -> bool {
        let ok = self.canvas.reorder_layer(id, new_index);
        if ok {
            self.emit(EditorEvent::LayersChanged);
        }
        ok
    }

    /// Flatten the visible layers into one image at backing resolution.
    pub fn composite(&self) -> RgbaImage {
        self.canvas.composite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::{Arc, Mutex};

    fn editor() -> Editor {
        Editor::with_size(40, 30, 1.0)
    }

    fn top_pixel(ed: &Editor, x: u32, y: u32) -> Option<[u8; 4]> {
        ed.canvas.selected_layer().and_then(|l| l.surface.pixel(x, y))
    }

    #[test]
    fn starts_with_background_and_layer_one() {
        let ed = editor();
        assert_eq!(ed.layers().len(), 2);
        assert_eq!(ed.layers()[1].name, "Layer 1");
        assert_eq!(ed.selected_layer_id(), ed.layer_id_at(1));
        assert_eq!(ed.tool(), Tool::Brush);
    }

    #[test]
    fn drag_paints_and_undo_restores() {
        let mut ed = editor();
        ed.set_force_constant_pressure(true);
        let before = ed.canvas.selected_layer().unwrap().surface.read_pixels();

        assert!(ed.pointer_down(&PointerEvent::primary(5.0, 10.0, 0)));
        // No stamp on pointer-down
        assert_eq!(top_pixel(&ed, 5, 10), Some([0, 0, 0, 0]));
        assert!(ed.pointer_move(&PointerEvent::primary(25.0, 10.0, 16)));
        assert!(ed.pointer_up(&PointerEvent::primary(25.0, 10.0, 20)));
        assert_eq!(top_pixel(&ed, 10, 10).map(|p| p[3]), Some(255));

        assert!(ed.undo());
        assert_eq!(ed.canvas.selected_layer().unwrap().surface.read_pixels(), before);
        assert!(ed.redo());
        assert_eq!(top_pixel(&ed, 10, 10).map(|p| p[3]), Some(255));
    }

    #[test]
    fn hand_tool_and_space_pan_instead_of_drawing() {
        let mut ed = editor();
        ed.set_tool(Tool::Hand);
        ed.pointer_down(&PointerEvent::primary(0.0, 0.0, 0));
        ed.pointer_move(&PointerEvent::primary(7.0, -3.0, 5));
        ed.pointer_up(&PointerEvent::primary(7.0, -3.0, 6));
        assert_eq!((ed.viewport().offset_x, ed.viewport().offset_y), (7.0, -3.0));

        ed.set_tool(Tool::Brush);
        ed.key_down(" ", false);
        assert!(ed.space_held());
        ed.pointer_down(&PointerEvent::primary(10.0, 10.0, 10));
        assert!(ed.is_panning());
        ed.pointer_move(&PointerEvent::primary(12.0, 10.0, 11));
        ed.pointer_up(&PointerEvent::primary(12.0, 10.0, 12));
        assert_eq!(ed.viewport().offset_x, 9.0);
        assert_eq!(ed.canvas.selected_layer().unwrap().history.undo_count(), 0);

        ed.key_up("Space");
        assert!(!ed.space_held());
    }

    #[test]
    fn wheel_is_ignored_mid_stroke() {
        let mut ed = editor();
        ed.pointer_down(&PointerEvent::primary(5.0, 5.0, 0));
        assert!(!ed.wheel(5.0, 5.0, -1.0));
        ed.pointer_up(&PointerEvent::primary(5.0, 5.0, 1));
        assert!(ed.wheel(5.0, 5.0, -1.0));
        assert!(ed.viewport().scale() > 1.0);
    }

    #[test]
    fn fill_tool_uses_brush_colour_and_skips_same_colour() {
        let mut ed = editor();
        ed.update_brush(|b| {
            b.color = Rgba([0, 0, 255, 255]);
            b.opacity = 0.5;
        });
        ed.set_tool(Tool::Fill);
        assert!(ed.pointer_down(&PointerEvent::primary(3.0, 3.0, 0)));
        assert_eq!(top_pixel(&ed, 39, 29), Some([0, 0, 255, 128]));
        assert_eq!(ed.canvas.selected_layer().unwrap().history.undo_count(), 1);

        // Same colour again: no work and no extra snapshot
        assert!(!ed.pointer_down(&PointerEvent::primary(3.0, 3.0, 1)));
        assert_eq!(ed.canvas.selected_layer().unwrap().history.undo_count(), 1);
    }

    #[test]
    fn hidden_or_missing_layer_refuses_input() {
        let mut ed = editor();
        let id = ed.selected_layer_id().unwrap();
        ed.toggle_visibility(id);
        assert!(!ed.pointer_down(&PointerEvent::primary(5.0, 5.0, 0)));
        assert_eq!(ed.fill_at(1.0, 1.0), 0);

        ed.toggle_visibility(id);
        ed.remove_layer(id);
        assert_eq!(ed.selected_layer_id(), None);
        assert!(!ed.pointer_down(&PointerEvent::primary(5.0, 5.0, 0)));
    }

    #[test]
    fn secondary_button_does_not_draw() {
        let mut ed = editor();
        let ev = PointerEvent {
            button: PointerButton::Secondary,
            ..PointerEvent::primary(5.0, 5.0, 0)
        };
        assert!(!ed.pointer_down(&ev));
        assert!(!ed.is_stroking());
    }

    #[test]
    fn keyboard_drives_undo_and_tools() {
        let mut ed = editor();
        ed.fill_at(0.0, 0.0);
        assert_eq!(ed.key_down("e", false), Some(BindableAction::ToolEraser));
        assert_eq!(ed.tool(), Tool::Eraser);
        ed.key_up("e");

        ed.key_down("Control", false);
        assert_eq!(ed.key_down("z", false), Some(BindableAction::Undo));
        assert_eq!(top_pixel(&ed, 0, 0), Some([0, 0, 0, 0]));
        ed.key_up("z");
        ed.key_down("y", false);
        assert_eq!(top_pixel(&ed, 0, 0).map(|p| p[3]), Some(255));
    }

    #[test]
    fn zoomed_viewport_maps_pointer_to_surface() {
        let mut ed = editor();
        ed.wheel(0.0, 0.0, -1.0);
        ed.pan(10.0, 0.0);
        let (sx, sy) = ed.screen_to_surface(10.0 + 21.0, 10.5);
        assert!((sx - 20.0).abs() < 1e-3);
        assert!((sy - 10.0).abs() < 1e-3);
    }

    #[test]
    fn listener_sees_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut ed = editor();
        ed.set_listener(move |ev| sink.lock().unwrap().push(ev.clone()));

        ed.set_tool(Tool::Fill);
        ed.fill_at(1.0, 1.0);
        ed.pan(1.0, 1.0);
        ed.add_layer(None);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], EditorEvent::ToolChanged(Tool::Fill));
        assert!(matches!(seen[1], EditorEvent::HistoryChanged { .. }));
        assert!(matches!(seen[2], EditorEvent::PixelsChanged { .. }));
        assert_eq!(seen[3], EditorEvent::ViewportChanged);
        assert_eq!(seen[4], EditorEvent::LayersChanged);
    }

    #[test]
    fn stroke_path_tapers_and_records_history() {
        let mut ed = editor();
        let points: Vec<(f32, f32, u64)> = (0..20).map(|i| (i as f32 * 2.0, 15.0, i as u64 * 4)).collect();
        let stamps = ed.stroke_path(&points);
        assert!(stamps >= 38);
        assert_eq!(ed.canvas.selected_layer().unwrap().history.undo_count(), 1);
        let stats = ed.pressure_stats();
        assert_eq!(stats.samples, 20);
        assert_eq!(stats.min_pressure, 0.2);
    }

    #[test]
    fn undo_limit_applies_to_existing_layers() {
        let mut ed = Editor::with_size(4, 4, 1.0);
        assert!(!ed.can_undo());
        ed.set_max_undo_steps(2);
        for c in [10u8, 20, 30] {
            ed.update_brush(|b| b.color = Rgba([c, 0, 0, 255]));
            assert_eq!(ed.fill_at(0.0, 0.0), 16);
        }
        assert_eq!(ed.canvas.selected_layer().unwrap().history.undo_count(), 2);
        assert!(ed.undo());
        assert!(ed.undo());
        assert!(!ed.can_undo());
        assert!(ed.can_redo());
        // The first fill fell off the limit, so its result is the oldest state left
        assert_eq!(top_pixel(&ed, 0, 0), Some([10, 0, 0, 255]));

        let id = ed.add_layer(None);
        assert_eq!(ed.canvas.layer(id).unwrap().history.undo_count(), 0);
        assert_eq!(ed.canvas.max_undo_steps, 2);
    }
}
