// ============================================================================
// Session scripting: Rhai-based sandboxed replay of editing sessions
// ============================================================================
//
// A session script drives an `Editor` the way a user would: pick tools, tweak
// the brush, draw strokes, fill, pan/zoom, press keys, undo/redo and manage
// layers. The headless CLI runs these scripts and exports the composite.

use image::Rgba;
use rhai::{AST, Array, Dynamic, Engine, EvalAltResult, ImmutableString, Scope};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::app::{Editor, PointerEvent};
use crate::canvas::LayerId;
use crate::components::pressure::PressureSettings;
use crate::components::tools::{BrushShape, Tool};

/// Editor shared between the host and the script's registered functions.
pub type SharedEditor = Arc<Mutex<Editor>>;

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// Default spacing between timestamps of `stroke` points given as `[x, y]`.
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 16;

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScriptError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl ScriptError {
    fn from_rhai(message: String, pos: rhai::Position) -> Self {
        Self {
            message,
            line: pos.line().filter(|&l| l > 0),
            column: pos.position().filter(|&c| c > 0),
        }
    }

    /// Error explanation with line/column context and a hint where one helps.
    pub fn friendly_message(&self) -> String {
        let raw = &self.message;
        let cleaned = raw.split(" (line ").next().unwrap_or(raw);
        let mut parts = Vec::new();

        match (self.line, self.column) {
            (Some(line), Some(col)) => parts.push(format!("Error on line {}, column {}:", line, col)),
            (Some(line), None) => parts.push(format!("Error on line {}:", line)),
            _ => parts.push("Script error:".to_string()),
        }

        if raw.contains("Function not found:") {
            let fn_desc = raw
                .strip_prefix("Function not found: ")
                .map(|p| p.split(" (line ").next().unwrap_or(p))
                .unwrap_or(cleaned);
            parts.push(format!("  Could not find function: {}", fn_desc.trim()));
            parts.push(String::new());
            parts.push("  Tip: Check the name and argument count, e.g. stroke([[0, 0], [10, 0]]),".to_string());
            parts.push("  fill(x, y), brush_color(r, g, b, a), tool(\"eraser\").".to_string());
        } else if raw.contains("Variable not found:") {
            let var_name = raw
                .split("Variable not found:")
                .nth(1)
                .map(|v| v.split('(').next().unwrap_or(v).trim())
                .unwrap_or(cleaned);
            parts.push(format!("  Variable '{}' is not defined.", var_name));
            parts.push(String::new());
            parts.push("  Tip: Declare it with 'let' before using it.".to_string());
        } else if raw.contains("Syntax error") || raw.contains("Expected") {
            parts.push(format!("  Syntax error: {}", cleaned));
            parts.push(String::new());
            parts.push("  Tip: Check for missing semicolons, brackets, or typos near this line.".to_string());
        } else if raw.contains("Too many operations") {
            parts.push("  Script exceeded the maximum operation limit.".to_string());
            parts.push(String::new());
            parts.push("  Tip: Your script may contain an infinite loop.".to_string());
        } else {
            parts.push(format!("  {}", cleaned));
        }

        parts.join("\n")
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "Line {}, Col {}: {}", line, col, self.message)
        } else if let Some(line) = self.line {
            write!(f, "Line {}: {}", line, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ScriptError {}

// ============================================================================
// Helpers
// ============================================================================

fn lock(editor: &SharedEditor) -> MutexGuard<'_, Editor> {
    editor.lock().unwrap_or_else(|e| e.into_inner())
}

/// Accept both ints and floats wherever a number is expected.
fn num(v: &Dynamic, what: &str) -> RhaiResult<f32> {
    if let Ok(f) = v.as_float() {
        return Ok(f as f32);
    }
    if let Ok(i) = v.as_int() {
        return Ok(i as f32);
    }
    Err(format!("{}: expected a number, got {}", what, v.type_name()).into())
}

fn channel(v: i64) -> u8 {
    v.clamp(0, 255) as u8
}

fn layer_at(ed: &Editor, index: i64) -> RhaiResult<LayerId> {
    usize::try_from(index)
        .ok()
        .and_then(|i| ed.layer_id_at(i))
        .ok_or_else(|| format!("no layer at index {} ({} layers)", index, ed.layers().len()).into())
}

/// `[x, y]` or `[x, y, t]` entries; missing timestamps are spaced evenly.
fn parse_points(points: &Array) -> RhaiResult<Vec<(f32, f32, u64)>> {
    let mut out = Vec::with_capacity(points.len());
    for (i, item) in points.iter().enumerate() {
        if !item.is_array() {
            return Err(format!("stroke: point {} is not an array", i).into());
        }
        let p = item.clone().cast::<Array>();
        if p.len() < 2 {
            return Err(format!("stroke: point {} needs at least [x, y]", i).into());
        }
        let x = num(&p[0], "stroke x")?;
        let y = num(&p[1], "stroke y")?;
        let t = match p.get(2) {
            Some(t) => num(t, "stroke t")?.max(0.0) as u64,
            None => i as u64 * DEFAULT_SAMPLE_INTERVAL_MS,
        };
        out.push((x, y, t));
    }
    Ok(out)
}

// ============================================================================
// Engine construction with full sandbox + API registration
// ============================================================================

/// Create a sandboxed Rhai engine driving `editor`. `print` output is
/// appended to `console`.
fn create_engine(editor: SharedEditor, console: Arc<Mutex<Vec<String>>>) -> Engine {
    let mut engine = Engine::new();

    // ── Sandbox limits ──
    engine.set_max_operations(50_000_000);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(100_000);
    engine.set_max_map_size(1_000);

    engine.on_print(move |msg| {
        console.lock().unwrap_or_else(|e| e.into_inner()).push(msg.to_string());
    });

    register_canvas_api(&mut engine, editor.clone());
    register_brush_api(&mut engine, editor.clone());
    register_input_api(&mut engine, editor.clone());
    register_layer_api(&mut engine, editor);

    engine
}

// ============================================================================
// Canvas info + edits
// ============================================================================

fn register_canvas_api(engine: &mut Engine, editor: SharedEditor) {
    let ed = editor.clone();
    engine.register_fn("width", move || -> i64 { lock(&ed).canvas.backing_size().0 as i64 });

    let ed = editor.clone();
    engine.register_fn("height", move || -> i64 { lock(&ed).canvas.backing_size().1 as i64 });

    let ed = editor.clone();
    engine.register_fn("zoom", move || -> f64 { lock(&ed).viewport().scale() as f64 });

    // stroke([[x, y, t], ...]): surface-space path, whole-stroke pressure
    let ed = editor.clone();
    engine.register_fn("stroke", move |points: Array| -> RhaiResult<i64> {
        let points = parse_points(&points)?;
        Ok(lock(&ed).stroke_path(&points) as i64)
    });

    let ed = editor.clone();
    engine.register_fn("fill", move |x: Dynamic, y: Dynamic| -> RhaiResult<i64> {
        let (x, y) = (num(&x, "fill x")?, num(&y, "fill y")?);
        Ok(lock(&ed).fill_at(x, y) as i64)
    });

    let ed = editor.clone();
    engine.register_fn("undo", move || -> bool { lock(&ed).undo() });

    let ed = editor.clone();
    engine.register_fn("redo", move || -> bool { lock(&ed).redo() });

    let ed = editor.clone();
    engine.register_fn("undo_count", move || -> i64 {
        let ed = lock(&ed);
        ed.canvas.selected_layer().map_or(0, |l| l.history.undo_count() as i64)
    });

    let ed = editor.clone();
    engine.register_fn("can_undo", move || -> bool { lock(&ed).can_undo() });

    let ed = editor.clone();
    engine.register_fn("can_redo", move || -> bool { lock(&ed).can_redo() });

    // max_undo(n): per-layer undo limit, 0 = unlimited
    let ed = editor.clone();
    engine.register_fn("max_undo", move |n: i64| {
        lock(&ed).set_max_undo_steps(n.max(0) as usize);
    });

    // pixel(x, y): composited colour as [r, g, b, a]
    let ed = editor;
    engine.register_fn("pixel", move |x: i64, y: i64| -> Array {
        let image = lock(&ed).composite();
        if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
            return Array::new();
        }
        let px = image.get_pixel(x as u32, y as u32);
        px.0.iter().map(|&c| Dynamic::from(c as i64)).collect()
    });
}

// ============================================================================
// Tool, brush and pressure settings
// ============================================================================

fn register_brush_api(engine: &mut Engine, editor: SharedEditor) {
    let ed = editor.clone();
    engine.register_fn("tool", move |name: ImmutableString| -> RhaiResult<()> {
        let tool = Tool::from_name(&name).ok_or_else(|| format!("unknown tool '{}'", name))?;
        lock(&ed).set_tool(tool);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("brush_size", move |n: Dynamic| -> RhaiResult<()> {
        let size = num(&n, "brush_size")?;
        if size <= 0.0 {
            return Err("brush_size must be greater than 0".into());
        }
        lock(&ed).update_brush(|b| b.size = size);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("brush_color", move |r: i64, g: i64, b: i64, a: i64| {
        let color = Rgba([channel(r), channel(g), channel(b), channel(a)]);
        lock(&ed).update_brush(|brush| brush.color = color);
    });

    let ed = editor.clone();
    engine.register_fn("brush_opacity", move |x: Dynamic| -> RhaiResult<()> {
        let opacity = num(&x, "brush_opacity")?.clamp(0.0, 1.0);
        lock(&ed).update_brush(|b| b.opacity = opacity);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("brush_shape", move |name: ImmutableString| -> RhaiResult<()> {
        let shape = BrushShape::from_name(&name).ok_or_else(|| format!("unknown brush shape '{}'", name))?;
        lock(&ed).update_brush(|b| b.shape = shape);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("brush_spacing", move |x: Dynamic| -> RhaiResult<()> {
        let spacing = num(&x, "brush_spacing")?;
        if spacing <= 0.0 {
            return Err("brush_spacing must be greater than 0".into());
        }
        lock(&ed).update_brush(|b| b.spacing = spacing);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("pressure_enabled", move |on: bool| {
        let mut ed = lock(&ed);
        let settings = *ed.pressure_settings();
        ed.set_pressure_settings(PressureSettings {
            enable_pressure: on,
            ..settings
        });
    });

    let ed = editor.clone();
    engine.register_fn("force_pressure", move |on: bool| {
        lock(&ed).set_force_constant_pressure(on);
    });

    let ed = editor.clone();
    engine.register_fn("pressure_range", move |min: Dynamic, max: Dynamic| -> RhaiResult<()> {
        let (lo, hi) = (num(&min, "pressure_range min")?, num(&max, "pressure_range max")?);
        let mut ed = lock(&ed);
        let mut settings = *ed.pressure_settings();
        settings.min_pressure = lo;
        settings.max_pressure = hi;
        ed.set_pressure_settings(settings);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("pressure_sensitivity", move |x: Dynamic| -> RhaiResult<()> {
        let v = num(&x, "pressure_sensitivity")?;
        let mut ed = lock(&ed);
        let mut settings = *ed.pressure_settings();
        settings.pressure_sensitivity = v;
        ed.set_pressure_settings(settings);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("velocity_influence", move |x: Dynamic| -> RhaiResult<()> {
        let v = num(&x, "velocity_influence")?;
        let mut ed = lock(&ed);
        let mut settings = *ed.pressure_settings();
        settings.velocity_influence = v;
        ed.set_pressure_settings(settings);
        Ok(())
    });

    let ed = editor;
    engine.register_fn("taper", move |start: bool, end: bool| {
        let mut ed = lock(&ed);
        let mut settings = *ed.pressure_settings();
        settings.taper_start = start;
        settings.taper_end = end;
        ed.set_pressure_settings(settings);
    });
}

// ============================================================================
// Pointer, wheel and keyboard input (screen space)
// ============================================================================

fn register_input_api(engine: &mut Engine, editor: SharedEditor) {
    fn event(x: &Dynamic, y: &Dynamic, t: i64) -> RhaiResult<PointerEvent> {
        Ok(PointerEvent::primary(num(x, "pointer x")?, num(y, "pointer y")?, t.max(0) as u64))
    }

    let ed = editor.clone();
    engine.register_fn("pointer_down", move |x: Dynamic, y: Dynamic, t: i64| -> RhaiResult<bool> {
        Ok(lock(&ed).pointer_down(&event(&x, &y, t)?))
    });

    let ed = editor.clone();
    engine.register_fn("pointer_move", move |x: Dynamic, y: Dynamic, t: i64| -> RhaiResult<bool> {
        Ok(lock(&ed).pointer_move(&event(&x, &y, t)?))
    });

    let ed = editor.clone();
    engine.register_fn("pointer_up", move |x: Dynamic, y: Dynamic, t: i64| -> RhaiResult<bool> {
        Ok(lock(&ed).pointer_up(&event(&x, &y, t)?))
    });

    let ed = editor.clone();
    engine.register_fn("wheel", move |x: Dynamic, y: Dynamic, delta: Dynamic| -> RhaiResult<bool> {
        let (x, y, d) = (num(&x, "wheel x")?, num(&y, "wheel y")?, num(&delta, "wheel delta")?);
        Ok(lock(&ed).wheel(x, y, d))
    });

    let ed = editor.clone();
    engine.register_fn("pan", move |dx: Dynamic, dy: Dynamic| -> RhaiResult<()> {
        let (dx, dy) = (num(&dx, "pan dx")?, num(&dy, "pan dy")?);
        lock(&ed).pan(dx, dy);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("key_down", move |key: ImmutableString| -> bool { lock(&ed).key_down(&key, false).is_some() });

    let ed = editor;
    engine.register_fn("key_up", move |key: ImmutableString| {
        lock(&ed).key_up(&key);
    });
}

// ============================================================================
// Layers (addressed by stack index, 0 = bottom)
// ============================================================================

fn register_layer_api(engine: &mut Engine, editor: SharedEditor) {
    let ed = editor.clone();
    engine.register_fn("layer_count", move || -> i64 { lock(&ed).layers().len() as i64 });

    let ed = editor.clone();
    engine.register_fn("selected_layer", move || -> i64 {
        let ed = lock(&ed);
        ed.selected_layer_id()
            .and_then(|id| ed.canvas.index_of(id))
            .map_or(-1, |i| i as i64)
    });

    let ed = editor.clone();
    engine.register_fn("add_layer", move || -> i64 {
        let mut ed = lock(&ed);
        let id = ed.add_layer(None);
        ed.canvas.index_of(id).map_or(-1, |i| i as i64)
    });

    let ed = editor.clone();
    engine.register_fn("add_layer", move |name: ImmutableString| -> i64 {
        let mut ed = lock(&ed);
        let id = ed.add_layer(Some(&name));
        ed.canvas.index_of(id).map_or(-1, |i| i as i64)
    });

    let ed = editor.clone();
    engine.register_fn("remove_layer", move |index: i64| -> RhaiResult<()> {
        let mut ed = lock(&ed);
        let id = layer_at(&ed, index)?;
        ed.remove_layer(id);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("select_layer", move |index: i64| -> RhaiResult<()> {
        let mut ed = lock(&ed);
        let id = layer_at(&ed, index)?;
        ed.select_layer(id);
        Ok(())
    });

    let ed = editor.clone();
    engine.register_fn("toggle_layer", move |index: i64| -> RhaiResult<bool> {
        let mut ed = lock(&ed);
        let id = layer_at(&ed, index)?;
        Ok(ed.toggle_visibility(id).unwrap_or(false))
    });

    let ed = editor;
    engine.register_fn("move_layer", move |index: i64, new_index: i64| -> RhaiResult<()> {
        let mut ed = lock(&ed);
        let id = layer_at(&ed, index)?;
        ed.reorder_layer(id, new_index.max(0) as usize);
        Ok(())
    });
}

// ============================================================================
// Public API
// ============================================================================

/// Compile a session script without running it.
pub fn compile_session_script(source: &str) -> Result<AST, ScriptError> {
    let engine = create_engine(Arc::new(Mutex::new(Editor::with_size(0, 0, 1.0))), Arc::default());
    engine
        .compile(source)
        .map_err(|e| ScriptError::from_rhai(e.to_string(), e.position()))
}

/// Run `source` against `editor`. Returns the captured `print` output.
pub fn execute_session_script(source: &str, editor: SharedEditor) -> Result<Vec<String>, ScriptError> {
    let console: Arc<Mutex<Vec<String>>> = Arc::default();
    let engine = create_engine(editor, console.clone());
    let mut scope = Scope::new();

    let ast = engine
        .compile(source)
        .map_err(|e| ScriptError::from_rhai(e.to_string(), e.position()))?;

    engine
        .run_ast_with_scope(&mut scope, &ast)
        .map_err(|e| ScriptError::from_rhai(e.to_string(), e.position()))?;

    let output = console.lock().unwrap_or_else(|e| e.into_inner()).clone();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(w: u32, h: u32) -> SharedEditor {
        Arc::new(Mutex::new(Editor::with_size(w, h, 1.0)))
    }

    #[test]
    fn print_output_is_captured() {
        let out = execute_session_script(r#"print("w=" + width()); print(layer_count());"#, shared(12, 8)).unwrap();
        assert_eq!(out, vec!["w=12".to_string(), "2".to_string()]);
    }

    #[test]
    fn fill_and_undo_from_script() {
        let ed = shared(8, 8);
        execute_session_script(
            r#"
            brush_color(255, 0, 0, 255);
            let n = fill(1, 1);
            if n != 64 { throw "expected 64, got " + n; }
            "#,
            ed.clone(),
        )
        .unwrap();
        assert_eq!(lock(&ed).composite().get_pixel(3, 3).0, [255, 0, 0, 255]);

        execute_session_script("undo();", ed.clone()).unwrap();
        assert_eq!(lock(&ed).composite().get_pixel(3, 3).0, [255, 255, 255, 255]);
    }

    #[test]
    fn history_queries_and_limit_from_script() {
        let ed = shared(4, 4);
        let out = execute_session_script(
            r#"
            print(can_undo());
            max_undo(1);
            brush_color(1, 2, 3, 255);
            fill(0, 0);
            brush_color(4, 5, 6, 255);
            fill(0, 0);
            print(undo_count());
            undo();
            print(can_undo());
            print(can_redo());
            "#,
            ed,
        )
        .unwrap();
        assert_eq!(out, vec!["false", "1", "false", "true"]);
    }

    #[test]
    fn stroke_accepts_ints_floats_and_missing_timestamps() {
        let ed = shared(32, 32);
        let out = execute_session_script(
            r#"
            force_pressure(true);
            brush_color(0, 0, 0, 255);
            print(stroke([[2, 16], [20.5, 16.0], [28, 16, 100]]));
            let p = pixel(10, 16);
            print(p[3]);
            "#,
            ed,
        )
        .unwrap();
        assert!(out[0].parse::<i64>().unwrap() >= 26);
        assert_eq!(out[1], "255");
    }

    #[test]
    fn layer_management_by_index() {
        let out = execute_session_script(
            r#"
            let i = add_layer("Ink");
            print(i);
            move_layer(i, 0);
            print(selected_layer());
            toggle_layer(0);
            remove_layer(1);
            print(layer_count());
            "#,
            shared(4, 4),
        )
        .unwrap();
        assert_eq!(out, vec!["2", "0", "2"]);
    }

    #[test]
    fn runtime_errors_carry_position() {
        let err = execute_session_script("let a = 1;\nselect_layer(9);", shared(4, 4)).unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(err.message.contains("no layer at index 9"));
        assert!(err.friendly_message().starts_with("Error on line 2"));
    }

    #[test]
    fn unknown_tool_and_syntax_errors() {
        assert!(execute_session_script(r#"tool("lasso");"#, shared(4, 4)).is_err());
        let err = compile_session_script("let = ;").unwrap_err();
        assert!(err.line.is_some());
    }

    #[test]
    fn input_api_pans_and_zooms() {
        let ed = shared(20, 20);
        execute_session_script(
            r#"
            key_down(" ");
            pointer_down(0, 0, 0);
            pointer_move(5, 5, 10);
            pointer_up(5, 5, 20);
            key_up(" ");
            wheel(5, 5, -1);
            "#,
            ed.clone(),
        )
        .unwrap();
        let ed = lock(&ed);
        // Zoom anchored at (5, 5), which the pan left on the surface origin
        assert_eq!(ed.viewport().offset_x, 5.0);
        assert!(ed.viewport().scale() > 1.0);
        assert_eq!(ed.canvas.selected_layer().unwrap().history.undo_count(), 0);
    }
}
