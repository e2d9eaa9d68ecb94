// ============================================================================
// Daub CLI: headless replay of editing sessions
// ============================================================================
//
// Usage examples:
//   daub --script session.rhai --output result.png
//   daub -s sessions/*.rhai --output-dir renders/
//   daub -s sketch.rhai --width 256 --height 256 --stamp leaf.png -o leaf.png
//
// Every script runs against a fresh editor. The composite of all visible
// layers is written as PNG once the script finishes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Parser;

use crate::app::Editor;
use crate::components::tools::BrushShape;
use crate::ops::scripting::{ScriptError, execute_session_script};
use crate::settings::EngineSettings;

/// Largest backing surface side, in device pixels.
pub const MAX_BACKING_SIZE: u32 = 16_384;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Daub headless painting engine.
#[derive(Parser, Debug)]
#[command(
    name = "daub",
    about = "Daub headless raster painting engine",
    long_about = "Replay Rhai session scripts against a layered canvas and write the\n\
                  composite as PNG. Each script gets a fresh editor.\n\n\
                  Example:\n  \
                  daub --script session.rhai --output result.png\n  \
                  daub -s sessions/*.rhai --output-dir renders/"
)]
pub struct CliArgs {
    /// Session script(s). Glob patterns accepted (e.g. "sessions/*.rhai").
    #[arg(short, long, required = true, num_args = 1.., value_name = "SCRIPT.rhai")]
    pub script: Vec<String>,

    /// Output PNG path. Only valid for a single script.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batches. Files are named after the script stem.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Canvas width in CSS pixels (overrides the settings file).
    #[arg(long)]
    pub width: Option<u32>,

    /// Canvas height in CSS pixels (overrides the settings file).
    #[arg(long)]
    pub height: Option<u32>,

    /// Device pixel ratio of the backing surfaces.
    #[arg(long, value_name = "RATIO")]
    pub device_scale: Option<f32>,

    /// Settings file to use instead of the default location.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// PNG image used as the brush tip.
    #[arg(long, value_name = "PNG")]
    pub stamp: Option<PathBuf>,

    /// Write the session log here instead of the data directory.
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Print script console output, log lines and per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    Io(std::io::Error),
    Image(image::ImageError),
    Script(ScriptError),
    Usage(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "I/O error: {}", e),
            CliError::Image(e) => write!(f, "image error: {}", e),
            CliError::Script(e) => write!(f, "script error: {}", e.friendly_message()),
            CliError::Usage(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<image::ImageError> for CliError {
    fn from(e: image::ImageError) -> Self {
        CliError::Image(e)
    }
}

impl From<ScriptError> for CliError {
    fn from(e: ScriptError) -> Self {
        CliError::Script(e)
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = every script succeeded, `1` = one or more failed.
pub fn run(args: CliArgs) -> ExitCode {
    let scripts = resolve_inputs(&args.script);
    if scripts.is_empty() {
        eprintln!("error: no script files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if scripts.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} scripts given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch runs.",
            scripts.len()
        );
        return ExitCode::FAILURE;
    }

    let settings = match build_settings(&args) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = scripts.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, script_path) in scripts.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, script_path.display());
        }
        let start = Instant::now();

        let Some(output_path) = build_output_path(script_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", script_path.display());
            any_failure = true;
            continue;
        };

        match run_one(script_path, &output_path, &settings, args.verbose) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  -> {} ({:.0}ms)",
                        output_path.display(),
                        start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log_err!("{}: {}", script_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-script pipeline
// ============================================================================

/// Settings file plus command-line overrides.
pub fn build_settings(args: &CliArgs) -> Result<EngineSettings, CliError> {
    let mut settings = match &args.settings {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::Usage(format!("settings file '{}' does not exist", path.display())));
            }
            EngineSettings::load_from(path)
        }
        None => EngineSettings::load(),
    };
    if let Some(w) = args.width {
        settings.canvas_width = w;
    }
    if let Some(h) = args.height {
        settings.canvas_height = h;
    }
    if let Some(ds) = args.device_scale {
        if !(ds > 0.0 && ds.is_finite()) {
            return Err(CliError::Usage(format!("--device-scale must be positive, got {}", ds)));
        }
        settings.device_scale = ds;
    }
    if settings.canvas_width == 0 || settings.canvas_height == 0 {
        return Err(CliError::Usage("canvas size must be at least 1x1".to_string()));
    }
    let backing_w = settings.canvas_width as f64 * settings.device_scale as f64;
    let backing_h = settings.canvas_height as f64 * settings.device_scale as f64;
    if backing_w > MAX_BACKING_SIZE as f64 || backing_h > MAX_BACKING_SIZE as f64 {
        return Err(CliError::Usage(format!(
            "canvas {}x{} at scale {} exceeds the {}px limit per side",
            settings.canvas_width, settings.canvas_height, settings.device_scale, MAX_BACKING_SIZE
        )));
    }
    if let Some(stamp) = &args.stamp {
        let img = image::open(stamp)?.to_rgba8();
        log_info!("Stamp brush loaded: {} ({}x{})", stamp.display(), img.width(), img.height());
        settings.brush.shape = BrushShape::Stamp(Arc::new(img));
    }
    Ok(settings)
}

/// Replay one script on a fresh editor and save its composite.
pub fn run_one(script: &Path, output: &Path, settings: &EngineSettings, verbose: bool) -> Result<(), CliError> {
    let source = std::fs::read_to_string(script)?;
    let editor = Arc::new(Mutex::new(Editor::new(settings)));

    let console = execute_session_script(&source, editor.clone())?;
    if verbose {
        for line in &console {
            println!("  [script] {}", line);
        }
    }

    let composite = match editor.lock() {
        Ok(ed) => ed.composite(),
        Err(poisoned) => poisoned.into_inner().composite(),
    };
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    composite.save_with_format(output, image::ImageFormat::Png)?;
    log_info!(
        "Rendered {} -> {} ({}x{})",
        script.display(),
        output.display(),
        composite.width(),
        composite.height()
    );
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Output path for one script.
///
/// Priority:
/// 1. `--output`
/// 2. `--output-dir` joined with `<script stem>.png`
/// 3. `<script stem>.png` next to the script
fn build_output_path(script: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = script.file_stem()?.to_string_lossy().into_owned();
    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.png", stem)));
    }

    let parent = script.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}.png", stem)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("daub_cli_{}_{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn args_parse() {
        let args = CliArgs::try_parse_from([
            "daub", "-s", "a.rhai", "b.rhai", "--output-dir", "out", "--width", "64", "--device-scale", "2",
        ])
        .unwrap();
        assert_eq!(args.script, vec!["a.rhai".to_string(), "b.rhai".to_string()]);
        assert_eq!(args.width, Some(64));
        assert_eq!(args.device_scale, Some(2.0));
        assert!(CliArgs::try_parse_from(["daub"]).is_err());
    }

    #[test]
    fn output_path_priority() {
        let script = Path::new("sessions/cat.rhai");
        assert_eq!(
            build_output_path(script, Some(Path::new("x.png")), Some(Path::new("dir"))),
            Some(PathBuf::from("x.png"))
        );
        assert_eq!(
            build_output_path(script, None, Some(Path::new("dir"))),
            Some(PathBuf::from("dir/cat.png"))
        );
        assert_eq!(build_output_path(script, None, None), Some(PathBuf::from("sessions/cat.png")));
    }

    #[test]
    fn overrides_and_bad_scale() {
        let dir = temp_dir("settings");
        let cfg = dir.join("s.cfg");
        std::fs::write(&cfg, "canvas_width=10\ncanvas_height=20\n").unwrap();
        let cfg_str = cfg.to_string_lossy().into_owned();

        let args = CliArgs::try_parse_from(["daub", "-s", "x.rhai", "--settings", cfg_str.as_str(), "--height", "5"]).unwrap();
        let s = build_settings(&args).unwrap();
        assert_eq!((s.canvas_width, s.canvas_height), (10, 5));

        let args = CliArgs::try_parse_from(["daub", "-s", "x.rhai", "--settings", cfg_str.as_str(), "--device-scale", "0"]).unwrap();
        assert!(matches!(build_settings(&args), Err(CliError::Usage(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn oversized_canvas_is_refused() {
        let dir = temp_dir("huge");
        let cfg = dir.join("s.cfg");
        std::fs::write(&cfg, "canvas_width=100\ncanvas_height=100\n").unwrap();
        let cfg_str = cfg.to_string_lossy().into_owned();

        let args = CliArgs::try_parse_from(["daub", "-s", "x.rhai", "--settings", cfg_str.as_str(), "--width", "4000000000"])
            .unwrap();
        assert!(matches!(build_settings(&args), Err(CliError::Usage(_))));

        // Within the limit on its own, over it once the device scale applies
        let args = CliArgs::try_parse_from([
            "daub", "-s", "x.rhai", "--settings", cfg_str.as_str(), "--height", "10000", "--device-scale", "2",
        ])
        .unwrap();
        assert!(matches!(build_settings(&args), Err(CliError::Usage(_))));

        let args = CliArgs::try_parse_from(["daub", "-s", "x.rhai", "--settings", cfg_str.as_str(), "--width", "16384"])
            .unwrap();
        assert_eq!(build_settings(&args).unwrap().canvas_width, 16_384);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn script_renders_png() {
        let dir = temp_dir("render");
        let script = dir.join("red.rhai");
        std::fs::write(&script, "brush_color(255, 0, 0, 255);\ntool(\"fill\");\nfill(1.0, 1.0);\n").unwrap();
        let out = dir.join("red.png");

        let settings = EngineSettings {
            canvas_width: 4,
            canvas_height: 3,
            ..Default::default()
        };
        run_one(&script, &out, &settings, false).unwrap();

        let img = image::open(&out).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(2, 2).0, [255, 0, 0, 255]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn script_failure_is_reported() {
        let dir = temp_dir("fail");
        let script = dir.join("bad.rhai");
        std::fs::write(&script, "let x = ;").unwrap();
        let err = run_one(&script, &dir.join("bad.png"), &EngineSettings::default(), false).unwrap_err();
        assert!(matches!(err, CliError::Script(_)));
        assert!(err.to_string().starts_with("script error"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
