use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::Rgba;

use crate::components::pressure::PressureSettings;
use crate::components::tools::{Brush, BrushShape};
use crate::keymap::Keymap;
use crate::viewport::DEFAULT_ZOOM_INTENSITY;

/// Engine defaults read from `daub_settings.cfg` (`key=value` per line).
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub device_scale: f32,
    pub zoom_intensity: f32,
    /// Undo entries kept per layer; 0 = unlimited.
    pub max_undo_steps: usize,
    pub brush: Brush,
    pub pressure: PressureSettings,
    pub keymap: Keymap,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            canvas_width: 800,
            canvas_height: 600,
            device_scale: 1.0,
            zoom_intensity: DEFAULT_ZOOM_INTENSITY,
            max_undo_steps: 50,
            brush: Brush::default(),
            pressure: PressureSettings::default(),
            keymap: Keymap::default(),
        }
    }
}

impl EngineSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/daub/daub_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\Daub\daub_settings.cfg
    /// On macOS:   ~/Library/Application Support/Daub/daub_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("daub");
            return Some(config_dir.join("daub_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_default();
            return Some(PathBuf::from(appdata).join("Daub").join("daub_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("Daub")
                    .join("daub_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("daub_settings.cfg")))
        }
    }

    /// Load from the default location (defaults if missing).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`. A missing or unreadable file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                log_info!("Settings loaded from {}", path.display());
                Self::parse(&content)
            }
            Err(_) => Self::default(),
        }
    }

    /// Parse settings text. Unknown keys and bad values are skipped with a warning.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else {
                log_warn!("settings line {}: expected key=value, got '{}'", lineno + 1, line);
                continue;
            };
            let key = key.trim();
            let val = val.trim();

            if let Some(action) = key.strip_prefix("key.") {
                if !s.keymap.load_config_line(action, val) {
                    log_warn!("settings: bad key binding '{}={}'", key, val);
                }
                continue;
            }

            match key {
                "canvas_width" => s.canvas_width = parse_or(key, val, s.canvas_width),
                "canvas_height" => s.canvas_height = parse_or(key, val, s.canvas_height),
                "device_scale" => s.device_scale = parse_or(key, val, s.device_scale),
                "zoom_intensity" => s.zoom_intensity = parse_or(key, val, s.zoom_intensity),
                "max_undo_steps" => s.max_undo_steps = parse_or(key, val, s.max_undo_steps),
                "brush_size" => s.brush.size = parse_or(key, val, s.brush.size),
                "brush_color" => match str_to_color(val) {
                    Some(c) => s.brush.color = c,
                    None => log_warn!("settings: bad colour for '{}': '{}'", key, val),
                },
                "brush_opacity" => s.brush.opacity = parse_or(key, val, s.brush.opacity),
                "brush_shape" => match BrushShape::from_name(val) {
                    Some(shape) => s.brush.shape = shape,
                    None => log_warn!("settings: unknown brush shape '{}'", val),
                },
                "brush_spacing" => s.brush.spacing = parse_or(key, val, s.brush.spacing),
                "enable_pressure" => s.pressure.enable_pressure = parse_or(key, val, s.pressure.enable_pressure),
                "min_pressure" => s.pressure.min_pressure = parse_or(key, val, s.pressure.min_pressure),
                "max_pressure" => s.pressure.max_pressure = parse_or(key, val, s.pressure.max_pressure),
                "pressure_sensitivity" => {
                    s.pressure.pressure_sensitivity = parse_or(key, val, s.pressure.pressure_sensitivity)
                }
                "taper_start" => s.pressure.taper_start = parse_or(key, val, s.pressure.taper_start),
                "taper_end" => s.pressure.taper_end = parse_or(key, val, s.pressure.taper_end),
                "velocity_influence" => {
                    s.pressure.velocity_influence = parse_or(key, val, s.pressure.velocity_influence)
                }
                _ => log_warn!("settings: unknown key '{}'", key),
            }
        }
        s.pressure = s.pressure.normalized();
        s
    }

    pub fn to_config_string(&self) -> String {
        let shape = match self.brush.shape {
            BrushShape::Square => "square",
            // Stamp tips come from an image, not from the settings file
            BrushShape::Circle | BrushShape::Stamp(_) => "circle",
        };
        let p = &self.pressure;
        let mut content = format!(
            "canvas_width={}\n\
             canvas_height={}\n\
             device_scale={}\n\
             zoom_intensity={}\n\
             max_undo_steps={}\n\
             brush_size={}\n\
             brush_color={}\n\
             brush_opacity={}\n\
             brush_shape={shape}\n\
             brush_spacing={}\n\
             enable_pressure={}\n\
             min_pressure={}\n\
             max_pressure={}\n\
             pressure_sensitivity={}\n\
             taper_start={}\n\
             taper_end={}\n\
             velocity_influence={}\n",
            self.canvas_width,
            self.canvas_height,
            self.device_scale,
            self.zoom_intensity,
            self.max_undo_steps,
            self.brush.size,
            color_to_str(self.brush.color),
            self.brush.opacity,
            self.brush.spacing,
            p.enable_pressure,
            p.min_pressure,
            p.max_pressure,
            p.pressure_sensitivity,
            p.taper_start,
            p.taper_end,
            p.velocity_influence,
        );
        // Append keybinding lines
        for line in self.keymap.to_config_lines() {
            content.push_str(&line);
            content.push('\n');
        }
        content
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_config_string())
    }
}

fn parse_or<T: FromStr>(key: &str, val: &str, current: T) -> T {
    match val.parse() {
        Ok(v) => v,
        Err(_) => {
            log_warn!("settings: bad value for '{}': '{}'", key, val);
            current
        }
    }
}

/// Serialize a colour as "r,g,b,a"
pub fn color_to_str(c: Rgba<u8>) -> String {
    format!("{},{},{},{}", c[0], c[1], c[2], c[3])
}

/// Parse a colour from "r,g,b,a"
pub fn str_to_color(s: &str) -> Option<Rgba<u8>> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() == 4 {
        let r = parts[0].trim().parse::<u8>().ok()?;
        let g = parts[1].trim().parse::<u8>().ok()?;
        let b = parts[2].trim().parse::<u8>().ok()?;
        let a = parts[3].trim().parse::<u8>().ok()?;
        Some(Rgba([r, g, b, a]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::BindableAction;

    #[test]
    fn empty_text_gives_defaults() {
        let s = EngineSettings::parse("");
        assert_eq!(s.canvas_width, 800);
        assert_eq!(s.max_undo_steps, 50);
        assert_eq!(s.brush.color, Rgba([0x1b, 0x1b, 0x1b, 255]));
        assert_eq!(s.pressure, PressureSettings::default());
    }

    #[test]
    fn values_and_bindings_are_read() {
        let s = EngineSettings::parse(
            "# comment\n\
             canvas_width=320\n\
             device_scale=2\n\
             brush_color=255, 0, 0, 128\n\
             brush_shape=square\n\
             taper_end=false\n\
             min_pressure=0.3\n\
             key.undo=Alt+u\n",
        );
        assert_eq!(s.canvas_width, 320);
        assert_eq!(s.device_scale, 2.0);
        assert_eq!(s.brush.color, Rgba([255, 0, 0, 128]));
        assert_eq!(s.brush.shape.name(), "square");
        assert!(!s.pressure.taper_end);
        assert_eq!(s.pressure.min_pressure, 0.3);
        assert_eq!(s.keymap.combos_for(BindableAction::Undo).len(), 1);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let s = EngineSettings::parse(
            "canvas_width=wide\nbrush_color=1,2,3\nmystery=1\nno equals sign\nenable_pressure=maybe\n",
        );
        assert_eq!(s.canvas_width, 800);
        assert_eq!(s.brush.color, Brush::default().color);
        assert!(s.pressure.enable_pressure);
    }

    #[test]
    fn config_string_round_trips() {
        let mut s = EngineSettings::default();
        s.canvas_height = 123;
        s.zoom_intensity = 0.1;
        s.brush.spacing = 2.5;
        s.pressure.velocity_influence = 0.75;
        let back = EngineSettings::parse(&s.to_config_string());
        assert_eq!(back.canvas_height, 123);
        assert_eq!(back.zoom_intensity, 0.1);
        assert_eq!(back.brush.spacing, 2.5);
        assert_eq!(back.pressure, s.pressure);
        assert_eq!(back.keymap.to_config_lines(), s.keymap.to_config_lines());
    }

    #[test]
    fn save_and_load_from_file() {
        let path = std::env::temp_dir().join(format!("daub_settings_test_{}.cfg", std::process::id()));
        let mut s = EngineSettings::default();
        s.max_undo_steps = 7;
        s.save_to(&path).unwrap();
        let back = EngineSettings::load_from(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(back.max_undo_steps, 7);

        let missing = EngineSettings::load_from(Path::new("/definitely/not/here.cfg"));
        assert_eq!(missing.max_undo_steps, 50);
    }
}
