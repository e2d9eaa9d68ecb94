//! Synthetic stylus pressure for mouse/touch input.
//!
//! Pressure per sample comes from pointer velocity (slow = heavy), a taper at
//! the start of the stroke, a taper at the end when the stroke's full length
//! is known, and a small deterministic jitter. Everything is then remapped
//! through the sensitivity and clamped to `[min_pressure, max_pressure]`.

/// Velocity (surface px per ms) at which the velocity term reaches zero.
pub const MAX_VELOCITY: f32 = 3.0;
/// Upper bound of the taper windows, in surface px.
pub const TAPER_WINDOW: f32 = 30.0;
/// Taper windows never exceed this fraction of the stroke's length.
pub const TAPER_FRACTION: f32 = 0.2;
pub const JITTER_AMPLITUDE: f32 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PressureSettings {
    pub enable_pressure: bool,
    pub min_pressure: f32,
    pub max_pressure: f32,
    pub pressure_sensitivity: f32,
    pub taper_start: bool,
    pub taper_end: bool,
    pub velocity_influence: f32,
}

impl Default for PressureSettings {
    fn default() -> Self {
        Self {
            enable_pressure: true,
            min_pressure: 0.2,
            max_pressure: 1.0,
            pressure_sensitivity: 1.0,
            taper_start: true,
            taper_end: true,
            velocity_influence: 0.5,
        }
    }
}

impl PressureSettings {
    /// Clamp every factor into `[0, 1]` and order the range.
    pub fn normalized(&self) -> Self {
        let c = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let (mut lo, mut hi) = (c(self.min_pressure), c(self.max_pressure));
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        Self {
            min_pressure: lo,
            max_pressure: hi,
            pressure_sensitivity: c(self.pressure_sensitivity),
            velocity_influence: c(self.velocity_influence),
            ..*self
        }
    }
}

/// One pointer sample of the active stroke, in surface-pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeSample {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    pub timestamp_ms: u64,
    pub velocity: f32,
}

/// Inspection snapshot of the current stroke.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PressureStats {
    pub samples: usize,
    pub total_distance: f32,
    pub min_pressure: f32,
    pub max_pressure: f32,
    pub mean_pressure: f32,
    pub last_velocity: f32,
}

/// Per-stroke pressure state. Call [`begin`](Self::begin) at pointer-down,
/// [`push`](Self::push) for every sample, [`end`](Self::end) at release.
#[derive(Clone, Debug, Default)]
pub struct PressureSimulator {
    settings: PressureSettings,
    force_constant: bool,
    samples: Vec<StrokeSample>,
    /// Running path length from the first sample.
    distance: f32,
}

impl PressureSimulator {
    pub fn new(settings: PressureSettings) -> Self {
        Self {
            settings: settings.normalized(),
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &PressureSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: PressureSettings) {
        self.settings = settings.normalized();
    }

    /// Pin every sample to `max_pressure`.
    pub fn set_force_constant(&mut self, force: bool) {
        self.force_constant = force;
    }

    pub fn force_constant(&self) -> bool {
        self.force_constant
    }

    pub fn begin(&mut self) {
        self.samples.clear();
        self.distance = 0.0;
    }

    pub fn end(&mut self) {
        self.begin();
    }

    pub fn samples(&self) -> &[StrokeSample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&StrokeSample> {
        self.samples.last()
    }

    /// Append a sample with simulated pressure. The stroke's total length is
    /// unknown while streaming, so no end taper is applied.
    pub fn push(&mut self, x: f32, y: f32, timestamp_ms: u64) -> StrokeSample {
        self.push_inner(x, y, timestamp_ms, None, None)
    }

    /// Append a sample carrying a hardware pressure reading (0..1) when one
    /// exists. Hardware values bypass the simulation but still go through the
    /// sensitivity remap and clamp.
    pub fn push_with_pressure(&mut self, x: f32, y: f32, timestamp_ms: u64, pressure: Option<f32>) -> StrokeSample {
        self.push_inner(x, y, timestamp_ms, pressure, None)
    }

    /// Simulate a whole stroke at once. With the total length known the end
    /// taper applies. Leaves the simulator holding the stroke's samples.
    pub fn simulate(&mut self, points: &[(f32, f32, u64)]) -> Vec<StrokeSample> {
        self.begin();
        let total: f32 = points
            .windows(2)
            .map(|w| ((w[1].0 - w[0].0).powi(2) + (w[1].1 - w[0].1).powi(2)).sqrt())
            .sum();
        for &(x, y, t) in points {
            self.push_inner(x, y, t, None, Some(total));
        }
        self.samples.clone()
    }

    fn push_inner(&mut self, x: f32, y: f32, timestamp_ms: u64, hardware: Option<f32>, total: Option<f32>) -> StrokeSample {
        let (segment, velocity) = match self.samples.last() {
            Some(prev) => {
                let d = ((x - prev.x).powi(2) + (y - prev.y).powi(2)).sqrt();
                let elapsed = timestamp_ms.saturating_sub(prev.timestamp_ms).max(1) as f32;
                (d, d / elapsed)
            }
            None => (0.0, 0.0),
        };
        self.distance += segment;

        let pressure = match hardware {
            Some(p) if self.settings.enable_pressure && !self.force_constant && p.is_finite() => {
                self.remap(p.clamp(0.0, 1.0))
            }
            _ => self.simulated_pressure(self.samples.len(), velocity, timestamp_ms, total),
        };

        let sample = StrokeSample {
            x,
            y,
            pressure,
            timestamp_ms,
            velocity,
        };
        self.samples.push(sample);
        sample
    }

    fn simulated_pressure(&self, index: usize, velocity: f32, timestamp_ms: u64, total: Option<f32>) -> f32 {
        let s = &self.settings;
        if !s.enable_pressure {
            return 1.0;
        }
        if self.force_constant {
            return s.max_pressure;
        }
        // Stroke start is always light
        if index < 2 {
            return s.min_pressure;
        }

        let range = s.max_pressure - s.min_pressure;
        let influence = s.velocity_influence;
        let velocity_factor = (1.0 - velocity / MAX_VELOCITY).clamp(0.0, 1.0);
        let mut p = s.min_pressure + range * (1.0 - influence) + velocity_factor * influence * range;

        let mut tapering = false;
        let from_start = self.distance;

        if s.taper_start {
            let window = total.map_or(TAPER_WINDOW, taper_window);
            if window > 0.0 && from_start < window {
                p = s.min_pressure + (p - s.min_pressure) * ease_in_out_cubic(from_start / window);
                tapering = true;
            }
        }

        if s.taper_end
            && let Some(total) = total
        {
            let window = taper_window(total);
            let remaining = (total - from_start).max(0.0);
            if window > 0.0 && remaining < window {
                let progress = 1.0 - remaining / window;
                p = s.min_pressure + (p - s.min_pressure) * (1.0 - ease_in_out_cubic(progress));
                tapering = true;
            }
        }

        // No jitter inside a taper so the fade stays monotone
        if !tapering {
            p += jitter(timestamp_ms);
        }

        self.remap(p)
    }

    /// Linear remap through the sensitivity, then clamp into range.
    fn remap(&self, p: f32) -> f32 {
        let s = &self.settings;
        let p = s.min_pressure + (p - s.min_pressure) * s.pressure_sensitivity;
        p.clamp(s.min_pressure, s.max_pressure)
    }

    pub fn stats(&self) -> PressureStats {
        let Some(last) = self.samples.last() else {
            return PressureStats::default();
        };
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        let mut sum = 0.0;
        for s in &self.samples {
            min = min.min(s.pressure);
            max = max.max(s.pressure);
            sum += s.pressure;
        }
        PressureStats {
            samples: self.samples.len(),
            total_distance: self.distance,
            min_pressure: min,
            max_pressure: max,
            mean_pressure: sum / self.samples.len() as f32,
            last_velocity: last.velocity,
        }
    }
}

fn taper_window(total: f32) -> f32 {
    TAPER_WINDOW.min(total * TAPER_FRACTION)
}

pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Deterministic hash used for per-sample jitter.
fn stamp_hash(a: u32, b: u32) -> u32 {
    let mut h = a
        .wrapping_mul(374761393)
        .wrapping_add(b.wrapping_mul(668265263));
    h ^= h >> 13;
    h = h.wrapping_mul(1274126177);
    h ^= h >> 16;
    h
}

/// Time-seeded offset in `[-JITTER_AMPLITUDE, JITTER_AMPLITUDE]`.
fn jitter(timestamp_ms: u64) -> f32 {
    let h = stamp_hash(timestamp_ms as u32, (timestamp_ms >> 32) as u32);
    let unit = (h & 0xFFFF) as f32 / 65535.0;
    (unit * 2.0 - 1.0) * JITTER_AMPLITUDE
}
