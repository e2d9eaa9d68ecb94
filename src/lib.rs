//! Daub: a headless multi-layer raster painting engine.
//!
//! The [`Editor`] owns a stack of layers, a pan/zoom [`Viewport`], the active
//! tool and brush, and per-layer undo history. Pointer and keyboard events go
//! in, pixels and [`EditorEvent`]s come out.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

#[macro_use]
pub mod logger;
pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod keymap;
pub mod ops;
pub mod settings;
pub mod viewport;

pub use app::{Editor, EditorEvent, PointerButton, PointerEvent};
pub use canvas::{CanvasState, Layer, LayerId, PixelSurface, RenderSurface};
pub use components::history::{HistoryStack, Snapshot};
pub use components::pressure::{PressureSettings, PressureSimulator, StrokeSample};
pub use components::tools::{Brush, BrushShape, Tool};
pub use keymap::{BindableAction, Keymap};
pub use settings::EngineSettings;
pub use viewport::Viewport;
