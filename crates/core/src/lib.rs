//! Core library for the layered music visualiser.
//!
//! The engine reads live analyser taps once per frame, shapes the spectrum,
//! tracks beats, and composites an ordered stack of style layers onto a host
//! supplied 2D [`Surface`](render::Surface). Each module owns one subsystem:
//! tap access, spectrum shaping and beat tracking, the layer parameter model,
//! style renderers, frame timing, and the engine facade tying them together.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod presets;
pub mod render;
pub mod scene;
pub mod timeline;

pub use analysis::{BeatDetector, BeatSettings, BeatSnapshot, BeatSource, SpectrumProcessor};
pub use assets::{AssetStore, ImageHandle};
pub use audio::{AnalyserHandle, AnalyserTap, FftAnalyser, SpectrumSource};
pub use config::EngineConfig;
pub use engine::{Scope, VisualEngine};
pub use error::{Result, VizError};
pub use render::{Color, CommandRecorder, Compositor, DrawCommand, Surface};
pub use scene::{EngineDefaults, Layer, LayerOverrides, LayerStack, ParamUpdate, StyleKind};
pub use timeline::{FrameHost, FrameOutcome, PerformanceGovernor, Scheduler};
